//! Target network synchronization.

use crate::policy::HasVarStore;
use crate::{MaddpgError, Result};
use tch::nn;

/// Blend `source` into `target`: `target = (1 - tau) * target + tau * source`.
///
/// Parameters are paired by var-store name. `tau == 1` copies exactly.
pub fn soft_update(target: &mut nn::VarStore, source: &nn::VarStore, tau: f64) -> Result<()> {
    let source_vars = source.variables();
    let mut target_vars = target.variables();
    if source_vars.len() != target_vars.len() {
        return Err(MaddpgError::ArchitectureMismatch(format!(
            "target has {} parameters, source has {}",
            target_vars.len(),
            source_vars.len()
        )));
    }

    tch::no_grad(|| {
        for (name, var) in target_vars.iter_mut() {
            let src = source_vars.get(name).ok_or_else(|| {
                MaddpgError::ArchitectureMismatch(format!("source has no parameter '{}'", name))
            })?;
            if src.size() != var.size() {
                return Err(MaddpgError::ArchitectureMismatch(format!(
                    "'{}' is {:?} in target, {:?} in source",
                    name,
                    var.size(),
                    src.size()
                )));
            }
            if tau >= 1.0 {
                var.copy_(src);
            } else {
                let blended = &*var * (1.0 - tau) + src * tau;
                var.copy_(&blended);
            }
        }
        Ok(())
    })
}

/// Turn a freshly built copy into a frozen target of `source`.
pub fn make_target<M: HasVarStore>(source: &M, mut target: M) -> Result<M> {
    soft_update(target.var_store_mut(), source.var_store(), 1.0)?;
    target.var_store_mut().freeze();
    Ok(target)
}
