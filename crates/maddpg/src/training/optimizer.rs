//! Gradient optimizers with exportable state.

use crate::checkpoint::TensorData;
use crate::{MaddpgError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tch::{nn, Kind, Tensor};

/// Trait for optimizers driving one network's parameters.
pub trait GradientOptimizer: Send {
    /// Zero out gradients.
    fn zero_grad(&mut self);

    /// Perform an optimization step.
    fn step(&mut self);

    /// Get the variables managed by this optimizer.
    fn variables(&self) -> &[Tensor];

    /// Rescale gradients so their global L2 norm is at most `max_norm`.
    ///
    /// Returns the norm before clipping.
    fn clip_grad_norm(&mut self, max_norm: f64) -> f64 {
        let mut global_norm = 0.0f64;
        for var in self.variables() {
            let grad = var.grad();
            if grad.defined() {
                global_norm += grad
                    .pow_tensor_scalar(2.0)
                    .sum(Kind::Float)
                    .double_value(&[]);
            }
        }
        global_norm = global_norm.sqrt();

        if global_norm > max_norm {
            let clip_coef = max_norm / (global_norm + 1e-6);
            for var in self.variables() {
                let mut grad = var.grad();
                if grad.defined() {
                    let _ = grad.f_mul_scalar_(clip_coef);
                }
            }
        }
        global_norm
    }
}

/// Serialized Adam moments, keyed by parameter name.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OptimizerState {
    pub lr: f64,
    pub step: i64,
    pub exp_avg: BTreeMap<String, TensorData>,
    pub exp_avg_sq: BTreeMap<String, TensorData>,
}

/// Adam over the trainable variables of a `VarStore`.
pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    names: Vec<String>,
    variables: Vec<Tensor>,
    exp_avg: Vec<Tensor>,
    exp_avg_sq: Vec<Tensor>,
    step: i64,
}

impl Adam {
    pub fn new(vs: &nn::VarStore, lr: f64) -> Self {
        let mut named: Vec<(String, Tensor)> = vs
            .variables()
            .into_iter()
            .filter(|(_, var)| var.requires_grad())
            .collect();
        named.sort_by(|a, b| a.0.cmp(&b.0));

        let exp_avg = named.iter().map(|(_, v)| v.zeros_like()).collect();
        let exp_avg_sq = named.iter().map(|(_, v)| v.zeros_like()).collect();
        let (names, variables) = named.into_iter().unzip();

        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            names,
            variables,
            exp_avg,
            exp_avg_sq,
            step: 0,
        }
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    pub fn steps_taken(&self) -> i64 {
        self.step
    }

    pub fn export_state(&self) -> Result<OptimizerState> {
        let collect = |moments: &[Tensor]| -> Result<BTreeMap<String, TensorData>> {
            self.names
                .iter()
                .zip(moments)
                .map(|(name, t)| Ok((name.clone(), TensorData::from_tensor(t)?)))
                .collect()
        };
        Ok(OptimizerState {
            lr: self.lr,
            step: self.step,
            exp_avg: collect(&self.exp_avg)?,
            exp_avg_sq: collect(&self.exp_avg_sq)?,
        })
    }

    /// Check that `state` holds a moment of the right shape for every parameter.
    pub fn check_state(&self, state: &OptimizerState) -> Result<()> {
        if state.exp_avg.len() != self.names.len() || state.exp_avg_sq.len() != self.names.len() {
            return Err(MaddpgError::ArchitectureMismatch(format!(
                "optimizer tracks {} parameters, state holds {}",
                self.names.len(),
                state.exp_avg.len()
            )));
        }
        for (i, name) in self.names.iter().enumerate() {
            let (m, v) = moments(state, name)?;
            m.check_shape(&self.exp_avg[i], name)?;
            v.check_shape(&self.exp_avg_sq[i], name)?;
        }
        Ok(())
    }

    pub fn import_state(&mut self, state: &OptimizerState) -> Result<()> {
        self.check_state(state)?;
        for (i, name) in self.names.iter().enumerate() {
            let (m, v) = moments(state, name)?;
            m.copy_into(&mut self.exp_avg[i], name)?;
            v.copy_into(&mut self.exp_avg_sq[i], name)?;
        }
        self.lr = state.lr;
        self.step = state.step;
        Ok(())
    }
}

fn moments<'s>(
    state: &'s OptimizerState,
    name: &str,
) -> Result<(&'s TensorData, &'s TensorData)> {
    let missing = || MaddpgError::ArchitectureMismatch(format!("no moment for '{}'", name));
    let m = state.exp_avg.get(name).ok_or_else(missing)?;
    let v = state.exp_avg_sq.get(name).ok_or_else(missing)?;
    Ok((m, v))
}

impl GradientOptimizer for Adam {
    fn zero_grad(&mut self) {
        for var in &self.variables {
            let mut grad = var.grad();
            if grad.defined() {
                let _ = grad.detach_();
                let _ = grad.zero_();
            }
        }
    }

    fn step(&mut self) {
        self.step += 1;
        let bias1 = 1.0 - self.beta1.powi(self.step as i32);
        let bias2 = 1.0 - self.beta2.powi(self.step as i32);
        let (beta1, beta2, eps, lr) = (self.beta1, self.beta2, self.eps, self.lr);

        tch::no_grad(|| {
            for ((var, m), v) in self
                .variables
                .iter_mut()
                .zip(self.exp_avg.iter_mut())
                .zip(self.exp_avg_sq.iter_mut())
            {
                let grad = var.grad();
                if !grad.defined() {
                    continue;
                }
                *m *= beta1;
                *m += &grad * (1.0 - beta1);
                *v *= beta2;
                *v += &grad * &grad * (1.0 - beta2);

                let denom = (&*v / bias2).sqrt() + eps;
                let update = &*m / bias1 / denom * lr;
                *var -= update;
            }
        });
    }

    fn variables(&self) -> &[Tensor] {
        &self.variables
    }
}

/// Run one clipped gradient step on `loss`.
///
/// Non-finite losses or gradient norms abort before any parameter moves.
pub fn minimize<O: GradientOptimizer>(
    optimizer: &mut O,
    loss: &Tensor,
    max_grad_norm: f64,
    what: &'static str,
) -> Result<f64> {
    let value = loss.double_value(&[]);
    if !value.is_finite() {
        tracing::warn!(what, value, "non-finite loss");
        return Err(MaddpgError::NonFinite { what });
    }

    optimizer.zero_grad();
    loss.backward();
    let norm = optimizer.clip_grad_norm(max_grad_norm);
    if !norm.is_finite() {
        tracing::warn!(what, norm, "non-finite gradient norm");
        optimizer.zero_grad();
        return Err(MaddpgError::NonFinite { what });
    }
    optimizer.step();
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::Module, Device};

    fn linear_store() -> (nn::VarStore, nn::Linear) {
        let vs = nn::VarStore::new(Device::Cpu);
        let layer = nn::linear(&vs.root() / "fc", 3, 1, Default::default());
        (vs, layer)
    }

    #[test]
    fn test_adam_reduces_loss() {
        tch::manual_seed(0);
        let (vs, layer) = linear_store();
        let mut opt = Adam::new(&vs, 1e-2);
        let x = Tensor::randn([32, 3], (Kind::Float, Device::Cpu));
        let y = x.sum_dim_intlist([-1i64].as_slice(), true, Kind::Float);

        let loss_at = |layer: &nn::Linear| layer.forward(&x).mse_loss(&y, tch::Reduction::Mean);
        let first = loss_at(&layer).double_value(&[]);
        for _ in 0..50 {
            let loss = loss_at(&layer);
            minimize(&mut opt, &loss, 10.0, "test").unwrap();
        }
        assert!(loss_at(&layer).double_value(&[]) < first);
        assert_eq!(opt.steps_taken(), 50);
    }

    #[test]
    fn test_clip_grad_norm() {
        let (vs, layer) = linear_store();
        let mut opt = Adam::new(&vs, 1e-2);
        let x = Tensor::ones([4, 3], (Kind::Float, Device::Cpu)) * 100.0;
        let loss = layer.forward(&x).sum(Kind::Float);
        opt.zero_grad();
        loss.backward();
        let before = opt.clip_grad_norm(0.5);
        assert!(before > 0.5);

        let after: f64 = opt
            .variables()
            .iter()
            .map(|v| v.grad().pow_tensor_scalar(2.0).sum(Kind::Float).double_value(&[]))
            .sum::<f64>()
            .sqrt();
        assert!(after <= 0.5 + 1e-4);
    }

    #[test]
    fn test_non_finite_loss_leaves_parameters() {
        let (vs, _layer) = linear_store();
        let mut opt = Adam::new(&vs, 1e-2);
        let before: Vec<Tensor> = opt.variables().iter().map(|v| v.copy()).collect();

        let loss = Tensor::from(f32::NAN);
        let err = minimize(&mut opt, &loss, 0.5, "critic");
        assert!(matches!(err, Err(MaddpgError::NonFinite { what: "critic" })));
        for (b, v) in before.iter().zip(opt.variables()) {
            assert!(b.equal(v));
        }
        assert_eq!(opt.steps_taken(), 0);
    }

    #[test]
    fn test_state_round_trip() {
        tch::manual_seed(1);
        let (vs, layer) = linear_store();
        let mut opt = Adam::new(&vs, 3e-3);
        let x = Tensor::randn([8, 3], (Kind::Float, Device::Cpu));
        minimize(&mut opt, &layer.forward(&x).mean(Kind::Float), 1.0, "test").unwrap();

        let state = opt.export_state().unwrap();
        assert_eq!(state.step, 1);
        assert_eq!(state.exp_avg.len(), 2);

        let (other_vs, _) = linear_store();
        let mut restored = Adam::new(&other_vs, 1.0);
        restored.import_state(&state).unwrap();
        assert_eq!(restored.lr(), 3e-3);
        assert_eq!(restored.steps_taken(), 1);
        for (a, b) in opt.exp_avg.iter().zip(restored.exp_avg.iter()) {
            assert!(a.equal(b));
        }
    }

    #[test]
    fn test_partial_state_is_rejected_before_copying() {
        tch::manual_seed(2);
        let (vs, layer) = linear_store();
        let mut opt = Adam::new(&vs, 3e-3);
        let x = Tensor::randn([8, 3], (Kind::Float, Device::Cpu));
        minimize(&mut opt, &layer.forward(&x).mean(Kind::Float), 1.0, "test").unwrap();

        let mut state = opt.export_state().unwrap();
        let (other_vs, _) = linear_store();
        let mut restored = Adam::new(&other_vs, 1.0);
        let last = restored.names[restored.names.len() - 1].clone();
        let moved = state.exp_avg_sq.remove(&last).unwrap();
        state.exp_avg_sq.insert("elsewhere".to_string(), moved);

        assert!(restored.check_state(&state).is_err());
        assert!(restored.import_state(&state).is_err());
        assert_eq!(restored.steps_taken(), 0);
        let untouched = |m: &Tensor| m.abs().sum(Kind::Float).double_value(&[]) == 0.0;
        assert!(restored.exp_avg.iter().all(untouched));
    }
}
