//! Checkpoint state and trait definitions.

use crate::training::OptimizerState;
use crate::{MaddpgError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Cursor;
use tch::{nn, Device, Tensor};

/// Trait for components that can be checkpointed.
///
/// Implement this trait to enable save/restore functionality for your training components.
///
/// # Example
///
/// ```ignore
/// impl Checkpointable for MyAgent {
///     fn save_state(&self) -> Result<Vec<u8>> {
///         Ok(serde_json::to_vec(&self.export_state()?)?)
///     }
///
///     fn load_state(&mut self, data: &[u8]) -> Result<()> {
///         self.import_state(&serde_json::from_slice(data)?)
///     }
/// }
/// ```
pub trait Checkpointable {
    /// Serialize the component's state to bytes.
    fn save_state(&self) -> Result<Vec<u8>>;

    /// Restore the component's state from bytes.
    fn load_state(&mut self, data: &[u8]) -> Result<()>;
}

/// Host copy of one tensor.
///
/// `bytes` is the tensor in torch's own serialization, so the element kind
/// and non-finite values survive a save/load cycle unchanged.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TensorData {
    pub shape: Vec<i64>,
    pub bytes: Vec<u8>,
}

impl TensorData {
    pub fn from_tensor(tensor: &Tensor) -> Result<Self> {
        let host = tensor.detach().to_device(Device::Cpu).contiguous();
        let mut bytes = Vec::new();
        host.save_to_stream(&mut bytes)?;
        Ok(Self {
            shape: tensor.size(),
            bytes,
        })
    }

    pub fn to_tensor(&self, device: Device) -> Result<Tensor> {
        let tensor = Tensor::load_from_stream(Cursor::new(self.bytes.as_slice()))?;
        if tensor.size() != self.shape {
            return Err(MaddpgError::ArchitectureMismatch(format!(
                "stored tensor is {:?}, header says {:?}",
                tensor.size(),
                self.shape
            )));
        }
        Ok(tensor.to_device(device))
    }

    pub fn check_shape(&self, target: &Tensor, name: &str) -> Result<()> {
        if target.size() != self.shape {
            return Err(MaddpgError::ArchitectureMismatch(format!(
                "'{}' is {:?}, saved state is {:?}",
                name,
                target.size(),
                self.shape
            )));
        }
        Ok(())
    }

    /// Overwrite `target` in place, checking the shape first.
    pub fn copy_into(&self, target: &mut Tensor, name: &str) -> Result<()> {
        self.check_shape(target, name)?;
        let source = self.to_tensor(target.device())?.to_kind(target.kind());
        tch::no_grad(|| target.copy_(&source));
        Ok(())
    }
}

/// Parameters of one network, keyed by var-store name.
pub type NetworkState = BTreeMap<String, TensorData>;

/// Export every parameter of a var store.
pub fn network_state(vs: &nn::VarStore) -> Result<NetworkState> {
    vs.variables()
        .iter()
        .map(|(name, var)| Ok((name.clone(), TensorData::from_tensor(var)?)))
        .collect()
}

/// Check names and shapes of a saved network against a var store.
pub fn check_network_state(vs: &nn::VarStore, state: &NetworkState) -> Result<()> {
    let variables = vs.variables();
    if variables.len() != state.len() {
        return Err(MaddpgError::ArchitectureMismatch(format!(
            "network has {} parameters, saved state has {}",
            variables.len(),
            state.len()
        )));
    }
    for (name, var) in &variables {
        saved_entry(state, name)?.check_shape(var, name)?;
    }
    Ok(())
}

/// Restore every parameter of a var store; names must match exactly.
///
/// Nothing is written unless the whole state fits.
pub fn load_network_state(vs: &mut nn::VarStore, state: &NetworkState) -> Result<()> {
    check_network_state(vs, state)?;
    for (name, var) in vs.variables().iter_mut() {
        saved_entry(state, name)?.copy_into(var, name)?;
    }
    Ok(())
}

fn saved_entry<'s>(state: &'s NetworkState, name: &str) -> Result<&'s TensorData> {
    state
        .get(name)
        .ok_or_else(|| MaddpgError::ArchitectureMismatch(format!("saved state lacks '{}'", name)))
}

/// One named entry of an agent's core state.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum ComponentState {
    Network(NetworkState),
    Optimizer(OptimizerState),
}

/// Opponent-model parameters and optimizer state, keyed by peer index.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ModelState {
    pub models: BTreeMap<usize, NetworkState>,
    pub optimizers: BTreeMap<usize, OptimizerState>,
}

/// Complete exported agent state.
///
/// `core` holds `actor`, `actor_target`, `actor_optim`, `critic`,
/// `critic_target`, `critic_optim`, plus the `nature_actor*` entries for the
/// robust variant. `models` is present only with opponent modeling.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AgentState {
    pub core: BTreeMap<String, ComponentState>,
    pub models: Option<ModelState>,
}

impl AgentState {
    pub fn insert_network(&mut self, key: &str, vs: &nn::VarStore) -> Result<()> {
        self.core
            .insert(key.to_string(), ComponentState::Network(network_state(vs)?));
        Ok(())
    }

    pub fn insert_optimizer(&mut self, key: &str, state: OptimizerState) {
        self.core
            .insert(key.to_string(), ComponentState::Optimizer(state));
    }

    pub fn network(&self, key: &str) -> Result<&NetworkState> {
        match self.core.get(key) {
            Some(ComponentState::Network(state)) => Ok(state),
            _ => Err(MaddpgError::ArchitectureMismatch(format!(
                "no network state under '{}'",
                key
            ))),
        }
    }

    pub fn optimizer(&self, key: &str) -> Result<&OptimizerState> {
        match self.core.get(key) {
            Some(ComponentState::Optimizer(state)) => Ok(state),
            _ => Err(MaddpgError::ArchitectureMismatch(format!(
                "no optimizer state under '{}'",
                key
            ))),
        }
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}
