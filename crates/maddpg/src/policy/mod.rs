//! Network contracts and reference models.
//!
//! The training engine is generic over two model traits:
//! - `PolicyModel` - action selection plus per-component action distributions
//! - `ValueModel` - scores a list of observations and actions
//!
//! `MlpActor` and `MlpCritic` implement them with plain MLPs.

mod critic;
mod distribution;
mod mlp;

pub use critic::MlpCritic;
pub use distribution::Distribution;
pub use mlp::{ActionHead, Activation, MlpActor, MlpConfig};

use tch::{nn, Tensor};

/// Trait for models that have a VarStore for optimization
pub trait HasVarStore {
    /// Get mutable reference to the VarStore
    fn var_store_mut(&mut self) -> &mut nn::VarStore;

    /// Get reference to the VarStore
    fn var_store(&self) -> &nn::VarStore;
}

/// Trait for differentiable policies
pub trait PolicyModel: HasVarStore + Send {
    /// Raw pre-distribution output (logits), used for regularization
    fn forward(&self, observations: &Tensor) -> Tensor;

    /// One distribution per factored action component
    fn prob_dists(&self, observations: &Tensor) -> Vec<Distribution>;

    /// Sizes of the action components, in order, summing to the action size
    fn action_split(&self) -> Vec<i64>;

    /// Fresh copy with the same structure and independently initialized parameters
    fn clone_architecture(&self) -> Self
    where
        Self: Sized;

    /// Select a batch of actions.
    ///
    /// Exploration uses the reparameterized sampling path so the result stays
    /// differentiable with respect to the policy parameters.
    fn select_action(&self, observations: &Tensor, explore: bool) -> Tensor {
        let components: Vec<Tensor> = self
            .prob_dists(observations)
            .iter()
            .map(|dist| if explore { dist.rsample() } else { dist.mode() })
            .collect();
        Tensor::cat(&components, -1)
    }
}

/// Trait for value models scoring observation-action lists
pub trait ValueModel: HasVarStore + Send {
    /// Estimate per sample, shape `[batch]`
    fn forward(&self, observations: &[Tensor], actions: &[Tensor]) -> Tensor;

    /// Fresh copy with the same structure and independently initialized parameters
    fn clone_architecture(&self) -> Self
    where
        Self: Sized;
}
