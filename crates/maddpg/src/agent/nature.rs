//! Pessimistic reward model of the robust variant.

use crate::checkpoint::{check_network_state, load_network_state, AgentState};
use crate::memory::Batch;
use crate::policy::{HasVarStore, ValueModel};
use crate::training::{make_target, minimize, soft_update, Adam};
use crate::Result;
use tch::{Kind, Reduction, Tensor};

/// Learned reward over the joint observation-action.
///
/// Trained to minimize `mean(prediction) + mse_weight * MSE(prediction, reward)`:
/// low rewards are preferred, anchored to the recorded ones. The target copy
/// supplies the critic's bootstrap reward.
pub struct NatureActor<V: ValueModel> {
    model: V,
    target: V,
    optimizer: Adam,
    mse_weight: f64,
}

impl<V: ValueModel> NatureActor<V> {
    pub fn new(model: V, lr: f64, mse_weight: f64) -> Result<Self> {
        let target = make_target(&model, model.clone_architecture())?;
        let optimizer = Adam::new(model.var_store(), lr);
        Ok(Self {
            model,
            target,
            optimizer,
            mse_weight,
        })
    }

    /// Reward estimate of the target copy, detached
    pub fn target_reward(&self, observations: &[Tensor], actions: &[Tensor]) -> Tensor {
        tch::no_grad(|| self.target.forward(observations, actions))
    }

    /// One clipped step against agent `own`'s recorded rewards.
    pub fn train(&mut self, batch: &Batch, own: usize, max_grad_norm: f64) -> Result<f64> {
        let predicted = self.model.forward(&batch.observations, &batch.actions);
        let anchor = predicted.mse_loss(&batch.rewards[own], Reduction::Mean);
        let loss = predicted.mean(Kind::Float) + anchor * self.mse_weight;
        minimize(&mut self.optimizer, &loss, max_grad_norm, "nature actor")
    }

    pub fn sync(&mut self, tau: f64) -> Result<()> {
        soft_update(self.target.var_store_mut(), self.model.var_store(), tau)
    }

    pub fn export_into(&self, state: &mut AgentState) -> Result<()> {
        state.insert_network("nature_actor", self.model.var_store())?;
        state.insert_network("nature_actor_target", self.target.var_store())?;
        state.insert_optimizer("nature_actor_optim", self.optimizer.export_state()?);
        Ok(())
    }

    pub fn check_state(&self, state: &AgentState) -> Result<()> {
        check_network_state(self.model.var_store(), state.network("nature_actor")?)?;
        check_network_state(self.target.var_store(), state.network("nature_actor_target")?)?;
        self.optimizer
            .check_state(state.optimizer("nature_actor_optim")?)
    }

    pub fn import_from(&mut self, state: &AgentState) -> Result<()> {
        self.check_state(state)?;
        load_network_state(self.model.var_store_mut(), state.network("nature_actor")?)?;
        load_network_state(
            self.target.var_store_mut(),
            state.network("nature_actor_target")?,
        )?;
        self.optimizer
            .import_state(state.optimizer("nature_actor_optim")?)
    }
}
