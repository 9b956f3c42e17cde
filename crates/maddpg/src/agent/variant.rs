//! Per-variant training schemes.
//!
//! Each `PolicyVariant` maps to one `TrainingScheme`. The scheme decides
//! which agents the critic sees, how scored joint actions are adjusted,
//! which reward is bootstrapped, and owns any extra networks.

use super::nature::NatureActor;
use crate::checkpoint::AgentState;
use crate::config::{AgentConfig, PolicyVariant};
use crate::memory::Batch;
use crate::policy::ValueModel;
use crate::training::{minimax_actions, perturb_rate};
use crate::{MaddpgError, Result};
use tch::Tensor;

/// Variant-specific hooks of the actor/critic update.
pub trait TrainingScheme<V: ValueModel>: Send {
    fn variant(&self) -> PolicyVariant;

    /// Agent indices whose observations and actions the critic scores, in order
    fn critic_view(&self, _own: usize, num_agents: usize) -> Vec<usize> {
        (0..num_agents).collect()
    }

    /// Adjust a joint action before `critic` scores it; `own` is a position
    /// in the critic view.
    fn score_actions(
        &self,
        _critic: &V,
        _observations: &[Tensor],
        actions: Vec<Tensor>,
        _own: usize,
    ) -> Result<Vec<Tensor>> {
        Ok(actions)
    }

    /// Reward used in the bootstrap target, `[batch]`
    fn bootstrap_reward(&self, batch: &Batch, own: usize) -> Tensor {
        batch.rewards[own].shallow_clone()
    }

    /// Train any auxiliary network after the actor step
    fn train_auxiliary(
        &mut self,
        _batch: &Batch,
        _own: usize,
        _max_grad_norm: f64,
    ) -> Result<Option<f64>> {
        Ok(None)
    }

    fn sync_targets(&mut self, _tau: f64) -> Result<()> {
        Ok(())
    }

    fn export_into(&self, _state: &mut AgentState) -> Result<()> {
        Ok(())
    }

    /// Check the scheme's own entries of `state` without loading them
    fn check_state(&self, _state: &AgentState) -> Result<()> {
        Ok(())
    }

    fn import_from(&mut self, _state: &AgentState) -> Result<()> {
        Ok(())
    }
}

/// Local critic over the agent's own observation and action.
pub struct Decentralized;

impl<V: ValueModel> TrainingScheme<V> for Decentralized {
    fn variant(&self) -> PolicyVariant {
        PolicyVariant::Ddpg
    }

    fn critic_view(&self, own: usize, _num_agents: usize) -> Vec<usize> {
        vec![own]
    }
}

/// Joint critic scoring recorded peer behavior.
pub struct Centralized;

impl<V: ValueModel> TrainingScheme<V> for Centralized {
    fn variant(&self) -> PolicyVariant {
        PolicyVariant::Maddpg
    }
}

/// Joint critic scored against worst-case perturbed peer actions.
pub struct Minimax {
    rates: Vec<f64>,
}

impl Minimax {
    pub fn new(rates: Vec<f64>) -> Self {
        Self { rates }
    }
}

impl<V: ValueModel> TrainingScheme<V> for Minimax {
    fn variant(&self) -> PolicyVariant {
        PolicyVariant::M3ddpg
    }

    fn score_actions(
        &self,
        critic: &V,
        observations: &[Tensor],
        actions: Vec<Tensor>,
        own: usize,
    ) -> Result<Vec<Tensor>> {
        minimax_actions(critic, observations, &actions, &self.rates, own)
    }
}

/// Joint critic bootstrapped from a learned pessimistic reward.
pub struct Robust<V: ValueModel> {
    nature: NatureActor<V>,
}

impl<V: ValueModel> TrainingScheme<V> for Robust<V> {
    fn variant(&self) -> PolicyVariant {
        PolicyVariant::Rmaddpg
    }

    fn bootstrap_reward(&self, batch: &Batch, _own: usize) -> Tensor {
        self.nature
            .target_reward(&batch.observations, &batch.actions)
    }

    fn train_auxiliary(
        &mut self,
        batch: &Batch,
        own: usize,
        max_grad_norm: f64,
    ) -> Result<Option<f64>> {
        self.nature.train(batch, own, max_grad_norm).map(Some)
    }

    fn sync_targets(&mut self, tau: f64) -> Result<()> {
        self.nature.sync(tau)
    }

    fn export_into(&self, state: &mut AgentState) -> Result<()> {
        self.nature.export_into(state)
    }

    fn check_state(&self, state: &AgentState) -> Result<()> {
        self.nature.check_state(state)
    }

    fn import_from(&mut self, state: &AgentState) -> Result<()> {
        self.nature.import_from(state)
    }
}

/// Build the scheme of `config.variant` for agent `index`.
pub fn build_scheme<V: ValueModel + 'static>(
    config: &AgentConfig,
    index: usize,
    num_agents: usize,
    num_adversaries: usize,
    nature: Option<V>,
) -> Result<Box<dyn TrainingScheme<V>>> {
    match (config.variant, nature) {
        (PolicyVariant::Rmaddpg, None) => Err(MaddpgError::MissingNatureActor),
        (PolicyVariant::Rmaddpg, Some(model)) => Ok(Box::new(Robust {
            nature: NatureActor::new(model, config.lr_nature, config.nature_mse_weight)?,
        })),
        (_, Some(_)) => Err(MaddpgError::UnexpectedNatureActor),
        (PolicyVariant::Ddpg, None) => Ok(Box::new(Decentralized)),
        (PolicyVariant::Maddpg, None) => Ok(Box::new(Centralized)),
        (PolicyVariant::M3ddpg, None) => Ok(Box::new(Minimax::new(perturb_rate(
            index,
            num_agents,
            num_adversaries,
            config.adv_eps,
            config.adv_eps_s,
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{MlpConfig, MlpCritic};
    use tch::Device;

    fn critic() -> MlpCritic {
        MlpCritic::new(&[2, 2], &[2, 2], MlpConfig::default(), Device::Cpu)
    }

    #[test]
    fn test_scheme_selection() {
        let config = AgentConfig::default();
        for (variant, view) in [
            (PolicyVariant::Ddpg, vec![1]),
            (PolicyVariant::Maddpg, vec![0, 1]),
            (PolicyVariant::M3ddpg, vec![0, 1]),
        ] {
            let scheme =
                build_scheme::<MlpCritic>(&config.clone().with_variant(variant), 1, 2, 0, None)
                    .unwrap();
            assert_eq!(scheme.variant(), variant);
            assert_eq!(scheme.critic_view(1, 2), view);
        }

        let robust = build_scheme(
            &config.clone().with_variant(PolicyVariant::Rmaddpg),
            0,
            2,
            0,
            Some(critic()),
        )
        .unwrap();
        assert_eq!(robust.variant(), PolicyVariant::Rmaddpg);
    }

    #[test]
    fn test_nature_actor_requirements() {
        let config = AgentConfig::default();
        let missing = build_scheme::<MlpCritic>(
            &config.clone().with_variant(PolicyVariant::Rmaddpg),
            0,
            2,
            0,
            None,
        );
        assert!(matches!(missing, Err(MaddpgError::MissingNatureActor)));

        let unexpected = build_scheme(&config, 0, 2, 0, Some(critic()));
        assert!(matches!(unexpected, Err(MaddpgError::UnexpectedNatureActor)));
    }
}
