//! Learned approximations of peers' policies.

use crate::agent::PeerSet;
use crate::checkpoint::{check_network_state, load_network_state, network_state, ModelState};
use crate::memory::Batch;
use crate::policy::{Distribution, HasVarStore, PolicyModel};
use crate::training::{minimize, Adam};
use crate::{MaddpgError, Result};
use std::collections::BTreeMap;
use tch::{Kind, Tensor};

/// Imitation objective over factored action components.
///
/// Each component contributes `mean(log_prob(action)) + entropy_weight * mean(entropy)`;
/// the loss is the negated mean over components. The entropy is that of the
/// underlying categorical.
pub fn imitation_loss(dists: &[Distribution], actions: &[Tensor], entropy_weight: f64) -> Tensor {
    let terms: Vec<Tensor> = dists
        .iter()
        .zip(actions)
        .map(|(dist, action)| {
            let log_prob = dist.log_prob(action).mean(Kind::Float);
            (log_prob + dist.entropy() * entropy_weight).mean(Kind::Float)
        })
        .collect();
    -Tensor::stack(&terms, 0).mean(Kind::Float)
}

/// One opponent model and its optimizer.
pub struct OpponentModel<P: PolicyModel> {
    pub model: P,
    pub optimizer: Adam,
}

/// Opponent models keyed by peer index.
pub struct OpponentModels<P: PolicyModel> {
    entries: BTreeMap<usize, OpponentModel<P>>,
}

impl<P: PolicyModel> OpponentModels<P> {
    /// Fresh models mirroring each peer's policy architecture.
    pub fn from_peers(peers: &PeerSet<'_, P>, lr: f64) -> Self {
        let entries = peers
            .iter()
            .map(|peer| {
                let model = peer.policy.clone_architecture();
                let optimizer = Adam::new(model.var_store(), lr);
                (peer.index, OpponentModel { model, optimizer })
            })
            .collect();
        Self { entries }
    }

    /// Modeled peer indices, ascending
    pub fn indices(&self) -> Vec<usize> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&OpponentModel<P>> {
        self.entries.get(&index)
    }

    /// Fail unless the models cover exactly the peers in `peers`.
    pub fn check_peers(&self, peers: &PeerSet<'_, P>) -> Result<()> {
        let expected: Vec<usize> = peers.iter().map(|p| p.index).collect();
        if self.indices() != expected {
            return Err(MaddpgError::PeerMismatch(format!(
                "opponent models cover {:?}, peers are {:?}",
                self.indices(),
                expected
            )));
        }
        Ok(())
    }

    /// One imitation step per model on its peer's batch entries.
    ///
    /// Returns the loss of each model, in index order.
    pub fn train(
        &mut self,
        batch: &Batch,
        entropy_weight: f64,
        max_grad_norm: f64,
    ) -> Result<Vec<f64>> {
        let mut losses = Vec::with_capacity(self.entries.len());
        for (&idx, entry) in self.entries.iter_mut() {
            let observations = &batch.observations[idx];
            let split = entry.model.action_split();
            let actions = batch.actions[idx].split_with_sizes(split.as_slice(), -1);
            let dists = entry.model.prob_dists(observations);
            let loss = imitation_loss(&dists, &actions, entropy_weight);
            losses.push(minimize(
                &mut entry.optimizer,
                &loss,
                max_grad_norm,
                "opponent model",
            )?);
        }
        Ok(losses)
    }

    /// Mean `KL(peer policy || model)` per action component, per peer.
    pub fn compare(
        &self,
        batch: &Batch,
        peers: &PeerSet<'_, P>,
    ) -> Result<Vec<(usize, Vec<f64>)>> {
        tch::no_grad(|| {
            self.entries
                .iter()
                .map(|(&idx, entry)| {
                    let peer = peers.get(idx)?;
                    let observations = &batch.observations[idx];
                    let modeled = entry.model.prob_dists(observations);
                    let actual = peer.policy.prob_dists(observations);
                    let kls = actual
                        .iter()
                        .zip(modeled.iter())
                        .map(|(a, m)| {
                            a.kl_divergence(m)
                                .map(|kl| kl.mean(Kind::Float).double_value(&[]))
                                .ok_or_else(|| {
                                    MaddpgError::ArchitectureMismatch(format!(
                                        "model of agent {} uses a different distribution family",
                                        idx
                                    ))
                                })
                        })
                        .collect::<Result<Vec<f64>>>()?;
                    Ok((idx, kls))
                })
                .collect()
        })
    }

    /// Sampled next action of peer `index` according to its model.
    pub fn next_action(&self, index: usize, observations: &Tensor) -> Result<Tensor> {
        let entry = self.entries.get(&index).ok_or_else(|| {
            MaddpgError::PeerMismatch(format!("no opponent model for agent {}", index))
        })?;
        Ok(entry.model.select_action(observations, true).detach())
    }

    pub fn export_state(&self) -> Result<ModelState> {
        let mut state = ModelState::default();
        for (&idx, entry) in &self.entries {
            state
                .models
                .insert(idx, network_state(entry.model.var_store())?);
            state.optimizers.insert(idx, entry.optimizer.export_state()?);
        }
        Ok(state)
    }

    /// Check that every saved entry has a live model of the same shape.
    pub fn check_state(&self, state: &ModelState) -> Result<()> {
        let entry = |idx: &usize, what: &str| {
            self.entries.get(idx).ok_or_else(|| {
                MaddpgError::PeerMismatch(format!("saved {} for unknown agent {}", what, idx))
            })
        };
        for (idx, saved) in &state.models {
            check_network_state(entry(idx, "model")?.model.var_store(), saved)?;
        }
        for (idx, saved) in &state.optimizers {
            entry(idx, "optimizer")?.optimizer.check_state(saved)?;
        }
        Ok(())
    }

    pub fn import_state(&mut self, state: &ModelState) -> Result<()> {
        self.check_state(state)?;
        for (idx, saved) in &state.models {
            if let Some(entry) = self.entries.get_mut(idx) {
                load_network_state(entry.model.var_store_mut(), saved)?;
            }
        }
        for (idx, saved) in &state.optimizers {
            if let Some(entry) = self.entries.get_mut(idx) {
                entry.optimizer.import_state(saved)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    fn peaked() -> Distribution {
        Distribution::RelaxedCategorical {
            logits: Tensor::from_slice(&[8.0f32, 0.0, 0.0, 8.0, 0.0, 0.0]).view([2, 3]),
            temperature: 1.0,
        }
    }

    fn recorded() -> Tensor {
        Tensor::from_slice(&[0.9f32, 0.05, 0.05, 0.8, 0.1, 0.1]).view([2, 3])
    }

    #[test]
    fn test_zero_entropy_weight_is_negative_log_likelihood() {
        let dist = peaked();
        let action = recorded();
        let loss = imitation_loss(&[peaked()], &[recorded()], 0.0).double_value(&[]);
        let nll = -dist.log_prob(&action).mean(Kind::Float).double_value(&[]);
        assert!((loss - nll).abs() < 1e-5);
    }

    #[test]
    fn test_entropy_term_grows_with_weight() {
        let base = imitation_loss(&[peaked()], &[recorded()], 0.0).double_value(&[]);
        let small = imitation_loss(&[peaked()], &[recorded()], 1e-3).double_value(&[]);
        let large = imitation_loss(&[peaked()], &[recorded()], 1e-1).double_value(&[]);
        assert!((large - base).abs() > (small - base).abs());
        assert!((small - base).abs() > 0.0);
    }

    #[test]
    fn test_components_are_averaged() {
        let a = imitation_loss(&[peaked()], &[recorded()], 0.0).double_value(&[]);
        let uniform = Distribution::RelaxedCategorical {
            logits: Tensor::zeros([2, 3], (Kind::Float, Device::Cpu)),
            temperature: 1.0,
        };
        let b = imitation_loss(&[uniform], &[recorded()], 0.0).double_value(&[]);
        let uniform = Distribution::RelaxedCategorical {
            logits: Tensor::zeros([2, 3], (Kind::Float, Device::Cpu)),
            temperature: 1.0,
        };
        let both =
            imitation_loss(&[peaked(), uniform], &[recorded(), recorded()], 0.0).double_value(&[]);
        assert!((both - (a + b) / 2.0).abs() < 1e-5);
    }
}
