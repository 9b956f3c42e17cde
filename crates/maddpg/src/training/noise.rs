//! Peer obfuscation for sampled batches.

use crate::memory::Batch;
use crate::policy::Distribution;
use tch::Tensor;

/// Floor added to recorded action probabilities before resampling.
const PROB_FLOOR: f64 = 1e-20;

/// Noise applied to every peer's entries of a batch.
#[derive(Clone, Copy, Debug, Default)]
pub struct PeerNoise {
    /// Std of additive Gaussian observation noise
    pub sigma: Option<f64>,
    /// Temperature of the relaxed categorical resampling peers' actions
    pub temperature: Option<f64>,
}

impl PeerNoise {
    pub fn is_active(&self) -> bool {
        self.sigma.is_some() || self.temperature.is_some()
    }

    /// Perturb all agents' observations and actions except `own`.
    ///
    /// `splits[i]` gives the component sizes of agent `i`'s action; each
    /// component is resampled from its own relaxed categorical.
    pub fn apply(&self, batch: &mut Batch, own: usize, splits: &[Vec<i64>]) {
        tch::no_grad(|| {
            for i in 0..batch.num_agents() {
                if i == own {
                    continue;
                }
                if let Some(sigma) = self.sigma {
                    let obs = &batch.observations[i];
                    batch.observations[i] = obs + Tensor::randn_like(obs) * sigma;
                }
                if let Some(temperature) = self.temperature {
                    let actions = &batch.actions[i];
                    let components: Vec<Tensor> = match splits.get(i) {
                        Some(split) if split.len() > 1 => {
                            actions.split_with_sizes(split.as_slice(), -1)
                        }
                        _ => vec![actions.shallow_clone()],
                    };
                    let resampled: Vec<Tensor> = components
                        .iter()
                        .map(|probs| {
                            Distribution::relaxed_from_probs(&(probs + PROB_FLOOR), temperature)
                                .rsample()
                        })
                        .collect();
                    batch.actions[i] = Tensor::cat(&resampled, -1);
                }
            }
        });
    }
}
