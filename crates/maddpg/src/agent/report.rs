//! Losses and diagnostics of one update.

use std::collections::HashMap;

/// Result of `MaddpgAgent::update`.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateReport {
    pub actor_loss: f64,
    pub critic_loss: f64,
    /// Nature actor loss, robust variant only
    pub nature_loss: Option<f64>,
    /// Mean opponent-model loss over all modeling steps and peers
    pub model_loss: Option<f64>,
    /// Per peer, mean KL from the peer's policy to its model, per action component
    pub model_kls: Option<Vec<(usize, Vec<f64>)>>,
}

impl UpdateReport {
    /// Flat metric map, KL values averaged over components
    pub fn metrics(&self) -> HashMap<String, f64> {
        let mut metrics = HashMap::new();
        metrics.insert("actor_loss".to_string(), self.actor_loss);
        metrics.insert("critic_loss".to_string(), self.critic_loss);
        if let Some(loss) = self.nature_loss {
            metrics.insert("nature_loss".to_string(), loss);
        }
        if let Some(loss) = self.model_loss {
            metrics.insert("model_loss".to_string(), loss);
        }
        for (peer, kls) in self.model_kls.iter().flatten() {
            if !kls.is_empty() {
                let mean = kls.iter().sum::<f64>() / kls.len() as f64;
                metrics.insert(format!("model_kl_{}", peer), mean);
            }
        }
        metrics
    }

    pub fn is_finite(&self) -> bool {
        self.metrics().values().all(|v| v.is_finite())
    }
}
