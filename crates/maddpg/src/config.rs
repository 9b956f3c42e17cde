//! Agent configuration.

use crate::{MaddpgError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tch::Device;

/// Training algorithm selected for an agent.
///
/// Fixed at construction; every other scheme decision derives from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyVariant {
    /// Decentralized critic over the agent's own observation and action.
    Ddpg,
    /// Centralized critic over the joint observation-action.
    Maddpg,
    /// Centralized critic trained against minimax-perturbed peer actions.
    M3ddpg,
    /// Centralized critic bootstrapped from a learned pessimistic reward.
    Rmaddpg,
}

impl PolicyVariant {
    /// Whether the critic scores the joint observation-action.
    pub fn is_centralized(&self) -> bool {
        !matches!(self, PolicyVariant::Ddpg)
    }

    /// Whether a nature actor is required.
    pub fn is_robust(&self) -> bool {
        matches!(self, PolicyVariant::Rmaddpg)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PolicyVariant::Ddpg => "ddpg",
            PolicyVariant::Maddpg => "maddpg",
            PolicyVariant::M3ddpg => "m3ddpg",
            PolicyVariant::Rmaddpg => "rmaddpg",
        }
    }
}

impl fmt::Display for PolicyVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PolicyVariant {
    type Err = MaddpgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ddpg" => Ok(PolicyVariant::Ddpg),
            "maddpg" => Ok(PolicyVariant::Maddpg),
            "m3ddpg" => Ok(PolicyVariant::M3ddpg),
            "rmaddpg" => Ok(PolicyVariant::Rmaddpg),
            other => Err(MaddpgError::InvalidConfig(format!(
                "unknown policy variant '{}'",
                other
            ))),
        }
    }
}

/// Opponent-modeling hyperparameters.
///
/// When present, peers' next actions in the critic target come from this
/// agent's learned models instead of the peers' target policies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelingConfig {
    /// Learning rate of every opponent model
    pub lr: f64,
    /// Weight of the entropy bonus in the imitation objective
    pub entropy_weight: f64,
    /// Restrict modeling batches to the most recent transitions
    pub max_past: Option<usize>,
    /// Modeling-only iterations per update
    pub train_steps: usize,
    /// Batch size of each modeling iteration
    pub batch_size: usize,
}

impl Default for ModelingConfig {
    fn default() -> Self {
        Self {
            lr: 1e-2,
            entropy_weight: 1e-3,
            max_past: None,
            train_steps: 1,
            batch_size: 1024,
        }
    }
}

/// Configuration for a MADDPG agent
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Training algorithm
    pub variant: PolicyVariant,

    // Optimization
    /// Policy learning rate
    pub lr_actor: f64,
    /// Value model learning rate
    pub lr_critic: f64,
    /// Nature actor learning rate (robust variant only)
    pub lr_nature: f64,
    /// Mini-batch size of the main actor/critic step
    pub batch_size: usize,
    /// Gradient norm bound applied to every network update
    pub max_grad_norm: f64,
    /// Weight of the L2 penalty on raw policy outputs
    pub policy_reg: f64,
    /// Weight of the anchoring MSE term in the nature objective
    pub nature_mse_weight: f64,

    // Returns
    /// Soft target update rate
    pub tau: f64,
    /// Discount factor
    pub gamma: f64,

    // Storage
    /// Transition store capacity
    pub memory_size: usize,

    // Minimax perturbation
    /// Perturbation rate against agents on the other side
    pub adv_eps: f64,
    /// Perturbation rate against agents on the same side
    pub adv_eps_s: f64,

    // Opponent modeling
    pub modeling: Option<ModelingConfig>,

    // Peer obfuscation during training
    /// Std of Gaussian noise added to peers' observations
    pub sigma_noise: Option<f64>,
    /// Temperature of the relaxed categorical used to resample peers' actions
    pub temp_noise: Option<f64>,

    /// Seed of the agent's sampling RNG (offset by the agent index)
    pub seed: u64,

    // Device
    /// Device to train on ("cpu" or "cuda")
    #[serde(skip, default = "default_device")]
    pub device: Device,
}

fn default_device() -> Device {
    Device::Cpu
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            variant: PolicyVariant::Maddpg,

            lr_actor: 1e-2,
            lr_critic: 1e-2,
            lr_nature: 1e-2,
            batch_size: 1024,
            max_grad_norm: 0.5,
            policy_reg: 1e-3,
            nature_mse_weight: 1.0,

            tau: 0.01,
            gamma: 0.95,

            memory_size: 1_000_000,

            adv_eps: 1e-3,
            adv_eps_s: 1e-5,

            modeling: None,

            sigma_noise: None,
            temp_noise: None,

            seed: 42,
            device: Device::Cpu,
        }
    }
}

impl AgentConfig {
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_variant(mut self, variant: PolicyVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Set actor and critic learning rates
    pub fn with_lr(mut self, lr_actor: f64, lr_critic: f64) -> Self {
        self.lr_actor = lr_actor;
        self.lr_critic = lr_critic;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_memory_size(mut self, memory_size: usize) -> Self {
        self.memory_size = memory_size;
        self
    }

    pub fn with_tau(mut self, tau: f64) -> Self {
        self.tau = tau;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set the minimax perturbation rates
    pub fn with_adversarial_eps(mut self, adv_eps: f64, adv_eps_s: f64) -> Self {
        self.adv_eps = adv_eps;
        self.adv_eps_s = adv_eps_s;
        self
    }

    pub fn with_modeling(mut self, modeling: ModelingConfig) -> Self {
        self.modeling = Some(modeling);
        self
    }

    /// Set peer observation and action noise
    pub fn with_noise(mut self, sigma: Option<f64>, temperature: Option<f64>) -> Self {
        self.sigma_noise = sigma;
        self.temp_noise = temperature;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Whether peers are obfuscated before training
    pub fn obfuscates_peers(&self) -> bool {
        self.sigma_noise.is_some() || self.temp_noise.is_some()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(MaddpgError::InvalidConfig(msg.to_string()));

        if self.lr_actor <= 0.0 || self.lr_critic <= 0.0 {
            return invalid("learning rates must be positive");
        }
        if self.variant.is_robust() && self.lr_nature <= 0.0 {
            return invalid("lr_nature must be positive");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be positive");
        }
        if self.memory_size < self.batch_size {
            return invalid("memory_size must hold at least one batch");
        }
        if self.max_grad_norm <= 0.0 {
            return invalid("max_grad_norm must be positive");
        }
        if !(self.tau > 0.0 && self.tau <= 1.0) {
            return invalid("tau must be in (0, 1]");
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return invalid("gamma must be in [0, 1]");
        }
        if self.adv_eps < 0.0 || self.adv_eps_s < 0.0 {
            return invalid("perturbation rates must be non-negative");
        }
        if matches!(self.sigma_noise, Some(s) if s < 0.0) {
            return invalid("sigma_noise must be non-negative");
        }
        if matches!(self.temp_noise, Some(t) if t <= 0.0) {
            return invalid("temp_noise must be positive");
        }
        if let Some(modeling) = &self.modeling {
            if !self.variant.is_centralized() {
                return invalid("opponent models require a centralized critic");
            }
            if modeling.lr <= 0.0 {
                return invalid("modeling lr must be positive");
            }
            if modeling.entropy_weight < 0.0 {
                return invalid("entropy_weight must be non-negative");
            }
            if modeling.train_steps == 0 || modeling.batch_size == 0 {
                return invalid("modeling train_steps and batch_size must be positive");
            }
            if matches!(modeling.max_past, Some(p) if p < modeling.batch_size) {
                return invalid("max_past must cover a modeling batch");
            }
        }
        Ok(())
    }
}
