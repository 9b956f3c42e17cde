//! Multi-layer perceptron actor.

use super::{Distribution, HasVarStore, PolicyModel};
use tch::{nn, nn::Module, Device, Tensor};

/// Configuration for MLP networks
#[derive(Clone, Debug)]
pub struct MlpConfig {
    /// Hidden layer size
    pub hidden_size: i64,
    /// Number of hidden layers
    pub num_layers: usize,
    /// Activation function
    pub activation: Activation,
}

#[derive(Clone, Debug, Copy)]
pub enum Activation {
    ReLU,
    Tanh,
    Gelu,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_size: 64,
            num_layers: 2,
            activation: Activation::ReLU,
        }
    }
}

/// Shape of the action an actor emits
#[derive(Clone, Debug)]
pub enum ActionHead {
    /// Factored discrete action, one relaxed one-hot block per component
    Discrete { split: Vec<i64>, temperature: f64 },
    /// Real-valued action of the given size
    Continuous { dim: i64 },
}

impl ActionHead {
    /// Width of the action vector
    pub fn action_size(&self) -> i64 {
        match self {
            ActionHead::Discrete { split, .. } => split.iter().sum(),
            ActionHead::Continuous { dim } => *dim,
        }
    }

    fn output_size(&self) -> i64 {
        match self {
            ActionHead::Discrete { .. } => self.action_size(),
            // Mean and log_std
            ActionHead::Continuous { dim } => dim * 2,
        }
    }
}

/// Build a hidden stack, returning it with its output width.
pub(crate) fn build_encoder(
    root: &nn::Path,
    in_size: i64,
    config: &MlpConfig,
    prefix: &str,
) -> (nn::Sequential, i64) {
    let mut encoder = nn::seq();
    let mut in_size = in_size;

    for i in 0..config.num_layers {
        let layer = nn::linear(
            root / format!("{}_{}", prefix, i),
            in_size,
            config.hidden_size,
            Default::default(),
        );
        encoder = encoder.add(layer);

        match config.activation {
            Activation::ReLU => encoder = encoder.add_fn(|x| x.relu()),
            Activation::Tanh => encoder = encoder.add_fn(|x| x.tanh()),
            Activation::Gelu => encoder = encoder.add_fn(|x| x.gelu("none")),
        }

        in_size = config.hidden_size;
    }

    (encoder, in_size)
}

/// Multi-layer perceptron actor
pub struct MlpActor {
    /// Variable store for parameters
    vs: nn::VarStore,
    /// Encoder network
    encoder: nn::Sequential,
    /// Action head
    head: nn::Linear,
    obs_size: i64,
    action: ActionHead,
    config: MlpConfig,
    device: Device,
}

impl MlpActor {
    /// Create a new MLP actor
    pub fn new(obs_size: i64, action: ActionHead, config: MlpConfig, device: Device) -> Self {
        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let (encoder, hidden) = build_encoder(&root, obs_size, &config, "encoder");
        let head = nn::linear(
            &root / "head",
            hidden,
            action.output_size(),
            Default::default(),
        );

        Self::init_head(&vs);

        Self {
            vs,
            encoder,
            head,
            obs_size,
            action,
            config,
            device,
        }
    }

    /// Actor over a factored discrete action with unit relaxation temperature
    pub fn discrete(obs_size: i64, split: &[i64], config: MlpConfig, device: Device) -> Self {
        Self::new(
            obs_size,
            ActionHead::Discrete {
                split: split.to_vec(),
                temperature: 1.0,
            },
            config,
            device,
        )
    }

    /// Actor over a real-valued action
    pub fn continuous(obs_size: i64, dim: i64, config: MlpConfig, device: Device) -> Self {
        Self::new(obs_size, ActionHead::Continuous { dim }, config, device)
    }

    /// Start the head near zero so early policies are close to uniform
    fn init_head(vs: &nn::VarStore) {
        for (name, mut var) in vs.variables() {
            if !name.starts_with("head") {
                continue;
            }
            if name.contains("weight") {
                tch::no_grad(|| {
                    var.copy_(&(Tensor::randn_like(&var) * 0.01));
                });
            } else if name.contains("bias") {
                tch::no_grad(|| {
                    let _ = var.zero_();
                });
            }
        }
    }

    pub fn obs_size(&self) -> i64 {
        self.obs_size
    }

    pub fn action_head(&self) -> &ActionHead {
        &self.action
    }

    /// Get the number of parameters
    pub fn num_parameters(&self) -> i64 {
        self.vs.variables().values().map(|v| v.numel() as i64).sum()
    }
}

impl HasVarStore for MlpActor {
    fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }

    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}

impl PolicyModel for MlpActor {
    fn forward(&self, observations: &Tensor) -> Tensor {
        let obs = observations.to_device(self.device);
        let hidden = self.encoder.forward(&obs);
        self.head.forward(&hidden)
    }

    fn prob_dists(&self, observations: &Tensor) -> Vec<Distribution> {
        let out = PolicyModel::forward(self, observations);
        match &self.action {
            ActionHead::Discrete { split, temperature } => out
                .split_with_sizes(split.as_slice(), -1)
                .into_iter()
                .map(|logits| Distribution::RelaxedCategorical {
                    logits,
                    temperature: *temperature,
                })
                .collect(),
            ActionHead::Continuous { .. } => {
                let mean_logstd = out.chunk(2, -1);
                let mean = mean_logstd[0].shallow_clone();
                // log_std clamped for stability
                let log_std = mean_logstd[1].clamp(-20.0, 2.0);
                vec![Distribution::Gaussian {
                    mean,
                    std: log_std.exp(),
                }]
            }
        }
    }

    fn action_split(&self) -> Vec<i64> {
        match &self.action {
            ActionHead::Discrete { split, .. } => split.clone(),
            ActionHead::Continuous { dim } => vec![*dim],
        }
    }

    fn clone_architecture(&self) -> Self {
        Self::new(
            self.obs_size,
            self.action.clone(),
            self.config.clone(),
            self.device,
        )
    }
}
