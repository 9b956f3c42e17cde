//! Observation-action value network.

use super::mlp::build_encoder;
use super::{HasVarStore, MlpConfig, ValueModel};
use tch::{nn, nn::Module, Device, Tensor};

/// MLP over the concatenation of all observations followed by all actions.
///
/// Serves as critic (local or centralized) and as the nature actor.
pub struct MlpCritic {
    vs: nn::VarStore,
    net: nn::Sequential,
    obs_sizes: Vec<i64>,
    action_sizes: Vec<i64>,
    config: MlpConfig,
    device: Device,
}

impl MlpCritic {
    pub fn new(obs_sizes: &[i64], action_sizes: &[i64], config: MlpConfig, device: Device) -> Self {
        let vs = nn::VarStore::new(device);
        let root = vs.root();
        let input_size = obs_sizes.iter().sum::<i64>() + action_sizes.iter().sum::<i64>();

        let (encoder, hidden) = build_encoder(&root, input_size, &config, "fc");
        let net = encoder.add(nn::linear(&root / "out", hidden, 1, Default::default()));

        Self {
            vs,
            net,
            obs_sizes: obs_sizes.to_vec(),
            action_sizes: action_sizes.to_vec(),
            config,
            device,
        }
    }

    /// Number of observation-action pairs scored together
    pub fn num_inputs(&self) -> usize {
        self.obs_sizes.len()
    }
}

impl HasVarStore for MlpCritic {
    fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }

    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}

impl ValueModel for MlpCritic {
    fn forward(&self, observations: &[Tensor], actions: &[Tensor]) -> Tensor {
        let inputs: Vec<Tensor> = observations
            .iter()
            .chain(actions.iter())
            .map(|t| t.to_device(self.device))
            .collect();
        self.net.forward(&Tensor::cat(&inputs, -1)).squeeze_dim(-1)
    }

    fn clone_architecture(&self) -> Self {
        Self::new(
            &self.obs_sizes,
            &self.action_sizes,
            self.config.clone(),
            self.device,
        )
    }
}
