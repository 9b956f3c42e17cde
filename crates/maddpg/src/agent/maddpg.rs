//! Per-agent actor/critic training engine.

use super::peers::{PeerSet, PeerView};
use super::report::UpdateReport;
use super::variant::{build_scheme, TrainingScheme};
use crate::checkpoint::{check_network_state, load_network_state, AgentState, Checkpointable};
use crate::config::{AgentConfig, PolicyVariant};
use crate::memory::{Batch, TransitionStore};
use crate::modeling::OpponentModels;
use crate::policy::{HasVarStore, PolicyModel, ValueModel};
use crate::training::{make_target, minimize, perturb_rate, soft_update, Adam, PeerNoise};
use crate::utils::agent_rng;
use crate::{MaddpgError, Result};
use rand::rngs::StdRng;
use tch::{Device, Kind, Reduction, Tensor};

/// Diagnostics of one opponent-modeling phase: mean loss and per-peer KLs.
type ModelingOutcome = (f64, Vec<(usize, Vec<f64>)>);

/// One agent of a MADDPG-family population.
///
/// Owns its policy, value model, their frozen targets and optimizers, its
/// transition store and, with opponent modeling, one model per peer.
pub struct MaddpgAgent<P: PolicyModel, V: ValueModel> {
    index: usize,
    name: String,
    num_agents: usize,
    num_adversaries: usize,

    actor: P,
    actor_target: P,
    actor_optim: Adam,

    critic: V,
    critic_target: V,
    critic_optim: Adam,

    scheme: Box<dyn TrainingScheme<V>>,
    models: Option<OpponentModels<P>>,

    memory: TransitionStore,
    rng: StdRng,
    config: AgentConfig,
}

impl<P: PolicyModel, V: ValueModel + 'static> MaddpgAgent<P, V> {
    /// Create an agent.
    ///
    /// Agents `0..num_adversaries` are adversaries. `nature` is required by
    /// the robust variant and rejected by every other one.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: usize,
        name: impl Into<String>,
        num_agents: usize,
        num_adversaries: usize,
        actor: P,
        critic: V,
        nature: Option<V>,
        config: AgentConfig,
    ) -> Result<Self> {
        config.validate()?;
        if index >= num_agents {
            return Err(MaddpgError::InvalidConfig(format!(
                "agent index {} out of range for {} agents",
                index, num_agents
            )));
        }
        if num_adversaries > num_agents {
            return Err(MaddpgError::InvalidConfig(format!(
                "{} adversaries among {} agents",
                num_adversaries, num_agents
            )));
        }

        let scheme = build_scheme(&config, index, num_agents, num_adversaries, nature)?;
        let actor_target = make_target(&actor, actor.clone_architecture())?;
        let critic_target = make_target(&critic, critic.clone_architecture())?;
        let actor_optim = Adam::new(actor.var_store(), config.lr_actor);
        let critic_optim = Adam::new(critic.var_store(), config.lr_critic);

        Ok(Self {
            index,
            name: name.into(),
            num_agents,
            num_adversaries,
            actor,
            actor_target,
            actor_optim,
            critic,
            critic_target,
            critic_optim,
            scheme,
            models: None,
            memory: TransitionStore::new(config.memory_size),
            rng: agent_rng(config.seed, index),
            config,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_agents(&self) -> usize {
        self.num_agents
    }

    pub fn num_adversaries(&self) -> usize {
        self.num_adversaries
    }

    pub fn variant(&self) -> PolicyVariant {
        self.scheme.variant()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn actor(&self) -> &P {
        &self.actor
    }

    pub fn actor_target(&self) -> &P {
        &self.actor_target
    }

    pub fn critic(&self) -> &V {
        &self.critic
    }

    pub fn critic_target(&self) -> &V {
        &self.critic_target
    }

    pub fn memory(&self) -> &TransitionStore {
        &self.memory
    }

    pub fn opponent_models(&self) -> Option<&OpponentModels<P>> {
        self.models.as_ref()
    }

    /// Read-only view handed to peers during their updates
    pub fn view(&self) -> PeerView<'_, P> {
        PeerView {
            index: self.index,
            policy: &self.actor,
            target_policy: &self.actor_target,
            store: &self.memory,
        }
    }

    /// Action for a single observation from the live policy.
    pub fn act(&self, observation: &[f32], explore: bool) -> Result<Vec<f32>> {
        let obs = Tensor::from_slice(observation)
            .to_device(self.config.device)
            .unsqueeze(0);
        let action = self.act_batch(&obs, explore);
        Ok(Vec::<f32>::try_from(
            &action.to_device(Device::Cpu).to_kind(Kind::Float).reshape([-1]),
        )?)
    }

    /// Actions for a batch of observations, detached.
    pub fn act_batch(&self, observations: &Tensor, explore: bool) -> Tensor {
        tch::no_grad(|| self.actor.select_action(observations, explore))
    }

    /// Append one transition to this agent's store.
    pub fn experience(
        &mut self,
        episode: i64,
        observation: &[f32],
        action: &[f32],
        reward: f32,
        next_observation: &[f32],
        done: bool,
    ) -> Result<()> {
        self.memory
            .add(episode, observation, action, reward, next_observation, done)
    }

    /// Perturbation rate against each agent, by index
    pub fn perturb_rate(&self) -> Vec<f64> {
        perturb_rate(
            self.index,
            self.num_agents,
            self.num_adversaries,
            self.config.adv_eps,
            self.config.adv_eps_s,
        )
    }

    /// Create one opponent model per peer, mirroring the peer's policy.
    ///
    /// Does nothing unless opponent modeling is configured.
    pub fn init_agent_models(&mut self, peers: &[PeerView<'_, P>]) -> Result<()> {
        let Some(modeling) = &self.config.modeling else {
            return Ok(());
        };
        let peers = PeerSet::new(self.index, self.num_agents, peers)?;
        let models = OpponentModels::from_peers(&peers, modeling.lr);
        tracing::info!(
            agent = %self.name,
            peers = ?models.indices(),
            "initialized opponent models"
        );
        self.models = Some(models);
        Ok(())
    }

    fn check_batch(&self, batch: &Batch) -> Result<()> {
        if batch.num_agents() != self.num_agents {
            return Err(MaddpgError::PeerMismatch(format!(
                "batch covers {} agents, expected {}",
                batch.num_agents(),
                self.num_agents
            )));
        }
        Ok(())
    }

    /// Draw a batch from every store, obfuscating peers when configured.
    fn sample(
        &mut self,
        peers: &PeerSet<'_, P>,
        batch_size: usize,
        max_past: Option<usize>,
    ) -> Result<Batch> {
        let stores = peers.stores(&self.memory);
        let mut batch = TransitionStore::sample_transitions_from(
            &stores,
            batch_size,
            max_past,
            &mut self.rng,
            self.config.device,
        )?;
        self.add_noise(&mut batch, peers);
        Ok(batch)
    }

    /// Perturb every peer's observations and actions in `batch`.
    pub fn add_noise(&self, batch: &mut Batch, peers: &PeerSet<'_, P>) {
        let noise = PeerNoise {
            sigma: self.config.sigma_noise,
            temperature: self.config.temp_noise,
        };
        if noise.is_active() {
            let splits = peers.action_splits(self.actor.action_split());
            noise.apply(batch, self.index, &splits);
        }
    }

    /// Position of this agent in the critic's view, with the view itself.
    fn critic_view(&self) -> (Vec<usize>, usize) {
        let view = self.scheme.critic_view(self.index, self.num_agents);
        let own = view.iter().position(|&i| i == self.index).unwrap_or(0);
        (view, own)
    }

    /// One TD step of the value model on `batch`.
    pub fn train_critic(&mut self, batch: &Batch, peers: &PeerSet<'_, P>) -> Result<f64> {
        self.check_batch(batch)?;
        let own = self.index;
        let (view, own_pos) = self.critic_view();

        let next_actions = tch::no_grad(|| {
            view.iter()
                .map(|&i| {
                    let next_obs = &batch.next_observations[i];
                    if i == own {
                        Ok(self.actor_target.select_action(next_obs, true))
                    } else if let Some(models) = &self.models {
                        models.next_action(i, next_obs)
                    } else {
                        Ok(peers.get(i)?.target_policy.select_action(next_obs, true))
                    }
                })
                .collect::<Result<Vec<Tensor>>>()
        })?;

        let next_obs: Vec<Tensor> = view
            .iter()
            .map(|&i| batch.next_observations[i].shallow_clone())
            .collect();
        let next_actions = self.scheme.score_actions(
            &self.critic_target,
            &next_obs,
            next_actions,
            own_pos,
        )?;
        let next_value = tch::no_grad(|| self.critic_target.forward(&next_obs, &next_actions));

        let reward = self.scheme.bootstrap_reward(batch, own);
        let target =
            (reward + (1.0f64 - &batch.dones[own]) * self.config.gamma * next_value).detach();

        let obs: Vec<Tensor> = view
            .iter()
            .map(|&i| batch.observations[i].shallow_clone())
            .collect();
        let actions: Vec<Tensor> = view
            .iter()
            .map(|&i| batch.actions[i].shallow_clone())
            .collect();
        let loss = self
            .critic
            .forward(&obs, &actions)
            .mse_loss(&target, Reduction::Mean);
        minimize(
            &mut self.critic_optim,
            &loss,
            self.config.max_grad_norm,
            "critic",
        )
    }

    /// One policy-gradient step on `batch`, then the auxiliary network step.
    ///
    /// Returns the policy loss and, for the robust variant, the nature loss.
    pub fn train_actor(&mut self, batch: &Batch) -> Result<(f64, Option<f64>)> {
        self.check_batch(batch)?;
        let own = self.index;
        let (view, own_pos) = self.critic_view();

        let own_obs = &batch.observations[own];
        let fresh = self.actor.select_action(own_obs, true);

        let obs: Vec<Tensor> = view
            .iter()
            .map(|&i| batch.observations[i].shallow_clone())
            .collect();
        let actions: Vec<Tensor> = view
            .iter()
            .map(|&i| {
                if i == own {
                    fresh.shallow_clone()
                } else {
                    batch.actions[i].shallow_clone()
                }
            })
            .collect();
        let actions = self
            .scheme
            .score_actions(&self.critic, &obs, actions, own_pos)?;

        let score = self.critic.forward(&obs, &actions).mean(Kind::Float);
        let reg = self
            .actor
            .forward(own_obs)
            .pow_tensor_scalar(2.0)
            .mean(Kind::Float);
        let loss = -score + reg * self.config.policy_reg;
        let actor_loss = minimize(
            &mut self.actor_optim,
            &loss,
            self.config.max_grad_norm,
            "actor",
        )?;

        let aux_loss = self
            .scheme
            .train_auxiliary(batch, own, self.config.max_grad_norm)?;
        Ok((actor_loss, aux_loss))
    }

    fn models_mut(&mut self) -> Result<&mut OpponentModels<P>> {
        self.models.as_mut().ok_or_else(uninitialized_models)
    }

    /// One imitation step of every opponent model; returns each model's loss.
    pub fn train_models(&mut self, batch: &Batch) -> Result<Vec<f64>> {
        self.check_batch(batch)?;
        let entropy_weight = self
            .config
            .modeling
            .as_ref()
            .map_or(0.0, |m| m.entropy_weight);
        let max_grad_norm = self.config.max_grad_norm;
        self.models_mut()?
            .train(batch, entropy_weight, max_grad_norm)
    }

    /// Fidelity of each opponent model against its peer's live policy.
    pub fn compare_models(
        &self,
        batch: &Batch,
        peers: &PeerSet<'_, P>,
    ) -> Result<Vec<(usize, Vec<f64>)>> {
        self.check_batch(batch)?;
        match &self.models {
            Some(models) => models.compare(batch, peers),
            None => Err(MaddpgError::PeerMismatch(
                "opponent models have not been initialized".to_string(),
            )),
        }
    }

    fn run_modeling(&mut self, peers: &PeerSet<'_, P>) -> Result<Option<ModelingOutcome>> {
        let Some(modeling) = self.config.modeling.clone() else {
            return Ok(None);
        };
        self.models_mut()?.check_peers(peers)?;

        let mut losses = Vec::new();
        let mut last = None;
        for _ in 0..modeling.train_steps {
            let batch = self.sample(peers, modeling.batch_size, modeling.max_past)?;
            losses.extend(self.train_models(&batch)?);
            last = Some(batch);
        }

        // Diagnostics use the final modeling batch only.
        let kls = match &last {
            Some(batch) => self.compare_models(batch, peers)?,
            None => Vec::new(),
        };
        let mean = losses.iter().sum::<f64>() / losses.len().max(1) as f64;
        Ok(Some((mean, kls)))
    }

    /// Soft-update every target network toward its live network.
    pub fn sync_targets(&mut self) -> Result<()> {
        let tau = self.config.tau;
        soft_update(self.actor_target.var_store_mut(), self.actor.var_store(), tau)?;
        soft_update(
            self.critic_target.var_store_mut(),
            self.critic.var_store(),
            tau,
        )?;
        self.scheme.sync_targets(tau)
    }

    /// Critic step, actor step, then target sync on a given batch.
    pub fn update_with_batch(
        &mut self,
        batch: &Batch,
        peers: &PeerSet<'_, P>,
    ) -> Result<UpdateReport> {
        let critic_loss = self.train_critic(batch, peers)?;
        let (actor_loss, nature_loss) = self.train_actor(batch)?;
        self.sync_targets()?;
        Ok(UpdateReport {
            actor_loss,
            critic_loss,
            nature_loss,
            model_loss: None,
            model_kls: None,
        })
    }

    /// Full training step against the given peers.
    ///
    /// Runs the opponent-modeling phase when configured, then samples one
    /// batch for the critic and actor steps and syncs the targets.
    pub fn update(&mut self, peers: &[PeerView<'_, P>]) -> Result<UpdateReport> {
        let peers = PeerSet::new(self.index, self.num_agents, peers)?;
        let modeling = self.run_modeling(&peers)?;

        let batch = self.sample(&peers, self.config.batch_size, None)?;
        let mut report = self.update_with_batch(&batch, &peers)?;
        if let Some((loss, kls)) = modeling {
            report.model_loss = Some(loss);
            report.model_kls = Some(kls);
        }

        tracing::debug!(
            agent = %self.name,
            actor_loss = report.actor_loss,
            critic_loss = report.critic_loss,
            nature_loss = ?report.nature_loss,
            model_loss = ?report.model_loss,
            "update"
        );
        Ok(report)
    }

    /// Export every network, target and optimizer.
    pub fn export_state(&self) -> Result<AgentState> {
        let mut state = AgentState::default();
        state.insert_network("actor", self.actor.var_store())?;
        state.insert_network("actor_target", self.actor_target.var_store())?;
        state.insert_optimizer("actor_optim", self.actor_optim.export_state()?);
        state.insert_network("critic", self.critic.var_store())?;
        state.insert_network("critic_target", self.critic_target.var_store())?;
        state.insert_optimizer("critic_optim", self.critic_optim.export_state()?);
        self.scheme.export_into(&mut state)?;
        state.models = self
            .models
            .as_ref()
            .map(OpponentModels::export_state)
            .transpose()?;
        Ok(state)
    }

    /// Check that `state` fits every network and optimizer of this agent.
    pub fn check_state(&self, state: &AgentState) -> Result<()> {
        check_network_state(self.actor.var_store(), state.network("actor")?)?;
        check_network_state(self.actor_target.var_store(), state.network("actor_target")?)?;
        self.actor_optim.check_state(state.optimizer("actor_optim")?)?;
        check_network_state(self.critic.var_store(), state.network("critic")?)?;
        check_network_state(self.critic_target.var_store(), state.network("critic_target")?)?;
        self.critic_optim.check_state(state.optimizer("critic_optim")?)?;
        self.scheme.check_state(state)?;
        match (&state.models, &self.models) {
            (Some(saved), Some(models)) => models.check_state(saved),
            (Some(_), None) => Err(uninitialized_models()),
            (None, _) => Ok(()),
        }
    }

    /// Restore a state exported by an identically built agent.
    ///
    /// The whole state is checked first; on error the agent is unchanged.
    pub fn import_state(&mut self, state: &AgentState) -> Result<()> {
        self.check_state(state)?;
        load_network_state(self.actor.var_store_mut(), state.network("actor")?)?;
        load_network_state(
            self.actor_target.var_store_mut(),
            state.network("actor_target")?,
        )?;
        self.actor_optim
            .import_state(state.optimizer("actor_optim")?)?;
        load_network_state(self.critic.var_store_mut(), state.network("critic")?)?;
        load_network_state(
            self.critic_target.var_store_mut(),
            state.network("critic_target")?,
        )?;
        self.critic_optim
            .import_state(state.optimizer("critic_optim")?)?;
        self.scheme.import_from(state)?;

        if let Some(saved) = &state.models {
            self.models_mut()?.import_state(saved)?;
        }
        Ok(())
    }
}

fn uninitialized_models() -> MaddpgError {
    MaddpgError::PeerMismatch("opponent models have not been initialized".to_string())
}

impl<P: PolicyModel, V: ValueModel + 'static> Checkpointable for MaddpgAgent<P, V> {
    fn save_state(&self) -> Result<Vec<u8>> {
        self.export_state()?.to_bytes()
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        self.import_state(&AgentState::from_bytes(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{MlpActor, MlpConfig, MlpCritic};

    fn agent(variant: PolicyVariant) -> MaddpgAgent<MlpActor, MlpCritic> {
        let config = AgentConfig::default()
            .with_variant(variant)
            .with_batch_size(4)
            .with_memory_size(64);
        let actor = MlpActor::discrete(3, &[2], MlpConfig::default(), Device::Cpu);
        let critic = if variant.is_centralized() {
            MlpCritic::new(&[3, 3], &[2, 2], MlpConfig::default(), Device::Cpu)
        } else {
            MlpCritic::new(&[3], &[2], MlpConfig::default(), Device::Cpu)
        };
        MaddpgAgent::new(0, "agent_0", 2, 1, actor, critic, None, config).unwrap()
    }

    #[test]
    fn test_targets_start_equal_and_frozen() {
        let agent = agent(PolicyVariant::Maddpg);
        let live = agent.actor().var_store().variables();
        for (name, var) in agent.actor_target().var_store().variables() {
            assert!(var.equal(&live[&name]));
            assert!(!var.requires_grad());
        }
    }

    #[test]
    fn test_act_shapes() {
        let agent = agent(PolicyVariant::Ddpg);
        let greedy = agent.act(&[0.1, 0.2, 0.3], false).unwrap();
        assert_eq!(greedy.len(), 2);
        assert_eq!(greedy.iter().sum::<f32>(), 1.0);
        assert!(agent.memory().is_empty());
    }

    #[test]
    fn test_invalid_construction() {
        let actor = MlpActor::discrete(3, &[2], MlpConfig::default(), Device::Cpu);
        let critic = MlpCritic::new(&[3, 3], &[2, 2], MlpConfig::default(), Device::Cpu);
        let err = MaddpgAgent::new(2, "a", 2, 0, actor, critic, None, AgentConfig::default());
        assert!(matches!(err, Err(MaddpgError::InvalidConfig(_))));
    }

    #[test]
    fn test_perturb_rate_of_adversary() {
        let agent = agent(PolicyVariant::M3ddpg);
        let config = agent.config();
        assert_eq!(agent.perturb_rate(), vec![config.adv_eps_s, config.adv_eps]);
    }
}
