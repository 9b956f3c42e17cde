#![allow(dead_code)]

use maddpg::checkpoint::NetworkState;
use maddpg::prelude::*;
use tch::{Device, Kind, Tensor};

pub const OBS: i64 = 4;
pub const ACT: i64 = 3;

pub type Agent = MaddpgAgent<MlpActor, MlpCritic>;

pub fn small_mlp() -> MlpConfig {
    MlpConfig {
        hidden_size: 32,
        ..MlpConfig::default()
    }
}

pub fn config(variant: PolicyVariant) -> AgentConfig {
    AgentConfig::default()
        .with_variant(variant)
        .with_batch_size(32)
        .with_memory_size(1000)
        .with_seed(7)
}

pub fn build_agent(index: usize, n: usize, num_adversaries: usize, config: &AgentConfig) -> Agent {
    let actor = MlpActor::discrete(OBS, &[ACT], small_mlp(), Device::Cpu);
    let joint = || {
        MlpCritic::new(
            &vec![OBS; n],
            &vec![ACT; n],
            small_mlp(),
            Device::Cpu,
        )
    };
    let critic = if config.variant.is_centralized() {
        joint()
    } else {
        MlpCritic::new(&[OBS], &[ACT], small_mlp(), Device::Cpu)
    };
    let nature = config.variant.is_robust().then(joint);
    MaddpgAgent::new(
        index,
        format!("agent_{}", index),
        n,
        num_adversaries,
        actor,
        critic,
        nature,
        config.clone(),
    )
    .unwrap()
}

pub fn build_agents(n: usize, num_adversaries: usize, config: &AgentConfig) -> Vec<Agent> {
    (0..n)
        .map(|i| build_agent(i, n, num_adversaries, config))
        .collect()
}

pub fn observation(step: usize, agent: usize) -> Vec<f32> {
    (0..OBS as usize)
        .map(|k| ((step * 7 + agent * 3 + k) as f32 * 0.37).sin())
        .collect()
}

/// Roll out `steps` synthetic transitions for every agent.
pub fn fill(agents: &mut [Agent], steps: usize, reward: f32, done: bool) {
    for step in 0..steps {
        for (i, agent) in agents.iter_mut().enumerate() {
            let obs = observation(step, i);
            let action = agent.act(&obs, true).unwrap();
            let next_obs = observation(step + 1, i);
            agent
                .experience((step / 25) as i64, &obs, &action, reward, &next_obs, done)
                .unwrap();
        }
    }
}

/// Run `f` on agent `i` with views of every other agent.
pub fn with_views<T>(
    agents: &mut [Agent],
    i: usize,
    f: impl FnOnce(&mut Agent, &[PeerView<'_, MlpActor>]) -> T,
) -> T {
    let (before, rest) = agents.split_at_mut(i);
    let (agent, after) = rest.split_first_mut().unwrap();
    let views: Vec<_> = before.iter().chain(after.iter()).map(|a| a.view()).collect();
    f(agent, &views)
}

/// Initialize every agent's opponent models against the others.
pub fn init_models(agents: &mut [Agent]) {
    for i in 0..agents.len() {
        with_views(agents, i, |agent, views| agent.init_agent_models(views).unwrap());
    }
}

/// Batch of `rows` rows for `n` agents with simplex actions.
pub fn synthetic_batch(n: usize, rows: i64, reward: f64, done: f64) -> Batch {
    let opts = (Kind::Float, Device::Cpu);
    Batch {
        episodes: (0..n).map(|_| Tensor::zeros([rows], (Kind::Int64, Device::Cpu))).collect(),
        observations: (0..n).map(|_| Tensor::randn([rows, OBS], opts)).collect(),
        actions: (0..n)
            .map(|_| Tensor::randn([rows, ACT], opts).softmax(-1, Kind::Float))
            .collect(),
        rewards: (0..n).map(|_| Tensor::full([rows], reward, opts)).collect(),
        next_observations: (0..n).map(|_| Tensor::randn([rows, OBS], opts)).collect(),
        dones: (0..n).map(|_| Tensor::full([rows], done, opts)).collect(),
    }
}

/// Two saved networks decode to identical tensors.
pub fn same_network(a: &NetworkState, b: &NetworkState) -> bool {
    let decode = |data: &maddpg::checkpoint::TensorData| data.to_tensor(Device::Cpu).unwrap();
    a.len() == b.len()
        && a.iter().all(|(name, data)| {
            b.get(name)
                .map_or(false, |other| decode(data).equal(&decode(other)))
        })
}

/// Owned copies of every parameter of a var store.
pub fn snapshot(vs: &tch::nn::VarStore) -> Vec<(String, Tensor)> {
    vs.variables()
        .into_iter()
        .map(|(name, var)| (name, var.copy()))
        .collect()
}

/// Every parameter of `vs` still equals its `snapshot` copy.
pub fn unchanged(vs: &tch::nn::VarStore, snapshot: &[(String, Tensor)]) -> bool {
    let vars = vs.variables();
    snapshot
        .iter()
        .all(|(name, saved)| vars.get(name).map_or(false, |var| var.equal(saved)))
}

/// Parameters of two var stores are identical.
pub fn same_parameters(a: &tch::nn::VarStore, b: &tch::nn::VarStore) -> bool {
    let b_vars = b.variables();
    a.variables()
        .iter()
        .all(|(name, var)| b_vars.get(name).map_or(false, |other| var.equal(other)))
}
