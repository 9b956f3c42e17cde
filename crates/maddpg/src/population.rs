//! Thin coordinator over a population of agents.

use crate::agent::{MaddpgAgent, PeerView, UpdateReport};
use crate::log::{MetricLogger, NoOpLogger};
use crate::policy::{PolicyModel, ValueModel};
use crate::{MaddpgError, Result};
use std::collections::HashMap;

/// Owns every agent and serializes their updates.
///
/// Agent `i` sits at position `i`. While one agent updates, the others are
/// only borrowed immutably.
pub struct Population<P: PolicyModel, V: ValueModel> {
    agents: Vec<MaddpgAgent<P, V>>,
    logger: Box<dyn MetricLogger>,
    updates: u64,
}

impl<P: PolicyModel, V: ValueModel + 'static> Population<P, V> {
    /// Take ownership of `agents` and initialize their opponent models.
    pub fn new(mut agents: Vec<MaddpgAgent<P, V>>) -> Result<Self> {
        if agents.is_empty() {
            return Err(MaddpgError::InvalidConfig("empty population".to_string()));
        }
        let n = agents.len();
        for (i, agent) in agents.iter().enumerate() {
            if agent.index() != i || agent.num_agents() != n {
                return Err(MaddpgError::PeerMismatch(format!(
                    "agent at position {} has index {} of {}, population holds {}",
                    i,
                    agent.index(),
                    agent.num_agents(),
                    n
                )));
            }
        }

        Self::with_peers(&mut agents, |agent, peers| agent.init_agent_models(peers))?;

        tracing::info!(
            agents = n,
            variants = ?agents.iter().map(|a| a.variant().name()).collect::<Vec<_>>(),
            "population ready"
        );
        Ok(Self {
            agents,
            logger: Box::new(NoOpLogger),
            updates: 0,
        })
    }

    /// Report update metrics through `logger`
    pub fn with_logger(mut self, logger: Box<dyn MetricLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Run `f` on each agent in index order with views of all the others.
    fn with_peers<T>(
        agents: &mut [MaddpgAgent<P, V>],
        mut f: impl FnMut(&mut MaddpgAgent<P, V>, &[PeerView<'_, P>]) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(agents.len());
        for i in 0..agents.len() {
            let (before, rest) = agents.split_at_mut(i);
            let Some((agent, after)) = rest.split_first_mut() else {
                break;
            };
            let views: Vec<PeerView<'_, P>> = before
                .iter()
                .chain(after.iter())
                .map(MaddpgAgent::view)
                .collect();
            out.push(f(agent, &views)?);
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn agents(&self) -> &[MaddpgAgent<P, V>] {
        &self.agents
    }

    /// Number of completed `update_all` rounds
    pub fn updates(&self) -> u64 {
        self.updates
    }

    fn check_len(&self, what: &str, len: usize) -> Result<()> {
        if len != self.agents.len() {
            return Err(MaddpgError::PeerMismatch(format!(
                "{} {} for {} agents",
                len,
                what,
                self.agents.len()
            )));
        }
        Ok(())
    }

    /// One action per agent from its own observation.
    pub fn act_all(&self, observations: &[Vec<f32>], explore: bool) -> Result<Vec<Vec<f32>>> {
        self.check_len("observations", observations.len())?;
        self.agents
            .iter()
            .zip(observations)
            .map(|(agent, obs)| agent.act(obs, explore))
            .collect()
    }

    /// Record one environment step, each agent storing its own slice.
    pub fn experience_all(
        &mut self,
        episode: i64,
        observations: &[Vec<f32>],
        actions: &[Vec<f32>],
        rewards: &[f32],
        next_observations: &[Vec<f32>],
        dones: &[bool],
    ) -> Result<()> {
        self.check_len("observations", observations.len())?;
        self.check_len("actions", actions.len())?;
        self.check_len("rewards", rewards.len())?;
        self.check_len("next observations", next_observations.len())?;
        self.check_len("done flags", dones.len())?;

        for (i, agent) in self.agents.iter_mut().enumerate() {
            agent.experience(
                episode,
                &observations[i],
                &actions[i],
                rewards[i],
                &next_observations[i],
                dones[i],
            )?;
        }
        Ok(())
    }

    /// Update every agent in index order and log their metrics.
    pub fn update_all(&mut self) -> Result<Vec<UpdateReport>> {
        let reports = Self::with_peers(&mut self.agents, |agent, peers| agent.update(peers))?;
        self.updates += 1;

        let mut metrics = HashMap::new();
        for (agent, report) in self.agents.iter().zip(&reports) {
            for (name, value) in report.metrics() {
                metrics.insert(format!("{}/{}", agent.name(), name), value);
            }
        }
        self.logger.log_metrics(&metrics, self.updates);
        Ok(reports)
    }
}

impl<P: PolicyModel, V: ValueModel> Drop for Population<P, V> {
    fn drop(&mut self) {
        self.logger.close();
    }
}
