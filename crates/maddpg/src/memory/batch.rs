//! Sampled multi-agent mini-batch.

use tch::Tensor;

/// Mini-batch with one entry per agent in every field.
///
/// Rows are aligned within an agent's entries but drawn independently
/// across agents.
pub struct Batch {
    /// Episode ids, `[batch]` Int64
    pub episodes: Vec<Tensor>,
    /// Observations, `[batch, obs_size]`
    pub observations: Vec<Tensor>,
    /// Actions, `[batch, action_size]`
    pub actions: Vec<Tensor>,
    /// Rewards, `[batch]`
    pub rewards: Vec<Tensor>,
    /// Next observations, `[batch, obs_size]`
    pub next_observations: Vec<Tensor>,
    /// Done flags in {0, 1}, `[batch]`
    pub dones: Vec<Tensor>,
}

impl Batch {
    pub fn num_agents(&self) -> usize {
        self.observations.len()
    }

    /// Number of rows per agent
    pub fn batch_size(&self) -> usize {
        self.rewards
            .first()
            .map(|r| r.size()[0] as usize)
            .unwrap_or(0)
    }

    /// Share the underlying storage
    pub fn shallow_clone(&self) -> Self {
        let share = |ts: &[Tensor]| ts.iter().map(Tensor::shallow_clone).collect();
        Self {
            episodes: share(&self.episodes),
            observations: share(&self.observations),
            actions: share(&self.actions),
            rewards: share(&self.rewards),
            next_observations: share(&self.next_observations),
            dones: share(&self.dones),
        }
    }

    /// Check that every field has one entry per agent with matching rows
    pub fn is_consistent(&self) -> bool {
        let n = self.num_agents();
        let rows = self.batch_size() as i64;
        let fields = [
            &self.episodes,
            &self.observations,
            &self.actions,
            &self.rewards,
            &self.next_observations,
            &self.dones,
        ];
        fields
            .iter()
            .all(|f| f.len() == n && f.iter().all(|t| t.size().first() == Some(&rows)))
    }
}
