//! Ring-buffer transition store.

use super::Batch;
use crate::{MaddpgError, Result};
use rand::seq::index;
use rand::Rng;
use std::ops::Range;
use tch::{Device, Tensor};

/// Bounded store of one agent's transitions.
///
/// Once `capacity` is reached the oldest transition is overwritten. Field
/// widths are fixed by the first transition added.
pub struct TransitionStore {
    capacity: usize,
    obs_size: Option<usize>,
    action_size: Option<usize>,
    episodes: Vec<i64>,
    observations: Vec<f32>,
    actions: Vec<f32>,
    rewards: Vec<f32>,
    next_observations: Vec<f32>,
    dones: Vec<f32>,
    /// Slot the next transition is written to once full
    next: usize,
    len: usize,
}

impl TransitionStore {
    /// Create an empty store holding at most `capacity` transitions
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            obs_size: None,
            action_size: None,
            episodes: Vec::new(),
            observations: Vec::new(),
            actions: Vec::new(),
            rewards: Vec::new(),
            next_observations: Vec::new(),
            dones: Vec::new(),
            next: 0,
            len: 0,
        }
    }

    /// Append one transition
    pub fn add(
        &mut self,
        episode: i64,
        observation: &[f32],
        action: &[f32],
        reward: f32,
        next_observation: &[f32],
        done: bool,
    ) -> Result<()> {
        check_width(next_observation, observation.len())?;
        let obs_size = self.obs_size.unwrap_or(observation.len());
        let action_size = self.action_size.unwrap_or(action.len());
        check_width(observation, obs_size)?;
        check_width(action, action_size)?;
        self.obs_size = Some(obs_size);
        self.action_size = Some(action_size);

        let done = if done { 1.0 } else { 0.0 };
        if self.len < self.capacity {
            self.episodes.push(episode);
            self.observations.extend_from_slice(observation);
            self.actions.extend_from_slice(action);
            self.rewards.push(reward);
            self.next_observations.extend_from_slice(next_observation);
            self.dones.push(done);
            self.len += 1;
        } else {
            let slot = self.next;
            self.episodes[slot] = episode;
            self.observations[row(slot, obs_size)].copy_from_slice(observation);
            self.actions[row(slot, action_size)].copy_from_slice(action);
            self.rewards[slot] = reward;
            self.next_observations[row(slot, obs_size)].copy_from_slice(next_observation);
            self.dones[slot] = done;
        }
        self.next = (self.next + 1) % self.capacity;
        Ok(())
    }

    /// Get total number of transitions held
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of transitions a sample may draw from
    pub fn usable(&self, max_past: Option<usize>) -> usize {
        max_past.map_or(self.len, |past| past.min(self.len))
    }

    /// Physical slot of the `offset`-th most recent usable transition,
    /// counting from the oldest one in a window of `window` entries.
    fn slot(&self, window: usize, offset: usize) -> usize {
        let oldest = if self.len < self.capacity { 0 } else { self.next };
        (oldest + self.len - window + offset) % self.capacity
    }

    /// Draw `batch_size` distinct transitions from the `window` most recent.
    fn gather<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        window: usize,
        batch_size: usize,
        device: Device,
    ) -> [Tensor; 6] {
        let obs_size = self.obs_size.unwrap_or(0);
        let action_size = self.action_size.unwrap_or(0);
        let mut episodes = Vec::with_capacity(batch_size);
        let mut observations = Vec::with_capacity(batch_size * obs_size);
        let mut actions = Vec::with_capacity(batch_size * action_size);
        let mut rewards = Vec::with_capacity(batch_size);
        let mut next_observations = Vec::with_capacity(batch_size * obs_size);
        let mut dones = Vec::with_capacity(batch_size);

        for offset in index::sample(rng, window, batch_size) {
            let slot = self.slot(window, offset);
            episodes.push(self.episodes[slot]);
            observations.extend_from_slice(&self.observations[row(slot, obs_size)]);
            actions.extend_from_slice(&self.actions[row(slot, action_size)]);
            rewards.push(self.rewards[slot]);
            next_observations.extend_from_slice(&self.next_observations[row(slot, obs_size)]);
            dones.push(self.dones[slot]);
        }

        let rows = batch_size as i64;
        [
            Tensor::from_slice(&episodes).to_device(device),
            Tensor::from_slice(&observations)
                .view([rows, obs_size as i64])
                .to_device(device),
            Tensor::from_slice(&actions)
                .view([rows, action_size as i64])
                .to_device(device),
            Tensor::from_slice(&rewards).to_device(device),
            Tensor::from_slice(&next_observations)
                .view([rows, obs_size as i64])
                .to_device(device),
            Tensor::from_slice(&dones).to_device(device),
        ]
    }

    /// Sample a multi-agent batch, one independent draw per store.
    ///
    /// `stores[i]` is the store of agent `i`. With `max_past` only the most
    /// recent `max_past` transitions of each store are eligible. Fails when
    /// any store has fewer than `batch_size` eligible transitions.
    pub fn sample_transitions_from<R: Rng + ?Sized>(
        stores: &[&TransitionStore],
        batch_size: usize,
        max_past: Option<usize>,
        rng: &mut R,
        device: Device,
    ) -> Result<Batch> {
        for (agent, store) in stores.iter().enumerate() {
            let available = store.usable(max_past);
            if available < batch_size || batch_size == 0 {
                return Err(MaddpgError::InsufficientTransitions {
                    agent,
                    requested: batch_size,
                    available,
                });
            }
        }

        let mut batch = Batch {
            episodes: Vec::with_capacity(stores.len()),
            observations: Vec::with_capacity(stores.len()),
            actions: Vec::with_capacity(stores.len()),
            rewards: Vec::with_capacity(stores.len()),
            next_observations: Vec::with_capacity(stores.len()),
            dones: Vec::with_capacity(stores.len()),
        };
        for store in stores {
            let window = store.usable(max_past);
            let [episodes, observations, actions, rewards, next_observations, dones] =
                store.gather(rng, window, batch_size, device);
            batch.episodes.push(episodes);
            batch.observations.push(observations);
            batch.actions.push(actions);
            batch.rewards.push(rewards);
            batch.next_observations.push(next_observations);
            batch.dones.push(dones);
        }
        Ok(batch)
    }
}

/// Flat range of slot `slot` in a field `width` values wide
fn row(slot: usize, width: usize) -> Range<usize> {
    slot * width..(slot + 1) * width
}

fn check_width(values: &[f32], expected: usize) -> Result<()> {
    if values.len() != expected {
        return Err(MaddpgError::ShapeMismatch {
            expected: vec![expected],
            actual: vec![values.len()],
        });
    }
    Ok(())
}
