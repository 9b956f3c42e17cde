//! Particle environment used to drive training from the command line.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Discrete moves: no-op, left, right, down, up
pub const NUM_MOVES: usize = 5;

/// Cooperative landmark coverage with optional adversaries.
///
/// Good agents share a reward of minus the summed distance from each
/// landmark to its closest good agent. Adversaries receive the negation.
/// Every agent observes its own position and velocity, then the relative
/// positions of all landmarks and of the other agents.
///
/// Action: relaxed one-hot over `NUM_MOVES`.
pub struct Spread {
    num_agents: usize,
    num_adversaries: usize,
    max_steps: u32,

    // Dynamics
    damping: f32,
    accel: f32,
    dt: f32,
    bound: f32,

    // State
    positions: Vec<[f32; 2]>,
    velocities: Vec<[f32; 2]>,
    landmarks: Vec<[f32; 2]>,
    steps: u32,
    rng: StdRng,
}

impl Spread {
    pub fn new(num_agents: usize, num_adversaries: usize, max_steps: u32, seed: u64) -> Self {
        let num_landmarks = (num_agents - num_adversaries).max(1);
        Self {
            num_agents,
            num_adversaries,
            max_steps,
            damping: 0.25,
            accel: 5.0,
            dt: 0.1,
            bound: 1.5,
            positions: vec![[0.0; 2]; num_agents],
            velocities: vec![[0.0; 2]; num_agents],
            landmarks: vec![[0.0; 2]; num_landmarks],
            steps: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn num_agents(&self) -> usize {
        self.num_agents
    }

    pub fn obs_size(&self) -> usize {
        4 + 2 * self.landmarks.len() + 2 * (self.num_agents - 1)
    }

    pub fn reset(&mut self) -> Vec<Vec<f32>> {
        for p in self.positions.iter_mut().chain(self.landmarks.iter_mut()) {
            *p = [self.rng.gen_range(-1.0..1.0), self.rng.gen_range(-1.0..1.0)];
        }
        self.velocities.iter_mut().for_each(|v| *v = [0.0; 2]);
        self.steps = 0;
        self.observations()
    }

    /// One uniformly drawn one-hot move per agent
    pub fn random_actions(&mut self) -> Vec<Vec<f32>> {
        (0..self.num_agents)
            .map(|_| {
                let mut one_hot = vec![0.0; NUM_MOVES];
                one_hot[self.rng.gen_range(0..NUM_MOVES)] = 1.0;
                one_hot
            })
            .collect()
    }

    fn observation(&self, i: usize) -> Vec<f32> {
        let [x, y] = self.positions[i];
        let mut obs = Vec::with_capacity(self.obs_size());
        obs.extend_from_slice(&self.positions[i]);
        obs.extend_from_slice(&self.velocities[i]);
        for [lx, ly] in &self.landmarks {
            obs.extend_from_slice(&[lx - x, ly - y]);
        }
        for (j, [ox, oy]) in self.positions.iter().enumerate() {
            if j != i {
                obs.extend_from_slice(&[ox - x, oy - y]);
            }
        }
        obs
    }

    fn observations(&self) -> Vec<Vec<f32>> {
        (0..self.num_agents).map(|i| self.observation(i)).collect()
    }

    fn coverage(&self) -> f32 {
        let good = &self.positions[self.num_adversaries..];
        self.landmarks
            .iter()
            .map(|[lx, ly]| {
                good.iter()
                    .map(|[x, y]| ((x - lx).powi(2) + (y - ly).powi(2)).sqrt())
                    .fold(f32::INFINITY, f32::min)
            })
            .filter(|d| d.is_finite())
            .sum()
    }

    /// Advance one tick; returns observations, rewards and the shared done flag.
    pub fn step(&mut self, actions: &[Vec<f32>]) -> (Vec<Vec<f32>>, Vec<f32>, bool) {
        for (i, action) in actions.iter().enumerate().take(self.num_agents) {
            let force = match action.as_slice() {
                [_, left, right, down, up, ..] => [right - left, up - down],
                _ => [0.0, 0.0],
            };
            let v = &mut self.velocities[i];
            for k in 0..2 {
                v[k] = v[k] * (1.0 - self.damping) + force[k] * self.accel * self.dt;
            }
            let p = &mut self.positions[i];
            for k in 0..2 {
                p[k] = (p[k] + v[k] * self.dt).clamp(-self.bound, self.bound);
            }
        }
        self.steps += 1;

        let team = -self.coverage();
        let rewards = (0..self.num_agents)
            .map(|i| if i < self.num_adversaries { -team } else { team })
            .collect();
        (self.observations(), rewards, self.steps >= self.max_steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_layout() {
        let mut env = Spread::new(3, 1, 25, 0);
        let obs = env.reset();
        assert_eq!(obs.len(), 3);
        assert!(obs.iter().all(|o| o.len() == env.obs_size()));
        assert_eq!(env.obs_size(), 4 + 2 * 2 + 2 * 2);
    }

    #[test]
    fn test_rewards_and_episode_end() {
        let mut env = Spread::new(2, 1, 2, 1);
        env.reset();
        let noop = vec![vec![1.0, 0.0, 0.0, 0.0, 0.0]; 2];
        let (_, rewards, done) = env.step(&noop);
        assert!(!done);
        assert!(rewards[1] <= 0.0);
        assert_eq!(rewards[0], -rewards[1]);
        let (_, _, done) = env.step(&noop);
        assert!(done);
    }

    #[test]
    fn test_random_actions_are_one_hot() {
        let mut env = Spread::new(3, 0, 25, 3);
        let mut seen = [false; NUM_MOVES];
        for _ in 0..50 {
            let actions = env.random_actions();
            assert_eq!(actions.len(), 3);
            for action in &actions {
                assert_eq!(action.len(), NUM_MOVES);
                assert_eq!(action.iter().sum::<f32>(), 1.0);
                let hot = action.iter().position(|&a| a == 1.0).unwrap();
                seen[hot] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_moves_follow_action() {
        let mut env = Spread::new(1, 0, 10, 2);
        env.reset();
        let start = env.positions[0];
        env.step(&[vec![0.0, 0.0, 1.0, 0.0, 0.0]]);
        assert!(env.positions[0][0] > start[0] || env.positions[0][0] == env.bound);
        assert_eq!(env.positions[0][1], start[1]);
    }
}
