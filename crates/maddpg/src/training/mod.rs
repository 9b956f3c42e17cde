//! Optimization primitives shared by the agent.
//!
//! Provides:
//! - `Adam` and the `GradientOptimizer` trait, with clipped `minimize` steps
//! - soft target synchronization
//! - minimax action perturbation
//! - peer observation/action noise

mod noise;
mod optimizer;
mod perturb;
mod target;

pub use noise::PeerNoise;
pub use optimizer::{minimize, Adam, GradientOptimizer, OptimizerState};
pub use perturb::{minimax_actions, perturb_rate};
pub use target::{make_target, soft_update};
