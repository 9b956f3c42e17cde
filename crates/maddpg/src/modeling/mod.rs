//! Opponent modeling.
//!
//! Each agent may keep a model of every peer's policy, trained by imitation
//! of the peer's recorded transitions. The models stand in for peers' target
//! policies when bootstrapping the critic.

mod opponent;

pub use opponent::{imitation_loss, OpponentModel, OpponentModels};
