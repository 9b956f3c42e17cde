//! # maddpg
//!
//! Multi-agent deep deterministic policy gradient training in Rust.
//!
//! ## Overview
//!
//! The crate provides the per-agent training engine of the MADDPG family:
//! - `TransitionStore` - per-agent replay storage with multi-agent batch sampling
//! - `MaddpgAgent` - actor/critic optimization with soft target networks
//! - Minimax action perturbation (M3DDPG) and a learned nature reward (R-MADDPG)
//! - Opponent models trained by imitation of peers' recorded behavior
//! - `Population` - a thin coordinator that serializes updates across agents
//!
//! Networks are supplied by the caller through the `PolicyModel` and
//! `ValueModel` traits; `MlpActor` and `MlpCritic` are reference implementations.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use maddpg::prelude::*;
//! use tch::Device;
//!
//! let config = AgentConfig::default().with_variant(PolicyVariant::Maddpg);
//! let agents = (0..2)
//!     .map(|i| {
//!         let actor = MlpActor::discrete(4, &[5], MlpConfig::default(), Device::Cpu);
//!         let critic = MlpCritic::new(&[4, 4], &[5, 5], MlpConfig::default(), Device::Cpu);
//!         MaddpgAgent::new(i, format!("agent_{i}"), 2, 0, actor, critic, None, config.clone())
//!     })
//!     .collect::<Result<Vec<_>>>()?;
//! let mut population = Population::new(agents)?;
//! ```

pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod log;
pub mod memory;
pub mod modeling;
pub mod policy;
pub mod population;
pub mod training;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agent::{MaddpgAgent, PeerSet, PeerView, UpdateReport};
    pub use crate::checkpoint::{AgentState, Checkpointable};
    pub use crate::config::{AgentConfig, ModelingConfig, PolicyVariant};
    pub use crate::log::{CompositeLogger, ConsoleLogger, HistoryLogger, MetricLogger, NoOpLogger};
    pub use crate::memory::{Batch, TransitionStore};
    pub use crate::policy::{
        Distribution, HasVarStore, MlpActor, MlpConfig, MlpCritic, PolicyModel, ValueModel,
    };
    pub use crate::population::Population;
    pub use crate::{MaddpgError, Result};
}

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum MaddpgError {
    #[error("R-MADDPG needs a nature actor")]
    MissingNatureActor,

    #[error("A nature actor was supplied to a non-robust variant")]
    UnexpectedNatureActor,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Agent {agent} holds {available} usable transitions, {requested} requested")]
    InsufficientTransitions {
        agent: usize,
        requested: usize,
        available: usize,
    },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Peer mismatch: {0}")]
    PeerMismatch(String),

    #[error("Architecture mismatch: {0}")]
    ArchitectureMismatch(String),

    #[error("Non-finite {what} loss")]
    NonFinite { what: &'static str },

    #[error("Tensor error: {0}")]
    Tensor(#[from] tch::TchError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, MaddpgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MaddpgError::InsufficientTransitions {
            agent: 1,
            requested: 64,
            available: 10,
        };
        assert_eq!(
            err.to_string(),
            "Agent 1 holds 10 usable transitions, 64 requested"
        );
        assert_eq!(
            MaddpgError::NonFinite { what: "critic" }.to_string(),
            "Non-finite critic loss"
        );
    }
}
