//! The per-agent training engine.
//!
//! `MaddpgAgent` implements action selection, experience recording and the
//! update cycle: opponent modeling, critic step, actor step, target sync.
//! Variant-specific behavior lives behind `TrainingScheme`.

mod maddpg;
mod nature;
mod peers;
mod report;
mod variant;

pub use maddpg::MaddpgAgent;
pub use nature::NatureActor;
pub use peers::{PeerSet, PeerView};
pub use report::UpdateReport;
pub use variant::{
    build_scheme, Centralized, Decentralized, Minimax, Robust, TrainingScheme,
};
