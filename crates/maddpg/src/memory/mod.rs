//! Per-agent transition storage and multi-agent batch sampling.

mod batch;
mod store;

pub use batch::Batch;
pub use store::TransitionStore;
