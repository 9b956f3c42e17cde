//! Agent state export and import.

mod state;

pub use state::{
    check_network_state, load_network_state, network_state, AgentState, Checkpointable,
    ComponentState, ModelState, NetworkState, TensorData,
};
