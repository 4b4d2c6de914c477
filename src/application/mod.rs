//! Application layer - state machine and orchestration on top of the ports.

mod orchestrator;
mod store;

pub use orchestrator::ChatOrchestrator;
pub use store::{ChatStore, ComposerState, StoreError, StreamingState};
