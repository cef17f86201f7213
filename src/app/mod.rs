mod monitor;
mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use orchestrator::SignspellOrchestrator;
pub use types::{ComponentState, ShutdownReason};
