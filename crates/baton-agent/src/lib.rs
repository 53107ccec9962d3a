//! Handoff Execution Engine.
//!
//! A chain is a sequence of named agents sharing one [`AgentContext`]. Each
//! agent returns a [`HandoffResult`] telling the [`HandoffExecutor`] whether
//! to stop, move to another agent, reroute after a failure, or pause for user
//! input. The executor bounds every chain by the context's `max_depth`.

pub mod agents;
pub mod capable;
pub mod context;
pub mod executor;
pub mod keys;
pub mod pause;
pub mod result;
pub mod signal_log;

pub use agents::register_builtin_agents;
pub use capable::HandoffCapable;
pub use context::{AgentContext, ErrorRecord, ResultRecord};
pub use executor::HandoffExecutor;
pub use keys::ContextKey;
pub use pause::{PauseStore, PausedChain};
pub use result::{HandoffChainResult, HandoffResult, HandoffStep};
pub use signal_log::SignalLogger;
