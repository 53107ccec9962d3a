use futures::future::BoxFuture;

use baton_core::error::Result;

use crate::context::AgentContext;
use crate::result::HandoffResult;

/// An agent the executor can dispatch to by name.
pub trait HandoffCapable: Send + Sync + 'static {
    /// Unique name used for registration and as a handoff target.
    fn handoff_name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Agents this one may hand off to, including recovery suggestions.
    fn handoff_targets(&self) -> &[&str] {
        &[]
    }

    /// Whether this agent applies to the given context.
    ///
    /// Advisory: the executor dispatches by name and never gates on this.
    fn can_handle(&self, ctx: &AgentContext) -> bool {
        let _ = ctx;
        true
    }

    /// Run one step. An `Err` is recorded as a non-recoverable failure of
    /// this agent.
    fn execute_with_context<'a>(
        &'a self,
        ctx: &'a AgentContext,
    ) -> BoxFuture<'a, Result<HandoffResult>>;
}
