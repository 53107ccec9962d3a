use futures::future::BoxFuture;

use crate::error::Result;
use crate::signal::Signal;
use crate::types::{DataMap, TaskResult};

/// Task-execution backend that does the real shell and file work.
pub trait Daemon: Send + Sync + 'static {
    /// Run `skill.function` on behalf of `agent` with the given params.
    ///
    /// Every outcome, including spawn errors and timeouts, is reported as a
    /// `TaskResult` value.
    fn run_task<'a>(
        &'a self,
        agent: &'a str,
        skill: &'a str,
        function: &'a str,
        params: DataMap,
    ) -> BoxFuture<'a, TaskResult>;
}

/// Observability sink for chain milestones.
pub trait SignalSink: Send + Sync + 'static {
    fn emit(&self, signal: Signal) -> Result<()>;
}

/// Descriptor of an agent known to the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInfo {
    pub name: String,
    pub description: String,
}

/// Lookup of daemon-backed agents, consulted when no handoff agent is
/// registered under a name.
pub trait AgentRegistry: Send + Sync + 'static {
    fn get_agent(&self, name: &str) -> Option<AgentInfo>;

    fn list(&self) -> Vec<AgentInfo> {
        Vec::new()
    }
}
