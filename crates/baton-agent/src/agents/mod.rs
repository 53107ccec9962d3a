//! Built-in agent chains.
//!
//! Every agent here validates the context keys it needs, delegates the real
//! work to the daemon, and maps the task outcome onto a handoff decision.

use std::sync::Arc;

use baton_core::error::{BatonError, Result};
use baton_core::traits::Daemon;
use baton_core::types::{DataMap, TaskResult};

use crate::context::AgentContext;
use crate::executor::HandoffExecutor;
use crate::keys::{self, ContextKey};
use crate::result::HandoffResult;

/// Declare a daemon-backed agent: the struct, its `NAME`, and the
/// `HandoffCapable` impl delegating to the inherent `run` and `handles`.
/// A `router` agent only picks the next hop and holds no daemon.
macro_rules! daemon_agent {
    (@capable $ty:ident, $desc:literal, [$($target:expr),*]) => {
        impl $crate::capable::HandoffCapable for $ty {
            fn handoff_name(&self) -> &str {
                Self::NAME
            }

            fn description(&self) -> &str {
                $desc
            }

            fn handoff_targets(&self) -> &[&str] {
                const TARGETS: &[&str] = &[$($target),*];
                TARGETS
            }

            fn can_handle(&self, ctx: &$crate::context::AgentContext) -> bool {
                Self::handles(ctx)
            }

            fn execute_with_context<'a>(
                &'a self,
                ctx: &'a $crate::context::AgentContext,
            ) -> ::futures::future::BoxFuture<
                'a,
                ::baton_core::error::Result<$crate::result::HandoffResult>,
            > {
                Box::pin(self.run(ctx))
            }
        }
    };
    ($(#[$meta:meta])* router $ty:ident, $name:literal, $desc:literal, [$($target:expr),* $(,)?]) => {
        $(#[$meta])*
        #[derive(Debug, Default)]
        pub struct $ty;

        impl $ty {
            pub const NAME: &'static str = $name;

            pub fn new() -> Self {
                Self
            }
        }

        daemon_agent!(@capable $ty, $desc, [$($target),*]);
    };
    ($(#[$meta:meta])* $ty:ident, $name:literal, $desc:literal, [$($target:expr),* $(,)?]) => {
        $(#[$meta])*
        pub struct $ty {
            daemon: ::std::sync::Arc<dyn ::baton_core::traits::Daemon>,
        }

        impl $ty {
            pub const NAME: &'static str = $name;

            pub fn new(daemon: ::std::sync::Arc<dyn ::baton_core::traits::Daemon>) -> Self {
                Self { daemon }
            }
        }

        daemon_agent!(@capable $ty, $desc, [$($target),*]);
    };
}

pub mod file;
pub mod network;
pub mod package;
pub mod setup;

pub use file::{BackupAgent, CopyAgent, DeleteAgent, FileAgent, MoveAgent, RestoreAgent};
pub use network::{
    ConnectivityAgent, DownloadAgent, FetchAgent, NetworkAgent, UploadAgent, VerifyAgent,
};
pub use package::{InstallAgent, PackageAgent, PackageVerifyAgent, RemoveAgent, UpdateAgent};
pub use setup::{DiagnosticAgent, HealAgent, SecurityAgent, SetupAgent};

/// Names of every built-in agent, in chain order.
pub const BUILTIN_AGENTS: &[&str] = &[
    SetupAgent::NAME,
    DiagnosticAgent::NAME,
    HealAgent::NAME,
    SecurityAgent::NAME,
    FileAgent::NAME,
    BackupAgent::NAME,
    CopyAgent::NAME,
    MoveAgent::NAME,
    DeleteAgent::NAME,
    RestoreAgent::NAME,
    NetworkAgent::NAME,
    ConnectivityAgent::NAME,
    DownloadAgent::NAME,
    VerifyAgent::NAME,
    FetchAgent::NAME,
    UploadAgent::NAME,
    PackageAgent::NAME,
    InstallAgent::NAME,
    PackageVerifyAgent::NAME,
    RemoveAgent::NAME,
    UpdateAgent::NAME,
];

/// Register every built-in agent, all sharing `daemon`.
pub fn register_builtin_agents(executor: &HandoffExecutor, daemon: Arc<dyn Daemon>) {
    executor.register_handoff_agent(SetupAgent::new(daemon.clone()));
    executor.register_handoff_agent(DiagnosticAgent::new(daemon.clone()));
    executor.register_handoff_agent(HealAgent::new(daemon.clone()));
    executor.register_handoff_agent(SecurityAgent::new(daemon.clone()));

    executor.register_handoff_agent(FileAgent::new(daemon.clone()));
    executor.register_handoff_agent(BackupAgent::new(daemon.clone()));
    executor.register_handoff_agent(CopyAgent::new(daemon.clone()));
    executor.register_handoff_agent(MoveAgent::new(daemon.clone()));
    executor.register_handoff_agent(DeleteAgent::new(daemon.clone()));
    executor.register_handoff_agent(RestoreAgent::new(daemon.clone()));

    executor.register_handoff_agent(NetworkAgent::new());
    executor.register_handoff_agent(ConnectivityAgent::new(daemon.clone()));
    executor.register_handoff_agent(DownloadAgent::new(daemon.clone()));
    executor.register_handoff_agent(VerifyAgent::new(daemon.clone()));
    executor.register_handoff_agent(FetchAgent::new(daemon.clone()));
    executor.register_handoff_agent(UploadAgent::new(daemon.clone()));

    executor.register_handoff_agent(PackageAgent::new());
    executor.register_handoff_agent(InstallAgent::new(daemon.clone()));
    executor.register_handoff_agent(PackageVerifyAgent::new(daemon.clone()));
    executor.register_handoff_agent(RemoveAgent::new(daemon.clone()));
    executor.register_handoff_agent(UpdateAgent::new(daemon));
}

/// Build a param or update map from literal pairs.
pub(crate) fn params<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> DataMap {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Read a key the agent cannot run without.
pub(crate) fn require(ctx: &AgentContext, key: ContextKey<String>) -> Result<String> {
    ctx.get_key(key).ok_or_else(|| BatonError::MissingContext {
        key: key.name().to_string(),
    })
}

pub(crate) fn task_error(task: &TaskResult) -> String {
    task.error_message()
        .unwrap_or_else(|| "task reported no error".to_string())
}

/// Resolves string keys from the context, falling back to the answer of a
/// resumed `NeedInput` for the first key still missing.
///
/// A consumed answer is written under its key and `user_input` is cleared in
/// [`Inputs::updates`], so a later question in the chain starts fresh.
pub(crate) struct Inputs<'a> {
    ctx: &'a AgentContext,
    consumed: bool,
    updates: DataMap,
}

impl<'a> Inputs<'a> {
    pub(crate) fn new(ctx: &'a AgentContext) -> Self {
        Self {
            ctx,
            consumed: false,
            updates: DataMap::new(),
        }
    }

    pub(crate) fn resolve(&mut self, key: ContextKey<String>) -> Option<String> {
        if let Some(value) = self.ctx.get_key(key) {
            return Some(value);
        }
        if self.consumed {
            return None;
        }
        let answer = self
            .ctx
            .get_key(keys::USER_INPUT)
            .filter(|s| !s.trim().is_empty())?;
        self.consumed = true;
        let (k, v) = key.entry(answer.trim().to_string());
        self.updates.insert(k, v);
        self.updates
            .insert(keys::USER_INPUT.name().to_string(), serde_json::Value::Null);
        Some(answer.trim().to_string())
    }

    /// Ask for the next missing value. An answer consumed in this step is
    /// recorded first by handing back to `agent`, which asks on its next run.
    pub(crate) fn ask(self, agent: &str, question: impl Into<String>) -> HandoffResult {
        if self.updates.is_empty() {
            HandoffResult::need_input(agent, question)
        } else {
            HandoffResult::handoff(agent, agent, "answer recorded", self.updates)
        }
    }

    pub(crate) fn ask_choice(
        self,
        agent: &str,
        question: impl Into<String>,
        options: &[&str],
    ) -> HandoffResult {
        if self.updates.is_empty() {
            HandoffResult::need_choice(agent, question, options)
        } else {
            HandoffResult::handoff(agent, agent, "answer recorded", self.updates)
        }
    }

    /// Updates to carry forward, merged over `extra`.
    pub(crate) fn updates(self, extra: DataMap) -> DataMap {
        let mut out = extra;
        out.extend(self.updates);
        out
    }
}
