//! Package management chain.

use serde_json::{json, Value};

use baton_core::error::Result;
use baton_core::types::{DataMap, TaskResult};

use super::{params, require, task_error, Inputs};
use crate::context::AgentContext;
use crate::keys;
use crate::result::HandoffResult;

const OPERATIONS: &[&str] = &["install", "remove", "update"];

daemon_agent!(
    /// Entry point of the package chain.
    router PackageAgent,
    "package_agent",
    "Route package operations",
    [InstallAgent::NAME, RemoveAgent::NAME, UpdateAgent::NAME]
);

impl PackageAgent {
    fn handles(_ctx: &AgentContext) -> bool {
        true
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let mut inputs = Inputs::new(ctx);
        let operation = match inputs.resolve(keys::OPERATION) {
            Some(op) => op,
            None => {
                return Ok(inputs.ask_choice(
                    Self::NAME,
                    "Which package operation?",
                    OPERATIONS,
                ))
            }
        };

        let target = match operation.as_str() {
            "install" => InstallAgent::NAME,
            "remove" => RemoveAgent::NAME,
            // A bare index refresh needs no package name.
            "update" => {
                return Ok(HandoffResult::handoff(
                    Self::NAME,
                    UpdateAgent::NAME,
                    "refresh package index",
                    inputs.updates(DataMap::new()),
                ))
            }
            other => {
                return Ok(HandoffResult::failure(
                    Self::NAME,
                    format!("Unknown package operation: {}", other),
                ))
            }
        };

        let package = match inputs.resolve(keys::PACKAGE) {
            Some(p) => p,
            None => {
                return Ok(inputs.ask(
                    Self::NAME,
                    format!("Which package should I {}?", operation),
                ))
            }
        };

        Ok(HandoffResult::handoff(
            Self::NAME,
            target,
            format!("{} {}", operation, package),
            inputs.updates(DataMap::new()),
        ))
    }
}

daemon_agent!(
    /// Installs `package`; a failure before any index refresh reroutes to
    /// `update_agent` once.
    InstallAgent,
    "install_agent",
    "Install a package",
    [PackageVerifyAgent::NAME, UpdateAgent::NAME]
);

impl InstallAgent {
    fn handles(ctx: &AgentContext) -> bool {
        ctx.has_key(keys::PACKAGE)
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let package = require(ctx, keys::PACKAGE)?;
        let task = self
            .daemon
            .run_task(Self::NAME, "pkg", "install", params([("package", json!(package))]))
            .await;

        Ok(match task {
            TaskResult::Success { .. } => HandoffResult::handoff(
                Self::NAME,
                PackageVerifyAgent::NAME,
                format!("installed {}", package),
                DataMap::new(),
            ),
            other => {
                let refreshed = ctx.get_key(keys::INDEX_REFRESHED).unwrap_or(false);
                if refreshed {
                    HandoffResult::failure(Self::NAME, task_error(&other))
                } else {
                    HandoffResult::recoverable(Self::NAME, task_error(&other), UpdateAgent::NAME)
                }
            }
        })
    }
}

daemon_agent!(
    RemoveAgent,
    "remove_agent",
    "Remove a package",
    [PackageVerifyAgent::NAME]
);

impl RemoveAgent {
    fn handles(ctx: &AgentContext) -> bool {
        ctx.has_key(keys::PACKAGE)
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let package = require(ctx, keys::PACKAGE)?;
        let task = self
            .daemon
            .run_task(Self::NAME, "pkg", "remove", params([("package", json!(package))]))
            .await;

        Ok(match task {
            TaskResult::Success { .. } => HandoffResult::handoff(
                Self::NAME,
                PackageVerifyAgent::NAME,
                format!("removed {}", package),
                DataMap::new(),
            ),
            other => HandoffResult::failure(Self::NAME, task_error(&other)),
        })
    }
}

daemon_agent!(
    /// Refreshes the package index, resuming an install that asked for it.
    UpdateAgent,
    "update_agent",
    "Refresh the package index",
    [InstallAgent::NAME]
);

impl UpdateAgent {
    fn handles(_ctx: &AgentContext) -> bool {
        true
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let task = self
            .daemon
            .run_task(Self::NAME, "pkg", "update", DataMap::new())
            .await;
        let data = match task {
            TaskResult::Success { data } => data,
            other => return Ok(HandoffResult::failure(Self::NAME, task_error(&other))),
        };

        let refreshed = DataMap::from([keys::INDEX_REFRESHED.entry(true)]);
        // No operation means the chain entered at install_agent directly.
        let resume_install = ctx.has_key(keys::PACKAGE)
            && matches!(ctx.get_key(keys::OPERATION).as_deref(), None | Some("install"));
        if resume_install {
            return Ok(HandoffResult::handoff(
                Self::NAME,
                InstallAgent::NAME,
                "index refreshed, retrying install",
                refreshed,
            ));
        }

        let mut result = data;
        result.extend(refreshed);
        Ok(HandoffResult::complete_with_message(
            Self::NAME,
            result,
            "Package index refreshed",
        ))
    }
}

daemon_agent!(
    /// Confirms the package state matches the operation that just ran.
    PackageVerifyAgent,
    "package_verify_agent",
    "Verify a package operation took effect",
    []
);

impl PackageVerifyAgent {
    fn handles(ctx: &AgentContext) -> bool {
        ctx.has_key(keys::PACKAGE)
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let package = require(ctx, keys::PACKAGE)?;
        let operation = ctx
            .get_key(keys::OPERATION)
            .unwrap_or_else(|| "install".to_string());

        let task = self
            .daemon
            .run_task(Self::NAME, "pkg", "verify", params([("package", json!(package))]))
            .await;
        let data = match task {
            TaskResult::Success { data } => data,
            other => return Ok(HandoffResult::failure(Self::NAME, task_error(&other))),
        };

        let installed = data.get("installed").and_then(Value::as_bool).unwrap_or(false);
        let expected = operation != "remove";
        if installed != expected {
            return Ok(HandoffResult::failure(
                Self::NAME,
                format!(
                    "{} of {} did not take effect (installed = {})",
                    operation, package, installed
                ),
            ));
        }

        Ok(HandoffResult::complete_with_message(
            Self::NAME,
            params([
                ("package", json!(package)),
                ("installed", json!(installed)),
            ]),
            format!("{} {} verified", operation, package),
        ))
    }
}
