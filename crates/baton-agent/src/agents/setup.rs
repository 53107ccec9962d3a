//! Environment setup chain: verify, diagnose, heal, audit.

use serde_json::{json, Value};
use tracing::debug;

use baton_core::error::Result;
use baton_core::types::{DataMap, TaskResult};

use super::{params, task_error};
use crate::context::AgentContext;
use crate::keys;
use crate::result::HandoffResult;

daemon_agent!(
    /// Checks the bootstrap install before diagnostics run.
    SetupAgent,
    "setup_agent",
    "Verify the bootstrap environment",
    [DiagnosticAgent::NAME, HealAgent::NAME]
);

impl SetupAgent {
    fn handles(_ctx: &AgentContext) -> bool {
        true
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let task = self
            .daemon
            .run_task(
                Self::NAME,
                "bootstrap",
                "check",
                params([("task", json!(ctx.task_description()))]),
            )
            .await;

        Ok(match task {
            TaskResult::Success { data } => {
                let valid = data.get("valid").and_then(Value::as_bool).unwrap_or(true);
                let status = if valid { "verified" } else { "degraded" };
                let (k, v) = keys::SETUP_STATUS.entry(status.to_string());
                HandoffResult::handoff(
                    Self::NAME,
                    DiagnosticAgent::NAME,
                    format!("bootstrap {}", status),
                    DataMap::from([(k, v)]),
                )
            }
            other => HandoffResult::recoverable(Self::NAME, task_error(&other), HealAgent::NAME),
        })
    }
}

daemon_agent!(
    /// Looks for environment problems and routes to healing or the audit.
    DiagnosticAgent,
    "diagnostic_agent",
    "Find environment issues",
    [HealAgent::NAME, SecurityAgent::NAME]
);

impl DiagnosticAgent {
    fn handles(_ctx: &AgentContext) -> bool {
        true
    }

    async fn run(&self, _ctx: &AgentContext) -> Result<HandoffResult> {
        let task = self
            .daemon
            .run_task(Self::NAME, "diagnostic", "find_issues", DataMap::new())
            .await;

        let data = match task {
            TaskResult::Success { data } => data,
            other => return Ok(HandoffResult::failure(Self::NAME, task_error(&other))),
        };

        let issues = describe_issues(&data);
        debug!(agent = Self::NAME, issues = issues.len(), "Diagnostics finished");

        let count = issues.len() as u64;
        if issues.is_empty() {
            return Ok(HandoffResult::handoff(
                Self::NAME,
                SecurityAgent::NAME,
                "no issues found",
                DataMap::from([
                    keys::DIAGNOSTIC_STATUS.entry("healthy".to_string()),
                    keys::ISSUE_COUNT.entry(0),
                ]),
            ));
        }

        Ok(HandoffResult::handoff(
            Self::NAME,
            HealAgent::NAME,
            format!("{} issue(s) found", count),
            DataMap::from([
                keys::DIAGNOSTIC_STATUS.entry("issues_found".to_string()),
                keys::ISSUES.entry(issues),
                keys::ISSUE_COUNT.entry(count),
            ]),
        ))
    }
}

/// Flatten the `issues` payload. Entries are either plain strings or
/// `{issue, severity}` objects; critical ones keep their severity as a prefix.
fn describe_issues(data: &DataMap) -> Vec<String> {
    data.get("issues")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(describe_issue).collect())
        .unwrap_or_default()
}

fn describe_issue(item: &Value) -> Option<String> {
    match item {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => {
            let text = obj.get("issue").and_then(Value::as_str)?;
            match obj.get("severity").and_then(Value::as_str) {
                Some("critical") => Some(format!("critical: {}", text)),
                _ => Some(text.to_string()),
            }
        }
        _ => None,
    }
}

daemon_agent!(
    /// Repairs the issues diagnostics found, then asks for a re-check.
    HealAgent,
    "heal_agent",
    "Repair diagnosed issues",
    [DiagnosticAgent::NAME]
);

impl HealAgent {
    fn handles(ctx: &AgentContext) -> bool {
        ctx.get_key(keys::ISSUES).is_some_and(|i| !i.is_empty())
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let issues = ctx.get_key(keys::ISSUES).unwrap_or_default();
        if issues.is_empty() {
            return Ok(HandoffResult::recoverable(
                Self::NAME,
                "No diagnosed issues to heal",
                DiagnosticAgent::NAME,
            ));
        }

        if let Some(critical) = issues.iter().find(|i| i.contains("critical")) {
            return Ok(HandoffResult::failure(
                Self::NAME,
                format!("Critical issue needs manual repair: {}", critical),
            ));
        }

        let task = self
            .daemon
            .run_task(
                Self::NAME,
                "heal",
                "full_heal",
                params([("issues", json!(issues))]),
            )
            .await;

        Ok(match task {
            TaskResult::Success { data } => {
                let healed = data
                    .get("total_repairs")
                    .and_then(Value::as_u64)
                    .unwrap_or(issues.len() as u64);
                HandoffResult::handoff(
                    Self::NAME,
                    DiagnosticAgent::NAME,
                    "re-check after healing",
                    DataMap::from([
                        keys::ISSUES.entry(Vec::new()),
                        keys::HEALED_COUNT.entry(healed),
                    ]),
                )
            }
            other => HandoffResult::failure(Self::NAME, task_error(&other)),
        })
    }
}

daemon_agent!(
    /// Final audit of the setup chain.
    SecurityAgent,
    "security_agent",
    "Audit the environment and report",
    []
);

impl SecurityAgent {
    fn handles(_ctx: &AgentContext) -> bool {
        true
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let task = self
            .daemon
            .run_task(Self::NAME, "security", "audit", DataMap::new())
            .await;

        let audit = match task {
            TaskResult::Success { data } => data,
            other => return Ok(HandoffResult::failure(Self::NAME, task_error(&other))),
        };

        let agents: Vec<&str> = ctx.results().iter().map(|r| r.agent_name.as_str()).collect();
        let errors: Vec<String> = ctx
            .error_history()
            .iter()
            .map(|e| format!("{}: {}", e.agent_name, e.message))
            .collect();
        let message = if errors.is_empty() {
            "Environment verified".to_string()
        } else {
            format!("Environment verified after {} recovered error(s)", errors.len())
        };

        let report = params([
            ("audit", json!(audit)),
            ("agents", json!(agents)),
            ("errors", json!(errors)),
            (
                "healed_count",
                json!(ctx.get_key(keys::HEALED_COUNT).unwrap_or(0)),
            ),
            ("depth", json!(ctx.depth())),
        ]);
        Ok(HandoffResult::complete_with_message(Self::NAME, report, message))
    }
}
