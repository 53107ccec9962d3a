//! File operation chain.
//!
//! Destructive operations never run directly: `file_agent` routes move and
//! delete through `backup_agent`, and both destructive agents refuse to act
//! without a `backup_path` in the context.

use serde_json::{json, Value};
use tracing::warn;

use baton_core::error::Result;
use baton_core::types::{DataMap, TaskResult};

use super::{params, require, task_error, Inputs};
use crate::context::AgentContext;
use crate::keys;
use crate::result::HandoffResult;

const OPERATIONS: &[&str] = &["copy", "move", "delete", "backup", "restore"];

daemon_agent!(
    /// Entry point of the file chain: gathers the operation and source path,
    /// checks the source exists, and routes.
    FileAgent,
    "file_agent",
    "Route file operations",
    [
        CopyAgent::NAME,
        BackupAgent::NAME,
        RestoreAgent::NAME,
    ]
);

impl FileAgent {
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
                    "Which file operation?",
                    OPERATIONS,
                ))
            }
        };
        if !OPERATIONS.contains(&operation.as_str()) {
            return Ok(HandoffResult::failure(
                Self::NAME,
                format!("Unknown file operation: {}", operation),
            ));
        }

        let source = match inputs.resolve(keys::SOURCE_PATH) {
            Some(path) => path,
            None => {
                return Ok(inputs.ask(
                    Self::NAME,
                    format!("Which file should I {}?", operation),
                ))
            }
        };

        // Restore writes to the source path, so it need not exist yet.
        if operation != "restore" {
            let task = self
                .daemon
                .run_task(Self::NAME, "fs", "exists", params([("path", json!(source))]))
                .await;
            match task {
                TaskResult::Success { data } => {
                    if !data.get("exists").and_then(Value::as_bool).unwrap_or(false) {
                        return Ok(HandoffResult::failure(
                            Self::NAME,
                            format!("Source does not exist: {}", source),
                        ));
                    }
                }
                other => return Ok(HandoffResult::failure(Self::NAME, task_error(&other))),
            }
        }

        let mut extra = DataMap::new();
        let (target, reason) = match operation.as_str() {
            "copy" => (CopyAgent::NAME, "copy requested"),
            "backup" => (BackupAgent::NAME, "backup requested"),
            "restore" => (RestoreAgent::NAME, "restore requested"),
            _ => {
                let (k, v) = keys::PENDING_OPERATION.entry(operation.clone());
                extra.insert(k, v);
                (BackupAgent::NAME, "backup before destructive operation")
            }
        };

        Ok(HandoffResult::handoff(
            Self::NAME,
            target,
            reason,
            inputs.updates(extra),
        ))
    }
}

daemon_agent!(
    /// Backs up the source, then continues a pending move or delete.
    BackupAgent,
    "backup_agent",
    "Back up a file before modifying it",
    [MoveAgent::NAME, DeleteAgent::NAME]
);

impl BackupAgent {
    fn handles(ctx: &AgentContext) -> bool {
        ctx.has_key(keys::SOURCE_PATH)
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let source = require(ctx, keys::SOURCE_PATH)?;
        let task = self
            .daemon
            .run_task(Self::NAME, "backup", "create", params([("path", json!(source))]))
            .await;

        let data = match task {
            TaskResult::Success { data } => data,
            other => return Ok(HandoffResult::failure(Self::NAME, task_error(&other))),
        };
        let backup_path = match data.get("backup_path").and_then(Value::as_str) {
            Some(p) => p.to_string(),
            None => {
                return Ok(HandoffResult::failure(
                    Self::NAME,
                    "backup.create returned no backup_path",
                ))
            }
        };

        let entry = keys::BACKUP_PATH.entry(backup_path.clone());
        let pending = ctx.get_key(keys::PENDING_OPERATION);
        Ok(match pending.as_deref() {
            Some("move") => HandoffResult::handoff(
                Self::NAME,
                MoveAgent::NAME,
                "backup created",
                DataMap::from([entry]),
            ),
            Some("delete") => HandoffResult::handoff(
                Self::NAME,
                DeleteAgent::NAME,
                "backup created",
                DataMap::from([entry]),
            ),
            _ => HandoffResult::complete_with_message(
                Self::NAME,
                params([
                    ("source_path", json!(source)),
                    ("backup_path", json!(backup_path)),
                ]),
                format!("Backed up {}", source),
            ),
        })
    }
}

daemon_agent!(
    CopyAgent,
    "copy_agent",
    "Copy a file",
    []
);

impl CopyAgent {
    fn handles(ctx: &AgentContext) -> bool {
        ctx.has_key(keys::SOURCE_PATH)
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let source = require(ctx, keys::SOURCE_PATH)?;
        let mut inputs = Inputs::new(ctx);
        let dest = match inputs.resolve(keys::DEST_PATH) {
            Some(d) => d,
            None => {
                return Ok(inputs.ask(
                    Self::NAME,
                    format!("Where should {} be copied?", source),
                ))
            }
        };

        let task = self
            .daemon
            .run_task(
                Self::NAME,
                "fs",
                "copy",
                params([("source", json!(source)), ("dest", json!(dest))]),
            )
            .await;

        Ok(match task {
            TaskResult::Success { data } => {
                let mut result = data;
                result.insert("source_path".into(), json!(source));
                result.insert("dest_path".into(), json!(dest));
                HandoffResult::complete_with_message(
                    Self::NAME,
                    result,
                    format!("Copied {} to {}", source, dest),
                )
            }
            other => HandoffResult::failure(Self::NAME, task_error(&other)),
        })
    }
}

daemon_agent!(
    MoveAgent,
    "move_agent",
    "Move a file that has been backed up",
    [RestoreAgent::NAME]
);

impl MoveAgent {
    fn handles(ctx: &AgentContext) -> bool {
        ctx.has_key(keys::SOURCE_PATH) && ctx.has_key(keys::BACKUP_PATH)
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let source = require(ctx, keys::SOURCE_PATH)?;
        let backup = match ctx.get_key(keys::BACKUP_PATH) {
            Some(b) => b,
            None => {
                warn!(agent = Self::NAME, source = %source, "Move refused without backup");
                return Ok(HandoffResult::failure(
                    Self::NAME,
                    format!("Refusing to move {} without a backup", source),
                ));
            }
        };

        let mut inputs = Inputs::new(ctx);
        let dest = match inputs.resolve(keys::DEST_PATH) {
            Some(d) => d,
            None => {
                return Ok(inputs.ask(
                    Self::NAME,
                    format!("Where should {} be moved?", source),
                ))
            }
        };

        let task = self
            .daemon
            .run_task(
                Self::NAME,
                "fs",
                "move",
                params([("source", json!(source)), ("dest", json!(dest))]),
            )
            .await;

        Ok(match task {
            TaskResult::Success { .. } => HandoffResult::complete_with_message(
                Self::NAME,
                params([
                    ("source_path", json!(source)),
                    ("dest_path", json!(dest)),
                    ("backup_path", json!(backup)),
                ]),
                format!("Moved {} to {}", source, dest),
            ),
            other => HandoffResult::recoverable(Self::NAME, task_error(&other), RestoreAgent::NAME),
        })
    }
}

daemon_agent!(
    DeleteAgent,
    "delete_agent",
    "Delete a file that has been backed up",
    [RestoreAgent::NAME]
);

impl DeleteAgent {
    fn handles(ctx: &AgentContext) -> bool {
        ctx.has_key(keys::SOURCE_PATH) && ctx.has_key(keys::BACKUP_PATH)
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let backup = match ctx.get_key(keys::BACKUP_PATH) {
            Some(b) => b,
            None => {
                let source = ctx.get_str(keys::SOURCE_PATH.name()).unwrap_or("file");
                warn!(agent = Self::NAME, source = %source, "Delete refused without backup");
                return Ok(HandoffResult::failure(
                    Self::NAME,
                    format!("Refusing to delete {} without a backup", source),
                ));
            }
        };
        let source = require(ctx, keys::SOURCE_PATH)?;

        let task = self
            .daemon
            .run_task(Self::NAME, "fs", "delete", params([("path", json!(source))]))
            .await;

        Ok(match task {
            TaskResult::Success { .. } => HandoffResult::complete_with_message(
                Self::NAME,
                params([
                    ("deleted", json!(source)),
                    ("backup_path", json!(backup)),
                ]),
                format!("Deleted {} (backup at {})", source, backup),
            ),
            other => HandoffResult::recoverable(Self::NAME, task_error(&other), RestoreAgent::NAME),
        })
    }
}

daemon_agent!(
    /// Restores `backup_path`, to `source_path` when one is known.
    RestoreAgent,
    "restore_agent",
    "Restore a file from its backup",
    []
);

impl RestoreAgent {
    fn handles(ctx: &AgentContext) -> bool {
        ctx.has_key(keys::BACKUP_PATH)
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let backup = require(ctx, keys::BACKUP_PATH)?;
        let target = ctx.get_key(keys::SOURCE_PATH);

        let mut p = params([("backup_path", json!(backup))]);
        if let Some(ref t) = target {
            p.insert("target".into(), json!(t));
        }
        let task = self.daemon.run_task(Self::NAME, "backup", "restore", p).await;

        Ok(match task {
            TaskResult::Success { data } => {
                let mut result = data;
                result.insert("backup_path".into(), json!(backup));
                if let Some(t) = target {
                    result.insert("restored_to".into(), json!(t));
                }
                HandoffResult::complete_with_message(
                    Self::NAME,
                    result,
                    format!("Restored {}", backup),
                )
            }
            other => HandoffResult::failure(Self::NAME, task_error(&other)),
        })
    }
}
