//! Network operation chain.

use serde_json::{json, Value};

use baton_core::error::Result;
use baton_core::types::{DataMap, TaskResult};

use super::{params, require, task_error, Inputs};
use crate::context::AgentContext;
use crate::keys;
use crate::result::HandoffResult;

const DEFAULT_OPERATION: &str = "fetch";

daemon_agent!(
    /// Entry point of the network chain.
    router NetworkAgent,
    "network_agent",
    "Route network operations",
    [ConnectivityAgent::NAME]
);

impl NetworkAgent {
    fn handles(_ctx: &AgentContext) -> bool {
        true
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let mut inputs = Inputs::new(ctx);
        let url = match inputs.resolve(keys::URL) {
            Some(u) => u,
            None => return Ok(inputs.ask(Self::NAME, "Which URL?")),
        };

        let operation = ctx
            .get_key(keys::OPERATION)
            .unwrap_or_else(|| DEFAULT_OPERATION.to_string());
        if !matches!(operation.as_str(), "download" | "fetch" | "upload") {
            return Ok(HandoffResult::failure(
                Self::NAME,
                format!("Unknown network operation: {}", operation),
            ));
        }

        let extra = DataMap::from([keys::OPERATION.entry(operation.clone())]);
        Ok(HandoffResult::handoff(
            Self::NAME,
            ConnectivityAgent::NAME,
            format!("check connectivity before {} of {}", operation, url),
            inputs.updates(extra),
        ))
    }
}

daemon_agent!(
    ConnectivityAgent,
    "connectivity_agent",
    "Check the network is reachable",
    [DownloadAgent::NAME, FetchAgent::NAME, UploadAgent::NAME]
);

impl ConnectivityAgent {
    fn handles(ctx: &AgentContext) -> bool {
        ctx.has_key(keys::URL)
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let url = require(ctx, keys::URL)?;
        let task = self
            .daemon
            .run_task(Self::NAME, "network", "check", params([("url", json!(url))]))
            .await;

        let data = match task {
            TaskResult::Success { data } => data,
            other => return Ok(HandoffResult::failure(Self::NAME, task_error(&other))),
        };
        if !data.get("connected").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(HandoffResult::failure(
                Self::NAME,
                format!("No network connectivity to {}", url),
            ));
        }

        let target = match ctx.get_key(keys::OPERATION).as_deref() {
            Some("download") => DownloadAgent::NAME,
            Some("upload") => UploadAgent::NAME,
            _ => FetchAgent::NAME,
        };
        Ok(HandoffResult::handoff(
            Self::NAME,
            target,
            "network reachable",
            DataMap::new(),
        ))
    }
}

daemon_agent!(
    DownloadAgent,
    "download_agent",
    "Download a URL to disk",
    [VerifyAgent::NAME, ConnectivityAgent::NAME]
);

impl DownloadAgent {
    fn handles(ctx: &AgentContext) -> bool {
        ctx.has_key(keys::URL)
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let url = require(ctx, keys::URL)?;
        let mut p = params([("url", json!(url))]);
        if let Some(dest) = ctx.get_key(keys::DEST_PATH) {
            p.insert("dest".into(), json!(dest));
        }

        let task = self.daemon.run_task(Self::NAME, "network", "download", p).await;
        let data = match task {
            TaskResult::Success { data } => data,
            other => {
                return Ok(HandoffResult::recoverable(
                    Self::NAME,
                    task_error(&other),
                    ConnectivityAgent::NAME,
                ))
            }
        };

        let path = match data.get("path").and_then(Value::as_str) {
            Some(p) => p.to_string(),
            None => {
                return Ok(HandoffResult::failure(
                    Self::NAME,
                    "network.download returned no path",
                ))
            }
        };
        Ok(HandoffResult::handoff(
            Self::NAME,
            VerifyAgent::NAME,
            "download finished",
            DataMap::from([keys::DOWNLOADED_PATH.entry(path)]),
        ))
    }
}

daemon_agent!(
    /// Checksums a download, comparing against `expected_checksum` if set.
    VerifyAgent,
    "verify_agent",
    "Verify a downloaded file",
    []
);

impl VerifyAgent {
    fn handles(ctx: &AgentContext) -> bool {
        ctx.has_key(keys::DOWNLOADED_PATH)
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let path = require(ctx, keys::DOWNLOADED_PATH)?;
        let task = self
            .daemon
            .run_task(Self::NAME, "fs", "checksum", params([("path", json!(path))]))
            .await;

        let data = match task {
            TaskResult::Success { data } => data,
            other => return Ok(HandoffResult::failure(Self::NAME, task_error(&other))),
        };
        let actual = data
            .get("checksum")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let expected = ctx.get_key(keys::EXPECTED_CHECKSUM);
        if let Some(ref expected) = expected {
            if !expected.eq_ignore_ascii_case(&actual) {
                return Ok(HandoffResult::failure(
                    Self::NAME,
                    format!(
                        "Checksum mismatch for {}: expected {}, got {}",
                        path, expected, actual
                    ),
                ));
            }
        }

        Ok(HandoffResult::complete_with_message(
            Self::NAME,
            params([
                ("downloaded_path", json!(path)),
                ("checksum", json!(actual)),
                ("verified", json!(expected.is_some())),
            ]),
            format!("Downloaded {}", path),
        ))
    }
}

daemon_agent!(
    FetchAgent,
    "fetch_agent",
    "Fetch a URL",
    []
);

impl FetchAgent {
    fn handles(ctx: &AgentContext) -> bool {
        ctx.has_key(keys::URL)
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let url = require(ctx, keys::URL)?;
        let task = self
            .daemon
            .run_task(Self::NAME, "network", "fetch", params([("url", json!(url))]))
            .await;
        Ok(HandoffResult::from_task_result(Self::NAME, task))
    }
}

daemon_agent!(
    UploadAgent,
    "upload_agent",
    "Upload a file to a URL",
    []
);

impl UploadAgent {
    fn handles(ctx: &AgentContext) -> bool {
        ctx.has_key(keys::URL) && ctx.has_key(keys::SOURCE_PATH)
    }

    async fn run(&self, ctx: &AgentContext) -> Result<HandoffResult> {
        let url = require(ctx, keys::URL)?;
        let mut inputs = Inputs::new(ctx);
        let source = match inputs.resolve(keys::SOURCE_PATH) {
            Some(s) => s,
            None => {
                return Ok(inputs.ask(
                    Self::NAME,
                    format!("Which file should be uploaded to {}?", url),
                ))
            }
        };

        let task = self
            .daemon
            .run_task(
                Self::NAME,
                "network",
                "upload",
                params([("url", json!(url)), ("path", json!(source))]),
            )
            .await;
        Ok(HandoffResult::from_task_result(Self::NAME, task))
    }
}
