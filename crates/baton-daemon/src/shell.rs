use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use baton_core::config::DaemonConfig;
use baton_core::error::BatonError;
use baton_core::traits::Daemon;
use baton_core::types::{DataMap, TaskResult};

use crate::catalog::SkillCatalog;

const PARAM_PREFIX: &str = "BATON_PARAM_";
/// Stderr kept in failure messages.
const MAX_STDERR: usize = 2000;

/// Daemon that runs catalog commands under a shell.
pub struct ShellDaemon {
    shell: String,
    working_dir: PathBuf,
    prefix: String,
    timeout: Duration,
    catalog: SkillCatalog,
    cancel: CancellationToken,
}

impl ShellDaemon {
    pub fn new(config: &DaemonConfig, catalog: SkillCatalog) -> Self {
        Self {
            shell: config.shell.clone(),
            working_dir: config.working_dir(),
            prefix: config.prefix.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            catalog,
            cancel: CancellationToken::new(),
        }
    }

    /// Built-in catalog plus the configured skill overrides.
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::new(config, SkillCatalog::from_config(&config.skills))
    }

    /// Cancel in-flight and future tasks when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn catalog(&self) -> &SkillCatalog {
        &self.catalog
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn run(&self, agent: &str, skill: &str, function: &str, params: DataMap) -> TaskResult {
        let Some(entry) = self.catalog.get(skill, function) else {
            let err = BatonError::SkillNotFound {
                skill: skill.to_string(),
                function: function.to_string(),
            };
            warn!(agent = %agent, error = %err, "Unknown skill function");
            return TaskResult::failure(err.to_string());
        };

        if self.cancel.is_cancelled() {
            return TaskResult::Cancelled {
                reason: "daemon shutting down".to_string(),
            };
        }

        let timeout = entry
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.timeout);

        let mut command = tokio::process::Command::new(&self.shell);
        command
            .arg("-c")
            .arg(&entry.command)
            .current_dir(&self.working_dir)
            .env("PREFIX", &self.prefix)
            .env("BATON_AGENT", agent)
            .env("BATON_SKILL", skill)
            .env("BATON_FUNCTION", function)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &params {
            command.env(param_var(key), param_value(value));
        }

        debug!(agent = %agent, skill = %skill, function = %function, "Running skill command");

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!(agent = %agent, skill = %skill, function = %function, "Skill command cancelled");
                TaskResult::Cancelled {
                    reason: "daemon shutting down".to_string(),
                }
            }
            result = tokio::time::timeout(timeout, command.output()) => {
                match result {
                    Ok(Ok(output)) => interpret(output),
                    Ok(Err(e)) => TaskResult::failure(format!("failed to run {}: {}", self.shell, e)),
                    Err(_) => {
                        warn!(
                            agent = %agent,
                            skill = %skill,
                            function = %function,
                            timeout_secs = timeout.as_secs(),
                            "Skill command timed out"
                        );
                        TaskResult::Timeout {
                            duration_ms: timeout.as_millis() as u64,
                        }
                    }
                }
            }
        }
    }
}

impl Daemon for ShellDaemon {
    fn run_task<'a>(
        &'a self,
        agent: &'a str,
        skill: &'a str,
        function: &'a str,
        params: DataMap,
    ) -> BoxFuture<'a, TaskResult> {
        Box::pin(self.run(agent, skill, function, params))
    }
}

/// `source_path` becomes `BATON_PARAM_SOURCE_PATH`.
fn param_var(key: &str) -> String {
    let name: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}", PARAM_PREFIX, name)
}

/// Strings are passed raw, null as empty, everything else as JSON.
fn param_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn interpret(output: Output) -> TaskResult {
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut stderr = stderr.trim().to_string();
        if stderr.len() > MAX_STDERR {
            let mut cut = MAX_STDERR;
            while !stderr.is_char_boundary(cut) {
                cut -= 1;
            }
            stderr.truncate(cut);
        }
        return TaskResult::failure(format!("exit code {}: {}", code, stderr));
    }

    let text = stdout.trim();
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(map)) => TaskResult::success(map.into_iter().collect()),
        _ => {
            let mut data = DataMap::new();
            data.insert("output".into(), serde_json::json!(text));
            TaskResult::success(data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daemon_with(skills: &[(&str, &str, &str, Option<u64>)]) -> (ShellDaemon, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = SkillCatalog::new();
        for (skill, function, command, timeout) in skills {
            catalog.insert(skill, function, *command, *timeout);
        }
        let config = DaemonConfig {
            prefix: "/opt/prefix".into(),
            ..DaemonConfig::default()
        };
        let daemon = ShellDaemon::new(&config, catalog).with_working_dir(dir.path());
        (daemon, dir)
    }

    fn data(pairs: &[(&str, serde_json::Value)]) -> DataMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_param_var_names() {
        assert_eq!(param_var("source_path"), "BATON_PARAM_SOURCE_PATH");
        assert_eq!(param_var("dest-path.v2"), "BATON_PARAM_DEST_PATH_V2");
        assert_eq!(param_value(&serde_json::json!("a b")), "a b");
        assert_eq!(param_value(&serde_json::json!(["x"])), "[\"x\"]");
        assert_eq!(param_value(&serde_json::Value::Null), "");
    }

    #[tokio::test]
    async fn test_json_stdout_becomes_data() {
        let (daemon, _dir) = daemon_with(&[(
            "fs",
            "exists",
            r#"printf '{"path":"%s","prefix":"%s","agent":"%s"}' "$BATON_PARAM_PATH" "$PREFIX" "$BATON_AGENT""#,
            None,
        )]);
        let result = daemon
            .run_task("file_agent", "fs", "exists", data(&[("path", serde_json::json!("/sdcard/a"))]))
            .await;
        let d = result.data().expect("success");
        assert_eq!(d["path"], "/sdcard/a");
        assert_eq!(d["prefix"], "/opt/prefix");
        assert_eq!(d["agent"], "file_agent");
    }

    #[tokio::test]
    async fn test_plain_stdout_becomes_output() {
        let (daemon, _dir) = daemon_with(&[("echo", "hi", "echo hello; echo world", None)]);
        let result = daemon.run_task("a", "echo", "hi", DataMap::new()).await;
        assert_eq!(result.data().unwrap()["output"], "hello\nworld");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure_with_stderr() {
        let (daemon, _dir) = daemon_with(&[("fs", "delete", "echo denied >&2; exit 3", None)]);
        let result = daemon.run_task("a", "fs", "delete", DataMap::new()).await;
        assert_eq!(result, TaskResult::failure("exit code 3: denied"));
    }

    #[tokio::test]
    async fn test_unknown_function_is_failure() {
        let (daemon, _dir) = daemon_with(&[]);
        let result = daemon.run_task("a", "fs", "format", DataMap::new()).await;
        assert!(result.error_message().unwrap().contains("fs.format"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let (daemon, _dir) = daemon_with(&[("slow", "op", "sleep 5", Some(1))]);
        let result = daemon.run_task("a", "slow", "op", DataMap::new()).await;
        assert_eq!(result, TaskResult::Timeout { duration_ms: 1000 });
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (daemon, _dir) = daemon_with(&[("slow", "op", "sleep 5", None)]);
        let cancel = daemon.cancel_token();
        cancel.cancel();
        let result = daemon.run_task("a", "slow", "op", DataMap::new()).await;
        assert!(matches!(result, TaskResult::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_while_running() {
        let (daemon, _dir) = daemon_with(&[("slow", "op", "sleep 5", None)]);
        let cancel = daemon.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
        let result = daemon.run_task("a", "slow", "op", DataMap::new()).await;
        assert!(matches!(result, TaskResult::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let (daemon, dir) = daemon_with(&[("fs", "pwd", "pwd", None)]);
        let result = daemon.run_task("a", "fs", "pwd", DataMap::new()).await;
        let out = result.data().unwrap()["output"].as_str().unwrap().to_string();
        let expected = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(std::fs::canonicalize(out).unwrap(), expected);
    }
}
