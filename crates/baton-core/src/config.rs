use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BatonError, Result};

/// Top-level Baton configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Extra agent names the daemon fallback registry should accept.
    #[serde(default)]
    pub agents: Vec<String>,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Ceiling on loop iterations per chain.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Log a warning when a handoff targets an agent whose `can_handle` is false.
    #[serde(default = "default_warn_on_unhandled_target")]
    pub warn_on_unhandled_target: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            warn_on_unhandled_target: default_warn_on_unhandled_target(),
        }
    }
}

fn default_max_depth() -> u32 { 10 }
fn default_warn_on_unhandled_target() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Shell used to run skill commands.
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Working directory for skill commands.
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    /// Install prefix exported as `PREFIX` to skill commands.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Overrides and additions to the built-in skill catalog.
    #[serde(default)]
    pub skills: Vec<SkillCommandConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            timeout_secs: default_timeout_secs(),
            working_dir: default_working_dir(),
            prefix: default_prefix(),
            skills: vec![],
        }
    }
}

impl DaemonConfig {
    pub fn working_dir(&self) -> PathBuf {
        expand_home(&self.working_dir)
    }
}

fn default_shell() -> String { "sh".to_string() }
fn default_timeout_secs() -> u64 { 120 }
fn default_working_dir() -> String { "~".to_string() }
fn default_prefix() -> String { "/data/data/com.termux/files/usr".to_string() }

/// A shell command bound to `skill.function`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillCommandConfig {
    pub skill: String,
    pub function: String,
    pub command: String,
    /// Per-command timeout override.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsConfig {
    #[serde(default = "default_signal_capacity")]
    pub capacity: usize,
    /// Directory for JSONL signal logs. Disabled when unset.
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            capacity: default_signal_capacity(),
            log_dir: None,
        }
    }
}

impl SignalsConfig {
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log_dir.as_deref().map(expand_home)
    }
}

fn default_signal_capacity() -> usize { 256 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_workspace")]
    pub workspace: String,
    /// Paused-chain database, relative to the workspace unless absolute.
    #[serde(default = "default_checkpoint_db")]
    pub checkpoint_db: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            checkpoint_db: default_checkpoint_db(),
        }
    }
}

fn default_workspace() -> String { "~/.baton".to_string() }
fn default_checkpoint_db() -> String { "checkpoints.db".to_string() }

impl StorageConfig {
    /// Resolve the workspace directory (expand ~).
    pub fn workspace_dir(&self) -> PathBuf {
        expand_home(&self.workspace)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        let db = Path::new(&self.checkpoint_db);
        if db.is_absolute() {
            db.to_path_buf()
        } else {
            self.workspace_dir().join(db)
        }
    }
}

/// String values left as written; skill commands see `${VAR}` at run time.
const VERBATIM_KEYS: &[&str] = &["daemon.skills.command"];

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| BatonError::ConfigNotFound(path.display().to_string()))?;

        let config = Self::parse(&content)?;
        debug!(
            path = %path.display(),
            max_depth = config.chain.max_depth,
            skills = config.daemon.skills.len(),
            "Loaded config"
        );
        Ok(config)
    }

    /// Parse config text, expanding `${ENV_VAR}` references in string values.
    pub fn parse(content: &str) -> Result<Self> {
        let mut table: toml::Table =
            toml::from_str(content).map_err(|e| BatonError::Config(e.to_string()))?;
        expand_table(&mut table, "");
        let config: Self = toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| BatonError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.chain.max_depth == 0 {
            return Err(BatonError::Config("chain.max_depth must be at least 1".into()));
        }
        if self.signals.capacity == 0 {
            return Err(BatonError::Config("signals.capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Expand a leading `~/` (or a bare `~`) to `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs_home() {
            return home;
        }
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn expand_table(table: &mut toml::Table, path: &str) {
    for (key, value) in table.iter_mut() {
        let path = if path.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", path, key)
        };
        expand_value(value, &path);
    }
}

fn expand_value(value: &mut toml::Value, path: &str) {
    match value {
        toml::Value::String(s) if !VERBATIM_KEYS.contains(&path) => *s = expand_env_vars(s),
        toml::Value::Array(items) => {
            for item in items {
                expand_value(item, path);
            }
        }
        toml::Value::Table(table) => expand_table(table, path),
        _ => {}
    }
}

/// Expand `${ENV_VAR}` patterns in a string. Unset variables and an
/// unterminated `${` are kept as written.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            return result;
        };
        let var_name = &after[..end];
        match std::env::var(var_name) {
            Ok(val) => result.push_str(&val),
            Err(_) => result.push_str(&rest[start..start + end + 3]),
        }
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
