use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form key/value payload exchanged between agents, the daemon and signals.
pub type DataMap = HashMap<String, serde_json::Value>;

/// Unique identifier of one chain execution.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a single daemon task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskResult {
    Success { data: DataMap },
    Failure { error: String },
    Timeout { duration_ms: u64 },
    Cancelled { reason: String },
}

impl TaskResult {
    pub fn success(data: DataMap) -> Self {
        Self::Success { data }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Data payload of a successful task.
    pub fn data(&self) -> Option<&DataMap> {
        match self {
            Self::Success { data } => Some(data),
            _ => None,
        }
    }

    /// Human-readable description of a non-successful outcome.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error } => Some(error.clone()),
            Self::Timeout { duration_ms } => Some(format!("Task timed out after {}ms", duration_ms)),
            Self::Cancelled { reason } => Some(format!("Task cancelled: {}", reason)),
        }
    }
}
