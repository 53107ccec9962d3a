use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use baton_core::types::{DataMap, ExecutionId};

use crate::keys::ContextKey;

fn default_max_depth() -> u32 {
    10
}

/// One entry of the error history, written whenever an agent fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub agent_name: String,
    pub message: String,
    pub recoverable: bool,
    pub timestamp: DateTime<Utc>,
}

/// One entry of the result log, written as agents finish their step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub agent_name: String,
    pub result: DataMap,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Shared state threaded through every step of a chain.
///
/// Exactly one chain mutates a context at a time; concurrent chains each get
/// their own instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    execution_id: ExecutionId,
    task_description: String,
    #[serde(default)]
    data: DataMap,
    #[serde(default)]
    depth: u32,
    #[serde(default = "default_max_depth")]
    max_depth: u32,
    #[serde(default)]
    error_history: Vec<ErrorRecord>,
    #[serde(default)]
    results: Vec<ResultRecord>,
    created_at: DateTime<Utc>,
}

impl AgentContext {
    pub fn new(task_description: impl Into<String>) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            task_description: task_description.into(),
            data: DataMap::new(),
            depth: 0,
            max_depth: default_max_depth(),
            error_history: Vec::new(),
            results: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Set the depth ceiling.
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Seed a value before the chain starts.
    pub fn with_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    pub fn task_description(&self) -> &str {
        &self.task_description
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Read a value as `T`. Absent keys and values of another shape both
    /// yield `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Read a value through a typed key.
    pub fn get_key<T: DeserializeOwned>(&self, key: ContextKey<T>) -> Option<T> {
        self.get(key.name())
    }

    /// Get the raw JSON value.
    pub fn get_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Get a value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Upsert a value.
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    /// Upsert a string value.
    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data
            .insert(key.into(), serde_json::Value::String(value.into()));
    }

    /// Upsert through a typed key.
    pub fn set_key<T: Serialize>(&mut self, key: ContextKey<T>, value: T) {
        let (k, v) = key.entry(value);
        self.data.insert(k, v);
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn has_key<T>(&self, key: ContextKey<T>) -> bool {
        self.has(key.name())
    }

    /// Merge updates into the store (overwrites on conflict).
    pub fn merge(&mut self, updates: DataMap) {
        self.data.extend(updates);
    }

    pub fn data(&self) -> &DataMap {
        &self.data
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn is_max_depth_reached(&self) -> bool {
        self.depth >= self.max_depth
    }

    pub(crate) fn increment_depth(&mut self) -> u32 {
        self.depth += 1;
        self.depth
    }

    pub fn add_result(&mut self, agent_name: impl Into<String>, result: DataMap, success: bool) {
        self.results.push(ResultRecord {
            agent_name: agent_name.into(),
            result,
            success,
            timestamp: Utc::now(),
        });
    }

    pub fn add_error(
        &mut self,
        agent_name: impl Into<String>,
        message: impl Into<String>,
        recoverable: bool,
    ) {
        self.error_history.push(ErrorRecord {
            agent_name: agent_name.into(),
            message: message.into(),
            recoverable,
            timestamp: Utc::now(),
        });
    }

    pub fn results(&self) -> &[ResultRecord] {
        &self.results
    }

    pub fn error_history(&self) -> &[ErrorRecord] {
        &self.error_history
    }
}
