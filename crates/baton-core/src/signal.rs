use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::DataMap;

/// Kinds of observability signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    // Success signals
    Success,
    #[serde(rename = "resource")]
    ResourceFound,
    PathClear,

    // Warning signals
    Failure,
    Blocked,
    Danger,

    // Coordination signals
    Working,
    Claiming,
    Releasing,
    #[serde(rename = "help")]
    HelpNeeded,

    // Discovery signals
    Learned,
    Optimized,
    Deprecated,

    // Daemon lifecycle
    Heartbeat,
    Startup,
    Shutdown,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ResourceFound => "resource",
            Self::PathClear => "path_clear",
            Self::Failure => "failure",
            Self::Blocked => "blocked",
            Self::Danger => "danger",
            Self::Working => "working",
            Self::Claiming => "claiming",
            Self::Releasing => "releasing",
            Self::HelpNeeded => "help",
            Self::Learned => "learned",
            Self::Optimized => "optimized",
            Self::Deprecated => "deprecated",
            Self::Heartbeat => "heartbeat",
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
        }
    }

    /// Default time-to-live in seconds for a freshly emitted signal.
    pub fn default_ttl(&self) -> u64 {
        match self {
            Self::Blocked => 7_200,
            Self::Danger | Self::Deprecated => 86_400,
            Self::Learned => 43_200,
            Self::HelpNeeded => 1_800,
            Self::Working => 120,
            Self::Releasing => 60,
            _ => 3_600,
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fire-and-forget observability event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub signal_type: SignalType,
    pub source_agent: String,
    /// What the signal is about (an agent name, an execution id, a skill).
    pub target: String,
    #[serde(default)]
    pub data: DataMap,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl Signal {
    pub fn new(
        signal_type: SignalType,
        source_agent: impl Into<String>,
        target: impl Into<String>,
        data: DataMap,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            signal_type,
            source_agent: source_agent.into(),
            target: target.into(),
            data,
            created_at: Utc::now(),
            ttl_secs: signal_type.default_ttl(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.created_at + Duration::seconds(self.ttl_secs as i64)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
