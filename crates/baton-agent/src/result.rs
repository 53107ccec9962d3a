use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use baton_core::types::{DataMap, TaskResult};

use crate::context::AgentContext;

/// Outcome of one agent step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandoffResult {
    /// Terminal success.
    Complete {
        agent_name: String,
        result: DataMap,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Continue with `to_agent` after merging `context_updates`.
    Handoff {
        from_agent: String,
        to_agent: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default)]
        context_updates: DataMap,
    },
    /// Terminal unless `recoverable` and a `suggested_agent` is given.
    Failure {
        agent_name: String,
        error: String,
        recoverable: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suggested_agent: Option<String>,
    },
    /// Pause until the caller resumes with user input.
    NeedInput {
        agent_name: String,
        question: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<Vec<String>>,
    },
}

impl HandoffResult {
    pub fn complete(agent_name: impl Into<String>, result: DataMap) -> Self {
        Self::Complete {
            agent_name: agent_name.into(),
            result,
            message: None,
        }
    }

    pub fn complete_with_message(
        agent_name: impl Into<String>,
        result: DataMap,
        message: impl Into<String>,
    ) -> Self {
        Self::Complete {
            agent_name: agent_name.into(),
            result,
            message: Some(message.into()),
        }
    }

    pub fn handoff(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        reason: impl Into<String>,
        context_updates: DataMap,
    ) -> Self {
        Self::Handoff {
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            reason: Some(reason.into()),
            context_updates,
        }
    }

    /// Non-recoverable failure.
    pub fn failure(agent_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Failure {
            agent_name: agent_name.into(),
            error: error.into(),
            recoverable: false,
            suggested_agent: None,
        }
    }

    /// Recoverable failure that reroutes to `suggested_agent`.
    pub fn recoverable(
        agent_name: impl Into<String>,
        error: impl Into<String>,
        suggested_agent: impl Into<String>,
    ) -> Self {
        Self::Failure {
            agent_name: agent_name.into(),
            error: error.into(),
            recoverable: true,
            suggested_agent: Some(suggested_agent.into()),
        }
    }

    pub fn need_input(agent_name: impl Into<String>, question: impl Into<String>) -> Self {
        Self::NeedInput {
            agent_name: agent_name.into(),
            question: question.into(),
            options: None,
        }
    }

    pub fn need_choice(
        agent_name: impl Into<String>,
        question: impl Into<String>,
        options: &[&str],
    ) -> Self {
        Self::NeedInput {
            agent_name: agent_name.into(),
            question: question.into(),
            options: Some(options.iter().map(|o| o.to_string()).collect()),
        }
    }

    /// Wrap a daemon task outcome as the final step of `agent_name`.
    pub fn from_task_result(agent_name: impl Into<String>, task: TaskResult) -> Self {
        let agent_name = agent_name.into();
        match task {
            TaskResult::Success { data } => Self::complete(agent_name, data),
            TaskResult::Timeout { .. } => Self::Failure {
                error: task.error_message().unwrap_or_default(),
                agent_name,
                recoverable: true,
                suggested_agent: None,
            },
            TaskResult::Failure { .. } | TaskResult::Cancelled { .. } => {
                let error = task.error_message().unwrap_or_default();
                Self::failure(agent_name, error)
            }
        }
    }

    /// The agent that produced this result.
    pub fn agent_name(&self) -> &str {
        match self {
            Self::Complete { agent_name, .. }
            | Self::Failure { agent_name, .. }
            | Self::NeedInput { agent_name, .. } => agent_name,
            Self::Handoff { from_agent, .. } => from_agent,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Complete { .. } => "complete",
            Self::Handoff { .. } => "handoff",
            Self::Failure { .. } => "failure",
            Self::NeedInput { .. } => "need_input",
        }
    }

    /// Whether the executor stops after this result.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Complete { .. } | Self::NeedInput { .. } => true,
            Self::Handoff { .. } => false,
            Self::Failure {
                recoverable,
                suggested_agent,
                ..
            } => !(*recoverable && suggested_agent.is_some()),
        }
    }
}

/// Audit record of one loop iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffStep {
    pub agent_name: String,
    pub result: HandoffResult,
    pub depth: u32,
    pub timestamp: DateTime<Utc>,
}

impl HandoffStep {
    pub fn new(agent_name: impl Into<String>, result: HandoffResult, depth: u32) -> Self {
        Self {
            agent_name: agent_name.into(),
            result,
            depth,
            timestamp: Utc::now(),
        }
    }
}

/// Terminal outcome of a chain.
#[derive(Debug, Clone)]
pub enum HandoffChainResult {
    Success {
        agent_name: String,
        result: DataMap,
        message: Option<String>,
        trace: Vec<HandoffStep>,
        context: AgentContext,
    },
    Failure {
        agent_name: String,
        error: String,
        trace: Vec<HandoffStep>,
        context: AgentContext,
    },
    NeedInput {
        agent_name: String,
        question: String,
        options: Option<Vec<String>>,
        trace: Vec<HandoffStep>,
        context: AgentContext,
    },
    MaxDepthReached {
        /// The agent that would have run next.
        next_agent: String,
        depth: u32,
        trace: Vec<HandoffStep>,
        context: AgentContext,
    },
}

impl HandoffChainResult {
    pub fn trace(&self) -> &[HandoffStep] {
        match self {
            Self::Success { trace, .. }
            | Self::Failure { trace, .. }
            | Self::NeedInput { trace, .. }
            | Self::MaxDepthReached { trace, .. } => trace,
        }
    }

    pub fn context(&self) -> &AgentContext {
        match self {
            Self::Success { context, .. }
            | Self::Failure { context, .. }
            | Self::NeedInput { context, .. }
            | Self::MaxDepthReached { context, .. } => context,
        }
    }

    pub fn into_context(self) -> AgentContext {
        match self {
            Self::Success { context, .. }
            | Self::Failure { context, .. }
            | Self::NeedInput { context, .. }
            | Self::MaxDepthReached { context, .. } => context,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Failure { .. } => "failure",
            Self::NeedInput { .. } => "need_input",
            Self::MaxDepthReached { .. } => "max_depth_reached",
        }
    }

    /// Agent names in execution order.
    pub fn visited(&self) -> Vec<&str> {
        self.trace().iter().map(|s| s.agent_name.as_str()).collect()
    }
}
