use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatonError {
    // Agent errors
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Required context key missing: {key}")]
    MissingContext { key: String },

    // Daemon errors
    #[error("Skill function not found: {skill}.{function}")]
    SkillNotFound { skill: String, function: String },

    // Signal errors
    #[error("Signal emission failed: {0}")]
    Signal(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BatonError>;
