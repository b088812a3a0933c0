use thiserror::Error;

/// Main error type for the voting agent
#[derive(Error, Debug)]
pub enum AgentError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Validation errors: malformed input or a mutation against an
    // unconfigured chain. Surfaced synchronously, never retried.
    #[error("Validation failed: {0}")]
    Validation(String),

    // Transient errors: network/chain submission failures that the
    // attestation queue retries up to its bounded maximum.
    #[error("Transient failure: {0}")]
    Transient(String),

    // Concurrency errors
    #[error("Run already active: {0}")]
    RunActive(String),

    // State machine errors
    #[error("Invalid phase transition: from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Stage {stage} failed: {reason}")]
    StageFailure { stage: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    /// Coarse category recorded into a checkpoint when a stage fails.
    pub fn category(&self) -> &'static str {
        match self {
            AgentError::Config(_) => "config",
            AgentError::Http(_) | AgentError::Transient(_) => "transient",
            AgentError::Json(_) => "serialization",
            AgentError::Validation(_) => "validation",
            AgentError::RunActive(_) => "concurrency",
            AgentError::InvalidTransition { .. } | AgentError::StageFailure { .. } => "state",
            AgentError::Io(_) => "io",
            AgentError::Cancelled => "cancelled",
            AgentError::Internal(_) | AgentError::Other(_) => "internal",
        }
    }

    /// Whether the attestation queue should retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentError::Transient(_) | AgentError::Http(_))
    }
}

/// Result type alias for AgentError
pub type Result<T> = std::result::Result<T, AgentError>;
