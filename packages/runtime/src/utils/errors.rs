// packages/runtime/src/utils/errors.rs
//! Error taxonomy for the agent execution runtime
//!
//! Configuration and admission errors are returned to the caller of the
//! operation. Execution-phase errors are captured onto the task instead
//! (`status = failed`, `error = message`) so a queue keeps draining.

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, EngineError>;

/// All errors produced by the runtime
#[derive(Error, Debug)]
pub enum EngineError {
    /// Rejected agent configuration
    #[error("Invalid agent configuration: {0}")]
    ConfigValidation(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent {0} is not running")]
    AgentNotRunning(String),

    /// Breaker refuses admission; retry after the recovery timeout
    #[error("Circuit open for agent {0}")]
    CircuitOpen(String),

    /// Overflow queue is full; caller should back off
    #[error("Agent {agent_id} task queue is full ({limit} queued)")]
    ConcurrencyLimitExceeded { agent_id: String, limit: usize },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool {tool} timed out after {timeout_ms}ms")]
    ToolTimeout { tool: String, timeout_ms: u64 },

    #[error("Task timed out after {timeout_ms}ms")]
    TaskTimeout { timeout_ms: u64 },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task cancelled: {0}")]
    Cancelled(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// Memory or model collaborator failure
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Engine configuration could not be loaded
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Stable snake_case code exposed over the request API
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::ConfigValidation(_) => "config_validation",
            EngineError::AgentNotFound(_) => "agent_not_found",
            EngineError::AgentNotRunning(_) => "agent_not_running",
            EngineError::CircuitOpen(_) => "circuit_open",
            EngineError::ConcurrencyLimitExceeded { .. } => "concurrency_limit_exceeded",
            EngineError::ToolNotFound(_) => "tool_not_found",
            EngineError::PermissionDenied(_) => "permission_denied",
            EngineError::InvalidParameters(_) => "invalid_parameters",
            EngineError::ToolTimeout { .. } => "tool_timeout",
            EngineError::TaskTimeout { .. } => "task_timeout",
            EngineError::TaskNotFound(_) => "task_not_found",
            EngineError::Cancelled(_) => "cancelled",
            EngineError::TaskFailed(_) => "task_failed",
            EngineError::Collaborator(_) => "collaborator",
            EngineError::ConfigError(_) => "config_error",
            EngineError::Serialization(_) => "serialization",
            EngineError::Io(_) => "io",
        }
    }

    /// Whether the same call may succeed if retried later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::CircuitOpen(_) | EngineError::ConcurrencyLimitExceeded { .. }
        )
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(e: config::ConfigError) -> Self {
        EngineError::ConfigError(e.to_string())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(e: serde_yaml::Error) -> Self {
        EngineError::ConfigError(e.to_string())
    }
}
