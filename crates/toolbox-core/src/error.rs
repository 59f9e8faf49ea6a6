//! Error Types

use thiserror::Error;

/// Result type alias for toolbox operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Toolbox error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Tool not found in registry
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// A tool with the same name is already registered
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// Tool validation failed
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// A nested tool call could not produce a value for its parent argument
    #[error("Nested call '{name}' failed: {reason}")]
    NestedCallFailed { name: String, reason: String },

    /// The model returned something that does not have the expected structure
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// Hierarchical expansion reached a level with no model configured for it
    #[error("Depth {depth} exceeds the {configured} configured model level(s)")]
    DepthConfigurationExceeded { depth: usize, configured: usize },

    /// Conversation invariant violated
    #[error("Conversation error: {0}")]
    Conversation(String),

    /// The run was cancelled by its owner
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ProviderUnavailable(_) | AgentError::RateLimited(_) | AgentError::Io(_)
        )
    }

    /// Short machine-readable code, used by the HTTP surface
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::Provider(_) => "PROVIDER_ERROR",
            AgentError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            AgentError::UnknownTool(_) => "UNKNOWN_TOOL",
            AgentError::DuplicateTool(_) => "DUPLICATE_TOOL",
            AgentError::ToolValidation(_) => "INVALID_ARGUMENT",
            AgentError::ToolExecution(_) => "TOOL_FAILED",
            AgentError::NestedCallFailed { .. } => "NESTED_CALL_FAILED",
            AgentError::MalformedResponse(_) => "MALFORMED_RESPONSE",
            AgentError::DepthConfigurationExceeded { .. } => "DEPTH_CONFIGURATION_EXCEEDED",
            AgentError::Conversation(_) => "CONVERSATION_ERROR",
            AgentError::Cancelled => "CANCELLED",
            AgentError::Config(_) => "CONFIG_ERROR",
            AgentError::RateLimited(_) => "RATE_LIMITED",
            AgentError::Auth(_) => "AUTH_FAILED",
            AgentError::Io(_) | AgentError::Json(_) | AgentError::Other(_) => "INTERNAL",
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Provider(msg) => format!("The AI service encountered an error: {}", msg),
            AgentError::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            AgentError::UnknownTool(name) => format!("The tool '{}' is not available.", name),
            AgentError::ToolValidation(msg) => format!("Invalid tool input: {}", msg),
            AgentError::ToolExecution(msg) => format!("Tool error: {}", msg),
            AgentError::NestedCallFailed { name, .. } => {
                format!("A nested call to '{}' could not be completed.", name)
            }
            AgentError::DepthConfigurationExceeded { depth, configured } => format!(
                "Requested depth {} but only {} model level(s) are configured.",
                depth, configured
            ),
            AgentError::Cancelled => "The request was cancelled.".into(),
            AgentError::RateLimited(_) => {
                "You've made too many requests. Please wait a moment.".into()
            }
            AgentError::Auth(_) => "Authentication failed. Please check your credentials.".into(),
            AgentError::Config(msg) => format!("Configuration problem: {}", msg),
            _ => "An unexpected error occurred.".into(),
        }
    }
}
