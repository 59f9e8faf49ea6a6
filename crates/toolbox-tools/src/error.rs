//! Error Types for toolbox tools

use thiserror::Error;
use toolbox_core::AgentError;

pub type Result<T> = std::result::Result<T, ToolsError>;

#[derive(Error, Debug)]
pub enum ToolsError {
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("Result is not a finite number: {0}")]
    NonFinite(f64),

    #[error("Article source returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ToolsError {
    pub fn invalid_argument(name: &str, reason: impl Into<String>) -> Self {
        ToolsError::InvalidArgument {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ToolsError> for AgentError {
    fn from(err: ToolsError) -> Self {
        match err {
            ToolsError::InvalidArgument { .. } => AgentError::ToolValidation(err.to_string()),
            ToolsError::Config(msg) => AgentError::Config(msg),
            other => AgentError::ToolExecution(other.to_string()),
        }
    }
}
