//! # toolbox-runtime
//!
//! Runtime integrations for toolbox.
//!
//! ## Providers
//!
//! - **OpenAI-compatible**: any `/chat/completions` endpoint with
//!   function calling, DeepInfra by default
//!
//! ## Usage
//!
//! ```rust,ignore
//! use toolbox_runtime::{OpenAiCompatibleProvider, ToolboxConfig};
//!
//! let config = ToolboxConfig::from_env()?;
//! let provider = OpenAiCompatibleProvider::new(config.openai_config())?;
//! let orchestrator = Orchestrator::builder()
//!     .provider(Arc::new(provider))
//!     .config(config.orchestrator_config())
//!     .build()?;
//! ```

pub mod checkpoint;
pub mod config;
pub mod openai;

pub use checkpoint::FileCheckpointStore;
pub use config::{LevelConfig, ToolboxConfig};
pub use openai::{OpenAiCompatibleProvider, OpenAiConfig};

// Re-export core types for convenience
pub use toolbox_core::{
    AgentError, LlmProvider, Message, Orchestrator, Result, Role, Tool, ToolRegistry,
};
