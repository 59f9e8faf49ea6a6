//! # toolbox-core
//!
//! Tool registry, tool-call orchestration and multi-step reasoning over a
//! provider-agnostic LLM abstraction.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Orchestrator                            │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌────────────────────┐  │
//! │  │ Conversation │──│ ToolCallResolver │──│    ToolRegistry    │  │
//! │  └──────────────┘  └──────────────────┘  └────────────────────┘  │
//! │          │                                                       │
//! │  ┌──────────────┐   Sequential / Hierarchical / TreeOfThought    │
//! │  │ LlmProvider  │◀──────────── DepthChart ───────────────────────│
//! │  └──────────────┘                                                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait lets any chat-completions backend drive the loop
//! and the strategies without changing them.

pub mod chain;
pub mod context;
pub mod error;
pub mod message;
pub mod orchestration;
pub mod provider;
pub mod reasoning;
pub mod resolver;
pub mod tool;

mod cancel;
#[cfg(test)]
mod testing;

pub use chain::ToolChain;
pub use context::{Checkpoint, CheckpointStore, ExecutionRecord, MemoryCheckpointStore, WorkflowContext};
pub use error::{AgentError, Result};
pub use message::{Conversation, Message, Role};
pub use orchestration::{
    Orchestrator, OrchestratorBuilder, OrchestratorConfig, WorkflowOutcome, WorkflowStatus,
};
pub use provider::{Completion, GenerationOptions, LlmProvider, ToolChoice};
pub use reasoning::{
    DepthChart, HierarchicalOutcome, HierarchicalReasoning, HierarchicalReasoningTool,
    MalformedResponse, ModelLevel, SequentialOutcome, SequentialReasoning, SequentialReasoningTool,
    TreeOfThought, TreeOfThoughtOutcome, TreeOfThoughtTool,
};
pub use resolver::{ReturnMode, ToolCallResolver};
pub use tool::{Arguments, ParameterSchema, Tool, ToolCall, ToolDefinition, ToolRegistry, ToolResult};
