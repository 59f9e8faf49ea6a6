//! Reasoning Strategies
//!
//! Multi-step strategies that drive repeated model calls:
//!
//! - [`sequential`]: plan N step-prompts, then answer them one by one with the
//!   growing transcript as context.
//! - [`hierarchical`]: produce an outline and expand each section level by
//!   level, one model configuration per level.
//! - [`tree_of_thought`]: generate candidate approaches, score each
//!   independently, rank them.
//! - [`tools`]: each strategy wrapped as a registry tool.
//!
//! Strategies return typed outcomes. A response that cannot be parsed is
//! reported as a [`MalformedResponse`] inside the outcome; only transport
//! failures and configuration violations surface as errors.

pub mod hierarchical;
pub mod sequential;
pub mod tools;
pub mod tree_of_thought;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;
use crate::error::Result;
use crate::message::Message;
use crate::provider::{GenerationOptions, LlmProvider};

pub use hierarchical::{ExpansionError, HierarchicalOutcome, HierarchicalReasoning, ReasoningNode};
pub use sequential::{SequentialOutcome, SequentialReasoning, StepOutput};
pub use tools::{HierarchicalReasoningTool, SequentialReasoningTool, TreeOfThoughtTool};
pub use tree_of_thought::{Branch, TreeOfThought, TreeOfThoughtOutcome};

/// Model configuration bound to one reasoning level
#[derive(Clone)]
pub struct ModelLevel {
    pub provider: Arc<dyn LlmProvider>,
    pub options: GenerationOptions,
}

impl std::fmt::Debug for ModelLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLevel")
            .field("provider", &self.provider.name())
            .field("options", &self.options)
            .finish()
    }
}

impl ModelLevel {
    pub fn new(provider: Arc<dyn LlmProvider>, options: GenerationOptions) -> Self {
        Self { provider, options }
    }

    /// Send a single user prompt (no tools) and return the text content
    pub(crate) async fn ask(
        &self,
        prompt: String,
        cancellation: Option<&CancellationToken>,
    ) -> Result<String> {
        let messages = [Message::user(prompt)];
        let completion = cancellable(
            cancellation,
            self.provider.complete(&messages, &[], &self.options),
        )
        .await??;
        Ok(completion.content.unwrap_or_default())
    }
}

/// Ordered model configurations, one per depth level
#[derive(Clone, Debug, Default)]
pub struct DepthChart {
    levels: Vec<ModelLevel>,
}

impl DepthChart {
    pub fn new(levels: Vec<ModelLevel>) -> Self {
        Self { levels }
    }

    /// A chart with the same configuration at every one of `depth` levels
    pub fn uniform(provider: Arc<dyn LlmProvider>, options: GenerationOptions, depth: usize) -> Self {
        Self {
            levels: (0..depth)
                .map(|_| ModelLevel::new(Arc::clone(&provider), options.clone()))
                .collect(),
        }
    }

    pub fn push(&mut self, level: ModelLevel) {
        self.levels.push(level);
    }

    pub fn level(&self, depth: usize) -> Option<&ModelLevel> {
        self.levels.get(depth)
    }

    /// The level for `depth`, or the deepest configured one
    pub fn level_or_last(&self, depth: usize) -> Option<&ModelLevel> {
        self.levels.get(depth).or_else(|| self.levels.last())
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// A model response that did not have the structure a strategy asked for
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MalformedResponse {
    /// Phase that produced the response (e.g. "plan", "outline")
    pub stage: String,
    pub error: String,
    /// The raw model output
    pub raw: String,
}

impl MalformedResponse {
    pub fn new(stage: impl Into<String>, error: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            error: error.into(),
            raw: raw.into(),
        }
    }
}

/// Parse a model response as JSON, tolerating surrounding whitespace and a
/// markdown code fence.
pub(crate) fn parse_json(content: &str) -> serde_json::Result<Value> {
    let trimmed = content.trim();
    let body = match trimmed.strip_prefix("```") {
        Some(fenced) => {
            let after_tag = fenced.find('\n').map_or("", |i| &fenced[i + 1..]);
            after_tag.trim_end().strip_suffix("```").unwrap_or(after_tag)
        }
        None => trimmed,
    };
    serde_json::from_str(body.trim())
}

/// Read a JSON array of strings, rendering non-string items as JSON
pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}
