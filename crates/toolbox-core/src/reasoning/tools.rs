//! Strategy Tools
//!
//! Wraps each reasoning strategy in the [`Tool`] trait so a model can invoke
//! it through the registry like any other function. The strategy outcome is
//! returned as JSON.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::hierarchical::HierarchicalReasoning;
use super::sequential::SequentialReasoning;
use super::tree_of_thought::{DEFAULT_BRANCHES, DEFAULT_EVALUATION_DEPTH, TreeOfThought};
use crate::error::{AgentError, Result};
use crate::tool::{Arguments, ParameterSchema, Tool, ToolDefinition};

const DEFAULT_HIERARCHICAL_DEPTH: usize = 2;

fn prompt_arg(args: &Arguments) -> Result<&str> {
    args.get("prompt")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|prompt| !prompt.is_empty())
        .ok_or_else(|| AgentError::ToolValidation("prompt must be a non-empty string".into()))
}

/// Positive integer argument, falling back to `default` when absent
fn count_arg(args: &Arguments, key: &str, default: usize) -> Result<usize> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .filter(|n| *n > 0)
            .map(|n| n as usize)
            .ok_or_else(|| AgentError::ToolValidation(format!("{} must be a positive integer", key))),
    }
}

/// `sequential_cot(prompt)`
pub struct SequentialReasoningTool {
    strategy: SequentialReasoning,
}

impl SequentialReasoningTool {
    pub fn new(strategy: SequentialReasoning) -> Self {
        Self { strategy }
    }
}

#[async_trait]
impl Tool for SequentialReasoningTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "sequential_cot",
            "Generate a series of steps required to solve a problem using Chain-of-Thought reasoning.",
        )
        .with_parameter(
            ParameterSchema::new("prompt", "string", "The prompt to generate steps for.").required(),
        )
        .with_category("reasoning")
    }

    async fn call(&self, args: &Arguments) -> Result<Value> {
        let outcome = self.strategy.run(prompt_arg(args)?).await?;
        Ok(serde_json::to_value(outcome)?)
    }
}

/// `hierarchical_cot(prompt, depth)`
pub struct HierarchicalReasoningTool {
    strategy: HierarchicalReasoning,
}

impl HierarchicalReasoningTool {
    pub fn new(strategy: HierarchicalReasoning) -> Self {
        Self { strategy }
    }
}

#[async_trait]
impl Tool for HierarchicalReasoningTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "hierarchical_cot",
            "Outline a problem and expand each section level by level",
        )
        .with_parameter(ParameterSchema::new("prompt", "string", "The problem prompt to process").required())
        .with_parameter(
            ParameterSchema::new("depth", "integer", "Number of outline levels (default: 2)")
                .with_default(json!(DEFAULT_HIERARCHICAL_DEPTH)),
        )
        .with_category("reasoning")
    }

    async fn call(&self, args: &Arguments) -> Result<Value> {
        let depth = count_arg(args, "depth", DEFAULT_HIERARCHICAL_DEPTH)?;
        let outcome = self.strategy.run(prompt_arg(args)?, depth).await?;
        Ok(serde_json::to_value(outcome)?)
    }
}

/// `tree_of_thought(prompt, branches, evaluation_depth)`
pub struct TreeOfThoughtTool {
    strategy: TreeOfThought,
}

impl TreeOfThoughtTool {
    pub fn new(strategy: TreeOfThought) -> Self {
        Self { strategy }
    }
}

#[async_trait]
impl Tool for TreeOfThoughtTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "tree_of_thought",
            "Tree-of-Thought reasoning with parallel exploration of multiple paths",
        )
        .with_parameter(ParameterSchema::new("prompt", "string", "The problem prompt to process").required())
        .with_parameter(
            ParameterSchema::new("branches", "integer", "Number of parallel branches (default: 3)")
                .with_default(json!(DEFAULT_BRANCHES)),
        )
        .with_parameter(
            ParameterSchema::new("evaluation_depth", "integer", "Depth of evaluation steps (default: 2)")
                .with_default(json!(DEFAULT_EVALUATION_DEPTH)),
        )
        .with_category("reasoning")
    }

    async fn call(&self, args: &Arguments) -> Result<Value> {
        let branches = count_arg(args, "branches", DEFAULT_BRANCHES)?;
        let evaluation_depth = count_arg(args, "evaluation_depth", DEFAULT_EVALUATION_DEPTH)?;
        let outcome = self
            .strategy
            .run(prompt_arg(args)?, branches, evaluation_depth)
            .await?;
        Ok(serde_json::to_value(outcome)?)
    }
}
