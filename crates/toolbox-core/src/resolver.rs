//! Tool-Call Resolver
//!
//! Executes the tool calls of one assistant turn and appends one `tool`
//! message per call to the conversation.
//!
//! An argument value shaped like a tool call is resolved first and replaced
//! by that call's output, so a model can compose calls in a single turn:
//!
//! ```text
//! addition(num1: {"function": {"name": "addition", "arguments": {"num1": 1, "num2": 2}}}, num2: 5)
//!   -> addition(num1: 3, num2: 5) -> 8
//! ```
//!
//! Independent top-level calls run concurrently up to `max_concurrency`;
//! their results are appended in request order.

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use crate::cancel::{cancellable, check_cancelled};
use crate::context::WorkflowContext;
use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message};
use crate::tool::{Arguments, ToolCall, ToolRegistry, ToolResult};

/// Payload substituted when a tool's output is not valid JSON in [`ReturnMode::Json`]
pub const JSON_DECODE_ERROR: &str = "Failed to decode the response as JSON.";

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// How tool outputs are rendered into the conversation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnMode {
    /// Strings verbatim, other values JSON-encoded
    #[default]
    Text,
    /// String outputs are parsed as JSON; the result is always JSON-encoded
    Json,
}

/// A tool call found inside another call's arguments
#[derive(Clone, Debug, PartialEq)]
struct NestedCall {
    name: String,
    arguments: Value,
}

impl NestedCall {
    /// Recognises `{"function": {"name": .., "arguments": ..}}` and
    /// `{"function": "<name>", "arguments": ..}`.
    fn detect(value: &Value) -> Result<Option<Self>> {
        let Some(object) = value.as_object() else {
            return Ok(None);
        };

        let (name, arguments) = match object.get("function") {
            Some(Value::Object(function)) => {
                match (function.get("name").and_then(Value::as_str), function.get("arguments")) {
                    (Some(name), Some(arguments)) => (name, arguments),
                    _ => return Ok(None),
                }
            }
            Some(Value::String(name)) => match object.get("arguments") {
                Some(arguments) => (name.as_str(), arguments),
                None => return Ok(None),
            },
            _ => return Ok(None),
        };

        let arguments = match arguments {
            Value::String(encoded) => {
                serde_json::from_str(encoded).map_err(|e| AgentError::NestedCallFailed {
                    name: name.to_string(),
                    reason: format!("arguments are not valid JSON: {}", e),
                })?
            }
            other => other.clone(),
        };

        Ok(Some(Self {
            name: name.to_string(),
            arguments,
        }))
    }
}

/// Argument value as an object map; `null` is treated as no arguments
fn argument_map(name: &str, arguments: Value) -> std::result::Result<Arguments, String> {
    match arguments {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        Value::String(encoded) => match serde_json::from_str(&encoded) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(format!("arguments for '{}' must be a JSON object", name)),
        },
        _ => Err(format!("arguments for '{}' must be a JSON object", name)),
    }
}

/// Resolves tool calls against a registry
pub struct ToolCallResolver<'a> {
    registry: &'a ToolRegistry,
    context: &'a WorkflowContext,
    return_mode: ReturnMode,
    max_concurrency: usize,
    cancellation: Option<&'a CancellationToken>,
}

impl<'a> ToolCallResolver<'a> {
    pub fn new(registry: &'a ToolRegistry, context: &'a WorkflowContext) -> Self {
        Self {
            registry,
            context,
            return_mode: ReturnMode::Text,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            cancellation: None,
        }
    }

    pub fn return_mode(mut self, mode: ReturnMode) -> Self {
        self.return_mode = mode;
        self
    }

    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    pub fn cancellation(mut self, token: Option<&'a CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Resolve every call, appending one tool message per call in request order.
    ///
    /// An unknown tool or a failed nested call stops the batch with an error;
    /// results for earlier calls stay in the conversation. A top-level tool
    /// that runs and fails is not an error: its failure payload is appended.
    pub async fn resolve(
        &self,
        calls: &[ToolCall],
        conversation: &mut Conversation,
    ) -> Result<Vec<ToolResult>> {
        check_cancelled(self.cancellation)?;

        let pending: Vec<_> = calls.iter().map(|call| self.resolve_call(call)).collect();
        let mut outcomes = std::pin::pin!(stream::iter(pending).buffered(self.max_concurrency));

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let Some(outcome) = cancellable(self.cancellation, outcomes.next()).await? else {
                break;
            };
            let (result, content) = outcome?;
            conversation.push(Message::tool(content, call.id.clone(), call.name.clone()))?;
            results.push(result);
        }

        Ok(results)
    }

    /// Resolve one top-level call, returning its result and rendered content
    async fn resolve_call(&self, call: &ToolCall) -> Result<(ToolResult, String)> {
        let tool = self.registry.resolve(&call.name)?;
        tracing::debug!(tool = %call.name, id = %call.id, "Resolving tool call");

        let args = match argument_map(&call.name, call.arguments.clone()) {
            Ok(args) => self.resolve_arguments(args).await?,
            Err(message) => {
                let result = ToolResult::failure(&call.name, message);
                let content = self.render(&result);
                return Ok((result, content));
            }
        };

        let result = self.coerce(tool.execute(self.context, args).await);
        let content = self.render(&result);
        Ok((result, content))
    }

    async fn resolve_arguments(&self, args: Arguments) -> Result<Arguments> {
        let mut resolved = Map::with_capacity(args.len());
        for (key, value) in args {
            resolved.insert(key, self.resolve_value(value).await?);
        }
        Ok(resolved)
    }

    /// Depth-first replacement of nested calls, directly or inside arrays
    fn resolve_value(&self, value: Value) -> BoxFuture<'_, Result<Value>> {
        async move {
            if let Some(nested) = NestedCall::detect(&value)? {
                return self.execute_nested(nested).await;
            }
            match value {
                Value::Array(items) => {
                    let mut resolved = Vec::with_capacity(items.len());
                    for item in items {
                        resolved.push(self.resolve_value(item).await?);
                    }
                    Ok(Value::Array(resolved))
                }
                other => Ok(other),
            }
        }
        .boxed()
    }

    async fn execute_nested(&self, nested: NestedCall) -> Result<Value> {
        let NestedCall { name, arguments } = nested;
        let tool = self.registry.resolve(&name)?;
        tracing::debug!(tool = %name, "Resolving nested tool call");

        let args = argument_map(&name, arguments).map_err(|reason| AgentError::NestedCallFailed {
            name: name.clone(),
            reason,
        })?;
        let args = self.resolve_arguments(args).await?;

        let result = tool.execute(self.context, args).await;
        if result.success {
            Ok(result.output)
        } else {
            Err(AgentError::NestedCallFailed {
                name,
                reason: result.error.unwrap_or_else(|| "unknown error".into()),
            })
        }
    }

    fn coerce(&self, result: ToolResult) -> ToolResult {
        if self.return_mode != ReturnMode::Json || !result.success {
            return result;
        }
        let Value::String(raw) = &result.output else {
            return result;
        };
        let output = serde_json::from_str(raw).unwrap_or_else(|_| {
            tracing::warn!(tool = %result.name, "Tool output is not valid JSON");
            json!({ "error": JSON_DECODE_ERROR })
        });
        ToolResult { output, ..result }
    }

    fn render(&self, result: &ToolResult) -> String {
        if !result.success {
            return json!({
                "error": result.error,
                "retryable": result.retryable,
            })
            .to_string();
        }
        match (&result.output, self.return_mode) {
            (Value::String(text), ReturnMode::Text) => text.clone(),
            (other, _) => other.to_string(),
        }
    }
}
