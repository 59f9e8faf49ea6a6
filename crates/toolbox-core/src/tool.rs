//! Tool System
//!
//! Extensible tool framework for agent capabilities. A tool pairs a
//! [`ToolDefinition`] (advertised to the model in OpenAI function-calling
//! form) with an async body. Tools are registered in an explicit
//! [`ToolRegistry`] value and invoked through [`Tool::execute`], which never
//! fails: errors and panics in the body become a failed [`ToolResult`].

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::context::{ExecutionRecord, WorkflowContext};
use crate::error::{AgentError, Result};

/// Tool arguments as sent by the model
pub type Arguments = Map<String, Value>;

/// Tool call request from the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier, echoed back by the tool result message
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Arguments object; values may be nested tool calls
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
}

fn empty_arguments() -> Value {
    Value::Object(Map::new())
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Create a call with a freshly generated id
    pub fn generated(name: impl Into<String>, arguments: Value) -> Self {
        Self::new(format!("call_{}", uuid::Uuid::new_v4().simple()), name, arguments)
    }
}

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Whether execution succeeded
    pub success: bool,

    /// Output value (`null` on failure)
    pub output: Value,

    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether the caller may retry the same call
    pub retryable: bool,

    /// Wall-clock execution time
    pub duration_ms: u64,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: Value) -> Self {
        Self {
            name: name.into(),
            success: true,
            output,
            error: None,
            retryable: false,
            duration_ms: 0,
        }
    }

    /// Failed execution. Every failure is currently considered retryable.
    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            output: Value::Null,
            error: Some(error.into()),
            retryable: true,
            duration_ms: 0,
        }
    }

    fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, integer, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    pub fn new(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: false,
            default: None,
            enum_values: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    fn property(&self) -> Value {
        let mut property = json!({
            "type": self.param_type,
            "description": self.description,
        });
        if let Some(object) = property.as_object_mut() {
            if let Some(default) = &self.default {
                object.insert("default".into(), default.clone());
            }
            if let Some(values) = &self.enum_values {
                object.insert("enum".into(), Value::Array(values.clone()));
            }
        }
        property
    }
}

/// Tool definition schema (for LLM function calling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions, in declaration order
    pub parameters: Vec<ParameterSchema>,

    /// Category for grouping
    #[serde(default)]
    pub category: Option<String>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            category: None,
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterSchema) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// OpenAI function-calling schema advertised to the model
    pub fn to_function_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.property()))
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's definition for LLM function calling
    fn definition(&self) -> ToolDefinition;

    /// The tool body. Errors are reported through [`Tool::execute`].
    async fn call(&self, args: &Arguments) -> Result<Value>;

    /// Validate arguments before execution
    fn validate(&self, args: &Arguments) -> Result<()> {
        let definition = self.definition();

        for param in &definition.parameters {
            if param.required && !args.contains_key(&param.name) {
                return Err(AgentError::ToolValidation(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
        }

        Ok(())
    }

    /// Validate, run and time the tool body, recording the invocation in
    /// `context`. Never fails: an error or panic in the body becomes a
    /// retryable failed result.
    async fn execute(&self, context: &WorkflowContext, args: Arguments) -> ToolResult {
        let name = self.definition().name;
        let started = Instant::now();

        let outcome = match self.validate(&args) {
            Err(e) => Err(e.to_string()),
            Ok(()) => match AssertUnwindSafe(self.call(&args)).catch_unwind().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(e.to_string()),
                Err(panic) => Err(panic_message(panic.as_ref())),
            },
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match outcome {
            Ok(output) => ToolResult::success(&name, output),
            Err(error) => {
                tracing::warn!(tool = %name, %error, "Tool execution failed");
                ToolResult::failure(&name, error)
            }
        }
        .with_duration(duration_ms);

        tracing::debug!(tool = %name, duration_ms, success = result.success, "Tool executed");
        context.log_execution(ExecutionRecord {
            tool: name,
            duration_ms,
            input: Value::Object(args),
            output: result.output.clone(),
            success: result.success,
        });

        result
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("tool panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("tool panicked: {}", message)
    } else {
        "tool panicked".into()
    }
}

/// Registry for available tools
///
/// Names are unique: registering a second tool under an existing name fails
/// with [`AgentError::DuplicateTool`]. Definitions are listed in
/// registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.definition().name;
        if self.index.contains_key(&name) {
            return Err(AgentError::DuplicateTool(name));
        }
        tracing::debug!(tool = %name, "Registered tool");
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    /// Resolve a model-issued tool name
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.get(name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))
    }

    /// Execute a tool by name. Only an unknown name is an error.
    pub async fn execute(
        &self,
        context: &WorkflowContext,
        name: &str,
        args: Arguments,
    ) -> Result<ToolResult> {
        let tool = self.resolve(name)?;
        Ok(tool.execute(context, args).await)
    }

    /// All tool definitions, in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.definition().name).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{AdditionTool, FailingTool, PanickingTool};

    fn args(value: Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_tool_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(AdditionTool).unwrap();
        registry.register(FailingTool).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["addition", "always_fails"]);
        assert_eq!(registry.resolve("addition").unwrap().definition().name, "addition");
        assert!(matches!(
            registry.resolve("unknown"),
            Err(AgentError::UnknownTool(name)) if name == "unknown"
        ));
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = ToolRegistry::new();
        registry.register(AdditionTool).unwrap();

        let err = registry.register(AdditionTool).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(name) if name == "addition"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn function_schema_matches_openai_shape() {
        let schema = AdditionTool.definition().to_function_schema();

        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "addition");
        assert_eq!(schema["function"]["parameters"]["type"], "object");
        assert_eq!(
            schema["function"]["parameters"]["properties"]["num1"]["type"],
            "number"
        );
        assert_eq!(schema["function"]["parameters"]["required"], json!(["num1", "num2"]));
    }

    #[tokio::test]
    async fn execute_records_success_in_log() {
        let context = WorkflowContext::new();
        let result = AdditionTool
            .execute(&context, args(json!({"num1": 2, "num2": 3})))
            .await;

        assert!(result.success);
        assert_eq!(result.output, json!(5.0));
        let log = context.execution_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].tool, "addition");
        assert_eq!(log[0].input, json!({"num1": 2, "num2": 3}));
    }

    #[tokio::test]
    async fn execute_converts_errors_to_retryable_failures() {
        let context = WorkflowContext::new();
        let result = FailingTool.execute(&context, Arguments::new()).await;

        assert!(!result.success);
        assert!(result.retryable);
        assert_eq!(result.output, Value::Null);
        assert!(result.error.unwrap().contains("upstream exploded"));
    }

    #[tokio::test]
    async fn execute_converts_panics_to_retryable_failures() {
        let context = WorkflowContext::new();
        let result = PanickingTool.execute(&context, Arguments::new()).await;

        assert!(!result.success);
        assert!(result.retryable);
        assert!(result.error.unwrap().contains("tool panicked"));
    }

    #[tokio::test]
    async fn missing_required_argument_is_a_failed_result() {
        let context = WorkflowContext::new();
        let result = AdditionTool
            .execute(&context, args(json!({"num1": 2})))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("num2"));
    }
}
