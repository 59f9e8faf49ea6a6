//! Tool Chain
//!
//! Runs a fixed list of tools one after another over a shared
//! [`WorkflowContext`]. Each tool's arguments come from the context:
//!
//! - a binding `"{{key}}"` reads `key` from the context data,
//! - any other bound value is passed through as-is,
//! - an unbound parameter reads the context entry with its own name.
//!
//! A successful step stores its output under `<tool>_output` and, when a
//! store is attached, saves an `after_<tool>` checkpoint.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::context::{CheckpointStore, WorkflowContext};
use crate::error::Result;
use crate::tool::{Arguments, Tool, ToolRegistry, ToolResult};

const CHAIN_NAME: &str = "tool_chain";

pub struct ToolChain {
    tools: Vec<Arc<dyn Tool>>,
    bindings: HashMap<String, Map<String, Value>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
}

impl ToolChain {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            tools,
            bindings: HashMap::new(),
            checkpoints: None,
        }
    }

    /// Chain registered tools by name; unknown names fail
    pub fn from_registry<S: AsRef<str>>(registry: &ToolRegistry, names: &[S]) -> Result<Self> {
        let tools = names
            .iter()
            .map(|name| registry.resolve(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(tools))
    }

    /// Bind `param` of `tool` to a `{{key}}` template or a literal value
    pub fn bind(mut self, tool: &str, param: &str, value: impl Into<Value>) -> Self {
        self.bindings
            .entry(tool.to_string())
            .or_default()
            .insert(param.to_string(), value.into());
        self
    }

    /// Save a checkpoint after every successful step
    pub fn checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Seed the context with `initial` and run every tool in order.
    ///
    /// Returns the first failed step's result unchanged, otherwise a success
    /// whose output is the final context data. Errors are reserved for
    /// checkpoint persistence.
    pub async fn execute(&self, context: &WorkflowContext, initial: Map<String, Value>) -> Result<ToolResult> {
        context.extend(initial);

        for tool in &self.tools {
            let definition = tool.definition();
            let name = definition.name.as_str();
            let args = self.arguments(context, name, definition.parameters.iter().map(|p| p.name.as_str()));

            tracing::debug!(tool = %name, "Running chain step");
            let result = tool.execute(context, args).await;
            if !result.success {
                tracing::warn!(tool = %name, error = ?result.error, "Chain stopped");
                return Ok(result);
            }

            context.insert(format!("{}_output", name), result.output);
            if let Some(store) = &self.checkpoints {
                context
                    .save_checkpoint(store.as_ref(), &format!("after_{}", name))
                    .await?;
            }
        }

        Ok(ToolResult::success(CHAIN_NAME, Value::Object(context.data())))
    }

    fn arguments<'p>(
        &self,
        context: &WorkflowContext,
        tool: &str,
        parameters: impl Iterator<Item = &'p str>,
    ) -> Arguments {
        let bound = self.bindings.get(tool);
        let mut args = Arguments::new();
        for param in parameters {
            let value = match bound.and_then(|b| b.get(param)) {
                Some(Value::String(template)) => match template_key(template) {
                    Some(key) => context.get(key),
                    None => Some(Value::String(template.clone())),
                },
                Some(literal) => Some(literal.clone()),
                None => context.get(param),
            };
            if let Some(value) = value {
                args.insert(param.to_string(), value);
            }
        }
        args
    }
}

fn template_key(template: &str) -> Option<&str> {
    template
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::context::MemoryCheckpointStore;
    use crate::testing::{AdditionTool, EchoTool, FailingTool};

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(AdditionTool).unwrap();
        registry.register(EchoTool).unwrap();
        registry.register(FailingTool).unwrap();
        registry
    }

    fn initial(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn template_keys_are_trimmed() {
        assert_eq!(template_key("{{ total }}"), Some("total"));
        assert_eq!(template_key("{{total"), None);
        assert_eq!(template_key("plain"), None);
    }

    #[tokio::test]
    async fn outputs_flow_through_context() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let chain = ToolChain::from_registry(&registry(), &["addition", "echo"])
            .unwrap()
            .bind("addition", "num1", "{{start}}")
            .bind("addition", "num2", 10)
            .bind("echo", "text", "{{addition_output}}")
            .checkpoints(store.clone());
        let context = WorkflowContext::new();

        let result = chain.execute(&context, initial(json!({"start": 5}))).await.unwrap();

        assert!(result.success);
        assert_eq!(result.output["addition_output"], json!(15.0));
        assert_eq!(result.output["echo_output"], json!(15.0));
        assert_eq!(result.output["start"], json!(5));
        assert_eq!(store.names(), vec!["after_addition", "after_echo"]);
        assert_eq!(context.execution_log().len(), 2);
    }

    #[tokio::test]
    async fn unbound_parameters_read_context_by_name() {
        let chain = ToolChain::from_registry(&registry(), &["addition"]).unwrap();
        let context = WorkflowContext::new();

        let result = chain
            .execute(&context, initial(json!({"num1": 1, "num2": 2})))
            .await
            .unwrap();

        assert_eq!(result.output["addition_output"], json!(3.0));
    }

    #[tokio::test]
    async fn first_failure_stops_the_chain() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let chain = ToolChain::from_registry(&registry(), &["echo", "always_fails", "addition"])
            .unwrap()
            .bind("echo", "text", "hello")
            .checkpoints(store.clone());
        let context = WorkflowContext::new();

        let result = chain.execute(&context, Map::new()).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.name, "always_fails");
        assert!(result.retryable);
        assert_eq!(store.names(), vec!["after_echo"]);
        assert!(context.get("addition_output").is_none());
    }

    #[tokio::test]
    async fn unknown_tool_names_are_rejected() {
        let result = ToolChain::from_registry(&registry(), &["addition", "weather"]);

        assert!(matches!(result, Err(crate::error::AgentError::UnknownTool(_))));
    }
}
