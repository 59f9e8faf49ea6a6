//! Test doubles: a scripted provider and a few tiny tools.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::message::{Message, Role};
use crate::provider::{Completion, GenerationOptions, LlmProvider};
use crate::tool::{Arguments, ParameterSchema, Tool, ToolDefinition};

type Responder =
    Box<dyn Fn(&[Message], &GenerationOptions) -> Result<Completion> + Send + Sync>;

/// A request as seen by the provider
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
    pub options: GenerationOptions,
}

impl RecordedCall {
    pub fn last_user(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

/// Provider whose answers are computed by a closure
pub struct ScriptedProvider {
    responder: Responder,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedProvider {
    pub fn new(
        responder: impl Fn(&[Message], &GenerationOptions) -> Result<Completion> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer with the given completions in order, failing once exhausted
    pub fn sequence(completions: Vec<Completion>) -> Self {
        let queue = Mutex::new(VecDeque::from(completions));
        Self::new(move |_, _| {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AgentError::Provider("script exhausted".into()))
        })
    }

    /// Answer every request with the same text
    pub fn always(content: &str) -> Self {
        let content = content.to_string();
        Self::new(move |_, _| Ok(Completion::text(content.clone())))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        self.calls.lock().unwrap().push(RecordedCall {
            messages: messages.to_vec(),
            tools: tools.iter().map(|t| t.name.clone()).collect(),
            options: options.clone(),
        });
        (self.responder)(messages, options)
    }
}

fn number(args: &Arguments, key: &str) -> Result<f64> {
    args.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| AgentError::ToolValidation(format!("{} must be a number", key)))
}

/// `addition(num1, num2)`
pub struct AdditionTool;

#[async_trait]
impl Tool for AdditionTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("addition", "Calculate the sum of two numbers")
            .with_parameter(ParameterSchema::new("num1", "number", "The first number").required())
            .with_parameter(ParameterSchema::new("num2", "number", "The second number").required())
    }

    async fn call(&self, args: &Arguments) -> Result<Value> {
        Ok(json!(number(args, "num1")? + number(args, "num2")?))
    }
}

/// `echo(text)` returns its input unchanged
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("echo", "Return the text argument")
            .with_parameter(ParameterSchema::new("text", "string", "Text to return").required())
    }

    async fn call(&self, args: &Arguments) -> Result<Value> {
        Ok(args.get("text").cloned().unwrap_or(Value::Null))
    }
}

/// Always returns an error
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("always_fails", "Fails on every call")
    }

    async fn call(&self, _args: &Arguments) -> Result<Value> {
        Err(AgentError::ToolExecution("upstream exploded".into()))
    }
}

/// Panics on every call
pub struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("panics", "Panics on every call")
    }

    async fn call(&self, _args: &Arguments) -> Result<Value> {
        panic!("boom")
    }
}
