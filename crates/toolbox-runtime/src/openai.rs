//! OpenAI-compatible LLM Provider
//!
//! Implementation of `LlmProvider` for any server exposing the
//! `/chat/completions` API with function calling (DeepInfra, OpenAI, vLLM,
//! llama.cpp server, ...).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use toolbox_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{Completion, FinishReason, GenerationOptions, LlmProvider, TokenUsage, ToolChoice},
    tool::{ToolCall, ToolDefinition},
};

pub const DEFAULT_BASE_URL: &str = "https://api.deepinfra.com/v1/openai";

/// Provider connection configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// Base URL; `/chat/completions` is appended
    pub base_url: String,

    /// Bearer token, omitted from requests when absent
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

impl OpenAiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// `TOOLBOX_BASE_URL`, then `TOOLBOX_API_KEY` or `DEEPINFRA_API_KEY`
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("TOOLBOX_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let api_key = std::env::var("TOOLBOX_API_KEY")
            .or_else(|_| std::env::var("DEEPINFRA_API_KEY"))
            .ok()
            .filter(|key| !key.is_empty());

        Self {
            base_url,
            api_key,
            ..Default::default()
        }
    }
}

/// OpenAI-compatible chat-completions provider
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAiConfig::from_env())
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Convert toolbox messages to the wire format
    fn convert_messages(messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| {
                let tool_calls = (!m.tool_calls.is_empty())
                    .then(|| m.tool_calls.iter().map(WireToolCall::from_call).collect());
                // Assistant turns that only request tools carry a null content
                let content = match m.role {
                    Role::Assistant if m.content.is_empty() && tool_calls.is_some() => None,
                    _ => Some(m.content.clone()),
                };
                WireMessage {
                    role: m.role.to_string(),
                    content,
                    tool_calls,
                    tool_call_id: m.tool_call_id.clone(),
                    name: m.name.clone(),
                }
            })
            .collect()
    }

    fn build_request(
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &GenerationOptions,
    ) -> WireRequest {
        let has_tools = !tools.is_empty();
        WireRequest {
            model: options.model.clone(),
            messages: Self::convert_messages(messages),
            tools: has_tools.then(|| tools.iter().map(ToolDefinition::to_function_schema).collect()),
            tool_choice: options
                .tool_choice
                .as_ref()
                .filter(|_| has_tools)
                .map(tool_choice_value),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        }
    }

    /// Convert a wire response to a toolbox completion
    fn convert_completion(response: WireResponse, model: &str) -> Result<Completion> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("response contained no choices".into()))?;

        Ok(Completion {
            content: choice.message.content,
            tool_calls: choice
                .message
                .tool_calls
                .into_iter()
                .map(WireToolCall::into_call)
                .collect(),
            model: response.model.unwrap_or_else(|| model.to_string()),
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason: choice.finish_reason.as_deref().and_then(finish_reason),
        })
    }
}

fn tool_choice_value(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Function(name) => json!({"type": "function", "function": {"name": name}}),
    }
}

fn finish_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "tool_calls" | "function_call" => Some(FinishReason::ToolUse),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

fn status_error(status: StatusCode, body: String) -> AgentError {
    match status.as_u16() {
        401 | 403 => AgentError::Auth(body),
        429 => AgentError::RateLimited(body),
        500..=599 => AgentError::ProviderUnavailable(format!("status {}: {}", status, body)),
        _ => AgentError::Provider(format!("status {}: {}", status, body)),
    }
}

fn transport_error(e: &reqwest::Error) -> AgentError {
    if e.is_timeout() || e.is_connect() {
        AgentError::ProviderUnavailable(e.to_string())
    } else {
        AgentError::Provider(e.to_string())
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self.request(self.client.get(self.url("models"))).send().await;
        match response {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!("Provider health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let request = Self::build_request(messages, tools, options);
        tracing::debug!(
            model = %options.model,
            messages = messages.len(),
            tools = tools.len(),
            "Sending chat completion request"
        );

        let response = self
            .request(self.client.post(self.url("chat/completions")))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "Chat completion request failed");
            return Err(status_error(status, body));
        }

        let body: WireResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("invalid response body: {}", e)))?;
        Self::convert_completion(body, &options.model)
    }
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunction,
}

fn function_kind() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded arguments object
    #[serde(default)]
    arguments: Value,
}

impl WireToolCall {
    fn from_call(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_kind(),
            function: WireFunction {
                name: call.name.clone(),
                arguments: Value::String(call.arguments.to_string()),
            },
        }
    }

    /// Arguments arrive as a JSON string; undecodable strings are kept as-is
    /// so the resolver reports them against the call.
    fn into_call(self) -> ToolCall {
        let arguments = match self.function.arguments {
            Value::String(raw) if raw.trim().is_empty() => json!({}),
            Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
            Value::Null => json!({}),
            other => other,
        };
        ToolCall::new(self.id, self.function.name, arguments)
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    model: Option<String>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use toolbox_core::tool::ParameterSchema;

    use super::*;

    fn addition_definition() -> ToolDefinition {
        ToolDefinition::new("addition", "Calculate the sum of two numbers")
            .with_parameter(ParameterSchema::new("num1", "number", "The first number").required())
            .with_parameter(ParameterSchema::new("num2", "number", "The second number").required())
    }

    #[test]
    fn test_config_defaults() {
        let config = OpenAiConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_request_wire_format() {
        let call = ToolCall::new("call_1", "addition", json!({"num1": 1, "num2": 2}));
        let messages = vec![
            Message::system("You are helpful."),
            Message::user("What is 1 + 2?"),
            Message::assistant_with_calls(None, vec![call]),
            Message::tool("3.0", "call_1", "addition"),
        ];
        let options = GenerationOptions::with_model("test-model").tool_choice(ToolChoice::Auto);

        let request = OpenAiCompatibleProvider::build_request(
            &messages,
            &[addition_definition()],
            &options,
        );
        let wire = serde_json::to_value(&request).unwrap();

        assert_eq!(wire["model"], "test-model");
        assert_eq!(wire["tool_choice"], "auto");
        assert_eq!(wire["tools"][0]["function"]["name"], "addition");
        assert_eq!(wire["messages"][2]["content"], Value::Null);
        assert_eq!(wire["messages"][2]["tool_calls"][0]["type"], "function");
        assert_eq!(
            wire["messages"][2]["tool_calls"][0]["function"]["arguments"],
            r#"{"num1":1,"num2":2}"#
        );
        assert_eq!(wire["messages"][3]["role"], "tool");
        assert_eq!(wire["messages"][3]["tool_call_id"], "call_1");
        assert!(wire.get("max_tokens").is_none());
    }

    #[test]
    fn test_tool_choice_omitted_without_tools() {
        let options = GenerationOptions::default().tool_choice(ToolChoice::Required);
        let request = OpenAiCompatibleProvider::build_request(&[Message::user("hi")], &[], &options);
        let wire = serde_json::to_value(&request).unwrap();

        assert!(wire.get("tools").is_none());
        assert!(wire.get("tool_choice").is_none());
    }

    #[test]
    fn test_response_conversion() {
        let body = json!({
            "model": "served-model",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [
                        {"id": "call_a", "type": "function", "function": {"name": "addition", "arguments": "{\"num1\": 1, \"num2\": 2}"}},
                        {"id": "call_b", "type": "function", "function": {"name": "addition", "arguments": "not json"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let response: WireResponse = serde_json::from_value(body).unwrap();

        let completion = OpenAiCompatibleProvider::convert_completion(response, "requested").unwrap();

        assert!(completion.requests_tools());
        assert_eq!(completion.model, "served-model");
        assert_eq!(completion.finish_reason, Some(FinishReason::ToolUse));
        assert_eq!(completion.tool_calls[0].arguments, json!({"num1": 1, "num2": 2}));
        assert_eq!(completion.tool_calls[1].arguments, json!("not json"));
        assert_eq!(completion.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_empty_choices_is_an_error() {
        let response: WireResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(OpenAiCompatibleProvider::convert_completion(response, "m").is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, String::new()),
            AgentError::Auth(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, String::new()),
            AgentError::RateLimited(_)
        ));
        assert!(status_error(StatusCode::BAD_GATEWAY, String::new()).is_retryable());
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "bad".into()),
            AgentError::Provider(_)
        ));
    }
}
