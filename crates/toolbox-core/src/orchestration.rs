//! Orchestration Loop
//!
//! Alternates model turns and tool resolution until the model answers
//! without requesting tools, the step budget runs out, or the run is
//! cancelled. Every model turn sees the whole conversation and every
//! registered tool definition.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use crate::cancel::{cancellable, check_cancelled, is_cancelled};
use crate::context::{Checkpoint, ExecutionRecord, WorkflowContext};
use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message};
use crate::provider::{GenerationOptions, LlmProvider};
use crate::reasoning::SequentialReasoning;
use crate::resolver::{DEFAULT_MAX_CONCURRENCY, ReturnMode, ToolCallResolver};
use crate::tool::{Tool, ToolCall, ToolRegistry};

pub const DEFAULT_MAX_STEPS: usize = 5;

/// Orchestrator configuration
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Optional system prompt placed before the user prompt
    pub system_prompt: Option<String>,

    /// Maximum model turns per run
    pub max_steps: usize,

    /// Generation options for every model turn
    pub generation: GenerationOptions,

    /// How tool outputs are rendered into the conversation
    pub return_mode: ReturnMode,

    /// Tool calls of one turn executed at once
    pub max_concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_steps: DEFAULT_MAX_STEPS,
            generation: GenerationOptions::default(),
            return_mode: ReturnMode::Text,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// How a run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// The model answered without requesting tools
    Completed,
    /// `max_steps` model turns elapsed
    StepBudgetExhausted,
    /// The cancellation token fired
    Cancelled,
}

#[derive(Clone, Debug, Serialize)]
pub struct WorkflowOutcome {
    pub status: WorkflowStatus,
    pub conversation: Conversation,
    /// Model turns taken
    pub steps: usize,
    pub execution_log: Vec<ExecutionRecord>,
}

impl WorkflowOutcome {
    /// Last assistant text, if the run completed
    pub fn final_answer(&self) -> Option<&str> {
        match self.status {
            WorkflowStatus::Completed => self.conversation.final_answer(),
            _ => None,
        }
    }

    /// Snapshot of the run: status, final answer and execution log
    pub fn checkpoint(&self) -> Checkpoint {
        let mut data = Map::new();
        data.insert("status".into(), json!(self.status));
        data.insert("steps".into(), json!(self.steps));
        data.insert(
            "final_answer".into(),
            self.final_answer().map_or(Value::Null, |answer| json!(answer)),
        );
        Checkpoint {
            data,
            execution_log: self.execution_log.clone(),
            timestamp: Utc::now(),
        }
    }
}

enum LoopState {
    AwaitingModel,
    AwaitingToolResolution(Vec<ToolCall>),
}

pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    config: OrchestratorConfig,
    cancellation: Option<CancellationToken>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            config,
            cancellation: None,
        }
    }

    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Optional system prompt followed by the user prompt
    pub fn start(&self, prompt: &str) -> Result<Conversation> {
        let mut conversation = match &self.config.system_prompt {
            Some(system) => Conversation::with_system_prompt(system.clone()),
            None => Conversation::new(),
        };
        conversation.push(Message::user(prompt))?;
        Ok(conversation)
    }

    /// Run the loop on a single user prompt
    pub async fn execute_workflow(&self, prompt: &str) -> Result<WorkflowOutcome> {
        let conversation = self.start(prompt)?;
        self.run(conversation).await
    }

    /// Ask `planner` for a step plan, record it as an assistant turn, then run the loop
    pub async fn execute_planned(
        &self,
        prompt: &str,
        planner: &SequentialReasoning,
    ) -> Result<WorkflowOutcome> {
        let mut conversation = self.start(prompt)?;

        match planner.plan(prompt).await {
            Ok(Ok(plan)) => {
                tracing::debug!(steps = plan.steps.len(), "Recording step plan");
                let content = json!({ "steps": plan.steps }).to_string();
                conversation.push(Message::assistant(content))?;
            }
            Ok(Err(malformed)) => {
                tracing::warn!(error = %malformed.error, "Ignoring malformed step plan");
            }
            Err(e) if is_cancelled(&e) => {
                return Ok(WorkflowOutcome {
                    status: WorkflowStatus::Cancelled,
                    conversation,
                    steps: 0,
                    execution_log: Vec::new(),
                });
            }
            Err(e) => return Err(e),
        }

        self.run(conversation).await
    }

    /// Drive an existing conversation to a terminal state
    pub async fn run(&self, mut conversation: Conversation) -> Result<WorkflowOutcome> {
        let token = self.cancellation.as_ref();
        let context = WorkflowContext::new();
        let definitions = self.registry.definitions();
        let resolver = ToolCallResolver::new(&self.registry, &context)
            .return_mode(self.config.return_mode)
            .max_concurrency(self.config.max_concurrency)
            .cancellation(token);

        let mut steps = 0;
        let mut state = LoopState::AwaitingModel;

        let status = loop {
            state = match state {
                LoopState::AwaitingModel => {
                    if steps >= self.config.max_steps {
                        tracing::warn!(max_steps = self.config.max_steps, "Step budget exhausted");
                        break WorkflowStatus::StepBudgetExhausted;
                    }

                    let completion = match check_cancelled(token) {
                        Ok(()) => {
                            cancellable(
                                token,
                                self.provider.complete(
                                    conversation.messages(),
                                    &definitions,
                                    &self.config.generation,
                                ),
                            )
                            .await
                        }
                        Err(e) => Err(e),
                    };
                    let mut completion = match completion {
                        Ok(completion) => completion?,
                        Err(_) => break WorkflowStatus::Cancelled,
                    };
                    steps += 1;

                    for call in &mut completion.tool_calls {
                        if call.id.is_empty() {
                            let arguments = std::mem::take(&mut call.arguments);
                            *call = ToolCall::generated(call.name.clone(), arguments);
                        }
                    }
                    let calls = completion.tool_calls.clone();
                    tracing::debug!(step = steps, tool_calls = calls.len(), "Model turn");
                    conversation.push(completion.into_message())?;

                    if calls.is_empty() {
                        break WorkflowStatus::Completed;
                    }
                    LoopState::AwaitingToolResolution(calls)
                }
                LoopState::AwaitingToolResolution(calls) => {
                    match resolver.resolve(&calls, &mut conversation).await {
                        Ok(results) => {
                            let failed = results.iter().filter(|r| !r.success).count();
                            tracing::debug!(step = steps, resolved = results.len(), failed, "Tool calls resolved");
                        }
                        Err(e) if is_cancelled(&e) => break WorkflowStatus::Cancelled,
                        Err(e) => return Err(e),
                    }
                    LoopState::AwaitingModel
                }
            };
        };

        tracing::info!(?status, steps, "Workflow finished");
        Ok(WorkflowOutcome {
            status,
            conversation,
            steps,
            execution_log: context.execution_log(),
        })
    }
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    registry: Option<Arc<ToolRegistry>>,
    tools: ToolRegistry,
    registration_error: Option<AgentError>,
    config: OrchestratorConfig,
    cancellation: Option<CancellationToken>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            registry: None,
            tools: ToolRegistry::new(),
            registration_error: None,
            config: OrchestratorConfig::default(),
            cancellation: None,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Use a registry shared with other runs
    pub fn registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register a tool on a registry owned by this orchestrator
    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        if let Err(e) = self.tools.register(tool) {
            self.registration_error.get_or_insert(e);
        }
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn generation(mut self, options: GenerationOptions) -> Self {
        self.config.generation = options;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    pub fn max_steps(mut self, max: usize) -> Self {
        self.config.max_steps = max;
        self
    }

    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.config.max_concurrency = limit;
        self
    }

    pub fn return_mode(mut self, mode: ReturnMode) -> Self {
        self.config.return_mode = mode;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        if let Some(e) = self.registration_error {
            return Err(e);
        }
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        let registry = match self.registry {
            Some(_) if !self.tools.is_empty() => {
                return Err(AgentError::Config(
                    "Tools cannot be added to a shared registry".into(),
                ));
            }
            Some(shared) => shared,
            None => Arc::new(self.tools),
        };

        Ok(Orchestrator {
            provider,
            registry,
            config: self.config,
            cancellation: self.cancellation,
        })
    }
}
