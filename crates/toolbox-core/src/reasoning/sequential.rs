//! Sequential chain-of-thought.
//!
//! One call plans the work as a list of step-prompts; each step is then
//! answered by its own call, with the plan and every earlier answer in the
//! transcript. Answers are never revisited.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{MalformedResponse, ModelLevel, parse_json, string_list};
use crate::cancel::{cancellable, check_cancelled, is_cancelled};
use crate::error::Result;
use crate::message::Message;
use crate::provider::{GenerationOptions, LlmProvider};

pub const DEFAULT_STEPS: usize = 3;

/// A step-prompt and the model's answer to it
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepOutput {
    pub step: String,
    pub output: String,
}

/// Parsed plan
#[derive(Clone, Debug, PartialEq)]
pub struct StepPlan {
    pub steps: Vec<String>,
    /// The plan exactly as the model wrote it
    pub raw: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SequentialOutcome {
    Completed {
        plan: Vec<String>,
        steps: Vec<StepOutput>,
    },
    Malformed(MalformedResponse),
    /// Cancelled; carries the steps answered before cancellation
    Aborted {
        plan: Vec<String>,
        steps: Vec<StepOutput>,
    },
}

impl SequentialOutcome {
    /// Step outputs joined with newlines, if the plan could be parsed
    pub fn text(&self) -> Option<String> {
        match self {
            SequentialOutcome::Completed { steps, .. } | SequentialOutcome::Aborted { steps, .. } => {
                Some(steps.iter().map(|s| s.output.as_str()).collect::<Vec<_>>().join("\n"))
            }
            SequentialOutcome::Malformed(_) => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, SequentialOutcome::Completed { .. })
    }
}

pub struct SequentialReasoning {
    level: ModelLevel,
    steps: usize,
    cancellation: Option<CancellationToken>,
}

impl SequentialReasoning {
    pub fn new(provider: Arc<dyn LlmProvider>, options: GenerationOptions) -> Self {
        Self {
            level: ModelLevel::new(provider, options),
            steps: DEFAULT_STEPS,
            cancellation: None,
        }
    }

    /// Number of steps requested from the planner
    pub fn steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    fn plan_prompt(&self, prompt: &str) -> String {
        format!(
            "{prompt}\n\n\
             Given the prompt above, return a series of {n} steps required to arrive at an answer. \
             Do not attempt to compute the answer now. Only return the steps, each written as a \
             prompt for a future LLM call. Respond with a JSON object with one field `steps` \
             containing an array of strings, one string per step. Do not include explanations \
             or markdown code fences.",
            n = self.steps
        )
    }

    /// Ask the model for a step plan.
    ///
    /// The outer `Result` carries transport failures; the inner one reports a
    /// plan that could not be parsed.
    pub async fn plan(&self, prompt: &str) -> Result<std::result::Result<StepPlan, MalformedResponse>> {
        let raw = self
            .level
            .ask(self.plan_prompt(prompt), self.cancellation.as_ref())
            .await?;

        Ok(match parse_steps(&raw) {
            Ok(steps) => Ok(StepPlan { steps, raw }),
            Err(error) => {
                tracing::warn!(%error, "Step plan could not be parsed");
                Err(MalformedResponse::new("plan", error, raw))
            }
        })
    }

    /// Plan, then answer each step in turn
    pub async fn run(&self, prompt: &str) -> Result<SequentialOutcome> {
        let token = self.cancellation.as_ref();

        let plan = match self.plan(prompt).await {
            Ok(Ok(plan)) => plan,
            Ok(Err(malformed)) => return Ok(SequentialOutcome::Malformed(malformed)),
            Err(e) if is_cancelled(&e) => {
                return Ok(SequentialOutcome::Aborted {
                    plan: Vec::new(),
                    steps: Vec::new(),
                });
            }
            Err(e) => return Err(e),
        };

        let mut transcript = vec![Message::user(prompt), Message::assistant(plan.raw.clone())];
        let mut outputs = Vec::with_capacity(plan.steps.len());

        for (i, step) in plan.steps.iter().enumerate() {
            tracing::debug!(step = i + 1, total = plan.steps.len(), "Answering step");
            transcript.push(Message::user(step.clone()));

            let completion = match check_cancelled(token) {
                Ok(()) => {
                    cancellable(
                        token,
                        self.level
                            .provider
                            .complete(&transcript, &[], &self.level.options),
                    )
                    .await
                }
                Err(e) => Err(e),
            };

            let completion = match completion {
                Ok(completion) => completion?,
                Err(_) => {
                    tracing::info!(answered = outputs.len(), "Sequential reasoning cancelled");
                    return Ok(SequentialOutcome::Aborted {
                        plan: plan.steps.clone(),
                        steps: outputs,
                    });
                }
            };

            let output = completion.content.unwrap_or_default();
            transcript.push(Message::assistant(output.clone()));
            outputs.push(StepOutput {
                step: step.clone(),
                output,
            });
        }

        Ok(SequentialOutcome::Completed {
            plan: plan.steps,
            steps: outputs,
        })
    }
}

/// Accepts `{"steps": [...]}` or a bare array
fn parse_steps(content: &str) -> std::result::Result<Vec<String>, String> {
    let value = parse_json(content).map_err(|e| format!("plan is not valid JSON: {}", e))?;
    match &value {
        Value::Object(object) => match object.get("steps") {
            Some(steps @ Value::Array(_)) => Ok(string_list(Some(steps))),
            _ => Err("plan object has no `steps` array".into()),
        },
        Value::Array(_) => Ok(string_list(Some(&value))),
        _ => Err("plan must be a JSON object or array".into()),
    }
}
