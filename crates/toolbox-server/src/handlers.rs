//! HTTP Handlers

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use toolbox_core::{
    AgentError, HierarchicalOutcome, HierarchicalReasoning, Orchestrator, ReturnMode,
    SequentialOutcome, SequentialReasoning, TreeOfThought, TreeOfThoughtOutcome, WorkflowOutcome,
    reasoning::{
        sequential::DEFAULT_STEPS,
        tree_of_thought::{DEFAULT_BRANCHES, DEFAULT_EVALUATION_DEPTH},
    },
};

use crate::state::AppState;

/// Levels produced by `/api/reasoning/hierarchical` when the request omits `depth`
const DEFAULT_HIERARCHY_DEPTH: usize = 2;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: String,
    pub provider_connected: bool,
    pub tools: usize,
    pub depth_levels: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct WorkflowRequest {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub max_steps: Option<usize>,
    #[serde(default)]
    pub return_mode: Option<ReturnMode>,
    /// Ask for a step plan before the loop starts
    #[serde(default)]
    pub plan: bool,
    /// Save a checkpoint of the finished run under this name
    #[serde(default)]
    pub checkpoint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub final_answer: Option<String>,
    #[serde(flatten)]
    pub outcome: WorkflowOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SequentialRequest {
    pub prompt: String,
    #[serde(default)]
    pub steps: Option<usize>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SequentialResponse {
    pub text: Option<String>,
    #[serde(flatten)]
    pub outcome: SequentialOutcome,
}

#[derive(Debug, Deserialize)]
pub struct HierarchicalRequest {
    pub prompt: String,
    #[serde(default)]
    pub depth: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TreeOfThoughtRequest {
    pub prompt: String,
    #[serde(default)]
    pub branches: Option<usize>,
    #[serde(default)]
    pub evaluation_depth: Option<usize>,
}

// ============================================================================
// Errors
// ============================================================================

/// HTTP status for an engine error
pub fn status_for(error: &AgentError) -> StatusCode {
    match error {
        AgentError::UnknownTool(_)
        | AgentError::DuplicateTool(_)
        | AgentError::ToolValidation(_)
        | AgentError::NestedCallFailed { .. }
        | AgentError::DepthConfigurationExceeded { .. }
        | AgentError::Conversation(_) => StatusCode::BAD_REQUEST,
        AgentError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        AgentError::Provider(_) | AgentError::Auth(_) | AgentError::MalformedResponse(_) => {
            StatusCode::BAD_GATEWAY
        }
        AgentError::ProviderUnavailable(_) | AgentError::Cancelled => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AgentError::ToolExecution(_)
        | AgentError::Config(_)
        | AgentError::Io(_)
        | AgentError::Json(_)
        | AgentError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn engine_error(error: AgentError) -> (StatusCode, Json<ErrorResponse>) {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!(code = error.code(), "Request failed: {}", error);
    } else {
        tracing::warn!(code = error.code(), "Request rejected: {}", error);
    }
    (
        status,
        Json(ErrorResponse {
            error: error.user_message(),
            code: error.code().into(),
        }),
    )
}

fn invalid_request(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            code: "INVALID_REQUEST".into(),
        }),
    )
}

fn require_prompt(prompt: &str) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if prompt.trim().is_empty() {
        return Err(invalid_request("prompt must not be empty"));
    }
    Ok(())
}

fn at_least_one(value: usize, field: &str) -> Result<usize, (StatusCode, Json<ErrorResponse>)> {
    if value == 0 {
        return Err(invalid_request(format!("{} must be at least 1", field)));
    }
    Ok(value)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider_connected = state.provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.provider.name().to_string(),
        provider_connected,
        tools: state.tools.len(),
        depth_levels: state.depth_chart.len(),
    })
}

/// Function schemas of every registered tool, in registration order
pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<Value>> {
    Json(
        state
            .tools
            .definitions()
            .iter()
            .map(|definition| definition.to_function_schema())
            .collect(),
    )
}

/// Run the orchestration loop on one prompt
pub async fn workflow_handler(
    State(state): State<AppState>,
    Json(payload): Json<WorkflowRequest>,
) -> ApiResult<WorkflowResponse> {
    require_prompt(&payload.prompt)?;

    let mut config = state.config.orchestrator_config();
    if let Some(model) = payload.model {
        config.generation.model = model;
    }
    if let Some(max_steps) = payload.max_steps {
        config.max_steps = at_least_one(max_steps, "max_steps")?;
    }
    if let Some(mode) = payload.return_mode {
        config.return_mode = mode;
    }
    config.system_prompt = payload.system_prompt;

    let token = state.shutdown.child_token();
    let generation = config.generation.clone();
    let orchestrator = Orchestrator::new(state.provider.clone(), state.tools.clone(), config)
        .with_cancellation(token.clone());

    let outcome = if payload.plan {
        let planner = SequentialReasoning::new(state.provider.clone(), generation)
            .with_cancellation(token);
        orchestrator.execute_planned(&payload.prompt, &planner).await
    } else {
        orchestrator.execute_workflow(&payload.prompt).await
    }
    .map_err(engine_error)?;

    tracing::info!(
        status = ?outcome.status,
        steps = outcome.steps,
        tool_calls = outcome.execution_log.len(),
        "Workflow finished"
    );

    if let Some(name) = &payload.checkpoint {
        state
            .checkpoints
            .save(name, &outcome.checkpoint())
            .await
            .map_err(engine_error)?;
    }

    Ok(Json(WorkflowResponse {
        final_answer: outcome.final_answer().map(str::to_string),
        outcome,
        checkpoint: payload.checkpoint,
    }))
}

/// Plan-then-execute reasoning
pub async fn sequential_handler(
    State(state): State<AppState>,
    Json(payload): Json<SequentialRequest>,
) -> ApiResult<SequentialResponse> {
    require_prompt(&payload.prompt)?;
    let steps = at_least_one(payload.steps.unwrap_or(DEFAULT_STEPS), "steps")?;

    let mut options = state.config.generation_options();
    if let Some(model) = payload.model {
        options.model = model;
    }

    let outcome = SequentialReasoning::new(state.provider.clone(), options)
        .steps(steps)
        .with_cancellation(state.shutdown.child_token())
        .run(&payload.prompt)
        .await
        .map_err(engine_error)?;

    Ok(Json(SequentialResponse {
        text: outcome.text(),
        outcome,
    }))
}

/// Outline and expand across the depth chart
pub async fn hierarchical_handler(
    State(state): State<AppState>,
    Json(payload): Json<HierarchicalRequest>,
) -> ApiResult<HierarchicalOutcome> {
    require_prompt(&payload.prompt)?;
    let depth = at_least_one(payload.depth.unwrap_or(DEFAULT_HIERARCHY_DEPTH), "depth")?;

    HierarchicalReasoning::new(state.depth_chart.clone())
        .max_concurrency(state.config.max_concurrency)
        .with_cancellation(state.shutdown.child_token())
        .run(&payload.prompt, depth)
        .await
        .map(Json)
        .map_err(engine_error)
}

/// Generate, score and rank candidate approaches
pub async fn tree_of_thought_handler(
    State(state): State<AppState>,
    Json(payload): Json<TreeOfThoughtRequest>,
) -> ApiResult<TreeOfThoughtOutcome> {
    require_prompt(&payload.prompt)?;
    let branches = at_least_one(payload.branches.unwrap_or(DEFAULT_BRANCHES), "branches")?;
    let evaluation_depth = at_least_one(
        payload.evaluation_depth.unwrap_or(DEFAULT_EVALUATION_DEPTH),
        "evaluation_depth",
    )?;

    TreeOfThought::new(state.depth_chart.clone())
        .max_concurrency(state.config.max_concurrency)
        .with_cancellation(state.shutdown.child_token())
        .run(&payload.prompt, branches, evaluation_depth)
        .await
        .map(Json)
        .map_err(engine_error)
}
