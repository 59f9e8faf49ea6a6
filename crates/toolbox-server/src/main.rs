//! toolbox HTTP Server
//!
//! Axum-based server exposing the tool registry, the orchestration loop and
//! the reasoning strategies as JSON endpoints.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toolbox_core::{
    DepthChart, HierarchicalReasoning, HierarchicalReasoningTool, LlmProvider, SequentialReasoning,
    SequentialReasoningTool, ToolRegistry, TreeOfThought, TreeOfThoughtTool,
};
use toolbox_runtime::{FileCheckpointStore, OpenAiCompatibleProvider, ToolboxConfig};
use toolbox_tools::{ArxivConfig, default_registry};

use crate::handlers::{
    health_check, hierarchical_handler, list_tools, sequential_handler, tree_of_thought_handler,
    workflow_handler,
};
use crate::state::AppState;

/// Make each reasoning strategy callable by the model during a workflow
fn register_strategies(
    tools: &mut ToolRegistry,
    provider: &Arc<dyn LlmProvider>,
    config: &ToolboxConfig,
    depth_chart: &DepthChart,
    shutdown: &CancellationToken,
) -> toolbox_core::Result<()> {
    tools.register(SequentialReasoningTool::new(
        SequentialReasoning::new(Arc::clone(provider), config.generation_options())
            .with_cancellation(shutdown.clone()),
    ))?;
    tools.register(HierarchicalReasoningTool::new(
        HierarchicalReasoning::new(depth_chart.clone())
            .max_concurrency(config.max_concurrency)
            .with_cancellation(shutdown.clone()),
    ))?;
    tools.register(TreeOfThoughtTool::new(
        TreeOfThought::new(depth_chart.clone())
            .max_concurrency(config.max_concurrency)
            .with_cancellation(shutdown.clone()),
    ))?;
    Ok(())
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/api/tools", get(list_tools))
        // Orchestration
        .route("/api/workflow", post(workflow_handler))
        // Reasoning strategies
        .route("/api/reasoning/sequential", post(sequential_handler))
        .route("/api/reasoning/hierarchical", post(hierarchical_handler))
        .route("/api/reasoning/tree-of-thought", post(tree_of_thought_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = ToolboxConfig::from_env()?;

    // Initialize LLM provider
    let provider: Arc<dyn LlmProvider> =
        Arc::new(OpenAiCompatibleProvider::new(config.openai_config())?);

    match provider.health_check().await {
        Ok(true) => tracing::info!(base_url = %config.base_url, "✓ Connected to model provider"),
        Ok(false) | Err(_) => {
            tracing::warn!(base_url = %config.base_url, "⚠ Model provider not reachable - requests will fail");
            if config.api_key.is_none() {
                tracing::warn!("  Set TOOLBOX_API_KEY or DEEPINFRA_API_KEY in .env");
            }
        }
    }

    let depth_chart = config.depth_chart(&provider)?;
    tracing::info!(levels = depth_chart.len(), model = %config.model, "Depth chart ready");

    let shutdown = CancellationToken::new();

    // Initialize tools
    let mut tools = default_registry(ArxivConfig::from_env())?;
    register_strategies(&mut tools, &provider, &config, &depth_chart, &shutdown)?;
    tracing::info!("Registered {} tools:", tools.len());
    for name in tools.names() {
        tracing::info!("  • {}", name);
    }

    let checkpoints = FileCheckpointStore::new(config.checkpoint_dir.clone());
    tracing::info!(dir = %checkpoints.dir().display(), "Checkpoints directory");

    let bind_addr = config.bind_addr.clone();

    // Build application state
    let state = AppState {
        provider,
        tools: Arc::new(tools),
        config: Arc::new(config),
        depth_chart,
        checkpoints: Arc::new(checkpoints),
        shutdown: shutdown.clone(),
    };

    let app = router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 toolbox server running on http://{}", bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                         - Health check");
    tracing::info!("  GET  /api/tools                      - Registered tool schemas");
    tracing::info!("  POST /api/workflow                   - Run the tool-calling loop");
    tracing::info!("  POST /api/reasoning/sequential       - Plan, then answer each step");
    tracing::info!("  POST /api/reasoning/hierarchical     - Outline and expand");
    tracing::info!("  POST /api/reasoning/tree-of-thought  - Generate, score and rank branches");
    tracing::info!("");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

/// Wait for Ctrl-C, then cancel every in-flight run
async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
    token.cancel();
}
