//! Application State

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use toolbox_core::{CheckpointStore, DepthChart, LlmProvider, ToolRegistry};
use toolbox_runtime::ToolboxConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Provider for orchestration runs and sequential reasoning
    pub provider: Arc<dyn LlmProvider>,

    /// Tool registry with all available tools
    pub tools: Arc<ToolRegistry>,

    pub config: Arc<ToolboxConfig>,

    /// Model levels for hierarchical and tree-of-thought reasoning
    pub depth_chart: DepthChart,

    /// Where named workflow checkpoints are written
    pub checkpoints: Arc<dyn CheckpointStore>,

    /// Cancelled on shutdown; every request runs under a child token
    pub shutdown: CancellationToken,
}
