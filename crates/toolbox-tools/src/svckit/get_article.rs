//! Article Lookup Tool
//!
//! Fetches a paper's record from an [`ArticleSource`] (arXiv by default).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use toolbox_core::{
    Result as CoreResult,
    tool::{Arguments, ParameterSchema, Tool, ToolDefinition},
};

use crate::error::ToolsError;
use crate::source::ArticleSource;

/// Tool for retrieving an article by id
pub struct GetArticleTool {
    source: Arc<dyn ArticleSource>,
}

impl GetArticleTool {
    pub fn new(source: Arc<dyn ArticleSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Tool for GetArticleTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("get_article", "Get a specific article from arXiv")
            .with_parameter(ParameterSchema::new("id", "string", "The ID of the article").required())
            .with_category("research")
    }

    async fn call(&self, args: &Arguments) -> CoreResult<Value> {
        let id = args
            .get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ToolsError::invalid_argument("id", "expected a non-empty string"))?;

        let body = self.source.fetch(id).await?;
        tracing::debug!(source = self.source.name(), id, bytes = body.len(), "Article fetched");
        Ok(Value::String(body))
    }
}
