//! Fixed Article Source
//!
//! Serves articles from an in-memory map. For tests and offline demos.

use std::collections::HashMap;

use async_trait::async_trait;

use super::ArticleSource;
use crate::error::{Result, ToolsError};

#[derive(Default)]
pub struct FixedArticleSource {
    articles: HashMap<String, String>,
}

impl FixedArticleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_article(mut self, id: impl Into<String>, body: impl Into<String>) -> Self {
        self.articles.insert(id.into(), body.into());
        self
    }
}

#[async_trait]
impl ArticleSource for FixedArticleSource {
    async fn fetch(&self, id: &str) -> Result<String> {
        self.articles
            .get(id)
            .cloned()
            .ok_or_else(|| ToolsError::UpstreamStatus {
                status: 404,
                body: format!("no article with id {}", id),
            })
    }

    fn name(&self) -> &str {
        "fixed"
    }
}
