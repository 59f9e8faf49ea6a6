//! arXiv export API client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::ArticleSource;
use crate::error::{Result, ToolsError};

pub const DEFAULT_ARXIV_URL: &str = "http://export.arxiv.org/api/query";

/// arXiv client configuration
#[derive(Clone, Debug)]
pub struct ArxivConfig {
    /// Query endpoint; `id_list` is appended as a query parameter
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ARXIV_URL.into(),
            timeout_secs: 30,
        }
    }
}

impl ArxivConfig {
    pub fn from_env() -> Self {
        let base_url = std::env::var("ARXIV_BASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ARXIV_URL.into());

        Self {
            base_url,
            ..Default::default()
        }
    }
}

/// Fetches Atom records from the arXiv export API
pub struct ArxivClient {
    client: Client,
    config: ArxivConfig,
}

impl ArxivClient {
    pub fn new(config: ArxivConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ToolsError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ArxivConfig {
        &self.config
    }
}

#[async_trait]
impl ArticleSource for ArxivClient {
    async fn fetch(&self, id: &str) -> Result<String> {
        tracing::debug!(id, "Fetching arXiv article");
        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[("id_list", id)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ToolsError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    fn name(&self) -> &str {
        "arxiv"
    }
}
