//! Article Sources
//!
//! Where the article tool fetches papers from.

mod arxiv;
mod fixed;

pub use arxiv::{ArxivClient, ArxivConfig, DEFAULT_ARXIV_URL};
pub use fixed::FixedArticleSource;

use async_trait::async_trait;

use crate::error::Result;

/// Article source trait (Strategy pattern)
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Fetch the raw record for one article id
    async fn fetch(&self, id: &str) -> Result<String>;

    /// Source name
    fn name(&self) -> &str;
}
