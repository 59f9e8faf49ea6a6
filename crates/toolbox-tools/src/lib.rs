//! # toolbox-tools
//!
//! Leaf tools for the toolbox registry.
//!
//! | tool | arguments | result |
//! |---|---|---|
//! | `addition` | `num1`, `num2` | `num1 + num2` |
//! | `subtraction` | `num1`, `num2` | `num1 - num2` |
//! | `exponents` | `base`, `power` | `base ^ power` |
//! | `get_article` | `id` | raw arXiv Atom record |
//!
//! Each tool takes its configuration through its constructor; nothing is
//! read from globals at call time.

pub mod error;
pub mod source;
pub mod svckit;

use std::sync::Arc;

use toolbox_core::ToolRegistry;

pub use error::{Result, ToolsError};
pub use source::{ArticleSource, ArxivClient, ArxivConfig, FixedArticleSource};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{AdditionTool, ExponentsTool, GetArticleTool, SubtractionTool};
}

/// Register the arithmetic tools and `get_article` backed by `articles`
pub fn register_defaults(
    registry: &mut ToolRegistry,
    articles: Arc<dyn ArticleSource>,
) -> toolbox_core::Result<()> {
    registry.register(tools::AdditionTool)?;
    registry.register(tools::SubtractionTool)?;
    registry.register(tools::ExponentsTool)?;
    registry.register(tools::GetArticleTool::new(articles))?;
    Ok(())
}

/// Registry with the default tools, fetching articles from arXiv
pub fn default_registry(arxiv: ArxivConfig) -> toolbox_core::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    register_defaults(&mut registry, Arc::new(ArxivClient::new(arxiv)?))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use toolbox_core::{AgentError, Conversation, Message, ToolCall, ToolCallResolver, WorkflowContext};

    use super::*;

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        register_defaults(&mut registry, Arc::new(FixedArticleSource::new())).unwrap();
        registry
    }

    #[test]
    fn test_defaults_in_registration_order() {
        assert_eq!(
            registry().names(),
            vec!["addition", "subtraction", "exponents", "get_article"]
        );
    }

    #[test]
    fn test_registering_twice_fails() {
        let mut registry = registry();
        let err = register_defaults(&mut registry, Arc::new(FixedArticleSource::new())).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(ref name) if name == "addition"));
    }

    #[tokio::test]
    async fn test_nested_math_resolves_inner_first() {
        let registry = registry();
        let context = WorkflowContext::new();
        let call = ToolCall::new(
            "call_1",
            "exponents",
            json!({
                "base": {"function": {"name": "subtraction", "arguments": {"num1": 7, "num2": 4}}},
                "power": {"function": "addition", "arguments": "{\"num1\": 1, \"num2\": 1}"}
            }),
        );
        let mut conversation = Conversation::new();
        conversation.push(Message::user("(7 - 4) ^ (1 + 1)?")).unwrap();
        conversation
            .push(Message::assistant_with_calls(None, vec![call.clone()]))
            .unwrap();

        let results = ToolCallResolver::new(&registry, &context)
            .resolve(&[call], &mut conversation)
            .await
            .unwrap();

        assert_eq!(results[0].output, json!(9.0));
        assert_eq!(conversation.last().unwrap().content, "9.0");
        let order: Vec<_> = context.execution_log().iter().map(|r| r.tool.clone()).collect();
        assert_eq!(order, vec!["subtraction", "addition", "exponents"]);
    }
}
