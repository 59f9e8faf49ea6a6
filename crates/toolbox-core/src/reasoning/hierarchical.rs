//! Hierarchical chain-of-thought.
//!
//! Level 0 writes an outline (`{title, sections}`); every following level
//! expands each section of the current node into its own sub-outline, using
//! the model configuration bound to that level in the [`DepthChart`].
//!
//! A section whose expansion fails (request error, unparseable output, no
//! `title`) stays as it was and is reported in the error log; its siblings
//! are still expanded. Asking for more levels than the chart configures is
//! a hard [`AgentError::DepthConfigurationExceeded`], raised before any
//! model call.
//!
//! `max_concurrency` caps in-flight expansion requests across the whole
//! tree, not per parent node.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::{DepthChart, MalformedResponse, ModelLevel, parse_json};
use crate::cancel::{check_cancelled, is_cancelled};
use crate::error::{AgentError, Result};
use crate::resolver::DEFAULT_MAX_CONCURRENCY;

const UNTITLED: &str = "Untitled section";

/// One node of the outline tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReasoningNode {
    pub title: String,
    #[serde(default)]
    pub sections: Vec<ReasoningNode>,
}

impl ReasoningNode {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            sections: Vec::new(),
        }
    }

    pub fn with_sections(mut self, sections: Vec<ReasoningNode>) -> Self {
        self.sections = sections;
        self
    }

    /// Depth of the deepest node, counting this one as 0
    pub fn depth(&self) -> usize {
        self.sections
            .iter()
            .map(|s| s.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Build a node from model JSON. Sections may be objects or bare titles.
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let title = object.get("title")?.as_str()?.to_string();
        let sections = match object.get("sections") {
            Some(Value::Array(items)) => items.iter().map(Self::section_from_value).collect(),
            _ => Vec::new(),
        };
        Some(Self { title, sections })
    }

    fn section_from_value(value: &Value) -> Self {
        match value {
            Value::String(title) => Self::new(title.clone()),
            other => Self::from_value(other).unwrap_or_else(|| {
                let sections = other
                    .get("sections")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().map(Self::section_from_value).collect())
                    .unwrap_or_default();
                Self::new(UNTITLED).with_sections(sections)
            }),
        }
    }
}

/// Where a section expansion went wrong
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionStage {
    /// The model call itself failed
    Request,
    /// The response was not JSON
    Parse,
    /// The JSON had no `title`
    Validation,
    /// The run was cancelled before the section was expanded
    Cancelled,
}

/// A section left unexpanded
#[derive(Clone, Debug, Serialize)]
pub struct ExpansionError {
    pub stage: ExpansionStage,
    pub depth: usize,
    pub section_index: usize,
    pub section_title: String,
    /// Titles from the root down to the section's parent
    pub path: Vec<String>,
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HierarchicalOutcome {
    Completed {
        tree: ReasoningNode,
        errors: Vec<ExpansionError>,
    },
    Malformed(MalformedResponse),
    /// Cancelled; carries whatever was built before cancellation
    Aborted {
        tree: Option<ReasoningNode>,
        errors: Vec<ExpansionError>,
    },
}

type Expansion = (ReasoningNode, Vec<ExpansionError>);

/// Section to expand and where it sits in the tree
struct SectionTask<'a> {
    level: &'a ModelLevel,
    section: ReasoningNode,
    index: usize,
    depth: usize,
    max_depth: usize,
    path: Vec<String>,
}

pub struct HierarchicalReasoning {
    chart: DepthChart,
    max_concurrency: usize,
    /// Shared by every level of one strategy
    permits: Arc<Semaphore>,
    cancellation: Option<CancellationToken>,
}

impl HierarchicalReasoning {
    pub fn new(chart: DepthChart) -> Self {
        Self {
            chart,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            permits: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENCY)),
            cancellation: None,
        }
    }

    /// Expansion requests in flight at once, across all levels
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self.permits = Arc::new(Semaphore::new(self.max_concurrency));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn chart(&self) -> &DepthChart {
        &self.chart
    }

    /// Outline `prompt`, then expand sections until `depth` levels exist
    pub async fn run(&self, prompt: &str, depth: usize) -> Result<HierarchicalOutcome> {
        if depth == 0 {
            return Err(AgentError::Config("hierarchical depth must be at least 1".into()));
        }
        if depth > self.chart.len() {
            return Err(AgentError::DepthConfigurationExceeded {
                depth: self.chart.len(),
                configured: self.chart.len(),
            });
        }
        let level = self
            .chart
            .level(0)
            .ok_or(AgentError::DepthConfigurationExceeded {
                depth: 0,
                configured: 0,
            })?;

        let raw = match level
            .ask(outline_prompt(prompt), self.cancellation.as_ref())
            .await
        {
            Ok(raw) => raw,
            Err(e) if is_cancelled(&e) => {
                return Ok(HierarchicalOutcome::Aborted {
                    tree: None,
                    errors: Vec::new(),
                });
            }
            Err(e) => return Err(e),
        };

        let root = match parse_outline(&raw) {
            Ok(root) => root,
            Err(error) => {
                tracing::warn!(%error, "Outline could not be parsed");
                return Ok(HierarchicalOutcome::Malformed(MalformedResponse::new(
                    "outline", error, raw,
                )));
            }
        };

        let (tree, errors) = self.expand(root, 1, depth, Vec::new()).await?;
        tracing::info!(
            depth = tree.depth(),
            failed_sections = errors.len(),
            "Hierarchical expansion finished"
        );

        if self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
            Ok(HierarchicalOutcome::Aborted {
                tree: Some(tree),
                errors,
            })
        } else {
            Ok(HierarchicalOutcome::Completed { tree, errors })
        }
    }

    /// Expand every section of `node` using the configuration for `depth`
    fn expand(
        &self,
        node: ReasoningNode,
        depth: usize,
        max_depth: usize,
        path: Vec<String>,
    ) -> BoxFuture<'_, Result<Expansion>> {
        async move {
            if depth >= max_depth {
                return Ok((node, Vec::new()));
            }
            let level = self
                .chart
                .level(depth)
                .ok_or(AgentError::DepthConfigurationExceeded {
                    depth,
                    configured: self.chart.len(),
                })?;

            let ReasoningNode { title, sections } = node;
            let mut path = path;
            path.push(title.clone());

            let pending: Vec<_> = sections
                .into_iter()
                .enumerate()
                .map(|(index, section)| {
                    self.expand_section(SectionTask {
                        level,
                        section,
                        index,
                        depth,
                        max_depth,
                        path: path.clone(),
                    })
                })
                .collect();
            let expanded: Vec<Result<Expansion>> = stream::iter(pending)
                .buffered(self.max_concurrency)
                .collect()
                .await;

            let mut children = Vec::with_capacity(expanded.len());
            let mut errors = Vec::new();
            for outcome in expanded {
                let (child, child_errors) = outcome?;
                children.push(child);
                errors.extend(child_errors);
            }

            Ok((ReasoningNode { title, sections: children }, errors))
        }
        .boxed()
    }

    async fn expand_section(&self, task: SectionTask<'_>) -> Result<Expansion> {
        let SectionTask {
            level,
            section,
            index,
            depth,
            max_depth,
            path,
        } = task;

        let failure = |stage: ExpansionStage, message: String| ExpansionError {
            stage,
            depth,
            section_index: index,
            section_title: section.title.clone(),
            path: path.clone(),
            message,
        };

        if check_cancelled(self.cancellation.as_ref()).is_err() {
            let error = failure(ExpansionStage::Cancelled, "cancelled before expansion".into());
            return Ok((section, vec![error]));
        }

        tracing::debug!(depth, section = index + 1, title = %section.title, "Expanding section");
        let prompt = expansion_prompt(&path, &section.title, depth, max_depth);

        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AgentError::Other(format!("expansion limiter closed: {}", e)))?;
        let response = level.ask(prompt, self.cancellation.as_ref()).await;
        drop(permit);

        let raw = match response {
            Ok(raw) => raw,
            Err(e) => {
                let stage = if is_cancelled(&e) {
                    ExpansionStage::Cancelled
                } else {
                    ExpansionStage::Request
                };
                tracing::warn!(depth, section = index, error = %e, "Section expansion request failed");
                let error = failure(stage, e.to_string());
                return Ok((section, vec![error]));
            }
        };

        let value = match parse_json(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(depth, section = index, error = %e, "Section expansion is not JSON");
                let error = failure(ExpansionStage::Parse, format!("{}; response: {}", e, raw));
                return Ok((section, vec![error]));
            }
        };

        let Some(child) = ReasoningNode::from_value(&value) else {
            let shape = json_kind(&value);
            let error = failure(
                ExpansionStage::Validation,
                format!("expected an object with a `title`, got {}", shape),
            );
            return Ok((section, vec![error]));
        };

        self.expand(child, depth + 1, max_depth, path).await
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object without title",
    }
}

fn outline_prompt(prompt: &str) -> String {
    format!(
        "{prompt}\n\n\
         Write a hierarchical outline for answering the prompt above. Respond with a JSON object \
         with a `title` string and a `sections` array; each section is an object with its own \
         `title` and `sections`. Output the JSON only, with no preamble, explanation or markdown \
         code fences."
    )
}

fn expansion_prompt(path: &[String], title: &str, depth: usize, max_depth: usize) -> String {
    format!(
        "Expand this section within the context of: {context}\n\n\
         Section to expand: {title}\n\
         Current depth: {depth}/{max_depth}\n\n\
         Provide detailed sub-sections as a JSON object with `title` and `sections`. Output the \
         JSON only, with no preamble, explanation or markdown code fences.",
        context = path.join(" -> ")
    )
}

/// The outline must be an object carrying both `title` and `sections`
fn parse_outline(raw: &str) -> std::result::Result<ReasoningNode, String> {
    let value = parse_json(raw).map_err(|e| format!("outline is not valid JSON: {}", e))?;
    let object = value
        .as_object()
        .ok_or_else(|| "outline must be a JSON object".to_string())?;
    if !object.contains_key("title") || !object.contains_key("sections") {
        return Err("outline must contain `title` and `sections`".into());
    }
    ReasoningNode::from_value(&value).ok_or_else(|| "outline `title` must be a string".into())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::message::Message;
    use crate::provider::{Completion, GenerationOptions, LlmProvider};
    use crate::testing::ScriptedProvider;
    use crate::tool::ToolDefinition;

    const OUTLINE: &str =
        r#"{"title": "Quantum computing", "sections": [{"title": "Qubits"}, "Gates", {"title": "Algorithms"}]}"#;

    fn section_of(prompt: &str) -> Option<&str> {
        prompt
            .lines()
            .find_map(|line| line.strip_prefix("Section to expand: "))
    }

    fn outline_provider(fail_on: Option<&'static str>) -> Arc<ScriptedProvider> {
        Arc::new(ScriptedProvider::new(move |messages, _| {
            let prompt = messages[0].content.as_str();
            match section_of(prompt) {
                None => Ok(Completion::text(OUTLINE)),
                Some(title) if Some(title) == fail_on => {
                    Err(AgentError::ProviderUnavailable("connection reset".into()))
                }
                Some(title) => Ok(Completion::text(format!(
                    r#"{{"title": "{title}", "sections": [{{"title": "{title} detail"}}]}}"#
                ))),
            }
        }))
    }

    fn chart(provider: Arc<ScriptedProvider>, levels: usize) -> DepthChart {
        let provider: Arc<dyn LlmProvider> = provider;
        DepthChart::uniform(provider, GenerationOptions::default(), levels)
    }

    #[tokio::test]
    async fn expands_every_section_one_level() {
        let provider = outline_provider(None);
        let strategy = HierarchicalReasoning::new(chart(provider.clone(), 2));

        let outcome = strategy.run("Explain quantum computing", 2).await.unwrap();

        let HierarchicalOutcome::Completed { tree, errors } = outcome else {
            panic!("expected completed outcome");
        };
        assert!(errors.is_empty());
        assert_eq!(tree.title, "Quantum computing");
        assert_eq!(tree.sections.len(), 3);
        assert_eq!(tree.sections[1].sections[0].title, "Gates detail");
        assert_eq!(tree.depth(), 2);
        assert_eq!(provider.call_count(), 4);

        let calls = provider.calls();
        let gates = calls
            .iter()
            .find(|c| section_of(c.last_user()) == Some("Gates"))
            .unwrap();
        assert!(gates.last_user().contains("context of: Quantum computing"));
        assert!(gates.last_user().contains("Current depth: 1/2"));
    }

    #[tokio::test]
    async fn depth_one_only_outlines() {
        let provider = outline_provider(None);
        let strategy = HierarchicalReasoning::new(chart(provider.clone(), 1));

        let outcome = strategy.run("prompt", 1).await.unwrap();

        assert!(matches!(outcome, HierarchicalOutcome::Completed { ref tree, .. } if tree.depth() == 1));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn too_few_levels_is_a_hard_error() {
        let provider = outline_provider(None);
        let strategy = HierarchicalReasoning::new(chart(provider, 1));

        let err = strategy.run("prompt", 2).await.unwrap_err();

        assert!(matches!(
            err,
            AgentError::DepthConfigurationExceeded { depth: 1, configured: 1 }
        ));
    }

    #[tokio::test]
    async fn short_chart_is_rejected_before_any_call() {
        // Every level-1 section fails, so expansion alone would never reach level 2
        let failing = Arc::new(ScriptedProvider::new(|messages, _| {
            match section_of(messages[0].content.as_str()) {
                None => Ok(Completion::text(OUTLINE)),
                Some(_) => Err(AgentError::ProviderUnavailable("down".into())),
            }
        }));
        for provider in [outline_provider(None), failing] {
            let strategy = HierarchicalReasoning::new(chart(provider.clone(), 2));

            let err = strategy.run("prompt", 3).await.unwrap_err();

            assert!(matches!(
                err,
                AgentError::DepthConfigurationExceeded { depth: 2, configured: 2 }
            ));
            assert_eq!(provider.call_count(), 0);
        }
    }

    #[tokio::test]
    async fn zero_depth_is_a_config_error() {
        let provider = outline_provider(None);
        let strategy = HierarchicalReasoning::new(chart(provider.clone(), 2));

        let err = strategy.run("prompt", 0).await.unwrap_err();

        assert!(matches!(err, AgentError::Config(_)));
        assert_eq!(provider.call_count(), 0);
    }

    /// Sleeps on every request and records the peak number in flight
    #[derive(Default)]
    struct SlowProvider {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        async fn complete(
            &self,
            messages: &[Message],
            _tools: &[ToolDefinition],
            _options: &GenerationOptions,
        ) -> Result<Completion> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let title = section_of(messages[0].content.as_str()).unwrap_or("Root");
            Ok(Completion::text(format!(
                r#"{{"title": "{title}", "sections": ["{title} a", "{title} b", "{title} c", "{title} d"]}}"#
            )))
        }
    }

    #[tokio::test]
    async fn concurrency_limit_holds_across_levels() {
        let provider = Arc::new(SlowProvider::default());
        let dyn_provider: Arc<dyn LlmProvider> = provider.clone();
        let strategy =
            HierarchicalReasoning::new(DepthChart::uniform(dyn_provider, GenerationOptions::default(), 3))
                .max_concurrency(2);

        let outcome = strategy.run("prompt", 3).await.unwrap();

        let HierarchicalOutcome::Completed { tree, errors } = outcome else {
            panic!("expected completed outcome");
        };
        assert!(errors.is_empty());
        assert_eq!(tree.depth(), 3);
        assert_eq!(provider.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_section_is_isolated() {
        let provider = outline_provider(Some("Gates"));
        let strategy = HierarchicalReasoning::new(chart(provider, 2));

        let outcome = strategy.run("prompt", 2).await.unwrap();

        let HierarchicalOutcome::Completed { tree, errors } = outcome else {
            panic!("expected completed outcome");
        };
        assert_eq!(tree.sections[0].sections[0].title, "Qubits detail");
        assert_eq!(tree.sections[1], ReasoningNode::new("Gates"));
        assert_eq!(tree.sections[2].sections[0].title, "Algorithms detail");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stage, ExpansionStage::Request);
        assert_eq!(errors[0].section_index, 1);
        assert_eq!(errors[0].section_title, "Gates");
        assert_eq!(errors[0].path, vec!["Quantum computing"]);
    }

    #[tokio::test]
    async fn unparseable_and_untitled_sections_are_logged() {
        let provider = Arc::new(ScriptedProvider::new(|messages, _| {
            let prompt = messages[0].content.as_str();
            Ok(Completion::text(match section_of(prompt) {
                None => r#"{"title": "Root", "sections": ["A", "B"]}"#,
                Some("A") => "not json at all",
                Some(_) => r#"{"sections": []}"#,
            }))
        }));
        let strategy = HierarchicalReasoning::new(chart(provider, 3));

        let outcome = strategy.run("prompt", 3).await.unwrap();

        let HierarchicalOutcome::Completed { tree, errors } = outcome else {
            panic!("expected completed outcome");
        };
        assert_eq!(tree.sections, vec![ReasoningNode::new("A"), ReasoningNode::new("B")]);
        let stages: Vec<_> = errors.iter().map(|e| e.stage).collect();
        assert_eq!(stages, vec![ExpansionStage::Parse, ExpansionStage::Validation]);
    }

    #[tokio::test]
    async fn outline_without_sections_is_malformed() {
        let provider = Arc::new(ScriptedProvider::always(r#"{"title": "Only a title"}"#));
        let strategy = HierarchicalReasoning::new(chart(provider.clone(), 2));

        let outcome = strategy.run("prompt", 2).await.unwrap();

        assert!(matches!(outcome, HierarchicalOutcome::Malformed(ref m) if m.stage == "outline"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn deeper_levels_use_their_own_configuration() {
        let provider = outline_provider(None);
        let dyn_provider: Arc<dyn LlmProvider> = provider.clone();
        let chart = DepthChart::new(vec![
            ModelLevel::new(Arc::clone(&dyn_provider), GenerationOptions::with_model("planner")),
            ModelLevel::new(Arc::clone(&dyn_provider), GenerationOptions::with_model("writer")),
            ModelLevel::new(dyn_provider, GenerationOptions::with_model("detailer")),
        ]);
        let strategy = HierarchicalReasoning::new(chart).max_concurrency(1);

        strategy.run("prompt", 3).await.unwrap();

        let models: Vec<_> = provider.calls().iter().map(|c| c.options.model.clone()).collect();
        assert_eq!(models[0], "planner");
        assert_eq!(models[1], "writer");
        assert_eq!(models[2], "detailer");
        assert_eq!(models.len(), 7);
    }

    #[tokio::test]
    async fn cancellation_returns_partial_tree() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        // Cancel while the outline is being written
        let provider = Arc::new(ScriptedProvider::new(move |_, _| {
            trigger.cancel();
            Ok(Completion::text(OUTLINE))
        }));
        let strategy =
            HierarchicalReasoning::new(chart(provider.clone(), 2)).with_cancellation(token);

        let outcome = strategy.run("prompt", 2).await.unwrap();

        let HierarchicalOutcome::Aborted { tree: Some(tree), errors } = outcome else {
            panic!("expected aborted outcome with a tree");
        };
        assert_eq!(tree.sections.len(), 3);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.stage == ExpansionStage::Cancelled));
        assert_eq!(provider.call_count(), 1);
    }
}
