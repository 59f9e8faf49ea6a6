//! Tree-of-thought.
//!
//! Generate several candidate approaches, score each one independently,
//! optionally analyse the scored candidates further, then rank them.
//! Phase `k` (generate = 0, evaluate = 1, deepen = 2) uses chart level
//! `min(k, chart.len() - 1)`.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{DepthChart, MalformedResponse, ModelLevel, parse_json, string_list};
use crate::cancel::{check_cancelled, is_cancelled};
use crate::error::{AgentError, Result};
use crate::resolver::DEFAULT_MAX_CONCURRENCY;

pub const DEFAULT_BRANCHES: usize = 3;
pub const DEFAULT_EVALUATION_DEPTH: usize = 2;

const MAX_SCORE: f64 = 10.0;
const CANCELLED: &str = "cancelled";

/// A candidate approach and its evaluation
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Branch {
    /// Position in the generated list
    pub index: usize,
    pub content: String,
    pub score: f64,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub next_steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deeper_analysis: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Branch {
    fn new(index: usize, content: impl Into<String>) -> Self {
        Self {
            index,
            content: content.into(),
            score: 0.0,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            next_steps: Vec::new(),
            deeper_analysis: None,
            error: None,
        }
    }

    fn failed(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TreeOfThoughtOutcome {
    pub best_branch: Option<Branch>,
    /// Ranked by score, highest first
    pub all_branches: Vec<Branch>,
    /// Set when the run was cancelled before every phase finished
    pub aborted: bool,
    /// Present when the generated list could not be read and the raw
    /// response was evaluated as a single branch instead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub malformed_generation: Option<MalformedResponse>,
}

pub struct TreeOfThought {
    chart: DepthChart,
    max_concurrency: usize,
    cancellation: Option<CancellationToken>,
}

impl TreeOfThought {
    pub fn new(chart: DepthChart) -> Self {
        Self {
            chart,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            cancellation: None,
        }
    }

    /// Branches evaluated at once
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Phase 0 generates, 1 evaluates, 2 analyses; short charts reuse their last level
    fn level(&self, phase: usize) -> Result<&ModelLevel> {
        self.chart
            .level_or_last(phase)
            .ok_or_else(|| AgentError::Config("depth chart is empty".into()))
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    pub async fn run(
        &self,
        prompt: &str,
        branches: usize,
        evaluation_depth: usize,
    ) -> Result<TreeOfThoughtOutcome> {
        if self.chart.is_empty() {
            return Err(AgentError::Config("depth chart is empty".into()));
        }
        let generator = self.level(0)?;
        let raw = match generator
            .ask(generation_prompt(prompt, branches), self.cancellation.as_ref())
            .await
        {
            Ok(raw) => raw,
            Err(e) if is_cancelled(&e) => {
                return Ok(TreeOfThoughtOutcome {
                    best_branch: None,
                    all_branches: Vec::new(),
                    aborted: true,
                    malformed_generation: None,
                });
            }
            Err(e) => return Err(e),
        };

        let (candidates, malformed_generation) = match parse_branches(&raw) {
            Ok(candidates) if !candidates.is_empty() => (candidates, None),
            Ok(_) => (
                vec![Branch::new(0, raw.clone())],
                Some(MalformedResponse::new("generation", "no branches were generated", raw)),
            ),
            Err(error) => {
                tracing::warn!(%error, "Branch list could not be parsed, evaluating raw response");
                (
                    vec![Branch::new(0, raw.clone())],
                    Some(MalformedResponse::new("generation", error, raw)),
                )
            }
        };
        tracing::debug!(branches = candidates.len(), "Evaluating branches");

        let evaluator = self.level(1)?;
        let pending: Vec<_> = candidates
            .into_iter()
            .map(|branch| self.evaluate(evaluator, branch))
            .collect();
        let mut evaluated: Vec<Branch> = stream::iter(pending)
            .buffered(self.max_concurrency)
            .collect()
            .await;

        if evaluation_depth > 1 {
            let analyst = self.level(2)?;
            let pending: Vec<_> = evaluated
                .into_iter()
                .map(|branch| self.deepen(analyst, branch))
                .collect();
            evaluated = stream::iter(pending)
                .buffered(self.max_concurrency)
                .collect()
                .await;
        }

        // sort_by is stable: equal scores keep generation order
        evaluated.sort_by(|a, b| b.score.total_cmp(&a.score));

        let aborted = self.is_cancelled();
        if let Some(best) = evaluated.first() {
            tracing::info!(best = best.index, score = best.score, aborted, "Branches ranked");
        }

        Ok(TreeOfThoughtOutcome {
            best_branch: evaluated.first().cloned(),
            all_branches: evaluated,
            aborted,
            malformed_generation,
        })
    }

    async fn evaluate(&self, level: &ModelLevel, branch: Branch) -> Branch {
        if check_cancelled(self.cancellation.as_ref()).is_err() {
            return branch.failed(CANCELLED);
        }

        let raw = match level
            .ask(evaluation_prompt(&branch.content), self.cancellation.as_ref())
            .await
        {
            Ok(raw) => raw,
            Err(e) if is_cancelled(&e) => return branch.failed(CANCELLED),
            Err(e) => {
                tracing::warn!(branch = branch.index, error = %e, "Branch evaluation failed");
                return branch.failed(format!("evaluation failed: {}", e));
            }
        };

        let evaluation = match parse_json(&raw) {
            Ok(Value::Object(evaluation)) => evaluation,
            Ok(_) | Err(_) => {
                tracing::warn!(branch = branch.index, "Branch evaluation is not a JSON object");
                return branch.failed("evaluation failed: response is not a JSON object");
            }
        };

        let mut branch = branch;
        branch.strengths = string_list(evaluation.get("strengths"));
        branch.weaknesses = string_list(evaluation.get("weaknesses"));
        branch.next_steps = string_list(evaluation.get("next_steps"));
        match evaluation.get("score").and_then(score_of) {
            Some(score) => branch.score = score.clamp(0.0, MAX_SCORE),
            None => branch.error = Some("evaluation failed: no numeric score".into()),
        }
        branch
    }

    /// Deeper analysis for branches whose evaluation succeeded
    async fn deepen(&self, level: &ModelLevel, mut branch: Branch) -> Branch {
        if branch.error.is_some() {
            return branch;
        }
        if check_cancelled(self.cancellation.as_ref()).is_err() {
            return branch.failed(CANCELLED);
        }

        let prompt = analysis_prompt(&branch.strengths, &branch.weaknesses);
        match level.ask(prompt, self.cancellation.as_ref()).await {
            Ok(raw) => match parse_json(&raw) {
                Ok(analysis) => branch.deeper_analysis = Some(analysis),
                Err(e) => branch.error = Some(format!("deeper analysis failed: {}", e)),
            },
            Err(e) if is_cancelled(&e) => branch.error = Some(CANCELLED.into()),
            Err(e) => branch.error = Some(format!("deeper analysis failed: {}", e)),
        }
        branch
    }
}

/// Numeric or numeric-string score; NaN and infinities count as missing
fn score_of(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    score.filter(|score| score.is_finite())
}

/// Accepts `{"branches": [...]}` or a bare array of strings or objects
fn parse_branches(content: &str) -> std::result::Result<Vec<Branch>, String> {
    let value = parse_json(content).map_err(|e| format!("branch list is not valid JSON: {}", e))?;
    let items = match &value {
        Value::Object(object) => match object.get("branches") {
            Some(Value::Array(items)) => items,
            _ => return Err("branch object has no `branches` array".into()),
        },
        Value::Array(items) => items,
        _ => return Err("branch list must be a JSON object or array".into()),
    };

    Ok(items
        .iter()
        .enumerate()
        .map(|(index, item)| Branch::new(index, branch_content(item)))
        .collect())
}

fn branch_content(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        Value::Object(object) => ["content", "approach", "description", "title"]
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_str))
            .map_or_else(|| item.to_string(), str::to_string),
        other => other.to_string(),
    }
}

fn generation_prompt(prompt: &str, branches: usize) -> String {
    format!(
        "Generate {branches} distinct approaches to solve:\n{prompt}\n\n\
         Respond with a JSON object with one field `branches` containing an array of strings, \
         one string per approach. Output the JSON only, with no markdown code fences."
    )
}

fn evaluation_prompt(content: &str) -> String {
    format!(
        "Evaluate this solution approach:\n{content}\n\n\
         Provide a score (0-10) and detailed analysis in JSON format with:\n\
         - score (integer)\n\
         - strengths (array)\n\
         - weaknesses (array)\n\
         - next_steps (array)\n\
         Output the JSON only."
    )
}

fn analysis_prompt(strengths: &[String], weaknesses: &[String]) -> String {
    format!(
        "Perform deep analysis on:\n\
         Strengths: {strengths:?}\n\
         Weaknesses: {weaknesses:?}\n\n\
         Provide concrete examples and mitigation strategies in JSON format. Output the JSON only."
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::provider::{Completion, GenerationOptions, LlmProvider};
    use crate::testing::ScriptedProvider;

    fn approach_of(prompt: &str) -> Option<&str> {
        let rest = prompt.strip_prefix("Evaluate this solution approach:\n")?;
        rest.lines().next()
    }

    /// Generates `branches`, scores each by looking up its content in `scores`
    fn scoring_provider(
        generated: &'static str,
        scores: &'static [(&'static str, &'static str)],
    ) -> Arc<ScriptedProvider> {
        Arc::new(ScriptedProvider::new(move |messages, _| {
            let prompt = messages[0].content.as_str();
            if prompt.starts_with("Generate") {
                return Ok(Completion::text(generated));
            }
            if prompt.starts_with("Perform deep analysis") {
                return Ok(Completion::text(r#"{"examples": ["ex"], "mitigations": ["mit"]}"#));
            }
            let approach = approach_of(prompt).unwrap_or_default();
            let response = scores
                .iter()
                .find(|(content, _)| *content == approach)
                .map_or("{}", |(_, response)| *response);
            Ok(Completion::text(response))
        }))
    }

    fn chart(provider: Arc<ScriptedProvider>, levels: usize) -> DepthChart {
        let provider: Arc<dyn LlmProvider> = provider;
        DepthChart::uniform(provider, GenerationOptions::default(), levels)
    }

    fn order(outcome: &TreeOfThoughtOutcome) -> Vec<usize> {
        outcome.all_branches.iter().map(|b| b.index).collect()
    }

    #[tokio::test]
    async fn branches_are_ranked_by_score() {
        let provider = scoring_provider(
            r#"{"branches": ["brute force", "dynamic programming", "greedy"]}"#,
            &[
                ("brute force", r#"{"score": 4, "strengths": ["simple"]}"#),
                ("dynamic programming", r#"{"score": 9, "weaknesses": ["memory"]}"#),
                ("greedy", r#"{"score": 2}"#),
            ],
        );
        let strategy = TreeOfThought::new(chart(provider.clone(), 3));

        let outcome = strategy.run("Find the optimal path", 3, 1).await.unwrap();

        let best = outcome.best_branch.as_ref().unwrap();
        assert_eq!(best.content, "dynamic programming");
        assert!((best.score - 9.0).abs() < f64::EPSILON);
        let scores: Vec<_> = outcome.all_branches.iter().map(|b| b.score).collect();
        assert_eq!(scores, vec![9.0, 4.0, 2.0]);
        assert_eq!(order(&outcome), vec![1, 0, 2]);
        assert_eq!(outcome.all_branches[1].strengths, vec!["simple"]);
        assert!(!outcome.aborted);
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn ties_keep_generation_order() {
        let provider = scoring_provider(
            r#"["a", "b", "c"]"#,
            &[
                ("a", r#"{"score": 5}"#),
                ("b", r#"{"score": 7}"#),
                ("c", r#"{"score": 5}"#),
            ],
        );
        let strategy = TreeOfThought::new(chart(provider, 1));

        let outcome = strategy.run("prompt", 3, 1).await.unwrap();

        assert_eq!(order(&outcome), vec![1, 0, 2]);
    }

    #[tokio::test]
    async fn object_items_use_their_content_field() {
        let provider = scoring_provider(
            r#"{"branches": [{"approach": "recursion"}, {"content": "iteration", "title": "loop"}]}"#,
            &[("recursion", r#"{"score": 3}"#), ("iteration", r#"{"score": 6}"#)],
        );
        let strategy = TreeOfThought::new(chart(provider, 2));

        let outcome = strategy.run("prompt", 2, 1).await.unwrap();

        let contents: Vec<_> = outcome.all_branches.iter().map(|b| b.content.as_str()).collect();
        assert_eq!(contents, vec!["iteration", "recursion"]);
    }

    #[tokio::test]
    async fn unparseable_generation_becomes_single_branch() {
        let provider = scoring_provider("Try a few things and see", &[]);
        let strategy = TreeOfThought::new(chart(provider.clone(), 2));

        let outcome = strategy.run("prompt", 3, 1).await.unwrap();

        assert_eq!(outcome.all_branches.len(), 1);
        assert_eq!(outcome.all_branches[0].content, "Try a few things and see");
        let malformed = outcome.malformed_generation.unwrap();
        assert_eq!(malformed.stage, "generation");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn bad_evaluations_score_zero_with_marker() {
        let provider = scoring_provider(
            r#"["good", "garbled", "overconfident", "negative"]"#,
            &[
                ("good", r#"{"score": 6}"#),
                ("garbled", "I would give this a 7"),
                ("overconfident", r#"{"score": 15}"#),
                ("negative", r#"{"score": "-3"}"#),
            ],
        );
        let strategy = TreeOfThought::new(chart(provider, 2));

        let outcome = strategy.run("prompt", 4, 1).await.unwrap();

        let by_content = |content: &str| {
            outcome
                .all_branches
                .iter()
                .find(|b| b.content == content)
                .unwrap()
                .clone()
        };
        let garbled = by_content("garbled");
        assert!(garbled.score.abs() < f64::EPSILON);
        assert!(garbled.error.unwrap().starts_with("evaluation failed"));
        assert!((by_content("overconfident").score - MAX_SCORE).abs() < f64::EPSILON);
        assert!(by_content("negative").score.abs() < f64::EPSILON);
        assert!(by_content("negative").error.is_none());
        assert_eq!(outcome.best_branch.unwrap().content, "overconfident");
    }

    #[tokio::test]
    async fn evaluation_depth_two_adds_deeper_analysis() {
        let provider = scoring_provider(
            r#"["a", "b", "c"]"#,
            &[
                ("a", r#"{"score": 1}"#),
                ("b", "not json"),
                ("c", r#"{"score": 8}"#),
            ],
        );
        let dyn_provider: Arc<dyn LlmProvider> = provider.clone();
        let chart = DepthChart::new(vec![
            ModelLevel::new(Arc::clone(&dyn_provider), GenerationOptions::with_model("generator")),
            ModelLevel::new(dyn_provider, GenerationOptions::with_model("judge")),
        ]);
        let strategy = TreeOfThought::new(chart).max_concurrency(1);

        let outcome = strategy.run("prompt", 3, 2).await.unwrap();

        let best = outcome.best_branch.unwrap();
        assert_eq!(best.content, "c");
        assert_eq!(best.deeper_analysis.unwrap()["mitigations"][0], "mit");
        let failed = outcome.all_branches.iter().find(|b| b.content == "b").unwrap();
        assert!(failed.deeper_analysis.is_none());

        // generate, three evaluations, two analyses; deepening reuses the last level
        let models: Vec<_> = provider.calls().iter().map(|c| c.options.model.clone()).collect();
        assert_eq!(
            models,
            vec!["generator", "judge", "judge", "judge", "judge", "judge"]
        );
    }

    #[tokio::test]
    async fn empty_chart_is_rejected() {
        let strategy = TreeOfThought::new(DepthChart::default());

        let err = strategy.run("prompt", 3, 1).await.unwrap_err();

        assert!(matches!(err, AgentError::Config(ref msg) if msg.contains("empty")));
    }

    #[tokio::test]
    async fn non_finite_scores_are_rejected() {
        let provider = scoring_provider(
            r#"["good", "not a number", "unbounded"]"#,
            &[
                ("good", r#"{"score": 9}"#),
                ("not a number", r#"{"score": "NaN"}"#),
                ("unbounded", r#"{"score": "inf"}"#),
            ],
        );
        let strategy = TreeOfThought::new(chart(provider, 2));

        let outcome = strategy.run("prompt", 3, 1).await.unwrap();

        assert_eq!(outcome.best_branch.as_ref().unwrap().content, "good");
        for branch in &outcome.all_branches[1..] {
            assert!(branch.score.abs() < f64::EPSILON);
            assert_eq!(branch.error.as_deref(), Some("evaluation failed: no numeric score"));
        }
        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json["all_branches"].as_array().unwrap().iter().all(|b| b["score"].is_f64()));
    }

    #[tokio::test]
    async fn cancellation_marks_unevaluated_branches() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let provider = Arc::new(ScriptedProvider::new(move |_, _| {
            trigger.cancel();
            Ok(Completion::text(r#"["a", "b"]"#))
        }));
        let strategy = TreeOfThought::new(chart(provider.clone(), 2)).with_cancellation(token);

        let outcome = strategy.run("prompt", 2, 2).await.unwrap();

        assert!(outcome.aborted);
        assert_eq!(outcome.all_branches.len(), 2);
        assert!(
            outcome
                .all_branches
                .iter()
                .all(|b| b.error.as_deref() == Some(CANCELLED) && b.score.abs() < f64::EPSILON)
        );
        assert_eq!(provider.call_count(), 1);
    }
}
