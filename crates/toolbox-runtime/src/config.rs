//! Environment Configuration
//!
//! Every setting has a default, so an empty environment yields a working
//! configuration pointed at DeepInfra's OpenAI-compatible endpoint.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use toolbox_core::{
    error::{AgentError, Result},
    orchestration::{DEFAULT_MAX_STEPS, OrchestratorConfig},
    provider::{DEFAULT_MODEL, GenerationOptions, LlmProvider},
    reasoning::{DepthChart, ModelLevel},
    resolver::{DEFAULT_MAX_CONCURRENCY, ReturnMode},
};

use crate::checkpoint::default_checkpoint_dir;
use crate::openai::{DEFAULT_BASE_URL, OpenAiCompatibleProvider, OpenAiConfig};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Levels used when `TOOLBOX_DEPTH_CHART` is unset
pub const DEFAULT_DEPTH_LEVELS: usize = 3;

/// Model settings for one reasoning level
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LevelConfig {
    pub model: String,
    /// Defaults to the top-level base URL
    #[serde(default)]
    pub base_url: Option<String>,
    /// Defaults to the top-level temperature
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// Toolbox configuration
#[derive(Clone, Debug)]
pub struct ToolboxConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub max_steps: usize,
    pub max_concurrency: usize,
    pub checkpoint_dir: PathBuf,
    pub bind_addr: String,
    /// One entry per level; empty means the default model at every level
    pub depth_chart: Vec<LevelConfig>,
}

impl Default for ToolboxConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: None,
            model: DEFAULT_MODEL.into(),
            temperature: GenerationOptions::default().temperature,
            max_tokens: None,
            max_steps: DEFAULT_MAX_STEPS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            checkpoint_dir: default_checkpoint_dir(),
            bind_addr: DEFAULT_BIND_ADDR.into(),
            depth_chart: Vec::new(),
        }
    }
}

impl ToolboxConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let depth_chart = match get("TOOLBOX_DEPTH_CHART") {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                AgentError::Config(format!("TOOLBOX_DEPTH_CHART must be a JSON array of levels: {}", e))
            })?,
            None => Vec::new(),
        };

        Ok(Self {
            base_url: get("TOOLBOX_BASE_URL").unwrap_or(defaults.base_url),
            api_key: get("TOOLBOX_API_KEY").or_else(|| get("DEEPINFRA_API_KEY")),
            model: get("TOOLBOX_MODEL").unwrap_or(defaults.model),
            temperature: parse(get("TOOLBOX_TEMPERATURE"), "TOOLBOX_TEMPERATURE")?
                .unwrap_or(defaults.temperature),
            max_tokens: parse(get("TOOLBOX_MAX_TOKENS"), "TOOLBOX_MAX_TOKENS")?,
            max_steps: parse(get("TOOLBOX_MAX_STEPS"), "TOOLBOX_MAX_STEPS")?
                .unwrap_or(defaults.max_steps),
            max_concurrency: parse(get("TOOLBOX_MAX_CONCURRENCY"), "TOOLBOX_MAX_CONCURRENCY")?
                .unwrap_or(defaults.max_concurrency),
            checkpoint_dir: get("TOOLBOX_CHECKPOINT_DIR")
                .map_or(defaults.checkpoint_dir, PathBuf::from),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            depth_chart,
        })
    }

    pub fn openai_config(&self) -> OpenAiConfig {
        OpenAiConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            ..Default::default()
        }
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tool_choice: None,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            system_prompt: None,
            max_steps: self.max_steps,
            generation: self.generation_options(),
            return_mode: ReturnMode::Text,
            max_concurrency: self.max_concurrency,
        }
    }

    /// Model levels for the reasoning strategies.
    ///
    /// Levels on the top-level base URL share `provider`; a level with its
    /// own `base_url` gets a dedicated client using the same API key.
    pub fn depth_chart(&self, provider: &Arc<dyn LlmProvider>) -> Result<DepthChart> {
        if self.depth_chart.is_empty() {
            return Ok(DepthChart::uniform(
                Arc::clone(provider),
                self.generation_options(),
                DEFAULT_DEPTH_LEVELS,
            ));
        }

        let mut chart = DepthChart::default();
        for level in &self.depth_chart {
            let level_provider: Arc<dyn LlmProvider> = match &level.base_url {
                Some(url) if url != &self.base_url => {
                    let config = OpenAiConfig {
                        base_url: url.clone(),
                        ..self.openai_config()
                    };
                    Arc::new(OpenAiCompatibleProvider::new(config)?)
                }
                _ => Arc::clone(provider),
            };
            let options = GenerationOptions {
                model: level.model.clone(),
                temperature: level.temperature.unwrap_or(self.temperature),
                ..self.generation_options()
            };
            chart.push(ModelLevel::new(level_provider, options));
        }
        Ok(chart)
    }
}

fn parse<T: std::str::FromStr>(value: Option<String>, key: &str) -> Result<Option<T>> {
    value
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| AgentError::Config(format!("{} has an invalid value: {}", key, raw)))
        })
        .transpose()
}
