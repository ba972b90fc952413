//! Configuration parsing and validation.
//!
//! Subtitle Tutor reads a TOML file (default `./config/tutor.toml`). Every
//! section is optional; absent values take the defaults below.
//!
//! ```toml
//! [model]
//! name = "gpt-4o-mini"
//! timeout_secs = 120
//!
//! [segmentation]
//! temperature = 0.3
//!
//! [analysis]
//! temperature = 0.2
//! max_tokens = 2048
//! cache_ttl_minutes = 60
//! exam_targets = ["CET-4", "CET-6", "IELTS", "TOEFL"]
//! prompt_template = "prompts/scenario-analysis.md"
//!
//! [export]
//! template = "standard"
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```
//!
//! `OPENAI_MODEL`, when set and non-blank, overrides `[model].name`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use subtitle_tutor_core::analysis::{
    AnalysisConfig, DEFAULT_CACHE_TTL_MINUTES, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
};
use subtitle_tutor_core::model::DEFAULT_MODEL;
use subtitle_tutor_core::notes::ExportTemplate;
use subtitle_tutor_core::prompt::DEFAULT_EXAM_TARGETS;
use subtitle_tutor_core::segmentation::SEGMENTATION_TEMPERATURE;

/// Environment variable that overrides `[model].name`.
pub const MODEL_ENV: &str = "OPENAI_MODEL";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Per-request HTTP timeout for the chat completions call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model_name() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct SegmentationConfig {
    #[serde(default = "default_segmentation_temperature")]
    pub temperature: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            temperature: default_segmentation_temperature(),
        }
    }
}

fn default_segmentation_temperature() -> f64 {
    SEGMENTATION_TEMPERATURE
}

/// Baseline analysis settings. Per-request settings override these field
/// by field (see [`AnalysisSettings::merged`]).
#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisSettings {
    #[serde(default = "default_analysis_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_minutes: u32,
    #[serde(default = "default_exam_targets")]
    pub exam_targets: Vec<String>,
    /// Markdown file replacing the built-in analysis prompt template.
    #[serde(default)]
    pub prompt_template: Option<PathBuf>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            temperature: default_analysis_temperature(),
            max_tokens: default_max_tokens(),
            cache_ttl_minutes: default_cache_ttl(),
            exam_targets: default_exam_targets(),
            prompt_template: None,
        }
    }
}

fn default_analysis_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}
fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}
fn default_cache_ttl() -> u32 {
    DEFAULT_CACHE_TTL_MINUTES
}
fn default_exam_targets() -> Vec<String> {
    DEFAULT_EXAM_TARGETS.iter().map(|t| t.to_string()).collect()
}

impl AnalysisSettings {
    /// Fill every field `request` leaves unset from these settings.
    pub fn merged(&self, request: &AnalysisConfig) -> AnalysisConfig {
        AnalysisConfig {
            model: request.model.clone(),
            temperature: request.temperature.or(Some(self.temperature)),
            max_tokens: request.max_tokens.or(Some(self.max_tokens)),
            cache_ttl_minutes: request.cache_ttl_minutes.or(Some(self.cache_ttl_minutes)),
            exam_targets: if request.exam_targets.is_empty() {
                self.exam_targets.clone()
            } else {
                request.exam_targets.clone()
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExportConfig {
    #[serde(default)]
    pub template: ExportTemplate,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl Config {
    /// Apply the `OPENAI_MODEL` override from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_model_override(std::env::var(MODEL_ENV).ok())
    }

    /// Replace `[model].name` when `name` is present and non-blank.
    pub fn with_model_override(mut self, name: Option<String>) -> Self {
        if let Some(name) = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
            self.model.name = name;
        }
        self
    }
}

/// Load and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load the config the CLI points at.
///
/// A missing file at the default location means "use defaults"; a missing
/// file the user named explicitly is an error.
pub fn load_or_default(path: &Path, explicit: bool) -> Result<Config> {
    if !explicit && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }
    load_config(path)
}

fn validate(config: &Config) -> Result<()> {
    if config.model.name.trim().is_empty() {
        anyhow::bail!("model.name must not be empty");
    }
    if config.model.timeout_secs == 0 {
        anyhow::bail!("model.timeout_secs must be > 0");
    }

    if !(0.0..=2.0).contains(&config.segmentation.temperature) {
        anyhow::bail!("segmentation.temperature must be in [0.0, 2.0]");
    }

    let analysis = &config.analysis;
    if !(0.0..=2.0).contains(&analysis.temperature) {
        anyhow::bail!("analysis.temperature must be in [0.0, 2.0]");
    }
    if !(256..=8192).contains(&analysis.max_tokens) {
        anyhow::bail!("analysis.max_tokens must be in [256, 8192]");
    }
    if !(5..=720).contains(&analysis.cache_ttl_minutes) {
        anyhow::bail!("analysis.cache_ttl_minutes must be in [5, 720]");
    }
    if analysis.exam_targets.is_empty() {
        anyhow::bail!("analysis.exam_targets must not be empty");
    }
    if analysis.exam_targets.iter().any(|t| t.trim().is_empty()) {
        anyhow::bail!("analysis.exam_targets must not contain blank entries");
    }

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    Ok(())
}
