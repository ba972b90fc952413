//! Subtitle segmentation: one model call that splits a transcript into
//! scenario blocks.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result, Violation, Violations};
use crate::model::{Credentials, InvokeOptions, LanguageModel, DEFAULT_MODEL};
use crate::models::ScenarioSegmentation;
use crate::prompt::segmentation_prompt;
use crate::response::{extract_json, ExtractOptions};
use crate::scenario::normalize;
use crate::schema::validate_segmentation;
use crate::subtitle::{derive_title, parse_subtitle, render_transcript};

/// Sampling temperature for segmentation calls.
pub const SEGMENTATION_TEMPERATURE: f64 = 0.3;

/// Title used when none is supplied and none can be derived.
pub const UNTITLED: &str = "未命名字幕";

/// Splits subtitles into scenario blocks via the language model.
///
/// Stateless apart from its configuration; every call makes exactly one
/// model request and nothing is cached.
pub struct SegmentationService {
    model: Arc<dyn LanguageModel>,
    credentials: Credentials,
    model_name: String,
    temperature: f64,
}

impl SegmentationService {
    pub fn new(model: Arc<dyn LanguageModel>, credentials: Credentials) -> Self {
        Self {
            model,
            credentials,
            model_name: DEFAULT_MODEL.to_string(),
            temperature: SEGMENTATION_TEMPERATURE,
        }
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Segment raw subtitle text into a normalized scenario.
    ///
    /// A blank `title` counts as absent. The model's `total_blocks` is
    /// corrected to the actual block count rather than rejected.
    pub async fn segment(&self, subtitle: &str, title: Option<&str>) -> Result<ScenarioSegmentation> {
        if !self.credentials.is_configured() {
            return Err(Error::MissingCredentials);
        }
        if subtitle.trim().is_empty() {
            return Err(Error::EmptySubtitle);
        }

        let lines = parse_subtitle(subtitle);
        if lines.is_empty() {
            return Err(Error::EmptySubtitle);
        }

        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| derive_title(&lines))
            .unwrap_or_else(|| UNTITLED.to_string());

        let prompt = segmentation_prompt(&title, &render_transcript(&lines));
        debug!(
            lines = lines.len(),
            prompt_chars = prompt.chars().count(),
            model = %self.model_name,
            "requesting segmentation"
        );

        let options = InvokeOptions {
            model: self.model_name.clone(),
            temperature: self.temperature,
            max_tokens: None,
        };
        let completion = self
            .model
            .invoke(&prompt, &options)
            .await
            .map_err(|e| Error::Model(format!("{e:#}")))?;

        let value = extract_json(&completion.text, ExtractOptions::NARROWED)?;
        let mut scenario = validate_segmentation(&value, false).map_err(Error::SchemaValidation)?;

        let actual = scenario.blocks.len() as u32;
        if scenario.total_blocks != actual {
            debug!(
                declared = scenario.total_blocks,
                actual, "correcting total_blocks from model output"
            );
            scenario.total_blocks = actual;
        }

        let scenario = normalize(&scenario);
        if scenario.blocks.is_empty() {
            return Err(Error::SchemaValidation(Violations(vec![Violation {
                path: "blocks".to_string(),
                message: "no block has a non-blank dialogue line".to_string(),
            }])));
        }
        info!(
            title = %scenario.subtitle_title,
            blocks = scenario.total_blocks,
            "segmentation complete"
        );
        Ok(scenario)
    }
}
