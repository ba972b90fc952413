//! Service construction from configuration.
//!
//! Both the CLI commands and the HTTP server go through [`Services`], so a
//! single process shares one analysis cache.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use subtitle_tutor_core::analysis::{AnalysisConfig, AnalysisService, TemplateLoader};
use subtitle_tutor_core::model::{Credentials, LanguageModel};
use subtitle_tutor_core::segmentation::SegmentationService;

use crate::config::Config;
use crate::llm::{credentials_from_env, OpenAIChatModel};

pub struct Services {
    pub config: Config,
    pub segmentation: SegmentationService,
    pub analysis: AnalysisService,
}

impl Services {
    /// Services backed by the OpenAI-compatible client, with credentials
    /// from the environment.
    pub fn from_config(config: Config) -> Result<Self> {
        Self::with_credentials(config, credentials_from_env())
    }

    pub fn with_credentials(config: Config, credentials: Credentials) -> Result<Self> {
        let timeout = Duration::from_secs(config.model.timeout_secs);
        let model = OpenAIChatModel::new(&credentials, timeout)?;
        Ok(Self::with_model(config, Arc::new(model), credentials))
    }

    /// Services over any [`LanguageModel`].
    pub fn with_model(
        config: Config,
        model: Arc<dyn LanguageModel>,
        credentials: Credentials,
    ) -> Self {
        let segmentation = SegmentationService::new(model.clone(), credentials.clone())
            .with_model_name(config.model.name.clone())
            .with_temperature(config.segmentation.temperature);

        let mut analysis =
            AnalysisService::new(model, credentials).with_default_model(config.model.name.clone());
        if let Some(path) = &config.analysis.prompt_template {
            analysis = analysis.with_template_loader(file_template_loader(path.clone()));
        }

        Self {
            config,
            segmentation,
            analysis,
        }
    }

    /// Per-request analysis settings with the configured baseline applied.
    pub fn analysis_config(&self, request: &AnalysisConfig) -> AnalysisConfig {
        self.config.analysis.merged(request)
    }
}

fn file_template_loader(path: PathBuf) -> TemplateLoader {
    Box::new(move || {
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read prompt template: {}", path.display()))
    })
}
