//! `tutor analyze`: scenario JSON in, analysis results out.

use anyhow::{Context, Result};
use std::path::Path;

use subtitle_tutor_core::analysis::AnalysisConfig;
use subtitle_tutor_core::scenario;

use crate::output::{emit, read_input};
use crate::services::Services;

/// Analyse every block of the scenario at `path`, or only `blocks` when
/// non-empty, and emit the results as a JSON array.
pub async fn run_analyze(
    services: &Services,
    path: &Path,
    blocks: &[u32],
    output: Option<&Path>,
) -> Result<()> {
    let content = read_input(path)?;
    let scenario = scenario::deserialize(&content)
        .with_context(|| format!("{} is not a valid scenario", path.display()))?;

    let targets = (!blocks.is_empty()).then_some(blocks);
    let config = services.analysis_config(&AnalysisConfig::default());

    let results = services
        .analysis
        .analyze(&scenario.subtitle_title, &scenario.blocks, targets, &config)
        .await
        .context("Analysis failed")?;

    emit(output, &serde_json::to_string_pretty(&results)?)?;
    eprintln!("analysed {} blocks", results.len());
    Ok(())
}
