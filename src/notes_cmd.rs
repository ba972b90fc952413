//! `tutor notes export|import`: the study-notes markdown document.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use subtitle_tutor_core::models::{AnalysisResult, NoteItem};
use subtitle_tutor_core::notes::{export_markdown, import_markdown, ExportRequest, ExportTemplate};
use subtitle_tutor_core::scenario;

use crate::config::Config;
use crate::output::{emit, read_input};

/// Parse `--analyses`: either the array `tutor analyze` writes, or a plain
/// `{ "<block_index>": "<markdown>" }` map.
fn parse_analyses(raw: &str) -> Result<BTreeMap<u32, String>> {
    let value: Value = serde_json::from_str(raw)?;
    if value.is_array() {
        let results: Vec<AnalysisResult> = serde_json::from_value(value)?;
        Ok(results
            .into_iter()
            .map(|r| (r.block_index, r.markdown))
            .collect())
    } else {
        Ok(serde_json::from_value(value)?)
    }
}

pub fn run_export(
    config: &Config,
    scenario_path: &Path,
    analyses_path: Option<&Path>,
    notes_path: Option<&Path>,
    template: Option<ExportTemplate>,
    output: Option<&Path>,
) -> Result<()> {
    let scenario = scenario::deserialize(&read_input(scenario_path)?)
        .with_context(|| format!("{} is not a valid scenario", scenario_path.display()))?;

    let analyses = match analyses_path {
        Some(path) => parse_analyses(&read_input(path)?)
            .with_context(|| format!("Failed to parse analyses from {}", path.display()))?,
        None => BTreeMap::new(),
    };

    let notes: Vec<NoteItem> = match notes_path {
        Some(path) => serde_json::from_str(&read_input(path)?)
            .with_context(|| format!("Failed to parse notes from {}", path.display()))?,
        None => Vec::new(),
    };

    let request = ExportRequest {
        scenario,
        analyses,
        notes,
        template: template.unwrap_or(config.export.template),
    };
    let markdown = export_markdown(&request, Utc::now())?;
    emit(output, &markdown)
}

pub fn run_import(path: &Path, output: Option<&Path>) -> Result<()> {
    let result = import_markdown(&read_input(path)?);
    emit(output, &serde_json::to_string_pretty(&result)?)
}
