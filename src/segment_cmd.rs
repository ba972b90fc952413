//! `tutor segment`: subtitle file in, scenario JSON out.

use anyhow::{Context, Result};
use std::path::Path;

use subtitle_tutor_core::scenario;

use crate::output::{emit, read_input};
use crate::services::Services;

pub async fn run_segment(
    services: &Services,
    path: &Path,
    title: Option<&str>,
    output: Option<&Path>,
    compact: bool,
) -> Result<()> {
    let subtitle = read_input(path)?;

    let scenario = services
        .segmentation
        .segment(&subtitle, title)
        .await
        .with_context(|| format!("Segmentation of {} failed", path.display()))?;

    let json = scenario::serialize(&scenario, !compact)?;
    emit(output, &json)?;

    eprintln!(
        "segmented \"{}\" into {} blocks",
        scenario.subtitle_title, scenario.total_blocks
    );
    Ok(())
}
