//! `tutor scenario normalize|validate`: offline checks on scenario files.

use anyhow::{bail, Context, Result};
use std::path::Path;

use subtitle_tutor_core::scenario;

use crate::output::read_input;

/// Print the normalized form of a scenario file.
pub fn run_normalize(path: &Path, compact: bool) -> Result<()> {
    let content = read_input(path)?;
    let scenario = scenario::deserialize(&content)
        .with_context(|| format!("{} is not a valid scenario", path.display()))?;
    println!("{}", scenario::serialize(&scenario, !compact)?);
    Ok(())
}

/// Validate a scenario file; `strict` also checks line ranges.
pub fn run_validate(path: &Path, strict: bool) -> Result<()> {
    let content = read_input(path)?;
    let scenario = match scenario::deserialize(&content) {
        Ok(s) => s,
        Err(e) => bail!("{}: {}", path.display(), e),
    };
    if strict {
        if let Err(e) = scenario::validate_line_ranges(&scenario) {
            bail!("{}: {}", path.display(), e);
        }
    }

    println!("scenario ok");
    println!("  title:      {}", scenario.subtitle_title);
    println!("  blocks:     {}", scenario.total_blocks);
    println!(
        "  dialogues:  {}",
        scenario
            .blocks
            .iter()
            .map(|b| b.dialogues.len())
            .sum::<usize>()
    );
    Ok(())
}
