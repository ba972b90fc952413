//! Where command results go: a file when `--output` is given, stdout
//! otherwise.

use anyhow::{Context, Result};
use std::path::Path;

/// Read a UTF-8 input file with a path-bearing error.
pub fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Write `content` to `output`, or print it.
///
/// Parent directories are created as needed. A trailing newline is added
/// when printing.
pub fn emit(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{}", content.trim_end_matches('\n')),
    }
    Ok(())
}
