use std::path::Path;

use anyhow::{Context, Result};

/// Read line-delimited URLs, skipping the first `start_line` lines.
/// Blank lines are dropped after the offset is applied.
pub fn read_urls(path: &Path, start_line: usize) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read URL list {}", path.display()))?;
    Ok(text
        .lines()
        .skip(start_line)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
