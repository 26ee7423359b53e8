//! `parley convert`.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use crate::state::AppState;

/// Send one file through the file-conversion assistant and print the JSON.
pub async fn convert(state: &AppState, file: &Path, instruction: Option<&str>, json: bool) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.txt".to_string());

    let value = state
        .orchestrator
        .file_to_json(&filename, &bytes, instruction)
        .await
        .with_context(|| format!("Failed to convert {filename}"))?;

    if !json {
        println!();
        println!("  {} {}", style("✓").green().bold(), style(&filename).cyan());
        println!();
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
