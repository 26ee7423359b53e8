//! `parley chat`: one conversational turn from the command line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::Instrument;

use parley_observe::attrs::SPAN_CONVERSE;
use parley_types::conversation::{Answer, InputAttachment};

use crate::state::AppState;

/// Send `message` (plus attachments) for `owner_id` and print the answer.
///
/// Files attached to the answer are written into `output_dir`.
pub async fn chat(
    state: &AppState,
    owner_id: i64,
    message: &str,
    images: &[PathBuf],
    files: &[PathBuf],
    output_dir: &Path,
    json: bool,
) -> Result<()> {
    let attachments = load_attachments(images, files).await?;

    let spinner = (!json).then(|| {
        let spinner = ProgressBar::new_spinner();
        if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            spinner.set_style(template);
        }
        spinner.set_message("Waiting for the assistant...");
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        spinner
    });

    let span = tracing::info_span!(SPAN_CONVERSE, owner_id);
    let answer = state
        .orchestrator
        .converse(owner_id, message, &attachments)
        .instrument(span)
        .await;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let saved = save_attachments(&answer, output_dir).await?;

    if json {
        let out = serde_json::json!({
            "owner_id": owner_id,
            "text": answer.text,
            "attachments": saved.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", answer.text);
    if !saved.is_empty() {
        println!();
        for path in &saved {
            println!(
                "  {} {}",
                style("📎").bold(),
                style(path.display()).cyan()
            );
        }
    }
    println!();
    Ok(())
}

/// Read attachment files. Documents keep their file name so the extension
/// can be validated before anything is uploaded.
pub async fn load_attachments(images: &[PathBuf], files: &[PathBuf]) -> Result<Vec<InputAttachment>> {
    let mut attachments = Vec::with_capacity(images.len() + files.len());

    for path in images {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        attachments.push(InputAttachment::Image { bytes });
    }

    for path in files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read file {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        attachments.push(InputAttachment::Document { filename, bytes });
    }

    Ok(attachments)
}

/// Write answer attachments into `dir`, returning the written paths.
async fn save_attachments(answer: &Answer, dir: &Path) -> Result<Vec<PathBuf>> {
    if answer.attachments.is_empty() {
        return Ok(Vec::new());
    }

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut written = Vec::with_capacity(answer.attachments.len());
    for attachment in &answer.attachments {
        let path = dir.join(safe_file_name(&attachment.filename));
        tokio::fs::write(&path, &attachment.bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

/// Last path component of a provider-supplied name.
fn safe_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "attachment.bin".to_string())
}
