//! `parley image` and `parley video`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::Instrument;

use parley_observe::attrs::SPAN_GENERATE_VIDEO;
use parley_types::job::{JobProgress, JobStatus};
use parley_types::provider::GeneratedImage;
use parley_types::video::VideoRequest;

use crate::state::AppState;

/// Generate one image, or redraw `source` when given. Byte payloads are
/// written to `output`; URLs are printed.
pub async fn image(
    state: &AppState,
    prompt: &str,
    source: Option<&PathBuf>,
    output: &Path,
    json: bool,
) -> Result<()> {
    let generated = match source {
        Some(path) => {
            let photo = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read image {}", path.display()))?;
            state.orchestrator.edit_image(&photo, prompt).await
        }
        None => state.orchestrator.generate_image(prompt).await,
    };
    let Some(image) = generated else {
        bail!("image generation failed; see the log for details");
    };

    let (path, url) = match image {
        GeneratedImage::Bytes(bytes) => {
            tokio::fs::write(output, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            (Some(output.display().to_string()), None)
        }
        GeneratedImage::Url(url) => (None, Some(url)),
    };

    if json {
        let out = serde_json::json!({ "path": path, "url": url });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if let Some(path) = path {
        println!("  {} Image saved to {}", style("✓").green().bold(), style(path).cyan());
    } else if let Some(url) = url {
        println!("  {} Image available at {}", style("✓").green().bold(), style(url).cyan());
    }
    Ok(())
}

/// Render a video, showing poll progress, and optionally download it.
///
/// Ctrl+C cancels polling; the render itself keeps going on the provider.
pub async fn video(
    state: &AppState,
    prompt: &str,
    image: Option<&PathBuf>,
    output: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let request = match image {
        Some(path) => VideoRequest::ImageToVideo {
            image: tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read image {}", path.display()))?,
            prompt: prompt.to_string(),
        },
        None => VideoRequest::TextToVideo {
            prompt: prompt.to_string(),
        },
    };

    let bar = ProgressBar::new(u64::from(state.config.polling.video_max_attempts));
    if json {
        bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    bar.set_message("submitting...");
    bar.enable_steady_tick(std::time::Duration::from_millis(120));

    let orchestrator = state.orchestrator.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            orchestrator.shutdown();
        }
    });

    let progress_bar = bar.clone();
    let span = tracing::info_span!(SPAN_GENERATE_VIDEO, kind = %request.kind());
    let outcome = state
        .video_service
        .generate_video(request, move |progress| {
            progress_bar.set_position(u64::from(progress.attempt));
            progress_bar.set_message(progress_message(&progress));
        })
        .instrument(span)
        .await;
    interrupt.abort();
    bar.finish_and_clear();

    let mut saved = None;
    if let (Some(url), Some(path)) = (outcome.artifact_url.as_deref(), output) {
        match state.video_service.download(url).await {
            Some(bytes) => {
                tokio::fs::write(path, &bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                saved = Some(path.display().to_string());
            }
            None => tracing::warn!(url, "video rendered but could not be downloaded"),
        }
    }

    if json {
        let mut out = serde_json::to_value(&outcome)?;
        out["saved_to"] = serde_json::json!(saved);
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    match (&outcome.artifact_url, &outcome.error) {
        (Some(url), _) => {
            println!("  {} Video ready: {}", style("✓").green().bold(), style(url).cyan());
            if let Some(path) = saved {
                println!("  {} Saved to {}", style("↓").bold(), style(path).cyan());
            }
        }
        (None, error) => {
            println!(
                "  {} Video generation failed: {}",
                style("✗").red().bold(),
                error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    Ok(())
}

fn progress_message(progress: &JobProgress) -> String {
    match progress.status {
        JobStatus::Submitted => "queued".to_string(),
        JobStatus::Processing => "rendering".to_string(),
        other => other.to_string(),
    }
}
