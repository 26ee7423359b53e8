//! `parley contexts` and `parley cleanup`.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use parley_types::conversation::ActiveContextStatus;

use crate::state::AppState;

/// List cached owner -> context mappings.
pub async fn list_contexts(state: &AppState, json: bool) -> Result<()> {
    let contexts = state.orchestrator.active_contexts_status();

    if json {
        println!("{}", serde_json::to_string_pretty(&contexts)?);
        return Ok(());
    }

    if contexts.is_empty() {
        println!();
        println!("  {} No conversation contexts yet.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    println!();
    println!("{}", contexts_table(&contexts));
    println!();
    println!("  {} context(s)", style(contexts.len()).bold());
    println!();
    Ok(())
}

/// Verify every stored context with the provider and drop the dead ones.
pub async fn cleanup(state: &AppState, json: bool) -> Result<()> {
    let report = state.orchestrator.cleanup_corrupted_contexts().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Removed {} stale context(s)",
        style("✓").green().bold(),
        style(report.cleaned).bold()
    );
    if report.errors > 0 {
        println!(
            "  {} {} context(s) could not be verified and were kept",
            style("!").yellow().bold(),
            report.errors
        );
    }
    println!();
    Ok(())
}

fn contexts_table(contexts: &[ActiveContextStatus]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Owner").fg(Color::White),
        Cell::new("Context").fg(Color::White),
        Cell::new("Lock").fg(Color::White),
    ]);

    for ctx in contexts {
        let lock = if ctx.is_locked {
            Cell::new("busy").fg(Color::Yellow)
        } else {
            Cell::new("idle").fg(Color::Green)
        };
        table.add_row(vec![
            Cell::new(ctx.owner_id),
            Cell::new(&ctx.context_id),
            lock,
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_table_rows() {
        let rendered = contexts_table(&[
            ActiveContextStatus {
                context_id: "thread_a".to_string(),
                owner_id: 42,
                is_locked: true,
            },
            ActiveContextStatus {
                context_id: "thread_b".to_string(),
                owner_id: -7,
                is_locked: false,
            },
        ])
        .to_string();
        assert!(rendered.contains("thread_a"));
        assert!(rendered.contains("busy"));
        assert!(rendered.contains("-7"));
        assert!(rendered.contains("idle"));
    }
}
