//! `parley provider status|recheck|assistant`.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use parley_types::provider::{AssistantStatus, ProviderStatus};

use crate::state::AppState;

/// Provider health subcommands.
#[derive(Subcommand)]
pub enum ProviderCommand {
    /// Show the primary/fallback endpoints and which one is in use.
    Status,

    /// Probe the primary now, ignoring the cached verdict.
    Recheck,

    /// Check that an assistant can be retrieved (default: the conversation assistant).
    Assistant {
        /// Assistant id to check.
        id: Option<String>,
    },
}

pub async fn handle_provider_command(cmd: ProviderCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        ProviderCommand::Status => {
            print_status(&state.orchestrator.provider_status(), json)?;
        }
        ProviderCommand::Recheck => {
            let available = state.orchestrator.force_health_recheck().await;
            if !json {
                let verdict = if available {
                    style("available").green().to_string()
                } else {
                    style("unavailable").red().to_string()
                };
                println!();
                println!("  {} Primary endpoint is {verdict}", style("⟳").bold());
            }
            print_status(&state.orchestrator.provider_status(), json)?;
        }
        ProviderCommand::Assistant { id } => {
            let status = state.orchestrator.check_assistant_status(id.as_deref()).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_assistant(&status);
            }
        }
    }
    Ok(())
}

fn print_assistant(status: &AssistantStatus) {
    println!();
    match status {
        AssistantStatus::Available(info) => {
            println!(
                "  {} Assistant {} is available",
                style("✓").green().bold(),
                style(&info.id).cyan()
            );
            for (label, value) in [
                ("Name", info.name.as_deref()),
                ("Model", info.model.as_deref()),
                ("Description", info.description.as_deref()),
            ] {
                if let Some(value) = value {
                    println!("    {:<12} {value}", style(label).dim());
                }
            }
        }
        AssistantStatus::Unavailable { id, error } => {
            println!(
                "  {} Assistant {} is unavailable: {error}",
                style("✗").red().bold(),
                style(id).cyan()
            );
        }
    }
    println!();
}

fn print_status(status: &ProviderStatus, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }

    println!();
    println!("  {}", style("Provider Health Status").bold());
    println!();
    println!("{}", status_table(status));
    println!();
    Ok(())
}

fn status_table(status: &ProviderStatus) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Role").fg(Color::White),
        Cell::new("Endpoint").fg(Color::White),
        Cell::new("State").fg(Color::White),
    ]);

    let (primary_state, fallback_state) = if status.is_primary_available {
        (Cell::new("active").fg(Color::Green), Cell::new("standby").fg(Color::DarkGrey))
    } else {
        (Cell::new("DOWN").fg(Color::Red), Cell::new("active").fg(Color::Green))
    };

    table.add_row(vec![
        Cell::new("primary"),
        Cell::new(&status.primary_endpoint),
        primary_state,
    ]);
    table.add_row(vec![
        Cell::new("fallback"),
        Cell::new(&status.fallback_endpoint),
        fallback_state,
    ]);
    table
}
