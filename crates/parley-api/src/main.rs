//! Parley CLI and REST API entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, initializes the database and services, then
//! dispatches to the appropriate command handler or starts the REST API server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use parley_observe::tracing_setup::{filter_for_verbosity, init_tracing, shutdown_tracing};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(filter_for_verbosity(cli.verbose, cli.quiet), cli.otel)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "parley", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.config.clone()).await?;

    let result = run(cli, state).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli, state: AppState) -> anyhow::Result<()> {
    match cli.command {
        Commands::Chat {
            owner_id,
            message,
            images,
            files,
            output_dir,
        } => {
            cli::chat::chat(&state, owner_id, &message, &images, &files, &output_dir, cli.json)
                .await?;
        }

        Commands::Image {
            prompt,
            from,
            output,
        } => {
            cli::media::image(&state, &prompt, from.as_ref(), &output, cli.json).await?;
        }

        Commands::Video {
            prompt,
            image,
            output,
        } => {
            cli::media::video(&state, &prompt, image.as_ref(), output.as_ref(), cli.json).await?;
        }

        Commands::Convert { file, instruction } => {
            cli::convert::convert(&state, &file, instruction.as_deref(), cli.json).await?;
        }

        Commands::Provider { action } => {
            cli::provider::handle_provider_command(action, &state, cli.json).await?;
        }

        Commands::Contexts => {
            cli::context::list_contexts(&state, cli.json).await?;
        }

        Commands::Cleanup => {
            cli::context::cleanup(&state, cli.json).await?;
        }

        Commands::Serve { port, host } => {
            match state.orchestrator.cleanup_corrupted_contexts().await {
                Ok(report) => tracing::info!(
                    cleaned = report.cleaned,
                    errors = report.errors,
                    "startup context cleanup finished"
                ),
                Err(e) => tracing::warn!(error = %e, "startup context cleanup failed"),
            }

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Parley API listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!(
                "  {}",
                console::style(format!("Config: {}", state.config_path.display())).dim()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let orchestrator = state.orchestrator.clone();
            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            orchestrator.shutdown();
            println!("\n  Server stopped.");
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
