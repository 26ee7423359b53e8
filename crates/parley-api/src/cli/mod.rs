//! CLI command definitions and dispatch for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod chat;
pub mod context;
pub mod convert;
pub mod media;
pub mod provider;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Broker conversations, images and videos across AI providers.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to parley.toml (default: ~/.parley/parley.toml).
    #[arg(long, global = true, env = "PARLEY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true, env = "PARLEY_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send one message to an owner's conversation and print the reply.
    Chat {
        /// Numeric owner (user or chat) id.
        #[arg(allow_negative_numbers = true)]
        owner_id: i64,

        /// Message text.
        message: String,

        /// Image to show the assistant (repeatable).
        #[arg(long = "image", value_name = "PATH")]
        images: Vec<PathBuf>,

        /// Document to make searchable for the assistant (repeatable).
        #[arg(long = "file", value_name = "PATH")]
        files: Vec<PathBuf>,

        /// Directory for files attached to the reply.
        #[arg(long, value_name = "DIR", default_value = ".")]
        output_dir: PathBuf,
    },

    /// Generate an image from a prompt, or redraw a photo with `--from`.
    Image {
        /// What to draw.
        prompt: String,

        /// Source photo to edit instead of drawing from scratch.
        #[arg(long, value_name = "PATH")]
        from: Option<PathBuf>,

        /// Where to write the image when the provider returns bytes.
        #[arg(long, short, default_value = "image.png")]
        output: PathBuf,
    },

    /// Generate a video from a prompt, optionally animating an image.
    Video {
        /// What to render.
        prompt: String,

        /// Source image for image-to-video.
        #[arg(long, value_name = "PATH")]
        image: Option<PathBuf>,

        /// Download the finished video to this path.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Convert a file to JSON with the file-conversion assistant.
    Convert {
        /// File to convert.
        file: PathBuf,

        /// Replace the default conversion instruction.
        #[arg(long)]
        instruction: Option<String>,
    },

    /// Primary/fallback endpoint health and assistant availability.
    Provider {
        #[command(subcommand)]
        action: provider::ProviderCommand,
    },

    /// List cached conversation contexts and their lock state.
    Contexts,

    /// Drop stored contexts the provider no longer knows.
    Cleanup,

    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
