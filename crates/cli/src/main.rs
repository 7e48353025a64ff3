//! Pacekeeper CLI: the main entry point.
//!
//! Commands:
//! - `report`: Build and save a weekly performance report
//! - `program`: Design and save a multi-phase training program
//! - `config`: Print the default configuration
//!
//! Exit status: 0 when the run saved an artifact, 2 when it was skipped,
//! 1 when it failed.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod artifact_store;
mod commands;

#[derive(Parser)]
#[command(
    name = "pacekeeper",
    about = "Pacekeeper, LLM tool orchestration for training reports and programs",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "PACEKEEPER_JSON_LOGS")]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the weekly performance report for one athlete and week
    Report {
        /// JSON file with `athlete` {id, name} and `week` {start, end}
        #[arg(short, long)]
        context: PathBuf,

        /// JSON file with the athlete's recorded activities
        #[arg(short, long)]
        activities: PathBuf,
    },

    /// Design a training program toward a goal event
    Program {
        /// JSON file with `athlete` {id, name, experience, weekly_hours} and
        /// `goal` {event, event_date, start_date}
        #[arg(short, long)]
        context: PathBuf,
    },

    /// Print the default configuration TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing (stderr, so stdout carries only the outcome)
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let code = match cli.command {
        Commands::Report { context, activities } => commands::report::run(&context, &activities).await?,
        Commands::Program { context } => commands::program::run(&context).await?,
        Commands::Config => {
            commands::config_cmd::run();
            ExitCode::SUCCESS
        }
    };

    Ok(code)
}
