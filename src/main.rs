use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use matchday::config::Config;
use matchday::models::EventId;

mod commands;

#[derive(Parser)]
#[command(
    name = "matchday",
    version,
    about = "Publishes pre-match, match and post-match threads exactly once per fixture",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (defaults to MATCHDAY_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every stage once and exit (for cron)
    Tick,

    /// Run continuously until Ctrl-C
    Run,

    /// Show stage targets, ledger flags and metrics
    Status,

    /// Record a stage as published without publishing
    Mark {
        /// Provider fixture id
        event_id: EventId,

        /// Stage: pre, live or post
        stage: String,
    },

    /// Print a stage's thread for the tracked event without publishing
    Preview {
        /// Stage: pre, live or post
        stage: String,

        /// Terminal status code for the post-match thread (FT, AET, PEN, ABD, ...)
        #[arg(long)]
        status: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;

    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    if let Err(e) = matchday::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics unavailable");
    }

    tracing::info!(dry_run = config.publisher.dry_run, "matchday starting");

    match cli.command {
        Commands::Tick => {
            let code = commands::tick(config).await?;
            if code != 0 {
                tracing::warn!(exit_code = code, "One or more stages failed this run");
                std::process::exit(code);
            }
        }

        Commands::Run => {
            commands::run(config).await?;
        }

        Commands::Status => {
            commands::status(config).await?;
        }

        Commands::Mark { event_id, stage } => {
            tracing::info!(event_id = %event_id, stage = %stage, "Starting mark command");
            commands::mark(config, event_id, &stage).await?;
        }

        Commands::Preview { stage, status } => {
            commands::preview(config, &stage, status.as_deref()).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("matchday=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("matchday={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
