//! Surplus CLI - Weekly budget variance and savings transfer
//!
//! Usage:
//!   surplus run                   Process last week and transfer any surplus
//!   surplus run --dry-run         Same, without moving money
//!   surplus analyze --date DATE   Show the variance for the week containing DATE
//!   surplus categorize            Fill in missing transaction categories
//!   surplus ledger                List weeks that already transferred

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let settings = commands::load_settings(cli.config.as_deref(), cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Run {
            date,
            dry_run,
            no_categorize,
            json,
        } => {
            commands::cmd_run(&settings, date.as_deref(), dry_run, !no_categorize, json).await
        }
        Commands::Analyze { date, json } => {
            commands::cmd_analyze(&settings, date.as_deref(), json).await
        }
        Commands::Categorize => commands::cmd_categorize(&settings).await,
        Commands::Ledger => commands::cmd_ledger(&settings),
        Commands::Config => commands::cmd_config(&settings, cli.config.as_deref()),
    }
}
