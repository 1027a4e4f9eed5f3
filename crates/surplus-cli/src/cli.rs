//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Surplus - Move what's left of the weekly budget into savings
#[derive(Parser)]
#[command(name = "surplus")]
#[command(about = "Weekly budget variance and savings transfer", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Settings file (defaults to the per-user config, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the budget/transaction sheets and the run ledger
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the weekly pipeline: analyze the week and transfer any surplus
    Run {
        /// Any date inside the week to process (YYYY-MM-DD).
        /// Defaults to the last complete week.
        #[arg(short, long)]
        date: Option<String>,

        /// Analyze and report without moving money or writing sheets
        #[arg(long)]
        dry_run: bool,

        /// Skip categorizing uncategorized transactions
        #[arg(long)]
        no_categorize: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the week's budget variance without transferring
    Analyze {
        /// Any date inside the week to analyze (YYYY-MM-DD).
        /// Defaults to the last complete week.
        #[arg(short, long)]
        date: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Categorize uncategorized rows of the transactions sheet
    Categorize,

    /// List weeks that already transferred
    Ledger,

    /// Show the effective settings (secrets redacted)
    Config,
}
