//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `run` - Weekly run and analysis commands, plus week selection
//! - `categorize` - Sheet categorization command
//! - `ledger` - Run ledger listing
//! - `config` - Effective settings display and loading

pub mod categorize;
pub mod config;
pub mod ledger;
pub mod run;

// Re-export command functions for main.rs
pub use categorize::*;
pub use config::*;
pub use ledger::*;
pub use run::*;

