//! Settings loading and display
//!
//! This module contains:
//! - `load_settings` - Shared utility to build the effective settings
//! - `cmd_config` - Print them, secrets redacted

use std::path::Path;

use anyhow::{Context, Result};
use surplus_core::settings::{resolve_config_path, Settings};

/// Settings file (or built-in defaults) plus environment, then `--data-dir`
pub fn load_settings(config: Option<&Path>, data_dir: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::load(config).context("Failed to load settings")?;
    if let Some(dir) = data_dir {
        settings.data_dir = dir.to_path_buf();
    }
    Ok(settings)
}

fn or_unset(value: Option<&str>) -> &str {
    value.unwrap_or("(not set)")
}

fn secret(is_set: bool) -> &'static str {
    if is_set {
        "set (hidden)"
    } else {
        "(not set)"
    }
}

pub fn cmd_config(settings: &Settings, config: Option<&Path>) -> Result<()> {
    match resolve_config_path(config) {
        Some(path) => println!("⚙️  Settings from {}", path.display()),
        None => println!("⚙️  Settings from built-in defaults"),
    }
    println!();

    println!("Data");
    println!("   Directory:        {}", settings.data_dir.display());
    println!("   Budget sheet:     {}", settings.sheets.budget);
    println!("   Transactions:     {}", settings.sheets.transactions);
    println!("   Origin:           {:?}", settings.sheets.transaction_origin);
    println!("   Run ledger:       {}", settings.ledger_file().display());
    println!();

    println!("Transfer");
    println!("   Minimum:          ${:.2}", settings.transfer.minimum_amount);
    println!(
        "   Source:           {}",
        or_unset(settings.transfer.source_account_id.as_deref())
    );
    println!(
        "   Destination:      {}",
        or_unset(settings.transfer.destination_account_id.as_deref())
    );
    println!(
        "   Completion:       {} check(s), {:?} apart",
        settings.transfer.completion_checks, settings.transfer.completion_interval
    );
    println!();

    println!("Retry");
    println!("   Attempts:         {}", settings.retry.max_attempts);
    println!(
        "   Backoff:          {:?} x{} (max {:?})",
        settings.retry.base_delay, settings.retry.multiplier, settings.retry.max_delay
    );
    println!(
        "   Circuit:          opens after {} failures, {:?} cool-down",
        settings.circuit.failure_threshold, settings.circuit.recovery_wait
    );
    println!();

    println!("Banking");
    println!("   Backend:          {:?}", settings.banking.backend);
    println!(
        "   Base URL:         {}",
        or_unset(settings.banking.base_url.as_deref())
    );
    println!("   Token:            {}", secret(settings.banking.token.is_some()));
    println!();

    println!("Categorizer");
    println!("   Backend:          {}", settings.categorizer.backend.as_str());
    println!(
        "   Host:             {}",
        or_unset(settings.categorizer.host.as_deref())
    );
    println!("   Model:            {}", settings.categorizer.model);
    println!(
        "   API key:          {}",
        secret(settings.categorizer.api_key.is_some())
    );
    println!("   Batch size:       {}", settings.categorizer.batch_size);

    Ok(())
}
