//! Run ledger command

use anyhow::{Context, Result};
use surplus_core::report::money;
use surplus_core::{RunLedger, Settings};

pub fn cmd_ledger(settings: &Settings) -> Result<()> {
    let ledger = RunLedger::open(settings.ledger_file()).context("Failed to open run ledger")?;

    if ledger.is_empty() {
        println!("No transfers recorded yet.");
        return Ok(());
    }

    println!("📒 Transfers by week ({})", ledger.path().display());
    println!();
    println!(
        "{:<10} {:>12}  {:<8} {:<10} {:<20} TRANSFER ID",
        "WEEK", "AMOUNT", "STATUS", "VERIFIED", "RECORDED"
    );
    println!("{}", "-".repeat(80));

    for (week, entry) in ledger.entries() {
        println!(
            "{:<10} {:>12}  {:<8} {:<10} {:<20} {}",
            week,
            money(entry.amount),
            entry.status.as_str(),
            if entry.verified { "yes" } else { "pending" },
            entry.recorded_at.format("%Y-%m-%d %H:%M"),
            entry.transfer_id
        );
    }

    println!();
    println!("Total: {} week(s)", ledger.len());
    Ok(())
}
