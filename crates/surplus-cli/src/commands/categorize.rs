//! Categorize command

use anyhow::{Context, Result};
use surplus_core::{Settings, WeeklyRun};

pub async fn cmd_categorize(settings: &Settings) -> Result<()> {
    let run = WeeklyRun::from_settings(settings).context("Failed to set up categorizer")?;
    println!(
        "🏷️  Categorizing {}...",
        run.sheets()
            .sheet_path(&settings.sheets.transactions)
            .display()
    );

    let summary = run
        .categorize_sheet()
        .await
        .context("Categorization failed")?;

    if summary.attempted == 0 {
        println!("✅ Every transaction already has a category");
        return Ok(());
    }

    println!("   Uncategorized: {}", summary.attempted);
    println!("   Categorized:   {}", summary.categorized);
    if summary.failed_batches > 0 {
        println!(
            "   ⚠️  {} batch(es) failed; run again to retry",
            summary.failed_batches
        );
    }
    let remaining = summary.attempted - summary.categorized;
    if remaining > 0 {
        println!("   💡 {} transaction(s) still need a category", remaining);
    }
    Ok(())
}
