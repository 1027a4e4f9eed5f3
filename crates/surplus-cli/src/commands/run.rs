//! Weekly run and analysis commands
//!
//! This module contains:
//! - `resolve_window` - Pick the week to process from `--date`
//! - `cmd_run` - Run the weekly pipeline, transfer included
//! - `cmd_analyze` - Variance only, nothing written

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use surplus_core::{RunOptions, Settings, WeekWindow, WeeklyReport, WeeklyRun};

/// Week containing `date`, or the last complete week before `today`
pub fn resolve_window(date: Option<&str>, today: NaiveDate) -> Result<WeekWindow> {
    match date {
        Some(raw) => {
            let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", raw))?;
            Ok(WeekWindow::containing(date))
        }
        None => Ok(WeekWindow::previous_full_week(today)),
    }
}

pub async fn cmd_run(
    settings: &Settings,
    date: Option<&str>,
    dry_run: bool,
    categorize: bool,
    json: bool,
) -> Result<()> {
    let window = resolve_window(date, Local::now().date_naive())?;
    if !json {
        println!("💰 Processing week {}...", window);
        if dry_run {
            println!("   🧪 Dry run: no money will move and no sheets will be written");
        }
    }

    let run = WeeklyRun::from_settings(settings).context("Failed to set up weekly run")?;
    let report = run
        .execute(
            window,
            RunOptions {
                dry_run,
                categorize,
            },
        )
        .await;

    print_report(&report, json)?;
    if !report.is_success() {
        bail!("Weekly run for {} finished with errors", report.week);
    }
    Ok(())
}

pub async fn cmd_analyze(settings: &Settings, date: Option<&str>, json: bool) -> Result<()> {
    let window = resolve_window(date, Local::now().date_naive())?;
    if !json {
        println!("📊 Analyzing week {}...", window);
    }

    let run = WeeklyRun::from_settings(settings).context("Failed to set up analysis")?;
    let report = run
        .execute(
            window,
            RunOptions {
                dry_run: true,
                categorize: false,
            },
        )
        .await;

    print_report(&report, json)?;
    if !report.is_success() {
        bail!("Analysis for {} finished with errors", report.week);
    }
    Ok(())
}

fn print_report(report: &WeeklyReport, json: bool) -> Result<()> {
    if json {
        let output =
            serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        println!("{}", output);
        return Ok(());
    }

    println!();
    print!("{}", report);
    if report.is_success() {
        println!();
        println!("✅ Done");
    }
    Ok(())
}
