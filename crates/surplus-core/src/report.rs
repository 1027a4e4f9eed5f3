//! Weekly report
//!
//! The serialized form is the run's output contract: `analysis` carries the
//! totals, per-category variances and `budget_status`; `transfer` carries the
//! decision engine's result. Stage failures are listed under `errors`.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregator::CaseMismatch;
use crate::categorize::CategorizeSummary;
use crate::insights::Finding;
use crate::models::{FormattedAnalysis, RowError, TransferResult, TransferStatus, WeekWindow};

/// Pipeline stage, for error attribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LoadTransactions,
    LoadBudget,
    Categorize,
    PersistCategories,
    Aggregate,
    Analyze,
    Transfer,
    Ledger,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::LoadTransactions => "load_transactions",
            Stage::LoadBudget => "load_budget",
            Stage::Categorize => "categorize",
            Stage::PersistCategories => "persist_categories",
            Stage::Aggregate => "aggregate",
            Stage::Analyze => "analyze",
            Stage::Transfer => "transfer",
            Stage::Ledger => "ledger",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
}

/// Everything one weekly run produced
#[derive(Debug, Clone, Serialize)]
pub struct WeeklyReport {
    pub week: String,
    pub window: WeekWindow,
    pub generated_at: DateTime<Utc>,
    pub dry_run: bool,
    /// Transactions inside the window
    pub transaction_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categorization: Option<CategorizeSummary>,
    pub analysis: Option<FormattedAnalysis>,
    pub transfer: Option<TransferResult>,
    pub insights: Vec<Finding>,
    pub case_mismatches: Vec<CaseMismatch>,
    pub row_errors: Vec<RowError>,
    pub errors: Vec<StageError>,
}

impl WeeklyReport {
    pub fn new(window: WeekWindow, dry_run: bool) -> Self {
        Self {
            week: window.key(),
            window,
            generated_at: Utc::now(),
            dry_run,
            transaction_count: 0,
            categorization: None,
            analysis: None,
            transfer: None,
            insights: Vec::new(),
            case_mismatches: Vec::new(),
            row_errors: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn record_error(&mut self, stage: Stage, message: impl Into<String>) {
        self.errors.push(StageError {
            stage,
            message: message.into(),
        });
    }

    pub fn failed_stage(&self, stage: Stage) -> bool {
        self.errors.iter().any(|e| e.stage == stage)
    }

    /// No stage failed and the transfer, if any, did not end in error
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
            && self
                .transfer
                .as_ref()
                .map(|t| t.status != TransferStatus::Error)
                .unwrap_or(true)
    }
}

/// Plain-text summary for terminals and logs
impl fmt::Display for WeeklyReport {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(out, "Weekly budget report for {}", self.window)?;
        if self.dry_run {
            writeln!(out, "(dry run, no money moved)")?;
        }
        writeln!(out)?;

        match self.analysis {
            Some(ref formatted) => {
                let analysis = &formatted.analysis;
                writeln!(out, "Budget:    {}", money(analysis.total_budget))?;
                writeln!(out, "Spent:     {}", money(analysis.total_spent))?;
                writeln!(
                    out,
                    "Variance:  {} ({})",
                    money(analysis.total_variance),
                    formatted.budget_status
                )?;
                writeln!(out, "Transactions: {}", self.transaction_count)?;
                writeln!(out)?;

                let width = analysis
                    .lines
                    .iter()
                    .map(|l| l.name.chars().count())
                    .max()
                    .unwrap_or(8)
                    .max(8);
                writeln!(
                    out,
                    "  {:<width$}  {:>10}  {:>10}  {:>10}",
                    "Category",
                    "Budget",
                    "Actual",
                    "Variance",
                    width = width
                )?;
                for line in &analysis.lines {
                    let marker = if line.unbudgeted { " *" } else { "" };
                    writeln!(
                        out,
                        "  {:<width$}  {:>10}  {:>10}  {:>10}{}",
                        line.name,
                        money(line.budgeted),
                        money(line.actual),
                        money(line.variance),
                        marker,
                        width = width
                    )?;
                }
                if analysis.lines.iter().any(|l| l.unbudgeted) {
                    writeln!(out, "  * not in the budget")?;
                }
            }
            None => writeln!(out, "No analysis available.")?,
        }

        if let Some(ref transfer) = self.transfer {
            writeln!(out)?;
            match transfer.status {
                TransferStatus::Success => {
                    let verification = if transfer.verified {
                        "verified"
                    } else {
                        "completion not yet confirmed"
                    };
                    writeln!(
                        out,
                        "Transfer: {} moved to savings ({}, id {})",
                        money(transfer.transfer_amount),
                        verification,
                        transfer.transfer_id.as_deref().unwrap_or("-")
                    )?;
                }
                TransferStatus::NoTransfer => {
                    let reason = transfer
                        .reason
                        .map(|r| r.describe())
                        .unwrap_or("no transfer");
                    writeln!(out, "Transfer: none ({})", reason)?;
                }
                TransferStatus::Error => {
                    writeln!(
                        out,
                        "Transfer: failed ({})",
                        transfer.error_message.as_deref().unwrap_or("unknown error")
                    )?;
                }
            }
        }

        if !self.insights.is_empty() {
            writeln!(out)?;
            writeln!(out, "Insights:")?;
            for finding in &self.insights {
                writeln!(
                    out,
                    "  {} {}: {}",
                    finding.severity.icon(),
                    finding.title,
                    finding.summary
                )?;
            }
        }

        if !self.errors.is_empty() {
            writeln!(out)?;
            writeln!(out, "Errors:")?;
            for error in &self.errors {
                writeln!(out, "  [{}] {}", error.stage, error.message)?;
            }
        }

        Ok(())
    }
}

/// Dollar amount with the sign ahead of the symbol, e.g. `-$40.00`
pub fn money(amount: Decimal) -> String {
    if amount.is_sign_negative() && !amount.is_zero() {
        format!("-${:.2}", -amount)
    } else {
        format!("${:.2}", amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Budget, Category, NoTransferReason};
    use crate::variance::analyze_and_format;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn report() -> WeeklyReport {
        let window = WeekWindow::containing(NaiveDate::from_ymd_opt(2026, 10, 14).unwrap());
        let mut report = WeeklyReport::new(window, false);

        let mut spending = BTreeMap::new();
        spending.insert("Groceries".to_string(), dec!(120.00));
        spending.insert("Books".to_string(), dec!(15.00));
        let mut budget = Budget::new(
            vec![
                Category::new("Groceries", dec!(150.00)),
                Category::new("Dining Out", dec!(50.00)),
            ],
            spending,
        );
        report.analysis = Some(analyze_and_format(&mut budget).unwrap());
        report.transaction_count = 4;
        report
    }

    #[test]
    fn test_output_contract_keys() {
        let mut report = report();
        report.transfer = Some(TransferResult::success(dec!(65.00), "tx-1".into(), true));
        let json = serde_json::to_value(&report).unwrap();

        let analysis = &json["analysis"];
        for key in [
            "total_budget",
            "total_spent",
            "total_variance",
            "category_variances",
            "budget_status",
        ] {
            assert!(analysis.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(analysis["budget_status"], "surplus");

        let transfer = &json["transfer"];
        for key in ["status", "transfer_amount", "transfer_id", "verified", "error_message"] {
            assert!(transfer.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(transfer["status"], "success");
        assert_eq!(json["week"], "2026-W42");
    }

    #[test]
    fn test_display_text() {
        let mut report = report();
        report.transfer = Some(TransferResult::no_transfer(NoTransferReason::DryRun));
        report.record_error(Stage::PersistCategories, "sheet is read-only");
        let text = report.to_string();

        assert!(text.contains("2026-W42"));
        assert!(text.contains("Variance:  $65.00 (surplus)"));
        assert!(text.contains("Books"));
        assert!(text.contains("* not in the budget"));
        assert!(text.contains("Transfer: none (Dry run, transfer skipped)"));
        assert!(text.contains("[persist_categories] sheet is read-only"));
        assert!(!report.is_success());
    }

    #[test]
    fn test_money_format() {
        assert_eq!(money(dec!(-40)), "-$40.00");
        assert_eq!(money(dec!(0)), "$0.00");
        assert_eq!(money(dec!(1234.5)), "$1234.50");
    }
}
