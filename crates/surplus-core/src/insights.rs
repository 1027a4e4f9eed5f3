//! Weekly insights
//!
//! Rule-based findings over one week's aggregation and analysis. Each finding
//! carries a stable key so repeated runs for the same week produce the same
//! set, and findings are ordered most urgent first.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregator::Aggregation;
use crate::models::{AnalysisResult, BudgetStatus};

/// Overspend above this share of the budgeted amount is a warning
const OVERSPEND_WARNING_PERCENT: Decimal = Decimal::from_parts(25, 0, 0, false, 0);

/// What a finding is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    OverBudget,
    WeeklyDeficit,
    UnbudgetedSpending,
    Uncategorized,
    CaseMismatch,
    SkippedRows,
    SurplusAvailable,
}

impl InsightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightKind::OverBudget => "over_budget",
            InsightKind::WeeklyDeficit => "weekly_deficit",
            InsightKind::UnbudgetedSpending => "unbudgeted_spending",
            InsightKind::Uncategorized => "uncategorized",
            InsightKind::CaseMismatch => "case_mismatch",
            InsightKind::SkippedRows => "skipped_rows",
            InsightKind::SurplusAvailable => "surplus_available",
        }
    }
}

impl fmt::Display for InsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity level of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational - no action needed
    Info,
    /// Worth attention but not urgent
    Attention,
    /// Should be addressed soon
    Warning,
    /// Requires immediate attention
    Alert,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Attention => "attention",
            Severity::Warning => "warning",
            Severity::Alert => "alert",
        }
    }

    /// Numeric priority for sorting (higher = more urgent)
    pub fn priority(&self) -> u8 {
        match self {
            Severity::Info => 1,
            Severity::Attention => 2,
            Severity::Warning => 3,
            Severity::Alert => 4,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Severity::Info => "ℹ️",
            Severity::Attention => "👀",
            Severity::Warning => "⚠️",
            Severity::Alert => "🚨",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One finding for the weekly report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: InsightKind,
    /// Stable key, e.g. "over_budget:Dining Out"
    pub key: String,
    pub severity: Severity,
    pub title: String,
    pub summary: String,
    pub detail: Option<String>,
}

impl Finding {
    fn new(
        kind: InsightKind,
        subject: &str,
        severity: Severity,
        title: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            key: format!("{}:{}", kind.as_str(), subject),
            severity,
            title: title.into(),
            summary: summary.into(),
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

fn money(amount: Decimal) -> String {
    format!("${:.2}", amount)
}

/// Overspend as a whole percentage of the budgeted amount, saturating when
/// the ratio is out of range
fn overspend_percent(budgeted: Decimal, actual: Decimal) -> Option<Decimal> {
    if budgeted.is_zero() {
        return None;
    }
    let pct = actual
        .checked_sub(budgeted)
        .and_then(|over| over.checked_div(budgeted))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::MAX);
    Some(pct.round_dp(0))
}

/// Generate the findings for one week, most urgent first
pub fn generate(
    aggregation: &Aggregation,
    analysis: &AnalysisResult,
    minimum_transfer: Decimal,
) -> Vec<Finding> {
    let mut findings = Vec::new();

    for line in &analysis.lines {
        if line.unbudgeted {
            findings.push(
                Finding::new(
                    InsightKind::UnbudgetedSpending,
                    &line.name,
                    Severity::Attention,
                    "Unbudgeted spending",
                    format!(
                        "{} spent under \"{}\", which has no budget line",
                        money(line.actual),
                        line.name
                    ),
                )
                .with_detail("Add a budget line or recategorize these transactions."),
            );
            continue;
        }
        if line.variance >= Decimal::ZERO {
            continue;
        }

        let over = -line.variance;
        let (severity, summary) = match overspend_percent(line.budgeted, line.actual) {
            Some(pct) => (
                if pct > OVERSPEND_WARNING_PERCENT {
                    Severity::Warning
                } else {
                    Severity::Attention
                },
                format!(
                    "{} over budget by {} ({}% over {})",
                    line.name,
                    money(over),
                    pct,
                    money(line.budgeted)
                ),
            ),
            None => (
                Severity::Warning,
                format!(
                    "{} has no weekly budget but {} was spent",
                    line.name,
                    money(line.actual)
                ),
            ),
        };
        findings.push(Finding::new(
            InsightKind::OverBudget,
            &line.name,
            severity,
            "Category over budget",
            summary,
        ));
    }

    match BudgetStatus::classify(analysis.total_variance) {
        BudgetStatus::Deficit => findings.push(Finding::new(
            InsightKind::WeeklyDeficit,
            "total",
            Severity::Warning,
            "Week over budget",
            format!(
                "Spent {} against a budget of {}, {} over",
                money(analysis.total_spent),
                money(analysis.total_budget),
                money(-analysis.total_variance)
            ),
        )),
        BudgetStatus::Surplus => {
            let summary = if analysis.total_variance >= minimum_transfer {
                format!(
                    "{} left over this week, eligible for savings",
                    money(analysis.total_variance)
                )
            } else {
                format!(
                    "{} left over, below the {} transfer minimum",
                    money(analysis.total_variance),
                    money(minimum_transfer)
                )
            };
            findings.push(Finding::new(
                InsightKind::SurplusAvailable,
                "total",
                Severity::Info,
                "Surplus this week",
                summary,
            ));
        }
        BudgetStatus::Balanced => {}
    }

    if aggregation.uncategorized_count > 0 {
        findings.push(
            Finding::new(
                InsightKind::Uncategorized,
                "transactions",
                Severity::Attention,
                "Uncategorized transactions",
                format!(
                    "{} transaction(s) totalling {} have no category and are not counted",
                    aggregation.uncategorized_count,
                    money(aggregation.uncategorized_total)
                ),
            )
            .with_detail("Categorize them in the transactions sheet or enable the categorizer."),
        );
    }

    for mismatch in &aggregation.case_mismatches {
        findings.push(
            Finding::new(
                InsightKind::CaseMismatch,
                &mismatch.spent_as,
                Severity::Warning,
                "Category name differs only by case",
                format!(
                    "{} recorded as \"{}\" does not count toward \"{}\"",
                    money(mismatch.amount),
                    mismatch.spent_as,
                    mismatch.budget_category
                ),
            )
            .with_detail("Category names must match the budget exactly, including case."),
        );
    }

    if !aggregation.row_errors.is_empty() {
        let detail = aggregation
            .row_errors
            .iter()
            .take(5)
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        findings.push(
            Finding::new(
                InsightKind::SkippedRows,
                "rows",
                Severity::Attention,
                "Rows skipped",
                format!("{} sheet row(s) could not be used", aggregation.row_errors.len()),
            )
            .with_detail(detail),
        );
    }

    // Stable: equal severities keep generation order
    findings.sort_by(|a, b| b.severity.priority().cmp(&a.severity.priority()));
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::build_budget;
    use crate::models::{BudgetRow, Transaction};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn tx(location: &str, amount: Decimal, category: Option<&str>) -> Transaction {
        let ts = NaiveDate::from_ymd_opt(2026, 10, 13)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        Transaction::new(location, amount, ts, category)
    }

    fn run(rows: &[BudgetRow], transactions: &[Transaction]) -> Vec<Finding> {
        let mut aggregation = build_budget(rows, transactions).unwrap();
        let analysis = aggregation.budget.analyze().unwrap();
        generate(&aggregation, &analysis, dec!(1.00))
    }

    #[test]
    fn test_overspend_severity_threshold() {
        let rows = vec![
            BudgetRow::new("Groceries", "100.00"),
            BudgetRow::new("Dining Out", "100.00"),
            BudgetRow::new("Transport", "500.00"),
        ];
        let findings = run(
            &rows,
            &[
                tx("Safeway", dec!(110.00), Some("Groceries")),
                tx("Bistro", dec!(126.00), Some("Dining Out")),
            ],
        );

        let dining = findings.iter().find(|f| f.key == "over_budget:Dining Out").unwrap();
        assert_eq!(dining.severity, Severity::Warning);
        assert!(dining.summary.contains("26% over"));

        let groceries = findings.iter().find(|f| f.key == "over_budget:Groceries").unwrap();
        assert_eq!(groceries.severity, Severity::Attention);

        // Warnings sort before attention and info
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings.last().unwrap().kind, InsightKind::SurplusAvailable);
    }

    #[test]
    fn test_data_quality_findings() {
        let rows = vec![BudgetRow::new("Groceries", "100.00"), BudgetRow::new("", "5")];
        let findings = run(
            &rows,
            &[
                tx("Safeway", dec!(20.00), Some("groceries")),
                tx("Unknown", dec!(5.00), None),
                tx("Bookshop", dec!(12.00), Some("Books")),
            ],
        );

        let kinds: Vec<InsightKind> = findings.iter().map(|f| f.kind).collect();
        assert!(kinds.contains(&InsightKind::CaseMismatch));
        assert!(kinds.contains(&InsightKind::Uncategorized));
        assert!(kinds.contains(&InsightKind::SkippedRows));
        assert!(kinds.contains(&InsightKind::UnbudgetedSpending));
        assert!(findings.iter().any(|f| f.key == "unbudgeted_spending:Books"));
    }

    #[test]
    fn test_deficit_and_zero_budget_line() {
        let rows = vec![BudgetRow::new("Gifts", "0"), BudgetRow::new("Groceries", "10.00")];
        let findings = run(&rows, &[tx("Shop", dec!(30.00), Some("Gifts"))]);

        let gifts = findings.iter().find(|f| f.key == "over_budget:Gifts").unwrap();
        assert_eq!(gifts.severity, Severity::Warning);
        assert!(findings.iter().any(|f| f.kind == InsightKind::WeeklyDeficit));
        assert!(!findings.iter().any(|f| f.kind == InsightKind::SurplusAvailable));
    }

    #[test]
    fn test_huge_overspend_saturates_percent() {
        assert_eq!(overspend_percent(dec!(0), dec!(5)), None);
        assert_eq!(overspend_percent(dec!(10), dec!(15)), Some(dec!(50)));
        assert_eq!(
            overspend_percent(dec!(0.01), Decimal::MAX),
            Some(Decimal::MAX)
        );

        let rows = vec![BudgetRow::new("Gifts", "0.01")];
        let findings = run(
            &rows,
            &[tx("Shop", dec!(79228162514264337593543950), Some("Gifts"))],
        );
        let gifts = findings.iter().find(|f| f.key == "over_budget:Gifts").unwrap();
        assert_eq!(gifts.severity, Severity::Warning);
    }

    #[test]
    fn test_balanced_week_has_no_findings() {
        let rows = vec![BudgetRow::new("Groceries", "50.00")];
        let findings = run(&rows, &[tx("Safeway", dec!(50.00), Some("Groceries"))]);
        assert!(findings.is_empty());
    }
}
