//! Data models for surplus

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A named budget line item with a weekly spending limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub weekly_amount: Decimal,
}

impl Category {
    pub fn new(name: impl Into<String>, weekly_amount: Decimal) -> Self {
        Self {
            name: name.into(),
            weekly_amount,
        }
    }
}

/// One spend event, optionally categorized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Merchant as reported by the bank
    pub location: String,
    pub amount: Decimal,
    pub timestamp: NaiveDateTime,
    /// None means uncategorized
    pub category: Option<String>,
}

impl Transaction {
    pub fn new(
        location: impl Into<String>,
        amount: Decimal,
        timestamp: NaiveDateTime,
        category: Option<&str>,
    ) -> Self {
        Self {
            location: location.into(),
            amount,
            timestamp,
            category: category.map(str::to_string),
        }
    }

    /// Category name if present and not blank
    pub fn category_name(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Convert back to a raw sheet row
    pub fn to_row(&self) -> TransactionRow {
        TransactionRow {
            location: self.location.clone(),
            amount: self.amount.to_string(),
            timestamp: self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            category: self.category.clone(),
        }
    }
}

/// Raw budget row as read from the budget sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRow {
    pub name: String,
    pub amount: String,
}

impl BudgetRow {
    pub fn new(name: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            amount: amount.into(),
        }
    }
}

/// Raw transaction row as read from the transactions sheet or the bank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub location: String,
    pub amount: String,
    pub timestamp: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// A row that was excluded during aggregation, with the offending field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// Zero-based index into the source rows
    pub row: usize,
    pub field: String,
    pub message: String,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}: {}", self.row + 1, self.field, self.message)
    }
}

/// The aggregate at the center of the weekly analysis
///
/// Derived totals exist only after [`Budget::analyze`] has run; the inputs
/// never change after construction.
#[derive(Debug, Clone)]
pub struct Budget {
    categories: Vec<Category>,
    actual_spending: BTreeMap<String, Decimal>,
    analysis: Option<AnalysisResult>,
}

impl Budget {
    pub fn new(categories: Vec<Category>, actual_spending: BTreeMap<String, Decimal>) -> Self {
        Self {
            categories,
            actual_spending,
            analysis: None,
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn actual_spending(&self) -> &BTreeMap<String, Decimal> {
        &self.actual_spending
    }

    /// Amount spent in a category, zero when nothing was recorded
    pub fn spent_in(&self, name: &str) -> Decimal {
        self.actual_spending
            .get(name)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn is_analyzed(&self) -> bool {
        self.analysis.is_some()
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    pub fn total_budget(&self) -> Option<Decimal> {
        self.analysis.as_ref().map(|a| a.total_budget)
    }

    pub fn total_spent(&self) -> Option<Decimal> {
        self.analysis.as_ref().map(|a| a.total_spent)
    }

    pub fn total_variance(&self) -> Option<Decimal> {
        self.analysis.as_ref().map(|a| a.total_variance)
    }

    pub fn category_variances(&self) -> Option<&BTreeMap<String, Decimal>> {
        self.analysis.as_ref().map(|a| &a.category_variances)
    }

    /// Run variance analysis; see [`crate::variance::analyze`]
    pub fn analyze(&mut self) -> Result<AnalysisResult> {
        crate::variance::analyze(self)
    }

    pub(crate) fn store_analysis(&mut self, analysis: AnalysisResult) {
        self.analysis = Some(analysis);
    }
}

/// Per-category detail of an analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLine {
    pub name: String,
    pub budgeted: Decimal,
    pub actual: Decimal,
    pub variance: Decimal,
    /// Spending under a name the budget does not have
    pub unbudgeted: bool,
}

/// Budget-vs-actual result for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub total_budget: Decimal,
    pub total_spent: Decimal,
    pub total_variance: Decimal,
    pub category_variances: BTreeMap<String, Decimal>,
    /// Budget order, then unbudgeted names in name order
    pub lines: Vec<CategoryLine>,
    /// Prospective savings transfer, `max(total_variance, 0)`
    pub transfer_amount: Decimal,
}

/// Overall position of the week
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Surplus,
    Deficit,
    Balanced,
}

impl BudgetStatus {
    /// Classify a total variance. The transfer engine uses the same function
    /// for its first decision.
    pub fn classify(total_variance: Decimal) -> Self {
        match total_variance.cmp(&Decimal::ZERO) {
            std::cmp::Ordering::Greater => BudgetStatus::Surplus,
            std::cmp::Ordering::Less => BudgetStatus::Deficit,
            std::cmp::Ordering::Equal => BudgetStatus::Balanced,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetStatus::Surplus => "surplus",
            BudgetStatus::Deficit => "deficit",
            BudgetStatus::Balanced => "balanced",
        }
    }
}

impl fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Analysis result with the consumer-facing status field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedAnalysis {
    #[serde(flatten)]
    pub analysis: AnalysisResult,
    pub budget_status: BudgetStatus,
}

/// Terminal state of the transfer decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Success,
    Error,
    NoTransfer,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Success => "success",
            TransferStatus::Error => "error",
            TransferStatus::NoTransfer => "no_transfer",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why no transfer was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoTransferReason {
    /// Variance is zero or negative
    InvalidAmount,
    /// Surplus exists but is under the configured floor
    BelowMinimum,
    /// The ledger already has a transfer for this week
    AlreadyTransferred,
    DryRun,
}

impl NoTransferReason {
    pub fn describe(&self) -> &'static str {
        match self {
            NoTransferReason::InvalidAmount => "Invalid transfer amount",
            NoTransferReason::BelowMinimum => "Surplus is below the minimum transfer amount",
            NoTransferReason::AlreadyTransferred => "A transfer was already made for this week",
            NoTransferReason::DryRun => "Dry run, transfer skipped",
        }
    }
}

/// Outcome of evaluating a surplus against transfer policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub status: TransferStatus,
    /// Zero unless the transfer succeeded
    pub transfer_amount: Decimal,
    pub transfer_id: Option<String>,
    /// Completion was confirmed with the bank
    pub verified: bool,
    /// Sanitized; never contains account identifiers or response bodies
    pub error_message: Option<String>,
    pub reason: Option<NoTransferReason>,
}

impl TransferResult {
    pub fn no_transfer(reason: NoTransferReason) -> Self {
        Self {
            status: TransferStatus::NoTransfer,
            transfer_amount: Decimal::ZERO,
            transfer_id: None,
            verified: false,
            error_message: None,
            reason: Some(reason),
        }
    }

    pub fn error(message: impl Into<String>, transfer_id: Option<String>) -> Self {
        Self {
            status: TransferStatus::Error,
            transfer_amount: Decimal::ZERO,
            transfer_id,
            verified: false,
            error_message: Some(message.into()),
            reason: None,
        }
    }

    pub fn success(amount: Decimal, transfer_id: String, verified: bool) -> Self {
        Self {
            status: TransferStatus::Success,
            transfer_amount: amount,
            transfer_id: Some(transfer_id),
            verified,
            error_message: None,
            reason: None,
        }
    }
}

/// Seven-day reporting window, Monday through Sunday
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekWindow {
    /// The ISO week containing `date`
    pub fn containing(date: NaiveDate) -> Self {
        let offset = date.weekday().num_days_from_monday() as i64;
        let start = date - Duration::days(offset);
        Self {
            start,
            end: start + Duration::days(6),
        }
    }

    /// The last complete week before `today`'s week
    pub fn previous_full_week(today: NaiveDate) -> Self {
        Self::containing(today - Duration::days(7))
    }

    pub fn contains(&self, timestamp: &NaiveDateTime) -> bool {
        let date = timestamp.date();
        date >= self.start && date <= self.end
    }

    /// Ledger key, e.g. `2026-W42`
    pub fn key(&self) -> String {
        let week = self.start.iso_week();
        format!("{}-W{:02}", week.year(), week.week())
    }
}

impl fmt::Display for WeekWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} to {})", self.key(), self.start, self.end)
    }
}

/// Parse a money cell from a sheet or API
///
/// Accepts `$` prefixes, thousands separators and accounting parentheses for
/// negatives. The sign is preserved; callers decide whether negatives are valid.
pub fn parse_amount(raw: &str) -> Result<Decimal> {
    let mut s = raw.trim().to_string();
    if s.is_empty() {
        return Err(Error::validation("amount", "amount is empty"));
    }

    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') {
        negative = true;
        s = s[1..s.len() - 1].trim().to_string();
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        s = rest.trim().to_string();
    }
    if let Some(rest) = s.strip_prefix('$') {
        s = rest.trim().to_string();
    }
    s.retain(|c| c != ',');

    let value = Decimal::from_str(&s)
        .map_err(|_| Error::validation("amount", format!("'{}' is not a number", raw.trim())))?;

    Ok(if negative { -value } else { value })
}

/// Parse a timestamp cell; date-only values land at midnight
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }

    for format in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Ok(date.and_time(NaiveTime::MIN));
        }
    }

    Err(Error::validation(
        "timestamp",
        format!("'{}' is not a recognized date", s),
    ))
}
