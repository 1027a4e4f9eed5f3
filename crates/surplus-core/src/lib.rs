//! Surplus Core Library
//!
//! Shared functionality for the weekly budget and savings pipeline:
//! - Budget aggregation from budget and transaction sheets
//! - Variance analysis and budget status
//! - Surplus transfer decision engine with retries and idempotency
//! - Pluggable banking backends (REST API, in-memory mock)
//! - Optional LLM categorization of uncategorized transactions
//! - Run ledger so a week never transfers twice
//! - Weekly report with rule-based insights

pub mod aggregator;
pub mod banking;
pub mod categorize;
pub mod error;
pub mod insights;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod settings;
pub mod sources;
pub mod transfer;
pub mod variance;

/// Test utilities including mock banking server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use aggregator::{build_budget, Aggregation, CaseMismatch};
pub use banking::{
    AccountDetails, AccountStatus, BankingBackend, BankingClient, HttpBanking, MockBanking,
    MockFailure, TransferReceipt, TransferRequest, TransferState,
};
pub use categorize::{
    categorize_missing, CategorizeSummary, Categorizer, CategorizerClient, MockCategorizer,
    OpenAICompatibleCategorizer,
};
pub use error::{Error, Result};
pub use insights::{Finding, InsightKind, Severity};
pub use ledger::{LedgerEntry, RunLedger};
pub use models::{
    AnalysisResult, Budget, BudgetRow, BudgetStatus, Category, FormattedAnalysis,
    NoTransferReason, Transaction, TransactionRow, TransferResult, TransferStatus, WeekWindow,
};
pub use pipeline::{RunOptions, WeeklyRun};
pub use report::{Stage, StageError, WeeklyReport};
pub use retry::{CircuitBreaker, RetryPolicy};
pub use settings::Settings;
pub use sources::{BudgetSource, CsvSheets, TransactionSource};
pub use transfer::{evaluate, Decision, TransferEngine, TransferPolicy};
pub use variance::analyze_and_format;
