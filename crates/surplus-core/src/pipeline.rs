//! Weekly run driver
//!
//! Stages run strictly one after another:
//! load transactions → load budget → categorize → persist categories →
//! aggregate → analyze → transfer → ledger → insights.
//!
//! A stage failure is recorded in the report instead of aborting the process.
//! Stages whose output the transfer depends on (transactions, budget,
//! aggregation, ledger) stop the run before any money moves.

use std::collections::HashSet;

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::aggregator::{build_budget, build_categories, parse_transactions};
use crate::banking::{BankingBackend, BankingClient};
use crate::categorize::{categorize_missing, CategorizeSummary, CategorizerClient};
use crate::error::{Error, Result};
use crate::insights;
use crate::ledger::RunLedger;
use crate::models::{
    parse_amount, parse_timestamp, NoTransferReason, RowError, Transaction, TransactionRow,
    TransferResult, WeekWindow,
};
use crate::report::{Stage, WeeklyReport};
use crate::settings::{Settings, TransactionOrigin};
use crate::sources::{BudgetSource, CsvSheets, TransactionSource};
use crate::transfer::{evaluate, Decision, TransferEngine};
use crate::variance::analyze_and_format;

/// Per-run switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Analyze and report, but never call the transfer capability
    pub dry_run: bool,
    /// Fill in missing categories when a categorizer is configured
    pub categorize: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            categorize: true,
        }
    }
}

/// Transactions loaded for a run, with their position in the source rows
struct LoadedTransactions {
    rows: Vec<TransactionRow>,
    /// `transactions[k]` came from `rows[source_index[k]]`
    source_index: Vec<usize>,
    transactions: Vec<Transaction>,
    errors: Vec<RowError>,
}

/// One weekly run over sheets, a bank and an optional categorizer
pub struct WeeklyRun<'a> {
    settings: &'a Settings,
    sheets: CsvSheets,
    bank: Option<BankingClient>,
    categorizer: Option<CategorizerClient>,
}

impl<'a> WeeklyRun<'a> {
    pub fn new(settings: &'a Settings, sheets: CsvSheets) -> Self {
        Self {
            settings,
            sheets,
            bank: None,
            categorizer: None,
        }
    }

    /// Wire up sheets, bank and categorizer from settings
    ///
    /// A bank that is not configured is not an error here; runs that need it
    /// report the problem in the transfer stage.
    pub fn from_settings(settings: &'a Settings) -> Result<Self> {
        let bank = match BankingClient::from_settings(settings) {
            Ok(bank) => Some(bank),
            Err(Error::Config(message)) => {
                warn!(reason = %message, "Banking is not configured");
                None
            }
            Err(e) => return Err(e),
        };
        let categorizer = CategorizerClient::from_settings(settings)?;

        Ok(Self {
            settings,
            sheets: CsvSheets::new(&settings.data_dir),
            bank,
            categorizer,
        })
    }

    pub fn with_bank(mut self, bank: BankingClient) -> Self {
        self.bank = Some(bank);
        self
    }

    pub fn with_categorizer(mut self, categorizer: CategorizerClient) -> Self {
        self.categorizer = Some(categorizer);
        self
    }

    pub fn sheets(&self) -> &CsvSheets {
        &self.sheets
    }

    fn bank(&self) -> Result<&BankingClient> {
        self.bank
            .as_ref()
            .ok_or_else(|| Error::Config("banking is not configured".into()))
    }

    async fn load_transactions(&self, window: &WeekWindow) -> Result<LoadedTransactions> {
        let rows = match self.settings.sheets.transaction_origin {
            TransactionOrigin::Sheet => {
                self.sheets
                    .transaction_rows(&self.settings.sheets.transactions)
                    .await?
            }
            TransactionOrigin::Bank => {
                let bank = self.bank()?;
                let (source, _) = self.settings.transfer_accounts()?;
                self.settings
                    .retry
                    .run("list_transactions", || bank.list_transactions(source, window.start))
                    .await?
            }
        };

        let (transactions, errors) = parse_transactions(&rows);
        let rejected: HashSet<usize> = errors.iter().map(|e| e.row).collect();
        if !errors.is_empty() {
            warn!(rejected = errors.len(), "Some transaction rows could not be parsed");
        }
        let source_index = (0..rows.len()).filter(|i| !rejected.contains(i)).collect();

        Ok(LoadedTransactions {
            rows,
            source_index,
            transactions,
            errors,
        })
    }

    /// Execute the weekly run for `window`
    pub async fn execute(&self, window: WeekWindow, options: RunOptions) -> WeeklyReport {
        let mut report = WeeklyReport::new(window, options.dry_run);
        let week = window.key();
        info!(week = %week, dry_run = options.dry_run, "Starting weekly run");

        let mut loaded = match self.load_transactions(&window).await {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(error = %e, "Could not load transactions");
                report.record_error(Stage::LoadTransactions, e.to_string());
                return report;
            }
        };

        let in_window: Vec<usize> = loaded
            .transactions
            .iter()
            .enumerate()
            .filter(|(_, t)| window.contains(&t.timestamp))
            .map(|(k, _)| k)
            .collect();
        report.transaction_count = in_window.len();

        let budget_rows = match self.sheets.budget_rows(&self.settings.sheets.budget).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "Could not load budget");
                report.record_error(Stage::LoadBudget, e.to_string());
                return report;
            }
        };

        // Categorize
        if let (true, Some(categorizer)) = (options.categorize, self.categorizer.as_ref()) {
            let allowed: Vec<String> = build_categories(&budget_rows)
                .categories
                .into_iter()
                .map(|c| c.name)
                .collect();
            let mut batch: Vec<Transaction> = in_window
                .iter()
                .map(|&k| loaded.transactions[k].clone())
                .collect();
            let summary = categorize_missing(
                categorizer,
                &mut batch,
                &allowed,
                self.settings.categorizer.batch_size,
            )
            .await;
            if summary.failed_batches > 0 {
                report.record_error(
                    Stage::Categorize,
                    format!("{} categorization batch(es) failed", summary.failed_batches),
                );
            }

            let changed = summary.categorized > 0;
            for (&k, categorized) in in_window.iter().zip(batch) {
                loaded.transactions[k] = categorized;
            }
            report.categorization = Some(summary);

            if changed && !options.dry_run {
                if let Err(e) = self.persist_categories(&mut loaded, &in_window).await {
                    warn!(error = %e, "Could not save categorized transactions");
                    report.record_error(Stage::PersistCategories, e.to_string());
                }
            }
        }

        let week_transactions: Vec<Transaction> = in_window
            .iter()
            .map(|&k| loaded.transactions[k].clone())
            .collect();

        let mut aggregation = match build_budget(&budget_rows, &week_transactions) {
            Ok(aggregation) => aggregation,
            Err(e) => {
                error!(error = %e, "Could not build budget");
                report.record_error(Stage::Aggregate, e.to_string());
                return report;
            }
        };
        // Unparseable transaction rows are reported alongside rejected budget rows
        aggregation.row_errors.extend(loaded.errors.iter().cloned());
        report.case_mismatches = aggregation.case_mismatches.clone();
        report.row_errors = aggregation.row_errors.clone();

        let formatted = match analyze_and_format(&mut aggregation.budget) {
            Ok(formatted) => formatted,
            Err(e) => {
                error!(error = %e, "Variance analysis failed");
                report.record_error(Stage::Analyze, e.to_string());
                return report;
            }
        };
        info!(
            total_budget = %formatted.analysis.total_budget,
            total_spent = %formatted.analysis.total_spent,
            total_variance = %formatted.analysis.total_variance,
            status = %formatted.budget_status,
            "Variance analysis complete"
        );

        let transfer = self
            .decide_transfer(&week, formatted.analysis.total_variance, options, &mut report)
            .await;
        report.transfer = Some(transfer);

        report.insights = insights::generate(
            &aggregation,
            &formatted.analysis,
            self.settings.transfer.minimum_amount,
        );
        report.analysis = Some(formatted);

        info!(
            week = %week,
            errors = report.errors.len(),
            success = report.is_success(),
            "Weekly run finished"
        );
        report
    }

    async fn decide_transfer(
        &self,
        week: &str,
        total_variance: Decimal,
        options: RunOptions,
        report: &mut WeeklyReport,
    ) -> TransferResult {
        let minimum = self.settings.transfer.minimum_amount;
        if let Decision::Skip(reason) = evaluate(total_variance, minimum) {
            return TransferResult::no_transfer(reason);
        }
        if options.dry_run {
            info!(amount = %total_variance, "Dry run, transfer skipped");
            return TransferResult::no_transfer(NoTransferReason::DryRun);
        }

        let mut ledger = match RunLedger::open(self.settings.ledger_file()) {
            Ok(ledger) => ledger,
            Err(e) => {
                error!(error = %e, "Run ledger unreadable, refusing to transfer");
                report.record_error(Stage::Ledger, e.to_string());
                return TransferResult::error("Run ledger unavailable, transfer skipped", None);
            }
        };
        if let Some(entry) = ledger.entry(week) {
            info!(week, transfer_id = %entry.transfer_id, "Transfer already made this week");
            return TransferResult::no_transfer(NoTransferReason::AlreadyTransferred);
        }

        let engine = match self
            .bank()
            .and_then(|bank| TransferEngine::from_settings(bank.clone(), self.settings))
        {
            Ok(engine) => engine,
            Err(e) => {
                report.record_error(Stage::Transfer, e.to_string());
                return TransferResult::error("Transfer is not configured", None);
            }
        };

        let result = engine.execute(total_variance, week).await;

        if let Err(e) = ledger.record(week, &result) {
            error!(error = %e, "Transfer made but not recorded in the run ledger");
            report.record_error(Stage::Ledger, e.to_string());
        }
        result
    }

    /// Write categories back to the transactions sheet
    ///
    /// Sheet-backed runs rewrite every row so rows outside the week and rows
    /// that failed to parse survive. Bank-backed runs merge the week's rows
    /// into whatever the sheet already holds.
    async fn persist_categories(
        &self,
        loaded: &mut LoadedTransactions,
        in_window: &[usize],
    ) -> Result<()> {
        let sheet = &self.settings.sheets.transactions;
        let rows: Vec<TransactionRow> = match self.settings.sheets.transaction_origin {
            TransactionOrigin::Sheet => {
                for &k in in_window {
                    let index = loaded.source_index[k];
                    loaded.rows[index].category = loaded.transactions[k].category.clone();
                }
                loaded.rows.clone()
            }
            TransactionOrigin::Bank => {
                let existing = match self.sheets.transaction_rows(sheet).await {
                    Ok(rows) => rows,
                    Err(Error::NotFound(_)) => Vec::new(),
                    Err(e) => return Err(e),
                };
                let week = in_window
                    .iter()
                    .map(|&k| loaded.transactions[k].to_row())
                    .collect();
                merge_transaction_rows(existing, week)
            }
        };
        self.sheets.write_transaction_rows(sheet, &rows).await
    }

    /// Categorize every uncategorized row of the transactions sheet and save it
    pub async fn categorize_sheet(&self) -> Result<CategorizeSummary> {
        let categorizer = self
            .categorizer
            .as_ref()
            .ok_or_else(|| Error::Config("no categorizer configured".into()))?;

        let mut rows = self
            .sheets
            .transaction_rows(&self.settings.sheets.transactions)
            .await?;
        let budget_rows = self.sheets.budget_rows(&self.settings.sheets.budget).await?;
        let allowed: Vec<String> = build_categories(&budget_rows)
            .categories
            .into_iter()
            .map(|c| c.name)
            .collect();
        if allowed.is_empty() {
            return Err(Error::validation("categories", "budget has no valid categories"));
        }

        let (mut transactions, errors) = parse_transactions(&rows);
        let rejected: HashSet<usize> = errors.iter().map(|e| e.row).collect();
        let source_index: Vec<usize> = (0..rows.len()).filter(|i| !rejected.contains(i)).collect();

        let summary = categorize_missing(
            categorizer,
            &mut transactions,
            &allowed,
            self.settings.categorizer.batch_size,
        )
        .await;

        if summary.categorized > 0 {
            for (k, transaction) in transactions.iter().enumerate() {
                rows[source_index[k]].category = transaction.category.clone();
            }
            self.sheets
                .write_transaction_rows(&self.settings.sheets.transactions, &rows)
                .await?;
        }
        Ok(summary)
    }
}

/// Identity of a sheet row: location, amount and timestamp, compared by value
/// where they parse
fn row_key(row: &TransactionRow) -> (String, String, String) {
    let amount = parse_amount(&row.amount)
        .map(|a| a.normalize().to_string())
        .unwrap_or_else(|_| row.amount.trim().to_string());
    let timestamp = parse_timestamp(&row.timestamp)
        .map(|t| t.to_string())
        .unwrap_or_else(|_| row.timestamp.trim().to_string());
    (row.location.trim().to_string(), amount, timestamp)
}

/// Replace existing rows that match an update, append the rest
fn merge_transaction_rows(
    mut existing: Vec<TransactionRow>,
    updates: Vec<TransactionRow>,
) -> Vec<TransactionRow> {
    let keys: Vec<_> = existing.iter().map(row_key).collect();
    let mut replaced = vec![false; existing.len()];

    for update in updates {
        let key = row_key(&update);
        let slot = (0..existing.len()).find(|&i| !replaced[i] && keys[i] == key);
        match slot {
            Some(i) => {
                existing[i] = update;
                replaced[i] = true;
            }
            None => existing.push(update),
        }
    }
    existing
}
