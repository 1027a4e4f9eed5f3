//! Budget Aggregator
//!
//! Turns raw sheet rows into a [`Budget`] ready for variance analysis:
//! - `build_categories` validates budget rows, collecting per-row errors
//! - `parse_transactions` converts raw transaction rows
//! - `aggregate_actual_spending` sums spend per category name
//! - `build_budget` ties the three together
//!
//! Category names are matched with exact, case-sensitive equality. Names that
//! differ from a budget category only by case are reported as mismatches and
//! left as separate (unbudgeted) spending.

use std::collections::{BTreeMap, HashSet};

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{
    parse_amount, parse_timestamp, Budget, BudgetRow, Category, RowError, Transaction,
    TransactionRow,
};

/// Valid categories plus the rows that were rejected
#[derive(Debug, Clone, Default)]
pub struct CategoryBuild {
    pub categories: Vec<Category>,
    pub errors: Vec<RowError>,
}

/// Spend grouped by category name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpendingAggregate {
    pub by_category: BTreeMap<String, Decimal>,
    pub uncategorized_count: usize,
    pub uncategorized_total: Decimal,
}

/// Spend recorded under a name that matches a budget category only when case is ignored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseMismatch {
    pub spent_as: String,
    pub budget_category: String,
    pub amount: Decimal,
}

/// Everything the aggregator produced for one run
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub budget: Budget,
    pub row_errors: Vec<RowError>,
    pub uncategorized_count: usize,
    pub uncategorized_total: Decimal,
    pub case_mismatches: Vec<CaseMismatch>,
}

/// Validate budget rows into categories
///
/// Invalid rows (blank name, duplicate name, non-numeric or negative amount)
/// are excluded and reported; the rest of the batch is kept. For duplicates
/// the first occurrence wins.
pub fn build_categories(rows: &[BudgetRow]) -> CategoryBuild {
    let mut build = CategoryBuild::default();
    let mut seen: HashSet<String> = HashSet::new();

    for (index, row) in rows.iter().enumerate() {
        let name = row.name.trim();
        if name.is_empty() {
            build.errors.push(RowError {
                row: index,
                field: "name".into(),
                message: "category name is empty".into(),
            });
            continue;
        }

        if seen.contains(name) {
            build.errors.push(RowError {
                row: index,
                field: "name".into(),
                message: format!("duplicate category '{}'", name),
            });
            continue;
        }

        let amount = match parse_amount(&row.amount) {
            Ok(amount) if amount < Decimal::ZERO => {
                build.errors.push(RowError {
                    row: index,
                    field: "weekly_amount".into(),
                    message: format!("amount for '{}' is negative", name),
                });
                continue;
            }
            Ok(amount) => amount,
            Err(e) => {
                build.errors.push(RowError {
                    row: index,
                    field: "weekly_amount".into(),
                    message: format!("amount for '{}' is invalid: {}", name, describe(&e)),
                });
                continue;
            }
        };

        seen.insert(name.to_string());
        build.categories.push(Category::new(name, amount));
    }

    if !build.errors.is_empty() {
        warn!(
            rejected = build.errors.len(),
            accepted = build.categories.len(),
            "Some budget rows were rejected"
        );
    }

    build
}

/// Convert raw transaction rows, collecting the ones that cannot be parsed
pub fn parse_transactions(rows: &[TransactionRow]) -> (Vec<Transaction>, Vec<RowError>) {
    let mut transactions = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        let amount = match parse_amount(&row.amount) {
            Ok(a) => a,
            Err(e) => {
                errors.push(RowError {
                    row: index,
                    field: "amount".into(),
                    message: describe(&e),
                });
                continue;
            }
        };
        let timestamp = match parse_timestamp(&row.timestamp) {
            Ok(t) => t,
            Err(e) => {
                errors.push(RowError {
                    row: index,
                    field: "timestamp".into(),
                    message: describe(&e),
                });
                continue;
            }
        };

        transactions.push(Transaction {
            location: row.location.trim().to_string(),
            amount,
            timestamp,
            category: row
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        });
    }

    (transactions, errors)
}

/// Sum transaction amounts per category name
///
/// Uncategorized transactions are counted but excluded from the sums. Names
/// the budget does not know are still summed. A sum outside the decimal range
/// is a validation error.
pub fn aggregate_actual_spending(transactions: &[Transaction]) -> Result<SpendingAggregate> {
    let mut aggregate = SpendingAggregate::default();

    for tx in transactions {
        match tx.category_name() {
            Some(name) => {
                let total = aggregate
                    .by_category
                    .entry(name.to_string())
                    .or_insert(Decimal::ZERO);
                *total = total
                    .checked_add(tx.amount)
                    .ok_or_else(|| overflow(&format!("spending in \"{}\"", name)))?;
            }
            None => {
                aggregate.uncategorized_count += 1;
                aggregate.uncategorized_total = aggregate
                    .uncategorized_total
                    .checked_add(tx.amount)
                    .ok_or_else(|| overflow("uncategorized spending"))?;
            }
        }
    }

    debug!(
        categories = aggregate.by_category.len(),
        uncategorized = aggregate.uncategorized_count,
        "Aggregated actual spending"
    );

    Ok(aggregate)
}

fn overflow(what: &str) -> Error {
    Error::validation("transactions", format!("{} is too large to total", what))
}

/// Find spend names that equal a budget category when case is ignored
pub fn find_case_mismatches(
    categories: &[Category],
    spending: &BTreeMap<String, Decimal>,
) -> Vec<CaseMismatch> {
    let exact: HashSet<&str> = categories.iter().map(|c| c.name.as_str()).collect();

    spending
        .iter()
        .filter(|(name, _)| !exact.contains(name.as_str()))
        .filter_map(|(name, amount)| {
            let lowered = name.to_lowercase();
            categories
                .iter()
                .find(|c| c.name.to_lowercase() == lowered)
                .map(|c| CaseMismatch {
                    spent_as: name.clone(),
                    budget_category: c.name.clone(),
                    amount: *amount,
                })
        })
        .collect()
}

/// Build a [`Budget`] from budget rows and parsed transactions
///
/// Fails with a validation error when no valid category survives, since a
/// variance over zero categories means nothing.
pub fn build_budget(rows: &[BudgetRow], transactions: &[Transaction]) -> Result<Aggregation> {
    let CategoryBuild { categories, errors } = build_categories(rows);

    if categories.is_empty() {
        return Err(Error::validation(
            "categories",
            format!(
                "no valid budget categories ({} rows rejected)",
                errors.len()
            ),
        ));
    }

    let spending = aggregate_actual_spending(transactions)?;
    let case_mismatches = find_case_mismatches(&categories, &spending.by_category);
    for mismatch in &case_mismatches {
        warn!(
            spent_as = %mismatch.spent_as,
            budget_category = %mismatch.budget_category,
            "Spending category differs from budget category only by case; not merged"
        );
    }

    Ok(Aggregation {
        budget: Budget::new(categories, spending.by_category),
        row_errors: errors,
        uncategorized_count: spending.uncategorized_count,
        uncategorized_total: spending.uncategorized_total,
        case_mismatches,
    })
}

fn describe(err: &Error) -> String {
    match err {
        Error::Validation { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
