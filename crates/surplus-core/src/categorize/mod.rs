//! Pluggable transaction categorization
//!
//! # Architecture
//!
//! - `Categorizer` trait: label a batch of transactions with budget categories
//! - `CategorizerClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleCategorizer`, `MockCategorizer`
//!
//! # Configuration
//!
//! `[categorizer] backend` or `CATEGORIZER_BACKEND`: none, openai_compatible, mock.
//! With `none` the weekly run leaves uncategorized rows alone.

mod mock;
mod openai_compatible;
pub mod parsing;

pub use mock::MockCategorizer;
pub use openai_compatible::{render_prompt, OpenAICompatibleCategorizer};
pub use parsing::{canonical_label, parse_categorization};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::Transaction;
use crate::settings::{CategorizerBackendKind, Settings};

#[async_trait]
pub trait Categorizer: Send + Sync {
    /// One label per transaction, in order; None when no category fits
    ///
    /// Labels are always drawn from `categories`.
    async fn categorize(
        &self,
        transactions: &[Transaction],
        categories: &[String],
    ) -> Result<Vec<Option<String>>>;

    /// Backend name (for logging)
    fn name(&self) -> &str;
}

/// Concrete categorizer enum
#[derive(Clone)]
pub enum CategorizerClient {
    OpenAICompatible(OpenAICompatibleCategorizer),
    Mock(MockCategorizer),
}

impl CategorizerClient {
    /// Build the categorizer selected in settings, None when disabled
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>> {
        match settings.categorizer.backend {
            CategorizerBackendKind::None => Ok(None),
            CategorizerBackendKind::OpenAICompatible => {
                OpenAICompatibleCategorizer::from_settings(settings)
                    .map(|c| Some(CategorizerClient::OpenAICompatible(c)))
            }
            CategorizerBackendKind::Mock => {
                Ok(Some(CategorizerClient::Mock(MockCategorizer::new())))
            }
        }
    }

    pub fn mock() -> Self {
        CategorizerClient::Mock(MockCategorizer::new())
    }
}

#[async_trait]
impl Categorizer for CategorizerClient {
    async fn categorize(
        &self,
        transactions: &[Transaction],
        categories: &[String],
    ) -> Result<Vec<Option<String>>> {
        match self {
            CategorizerClient::OpenAICompatible(c) => c.categorize(transactions, categories).await,
            CategorizerClient::Mock(c) => c.categorize(transactions, categories).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            CategorizerClient::OpenAICompatible(c) => c.name(),
            CategorizerClient::Mock(c) => c.name(),
        }
    }
}

/// Counts from a categorization pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategorizeSummary {
    /// Rows that had no category going in
    pub attempted: usize,
    pub categorized: usize,
    pub failed_batches: usize,
}

/// Fill in missing categories, `batch_size` transactions per request
///
/// Rows that already have a category are left untouched. A failed batch is
/// logged and its rows stay uncategorized.
pub async fn categorize_missing<C: Categorizer + ?Sized>(
    categorizer: &C,
    transactions: &mut [Transaction],
    categories: &[String],
    batch_size: usize,
) -> CategorizeSummary {
    let pending: Vec<usize> = transactions
        .iter()
        .enumerate()
        .filter(|(_, t)| t.category_name().is_none())
        .map(|(i, _)| i)
        .collect();

    let mut summary = CategorizeSummary {
        attempted: pending.len(),
        ..Default::default()
    };
    if pending.is_empty() || categories.is_empty() {
        return summary;
    }

    for (batch_number, chunk) in pending.chunks(batch_size.max(1)).enumerate() {
        let batch: Vec<Transaction> = chunk.iter().map(|&i| transactions[i].clone()).collect();
        match categorizer.categorize(&batch, categories).await {
            Ok(labels) => {
                for (&index, label) in chunk.iter().zip(labels) {
                    if let Some(label) = label {
                        transactions[index].category = Some(label);
                        summary.categorized += 1;
                    }
                }
            }
            Err(e) => {
                warn!(
                    backend = categorizer.name(),
                    batch = batch_number + 1,
                    size = chunk.len(),
                    error = %e,
                    "Categorization batch failed, rows left uncategorized"
                );
                summary.failed_batches += 1;
            }
        }
    }

    info!(
        backend = categorizer.name(),
        attempted = summary.attempted,
        categorized = summary.categorized,
        "Categorization finished"
    );
    summary
}
