//! Mock categorizer for testing
//!
//! Keyword rules over the merchant name, no model involved.

use async_trait::async_trait;

use crate::error::{ApiFailure, Error, Result};
use crate::models::Transaction;

use super::parsing::canonical_label;
use super::Categorizer;

/// Keyword-rule categorizer
#[derive(Clone)]
pub struct MockCategorizer {
    /// (merchant keyword, category), checked in order
    rules: Vec<(String, String)>,
    fail: bool,
}

impl Default for MockCategorizer {
    fn default() -> Self {
        let rules = [
            ("WHOLE FOODS", "Groceries"),
            ("TRADER JOE", "Groceries"),
            ("SAFEWAY", "Groceries"),
            ("COFFEE", "Dining Out"),
            ("STARBUCKS", "Dining Out"),
            ("RESTAURANT", "Dining Out"),
            ("SHELL", "Transport"),
            ("CHEVRON", "Transport"),
            ("UBER", "Transport"),
            ("NETFLIX", "Subscriptions"),
            ("SPOTIFY", "Subscriptions"),
        ];
        Self {
            rules: rules
                .iter()
                .map(|(k, c)| (k.to_string(), c.to_string()))
                .collect(),
            fail: false,
        }
    }
}

impl MockCategorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the built-in rules
    pub fn with_rules(rules: &[(&str, &str)]) -> Self {
        Self {
            rules: rules
                .iter()
                .map(|(k, c)| (k.to_uppercase(), c.to_string()))
                .collect(),
            fail: false,
        }
    }

    /// Every call fails like an unreachable server
    pub fn failing() -> Self {
        Self {
            rules: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl Categorizer for MockCategorizer {
    async fn categorize(
        &self,
        transactions: &[Transaction],
        categories: &[String],
    ) -> Result<Vec<Option<String>>> {
        if self.fail {
            return Err(Error::Api {
                operation: "categorize",
                kind: ApiFailure::Server,
            });
        }

        Ok(transactions
            .iter()
            .map(|t| {
                let merchant = t.location.to_uppercase();
                self.rules
                    .iter()
                    .find(|(keyword, _)| merchant.contains(keyword.as_str()))
                    .and_then(|(_, category)| canonical_label(category, categories))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn tx(location: &str) -> Transaction {
        let ts = NaiveDate::from_ymd_opt(2026, 10, 12)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        Transaction::new(location, dec!(10.00), ts, None)
    }

    #[tokio::test]
    async fn test_rules_respect_allowed_categories() {
        let categorizer = MockCategorizer::new();
        let allowed = vec!["groceries".to_string(), "Transport".to_string()];
        let batch = [tx("Whole Foods Market"), tx("Blue Bottle Coffee"), tx("SHELL 123")];
        let result = categorizer.categorize(&batch, &allowed).await.unwrap();
        assert_eq!(
            result,
            vec![Some("groceries".to_string()), None, Some("Transport".to_string())]
        );
    }

    #[tokio::test]
    async fn test_failing() {
        let result = MockCategorizer::failing()
            .categorize(&[tx("Shell")], &["Transport".to_string()])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_custom_rules() {
        let categorizer = MockCategorizer::with_rules(&[("bistro", "Dining Out")]);
        let allowed = vec!["Dining Out".to_string(), "Groceries".to_string()];
        let result = categorizer
            .categorize(&[tx("Corner Bistro"), tx("Whole Foods")], &allowed)
            .await
            .unwrap();
        assert_eq!(result, vec![Some("Dining Out".to_string()), None]);
    }
}
