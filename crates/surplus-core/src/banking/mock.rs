//! Mock backend for testing
//!
//! In-memory bank with configurable accounts, injected failures and a
//! scripted sequence of transfer states. Clones share state, so a test can
//! hand one clone to the engine and inspect the other afterwards.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use rust_decimal::Decimal;

use crate::error::{ApiFailure, Error, Result};
use crate::models::TransactionRow;

use super::types::{AccountDetails, AccountStatus, TransferReceipt, TransferRequest, TransferState};
use super::BankingBackend;

/// Failure a mock call should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Authentication,
    Server,
    RateLimited,
    Rejected,
    NotFound,
}

impl MockFailure {
    fn into_error(self, operation: &'static str) -> Error {
        match self {
            MockFailure::Authentication => Error::Authentication,
            MockFailure::Server => Error::Api {
                operation,
                kind: ApiFailure::Server,
            },
            MockFailure::RateLimited => Error::Api {
                operation,
                kind: ApiFailure::RateLimited,
            },
            MockFailure::Rejected => Error::Api {
                operation,
                kind: ApiFailure::Rejected,
            },
            MockFailure::NotFound => Error::NotFound(format!("{} target", operation)),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    accounts: HashMap<String, AccountDetails>,
    transactions: Vec<TransactionRow>,
    /// Queued failures per operation, consumed one per call
    failures: HashMap<&'static str, VecDeque<MockFailure>>,
    /// States returned by successive status checks; the last one repeats
    status_script: VecDeque<TransferState>,
    transfers: Vec<TransferRequest>,
    transfer_ids: HashMap<String, String>,
    calls: Vec<&'static str>,
}

/// Mock banking backend
#[derive(Clone, Default)]
pub struct MockBanking {
    state: Arc<Mutex<MockState>>,
    latency: Option<Duration>,
}

impl MockBanking {
    /// Empty bank: every account lookup is not found
    pub fn new() -> Self {
        Self::default()
    }

    /// Two active accounts and a week of sample transactions
    pub fn demo(source_account_id: &str, destination_account_id: &str) -> Self {
        let today = Local::now().date_naive();
        let sample = [
            ("Whole Foods Market", "84.12", 1, None),
            ("Shell", "41.30", 2, None),
            ("Blue Bottle Coffee", "6.50", 3, None),
            ("Trader Joe's", "52.77", 4, Some("Groceries")),
        ];
        let transactions = sample
            .iter()
            .map(|(location, amount, days_ago, category)| TransactionRow {
                location: location.to_string(),
                amount: amount.to_string(),
                timestamp: (today - ChronoDuration::days(*days_ago))
                    .format("%Y-%m-%d 12:00:00")
                    .to_string(),
                category: category.map(str::to_string),
            })
            .collect();

        Self::new()
            .with_account(source_account_id, Decimal::new(500_000, 2), AccountStatus::Active)
            .with_account(destination_account_id, Decimal::ZERO, AccountStatus::Active)
            .with_transactions(transactions)
    }

    pub fn with_account(self, account_id: &str, balance: Decimal, status: AccountStatus) -> Self {
        self.lock().accounts.insert(
            account_id.to_string(),
            AccountDetails {
                account_id: account_id.to_string(),
                balance,
                status,
            },
        );
        self
    }

    pub fn with_transactions(self, transactions: Vec<TransactionRow>) -> Self {
        self.lock().transactions = transactions;
        self
    }

    /// Make the next `times` calls of `operation` fail
    pub fn fail_next(self, operation: &'static str, failure: MockFailure, times: usize) -> Self {
        {
            let mut state = self.lock();
            let queue = state.failures.entry(operation).or_default();
            queue.extend(std::iter::repeat(failure).take(times));
        }
        self
    }

    /// States reported by successive `get_transfer_status` calls
    pub fn with_status_script(self, states: &[TransferState]) -> Self {
        self.lock().status_script = states.iter().copied().collect();
        self
    }

    /// Delay every call (for timeout tests)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Operations called so far, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.lock().calls.iter().filter(|c| **c == operation).count()
    }

    /// Transfers actually accepted (duplicates by idempotency key excluded)
    pub fn transfers(&self) -> Vec<TransferRequest> {
        self.lock().transfers.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A poisoned lock only happens after a panicking test thread
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn enter(&self, operation: &'static str) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.lock();
        state.calls.push(operation);
        if let Some(failure) = state.failures.get_mut(operation).and_then(|q| q.pop_front()) {
            return Err(failure.into_error(operation));
        }
        Ok(())
    }
}

#[async_trait]
impl BankingBackend for MockBanking {
    async fn get_account_details(&self, account_id: &str) -> Result<AccountDetails> {
        self.enter("get_account_details").await?;
        self.lock()
            .accounts
            .get(account_id)
            .cloned()
            .ok_or_else(|| Error::NotFound("get_account_details target".into()))
    }

    async fn initiate_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt> {
        self.enter("initiate_transfer").await?;
        let mut state = self.lock();

        if let Some(existing) = state.transfer_ids.get(&request.idempotency_key) {
            return Ok(TransferReceipt {
                transfer_id: existing.clone(),
                status: TransferState::Pending,
            });
        }

        let transfer_id = format!("mock-transfer-{}", state.transfers.len() + 1);
        if let Some(source) = state.accounts.get_mut(&request.source_account_id) {
            source.balance = source.balance.saturating_sub(request.amount);
        }
        if let Some(destination) = state.accounts.get_mut(&request.destination_account_id) {
            destination.balance = destination.balance.saturating_add(request.amount);
        }
        state
            .transfer_ids
            .insert(request.idempotency_key.clone(), transfer_id.clone());
        state.transfers.push(request.clone());

        Ok(TransferReceipt {
            transfer_id,
            status: TransferState::Pending,
        })
    }

    async fn get_transfer_status(&self, transfer_id: &str) -> Result<TransferState> {
        self.enter("get_transfer_status").await?;
        let mut state = self.lock();
        if !state.transfer_ids.values().any(|id| id == transfer_id) {
            return Err(Error::NotFound("get_transfer_status target".into()));
        }
        let next = if state.status_script.len() > 1 {
            state.status_script.pop_front()
        } else {
            state.status_script.front().copied()
        };
        Ok(next.unwrap_or(TransferState::Completed))
    }

    async fn list_transactions(
        &self,
        account_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<TransactionRow>> {
        self.enter("list_transactions").await?;
        let state = self.lock();
        if !state.accounts.contains_key(account_id) {
            return Err(Error::NotFound("list_transactions target".into()));
        }
        Ok(state
            .transactions
            .iter()
            .filter(|t| {
                crate::models::parse_timestamp(&t.timestamp)
                    .map(|ts| ts.date() >= since)
                    .unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(key: &str) -> TransferRequest {
        TransferRequest {
            amount: Decimal::new(5000, 2),
            source_account_id: "checking".into(),
            destination_account_id: "savings".into(),
            idempotency_key: key.into(),
        }
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let bank = MockBanking::demo("checking", "savings").fail_next(
            "get_account_details",
            MockFailure::Server,
            1,
        );
        assert!(bank.get_account_details("checking").await.is_err());
        assert!(bank.get_account_details("checking").await.is_ok());
        assert_eq!(bank.call_count("get_account_details"), 2);
    }

    #[tokio::test]
    async fn test_idempotent_transfer() {
        let bank = MockBanking::demo("checking", "savings");
        let first = bank.initiate_transfer(&request("k1")).await.unwrap();
        let second = bank.initiate_transfer(&request("k1")).await.unwrap();

        assert_eq!(first.transfer_id, second.transfer_id);
        assert_eq!(bank.transfers().len(), 1);
        let savings = bank.get_account_details("savings").await.unwrap();
        assert_eq!(savings.balance, Decimal::new(5000, 2));
    }

    #[tokio::test]
    async fn test_status_script_last_state_repeats() {
        let bank = MockBanking::demo("checking", "savings")
            .with_status_script(&[TransferState::Pending, TransferState::Completed]);
        let receipt = bank.initiate_transfer(&request("k1")).await.unwrap();

        let id = receipt.transfer_id.as_str();
        assert_eq!(bank.get_transfer_status(id).await.unwrap(), TransferState::Pending);
        assert_eq!(bank.get_transfer_status(id).await.unwrap(), TransferState::Completed);
        assert_eq!(bank.get_transfer_status(id).await.unwrap(), TransferState::Completed);
        assert!(bank.get_transfer_status("unknown").await.is_err());
    }

    #[tokio::test]
    async fn test_list_transactions_filters_by_date() {
        let bank = MockBanking::demo("checking", "savings");
        let today = Local::now().date_naive();
        let recent = bank
            .list_transactions("checking", today - ChronoDuration::days(2))
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert!(bank.list_transactions("nope", today).await.is_err());
    }

    #[tokio::test]
    async fn test_latency_trips_attempt_timeout() {
        let bank = MockBanking::demo("checking", "savings")
            .with_latency(std::time::Duration::from_millis(200));
        let policy = crate::retry::RetryPolicy {
            attempt_timeout: Some(std::time::Duration::from_millis(20)),
            ..crate::retry::RetryPolicy::immediate(2)
        };

        let result = policy
            .run("get_account_details", || bank.get_account_details("checking"))
            .await;
        assert!(matches!(result, Err(crate::error::Error::Timeout(_))));
        // Both attempts were cut off before reaching the bank
        assert!(bank.calls().is_empty());
    }
}
