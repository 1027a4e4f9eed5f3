//! Pluggable banking backend abstraction
//!
//! # Architecture
//!
//! - `BankingBackend` trait: the capability the transfer engine and the
//!   weekly run need from a bank
//! - `BankingClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `HttpBanking` (REST API), `MockBanking`
//!
//! # Configuration
//!
//! Selected by `[banking] backend` in the settings file (`http` or `mock`).
//! The HTTP backend reads its base URL from settings or `SURPLUS_BANK_URL`
//! and its bearer token only from `SURPLUS_BANK_TOKEN`.

mod http;
mod mock;
pub mod types;

pub use http::HttpBanking;
pub use mock::{MockBanking, MockFailure};
pub use types::*;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::models::TransactionRow;
use crate::settings::{BankingBackendKind, Settings};

/// Trait defining what the pipeline needs from a bank
///
/// Implementations must never put response bodies, URLs or account numbers
/// into the errors they return.
#[async_trait]
pub trait BankingBackend: Send + Sync {
    /// Look up balance and status of an account
    async fn get_account_details(&self, account_id: &str) -> Result<AccountDetails>;

    /// Start a transfer between two accounts
    async fn initiate_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt>;

    /// Check the processing state of a transfer
    async fn get_transfer_status(&self, transfer_id: &str) -> Result<TransferState>;

    /// Transactions posted to an account on or after `since`
    async fn list_transactions(
        &self,
        account_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<TransactionRow>>;

    /// Backend name (for logging)
    fn name(&self) -> &str;
}

/// Concrete banking client enum
#[derive(Clone)]
pub enum BankingClient {
    /// Generic REST banking API
    Http(HttpBanking),
    /// In-memory bank for tests and dry runs
    Mock(MockBanking),
}

impl BankingClient {
    /// Build the client selected in settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        match settings.banking.backend {
            BankingBackendKind::Http => {
                HttpBanking::from_settings(settings).map(BankingClient::Http)
            }
            BankingBackendKind::Mock => {
                let source = settings.transfer.source_account_id.as_deref();
                let destination = settings.transfer.destination_account_id.as_deref();
                match (source, destination) {
                    (Some(s), Some(d)) => Ok(BankingClient::Mock(MockBanking::demo(s, d))),
                    _ => Err(Error::Config(
                        "mock banking needs source and destination account ids".into(),
                    )),
                }
            }
        }
    }

    pub fn mock(mock: MockBanking) -> Self {
        BankingClient::Mock(mock)
    }
}

#[async_trait]
impl BankingBackend for BankingClient {
    async fn get_account_details(&self, account_id: &str) -> Result<AccountDetails> {
        match self {
            BankingClient::Http(b) => b.get_account_details(account_id).await,
            BankingClient::Mock(b) => b.get_account_details(account_id).await,
        }
    }

    async fn initiate_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt> {
        match self {
            BankingClient::Http(b) => b.initiate_transfer(request).await,
            BankingClient::Mock(b) => b.initiate_transfer(request).await,
        }
    }

    async fn get_transfer_status(&self, transfer_id: &str) -> Result<TransferState> {
        match self {
            BankingClient::Http(b) => b.get_transfer_status(transfer_id).await,
            BankingClient::Mock(b) => b.get_transfer_status(transfer_id).await,
        }
    }

    async fn list_transactions(
        &self,
        account_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<TransactionRow>> {
        match self {
            BankingClient::Http(b) => b.list_transactions(account_id, since).await,
            BankingClient::Mock(b) => b.list_transactions(account_id, since).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            BankingClient::Http(b) => b.name(),
            BankingClient::Mock(b) => b.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_backend_requires_accounts() {
        let mut settings = Settings::default();
        settings.banking.backend = BankingBackendKind::Mock;
        settings.transfer.source_account_id = None;
        assert!(matches!(
            BankingClient::from_settings(&settings),
            Err(Error::Config(_))
        ));

        settings.transfer.source_account_id = Some("checking".into());
        settings.transfer.destination_account_id = Some("savings".into());
        let client = BankingClient::from_settings(&settings).unwrap();
        assert_eq!(client.name(), "mock");
    }

    #[tokio::test]
    async fn test_client_delegates_to_mock() {
        let client = BankingClient::mock(MockBanking::demo("checking", "savings"));
        let details = client.get_account_details("checking").await.unwrap();
        assert!(details.status.is_active());
    }
}
