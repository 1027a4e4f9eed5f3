//! Banking capability types
//!
//! These mirror the JSON contract of the banking REST API and are shared by
//! every backend.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a bank account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Inactive,
    Frozen,
    Closed,
    #[serde(other)]
    Unknown,
}

impl AccountStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, AccountStatus::Active)
    }
}

/// Result of an account lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDetails {
    pub account_id: String,
    pub balance: Decimal,
    pub status: AccountStatus,
}

/// Money movement between two accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub amount: Decimal,
    pub source_account_id: String,
    pub destination_account_id: String,
    /// Same key, same transfer; the bank must not move money twice
    #[serde(skip)]
    pub idempotency_key: String,
}

/// Processing state of a transfer as reported by the bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Pending => "pending",
            TransferState::Processing => "processing",
            TransferState::Completed => "completed",
            TransferState::Failed => "failed",
            TransferState::Cancelled => "cancelled",
            TransferState::Unknown => "unknown",
        }
    }

    /// The bank explicitly refused or reversed the transfer
    pub fn is_rejected(&self) -> bool {
        matches!(self, TransferState::Failed | TransferState::Cancelled)
    }
}

/// Response to a transfer initiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transfer_id: String,
    pub status: TransferState,
}

/// Response to a transfer status check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStatusResponse {
    pub status: TransferState,
}

/// Transaction as returned by the bank's transaction listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankTransaction {
    pub location: String,
    pub amount: Decimal,
    pub timestamp: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_status_tolerated() {
        let details: AccountDetails = serde_json::from_str(
            r#"{"account_id": "acc-1", "balance": "10.50", "status": "dormant"}"#,
        )
        .unwrap();
        assert_eq!(details.status, AccountStatus::Unknown);
        assert!(!details.status.is_active());
    }

    #[test]
    fn test_numeric_balance_accepted() {
        let details: AccountDetails =
            serde_json::from_str(r#"{"account_id": "acc-1", "balance": 250, "status": "active"}"#)
                .unwrap();
        assert_eq!(details.balance, Decimal::from(250));
        assert!(details.status.is_active());
    }

    #[test]
    fn test_transfer_state_rejected() {
        assert!(TransferState::Failed.is_rejected());
        assert!(TransferState::Cancelled.is_rejected());
        assert!(!TransferState::Pending.is_rejected());
    }
}
