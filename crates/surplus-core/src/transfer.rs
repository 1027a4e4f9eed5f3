//! Surplus transfer decision engine
//!
//! Walks a single decision through
//! Evaluate → VerifyAccounts → VerifyFunds → InitiateTransfer → VerifyCompletion.
//! Every path ends in a [`TransferResult`]; banking failures never escape as
//! `Err`. Error messages name the step and failure kind only, never account
//! identifiers, tokens or response bodies.

use std::time::Duration;

use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::banking::{AccountDetails, BankingBackend, TransferRequest, TransferState};
use crate::error::{Error, Result};
use crate::models::{BudgetStatus, NoTransferReason, TransferResult};
use crate::retry::{CircuitBreaker, RetryPolicy};
use crate::settings::Settings;

/// What the Evaluate step decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Transfer(Decimal),
    Skip(NoTransferReason),
}

/// Evaluate a total variance against the transfer floor
///
/// Uses the same classification as the report's `budget_status`, so a
/// non-surplus never reaches the bank.
pub fn evaluate(total_variance: Decimal, minimum_amount: Decimal) -> Decision {
    match BudgetStatus::classify(total_variance) {
        BudgetStatus::Deficit | BudgetStatus::Balanced => {
            Decision::Skip(NoTransferReason::InvalidAmount)
        }
        BudgetStatus::Surplus if total_variance < minimum_amount => {
            Decision::Skip(NoTransferReason::BelowMinimum)
        }
        BudgetStatus::Surplus => Decision::Transfer(total_variance),
    }
}

/// Stable key for one transfer: same accounts, amount and run give the same key
pub fn idempotency_key(source: &str, destination: &str, amount: Decimal, run_key: &str) -> String {
    let amount = amount.normalize().to_string();
    let mut hasher = Sha256::new();
    for part in [source, destination, amount.as_str(), run_key] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Account and polling parameters for the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPolicy {
    pub minimum_amount: Decimal,
    pub source_account_id: String,
    pub destination_account_id: String,
    pub completion_checks: u32,
    pub completion_interval: Duration,
}

impl TransferPolicy {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let (source, destination) = settings.transfer_accounts()?;
        Ok(Self {
            minimum_amount: settings.transfer.minimum_amount,
            source_account_id: source.to_string(),
            destination_account_id: destination.to_string(),
            completion_checks: settings.transfer.completion_checks,
            completion_interval: settings.transfer.completion_interval,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Role {
    Source,
    Destination,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::Source => "source",
            Role::Destination => "destination",
        }
    }
}

/// Sanitized description of a banking failure
fn describe_failure(step: &str, err: &Error) -> String {
    let detail = match err {
        Error::Authentication => return "Authentication failed".to_string(),
        Error::Api { operation, kind } => {
            format!("banking API {} during {}", kind.as_str(), operation)
        }
        Error::NotFound(_) => "account or transfer not found".to_string(),
        Error::Timeout(operation) => format!("timed out during {}", operation),
        Error::CircuitOpen(operation) => format!(
            "banking unavailable after repeated failures, {} skipped",
            operation
        ),
        Error::Http(_) => "could not reach the banking API".to_string(),
        _ => "unexpected error".to_string(),
    };
    format!("{}: {}", step, detail)
}

/// Runs transfer decisions against a banking backend
pub struct TransferEngine<B: BankingBackend> {
    bank: B,
    policy: TransferPolicy,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl<B: BankingBackend> TransferEngine<B> {
    pub fn new(
        bank: B,
        policy: TransferPolicy,
        retry: RetryPolicy,
        breaker: CircuitBreaker,
    ) -> Self {
        Self {
            bank,
            policy,
            retry,
            breaker,
        }
    }

    pub fn from_settings(bank: B, settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            bank,
            TransferPolicy::from_settings(settings)?,
            settings.retry.clone(),
            settings.circuit.breaker(),
        ))
    }

    pub fn policy(&self) -> &TransferPolicy {
        &self.policy
    }

    /// Decide on and, if warranted, carry out the transfer of `total_variance`
    ///
    /// `run_key` identifies the weekly cycle and feeds the idempotency key.
    pub async fn execute(&self, total_variance: Decimal, run_key: &str) -> TransferResult {
        let amount = match evaluate(total_variance, self.policy.minimum_amount) {
            Decision::Skip(reason) => {
                info!(
                    total_variance = %total_variance,
                    reason = reason.describe(),
                    "No transfer"
                );
                return TransferResult::no_transfer(reason);
            }
            Decision::Transfer(amount) => amount,
        };

        info!(amount = %amount, backend = self.bank.name(), "Surplus qualifies for transfer");

        // VerifyAccounts
        for role in [Role::Source, Role::Destination] {
            match self.lookup(role).await {
                Ok(details) if details.status.is_active() => {}
                Ok(_) => {
                    warn!(account = role.as_str(), "Account is not active");
                    return TransferResult::error(
                        format!(
                            "Account verification failed: {} account is not active",
                            role.as_str()
                        ),
                        None,
                    );
                }
                Err(e) => {
                    warn!(account = role.as_str(), error = %e, "Account verification failed");
                    return TransferResult::error(
                        describe_failure("Account verification failed", &e),
                        None,
                    );
                }
            }
        }
        debug!("Both accounts active");

        // VerifyFunds
        match self.lookup(Role::Source).await {
            Ok(details) if details.balance >= amount => {
                debug!("Source balance covers transfer");
            }
            Ok(_) => {
                warn!(amount = %amount, "Insufficient funds in source account");
                return TransferResult::error("Insufficient funds for transfer", None);
            }
            Err(e) => {
                warn!(error = %e, "Balance check failed");
                return TransferResult::error(describe_failure("Balance check failed", &e), None);
            }
        }

        // InitiateTransfer
        let request = TransferRequest {
            amount,
            source_account_id: self.policy.source_account_id.clone(),
            destination_account_id: self.policy.destination_account_id.clone(),
            idempotency_key: idempotency_key(
                &self.policy.source_account_id,
                &self.policy.destination_account_id,
                amount,
                run_key,
            ),
        };
        let receipt = match self
            .retry
            .run_guarded(&self.breaker, "initiate_transfer", || {
                self.bank.initiate_transfer(&request)
            })
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(error = %e, "Transfer initiation failed");
                return TransferResult::error(
                    describe_failure("Transfer initiation failed", &e),
                    None,
                );
            }
        };
        info!(
            transfer_id = %receipt.transfer_id,
            status = receipt.status.as_str(),
            "Transfer initiated"
        );

        if receipt.status.is_rejected() {
            return TransferResult::error(
                format!("Transfer {} by the bank", receipt.status.as_str()),
                Some(receipt.transfer_id),
            );
        }

        self.verify_completion(amount, receipt.transfer_id).await
    }

    async fn lookup(&self, role: Role) -> Result<AccountDetails> {
        let account_id = match role {
            Role::Source => self.policy.source_account_id.as_str(),
            Role::Destination => self.policy.destination_account_id.as_str(),
        };
        self.retry
            .run_guarded(&self.breaker, "get_account_details", || {
                self.bank.get_account_details(account_id)
            })
            .await
    }

    async fn check_status(&self, transfer_id: &str) -> Result<TransferState> {
        match self.retry.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, self.bank.get_transfer_status(transfer_id))
                .await
                .unwrap_or(Err(Error::Timeout("get_transfer_status"))),
            None => self.bank.get_transfer_status(transfer_id).await,
        }
    }

    /// Poll until the bank confirms, rejects, or checks run out
    async fn verify_completion(&self, amount: Decimal, transfer_id: String) -> TransferResult {
        let checks = self.policy.completion_checks;

        for check in 1..=checks {
            match self.check_status(&transfer_id).await {
                Ok(TransferState::Completed) => {
                    info!(transfer_id = %transfer_id, check, "Transfer completed");
                    return TransferResult::success(amount, transfer_id, true);
                }
                Ok(state) if state.is_rejected() => {
                    warn!(transfer_id = %transfer_id, status = state.as_str(), "Transfer rejected");
                    return TransferResult::error(
                        format!("Transfer {} by the bank", state.as_str()),
                        Some(transfer_id),
                    );
                }
                Ok(state) => {
                    debug!(check, checks, status = state.as_str(), "Transfer not complete yet");
                }
                Err(e) => {
                    debug!(check, checks, error = %e, "Status check failed");
                }
            }

            if check < checks && !self.policy.completion_interval.is_zero() {
                tokio::time::sleep(self.policy.completion_interval).await;
            }
        }

        warn!(
            transfer_id = %transfer_id,
            checks,
            "Could not confirm transfer completion; not retrying to avoid a duplicate"
        );
        TransferResult::success(amount, transfer_id, false)
    }
}
