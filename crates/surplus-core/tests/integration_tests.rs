//! Integration tests for surplus-core
//!
//! These tests exercise the HTTP banking backend against the mock bank server
//! and the full sheets → analysis → transfer workflow.

use std::fs;
use std::time::Duration;

use axum::http::StatusCode;
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use surplus_core::{
    banking::{BankTransaction, BankingBackend},
    settings::{BankingBackendKind, TransactionOrigin},
    test_utils::{MockBankServer, ROUTE_ACCOUNT, ROUTE_TRANSFER, ROUTE_TRANSFER_STATUS},
    AccountStatus, BankingClient, BudgetStatus, CircuitBreaker, HttpBanking, NoTransferReason,
    RetryPolicy, RunOptions, Settings, TransferEngine, TransferPolicy, TransferState,
    TransferStatus, WeekWindow, WeeklyRun,
};

fn http_bank(server: &MockBankServer) -> HttpBanking {
    HttpBanking::new(&server.url(), None, Duration::from_secs(5)).unwrap()
}

fn engine(bank: HttpBanking) -> TransferEngine<HttpBanking> {
    TransferEngine::new(
        bank,
        TransferPolicy {
            minimum_amount: dec!(1.00),
            source_account_id: "checking".into(),
            destination_account_id: "savings".into(),
            completion_checks: 3,
            completion_interval: Duration::ZERO,
        },
        RetryPolicy::immediate(3),
        CircuitBreaker::new(5, Duration::from_secs(300)),
    )
}

// =============================================================================
// HTTP Banking Backend
// =============================================================================

#[tokio::test]
async fn test_http_account_lookup() {
    let server = MockBankServer::start().await;
    let bank = http_bank(&server);

    let details = bank.get_account_details("checking").await.unwrap();
    assert_eq!(details.balance, dec!(5000.00));
    assert!(details.status.is_active());

    let missing = bank.get_account_details("nope").await;
    assert!(matches!(missing, Err(surplus_core::Error::NotFound(_))));
}

#[tokio::test]
async fn test_http_transfer_verified() {
    let server = MockBankServer::start().await;

    let result = engine(http_bank(&server))
        .execute(dec!(80.00), "2026-W42")
        .await;

    assert_eq!(result.status, TransferStatus::Success);
    assert_eq!(result.transfer_amount, dec!(80.00));
    assert_eq!(result.transfer_id.as_deref(), Some("tx-1"));
    assert!(result.verified);
    assert_eq!(server.request_count(ROUTE_ACCOUNT), 3);
    assert_eq!(server.request_count(ROUTE_TRANSFER_STATUS), 1);
}

#[tokio::test]
async fn test_http_transfer_retry_reuses_idempotency_key() {
    let server = MockBankServer::start().await;
    server.fail_next(ROUTE_TRANSFER, StatusCode::SERVICE_UNAVAILABLE, 1);

    let engine = engine(http_bank(&server));
    let first = engine.execute(dec!(80.00), "2026-W42").await;
    assert_eq!(first.status, TransferStatus::Success);
    assert_eq!(server.request_count(ROUTE_TRANSFER), 2);

    // A second execution for the same week and amount hits the same key
    let second = engine.execute(dec!(80.00), "2026-W42").await;
    assert_eq!(second.transfer_id, first.transfer_id);

    let transfers = server.transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].idempotency_key.len(), 64);
}

#[tokio::test]
async fn test_http_authentication_failure() {
    let server = MockBankServer::start().await;
    server.require_token("secret");

    let result = engine(http_bank(&server))
        .execute(dec!(80.00), "2026-W42")
        .await;

    assert_eq!(result.status, TransferStatus::Error);
    assert_eq!(result.error_message.as_deref(), Some("Authentication failed"));
    // Retried up to the ceiling, then given up on before any transfer
    assert_eq!(server.request_count(ROUTE_ACCOUNT), 3);
    assert!(server.transfers().is_empty());
}

#[tokio::test]
async fn test_http_bearer_token_sent() {
    let server = MockBankServer::start().await;
    server.require_token("secret");
    let bank = HttpBanking::new(
        &server.url(),
        Some(surplus_core::settings::ApiToken::new("secret")),
        Duration::from_secs(5),
    )
    .unwrap();

    assert!(bank.get_account_details("savings").await.is_ok());
}

#[tokio::test]
async fn test_http_inactive_destination() {
    let server = MockBankServer::start().await;
    server.set_account("savings", dec!(0), AccountStatus::Frozen);

    let result = engine(http_bank(&server))
        .execute(dec!(80.00), "2026-W42")
        .await;

    assert_eq!(result.status, TransferStatus::Error);
    assert!(result
        .error_message
        .unwrap()
        .contains("destination account is not active"));
    assert!(server.transfers().is_empty());
}

#[tokio::test]
async fn test_http_bank_cancels_transfer() {
    let server = MockBankServer::start().await;
    server.settle_as(TransferState::Cancelled);

    let result = engine(http_bank(&server))
        .execute(dec!(80.00), "2026-W42")
        .await;

    assert_eq!(result.status, TransferStatus::Error);
    assert_eq!(result.transfer_id.as_deref(), Some("tx-1"));
    assert_eq!(result.transfer_amount, dec!(0));
}

#[tokio::test]
async fn test_http_list_transactions_since() {
    let server = MockBankServer::start().await;
    server.add_transaction(BankTransaction {
        location: "Safeway".into(),
        amount: dec!(42.10),
        timestamp: "2026-10-13 09:30:00".into(),
        category: Some("Groceries".into()),
    });
    server.add_transaction(BankTransaction {
        location: "Old Shop".into(),
        amount: dec!(10.00),
        timestamp: "2026-10-01 09:30:00".into(),
        category: None,
    });

    let rows = http_bank(&server)
        .list_transactions("checking", NaiveDate::from_ymd_opt(2026, 10, 12).unwrap())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].location, "Safeway");
    assert_eq!(rows[0].amount, "42.10");
}

// =============================================================================
// Weekly Run
// =============================================================================

fn settings_for(dir: &std::path::Path, server: &MockBankServer) -> Settings {
    let mut settings = Settings::default();
    settings.data_dir = dir.to_path_buf();
    settings.banking.backend = BankingBackendKind::Http;
    settings.banking.base_url = Some(server.url());
    settings.transfer.source_account_id = Some("checking".into());
    settings.transfer.destination_account_id = Some("savings".into());
    settings.transfer.completion_interval = Duration::ZERO;
    settings.retry = RetryPolicy::immediate(3);
    settings
}

#[tokio::test]
async fn test_weekly_run_over_http_bank() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("budget.csv"),
        "Category,Weekly Amount\nGroceries,150.00\nDining Out,60.00\nTransport,40.00\n",
    )
    .unwrap();

    let server = MockBankServer::start().await;
    for (location, amount, timestamp, category) in [
        ("Safeway", dec!(95.20), "2026-10-12 17:45:00", Some("Groceries")),
        ("Bistro", dec!(48.00), "2026-10-14 20:10:00", Some("Dining Out")),
        ("Shell", dec!(35.00), "2026-10-16 08:00:00", Some("Transport")),
        ("Refund", dec!(-10.00), "2026-10-17 11:00:00", Some("Groceries")),
    ] {
        server.add_transaction(BankTransaction {
            location: location.into(),
            amount,
            timestamp: timestamp.into(),
            category: category.map(str::to_string),
        });
    }

    let mut settings = settings_for(dir.path(), &server);
    settings.sheets.transaction_origin = TransactionOrigin::Bank;
    let window = WeekWindow::containing(NaiveDate::from_ymd_opt(2026, 10, 14).unwrap());

    let run = WeeklyRun::from_settings(&settings).unwrap();
    let report = run.execute(window, RunOptions::default()).await;

    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.week, "2026-W42");
    assert_eq!(report.transaction_count, 4);

    let analysis = report.analysis.as_ref().unwrap();
    assert_eq!(analysis.analysis.total_budget, dec!(250.00));
    assert_eq!(analysis.analysis.total_spent, dec!(168.20));
    assert_eq!(analysis.analysis.total_variance, dec!(81.80));
    assert_eq!(analysis.budget_status, BudgetStatus::Surplus);
    assert_eq!(
        analysis.analysis.category_variances.get("Groceries"),
        Some(&dec!(64.80))
    );

    let transfer = report.transfer.as_ref().unwrap();
    assert_eq!(transfer.status, TransferStatus::Success);
    assert_eq!(transfer.transfer_amount, dec!(81.80));
    assert!(transfer.verified);
    assert!(settings.ledger_file().exists());

    // The same week again is blocked by the run ledger, not by the bank
    let rerun = run.execute(window, RunOptions::default()).await;
    assert_eq!(
        rerun.transfer.unwrap().reason,
        Some(NoTransferReason::AlreadyTransferred)
    );
    assert_eq!(server.transfers().len(), 1);
}

#[tokio::test]
async fn test_weekly_run_deficit_never_contacts_bank() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("budget.csv"), "Groceries,50.00\n").unwrap();
    fs::write(
        dir.path().join("transactions.csv"),
        "Safeway,90.00,2026-10-13 10:00:00,Groceries\n",
    )
    .unwrap();

    let server = MockBankServer::start().await;
    let settings = settings_for(dir.path(), &server);
    let window = WeekWindow::containing(NaiveDate::from_ymd_opt(2026, 10, 14).unwrap());

    let report = WeeklyRun::from_settings(&settings)
        .unwrap()
        .execute(window, RunOptions::default())
        .await;

    let analysis = report.analysis.as_ref().unwrap();
    assert_eq!(analysis.analysis.total_variance, dec!(-40.00));
    assert_eq!(analysis.budget_status, BudgetStatus::Deficit);
    assert_eq!(
        report.transfer.unwrap().reason,
        Some(NoTransferReason::InvalidAmount)
    );
    assert!(server.requests().is_empty());
    assert!(report
        .insights
        .iter()
        .any(|f| f.kind == surplus_core::InsightKind::WeeklyDeficit));
}

#[tokio::test]
async fn test_banking_client_from_settings() {
    let server = MockBankServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_for(dir.path(), &server);

    let client = BankingClient::from_settings(&settings).unwrap();
    assert_eq!(client.name(), "http");
    assert!(client.get_account_details("checking").await.is_ok());
}
