//! Test utilities for surplus-core
//!
//! This module provides a mock banking server speaking the same REST contract
//! as [`HttpBanking`](crate::banking::HttpBanking), for development and
//! integration tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::oneshot;

use crate::banking::{
    AccountDetails, AccountStatus, BankTransaction, TransferReceipt, TransferRequest,
    TransferState, TransferStatusResponse,
};

/// Route names accepted by [`MockBankServer::fail_next`]
pub const ROUTE_ACCOUNT: &str = "account";
pub const ROUTE_TRANSACTIONS: &str = "transactions";
pub const ROUTE_TRANSFER: &str = "transfer";
pub const ROUTE_TRANSFER_STATUS: &str = "transfer_status";

#[derive(Default)]
struct BankState {
    accounts: HashMap<String, AccountDetails>,
    transactions: Vec<BankTransaction>,
    /// (transfer id, request) in creation order
    transfers: Vec<(String, TransferRequest)>,
    by_key: HashMap<String, String>,
    settle_as: Option<TransferState>,
    token: Option<String>,
    failures: HashMap<String, (StatusCode, usize)>,
    requests: Vec<String>,
}

type Shared = Arc<Mutex<BankState>>;

fn lock(state: &Shared) -> MutexGuard<'_, BankState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock banking server for testing and development
pub struct MockBankServer {
    addr: SocketAddr,
    state: Shared,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockBankServer {
    /// Start the mock server on an available port
    ///
    /// Seeded with an active `checking` account holding 5000.00 and an empty
    /// active `savings` account.
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(BankState::default()));

        let app = Router::new()
            .route("/accounts/:id", get(handle_account))
            .route("/accounts/:id/transactions", get(handle_transactions))
            .route("/transfers", post(handle_initiate))
            .route("/transfers/:id", get(handle_status))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        let server = Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        };
        server.set_account("checking", Decimal::new(500_000, 2), AccountStatus::Active);
        server.set_account("savings", Decimal::ZERO, AccountStatus::Active);
        server
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_account(&self, account_id: &str, balance: Decimal, status: AccountStatus) {
        lock(&self.state).accounts.insert(
            account_id.to_string(),
            AccountDetails {
                account_id: account_id.to_string(),
                balance,
                status,
            },
        );
    }

    pub fn add_transaction(&self, transaction: BankTransaction) {
        lock(&self.state).transactions.push(transaction);
    }

    /// Status reported by every status check (default: completed)
    pub fn settle_as(&self, state: TransferState) {
        lock(&self.state).settle_as = Some(state);
    }

    /// Reject requests without `Authorization: Bearer <token>`
    pub fn require_token(&self, token: &str) {
        lock(&self.state).token = Some(token.to_string());
    }

    /// Answer the next `times` requests to `route` with `status`
    pub fn fail_next(&self, route: &str, status: StatusCode, times: usize) {
        lock(&self.state)
            .failures
            .insert(route.to_string(), (status, times));
    }

    /// Route names of every request received, in order
    pub fn requests(&self) -> Vec<String> {
        lock(&self.state).requests.clone()
    }

    pub fn request_count(&self, route: &str) -> usize {
        lock(&self.state)
            .requests
            .iter()
            .filter(|r| r.as_str() == route)
            .count()
    }

    /// Transfers actually created (deduplicated by idempotency key)
    pub fn transfers(&self) -> Vec<TransferRequest> {
        lock(&self.state)
            .transfers
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockBankServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Record the request, then apply auth and injected failures
fn admit(state: &mut BankState, route: &str, headers: &HeaderMap) -> Option<Response> {
    state.requests.push(route.to_string());

    if let Some(ref token) = state.token {
        let expected = format!("Bearer {}", token);
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == expected)
            .unwrap_or(false);
        if !authorized {
            return Some(StatusCode::UNAUTHORIZED.into_response());
        }
    }

    if let Some((status, remaining)) = state.failures.get_mut(route) {
        if *remaining > 0 {
            *remaining -= 1;
            return Some((*status, "injected failure").into_response());
        }
    }
    None
}

async fn handle_account(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut state = lock(&state);
    if let Some(rejection) = admit(&mut state, ROUTE_ACCOUNT, &headers) {
        return rejection;
    }
    match state.accounts.get(&id) {
        Some(details) => Json(details.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Deserialize)]
struct SinceQuery {
    since: Option<String>,
}

async fn handle_transactions(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Query(query): Query<SinceQuery>,
    headers: HeaderMap,
) -> Response {
    let mut state = lock(&state);
    if let Some(rejection) = admit(&mut state, ROUTE_TRANSACTIONS, &headers) {
        return rejection;
    }
    if !state.accounts.contains_key(&id) {
        return StatusCode::NOT_FOUND.into_response();
    }

    // Timestamps start with YYYY-MM-DD, so a string comparison on the date
    // prefix is enough here
    let since = query.since.unwrap_or_default();
    let listed: Vec<BankTransaction> = state
        .transactions
        .iter()
        .filter(|t| t.timestamp.get(..10).unwrap_or("") >= since.as_str())
        .cloned()
        .collect();
    Json(listed).into_response()
}

async fn handle_initiate(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(mut request): Json<TransferRequest>,
) -> Response {
    let mut state = lock(&state);
    if let Some(rejection) = admit(&mut state, ROUTE_TRANSFER, &headers) {
        return rejection;
    }

    let key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if key.is_empty() {
        return (StatusCode::BAD_REQUEST, "missing Idempotency-Key").into_response();
    }
    if let Some(existing) = state.by_key.get(&key) {
        return Json(TransferReceipt {
            transfer_id: existing.clone(),
            status: TransferState::Pending,
        })
        .into_response();
    }

    if !state.accounts.contains_key(&request.source_account_id)
        || !state.accounts.contains_key(&request.destination_account_id)
    {
        return StatusCode::NOT_FOUND.into_response();
    }
    if request.amount <= Decimal::ZERO {
        return (StatusCode::UNPROCESSABLE_ENTITY, "amount must be positive").into_response();
    }

    let transfer_id = format!("tx-{}", state.transfers.len() + 1);
    if let Some(source) = state.accounts.get_mut(&request.source_account_id) {
        source.balance -= request.amount;
    }
    if let Some(destination) = state.accounts.get_mut(&request.destination_account_id) {
        destination.balance += request.amount;
    }
    request.idempotency_key = key.clone();
    state.by_key.insert(key, transfer_id.clone());
    state.transfers.push((transfer_id.clone(), request));

    Json(TransferReceipt {
        transfer_id,
        status: TransferState::Pending,
    })
    .into_response()
}

async fn handle_status(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut state = lock(&state);
    if let Some(rejection) = admit(&mut state, ROUTE_TRANSFER_STATUS, &headers) {
        return rejection;
    }
    if !state.transfers.iter().any(|(transfer_id, _)| *transfer_id == id) {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(TransferStatusResponse {
        status: state.settle_as.unwrap_or(TransferState::Completed),
    })
    .into_response()
}
