//! REST banking backend
//!
//! Speaks a small JSON contract:
//! - `GET  {base}/accounts/{id}` → `{account_id, balance, status}`
//! - `POST {base}/transfers` (`Idempotency-Key` header) → `{transfer_id, status}`
//! - `GET  {base}/transfers/{id}` → `{status}`
//! - `GET  {base}/accounts/{id}/transactions?since=YYYY-MM-DD` → `[{location, amount, timestamp, category}]`
//!
//! Errors are mapped to [`Error`] variants that carry only the operation
//! name and a failure kind. Response bodies and request URLs are dropped,
//! since both can contain account numbers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ApiFailure, Error, Result};
use crate::models::TransactionRow;
use crate::settings::{ApiToken, Settings};

use super::types::{
    AccountDetails, BankTransaction, TransferReceipt, TransferRequest, TransferState,
    TransferStatusResponse,
};
use super::BankingBackend;

/// Banking backend over HTTP
#[derive(Clone)]
pub struct HttpBanking {
    http_client: Client,
    base_url: Url,
    token: Option<ApiToken>,
}

impl HttpBanking {
    /// Create a new HTTP banking backend
    pub fn new(base_url: &str, token: Option<ApiToken>, request_timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| Error::Config(format!("invalid banking base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config("banking base URL cannot be a base".into()));
        }

        let http_client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            token,
        })
    }

    /// Create from settings
    ///
    /// Required: `[banking] base_url` or `SURPLUS_BANK_URL`
    /// Optional: `SURPLUS_BANK_TOKEN`
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .banking
            .base_url
            .as_deref()
            .ok_or_else(|| Error::Config("banking base_url is not set".into()))?;
        Self::new(
            base_url,
            settings.banking.token.clone(),
            settings.banking.request_timeout,
        )
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config("banking base URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token {
            Some(ref token) => builder.bearer_auth(token.expose()),
            None => builder,
        }
    }

    async fn send(&self, operation: &'static str, builder: RequestBuilder) -> Result<Response> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;

        let status = response.status();
        debug!(operation, status = status.as_u16(), "Banking API response");
        check_status(operation, status)?;
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, operation: &'static str, url: Url) -> Result<T> {
        let response = self.send(operation, self.http_client.get(url)).await?;
        decode(operation, response).await
    }
}

/// Map an HTTP status to the error taxonomy
fn check_status(operation: &'static str, status: StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Authentication,
        StatusCode::NOT_FOUND => Error::NotFound(format!("{} target", operation)),
        StatusCode::TOO_MANY_REQUESTS => Error::Api {
            operation,
            kind: ApiFailure::RateLimited,
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Error::Timeout(operation),
        s if s.is_server_error() => Error::Api {
            operation,
            kind: ApiFailure::Server,
        },
        _ => Error::Api {
            operation,
            kind: ApiFailure::Rejected,
        },
    })
}

fn transport_error(operation: &'static str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(operation)
    } else {
        Error::Http(err.without_url())
    }
}

async fn decode<T: DeserializeOwned>(operation: &'static str, response: Response) -> Result<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(operation, e))?;
    serde_json::from_slice(&bytes).map_err(|_| Error::Api {
        operation,
        kind: ApiFailure::MalformedResponse,
    })
}

#[async_trait]
impl BankingBackend for HttpBanking {
    async fn get_account_details(&self, account_id: &str) -> Result<AccountDetails> {
        let url = self.endpoint(&["accounts", account_id])?;
        self.get_json("get_account_details", url).await
    }

    async fn initiate_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt> {
        let operation = "initiate_transfer";
        let url = self.endpoint(&["transfers"])?;
        let builder = self
            .http_client
            .post(url)
            .header("Idempotency-Key", &request.idempotency_key)
            .json(request);
        let response = self.send(operation, builder).await?;
        decode(operation, response).await
    }

    async fn get_transfer_status(&self, transfer_id: &str) -> Result<TransferState> {
        let url = self.endpoint(&["transfers", transfer_id])?;
        let response: TransferStatusResponse = self.get_json("get_transfer_status", url).await?;
        Ok(response.status)
    }

    async fn list_transactions(
        &self,
        account_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<TransactionRow>> {
        let operation = "list_transactions";
        let url = self.endpoint(&["accounts", account_id, "transactions"])?;
        let builder = self
            .http_client
            .get(url)
            .query(&[("since", since.format("%Y-%m-%d").to_string())]);
        let response = self.send(operation, builder).await?;
        let transactions: Vec<BankTransaction> = decode(operation, response).await?;

        Ok(transactions
            .into_iter()
            .map(|t| TransactionRow {
                location: t.location,
                amount: t.amount.to_string(),
                timestamp: t.timestamp,
                category: t.category,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpBanking {
        HttpBanking::new(base, None, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let b = backend("https://bank.example.com/api/v1/");
        let url = b.endpoint(&["accounts", "acc 1/2"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://bank.example.com/api/v1/accounts/acc%201%2F2"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpBanking::new("not a url", None, Duration::from_secs(5)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_status_mapping() {
        assert!(check_status("op", StatusCode::OK).is_ok());
        assert!(matches!(
            check_status("op", StatusCode::UNAUTHORIZED),
            Err(Error::Authentication)
        ));
        assert!(matches!(
            check_status("op", StatusCode::NOT_FOUND),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            check_status("op", StatusCode::TOO_MANY_REQUESTS),
            Err(Error::Api {
                kind: ApiFailure::RateLimited,
                ..
            })
        ));
        assert!(matches!(
            check_status("op", StatusCode::BAD_GATEWAY),
            Err(Error::Api {
                kind: ApiFailure::Server,
                ..
            })
        ));
        assert!(matches!(
            check_status("op", StatusCode::UNPROCESSABLE_ENTITY),
            Err(Error::Api {
                kind: ApiFailure::Rejected,
                ..
            })
        ));
    }
}
