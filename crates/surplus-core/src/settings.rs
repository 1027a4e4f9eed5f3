//! Run settings
//!
//! ## Configuration Resolution
//!
//! Settings are loaded with a two-layer resolution:
//! 1. An explicit `--config` path, else the override in the data dir
//!    (~/.local/share/surplus/config.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Environment variables are applied last. Tokens and API keys are only ever
//! read from the environment.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::parse_amount;
use crate::retry::{CircuitBreaker, RetryPolicy};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/surplus.toml");

/// Secret value that never shows up in Debug output
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(***)")
    }
}

/// Where weekly transactions are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOrigin {
    Sheet,
    Bank,
}

impl FromStr for TransactionOrigin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sheet" => Ok(Self::Sheet),
            "bank" => Ok(Self::Bank),
            other => Err(Error::Config(format!(
                "unknown transaction_origin '{}' (expected sheet or bank)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankingBackendKind {
    Http,
    Mock,
}

impl FromStr for BankingBackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "mock" => Ok(Self::Mock),
            other => Err(Error::Config(format!(
                "unknown banking backend '{}' (expected http or mock)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategorizerBackendKind {
    /// Leave uncategorized rows as they are
    None,
    OpenAICompatible,
    Mock,
}

impl CategorizerBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::OpenAICompatible => "openai_compatible",
            Self::Mock => "mock",
        }
    }
}

impl FromStr for CategorizerBackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "none" | "" => Ok(Self::None),
            "openai_compatible" | "openai" => Ok(Self::OpenAICompatible),
            "mock" => Ok(Self::Mock),
            other => Err(Error::Config(format!(
                "unknown categorizer backend '{}' (expected none, openai_compatible or mock)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSettings {
    pub budget: String,
    pub transactions: String,
    pub transaction_origin: TransactionOrigin,
}

impl Default for SheetSettings {
    fn default() -> Self {
        Self {
            budget: "budget".into(),
            transactions: "transactions".into(),
            transaction_origin: TransactionOrigin::Sheet,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    /// Surpluses at or above this amount are transferred
    pub minimum_amount: Decimal,
    pub source_account_id: Option<String>,
    pub destination_account_id: Option<String>,
    /// Status polls after initiation before giving up on verification
    pub completion_checks: u32,
    pub completion_interval: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            minimum_amount: Decimal::new(100, 2),
            source_account_id: None,
            destination_account_id: None,
            completion_checks: 5,
            completion_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitSettings {
    pub failure_threshold: u32,
    pub recovery_wait: Duration,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_wait: Duration::from_secs(300),
        }
    }
}

impl CircuitSettings {
    pub fn breaker(&self) -> CircuitBreaker {
        CircuitBreaker::new(self.failure_threshold, self.recovery_wait)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankingSettings {
    pub backend: BankingBackendKind,
    pub base_url: Option<String>,
    pub token: Option<ApiToken>,
    pub request_timeout: Duration,
}

impl Default for BankingSettings {
    fn default() -> Self {
        Self {
            backend: BankingBackendKind::Http,
            base_url: None,
            token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorizerSettings {
    pub backend: CategorizerBackendKind,
    pub host: Option<String>,
    pub model: String,
    pub api_key: Option<ApiToken>,
    /// Transactions sent per model request
    pub batch_size: usize,
    /// Replaces the embedded categorization prompt when set
    pub prompt_path: Option<PathBuf>,
}

impl Default for CategorizerSettings {
    fn default() -> Self {
        Self {
            backend: CategorizerBackendKind::None,
            host: None,
            model: "gpt-4o-mini".into(),
            api_key: None,
            batch_size: 25,
            prompt_path: None,
        }
    }
}

/// Everything a weekly run needs, built once and passed by reference
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub sheets: SheetSettings,
    pub transfer: TransferSettings,
    pub retry: RetryPolicy,
    pub circuit: CircuitSettings,
    pub banking: BankingSettings,
    pub categorizer: CategorizerSettings,
    /// Defaults to `<data_dir>/ledger.json`
    pub ledger_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sheets: SheetSettings::default(),
            transfer: TransferSettings::default(),
            retry: RetryPolicy::default(),
            circuit: CircuitSettings::default(),
            banking: BankingSettings::default(),
            categorizer: CategorizerSettings::default(),
            ledger_path: None,
        }
    }
}

impl Settings {
    /// Load settings from file (or embedded defaults) plus the process environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let content = match resolve_config_path(config_path) {
            Some(path) => {
                debug!(path = %path.display(), "Loading settings override");
                fs::read_to_string(&path)
                    .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?
            }
            None => {
                if let Some(path) = config_path {
                    return Err(Error::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                DEFAULT_CONFIG.to_string()
            }
        };

        let mut settings = parse_settings(&content)?;
        settings.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = get("SURPLUS_MIN_TRANSFER") {
            self.transfer.minimum_amount = parse_minimum(&raw)?;
        }
        if let Some(id) = get("SURPLUS_SOURCE_ACCOUNT") {
            self.transfer.source_account_id = Some(id.trim().to_string());
        }
        if let Some(id) = get("SURPLUS_DESTINATION_ACCOUNT") {
            self.transfer.destination_account_id = Some(id.trim().to_string());
        }
        if let Some(url) = get("SURPLUS_BANK_URL") {
            self.banking.base_url = Some(url.trim().to_string());
        }
        if let Some(token) = get("SURPLUS_BANK_TOKEN") {
            self.banking.token = Some(ApiToken::new(token.trim()));
        }
        if let Some(dir) = get("SURPLUS_DATA_DIR") {
            self.data_dir = PathBuf::from(dir.trim());
        }
        if let Some(backend) = get("CATEGORIZER_BACKEND") {
            self.categorizer.backend = backend.parse()?;
        }
        if let Some(host) = get("OPENAI_COMPATIBLE_HOST") {
            self.categorizer.host = Some(host.trim().to_string());
        }
        if let Some(model) = get("OPENAI_COMPATIBLE_MODEL") {
            self.categorizer.model = model.trim().to_string();
        }
        if let Some(key) = get("OPENAI_COMPATIBLE_API_KEY") {
            self.categorizer.api_key = Some(ApiToken::new(key.trim()));
        }
        Ok(())
    }

    pub fn ledger_file(&self) -> PathBuf {
        self.ledger_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("ledger.json"))
    }

    /// Both transfer accounts, or a configuration error naming what is missing
    pub fn transfer_accounts(&self) -> Result<(&str, &str)> {
        let source = self
            .transfer
            .source_account_id
            .as_deref()
            .ok_or_else(|| Error::Config("transfer source account is not set".into()))?;
        let destination = self
            .transfer
            .destination_account_id
            .as_deref()
            .ok_or_else(|| Error::Config("transfer destination account is not set".into()))?;
        Ok((source, destination))
    }
}

/// Default data directory (~/.local/share/surplus on Linux)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("surplus"))
        .unwrap_or_else(|| PathBuf::from(".surplus"))
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("surplus").join("config.toml"))
}

/// The settings file that `load` would read, if any
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => default_config_path().filter(|p| p.exists()),
    }
}

fn parse_minimum(raw: &str) -> Result<Decimal> {
    let value = parse_amount(raw)
        .map_err(|_| Error::Config(format!("minimum transfer amount '{}' is not a number", raw)))?;
    if value.is_sign_negative() {
        return Err(Error::Config(
            "minimum transfer amount must not be negative".into(),
        ));
    }
    Ok(value)
}

/// Raw settings structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawSettings {
    data_dir: Option<PathBuf>,
    ledger_path: Option<PathBuf>,
    sheets: Option<RawSheets>,
    transfer: Option<RawTransfer>,
    retry: Option<RawRetry>,
    circuit: Option<RawCircuit>,
    banking: Option<RawBanking>,
    categorizer: Option<RawCategorizer>,
}

#[derive(Debug, Deserialize)]
struct RawSheets {
    budget: Option<String>,
    transactions: Option<String>,
    transaction_origin: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTransfer {
    minimum_amount: Option<String>,
    source_account_id: Option<String>,
    destination_account_id: Option<String>,
    completion_checks: Option<u32>,
    completion_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawRetry {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    multiplier: Option<f64>,
    max_delay_ms: Option<u64>,
    attempt_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawCircuit {
    failure_threshold: Option<u32>,
    recovery_wait_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawBanking {
    backend: Option<String>,
    base_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawCategorizer {
    backend: Option<String>,
    host: Option<String>,
    model: Option<String>,
    batch_size: Option<usize>,
    prompt_path: Option<PathBuf>,
}

/// Parse settings from TOML content, without environment overrides
pub fn parse_settings(content: &str) -> Result<Settings> {
    let raw: RawSettings = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid settings TOML: {}", e)))?;

    let mut settings = Settings::default();

    if let Some(dir) = raw.data_dir {
        settings.data_dir = dir;
    }
    settings.ledger_path = raw.ledger_path;

    if let Some(sheets) = raw.sheets {
        if let Some(budget) = sheets.budget {
            settings.sheets.budget = budget;
        }
        if let Some(transactions) = sheets.transactions {
            settings.sheets.transactions = transactions;
        }
        if let Some(origin) = sheets.transaction_origin {
            settings.sheets.transaction_origin = origin.parse()?;
        }
    }

    if let Some(transfer) = raw.transfer {
        if let Some(minimum) = transfer.minimum_amount {
            settings.transfer.minimum_amount = parse_minimum(&minimum)?;
        }
        settings.transfer.source_account_id = transfer.source_account_id;
        settings.transfer.destination_account_id = transfer.destination_account_id;
        if let Some(checks) = transfer.completion_checks {
            settings.transfer.completion_checks = checks;
        }
        if let Some(secs) = transfer.completion_interval_secs {
            settings.transfer.completion_interval = Duration::from_secs(secs);
        }
    }

    if let Some(retry) = raw.retry {
        if let Some(attempts) = retry.max_attempts {
            settings.retry.max_attempts = attempts.max(1);
        }
        if let Some(ms) = retry.base_delay_ms {
            settings.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(multiplier) = retry.multiplier {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(Error::Config("retry multiplier must be at least 1.0".into()));
            }
            settings.retry.multiplier = multiplier;
        }
        if let Some(ms) = retry.max_delay_ms {
            settings.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = retry.attempt_timeout_secs {
            // 0 disables the per-attempt limit
            settings.retry.attempt_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
    }

    if let Some(circuit) = raw.circuit {
        if let Some(threshold) = circuit.failure_threshold {
            settings.circuit.failure_threshold = threshold.max(1);
        }
        if let Some(secs) = circuit.recovery_wait_secs {
            settings.circuit.recovery_wait = Duration::from_secs(secs);
        }
    }

    if let Some(banking) = raw.banking {
        if let Some(backend) = banking.backend {
            settings.banking.backend = backend.parse()?;
        }
        settings.banking.base_url = banking.base_url;
        if let Some(secs) = banking.request_timeout_secs {
            settings.banking.request_timeout = Duration::from_secs(secs);
        }
    }

    if let Some(categorizer) = raw.categorizer {
        if let Some(backend) = categorizer.backend {
            settings.categorizer.backend = backend.parse()?;
        }
        settings.categorizer.host = categorizer.host;
        if let Some(model) = categorizer.model {
            settings.categorizer.model = model;
        }
        if let Some(size) = categorizer.batch_size {
            settings.categorizer.batch_size = size.max(1);
        }
        settings.categorizer.prompt_path = categorizer.prompt_path;
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_embedded_config_matches_defaults() {
        let parsed = parse_settings(DEFAULT_CONFIG).unwrap();
        assert_eq!(parsed, Settings::default());
    }

    #[test]
    fn test_partial_override() {
        let settings = parse_settings(
            r#"
            data_dir = "/tmp/surplus"

            [transfer]
            minimum_amount = "$25.00"
            source_account_id = "checking"

            [retry]
            max_attempts = 5
            attempt_timeout_secs = 0
            "#,
        )
        .unwrap();

        assert_eq!(settings.data_dir, PathBuf::from("/tmp/surplus"));
        assert_eq!(settings.transfer.minimum_amount, Decimal::new(2500, 2));
        assert_eq!(settings.transfer.source_account_id.as_deref(), Some("checking"));
        assert_eq!(settings.transfer.completion_checks, 5);
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.attempt_timeout, None);
        assert_eq!(settings.ledger_file(), PathBuf::from("/tmp/surplus/ledger.json"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(parse_settings("[transfer]\nminimum_amount = \"-5\"").is_err());
        assert!(parse_settings("[banking]\nbackend = \"ftp\"").is_err());
        assert!(parse_settings("[retry]\nmultiplier = 0.5").is_err());
        assert!(parse_settings("not = [valid").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings
            .apply_env_from(env(&[
                ("SURPLUS_MIN_TRANSFER", "10"),
                ("SURPLUS_SOURCE_ACCOUNT", "chk-1"),
                ("SURPLUS_DESTINATION_ACCOUNT", "sav-1"),
                ("SURPLUS_BANK_TOKEN", "secret-token"),
                ("CATEGORIZER_BACKEND", "mock"),
                ("OPENAI_COMPATIBLE_MODEL", ""),
            ]))
            .unwrap();

        assert_eq!(settings.transfer.minimum_amount, Decimal::from(10));
        assert_eq!(settings.transfer_accounts().unwrap(), ("chk-1", "sav-1"));
        assert_eq!(settings.categorizer.backend, CategorizerBackendKind::Mock);
        // Blank values are ignored
        assert_eq!(settings.categorizer.model, "gpt-4o-mini");
        assert_eq!(
            settings.banking.token.as_ref().map(ApiToken::expose),
            Some("secret-token")
        );
    }

    #[test]
    fn test_env_bad_minimum() {
        let mut settings = Settings::default();
        let result = settings.apply_env_from(env(&[("SURPLUS_MIN_TRANSFER", "lots")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_token_redacted_in_debug() {
        let mut settings = Settings::default();
        settings.banking.token = Some(ApiToken::new("super-secret"));
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("ApiToken(***)"));
    }

    #[test]
    fn test_missing_accounts() {
        let settings = Settings::default();
        assert!(matches!(
            settings.transfer_accounts(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Settings::load(Some(&missing)).is_err());
    }
}
