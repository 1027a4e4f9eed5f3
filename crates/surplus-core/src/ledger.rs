//! Run ledger
//!
//! Remembers which weeks already initiated a savings transfer, so a repeated
//! or overlapping run for the same week never moves money twice. Stored as a
//! JSON file keyed by ISO week (`2026-W42`); every save replaces the file
//! atomically.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{TransferResult, TransferStatus};

/// One week's recorded transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub transfer_id: String,
    pub status: TransferStatus,
    pub amount: Decimal,
    pub verified: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    weeks: BTreeMap<String, LedgerEntry>,
}

/// Transfers recorded per week
#[derive(Debug)]
pub struct RunLedger {
    path: PathBuf,
    weeks: BTreeMap<String, LedgerEntry>,
}

impl RunLedger {
    /// Open the ledger at `path`; a missing file is an empty ledger
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let weeks = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                let file: LedgerFile = serde_json::from_str(&content).map_err(|e| {
                    Error::Config(format!("run ledger {} is corrupt: {}", path.display(), e))
                })?;
                file.weeks
            }
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), weeks = weeks.len(), "Opened run ledger");
        Ok(Self { path, weeks })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry(&self, week: &str) -> Option<&LedgerEntry> {
        self.weeks.get(week)
    }

    /// Whether a transfer was already initiated for `week`
    pub fn has_transfer(&self, week: &str) -> bool {
        self.weeks.contains_key(week)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &LedgerEntry)> {
        self.weeks.iter()
    }

    pub fn len(&self) -> usize {
        self.weeks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weeks.is_empty()
    }

    /// Record a transfer outcome and save
    ///
    /// Only outcomes with a transfer id are recorded: without one, no money
    /// can have moved and the week may be retried. Returns whether an entry
    /// was written.
    pub fn record(&mut self, week: &str, result: &TransferResult) -> Result<bool> {
        let Some(ref transfer_id) = result.transfer_id else {
            return Ok(false);
        };

        self.weeks.insert(
            week.to_string(),
            LedgerEntry {
                transfer_id: transfer_id.clone(),
                status: result.status,
                amount: result.transfer_amount,
                verified: result.verified,
                recorded_at: Utc::now(),
            },
        );
        self.save()?;
        info!(week, transfer_id = %transfer_id, "Recorded transfer in run ledger");
        Ok(true)
    }

    /// Write the ledger atomically (temp file in the same directory, then rename)
    pub fn save(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let file = LedgerFile {
            weeks: self.weeks.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        temp.write_all(json.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}
