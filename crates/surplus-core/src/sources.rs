//! Budget and transaction row sources
//!
//! A "sheet" is a CSV export named `<sheet>.csv` inside the data directory.
//! The header row is optional: budget sheets are `name, amount`, transaction
//! sheets are `location, amount, timestamp, category`.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{BudgetRow, TransactionRow};

/// Ordered `(category_name, weekly_amount)` rows
#[async_trait]
pub trait BudgetSource: Send + Sync {
    async fn budget_rows(&self, sheet: &str) -> Result<Vec<BudgetRow>>;
}

/// Ordered `(location, amount, timestamp, category)` rows
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn transaction_rows(&self, sheet: &str) -> Result<Vec<TransactionRow>>;

    /// Replace the sheet's contents
    async fn write_transaction_rows(&self, sheet: &str, rows: &[TransactionRow]) -> Result<()>;
}

const HEADER_NAMES: &[&str] = &[
    "name",
    "category",
    "category_name",
    "location",
    "merchant",
    "description",
];

/// CSV sheet exports in one directory
#[derive(Debug, Clone)]
pub struct CsvSheets {
    dir: PathBuf,
}

impl CsvSheets {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn sheet_path(&self, sheet: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", sheet))
    }

    pub fn exists(&self, sheet: &str) -> bool {
        self.sheet_path(sheet).exists()
    }

    fn read_records(&self, sheet: &str) -> Result<Vec<StringRecord>> {
        let path = self.sheet_path(sheet);
        if !path.exists() {
            return Err(Error::NotFound(format!("sheet '{}'", sheet)));
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&path)?;

        let mut records = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            if record.iter().all(|field| field.is_empty()) {
                continue;
            }
            let is_header = i == 0
                && record
                    .get(0)
                    .map(|f| HEADER_NAMES.contains(&f.to_lowercase().as_str()))
                    .unwrap_or(false);
            if is_header {
                continue;
            }
            records.push(record);
        }

        debug!(sheet, rows = records.len(), "Read sheet");
        Ok(records)
    }
}

fn field(record: &StringRecord, index: usize) -> String {
    record.get(index).unwrap_or_default().to_string()
}

#[async_trait]
impl BudgetSource for CsvSheets {
    async fn budget_rows(&self, sheet: &str) -> Result<Vec<BudgetRow>> {
        Ok(self
            .read_records(sheet)?
            .iter()
            .map(|r| BudgetRow::new(field(r, 0), field(r, 1)))
            .collect())
    }
}

#[async_trait]
impl TransactionSource for CsvSheets {
    async fn transaction_rows(&self, sheet: &str) -> Result<Vec<TransactionRow>> {
        Ok(self
            .read_records(sheet)?
            .iter()
            .map(|r| {
                let category = field(r, 3);
                TransactionRow {
                    location: field(r, 0),
                    amount: field(r, 1),
                    timestamp: field(r, 2),
                    category: (!category.is_empty()).then_some(category),
                }
            })
            .collect())
    }

    async fn write_transaction_rows(&self, sheet: &str, rows: &[TransactionRow]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = WriterBuilder::new().from_writer(temp.as_file_mut());
            writer.write_record(["location", "amount", "timestamp", "category"])?;
            for row in rows {
                writer.write_record([
                    row.location.as_str(),
                    row.amount.as_str(),
                    row.timestamp.as_str(),
                    row.category.as_deref().unwrap_or(""),
                ])?;
            }
            writer.flush()?;
        }
        temp.as_file_mut().sync_all()?;
        temp.persist(self.sheet_path(sheet))
            .map_err(|e| Error::Io(e.error))?;

        debug!(sheet, rows = rows.len(), "Wrote sheet");
        Ok(())
    }
}
