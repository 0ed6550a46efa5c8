//! In-memory CSV output table that is fully rewritten to disk on every change.
//!
//! Writes go through a single async mutex, so a `set_row` never interleaves
//! with another write and the file on disk is always a complete table. Each
//! write costs O(total rows).

use super::storage::write_atomically;
use crate::core::error::Result;

use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// One output row keyed by column name.
pub type CsvRow = HashMap<String, String>;

pub const FIRST_NAME_COLUMN: &str = "First Name";
pub const LAST_NAME_COLUMN: &str = "Last Name";
pub const WEBSITE_COLUMN: &str = "Website";
pub const EMAIL_COLUMN: &str = "Email";
pub const STATUS_COLUMN: &str = "Status";

/// Columns appended after the contact-identifying ones.
pub const APPEND_COLUMNS: [&str; 2] = [EMAIL_COLUMN, STATUS_COLUMN];

/// Copy of `base` with the appended columns set (missing values become empty).
pub fn compose_row(base: &CsvRow, email: Option<&str>, status: Option<&str>) -> CsvRow {
    let mut row = base.clone();
    row.insert(EMAIL_COLUMN.to_string(), email.unwrap_or_default().to_string());
    row.insert(STATUS_COLUMN.to_string(), status.unwrap_or_default().to_string());
    row
}

/// Serializes rows under `columns`, quoting fields containing commas, quotes or newlines.
pub fn serialize_csv(columns: &[String], rows: &[CsvRow]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(
            columns
                .iter()
                .map(|column| row.get(column).map(String::as_str).unwrap_or("")),
        )?;
    }
    writer.into_inner().map_err(|e| {
        crate::AppError::Io(std::io::Error::new(e.error().kind(), e.error().to_string()))
    })
}

pub struct CsvSnapshotWriter {
    path: PathBuf,
    columns: Vec<String>,
    rows: Mutex<Vec<CsvRow>>,
}

impl CsvSnapshotWriter {
    pub fn new(path: impl Into<PathBuf>, columns: Vec<String>, initial_rows: Vec<CsvRow>) -> Self {
        Self {
            path: path.into(),
            columns,
            rows: Mutex::new(initial_rows),
        }
    }

    /// Writes the current table to disk.
    pub async fn write_snapshot(&self) -> Result<()> {
        let rows = self.rows.lock().await;
        self.flush(&rows).await
    }

    /// Replaces the row at `row_id` and rewrites the file.
    pub async fn set_row(&self, row_id: usize, row: CsvRow) -> Result<()> {
        let mut rows = self.rows.lock().await;
        match rows.get_mut(row_id) {
            Some(slot) => *slot = row,
            None => {
                tracing::warn!(target: "csv_snapshot", "Row {} is outside the table ({} rows); ignoring update.", row_id, rows.len());
                return Ok(());
            }
        }
        self.flush(&rows).await
    }

    // Called with the row lock held; that lock is the write queue.
    async fn flush(&self, rows: &[CsvRow]) -> Result<()> {
        let payload = serialize_csv(&self.columns, rows)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &payload)).await??;
        tracing::trace!(target: "csv_snapshot", "Wrote {} rows to {}", rows.len(), self.path.display());
        Ok(())
    }
}
