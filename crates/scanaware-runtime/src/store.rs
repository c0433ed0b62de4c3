//! Persistent scan record storage.
//!
//! Rows are keyed by `(source_ip, port, protocol, date)`. Upserting a row
//! whose key exists adds the counts, widens the seen window, and fills geo
//! fields the stored row lacks.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use scanaware_common::error::{Result, ScanError};
use scanaware_common::types::{ScanKey, ScanRecord};

/// Outbound persistence for aggregated records.
pub trait ScanStore: Send + Sync {
    /// Inserts new rows and folds matching rows into existing ones.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::PersistenceFailed`] or an I/O error if the write
    /// does not complete.
    fn upsert(&self, records: &[ScanRecord]) -> Result<()>;

    /// Deletes rows dated strictly before `cutoff`, returning how many.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete does not complete.
    fn clear_before(&self, cutoff: NaiveDate) -> Result<usize>;

    /// Rows dated within `start..=end`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn records(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<ScanRecord>>;

    /// Deletes every row, returning how many.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete does not complete.
    fn clear(&self) -> Result<usize>;
}

type Rows = BTreeMap<ScanKey, ScanRecord>;

fn merge_rows(rows: &mut Rows, records: &[ScanRecord]) {
    for record in records {
        let _ = rows
            .entry(record.key())
            .and_modify(|existing| existing.merge(record))
            .or_insert_with(|| record.clone());
    }
}

fn in_range(rows: &Rows, start: NaiveDate, end: NaiveDate) -> Vec<ScanRecord> {
    rows.values()
        .filter(|r| r.date >= start && r.date <= end)
        .cloned()
        .collect()
}

fn retain_from(rows: &mut Rows, cutoff: NaiveDate) -> usize {
    let before = rows.len();
    rows.retain(|_, r| r.date >= cutoff);
    before - rows.len()
}

/// Store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Rows>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> MutexGuard<'_, Rows> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    /// Returns `true` when no rows are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }
}

impl ScanStore for MemoryStore {
    fn upsert(&self, records: &[ScanRecord]) -> Result<()> {
        merge_rows(&mut self.rows(), records);
        Ok(())
    }

    fn clear_before(&self, cutoff: NaiveDate) -> Result<usize> {
        Ok(retain_from(&mut self.rows(), cutoff))
    }

    fn records(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<ScanRecord>> {
        Ok(in_range(&self.rows(), start, end))
    }

    fn clear(&self) -> Result<usize> {
        let mut rows = self.rows();
        let removed = rows.len();
        rows.clear();
        Ok(removed)
    }
}

/// Store backed by a pretty-printed JSON array on disk.
///
/// Every operation reads and rewrites the whole file under a process-local
/// lock.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Opens a store at `path`, creating its parent directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ScanError::io(parent, e))?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Rows> {
        if !self.path.exists() {
            return Ok(Rows::new());
        }
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| ScanError::io(&self.path, e))?;
        let records: Vec<ScanRecord> = serde_json::from_str(&content)?;
        let mut rows = Rows::new();
        merge_rows(&mut rows, &records);
        Ok(rows)
    }

    fn write(&self, rows: &Rows) -> Result<()> {
        let records: Vec<&ScanRecord> = rows.values().collect();
        let json = serde_json::to_string_pretty(&records)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| ScanError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| ScanError::PersistenceFailed {
            reason: format!("replacing {}: {e}", self.path.display()),
        })
    }

    fn modify<T>(&self, change: impl FnOnce(&mut Rows) -> T) -> Result<T> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut rows = self.read()?;
        let out = change(&mut rows);
        self.write(&rows)?;
        Ok(out)
    }
}

impl ScanStore for JsonFileStore {
    fn upsert(&self, records: &[ScanRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.modify(|rows| merge_rows(rows, records))
    }

    fn clear_before(&self, cutoff: NaiveDate) -> Result<usize> {
        self.modify(|rows| retain_from(rows, cutoff))
    }

    fn records(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<ScanRecord>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(in_range(&self.read()?, start, end))
    }

    fn clear(&self) -> Result<usize> {
        self.modify(|rows| {
            let removed = rows.len();
            rows.clear();
            removed
        })
    }
}
