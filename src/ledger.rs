//! Flat-file journal of raw transactions, kept beside the vector state.
//!
//! This is the browsable side of the system: a pretty-printed JSON array a
//! human can open in an editor. It carries no alignment invariants, so load
//! is lenient where the snapshot loader is strict.

use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;

use crate::error::Result;
use crate::model::Transaction;

/// Conjunction of optional filters; an empty filter matches everything.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct LedgerFilter {
    /// Case-insensitive exact category match.
    pub category: Option<String>,
    /// Case-insensitive merchant substring match.
    pub merchant: Option<String>,
    /// Inclusive lower date bound.
    pub from: Option<NaiveDate>,
    /// Inclusive upper date bound.
    pub to: Option<NaiveDate>,
}

pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// All recorded transactions. A missing file is an empty ledger; an
    /// unreadable file is logged and treated as empty rather than taking
    /// the whole service down.
    pub fn load(&self) -> Result<Vec<Transaction>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&contents) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "ledger file is unreadable, treating as empty"
                );
                Ok(Vec::new())
            }
        }
    }

    pub fn append(&self, batch: &[Transaction]) -> Result<()> {
        let mut records = self.load()?;
        records.extend_from_slice(batch);
        self.save_all(&records)
    }

    fn save_all(&self, records: &[Transaction]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn filtered(&self, filter: &LedgerFilter) -> Result<Vec<Transaction>> {
        let mut records = self.load()?;
        records.retain(|t| {
            filter
                .category
                .as_deref()
                .map_or(true, |c| t.category.eq_ignore_ascii_case(c))
                && filter.merchant.as_deref().map_or(true, |m| {
                    t.merchant.to_lowercase().contains(&m.to_lowercase())
                })
                && filter.from.map_or(true, |from| t.date >= from)
                && filter.to.map_or(true, |to| t.date <= to)
        });
        Ok(records)
    }
}
