use crate::error::{Error, Result};
use crate::model::Transaction;

/// Ordered, append-only record sequence.
///
/// Position `i` here corresponds to vector `i` in the index; the engine is
/// responsible for growing both in lockstep.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<Transaction>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<Transaction>) -> Self {
        Self { records }
    }

    /// Append a batch, preserving its order. Positions are handed out
    /// densely and never reused.
    pub fn append(&mut self, batch: Vec<Transaction>) {
        self.records.extend(batch);
    }

    pub fn get(&self, position: usize) -> Result<&Transaction> {
        self.records.get(position).ok_or_else(|| {
            Error::not_found(format!(
                "record position {} is out of range (store holds {})",
                position,
                self.records.len()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Transaction] {
        &self.records
    }
}
