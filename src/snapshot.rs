use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::index::{FlatIndex, VectorIndex};
use crate::model::Transaction;
use crate::store::RecordStore;

// The records artifact lives next to the index artifact, joined by suffix.
const RECORDS_SUFFIX: &str = ".records.json";
const TMP_SUFFIX: &str = ".tmp";
const RECORDS_VERSION: u32 = 1;

/// Versioned envelope for the records artifact. Vector `i` in the index
/// artifact belongs to `records[i]` here; the pairing is validated on load.
#[derive(Serialize, Deserialize)]
struct RecordsArtifact {
    version: u32,
    records: Vec<Transaction>,
}

/// Writes and restores the correlated (index, records) snapshot pair.
pub struct SnapshotStore {
    index_path: PathBuf,
}

impl SnapshotStore {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn records_path(&self) -> PathBuf {
        append_suffix(&self.index_path, RECORDS_SUFFIX)
    }

    /// Persist both artifacts. Each one is written to a temp sibling first
    /// and renamed into place, so a save that dies midway leaves the
    /// previous snapshot readable.
    pub fn save(&self, index: &dyn VectorIndex, records: &RecordStore) -> Result<()> {
        if let Some(parent) = self.index_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_index = append_suffix(&self.index_path, TMP_SUFFIX);
        {
            let file = File::create(&tmp_index)?;
            let mut writer = BufWriter::new(file);
            index.write_to(&mut writer)?;
            writer.flush()?;
        }

        let records_path = self.records_path();
        let tmp_records = append_suffix(&records_path, TMP_SUFFIX);
        {
            let file = File::create(&tmp_records)?;
            let mut writer = BufWriter::new(file);
            let artifact = RecordsArtifact {
                version: RECORDS_VERSION,
                records: records.records().to_vec(),
            };
            serde_json::to_writer(&mut writer, &artifact)?;
            writer.flush()?;
        }

        fs::rename(&tmp_index, &self.index_path)?;
        fs::rename(&tmp_records, &records_path)?;
        Ok(())
    }

    /// Load the persisted pair.
    ///
    /// Neither artifact present means a first run (`Ok(None)`). Exactly one
    /// present, or artifacts whose counts disagree, is corruption: refusing
    /// to start beats silently mis-joining vectors and records.
    pub fn load(&self) -> Result<Option<(FlatIndex, RecordStore)>> {
        let records_path = self.records_path();

        match (self.index_path.exists(), records_path.exists()) {
            (false, false) => Ok(None),
            (true, false) => Err(Error::corruption(format!(
                "index artifact {} exists but records artifact {} is missing",
                self.index_path.display(),
                records_path.display()
            ))),
            (false, true) => Err(Error::corruption(format!(
                "records artifact {} exists but index artifact {} is missing",
                records_path.display(),
                self.index_path.display()
            ))),
            (true, true) => {
                let file = File::open(&self.index_path)?;
                let mut reader = BufReader::new(file);
                let index = FlatIndex::read_from(&mut reader)?;

                let file = File::open(&records_path)?;
                let reader = BufReader::new(file);
                let artifact: RecordsArtifact =
                    serde_json::from_reader(reader).map_err(|e| {
                        Error::corruption(format!(
                            "records artifact {} is unreadable: {}",
                            records_path.display(),
                            e
                        ))
                    })?;

                if artifact.version != RECORDS_VERSION {
                    return Err(Error::corruption(format!(
                        "records artifact version {} is not supported (expected {})",
                        artifact.version, RECORDS_VERSION
                    )));
                }
                if index.len() != artifact.records.len() {
                    return Err(Error::corruption(format!(
                        "snapshot artifacts disagree: {} vectors vs {} records",
                        index.len(),
                        artifact.records.len()
                    )));
                }

                Ok(Some((index, RecordStore::from_records(artifact.records))))
            }
        }
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}
