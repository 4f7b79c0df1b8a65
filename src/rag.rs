//! The retrieval pipeline: embed, rank, join, prompt, generate.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::index::{FlatIndex, VectorIndex};
use crate::model::{SearchHit, Transaction};
use crate::providers::{EmbeddingProvider, GenerationProvider};
use crate::snapshot::SnapshotStore;
use crate::store::RecordStore;

/// Neighbors retrieved per question when the caller does not say otherwise.
pub const DEFAULT_K: usize = 5;

pub(crate) const PROMPT_PREAMBLE: &str = "Based on these transactions:";
pub(crate) const PROMPT_QUESTION_LEAD: &str = "Answer this question:";

pub(crate) fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "{}\n{}\n\n{} {}\n\nProvide a concise summary including relevant amounts and dates.",
        PROMPT_PREAMBLE, context, PROMPT_QUESTION_LEAD, question
    )
}

// Index and records only ever change together, under one write guard.
struct EngineState {
    index: Box<dyn VectorIndex>,
    records: RecordStore,
}

/// What a query hands back: the generated answer plus the hits behind it.
#[derive(Serialize, Debug)]
pub struct QueryOutcome {
    pub answer: String,
    pub matches: Vec<SearchHit>,
}

#[derive(Serialize, Debug)]
pub struct EngineStats {
    pub records: usize,
    pub dimension: usize,
    pub embedder: String,
    pub generator: String,
}

/// Owns the index/store pair and drives both halves of the pipeline.
///
/// Provider calls always happen outside the state lock; the lock is held
/// only for the synchronous add + append + save section, so a slow model
/// never blocks readers behind a held write guard.
pub struct RagEngine {
    state: RwLock<EngineState>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    snapshot: SnapshotStore,
}

impl RagEngine {
    pub fn new(
        index: Box<dyn VectorIndex>,
        records: RecordStore,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        snapshot: SnapshotStore,
    ) -> Self {
        if embedder.dimensions() != index.dimension() {
            warn!(
                embedder = embedder.provider_name(),
                embedder_width = embedder.dimensions(),
                index_width = index.dimension(),
                "embedding width disagrees with index width; ingests will be rejected"
            );
        }

        Self {
            state: RwLock::new(EngineState { index, records }),
            embedder,
            generator,
            snapshot,
        }
    }

    /// Restore the snapshot at `snapshot`'s path, or start empty on a
    /// first run.
    pub fn open(
        snapshot: SnapshotStore,
        dimension: usize,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Result<Self> {
        let (index, records): (Box<dyn VectorIndex>, RecordStore) = match snapshot.load()? {
            Some((index, records)) => {
                info!(
                    records = records.len(),
                    path = %snapshot.index_path().display(),
                    "restored snapshot"
                );
                (Box::new(index), records)
            }
            None => {
                info!(
                    path = %snapshot.index_path().display(),
                    "no snapshot found, starting empty"
                );
                (Box::new(FlatIndex::new(dimension)), RecordStore::new())
            }
        };

        Ok(Self::new(index, records, embedder, generator, snapshot))
    }

    /// Embed and index a batch, append its records, and persist.
    ///
    /// The batch lands either fully or not at all. Dimension checks run
    /// before any mutation, so a rejected batch leaves positions untouched.
    /// Returns how many records were ingested.
    pub async fn ingest(&self, batch: Vec<Transaction>) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = batch.iter().map(Transaction::to_text).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(Error::invalid_argument(format!(
                "embedding provider returned {} vectors for {} records",
                vectors.len(),
                batch.len()
            )));
        }

        let count = batch.len();
        let mut state = self.write_state()?;
        state.index.add(&vectors)?;
        state.records.append(batch);
        self.snapshot.save(state.index.as_ref(), &state.records)?;

        info!(records = count, total = state.records.len(), "ingested batch");
        Ok(count)
    }

    /// The `k` records closest to `question`, with squared distances,
    /// closest first.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<SearchHit>> {
        if question.trim().is_empty() {
            return Err(Error::invalid_argument("question must not be blank"));
        }
        if k == 0 {
            return Err(Error::invalid_argument("k must be at least 1"));
        }

        let query = self.embedder.embed_query(question).await?;

        let state = self.read_state()?;
        let ranked = state.index.search(&query, k)?;
        ranked
            .into_iter()
            .map(|(position, distance)| {
                Ok(SearchHit {
                    record: state.records.get(position)?.clone(),
                    distance,
                })
            })
            .collect()
    }

    /// Retrieve context for `question` and ask the generation provider for
    /// an answer. An empty index still generates, with an empty context
    /// block, so the provider can say in its own words that nothing is
    /// recorded yet.
    pub async fn query(&self, question: &str, k: usize) -> Result<QueryOutcome> {
        let matches = self.retrieve(question, k).await?;

        let context = matches
            .iter()
            .map(|hit| format!("- {}", hit.record.to_text()))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = build_prompt(&context, question);

        let answer = self.generator.generate(&prompt).await?;
        Ok(QueryOutcome { answer, matches })
    }

    pub fn stats(&self) -> Result<EngineStats> {
        let state = self.read_state()?;
        Ok(EngineStats {
            records: state.records.len(),
            dimension: state.index.dimension(),
            embedder: self.embedder.provider_name().to_string(),
            generator: self.generator.provider_name().to_string(),
        })
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, EngineState>> {
        self.state
            .read()
            .map_err(|_| Error::internal("engine state lock poisoned"))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, EngineState>> {
        self.state
            .write()
            .map_err(|_| Error::internal("engine state lock poisoned"))
    }
}
