//! Capability ports for the model-backed halves of the pipeline.
//!
//! The engine never talks to a model directly; it goes through these traits
//! so backends can be swapped without touching retrieval logic.

pub mod offline;
pub mod ollama;

pub use offline::{ExtractiveGenerator, HashEmbedder};
pub use ollama::{OllamaEmbedder, OllamaGenerator};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Turns text into fixed-width f32 vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// One vector per input text, in input order. Implementations must
    /// either return exactly `texts.len()` vectors or fail.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string. The default goes through a one-element
    /// batch so query and record embeddings share a code path.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let batch = [text.to_string()];
        let mut vectors = self.embed_batch(&batch).await?;
        if vectors.len() != 1 {
            return Err(Error::embedding(format!(
                "provider returned {} vectors for a single query",
                vectors.len()
            )));
        }
        Ok(vectors.remove(0))
    }

    /// Width of every vector this provider produces.
    fn dimensions(&self) -> usize;

    fn provider_name(&self) -> &str;
}

/// Turns an assembled prompt into an answer.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn provider_name(&self) -> &str;
}
