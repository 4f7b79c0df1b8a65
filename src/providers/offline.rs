//! Deterministic providers that need no model server.
//!
//! Useful for tests, demos, and air-gapped runs: the embedder hashes text
//! onto a stable pseudo-random unit vector, the generator answers straight
//! from the retrieved context.

use async_trait::async_trait;

use super::{EmbeddingProvider, GenerationProvider};
use crate::error::Result;
use crate::rag::{PROMPT_PREAMBLE, PROMPT_QUESTION_LEAD};

pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut rng_state = hasher.finish();

        let mut vector = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            // LCG keeps the same text on the same direction across runs
            rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let value = (rng_state >> 32) as u32;
            vector.push((value as f32 / u32::MAX as f32) * 2.0 - 1.0);
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hash"
    }
}

/// Answers without a language model by echoing the retrieved context block
/// out of the prompt.
#[derive(Default)]
pub struct ExtractiveGenerator;

impl ExtractiveGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GenerationProvider for ExtractiveGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let context = prompt
            .split_once(PROMPT_PREAMBLE)
            .map(|(_, rest)| rest)
            .and_then(|rest| rest.split_once(PROMPT_QUESTION_LEAD))
            .map(|(context, _)| context.trim())
            .unwrap_or(prompt.trim());

        if context.is_empty() {
            Ok("No matching transactions were found.".to_string())
        } else {
            Ok(format!("Most relevant transactions:\n{}", context))
        }
    }

    fn provider_name(&self) -> &str {
        "extractive"
    }
}
