//! Providers backed by a local Ollama server.
//!
//! Both providers share an injected `reqwest::Client`; the caller builds it
//! once with the request timeout and clones it into each provider.

use async_trait::async_trait;
use reqwest::Client;

use super::{EmbeddingProvider, GenerationProvider};
use crate::error::{Error, Result};

pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    dimension: usize,
    http_client: Client,
}

impl OllamaEmbedder {
    /// `dimension` must match what `model` actually emits; the index rejects
    /// anything else at ingest time.
    pub fn new(base_url: String, model: String, dimension: usize, http_client: Client) -> Self {
        Self {
            base_url,
            model,
            dimension,
            http_client,
        }
    }

    async fn fetch_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let payload = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });

        let response = self
            .http_client
            .post(format!(
                "{}/api/embeddings",
                self.base_url.trim_end_matches('/')
            ))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::embedding(format!("embedding request timed out: {}", e))
                } else {
                    Error::embedding(format!("embedding request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(Error::embedding(format!(
                "ollama answered {} for embedding model {}",
                response.status(),
                self.model
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("embedding response is not json: {}", e)))?;

        parse_embedding(&body)
    }
}

fn parse_embedding(body: &serde_json::Value) -> Result<Vec<f32>> {
    body["embedding"]
        .as_array()
        .ok_or_else(|| Error::embedding("embedding response is missing the embedding array"))?
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                Error::embedding("embedding response holds a non-numeric component")
            })
        })
        .collect()
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // The embeddings endpoint takes one prompt per call.
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.fetch_embedding(text).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}

pub struct OllamaGenerator {
    base_url: String,
    model: String,
    http_client: Client,
}

impl OllamaGenerator {
    pub fn new(base_url: String, model: String, http_client: Client) -> Self {
        Self {
            base_url,
            model,
            http_client,
        }
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let payload = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .http_client
            .post(format!(
                "{}/api/generate",
                self.base_url.trim_end_matches('/')
            ))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::generation(format!("generation request timed out: {}", e))
                } else {
                    Error::generation(format!("generation request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(Error::generation(format!(
                "ollama answered {} for generation model {}",
                response.status(),
                self.model
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::generation(format!("generation response is not json: {}", e)))?;

        let answer = body["response"]
            .as_str()
            .ok_or_else(|| Error::generation("generation response is missing the response field"))?;

        Ok(answer.trim().to_string())
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}
