//! HTTP client for the language-model embedding endpoint.
//!
//! Synchronous request/response against an OpenAI-compatible `/v1/embeddings`
//! endpoint: input text in, fixed-length vector out. One model identifier is
//! used for every vector so all cached embeddings stay comparable.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding api key is missing (set embedding.api_key or OPENAI_API_KEY)")]
    MissingKey,

    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding endpoint returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("embedding endpoint returned no data")]
    Empty,
}

/// Seam for query-time and enrichment-time embedding generation;
/// tests substitute a deterministic stub.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

pub struct EmbeddingClient {
    client: reqwest::blocking::Client,
    api_url: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self, EmbeddingError> {
        if api_key.is_empty() {
            return Err(EmbeddingError::MissingKey);
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate embeddings for multiple texts in one request.
    /// Results come back in input order.
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let request = EmbeddingRequest {
            input: texts,
            model: &self.model,
        };

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }

        let mut parsed: EmbeddingResponse = resp.json()?;
        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::Empty);
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

impl Embedder for EmbeddingClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let input = [text.to_string()];
        self.embed_batch(&input)?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::Empty)
    }
}
