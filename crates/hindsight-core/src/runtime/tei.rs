//! TEI (text-embeddings-inference) HTTP client.
//!
//! Implements `Embedder` against `POST {embed_url}/embed` and `RerankModel`
//! against `POST {rerank_url}/rerank`. Any HTTP status >= 400 or malformed
//! payload surfaces as an `ExternalService` error naming the endpoint URL
//! and model so operators can tell which service fell over.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::error::{HindsightError, Result};
use crate::runtime::{Embedder, RerankModel};

/// Client for a TEI embedding endpoint
pub struct TeiClient {
    http: reqwest::Client,
    embed_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

impl TeiClient {
    /// Create a client for `embed_url` serving `model` with dimension D
    pub fn new(
        embed_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            embed_url: embed_url.into(),
            api_key,
            model: model.into(),
            dimensions,
        }
    }

    fn endpoint_error(&self, url: &str, message: impl Into<String>) -> HindsightError {
        HindsightError::ExternalService {
            url: url.to_string(),
            model: self.model.clone(),
            message: message.into(),
        }
    }

    async fn post_embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embed", self.embed_url.trim_end_matches('/'));
        let mut request = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "inputs": inputs }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.endpoint_error(&url, e.to_string()))?;
        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(self.endpoint_error(&url, format!("status {}: {}", status, body)));
        }

        let vectors: Vec<Vec<f32>> = response
            .json()
            .await
            .map_err(|e| self.endpoint_error(&url, format!("malformed response: {}", e)))?;

        if vectors.len() != inputs.len() {
            return Err(self.endpoint_error(
                &url,
                format!("expected {} vectors, got {}", inputs.len(), vectors.len()),
            ));
        }
        for vector in &vectors {
            if vector.len() != self.dimensions {
                return Err(self.endpoint_error(
                    &url,
                    format!(
                        "dimension mismatch: expected {}, got {}",
                        self.dimensions,
                        vector.len()
                    ),
                ));
            }
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for TeiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.post_embed(&[text.to_string()]).await?;
        Ok(vectors.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.post_embed(texts).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ============================================================================
// RERANK
// ============================================================================

/// One scored document in a TEI rerank response
#[derive(Debug, Deserialize)]
struct RerankEntry {
    index: usize,
    score: f32,
}

/// TEI rerank responses come in two shapes: a bare array or `{results: []}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RerankResponse {
    Bare(Vec<RerankEntry>),
    Wrapped { results: Vec<RerankEntry> },
}

/// Client for a TEI cross-encoder rerank endpoint.
///
/// Long candidate lists are split into `batch_size` chunks dispatched with
/// at most `max_concurrent` requests in flight.
pub struct TeiRerankClient {
    http: reqwest::Client,
    rerank_url: String,
    api_key: Option<String>,
    model: String,
    batch_size: usize,
    limiter: Arc<Semaphore>,
}

impl TeiRerankClient {
    /// Create a client for `rerank_url` serving `model`
    pub fn new(
        rerank_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        batch_size: usize,
        max_concurrent: usize,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            rerank_url: rerank_url.into(),
            api_key,
            model: model.into(),
            batch_size: batch_size.max(1),
            limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    fn endpoint_error(&self, url: &str, message: impl Into<String>) -> HindsightError {
        HindsightError::ExternalService {
            url: url.to_string(),
            model: self.model.clone(),
            message: message.into(),
        }
    }

    async fn rerank_batch(&self, query: &str, docs: &[String]) -> Result<Vec<f32>> {
        let url = format!("{}/rerank", self.rerank_url.trim_end_matches('/'));
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| self.endpoint_error(&url, "rerank limiter closed"))?;

        let mut request = self.http.post(&url).json(&serde_json::json!({
            "query": query,
            "texts": docs,
            "return_text": false,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.endpoint_error(&url, e.to_string()))?;
        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(self.endpoint_error(&url, format!("status {}: {}", status, body)));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| self.endpoint_error(&url, format!("malformed response: {}", e)))?;
        let entries = match parsed {
            RerankResponse::Bare(entries) => entries,
            RerankResponse::Wrapped { results } => results,
        };

        let mut scores = vec![0.0f32; docs.len()];
        for entry in entries {
            if entry.index >= docs.len() {
                return Err(self.endpoint_error(
                    &url,
                    format!("index {} out of range for {} texts", entry.index, docs.len()),
                ));
            }
            scores[entry.index] = entry.score;
        }
        Ok(scores)
    }
}

#[async_trait]
impl RerankModel for TeiRerankClient {
    async fn rerank(&self, query: &str, docs: &[String]) -> Result<Vec<f32>> {
        if docs.is_empty() {
            return Ok(vec![]);
        }
        let mut scores = Vec::with_capacity(docs.len());
        for chunk in docs.chunks(self.batch_size) {
            scores.extend(self.rerank_batch(query, chunk).await?);
        }
        Ok(scores)
    }
}
