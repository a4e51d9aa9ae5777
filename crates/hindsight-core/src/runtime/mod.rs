//! Model runtime seams.
//!
//! The engine never runs inference itself. Embedding, reranking, and text
//! generation are consumed through these traits; the default production
//! implementation is the TEI HTTP client in `tei`, and tests substitute
//! deterministic in-process fakes.

mod tei;

pub use tei::{TeiClient, TeiRerankClient};

use async_trait::async_trait;

use crate::error::Result;

/// Produces fixed-dimension embedding vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch; the default loops over `embed`, implementations with
    /// a native batch endpoint override this
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Dimension of every vector this embedder produces
    fn dimensions(&self) -> usize;
}

/// Cross-encoder relevance scorer. Returns one raw logit per document;
/// the recall pipeline applies the sigmoid.
#[async_trait]
pub trait RerankModel: Send + Sync {
    /// Score `docs` against `query`; `out.len() == docs.len()`
    async fn rerank(&self, query: &str, docs: &[String]) -> Result<Vec<f32>>;
}

/// Opaque text generator used by fact extraction and gist generation
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// Complete a prompt, bounded by `max_tokens`
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String>;
}

/// Logistic squash of a raw cross-encoder logit into [0, 1]
pub fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_bounds() {
        assert!(sigmoid(-100.0) < 1e-6);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(100.0) > 1.0 - 1e-6);
    }

    #[test]
    fn test_sigmoid_monotone() {
        let scores: Vec<f32> = (-5..=5).map(|x| sigmoid(x as f32)).collect();
        for pair in scores.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
