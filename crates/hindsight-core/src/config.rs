//! Engine configuration.
//!
//! Every environment variable the engine recognises is read exactly once,
//! here, at instance construction. Nothing else in the crate touches the
//! process environment, so two `Hindsight` instances in one process can run
//! with different configurations.

use std::path::PathBuf;

use crate::error::{HindsightError, Result};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default embedding model served by the TEI endpoint
pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-small-en-v1.5";

/// Embedding dimension of the default model, enforced at runtime
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

/// Default rerank batch size (`HINDSIGHT_TEI_RERANK_BATCH_SIZE`)
pub const DEFAULT_RERANK_BATCH_SIZE: usize = 128;

/// Default rerank concurrency limit (`HINDSIGHT_TEI_RERANK_MAX_CONCURRENT`)
pub const DEFAULT_RERANK_MAX_CONCURRENT: usize = 8;

/// Default similarity threshold above which an incoming fact reinforces
/// its nearest neighbour instead of creating a new trace
pub const DEFAULT_DEDUP_THRESHOLD: f64 = 0.92;

// ============================================================================
// CONFIG
// ============================================================================

/// Engine configuration, resolved once at `Hindsight::new` time.
#[derive(Debug, Clone)]
pub struct HindsightConfig {
    /// SQLite database file. `None` selects the platform data directory.
    pub db_path: Option<PathBuf>,
    /// Embedding model name (for error messages and the embeddings table)
    pub embedding_model: String,
    /// Embedding dimension D; vectors of any other length are rejected
    pub embedding_dimensions: usize,
    /// TEI embed endpoint base URL
    pub embed_url: Option<String>,
    /// TEI rerank endpoint base URL
    pub rerank_url: Option<String>,
    /// Bearer token sent to both TEI endpoints
    pub tei_api_key: Option<String>,
    /// Documents per rerank HTTP request
    pub rerank_batch_size: usize,
    /// Concurrent in-flight rerank batches
    pub rerank_max_concurrent: usize,
    /// Completion-token ceiling for extraction calls
    pub retain_max_completion_tokens: usize,
    /// Chunk size the extraction prompt splits long content into
    pub retain_chunk_size: usize,
}

impl Default for HindsightConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            embed_url: None,
            rerank_url: None,
            tei_api_key: None,
            rerank_batch_size: DEFAULT_RERANK_BATCH_SIZE,
            rerank_max_concurrent: DEFAULT_RERANK_MAX_CONCURRENT,
            retain_max_completion_tokens: 4096,
            retain_chunk_size: 2000,
        }
    }
}

impl HindsightConfig {
    /// Build a config from the process environment layered over defaults.
    ///
    /// Primary variables win over their legacy aliases.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        config.embed_url = env_first(&["HINDSIGHT_TEI_EMBED_URL", "HINDSIGHT_API_EMBEDDINGS_TEI_URL"]);
        config.rerank_url = env_first(&["HINDSIGHT_TEI_RERANK_URL", "HINDSIGHT_API_RERANKER_TEI_URL"]);
        config.tei_api_key = env_first(&["HINDSIGHT_TEI_API_KEY"]);

        if let Some(v) = env_first(&["HINDSIGHT_TEI_RERANK_BATCH_SIZE"]) {
            config.rerank_batch_size = parse_env_usize("HINDSIGHT_TEI_RERANK_BATCH_SIZE", &v)?;
        }
        if let Some(v) = env_first(&["HINDSIGHT_TEI_RERANK_MAX_CONCURRENT"]) {
            config.rerank_max_concurrent =
                parse_env_usize("HINDSIGHT_TEI_RERANK_MAX_CONCURRENT", &v)?;
        }
        if let Some(v) = env_first(&["HINDSIGHT_API_RETAIN_MAX_COMPLETION_TOKENS"]) {
            config.retain_max_completion_tokens =
                parse_env_usize("HINDSIGHT_API_RETAIN_MAX_COMPLETION_TOKENS", &v)?;
        }
        if let Some(v) = env_first(&["HINDSIGHT_API_RETAIN_CHUNK_SIZE"]) {
            config.retain_chunk_size = parse_env_usize("HINDSIGHT_API_RETAIN_CHUNK_SIZE", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field rules. Violations are rejected before any IO happens.
    pub fn validate(&self) -> Result<()> {
        if self.retain_max_completion_tokens <= self.retain_chunk_size {
            return Err(HindsightError::InvalidInput(format!(
                "retainMaxCompletionTokens ({}) must be greater than retainChunkSize ({}); \
                 raise HINDSIGHT_API_RETAIN_MAX_COMPLETION_TOKENS or lower \
                 HINDSIGHT_API_RETAIN_CHUNK_SIZE",
                self.retain_max_completion_tokens, self.retain_chunk_size
            )));
        }
        if self.embedding_dimensions == 0 {
            return Err(HindsightError::InvalidInput(
                "embeddingDimensions must be non-zero".to_string(),
            ));
        }
        if self.rerank_max_concurrent == 0 {
            return Err(HindsightError::InvalidInput(
                "rerankMaxConcurrent must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|v| !v.is_empty())
}

fn parse_env_usize(name: &str, value: &str) -> Result<usize> {
    value.parse().map_err(|_| {
        HindsightError::InvalidInput(format!("{} must be an integer, got {:?}", name, value))
    })
}

// ============================================================================
// TESTS
// ============================================================================
