//! Test Engine Harness
//!
//! Builds isolated engine instances over temporary databases with the
//! deterministic fakes wired in. The temp directory is kept alive alongside
//! the engine so the database survives the whole test.

use std::sync::{Arc, Mutex};

use hindsight_core::{
    Bank, Hindsight, HindsightConfig, LlmAdapter, RerankModel, TraceEvent,
};
use tempfile::TempDir;

use crate::mocks::{BagOfWordsEmbedder, EMBEDDING_DIMENSIONS};

/// One isolated engine over a temp database
pub struct TestEngine {
    /// The engine under test
    pub engine: Arc<Hindsight>,
    /// Trace events captured from the `on_trace` callback
    pub traces: Arc<Mutex<Vec<TraceEvent>>>,
    _temp_dir: TempDir,
}

impl TestEngine {
    /// Engine with the bag-of-words embedder only
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// Engine with the given reranker installed
    pub fn with_reranker(reranker: Arc<dyn RerankModel>) -> Self {
        Self::build(Some(reranker), None)
    }

    /// Engine with an LLM adapter installed
    pub fn with_llm(llm: Arc<dyn LlmAdapter>) -> Self {
        Self::build(None, Some(llm))
    }

    fn build(reranker: Option<Arc<dyn RerankModel>>, llm: Option<Arc<dyn LlmAdapter>>) -> Self {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let config = HindsightConfig {
            db_path: Some(temp_dir.path().join("hindsight.db")),
            embedding_model: "test-bag-of-words".to_string(),
            embedding_dimensions: EMBEDDING_DIMENSIONS,
            ..Default::default()
        };

        let traces: Arc<Mutex<Vec<TraceEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = traces.clone();

        let mut builder = Hindsight::builder(config)
            .embedder(Arc::new(BagOfWordsEmbedder))
            .on_trace(Arc::new(move |event| {
                sink.lock().unwrap().push(event);
            }));
        if let Some(reranker) = reranker {
            builder = builder.reranker(reranker);
        }
        if let Some(llm) = llm {
            builder = builder.llm(llm);
        }

        Self {
            engine: Arc::new(builder.build().expect("engine")),
            traces,
            _temp_dir: temp_dir,
        }
    }

    /// Create a bank with defaults
    pub fn bank(&self, name: &str) -> Bank {
        self.engine
            .create_bank(name, None, None, None)
            .expect("bank")
    }

    /// Path of the engine's database file (for raw-SQL test surgery)
    pub fn db_path(&self) -> std::path::PathBuf {
        self._temp_dir.path().join("hindsight.db")
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}
