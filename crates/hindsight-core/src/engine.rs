//! The `Hindsight` instance.
//!
//! One value owns everything: configuration (env read once at construction),
//! the graph store, the in-memory vector index, the model runtime handles,
//! the gist service, the operation queue, and the extension hooks. There are
//! no process-wide singletons; two instances in one process are fully
//! independent.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use uuid::Uuid;

use crate::config::HindsightConfig;
use crate::error::{HindsightError, Result};
use crate::model::{
    Bank, BankConfig, BankStats, Disposition, Entity, EntityType, MemoryUnit, ReconsolidationDecision,
};
use crate::ops::{
    ExtensionHooks, OperationQueue, OperationStatus, SubmitReceipt, TraceCallback, TraceEvent,
};
use crate::pack::GistService;
use crate::runtime::{Embedder, LlmAdapter, RerankModel, TeiClient, TeiRerankClient};
use crate::storage::{GraphStore, OperationRecord, VectorIndex, VectorIndexError};

/// Current time in epoch milliseconds
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn index_error(e: VectorIndexError) -> HindsightError {
    HindsightError::InvalidInput(e.to_string())
}

// ============================================================================
// BUILDER
// ============================================================================

/// Builder for a `Hindsight` instance
pub struct HindsightBuilder {
    config: HindsightConfig,
    embedder: Option<Arc<dyn Embedder>>,
    reranker: Option<Arc<dyn RerankModel>>,
    llm: Option<Arc<dyn LlmAdapter>>,
    hooks: ExtensionHooks,
    on_trace: Option<TraceCallback>,
}

impl HindsightBuilder {
    /// Supply a custom embedder (tests, alternative runtimes)
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Supply a cross-encoder reranker
    pub fn reranker(mut self, reranker: Arc<dyn RerankModel>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Supply an LLM adapter (fact extraction, gists)
    pub fn llm(mut self, llm: Arc<dyn LlmAdapter>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Install extension hooks
    pub fn hooks(mut self, hooks: ExtensionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Install a trace callback invoked on completion of every operation
    pub fn on_trace(mut self, on_trace: TraceCallback) -> Self {
        self.on_trace = Some(on_trace);
        self
    }

    /// Open the store and assemble the instance
    pub fn build(self) -> Result<Hindsight> {
        let config = self.config;
        config.validate()?;

        let embedder: Arc<dyn Embedder> = match self.embedder {
            Some(embedder) => embedder,
            None => {
                let url = config.embed_url.clone().ok_or_else(|| {
                    HindsightError::InvalidInput(
                        "no embedder configured: set HINDSIGHT_TEI_EMBED_URL or supply one via the builder"
                            .to_string(),
                    )
                })?;
                Arc::new(TeiClient::new(
                    url,
                    config.tei_api_key.clone(),
                    config.embedding_model.clone(),
                    config.embedding_dimensions,
                ))
            }
        };
        if embedder.dimensions() != config.embedding_dimensions {
            return Err(HindsightError::InvalidInput(format!(
                "embedder dimension {} does not match configured embeddingDimensions {}",
                embedder.dimensions(),
                config.embedding_dimensions
            )));
        }

        let reranker: Option<Arc<dyn RerankModel>> = self.reranker.or_else(|| {
            config.rerank_url.as_ref().map(|url| {
                Arc::new(TeiRerankClient::new(
                    url.clone(),
                    config.tei_api_key.clone(),
                    config.embedding_model.clone(),
                    config.rerank_batch_size,
                    config.rerank_max_concurrent,
                )) as Arc<dyn RerankModel>
            })
        });

        let store = Arc::new(GraphStore::new(config.db_path.clone())?);

        let mut index = VectorIndex::new(config.embedding_dimensions);
        for (id, vector) in store.load_all_embeddings()? {
            if let Err(e) = index.add(&id, &vector) {
                tracing::warn!("skipping stored embedding for {}: {}", id, e);
            }
        }
        tracing::info!("vector index loaded with {} embeddings", index.len());

        let queue = OperationQueue::new(store.clone(), config.rerank_max_concurrent);
        let gists = GistService::new(self.llm.clone(), config.rerank_max_concurrent);

        // SAFETY: 128 is non-zero
        let query_cache = Mutex::new(LruCache::new(NonZeroUsize::new(128).expect("non-zero")));

        Ok(Hindsight {
            config,
            store,
            index: Mutex::new(index),
            embedder,
            reranker,
            llm: self.llm,
            gists,
            queue,
            hooks: self.hooks,
            on_trace: self.on_trace,
            query_cache,
        })
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Embedded memory engine instance
pub struct Hindsight {
    pub(crate) config: HindsightConfig,
    pub(crate) store: Arc<GraphStore>,
    pub(crate) index: Mutex<VectorIndex>,
    pub(crate) embedder: Arc<dyn Embedder>,
    pub(crate) reranker: Option<Arc<dyn RerankModel>>,
    pub(crate) llm: Option<Arc<dyn LlmAdapter>>,
    pub(crate) gists: GistService,
    pub(crate) queue: OperationQueue,
    pub(crate) hooks: ExtensionHooks,
    pub(crate) on_trace: Option<TraceCallback>,
    /// LRU cache for query embeddings to avoid re-embedding repeated queries
    pub(crate) query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl Hindsight {
    /// Start building an instance with the given configuration
    pub fn builder(config: HindsightConfig) -> HindsightBuilder {
        HindsightBuilder {
            config,
            embedder: None,
            reranker: None,
            llm: None,
            hooks: ExtensionHooks::default(),
            on_trace: None,
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &HindsightConfig {
        &self.config
    }

    pub(crate) fn emit_trace(
        &self,
        operation: &str,
        bank_id: &str,
        started_at: i64,
        metadata: serde_json::Value,
    ) {
        if let Some(on_trace) = &self.on_trace {
            on_trace(TraceEvent {
                operation: operation.to_string(),
                bank_id: bank_id.to_string(),
                started_at,
                duration_ms: (now_ms() - started_at).max(0),
                metadata,
            });
        }
    }

    /// Embed a recall query through the LRU cache
    pub(crate) async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        {
            let mut cache = self.query_cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(vector) = cache.get(text) {
                return Ok(vector.clone());
            }
        }
        let vector = self.embedder.embed(text).await?;
        if vector.len() != self.config.embedding_dimensions {
            return Err(HindsightError::InvalidInput(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.config.embedding_dimensions,
                vector.len()
            )));
        }
        let mut cache = self.query_cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(text.to_string(), vector.clone());
        Ok(vector)
    }

    // ========================================================================
    // BANK CRUD
    // ========================================================================

    /// Create a bank
    pub fn create_bank(
        &self,
        name: &str,
        config: Option<BankConfig>,
        disposition: Option<Disposition>,
        mission: Option<String>,
    ) -> Result<Bank> {
        if name.trim().is_empty() {
            return Err(HindsightError::InvalidInput(
                "bank name must not be empty".to_string(),
            ));
        }
        let config = config.unwrap_or_default();
        if !(0.0..=1.0).contains(&config.dedup_threshold) {
            return Err(HindsightError::InvalidInput(format!(
                "dedupThreshold must be in [0, 1], got {}",
                config.dedup_threshold
            )));
        }
        let started_at = now_ms();
        let bank = Bank {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            config,
            disposition: disposition.unwrap_or_default(),
            mission,
            created_at: started_at,
            updated_at: started_at,
        };
        let ctx = self.hooks.begin("createBank", &bank.id)?;
        self.store.insert_bank(&bank)?;
        self.hooks
            .complete(&ctx, &serde_json::json!({ "bankId": bank.id }));
        self.emit_trace("createBank", &bank.id, started_at, serde_json::json!({}));
        Ok(bank)
    }

    /// List every bank
    pub fn list_banks(&self) -> Result<Vec<Bank>> {
        self.store.list_banks()
    }

    /// Fetch a bank; `None` when unknown
    pub fn get_bank_by_id(&self, bank_id: &str) -> Result<Option<Bank>> {
        self.store.get_bank(bank_id)
    }

    pub(crate) fn require_bank(&self, bank_id: &str) -> Result<Bank> {
        self.store
            .get_bank(bank_id)?
            .ok_or_else(|| HindsightError::NotFound(format!("bank {}", bank_id)))
    }

    /// Update bank fields; unspecified fields keep their values
    pub fn update_bank(
        &self,
        bank_id: &str,
        name: Option<String>,
        config: Option<BankConfig>,
        disposition: Option<Disposition>,
        mission: Option<Option<String>>,
    ) -> Result<Bank> {
        let mut bank = self.require_bank(bank_id)?;
        if let Some(name) = name {
            bank.name = name;
        }
        if let Some(config) = config {
            if !(0.0..=1.0).contains(&config.dedup_threshold) {
                return Err(HindsightError::InvalidInput(format!(
                    "dedupThreshold must be in [0, 1], got {}",
                    config.dedup_threshold
                )));
            }
            bank.config = config;
        }
        if let Some(disposition) = disposition {
            bank.disposition = disposition;
        }
        if let Some(mission) = mission {
            bank.mission = mission;
        }
        bank.updated_at = now_ms();
        self.store.update_bank(&bank)?;
        Ok(bank)
    }

    /// Delete a bank and everything in it
    pub fn delete_bank(&self, bank_id: &str) -> Result<bool> {
        let started_at = now_ms();
        let ctx = self.hooks.begin("deleteBank", bank_id)?;
        let ids = self.store.memory_ids_for_bank(bank_id)?;
        let deleted = self.store.delete_bank(bank_id)?;
        if deleted {
            let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
            for id in &ids {
                index.remove(id);
            }
        }
        self.hooks
            .complete(&ctx, &serde_json::json!({ "deleted": deleted }));
        self.emit_trace(
            "deleteBank",
            bank_id,
            started_at,
            serde_json::json!({ "memories": ids.len() }),
        );
        Ok(deleted)
    }

    /// Aggregate statistics for a bank
    pub fn get_bank_stats(&self, bank_id: &str) -> Result<BankStats> {
        self.require_bank(bank_id)?;
        self.store.bank_stats(bank_id)
    }

    // ========================================================================
    // ENTITY CRUD
    // ========================================================================

    /// List a bank's entities
    pub fn list_entities(&self, bank_id: &str, limit: i64, offset: i64) -> Result<Vec<Entity>> {
        self.require_bank(bank_id)?;
        self.store.list_entities(bank_id, limit, offset)
    }

    /// Fetch an entity; `None` when unknown
    pub fn get_entity(&self, entity_id: &str) -> Result<Option<Entity>> {
        self.store.get_entity(entity_id)
    }

    /// Update an entity's description and/or type
    pub fn update_entity(
        &self,
        entity_id: &str,
        description: Option<&str>,
        entity_type: Option<EntityType>,
    ) -> Result<Entity> {
        self.store
            .update_entity(entity_id, description, entity_type, now_ms())
    }

    // ========================================================================
    // MEMORY CRUD
    // ========================================================================

    /// List a bank's memory units
    pub fn list_memory_units(
        &self,
        bank_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MemoryUnit>> {
        self.require_bank(bank_id)?;
        self.store.list_memory_units(bank_id, limit, offset)
    }

    /// Fetch a memory unit; `None` when unknown
    pub fn get_memory_unit(&self, memory_id: &str) -> Result<Option<MemoryUnit>> {
        self.store.get_memory(memory_id)
    }

    /// Delete a memory unit (and its embedding)
    pub fn delete_memory_unit(&self, memory_id: &str) -> Result<bool> {
        let deleted = self.store.delete_memory(memory_id)?;
        if deleted {
            let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
            index.remove(memory_id);
        }
        Ok(deleted)
    }

    /// Routing decision audit rows for a bank
    pub fn list_decisions(&self, bank_id: &str) -> Result<Vec<ReconsolidationDecision>> {
        self.store.list_decisions(bank_id)
    }

    // ========================================================================
    // VISUAL MEMORIES
    // ========================================================================

    /// Store a visual memory description
    pub fn add_visual_memory(
        &self,
        bank_id: &str,
        description: &str,
        media_ref: Option<&str>,
    ) -> Result<String> {
        if description.trim().is_empty() {
            return Err(HindsightError::InvalidInput(
                "visual memory description must not be empty".to_string(),
            ));
        }
        self.require_bank(bank_id)?;
        self.store
            .insert_visual(bank_id, description, media_ref, now_ms())
    }

    // ========================================================================
    // GISTS
    // ========================================================================

    /// Generate (or regenerate) a memory's gist and persist it.
    ///
    /// Short content is summarised inline; long content returns the
    /// truncation fallback immediately while the LLM gist lands on the row
    /// asynchronously.
    pub async fn generate_gist(self: &Arc<Self>, memory_id: &str) -> Result<String> {
        let memory = self
            .store
            .get_memory(memory_id)?
            .ok_or_else(|| HindsightError::NotFound(format!("memory {}", memory_id)))?;

        let engine = self.clone();
        let id = memory_id.to_string();
        let gist = self
            .gists
            .gist(
                &memory.content,
                Some(Arc::new(move |gist: String| {
                    if let Err(e) = engine.store.update_gist(&id, &gist) {
                        tracing::warn!("failed to store async gist for {}: {}", id, e);
                    }
                })),
            )
            .await;
        self.store.update_gist(memory_id, &gist)?;
        Ok(gist)
    }

    // ========================================================================
    // LOCATION
    // ========================================================================

    /// Record that memories were touched at a path, updating co-access
    /// associations within the session window.
    pub fn location_record(
        &self,
        bank_id: &str,
        raw_path: &str,
        memory_ids: &[String],
        scope: Option<&crate::model::Scope>,
        activity: crate::model::ActivityType,
    ) -> Result<crate::model::LocationPath> {
        if raw_path.trim().is_empty() {
            return Err(HindsightError::InvalidInput(
                "rawPath must not be empty".to_string(),
            ));
        }
        self.require_bank(bank_id)?;
        let started_at = now_ms();
        let scope = crate::model::resolve_scope(scope, None);
        let path = crate::location::record_access(
            &self.store,
            bank_id,
            raw_path,
            memory_ids,
            &scope,
            activity,
            started_at,
        )?;
        self.emit_trace(
            "locationRecord",
            bank_id,
            started_at,
            serde_json::json!({ "pathId": path.id, "memories": memory_ids.len() }),
        );
        Ok(path)
    }

    // ========================================================================
    // ASYNC OPERATIONS
    // ========================================================================

    /// Queue an asynchronous retain. The payload is the serialized request;
    /// duplicates of a live item return the existing id.
    pub fn submit_async_retain(
        self: &Arc<Self>,
        bank_id: &str,
        payload: &AsyncRetainPayload,
    ) -> Result<SubmitReceipt> {
        self.require_bank(bank_id)?;
        let payload_json = serde_json::to_string(payload)
            .map_err(|e| HindsightError::InvalidInput(format!("unserializable payload: {}", e)))?;
        let receipt = self.queue.submit(bank_id, "retain", &payload_json, now_ms())?;
        if !receipt.deduplicated {
            self.spawn_worker(receipt.operation_id.clone());
        }
        Ok(receipt)
    }

    /// Queue an asynchronous consolidation pass
    pub fn submit_async_consolidation(self: &Arc<Self>, bank_id: &str) -> Result<SubmitReceipt> {
        self.require_bank(bank_id)?;
        let receipt = self.queue.submit(bank_id, "consolidation", "{}", now_ms())?;
        if !receipt.deduplicated {
            self.spawn_worker(receipt.operation_id.clone());
        }
        Ok(receipt)
    }

    /// Queue an asynchronous mental-model refresh
    pub fn submit_async_refresh_mental_model(
        self: &Arc<Self>,
        bank_id: &str,
        model_id: &str,
    ) -> Result<SubmitReceipt> {
        self.require_bank(bank_id)?;
        let payload = serde_json::json!({ "modelId": model_id }).to_string();
        let receipt = self
            .queue
            .submit(bank_id, "refresh_mental_model", &payload, now_ms())?;
        if !receipt.deduplicated {
            self.spawn_worker(receipt.operation_id.clone());
        }
        Ok(receipt)
    }

    /// Cancel a queued operation
    pub fn cancel_operation(&self, operation_id: &str) -> Result<bool> {
        self.queue.cancel(operation_id, now_ms())
    }

    /// Fetch an operation row
    pub fn get_operation(&self, operation_id: &str) -> Result<Option<OperationRecord>> {
        self.queue.get(operation_id)
    }

    fn spawn_worker(self: &Arc<Self>, operation_id: String) {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.run_operation(&operation_id).await {
                tracing::warn!("operation {} worker error: {}", operation_id, e);
            }
        });
    }

    async fn run_operation(self: &Arc<Self>, operation_id: &str) -> Result<()> {
        let _permit = self.queue.acquire_worker().await?;
        let cancel = self.queue.cancel_flag(operation_id);

        if !self.queue.claim(operation_id, now_ms())? {
            // Cancelled (or raced) before processing started
            return Ok(());
        }
        let Some(record) = self.queue.get(operation_id)? else {
            return Ok(());
        };

        let outcome = self.execute_operation(&record, &cancel).await;

        // A cancelled operation must not commit its terminal write as a
        // success; it lands in the terminal cancelled state instead.
        let (status, error) = match &outcome {
            _ if cancel.load(std::sync::atomic::Ordering::SeqCst) => {
                (OperationStatus::Cancelled, None)
            }
            Ok(()) => (OperationStatus::Completed, None),
            Err(e) => (OperationStatus::Failed, Some(e.to_string())),
        };
        self.queue
            .finish(operation_id, status, error.as_deref(), now_ms())?;
        Ok(())
    }

    async fn execute_operation(
        self: &Arc<Self>,
        record: &OperationRecord,
        cancel: &Arc<std::sync::atomic::AtomicBool>,
    ) -> Result<()> {
        if cancel.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(HindsightError::Cancelled);
        }
        match record.kind.as_str() {
            "retain" => {
                let payload: AsyncRetainPayload = serde_json::from_str(&record.payload)
                    .map_err(|e| {
                        HindsightError::InvalidInput(format!("bad retain payload: {}", e))
                    })?;
                self.retain_with_cancel(
                    &record.bank_id,
                    payload.content,
                    payload.options.unwrap_or_default(),
                    Some(cancel.clone()),
                )
                .await?;
                Ok(())
            }
            // Consolidation and mental-model refresh bodies live above the
            // core; the queue item is tracked to completion either way.
            "consolidation" | "refresh_mental_model" => Ok(()),
            other => Err(HindsightError::InvalidInput(format!(
                "unknown operation kind {}",
                other
            ))),
        }
    }
}

/// Serialized work item for an async retain
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AsyncRetainPayload {
    /// Retain content
    pub content: crate::model::RetainContentInput,
    /// Retain options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<crate::retain::RetainOptions>,
}
