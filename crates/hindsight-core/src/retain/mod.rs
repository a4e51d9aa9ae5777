//! Retain pipeline.
//!
//! Transforms a text input (or caller-supplied fact list) into durable
//! memory units, entities, and links, emitting exactly one routing decision
//! per incoming fact. Facts apply sequentially: fact `i` is fully applied -
//! decision, links, entity upsert - before fact `i+1` is routed, so
//! `mentioned_at` monotonicity and backward-looking causal indices hold
//! without locks. Each fact's application runs under a store savepoint.

mod links;
mod router;

pub use links::{
    causal_link, compute_entity_links, compute_temporal_links, temporal_weight,
    MAX_TEMPORAL_LINKS, MIN_TEMPORAL_WEIGHT, TEMPORAL_WINDOW_MS,
};
pub use router::{
    classify, detect_conflicts, normalize_value, route_fact, RouterVerdict,
    RECONSOLIDATE_THRESHOLD,
};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{index_error, now_ms, Hindsight};
use crate::error::{HindsightError, Result};
use crate::extract::extract_facts;
use crate::model::{
    canonicalize_entity_name, resolve_scope, Entity, ExtractedFact, ExtractionMode, MemoryLink,
    MemoryUnit, MemoryVersion, ReconRoute, ReconsolidationDecision, RetainContentInput, Scope,
};
use crate::ops::content_hash;
use crate::storage::ReconsolidateUpdate;

/// Encoding-strength increment applied by a reinforce route
const REINFORCE_STRENGTH_INCREMENT: f64 = 0.1;

/// Routing policy version stamped on every decision row
pub const ROUTING_POLICY_VERSION: &str = "v1";

// ============================================================================
// OPTIONS AND RESULTS
// ============================================================================

/// Anchor instant accepted as epoch milliseconds or an RFC3339 string
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventDate {
    /// Epoch milliseconds
    Millis(i64),
    /// RFC3339 / ISO-8601 timestamp
    Iso(String),
}

impl EventDate {
    /// Resolve to epoch milliseconds
    pub fn resolve(&self) -> Result<i64> {
        match self {
            EventDate::Millis(ms) => Ok(*ms),
            EventDate::Iso(text) => DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.timestamp_millis())
                .map_err(|e| {
                    HindsightError::InvalidInput(format!("invalid eventDate {:?}: {}", text, e))
                }),
        }
    }
}

/// Options for a retain call. Unknown fields are rejected at the API
/// boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RetainOptions {
    /// Pre-extracted facts, used verbatim (skips the LLM)
    pub facts: Option<Vec<ExtractedFact>>,
    /// Opaque metadata stored as canonical JSON text, never introspected
    pub metadata: Option<serde_json::Value>,
    /// Tags applied to every produced memory
    pub tags: Vec<String>,
    /// Extraction context hint handed to the LLM
    pub context: Option<String>,
    /// Anchor instant for `mentioned_at` assignment (default now)
    pub event_date: Option<EventDate>,
    /// Source document id
    pub document_id: Option<String>,
    /// Extraction mode override
    pub mode: Option<ExtractionMode>,
    /// Dedup threshold override (default: bank config)
    pub dedup_threshold: Option<f64>,
    /// Request a consolidation pass after ingest
    pub consolidate: Option<bool>,
    /// Scope tags applied to every produced memory
    pub scope: Option<Scope>,
}

/// Result of a retain call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetainResult {
    /// Materialised memories, one per fact, in fact order
    pub memories: Vec<MemoryUnit>,
    /// Entities touched (upserted or re-mentioned)
    pub entities: Vec<Entity>,
    /// Derived links written
    pub links: Vec<MemoryLink>,
}

/// One item of a retain batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RetainBatchItem {
    /// Item content
    pub content: RetainContentInput,
    /// Item options
    #[serde(default)]
    pub options: Option<RetainOptions>,
}

/// Per-item outcome of a retain batch; a failed item carries its error and
/// never fails siblings
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetainBatchItemResult {
    /// Successful result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RetainResult>,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// PIPELINE
// ============================================================================

impl Hindsight {
    /// Ingest content into a bank: extract facts, route each through the
    /// reconsolidation router, persist, and derive links.
    pub async fn retain(
        &self,
        bank_id: &str,
        content: RetainContentInput,
        options: RetainOptions,
    ) -> Result<RetainResult> {
        self.retain_with_cancel(bank_id, content, options, None).await
    }

    pub(crate) async fn retain_with_cancel(
        &self,
        bank_id: &str,
        content: RetainContentInput,
        options: RetainOptions,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<RetainResult> {
        let started_at = now_ms();
        let ctx = self.hooks.begin("retain", bank_id)?;
        let (result, _) = self
            .retain_inner(bank_id, content, options, cancel, 0)
            .await?;
        self.hooks.complete(
            &ctx,
            &serde_json::json!({
                "memories": result.memories.len(),
                "links": result.links.len(),
            }),
        );
        self.emit_trace(
            "retain",
            bank_id,
            started_at,
            serde_json::json!({ "memories": result.memories.len() }),
        );
        Ok(result)
    }

    /// Ingest several items, sequential per item to preserve `mentioned_at`
    /// ordering. A single item's extraction failure is captured per item.
    pub async fn retain_batch(
        &self,
        bank_id: &str,
        items: Vec<RetainBatchItem>,
    ) -> Result<Vec<RetainBatchItemResult>> {
        let started_at = now_ms();
        let ctx = self.hooks.begin("retainBatch", bank_id)?;
        let mut results = Vec::with_capacity(items.len());
        let mut mention_offset: i64 = 0;
        for item in items {
            match self
                .retain_inner(
                    bank_id,
                    item.content,
                    item.options.unwrap_or_default(),
                    None,
                    mention_offset,
                )
                .await
            {
                Ok((result, fact_count)) => {
                    mention_offset += fact_count as i64;
                    results.push(RetainBatchItemResult {
                        result: Some(result),
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!("retain batch item failed: {}", e);
                    results.push(RetainBatchItemResult {
                        result: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        let succeeded = results.iter().filter(|r| r.result.is_some()).count();
        self.hooks
            .complete(&ctx, &serde_json::json!({ "items": results.len() }));
        self.emit_trace(
            "retainBatch",
            bank_id,
            started_at,
            serde_json::json!({ "items": results.len(), "succeeded": succeeded }),
        );
        Ok(results)
    }

    async fn retain_inner(
        &self,
        bank_id: &str,
        content: RetainContentInput,
        options: RetainOptions,
        cancel: Option<Arc<AtomicBool>>,
        mention_offset: i64,
    ) -> Result<(RetainResult, usize)> {
        let mut bank = self.require_bank(bank_id)?;
        if let Some(mode) = options.mode {
            bank.config.extraction_mode = mode;
        }
        let dedup_threshold = options
            .dedup_threshold
            .unwrap_or(bank.config.dedup_threshold);
        if !(0.0..=1.0).contains(&dedup_threshold) {
            return Err(HindsightError::InvalidInput(format!(
                "dedupThreshold must be in [0, 1], got {}",
                dedup_threshold
            )));
        }

        // 1. Resolve scope; the result is stamped on every produced memory.
        let scope = resolve_scope(options.scope.as_ref(), None);

        // 2. Extract facts. Caller-supplied facts are used verbatim: an
        // empty-content entry is an input error, never a silent drop, so
        // causal target indices always mean what the caller wrote.
        let facts: Vec<ExtractedFact> = match &options.facts {
            Some(facts) => {
                if let Some(i) = facts.iter().position(|f| f.content.trim().is_empty()) {
                    return Err(HindsightError::InvalidInput(format!(
                        "facts[{}] has empty content",
                        i
                    )));
                }
                let mut facts = facts.clone();
                crate::extract::validate_causal_relations(&mut facts);
                facts
            }
            None => {
                if content.is_empty() {
                    return Err(HindsightError::InvalidInput(
                        "content is empty and no pre-extracted facts were supplied".to_string(),
                    ));
                }
                let llm = self.llm.as_ref().ok_or_else(|| {
                    HindsightError::InvalidInput(
                        "no LLM adapter configured; supply pre-extracted facts".to_string(),
                    )
                })?;
                // extract_facts sanitizes its own output: empty entries are
                // pruned with causal targets remapped to the retained
                // positions.
                extract_facts(
                    llm.as_ref(),
                    &bank,
                    &content.as_text(),
                    options.context.as_deref(),
                    self.config.retain_max_completion_tokens,
                    self.config.retain_chunk_size,
                )
                .await?
            }
        };
        if facts.is_empty() {
            return Err(HindsightError::InvalidInput(
                "no facts to retain".to_string(),
            ));
        }

        // 3. Assign mentioned_at: anchor + batch offset + fact index.
        let now = now_ms();
        let anchor = match &options.event_date {
            Some(event_date) => event_date.resolve()?,
            None => now,
        };
        let event_date = options.event_date.as_ref().map(|e| e.resolve()).transpose()?;

        // 4. Embed every fact up front (batch endpoint when available).
        let contents: Vec<String> = facts.iter().map(|f| f.content.clone()).collect();
        self.check_cancelled(&cancel)?;
        let vectors = self.embedder.embed_batch(&contents).await?;
        if vectors.len() != facts.len() {
            return Err(HindsightError::InvalidInput(format!(
                "embedder returned {} vectors for {} facts",
                vectors.len(),
                facts.len()
            )));
        }
        for vector in &vectors {
            if vector.len() != self.config.embedding_dimensions {
                return Err(HindsightError::InvalidInput(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.config.embedding_dimensions,
                    vector.len()
                )));
            }
        }

        let metadata_json = options.metadata.as_ref().map(|m| m.to_string());
        let mut bank_memory_ids = self.store.memory_ids_for_bank(bank_id)?;

        let mut memories: Vec<MemoryUnit> = Vec::with_capacity(facts.len());
        let mut applied_ids: Vec<String> = Vec::with_capacity(facts.len());
        let mut all_links: Vec<MemoryLink> = Vec::new();
        let mut touched_entities: HashMap<String, Entity> = HashMap::new();

        // 5-8. Route and apply sequentially; fact i is fully applied before
        // fact i+1 is routed so router decisions see live state.
        for (i, fact) in facts.iter().enumerate() {
            self.check_cancelled(&cancel)?;
            let mentioned_at = anchor + mention_offset + i as i64;
            let vector = &vectors[i];

            let candidate = {
                let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
                index
                    .search(vector, 1, |id| bank_memory_ids.contains(id))
                    .map_err(index_error)?
                    .into_iter()
                    .next()
                    .map(|(id, similarity)| (id, similarity as f64))
            };

            let conflict_keys = match &candidate {
                Some((candidate_id, _)) => {
                    let candidate_entities: Vec<(String, crate::model::EntityType)> = self
                        .store
                        .entities_for_memory(candidate_id)?
                        .into_iter()
                        .map(|e| (e.name, e.entity_type))
                        .collect();
                    let incoming: Vec<(String, crate::model::EntityType)> = fact
                        .entities
                        .iter()
                        .map(|e| (e.name.clone(), e.entity_type))
                        .collect();
                    detect_conflicts(&candidate_entities, &incoming)
                }
                None => vec![],
            };

            let verdict = route_fact(candidate, conflict_keys, dedup_threshold);
            let applied_id = self.apply_verdict(
                &bank,
                &scope,
                &options,
                fact,
                &verdict,
                vector,
                mentioned_at,
                event_date,
                metadata_json.as_deref(),
                now,
            )?;

            // Entity upsert + junction rows.
            let mut fact_entity_ids: Vec<String> = Vec::new();
            for fact_entity in &fact.entities {
                let canonical = canonicalize_entity_name(&fact_entity.name);
                if canonical.is_empty() {
                    continue;
                }
                let entity = self.store.upsert_entity(
                    bank_id,
                    &fact_entity.name,
                    &canonical,
                    fact_entity.entity_type,
                    now,
                )?;
                fact_entity_ids.push(entity.id.clone());
                touched_entities.insert(entity.id.clone(), entity);
            }
            if verdict.route == ReconRoute::Reconsolidate {
                self.store
                    .replace_memory_entities(&applied_id, &fact_entity_ids)?;
            } else {
                for entity_id in &fact_entity_ids {
                    self.store.link_memory_entity(&applied_id, entity_id)?;
                }
            }

            // Derived links only for routes that changed the graph.
            if verdict.route != ReconRoute::Reinforce {
                let own_entities: HashSet<String> = fact_entity_ids.iter().cloned().collect();
                let mut links = compute_entity_links(
                    &self.store,
                    bank_id,
                    &applied_id,
                    fact_entity_ids.len(),
                    now,
                )?;
                links.extend(compute_temporal_links(
                    &self.store,
                    bank_id,
                    &applied_id,
                    mentioned_at,
                    &own_entities,
                    now,
                )?);
                for relation in &fact.causal_relations {
                    let target_id = &applied_ids[relation.target_index];
                    if target_id == &applied_id {
                        continue;
                    }
                    links.push(causal_link(
                        bank_id,
                        &applied_id,
                        target_id,
                        relation.strength,
                        now,
                    ));
                }
                for link in &links {
                    self.store.insert_link(link)?;
                }
                all_links.extend(links);
            }

            bank_memory_ids.insert(applied_id.clone());
            applied_ids.push(applied_id.clone());
            let memory = self
                .store
                .get_memory(&applied_id)?
                .ok_or_else(|| HindsightError::NotFound(format!("memory {}", applied_id)))?;
            memories.push(memory);
        }

        let fact_count = facts.len();
        let mut entities: Vec<Entity> = touched_entities.into_values().collect();
        entities.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));

        Ok((
            RetainResult {
                memories,
                entities,
                links: all_links,
            },
            fact_count,
        ))
    }

    /// Apply one routing verdict under a savepoint and write its decision
    /// row. Returns the id of the memory the fact landed on.
    #[allow(clippy::too_many_arguments)]
    fn apply_verdict(
        &self,
        bank: &crate::model::Bank,
        scope: &Scope,
        options: &RetainOptions,
        fact: &ExtractedFact,
        verdict: &RouterVerdict,
        vector: &[f32],
        mentioned_at: i64,
        event_date: Option<i64>,
        metadata_json: Option<&str>,
        now: i64,
    ) -> Result<String> {
        let decision_base = |applied_memory_id: String| ReconsolidationDecision {
            id: Uuid::new_v4().to_string(),
            bank_id: bank.id.clone(),
            memory_hash: content_hash(&[fact.content.as_str()]),
            candidate_memory_id: verdict.candidate_id.clone(),
            candidate_score: verdict.candidate_score,
            route: verdict.route,
            conflict_detected: verdict.conflict_detected,
            conflict_keys: verdict.conflict_keys.clone(),
            policy_version: ROUTING_POLICY_VERSION.to_string(),
            applied_memory_id,
            created_at: now,
        };

        let (occurred_start, occurred_end) = normalize_occurred(fact);

        match verdict.route {
            ReconRoute::Reinforce => {
                let candidate_id = verdict
                    .candidate_id
                    .clone()
                    .ok_or_else(|| HindsightError::Init("reinforce without candidate".into()))?;
                self.store.apply_reinforce(
                    &candidate_id,
                    REINFORCE_STRENGTH_INCREMENT,
                    now,
                    &decision_base(candidate_id.clone()),
                )?;
                Ok(candidate_id)
            }
            ReconRoute::Reconsolidate => {
                let candidate_id = verdict
                    .candidate_id
                    .clone()
                    .ok_or_else(|| HindsightError::Init("reconsolidate without candidate".into()))?;
                let previous = self
                    .store
                    .get_memory(&candidate_id)?
                    .ok_or_else(|| HindsightError::NotFound(format!("memory {}", candidate_id)))?;
                let version = MemoryVersion {
                    id: Uuid::new_v4().to_string(),
                    versioned_memory_id: candidate_id.clone(),
                    previous_content: previous.content.clone(),
                    new_content: fact.content.clone(),
                    reason: if verdict.conflict_detected {
                        "entity conflict".to_string()
                    } else {
                        "content drift".to_string()
                    },
                    created_at: now,
                };
                let mut tags: Vec<String> = fact.tags.clone();
                for tag in &options.tags {
                    if !tags.contains(tag) {
                        tags.push(tag.clone());
                    }
                }
                let update = ReconsolidateUpdate {
                    content: fact.content.clone(),
                    fact_type: fact.fact_type,
                    confidence: fact.confidence.clamp(0.0, 1.0),
                    tags,
                    occurred_start,
                    occurred_end,
                    updated_at: now,
                };
                self.store.apply_reconsolidate(
                    &version,
                    &update,
                    vector,
                    &self.config.embedding_model,
                    &decision_base(candidate_id.clone()),
                )?;
                let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
                index.add(&candidate_id, vector).map_err(index_error)?;
                Ok(candidate_id)
            }
            ReconRoute::NewTrace => {
                let mut tags: Vec<String> = fact.tags.clone();
                for tag in &options.tags {
                    if !tags.contains(tag) {
                        tags.push(tag.clone());
                    }
                }
                let memory = MemoryUnit {
                    id: Uuid::new_v4().to_string(),
                    bank_id: bank.id.clone(),
                    content: fact.content.clone(),
                    fact_type: fact.fact_type,
                    confidence: fact.confidence.clamp(0.0, 1.0),
                    entities: vec![],
                    tags,
                    scope_profile: scope.profile.clone(),
                    scope_project: scope.project.clone(),
                    scope_session: scope.session.clone(),
                    document_id: options.document_id.clone(),
                    event_date,
                    mentioned_at,
                    occurred_start,
                    occurred_end,
                    encoding_strength: 1.0,
                    // Encoding counts as the first access
                    access_count: 1,
                    last_accessed: Some(now),
                    gist: None,
                    metadata: metadata_json.map(|m| m.to_string()),
                    created_at: now,
                    updated_at: now,
                };
                self.store.apply_new_trace(
                    &memory,
                    vector,
                    &self.config.embedding_model,
                    &decision_base(memory.id.clone()),
                )?;
                let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
                index.add(&memory.id, vector).map_err(index_error)?;
                Ok(memory.id)
            }
        }
    }

    fn check_cancelled(&self, cancel: &Option<Arc<AtomicBool>>) -> Result<()> {
        if let Some(flag) = cancel {
            if flag.load(Ordering::SeqCst) {
                return Err(HindsightError::Cancelled);
            }
        }
        Ok(())
    }
}

/// Drop an inverted occurred range instead of failing the fact
fn normalize_occurred(fact: &ExtractedFact) -> (Option<i64>, Option<i64>) {
    match (fact.occurred_start, fact.occurred_end) {
        (Some(start), Some(end)) if start > end => {
            tracing::debug!("dropping inverted occurred range {}..{}", start, end);
            (None, None)
        }
        pair => pair,
    }
}
