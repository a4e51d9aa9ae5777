//! Recall pipeline.
//!
//! Runs up to four retrieval strategies in parallel, fuses their rankings
//! with Reciprocal Rank Fusion, optionally reranks with a cross-encoder,
//! hydrates and post-filters candidates in rank order, applies the
//! location-aware boost, and optionally packs the result under a token
//! budget. Read-only with respect to memory content; the only writes are
//! commutative access bookkeeping.

mod cognitive;
mod filters;
mod fusion;
mod rerank;
mod strategies;

pub use cognitive::{
    base_level_activation, cognitive_bonus, probe_activation, ACT_R_DECAY, WM_BOOST, WM_WINDOW_MS,
};
pub use filters::{tags_pass, PostFilter, TagsMatch};
pub use fusion::{min_max_normalize, reciprocal_rank_fusion, FusedCandidate, StrategyHits, RRF_K};
pub use rerank::{apply_rerank, RerankedCandidate};
pub use strategies::{
    default_meta_paths, fulltext_strategy, graph_strategy, semantic_strategy, temporal_strategy,
    Direction, EdgeCache, MetaPath, MetaPathStep, GRAPH_HOP_DECAY, GRAPH_SEED_COUNT,
};

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{now_ms, Hindsight};
use crate::error::{HindsightError, Result};
use crate::extract::{extract_time_range, TimeRange};
use crate::location::{
    detect_location_signals, location_boost, resolve_signals_to_paths, LocationBoost,
};
use crate::model::{
    ActivityType, Entity, FactType, LocationAccessContext, MemoryUnit, Scope, ScopeMode,
};
use crate::pack::{estimate_tokens, pack_context, PackCandidate, PackResult};

/// Default result limit
const DEFAULT_LIMIT: usize = 10;

/// Strategy candidate multiplier: each strategy fetches 3x the final limit
const CANDIDATE_MULTIPLIER: usize = 3;

/// Hard cap on the visual share of the returned candidate set
const VISUAL_MAX_SHARE_CAP: f64 = 0.20;

/// Default chunk size for `include_chunks`
const DEFAULT_CHUNK_TOKENS: usize = 120;

/// Recency scale for the trace's recency field (30 days)
const RECENCY_SCALE_MS: f64 = 30.0 * 24.0 * 3_600_000.0;

// ============================================================================
// OPTION TYPES
// ============================================================================

/// A retrieval strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    /// Embedding KNN
    Semantic,
    /// FTS5/BM25
    Fulltext,
    /// Meta-path graph expansion
    Graph,
    /// Time-range recency
    Temporal,
}

impl RetrievalMethod {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMethod::Semantic => "semantic",
            RetrievalMethod::Fulltext => "fulltext",
            RetrievalMethod::Graph => "graph",
            RetrievalMethod::Temporal => "temporal",
        }
    }

    /// All four strategies
    pub fn all() -> Vec<RetrievalMethod> {
        vec![
            RetrievalMethod::Semantic,
            RetrievalMethod::Fulltext,
            RetrievalMethod::Graph,
            RetrievalMethod::Temporal,
        ]
    }
}

/// Scoring mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    /// RRF + optional rerank + location boost
    #[default]
    Hybrid,
    /// Hybrid augmented with ACT-R activation signals
    Cognitive,
}

/// Options for a recall call. Unknown fields are rejected at the API
/// boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RecallOptions {
    /// Maximum results (default 10)
    pub limit: usize,
    /// Token budget for hydration halt and context packing
    pub token_budget: Option<usize>,
    /// Alias budget; `token_budget` wins when both are set
    pub max_tokens: Option<usize>,
    /// Minimum confidence post-filter
    pub min_confidence: Option<f64>,
    /// Admitted fact types; empty admits all
    pub fact_types: Vec<FactType>,
    /// Entity-name post-filter (case-insensitive any-match)
    pub entities: Vec<String>,
    /// Explicit time range; unset triggers query auto-extraction
    pub time_range: Option<TimeRange>,
    /// Enabled strategies (default: all)
    pub methods: Option<Vec<RetrievalMethod>>,
    /// Tag filter
    pub tags: Vec<String>,
    /// Tag matching mode
    pub tags_match: TagsMatch,
    /// Scope filter
    pub scope: Option<Scope>,
    /// Scope matching mode
    pub scope_mode: ScopeMode,
    /// Attach the entity-state map
    pub include_entities: bool,
    /// Attach content chunks
    pub include_chunks: bool,
    /// Chunk size in tokens for `include_chunks`
    pub max_chunk_tokens: Option<usize>,
    /// Attach the retrieval trace
    pub enable_trace: bool,
    /// Splice visual memories into the result
    pub include_visual: bool,
    /// Visual share of the candidate set, hard-capped at 0.20
    pub visual_max_share: Option<f64>,
    /// Scoring mode
    pub mode: ScoringMode,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            token_budget: None,
            max_tokens: None,
            min_confidence: None,
            fact_types: vec![],
            entities: vec![],
            time_range: None,
            methods: None,
            tags: vec![],
            tags_match: TagsMatch::Any,
            scope: None,
            scope_mode: ScopeMode::Strict,
            include_entities: false,
            include_chunks: false,
            max_chunk_tokens: None,
            enable_trace: false,
            include_visual: false,
            visual_max_share: None,
            mode: ScoringMode::Hybrid,
        }
    }
}

// ============================================================================
// RESULT TYPES
// ============================================================================

/// One recalled memory with its final score
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredMemory {
    /// The memory
    pub memory: MemoryUnit,
    /// Final combined score
    pub score: f64,
    /// Strategies that surfaced it
    pub sources: Vec<RetrievalMethod>,
}

/// Per-entity aggregation over the returned memories
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    /// The entity
    pub entity: Entity,
    /// Returned memories mentioning it
    pub memory_ids: Vec<String>,
}

/// One content chunk
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentChunk {
    /// Owning memory
    pub memory_id: String,
    /// Chunk ordinal within the memory
    pub index: usize,
    /// Chunk text
    pub text: String,
    /// Token estimate
    pub tokens: usize,
}

/// One spliced visual memory
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualHit {
    /// Visual memory id
    pub id: String,
    /// Description text
    pub description: String,
    /// Term-overlap relevance score
    pub score: f64,
}

/// Fusion and boost fields recorded per candidate when tracing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTrace {
    /// Memory id
    pub id: String,
    /// Raw RRF score
    pub rrf_score: f64,
    /// Min-max normalised RRF score
    pub rrf_normalized: f64,
    /// Sigmoid-normalised cross-encoder score, when reranked
    pub cross_encoder_score_normalized: Option<f64>,
    /// Temporal strategy score, when it contributed
    pub temporal: Option<f64>,
    /// Recency decay of `mentioned_at`
    pub recency: f64,
    /// Final combined score
    pub combined: f64,
    /// Location boost breakdown
    pub location: LocationBoost,
}

/// Retrieval trace
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecallTrace {
    /// Per-strategy wall time in milliseconds
    pub strategy_durations_ms: HashMap<String, i64>,
    /// Per-strategy ranked id lists
    pub strategy_ranks: HashMap<String, Vec<String>>,
    /// Per-candidate fusion fields, in final order
    pub candidates: Vec<CandidateTrace>,
    /// Selected memory ids, in return order
    pub selected: Vec<String>,
    /// Total recall wall time in milliseconds
    pub total_duration_ms: i64,
}

/// Result of a recall call
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResult {
    /// Scored memories, best first
    pub memories: Vec<ScoredMemory>,
    /// The query as given
    pub query: String,
    /// Entity-state map, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<HashMap<String, EntityState>>,
    /// Content chunks, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<ContentChunk>>,
    /// Retrieval trace, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<RecallTrace>,
    /// Spliced visual memories, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_memories: Option<Vec<VisualHit>>,
    /// Packed context, when a token budget was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packed: Option<PackResult>,
}

struct HydratedCandidate {
    memory: MemoryUnit,
    candidate: FusedCandidate,
    cross_encoder_score: Option<f64>,
    boost: LocationBoost,
    entity_names: Vec<String>,
    recency: f64,
    combined: f64,
}

// ============================================================================
// PIPELINE
// ============================================================================

impl Hindsight {
    /// Retrieve memories for a query.
    pub async fn recall(
        &self,
        bank_id: &str,
        query: &str,
        options: RecallOptions,
    ) -> Result<RecallResult> {
        let total_timer = Instant::now();
        let started_at = now_ms();
        let ctx = self.hooks.begin("recall", bank_id)?;
        self.require_bank(bank_id)?;

        if options.limit == 0 {
            return Err(HindsightError::InvalidInput(
                "limit must be at least 1".to_string(),
            ));
        }
        let limit = options.limit;
        let candidate_limit = limit * CANDIDATE_MULTIPLIER;
        let methods = options
            .methods
            .clone()
            .unwrap_or_else(RetrievalMethod::all);
        let enabled = |m: RetrievalMethod| methods.contains(&m);

        // 1. Temporal auto-extraction feeds the temporal strategy only.
        let explicit_range = options.time_range.filter(|r| r.is_bounded());
        let time_range = explicit_range.or_else(|| {
            let now = chrono::Local::now();
            extract_time_range(query, &now)
        });

        let bank_ids = self.store.memory_ids_for_bank(bank_id)?;
        let needs_vector = enabled(RetrievalMethod::Semantic) || enabled(RetrievalMethod::Graph);
        let query_vector = if needs_vector {
            Some(self.embed_query(query).await?)
        } else {
            None
        };

        // 2. Parallel strategies, rejoined deterministically before fusion.
        let mut strategy_hits: Vec<StrategyHits> = Vec::new();
        let mut durations: HashMap<String, i64> = HashMap::new();
        let mut ranks: HashMap<String, Vec<String>> = HashMap::new();

        let semantic_fut = async {
            if !enabled(RetrievalMethod::Semantic) {
                return Ok::<_, HindsightError>(None);
            }
            let timer = Instant::now();
            let vector = query_vector.as_deref().unwrap_or(&[]);
            let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
            let hits = semantic_strategy(&index, &bank_ids, vector, candidate_limit)?;
            Ok(Some((hits, timer.elapsed().as_millis() as i64)))
        };
        let fulltext_fut = async {
            if !enabled(RetrievalMethod::Fulltext) {
                return Ok::<_, HindsightError>(None);
            }
            let timer = Instant::now();
            let tags = (!options.tags.is_empty()).then_some(options.tags.as_slice());
            let hits = fulltext_strategy(&self.store, bank_id, query, candidate_limit, tags)?;
            Ok(Some((hits, timer.elapsed().as_millis() as i64)))
        };
        let temporal_fut = async {
            let Some(range) = &time_range else {
                return Ok::<_, HindsightError>(None);
            };
            if !enabled(RetrievalMethod::Temporal) {
                return Ok(None);
            }
            let timer = Instant::now();
            let hits = temporal_strategy(&self.store, bank_id, range, candidate_limit)?;
            Ok(Some((hits, timer.elapsed().as_millis() as i64)))
        };

        let (semantic, fulltext, temporal) = tokio::join!(semantic_fut, fulltext_fut, temporal_fut);
        let semantic = semantic?;
        let fulltext = fulltext?;
        let temporal = temporal?;

        // Graph expands from the semantic top (or the temporal hits when an
        // explicit range drove retrieval), so it runs after they rejoin.
        let graph = if enabled(RetrievalMethod::Graph) {
            let timer = Instant::now();
            let seeds: Vec<(String, f64)> = match (&explicit_range, &temporal) {
                (Some(_), Some((temporal_hits, _))) if !temporal_hits.is_empty() => {
                    temporal_hits.clone()
                }
                _ => semantic
                    .as_ref()
                    .map(|(hits, _)| hits.iter().take(GRAPH_SEED_COUNT).cloned().collect())
                    .unwrap_or_default(),
            };
            let hits = graph_strategy(&self.store, &seeds, &default_meta_paths(), candidate_limit)?;
            Some((hits, timer.elapsed().as_millis() as i64))
        } else {
            None
        };

        for (method, outcome) in [
            (RetrievalMethod::Semantic, semantic),
            (RetrievalMethod::Fulltext, fulltext),
            (RetrievalMethod::Graph, graph),
            (RetrievalMethod::Temporal, temporal),
        ] {
            if let Some((hits, duration)) = outcome {
                durations.insert(method.as_str().to_string(), duration);
                ranks.insert(
                    method.as_str().to_string(),
                    hits.iter().map(|(id, _)| id.clone()).collect(),
                );
                strategy_hits.push(StrategyHits { method, hits });
            }
        }

        // 3. Reciprocal Rank Fusion.
        let fused = reciprocal_rank_fusion(&strategy_hits);

        // 4. Optional cross-encoder rerank.
        let (ordered, ce_scores): (Vec<FusedCandidate>, HashMap<String, f64>) =
            match &self.reranker {
                Some(model) if !fused.is_empty() => {
                    let ids: Vec<String> = fused.iter().map(|c| c.id.clone()).collect();
                    let content_map = self.store.memory_content_map(&ids)?;
                    let reranked =
                        apply_rerank(model.as_ref(), query, fused, &content_map).await?;
                    let scores = reranked
                        .iter()
                        .map(|r| (r.candidate.id.clone(), r.cross_encoder_score))
                        .collect();
                    (reranked.into_iter().map(|r| r.candidate).collect(), scores)
                }
                _ => (fused, HashMap::new()),
            };

        // 5. Location signals from the query.
        let signals = detect_location_signals(query);
        let resolved = if signals.is_empty() {
            HashMap::new()
        } else {
            resolve_signals_to_paths(&self.store, bank_id, &signals, options.scope.as_ref())?
        };
        let mut query_path_ids: Vec<String> = resolved.values().flatten().cloned().collect();
        query_path_ids.sort();
        query_path_ids.dedup();

        // 6. Hydration and post-filtering in rank order.
        let scope_filter = options.scope.clone().unwrap_or_default();
        let post = PostFilter {
            scope: &scope_filter,
            scope_mode: options.scope_mode,
            min_confidence: options.min_confidence,
            fact_types: &options.fact_types,
            entities: &options.entities,
            tags: &options.tags,
            tags_match: options.tags_match,
        };
        let now = now_ms();
        let query_lower = query.to_lowercase();

        let mut hydrated: Vec<HydratedCandidate> = Vec::new();
        for candidate in ordered {
            let Some(memory) = self.store.get_memory(&candidate.id)? else {
                continue;
            };
            let entity_names: Vec<String> = self
                .store
                .entities_for_memory(&candidate.id)?
                .into_iter()
                .map(|e| e.name)
                .collect();
            // Fulltext pre-filtered tags in SQL; candidates it alone
            // surfaced skip the tag post-filter.
            let apply_tags = options.tags.is_empty()
                || candidate
                    .sources
                    .iter()
                    .any(|s| *s != RetrievalMethod::Fulltext);
            if !post.admits(&memory, &entity_names, apply_tags) {
                continue;
            }

            let boost = if query_path_ids.is_empty() {
                LocationBoost::default()
            } else {
                location_boost(&self.store, bank_id, &candidate.id, &query_path_ids, now)?
            };
            let cross_encoder_score = ce_scores.get(&candidate.id).copied();
            let base = cross_encoder_score.unwrap_or(candidate.rrf_normalized);
            let recency = (-((now - memory.mentioned_at).max(0) as f64) / RECENCY_SCALE_MS).exp();
            let combined = base + boost.total();
            hydrated.push(HydratedCandidate {
                memory,
                candidate,
                cross_encoder_score,
                boost,
                entity_names,
                recency,
                combined,
            });
        }

        // Cognitive mode augments combined scores with activation signals.
        if options.mode == ScoringMode::Cognitive {
            let working_set: HashSet<String> = match scope_filter.session.as_deref() {
                Some(session) => {
                    self.store
                        .session_accesses_since(bank_id, session, now - WM_WINDOW_MS)?
                }
                None => HashSet::new(),
            };
            let mut base_levels: Vec<f64> = Vec::with_capacity(hydrated.len());
            for h in &hydrated {
                let history = self.store.access_history(&h.memory.id, 64)?;
                base_levels.push(base_level_activation(&history, now));
            }
            let max_level = base_levels.iter().cloned().fold(0.0_f64, f64::max);
            for (h, level) in hydrated.iter_mut().zip(base_levels) {
                let normalized = if max_level > 0.0 { level / max_level } else { 0.0 };
                let probe = probe_activation(&query_lower, &h.entity_names);
                let in_wm = working_set.contains(&h.memory.id);
                h.combined += cognitive_bonus(probe, normalized, in_wm);
            }
        }

        hydrated.sort_by(|a, b| {
            b.combined
                .partial_cmp(&a.combined)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });

        // 7. Budget halt and limit.
        let budget = options.token_budget.or(options.max_tokens);
        let mut selected: Vec<HydratedCandidate> = Vec::new();
        let mut tokens_used = 0usize;
        for h in hydrated {
            if selected.len() == limit {
                break;
            }
            if let Some(budget) = budget {
                let tokens = estimate_tokens(&h.memory.content);
                if tokens_used + tokens > budget {
                    break;
                }
                tokens_used += tokens;
            }
            selected.push(h);
        }

        // 8. Access bookkeeping (append-only / commutative).
        let selected_ids: Vec<String> = selected.iter().map(|h| h.memory.id.clone()).collect();
        self.store.touch_memories(&selected_ids, now)?;
        self.store.log_memory_accesses(
            bank_id,
            &selected_ids,
            scope_filter.session.as_deref(),
            now,
        )?;
        for path_id in &query_path_ids {
            for memory_id in &selected_ids {
                if let Err(e) = self.store.insert_access_context(&LocationAccessContext {
                    id: Uuid::new_v4().to_string(),
                    bank_id: bank_id.to_string(),
                    path_id: path_id.clone(),
                    memory_id: memory_id.clone(),
                    session: scope_filter.session.clone(),
                    activity_type: ActivityType::Recall,
                    accessed_at: now,
                }) {
                    tracing::warn!(
                        "recall access context skipped for {} at {}: {}",
                        memory_id,
                        path_id,
                        e
                    );
                }
            }
        }

        // 9. Payloads.
        let entities = if options.include_entities {
            let mut map: HashMap<String, EntityState> = HashMap::new();
            for h in &selected {
                for entity in self.store.entities_for_memory(&h.memory.id)? {
                    map.entry(entity.id.clone())
                        .or_insert_with(|| EntityState {
                            entity,
                            memory_ids: vec![],
                        })
                        .memory_ids
                        .push(h.memory.id.clone());
                }
            }
            Some(map)
        } else {
            None
        };

        let chunks = if options.include_chunks {
            let chunk_tokens = options.max_chunk_tokens.unwrap_or(DEFAULT_CHUNK_TOKENS).max(1);
            let mut chunks = Vec::new();
            for h in &selected {
                for (index, text) in chunk_text(&h.memory.content, chunk_tokens * 4) {
                    chunks.push(ContentChunk {
                        memory_id: h.memory.id.clone(),
                        index,
                        tokens: estimate_tokens(&text),
                        text,
                    });
                }
            }
            Some(chunks)
        } else {
            None
        };

        // 10. Visual fusion, capped at floor(limit * share).
        let visual_memories = if options.include_visual {
            let share = options
                .visual_max_share
                .unwrap_or(VISUAL_MAX_SHARE_CAP)
                .min(VISUAL_MAX_SHARE_CAP)
                .max(0.0);
            let max_visual = (limit as f64 * share).floor() as usize;
            if max_visual == 0 {
                Some(vec![])
            } else {
                let mut scored: Vec<VisualHit> = self
                    .store
                    .list_visuals(bank_id)?
                    .into_iter()
                    .map(|(id, description)| {
                        let score = term_overlap_score(query, &description);
                        VisualHit {
                            id,
                            description,
                            score,
                        }
                    })
                    .filter(|hit| hit.score > 0.0)
                    .collect();
                scored.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.id.cmp(&b.id))
                });
                scored.truncate(max_visual);
                for hit in &scored {
                    self.store.record_visual_access(&hit.id, now)?;
                }
                Some(scored)
            }
        } else {
            None
        };

        // 11. Context packing under the token budget.
        let packed = budget.map(|budget| {
            let candidates: Vec<PackCandidate> = selected
                .iter()
                .map(|h| PackCandidate {
                    id: h.memory.id.clone(),
                    content: h.memory.content.clone(),
                    gist: h.memory.gist.clone(),
                    score: h.combined,
                })
                .collect();
            pack_context(&candidates, budget)
        });

        let trace = if options.enable_trace {
            Some(RecallTrace {
                strategy_durations_ms: durations,
                strategy_ranks: ranks,
                candidates: selected
                    .iter()
                    .map(|h| CandidateTrace {
                        id: h.memory.id.clone(),
                        rrf_score: h.candidate.rrf_score,
                        rrf_normalized: h.candidate.rrf_normalized,
                        cross_encoder_score_normalized: h.cross_encoder_score,
                        temporal: h.candidate.temporal_score,
                        recency: h.recency,
                        combined: h.combined,
                        location: h.boost,
                    })
                    .collect(),
                selected: selected_ids.clone(),
                total_duration_ms: total_timer.elapsed().as_millis() as i64,
            })
        } else {
            None
        };

        let memories: Vec<ScoredMemory> = selected
            .into_iter()
            .map(|h| ScoredMemory {
                score: h.combined,
                sources: h.candidate.sources,
                memory: h.memory,
            })
            .collect();

        self.hooks.complete(
            &ctx,
            &serde_json::json!({ "memories": memories.len() }),
        );
        self.emit_trace(
            "recall",
            bank_id,
            started_at,
            serde_json::json!({ "memories": memories.len() }),
        );

        Ok(RecallResult {
            memories,
            query: query.to_string(),
            entities,
            chunks,
            trace,
            visual_memories,
            packed,
        })
    }
}

/// Split content into (index, chunk) pieces of at most `chunk_chars`
fn chunk_text(content: &str, chunk_chars: usize) -> Vec<(usize, String)> {
    let chars: Vec<char> = content.chars().collect();
    if chars.is_empty() {
        return vec![];
    }
    chars
        .chunks(chunk_chars.max(1))
        .enumerate()
        .map(|(index, chunk)| (index, chunk.iter().collect()))
        .collect()
}

/// BM25-inspired term overlap scoring used for visual description matching
fn term_overlap_score(query: &str, document: &str) -> f64 {
    let query_lower = query.to_lowercase();
    let query_terms: Vec<&str> = query_lower.split_whitespace().collect();
    let doc_lower = document.to_lowercase();
    let doc_len = document.len() as f64;
    if doc_len == 0.0 || query_terms.is_empty() {
        return 0.0;
    }

    let k1 = 1.2_f64;
    let b = 0.75_f64;
    let avg_doc_len = 500.0_f64;
    let mut score = 0.0;
    for term in &query_terms {
        let tf = doc_lower.matches(term).count() as f64;
        if tf > 0.0 {
            let numerator = tf * (k1 + 1.0);
            let denominator = tf + k1 * (1.0 - b + b * (doc_len / avg_doc_len));
            score += numerator / denominator;
        }
    }
    score / query_terms.len() as f64
}

// ============================================================================
// TESTS
// ============================================================================
