//! # Hindsight Core
//!
//! Embedded memory engine for conversational agents:
//!
//! - **Reconsolidation routing**: every ingested fact lands as exactly one of
//!   reinforce / reconsolidate / new_trace, with a decision audit row
//! - **Typed memory graph**: entities, temporal edges, backward-looking
//!   causal edges, observation edges
//! - **Multi-strategy recall**: semantic KNN, FTS5/BM25 keyword, meta-path
//!   graph expansion, and temporal recency, fused with Reciprocal Rank Fusion
//! - **Cross-encoder reranking**: optional sigmoid-normalised second stage
//! - **Scope isolation**: `(profile, project, session)` tags with strict
//!   zero-bleed filtering
//! - **Location signals**: path detection in queries, co-access
//!   associations, and an additive location boost
//! - **Context packing**: token-budgeted compression of ranked candidates
//!   into full texts and gists
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hindsight_core::{Hindsight, HindsightConfig, RetainContentInput, RetainOptions, RecallOptions};
//!
//! let engine = Hindsight::builder(HindsightConfig::from_env()?).build()?;
//! let bank = engine.create_bank("assistant", None, None, None)?;
//!
//! engine.retain(
//!     &bank.id,
//!     RetainContentInput::Text("Alice works at Acme Corp".into()),
//!     RetainOptions::default(),
//! ).await?;
//!
//! let results = engine.recall(&bank.id, "where does Alice work?", RecallOptions::default()).await?;
//! ```
//!
//! The embedding and rerank models run out of process behind the TEI HTTP
//! contract (`HINDSIGHT_TEI_EMBED_URL` / `HINDSIGHT_TEI_RERANK_URL`); tests
//! substitute deterministic in-process implementations of the `Embedder`,
//! `RerankModel`, and `LlmAdapter` traits.

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod location;
pub mod model;
pub mod ops;
pub mod pack;
pub mod recall;
pub mod retain;
pub mod runtime;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use config::{
    HindsightConfig, DEFAULT_DEDUP_THRESHOLD, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_EMBEDDING_MODEL,
};
pub use engine::{AsyncRetainPayload, Hindsight, HindsightBuilder};
pub use error::{HindsightError, Result};

// Data model
pub use model::{
    derive_scope_tags_from_context, resolve_scope, scope_matches, ActivityType, Bank, BankConfig,
    BankStats, CausalRelation,
    Disposition, Entity, EntityType, ExtractedFact, ExtractionMode, FactEntity, FactType, LinkType,
    LocationAccessContext, LocationAssociation, LocationPath, MemoryLink, MemoryUnit,
    MemoryVersion, ReconRoute, ReconsolidationDecision, ReflectBudget, RetainContentInput, Scope,
    ScopeMode, TranscriptTurn,
};

// Retain pipeline
pub use retain::{
    EventDate, RetainBatchItem, RetainBatchItemResult, RetainOptions, RetainResult,
    RECONSOLIDATE_THRESHOLD,
};

// Recall pipeline
pub use recall::{
    CandidateTrace, ContentChunk, EntityState, RecallOptions, RecallResult, RecallTrace,
    RetrievalMethod, ScoredMemory, ScoringMode, TagsMatch, VisualHit, RRF_K,
};

// Context packing
pub use pack::{
    estimate_tokens, fallback_gist, pack_context, GistService, PackCandidate, PackMode,
    PackResult, PackedEntry, MAX_GIST_CHARS,
};

// Temporal extraction
pub use extract::{extract_time_range, TimeRange};

// Location signals
pub use location::{
    detect_location_signals, location_boost, normalize_path, record_access,
    resolve_signals_to_paths, LocationBoost, CO_ACCESS_WINDOW_MS,
};

// Model runtime seams
pub use runtime::{sigmoid, Embedder, LlmAdapter, RerankModel, TeiClient, TeiRerankClient};

// Storage layer
pub use storage::{cosine_similarity, GraphStore, OperationRecord, VectorIndex};

// Operations, tracing, extensions
pub use ops::{
    ExtensionHooks, OperationContext, OperationQueue, OperationStatus, SubmitReceipt,
    TraceCallback, TraceEvent,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Routing policy version stamped on decision rows
pub const ROUTING_POLICY_VERSION: &str = retain::ROUTING_POLICY_VERSION;

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        Bank, BankConfig, Embedder, EntityType, ExtractedFact, FactType, Hindsight,
        HindsightConfig, HindsightError, LinkType, LlmAdapter, MemoryUnit, RecallOptions,
        RecallResult, ReconRoute, RerankModel, Result, RetainContentInput, RetainOptions,
        RetainResult, Scope, ScopeMode, TagsMatch,
    };
}
