//! Core data model - banks, memory units, entities, links, and scopes.
//!
//! Everything here is a plain serde-friendly value type. Storage mapping
//! lives in `storage`, behaviour in the pipeline modules.

mod bank;
mod entity;
mod fact;
mod link;
mod location;
mod memory;
mod scope;

pub use bank::{Bank, BankConfig, BankStats, Disposition, ExtractionMode, ReflectBudget};
pub use entity::{canonicalize_entity_name, Entity, EntityType};
pub use fact::{CausalRelation, ExtractedFact, FactEntity, RetainContentInput, TranscriptTurn};
pub use link::{LinkType, MemoryLink};
pub use location::{
    association_strength, ActivityType, LocationAccessContext, LocationAssociation, LocationPath,
};
pub use memory::{
    FactType, MemoryUnit, MemoryVersion, ReconRoute, ReconsolidationDecision,
};
pub use scope::{
    derive_scope_tags_from_context, resolve_scope, scope_matches, Scope, ScopeMode,
};
