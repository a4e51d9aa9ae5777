//! Derived link computation for freshly applied memories.
//!
//! Entity links connect memories that mention the same entities, temporal
//! links connect memories retained close together in time (only when they
//! share no entities), and causal links materialise the validated
//! backward-looking relations a fact carried in.

use std::collections::HashSet;

use uuid::Uuid;

use crate::error::Result;
use crate::model::{LinkType, MemoryLink};
use crate::storage::GraphStore;

/// Temporal link window (24 hours)
pub const TEMPORAL_WINDOW_MS: i64 = 24 * 3_600_000;

/// Temporal links per source cap
pub const MAX_TEMPORAL_LINKS: usize = 10;

/// Floor of the temporal weight ramp
pub const MIN_TEMPORAL_WEIGHT: f64 = 0.3;

/// Candidates examined per temporal-link pass
const TEMPORAL_CANDIDATE_LIMIT: i64 = 200;

/// Temporal edge weight: linear decay over the window with a 0.3 floor
pub fn temporal_weight(delta_ms: i64) -> f64 {
    let decayed = 1.0 - (delta_ms.abs() as f64 / TEMPORAL_WINDOW_MS as f64);
    decayed.max(MIN_TEMPORAL_WEIGHT)
}

/// One entity link per neighbour sharing at least one entity with
/// `memory_id`, weighted by the shared-entity share of the new memory's
/// own entity set.
pub fn compute_entity_links(
    store: &GraphStore,
    bank_id: &str,
    memory_id: &str,
    own_entity_count: usize,
    now: i64,
) -> Result<Vec<MemoryLink>> {
    if own_entity_count == 0 {
        return Ok(vec![]);
    }
    let neighbours = store.memories_sharing_entities(memory_id)?;
    let links = neighbours
        .into_iter()
        .map(|(neighbour_id, shared)| MemoryLink {
            id: Uuid::new_v4().to_string(),
            bank_id: bank_id.to_string(),
            source_id: memory_id.to_string(),
            target_id: neighbour_id,
            link_type: LinkType::Entity,
            weight: (shared as f64 / own_entity_count as f64).min(1.0),
            created_at: now,
        })
        .collect();
    Ok(links)
}

/// Temporal links to recent memories sharing no entities, top
/// `MAX_TEMPORAL_LINKS` by weight, respecting edges the source already has.
pub fn compute_temporal_links(
    store: &GraphStore,
    bank_id: &str,
    memory_id: &str,
    mentioned_at: i64,
    own_entities: &HashSet<String>,
    now: i64,
) -> Result<Vec<MemoryLink>> {
    let existing = store.count_temporal_links(memory_id)? as usize;
    if existing >= MAX_TEMPORAL_LINKS {
        return Ok(vec![]);
    }
    let budget = MAX_TEMPORAL_LINKS - existing;

    // The window is anchored on the new memory's own mentioned_at so that
    // facts of one call (offset by +1ms each) see their predecessors.
    let candidates = store.memories_in_range(
        bank_id,
        mentioned_at - TEMPORAL_WINDOW_MS,
        mentioned_at,
        TEMPORAL_CANDIDATE_LIMIT,
    )?;

    let mut weighted: Vec<(String, f64)> = Vec::new();
    for (candidate_id, candidate_mentioned_at) in candidates {
        if candidate_id == memory_id {
            continue;
        }
        let candidate_entities: HashSet<String> = store
            .entity_ids_for_memory(&candidate_id)?
            .into_iter()
            .collect();
        if !own_entities.is_disjoint(&candidate_entities) {
            continue;
        }
        weighted.push((
            candidate_id,
            temporal_weight(mentioned_at - candidate_mentioned_at),
        ));
    }

    weighted.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    weighted.truncate(budget);

    Ok(weighted
        .into_iter()
        .map(|(target_id, weight)| MemoryLink {
            id: Uuid::new_v4().to_string(),
            bank_id: bank_id.to_string(),
            source_id: memory_id.to_string(),
            target_id,
            link_type: LinkType::Temporal,
            weight,
            created_at: now,
        })
        .collect())
}

/// A causal edge from `source_memory_id` backwards to the memory applied
/// for an earlier fact in the same retain call.
pub fn causal_link(
    bank_id: &str,
    source_memory_id: &str,
    target_memory_id: &str,
    strength: f64,
    now: i64,
) -> MemoryLink {
    MemoryLink {
        id: Uuid::new_v4().to_string(),
        bank_id: bank_id.to_string(),
        source_id: source_memory_id.to_string(),
        target_id: target_memory_id.to_string(),
        link_type: LinkType::CausedBy,
        weight: strength.clamp(0.0, 1.0),
        created_at: now,
    }
}

// ============================================================================
// TESTS
// ============================================================================
