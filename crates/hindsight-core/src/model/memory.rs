//! Memory unit - the atomic extracted fact - plus its reconsolidation
//! bookkeeping rows (versions and routing decisions).

use serde::{Deserialize, Serialize};

// ============================================================================
// FACT TYPES
// ============================================================================

/// Classification of an extracted fact
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FactType {
    /// Something the agent experienced first-hand
    Experience,
    /// A fact about the world
    #[default]
    World,
    /// A held opinion or preference
    Opinion,
    /// A synthesised observation over other memories
    Observation,
    /// Anything that fits no other bucket
    Other,
}

impl FactType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FactType::Experience => "experience",
            FactType::World => "world",
            FactType::Opinion => "opinion",
            FactType::Observation => "observation",
            FactType::Other => "other",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "experience" => FactType::Experience,
            "world" => FactType::World,
            "opinion" => FactType::Opinion,
            "observation" => FactType::Observation,
            _ => FactType::Other,
        }
    }
}

impl std::fmt::Display for FactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// MEMORY UNIT
// ============================================================================

/// A single durable fact within a bank.
///
/// Identity is immutable; content mutates only through the reconsolidate
/// route, which snapshots the previous content into a `MemoryVersion`.
/// All timestamps are epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUnit {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning bank
    pub bank_id: String,
    /// The fact text
    pub content: String,
    /// Fact classification
    pub fact_type: FactType,
    /// Extraction confidence (0.0 to 1.0)
    pub confidence: f64,
    /// Entity ids linked through the junction table
    #[serde(default)]
    pub entities: Vec<String>,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Scope profile tag (None on legacy rows)
    pub scope_profile: Option<String>,
    /// Scope project tag (None on legacy rows)
    pub scope_project: Option<String>,
    /// Scope session tag
    pub scope_session: Option<String>,
    /// Source document id
    pub document_id: Option<String>,
    /// Caller-supplied anchor instant
    pub event_date: Option<i64>,
    /// Ingest-assigned ordering timestamp; within one retain call the i-th
    /// fact gets `event_date + i` so extraction order survives into ranking
    pub mentioned_at: i64,
    /// Start of the period the fact refers to
    pub occurred_start: Option<i64>,
    /// End of the period the fact refers to (>= occurred_start when both set)
    pub occurred_end: Option<i64>,
    /// Monotone non-decreasing reinforcement tracker
    pub encoding_strength: f64,
    /// Times this memory was touched by recall or reinforcement
    pub access_count: i64,
    /// Last access time (epoch ms)
    pub last_accessed: Option<i64>,
    /// Precomputed <= 280 char summary used by the context packer
    pub gist: Option<String>,
    /// Opaque caller metadata, stored as JSON text and never introspected
    pub metadata: Option<String>,
    /// Creation time (epoch ms)
    pub created_at: i64,
    /// Last update time (epoch ms)
    pub updated_at: i64,
}

impl MemoryUnit {
    /// Check the occurred-range invariant
    pub fn occurred_range_valid(&self) -> bool {
        match (self.occurred_start, self.occurred_end) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        }
    }
}

// ============================================================================
// RECONSOLIDATION BOOKKEEPING
// ============================================================================

/// Immutable snapshot written on every reconsolidate application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryVersion {
    /// Unique identifier
    pub id: String,
    /// The memory that was rewritten
    pub versioned_memory_id: String,
    /// Content before the rewrite
    pub previous_content: String,
    /// Content after the rewrite
    pub new_content: String,
    /// Why the rewrite happened
    pub reason: String,
    /// Snapshot time (epoch ms)
    pub created_at: i64,
}

/// The three ways an incoming fact can be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconRoute {
    /// Metadata-only bump of an existing near-duplicate
    Reinforce,
    /// Rewrite the canonical memory, snapshotting the old content
    Reconsolidate,
    /// Insert a brand-new memory row
    NewTrace,
}

impl ReconRoute {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconRoute::Reinforce => "reinforce",
            ReconRoute::Reconsolidate => "reconsolidate",
            ReconRoute::NewTrace => "new_trace",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "reinforce" => ReconRoute::Reinforce,
            "reconsolidate" => ReconRoute::Reconsolidate,
            _ => ReconRoute::NewTrace,
        }
    }
}

impl std::fmt::Display for ReconRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit row written once per ingested fact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconsolidationDecision {
    /// Unique identifier
    pub id: String,
    /// Owning bank
    pub bank_id: String,
    /// SHA-256 of the incoming fact content
    pub memory_hash: String,
    /// Nearest neighbour considered, if any
    pub candidate_memory_id: Option<String>,
    /// Similarity to the candidate (1 - cosine distance)
    pub candidate_score: Option<f64>,
    /// Chosen route
    pub route: ReconRoute,
    /// Whether an entity-type conflict was detected
    pub conflict_detected: bool,
    /// Conflicting entity names (JSON array)
    pub conflict_keys: Vec<String>,
    /// Routing policy version; currently always "v1"
    pub policy_version: String,
    /// The memory row the decision was applied to
    pub applied_memory_id: String,
    /// Decision time (epoch ms)
    pub created_at: i64,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_type_roundtrip() {
        for fact_type in [
            FactType::Experience,
            FactType::World,
            FactType::Opinion,
            FactType::Observation,
            FactType::Other,
        ] {
            assert_eq!(FactType::parse_name(fact_type.as_str()), fact_type);
        }
    }

    #[test]
    fn test_route_roundtrip() {
        for route in [
            ReconRoute::Reinforce,
            ReconRoute::Reconsolidate,
            ReconRoute::NewTrace,
        ] {
            assert_eq!(ReconRoute::parse_name(route.as_str()), route);
        }
    }

    #[test]
    fn test_occurred_range_invariant() {
        let mut unit = MemoryUnit {
            id: "m".to_string(),
            bank_id: "b".to_string(),
            content: String::new(),
            fact_type: FactType::World,
            confidence: 1.0,
            entities: vec![],
            tags: vec![],
            scope_profile: None,
            scope_project: None,
            scope_session: None,
            document_id: None,
            event_date: None,
            mentioned_at: 0,
            occurred_start: Some(10),
            occurred_end: Some(5),
            encoding_strength: 1.0,
            access_count: 0,
            last_accessed: None,
            gist: None,
            metadata: None,
            created_at: 0,
            updated_at: 0,
        };
        assert!(!unit.occurred_range_valid());
        unit.occurred_end = Some(10);
        assert!(unit.occurred_range_valid());
        unit.occurred_end = None;
        assert!(unit.occurred_range_valid());
    }
}
