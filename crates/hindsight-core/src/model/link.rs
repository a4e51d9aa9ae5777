//! Typed edges between memory units.

use serde::{Deserialize, Serialize};

/// Type of relationship between two memory units
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// The two memories mention a shared entity
    Entity,
    /// The two memories were retained close together in time
    Temporal,
    /// The source memory was caused by the target memory
    CausedBy,
    /// The source observation synthesises the target memory
    ObservationOf,
    /// Embedding-space similarity edge
    Semantic,
}

impl LinkType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Entity => "entity",
            LinkType::Temporal => "temporal",
            LinkType::CausedBy => "caused_by",
            LinkType::ObservationOf => "observation_of",
            LinkType::Semantic => "semantic",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "temporal" => LinkType::Temporal,
            "caused_by" | "causedby" => LinkType::CausedBy,
            "observation_of" | "observationof" => LinkType::ObservationOf,
            "semantic" => LinkType::Semantic,
            _ => LinkType::Entity,
        }
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed, weighted edge in the memory graph.
///
/// `source_id != target_id` always. Causal edges point backwards in the
/// ingest stream (source later than target). A source carries at most 10
/// temporal edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryLink {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning bank
    pub bank_id: String,
    /// Source memory
    pub source_id: String,
    /// Target memory
    pub target_id: String,
    /// Relationship type
    pub link_type: LinkType,
    /// Edge weight (0.0 to 1.0)
    pub weight: f64,
    /// Creation time (epoch ms)
    pub created_at: i64,
}
