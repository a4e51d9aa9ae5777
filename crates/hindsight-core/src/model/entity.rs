//! Entities mentioned by memory units.

use serde::{Deserialize, Serialize};

/// Entity classification
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// A person
    Person,
    /// A company, team, or institution
    Organization,
    /// A physical or virtual place
    Place,
    /// An abstract concept
    Concept,
    /// Anything else
    #[default]
    Other,
}

impl EntityType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Place => "place",
            EntityType::Concept => "concept",
            EntityType::Other => "other",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "person" => EntityType::Person,
            "organization" => EntityType::Organization,
            "place" => EntityType::Place,
            "concept" => EntityType::Concept,
            _ => EntityType::Other,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named entity within a bank.
///
/// `(bank_id, canonical_name)` is unique; `first_seen` never moves once set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning bank
    pub bank_id: String,
    /// Name as first mentioned
    pub name: String,
    /// Normalised name used for uniqueness
    pub canonical_name: String,
    /// Entity classification
    pub entity_type: EntityType,
    /// Optional free-text description
    pub description: Option<String>,
    /// Mentions across the bank, >= 1
    pub mention_count: i64,
    /// First mention time (epoch ms)
    pub first_seen: i64,
    /// Last mention or edit time (epoch ms)
    pub last_updated: i64,
}

/// Normalise an entity name for canonical uniqueness: trim, lowercase,
/// collapse internal whitespace runs to a single space.
pub fn canonicalize_entity_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
