//! Location rows - filesystem/module paths a bank's memories were touched
//! from, their access history, and pairwise co-access associations.

use serde::{Deserialize, Serialize};

/// What kind of activity touched a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    /// Direct access outside retain/recall
    Access,
    /// Touched while retaining
    Retain,
    /// Touched while recalling
    Recall,
}

impl ActivityType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Access => "access",
            ActivityType::Retain => "retain",
            ActivityType::Recall => "recall",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "retain" => ActivityType::Retain,
            "recall" => ActivityType::Recall,
            _ => ActivityType::Access,
        }
    }
}

/// A known path within a bank.
///
/// Unique on `(bank_id, normalized_path, profile, project)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPath {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning bank
    pub bank_id: String,
    /// Path as supplied by the caller
    pub raw_path: String,
    /// Normalised form (see `location::normalize_path`)
    pub normalized_path: String,
    /// Scope profile the path was recorded under
    pub profile: String,
    /// Scope project the path was recorded under
    pub project: String,
    /// Creation time (epoch ms)
    pub created_at: i64,
    /// Last update time (epoch ms)
    pub updated_at: i64,
}

/// Append-only record of one memory touched at one path
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationAccessContext {
    /// Unique identifier
    pub id: String,
    /// Owning bank
    pub bank_id: String,
    /// The path touched
    pub path_id: String,
    /// The memory touched
    pub memory_id: String,
    /// Session tag, when known
    pub session: Option<String>,
    /// What kind of activity this was
    pub activity_type: ActivityType,
    /// Access time (epoch ms)
    pub accessed_at: i64,
}

/// Co-access edge between two paths.
///
/// Stored once per unordered pair with `source_path_id < related_path_id`
/// (stable id ordering). Strength is `log1p(n) / (1 + log1p(n))` over the
/// co-access count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationAssociation {
    /// Unique identifier
    pub id: String,
    /// Owning bank
    pub bank_id: String,
    /// Lexically smaller path id of the pair
    pub source_path_id: String,
    /// Lexically larger path id of the pair
    pub related_path_id: String,
    /// Times the pair was touched within one session window
    pub co_access_count: i64,
    /// Saturating association strength (0.0 to 1.0)
    pub strength: f64,
    /// Last update time (epoch ms)
    pub updated_at: i64,
}

/// Recompute association strength from a co-access count
pub fn association_strength(co_access_count: i64) -> f64 {
    let n = co_access_count.max(0) as f64;
    let l = n.ln_1p();
    l / (1.0 + l)
}
