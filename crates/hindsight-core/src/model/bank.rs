//! Bank - the unit of isolation for one agent's memory.

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_DEDUP_THRESHOLD;

// ============================================================================
// CONFIG ENUMS
// ============================================================================

/// How aggressively the extraction prompt distils facts from input text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Short, deduplicated facts (default)
    #[default]
    Concise,
    /// Keep nuance and qualifiers
    Verbose,
    /// Use the bank's custom guidelines verbatim
    Custom,
}

impl ExtractionMode {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Concise => "concise",
            ExtractionMode::Verbose => "verbose",
            ExtractionMode::Custom => "custom",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "verbose" => ExtractionMode::Verbose,
            "custom" => ExtractionMode::Custom,
            _ => ExtractionMode::Concise,
        }
    }
}

/// Token budget tier for the reflect agent loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReflectBudget {
    /// Minimal tool calls
    Low,
    /// Balanced (default)
    #[default]
    Mid,
    /// Exhaustive exploration
    High,
}

impl ReflectBudget {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ReflectBudget::Low => "low",
            ReflectBudget::Mid => "mid",
            ReflectBudget::High => "high",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => ReflectBudget::Low,
            "high" => ReflectBudget::High,
            _ => ReflectBudget::Mid,
        }
    }
}

// ============================================================================
// BANK
// ============================================================================

/// Per-bank ingestion and retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankConfig {
    /// Fact extraction register
    pub extraction_mode: ExtractionMode,
    /// Similarity at or above which an incoming fact reinforces its
    /// nearest neighbour (0.0 to 1.0)
    pub dedup_threshold: f64,
    /// Reflect loop budget tier
    pub reflect_budget: ReflectBudget,
    /// Whether background consolidation may run for this bank
    pub enable_consolidation: bool,
    /// Extraction guidelines used when `extraction_mode` is `custom`
    pub custom_guidelines: Option<String>,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            extraction_mode: ExtractionMode::Concise,
            dedup_threshold: DEFAULT_DEDUP_THRESHOLD,
            reflect_budget: ReflectBudget::Mid,
            enable_consolidation: false,
            custom_guidelines: None,
        }
    }
}

/// Personality weights applied by the reflect loop when judging evidence
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Disposition {
    /// How much contradicting evidence discounts a memory
    pub skepticism: i32,
    /// How literally stated facts are taken
    pub literalism: i32,
    /// Weight given to experience facts over world facts
    pub empathy: i32,
}

/// One agent's isolated memory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bank {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Display name
    pub name: String,
    /// Ingestion/retrieval configuration
    pub config: BankConfig,
    /// Personality weights
    pub disposition: Disposition,
    /// Standing mission text shown to the reflect loop
    pub mission: Option<String>,
    /// Creation time (epoch ms)
    pub created_at: i64,
    /// Last update time (epoch ms)
    pub updated_at: i64,
}

/// Aggregate counts for one bank
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BankStats {
    /// Total memory units
    pub memory_count: i64,
    /// Total entities
    pub entity_count: i64,
    /// Total typed links
    pub link_count: i64,
    /// Total reconsolidation version rows
    pub version_count: i64,
    /// Total routing decision rows
    pub decision_count: i64,
    /// Mean encoding strength across memory units
    pub average_encoding_strength: f64,
    /// Mean confidence across memory units
    pub average_confidence: f64,
    /// Oldest `mentioned_at` (epoch ms)
    pub oldest_mentioned_at: Option<i64>,
    /// Newest `mentioned_at` (epoch ms)
    pub newest_mentioned_at: Option<i64>,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_mode_roundtrip() {
        for mode in [
            ExtractionMode::Concise,
            ExtractionMode::Verbose,
            ExtractionMode::Custom,
        ] {
            assert_eq!(ExtractionMode::parse_name(mode.as_str()), mode);
        }
    }

    #[test]
    fn test_default_bank_config() {
        let config = BankConfig::default();
        assert_eq!(config.dedup_threshold, 0.92);
        assert_eq!(config.reflect_budget, ReflectBudget::Mid);
        assert!(!config.enable_consolidation);
    }
}
