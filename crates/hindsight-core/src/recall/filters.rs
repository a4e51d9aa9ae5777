//! Post-filters applied during candidate hydration.

use serde::{Deserialize, Serialize};

use crate::model::{scope_matches, FactType, MemoryUnit, Scope, ScopeMode};

/// Tag filter matching modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TagsMatch {
    /// Untagged memories pass; tagged memories must intersect the filter
    #[default]
    Any,
    /// Untagged memories pass; tagged memories must contain every filter tag
    All,
    /// Memory must be tagged and intersect the filter
    AnyStrict,
    /// Memory must be tagged and contain every filter tag
    AllStrict,
}

impl TagsMatch {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TagsMatch::Any => "any",
            TagsMatch::All => "all",
            TagsMatch::AnyStrict => "any_strict",
            TagsMatch::AllStrict => "all_strict",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "all" => TagsMatch::All,
            "any_strict" => TagsMatch::AnyStrict,
            "all_strict" => TagsMatch::AllStrict,
            _ => TagsMatch::Any,
        }
    }
}

/// Evaluate a tag filter against a memory's tags
pub fn tags_pass(memory_tags: &[String], filter: &[String], mode: TagsMatch) -> bool {
    if filter.is_empty() {
        return true;
    }
    let intersects = || filter.iter().any(|t| memory_tags.contains(t));
    let superset = || filter.iter().all(|t| memory_tags.contains(t));
    match mode {
        TagsMatch::Any => memory_tags.is_empty() || intersects(),
        TagsMatch::All => memory_tags.is_empty() || superset(),
        TagsMatch::AnyStrict => !memory_tags.is_empty() && intersects(),
        TagsMatch::AllStrict => !memory_tags.is_empty() && superset(),
    }
}

/// Parameters of the hydration-time post-filter chain
pub struct PostFilter<'a> {
    /// Scope filter
    pub scope: &'a Scope,
    /// Scope matching mode
    pub scope_mode: ScopeMode,
    /// Minimum confidence, when set
    pub min_confidence: Option<f64>,
    /// Admitted fact types; empty admits all
    pub fact_types: &'a [FactType],
    /// Entity-name filter (case-insensitive any-match); empty admits all
    pub entities: &'a [String],
    /// Tag filter
    pub tags: &'a [String],
    /// Tag matching mode
    pub tags_match: TagsMatch,
}

impl PostFilter<'_> {
    /// Run the full chain. `entity_names` are the memory's hydrated entity
    /// names; `apply_tags` is false for candidates whose only source
    /// pre-filtered tags already.
    pub fn admits(&self, memory: &MemoryUnit, entity_names: &[String], apply_tags: bool) -> bool {
        if !scope_matches(
            memory.scope_profile.as_deref(),
            memory.scope_project.as_deref(),
            self.scope,
            self.scope_mode,
        ) {
            return false;
        }
        if let Some(min_confidence) = self.min_confidence {
            if memory.confidence < min_confidence {
                return false;
            }
        }
        if !self.fact_types.is_empty() && !self.fact_types.contains(&memory.fact_type) {
            return false;
        }
        if !self.entities.is_empty() {
            let any_match = self.entities.iter().any(|wanted| {
                entity_names
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(wanted))
            });
            if !any_match {
                return false;
            }
        }
        if apply_tags && !tags_pass(&memory.tags, self.tags, self.tags_match) {
            return false;
        }
        true
    }
}

// ============================================================================
// TESTS
// ============================================================================
