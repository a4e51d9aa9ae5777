//! Reconsolidation router.
//!
//! Classifies each incoming fact against its nearest stored neighbour into
//! one of three routes: reinforce (near-duplicate, bump the original),
//! reconsolidate (same memory, changed content), or new_trace (novel).
//! Classification is deterministic: identical inputs always produce the
//! same verdict.

use std::collections::HashMap;

use crate::model::{EntityType, ReconRoute};

/// Fixed lower similarity bound of the reconsolidate band. The upper bound
/// is the configurable dedup threshold.
pub const RECONSOLIDATE_THRESHOLD: f64 = 0.78;

/// Router output for one fact
#[derive(Debug, Clone)]
pub struct RouterVerdict {
    /// Chosen route
    pub route: ReconRoute,
    /// Nearest neighbour considered, if any
    pub candidate_id: Option<String>,
    /// Similarity to the candidate (1 - cosine distance)
    pub candidate_score: Option<f64>,
    /// Whether an entity-type conflict was detected
    pub conflict_detected: bool,
    /// Conflicting entity names (normalised)
    pub conflict_keys: Vec<String>,
}

/// Decide a route from the similarity score and conflict signal.
///
/// | score                 | conflict | route         |
/// |-----------------------|----------|---------------|
/// | >= dedup              | no       | reinforce     |
/// | >= dedup              | yes      | reconsolidate |
/// | [0.78, dedup)         | any      | reconsolidate |
/// | < 0.78                | no       | new_trace     |
/// | < 0.78                | yes      | reconsolidate |
pub fn classify(score: Option<f64>, conflict: bool, dedup_threshold: f64) -> ReconRoute {
    let Some(score) = score else {
        return ReconRoute::NewTrace;
    };
    if score >= dedup_threshold {
        if conflict {
            ReconRoute::Reconsolidate
        } else {
            ReconRoute::Reinforce
        }
    } else if score >= RECONSOLIDATE_THRESHOLD {
        ReconRoute::Reconsolidate
    } else if conflict {
        ReconRoute::Reconsolidate
    } else {
        ReconRoute::NewTrace
    }
}

/// Combine a score, conflict keys, and candidate identity into a verdict
pub fn route_fact(
    candidate: Option<(String, f64)>,
    conflict_keys: Vec<String>,
    dedup_threshold: f64,
) -> RouterVerdict {
    let (candidate_id, candidate_score) = match candidate {
        Some((id, score)) => (Some(id), Some(score)),
        None => (None, None),
    };
    let conflict_detected = !conflict_keys.is_empty();
    RouterVerdict {
        route: classify(candidate_score, conflict_detected, dedup_threshold),
        candidate_id,
        candidate_score,
        conflict_detected,
        conflict_keys,
    }
}

// ============================================================================
// CONFLICT DETECTION
// ============================================================================

/// Normalise a value for conflict comparison: trim, lowercase, collapse
/// whitespace runs, and canonicalise numeric strings ("01.50" == "1.5").
pub fn normalize_value(value: &str) -> String {
    let collapsed = value
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if let Ok(number) = collapsed.parse::<f64>() {
        if number.is_finite() {
            return format_number(number);
        }
    }
    collapsed
}

fn format_number(number: f64) -> String {
    if number == number.trunc() && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        format!("{}", number)
    }
}

/// Detect entity-type conflicts between a candidate memory's entity set and
/// an incoming fact's entity set. A conflict is any entity name appearing on
/// both sides with a different type. Returns the conflicting normalised
/// names, sorted.
pub fn detect_conflicts(
    candidate_entities: &[(String, EntityType)],
    incoming_entities: &[(String, EntityType)],
) -> Vec<String> {
    let candidate_types: HashMap<String, EntityType> = candidate_entities
        .iter()
        .map(|(name, entity_type)| (normalize_value(name), *entity_type))
        .collect();

    let mut conflicts: Vec<String> = incoming_entities
        .iter()
        .filter_map(|(name, entity_type)| {
            let key = normalize_value(name);
            match candidate_types.get(&key) {
                Some(candidate_type) if candidate_type != entity_type => Some(key),
                _ => None,
            }
        })
        .collect();
    conflicts.sort();
    conflicts.dedup();
    conflicts
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const DEDUP: f64 = 0.92;

    #[test]
    fn test_decision_table() {
        // score >= dedup
        assert_eq!(classify(Some(0.95), false, DEDUP), ReconRoute::Reinforce);
        assert_eq!(classify(Some(0.95), true, DEDUP), ReconRoute::Reconsolidate);
        // boundary: exactly dedup
        assert_eq!(classify(Some(0.92), false, DEDUP), ReconRoute::Reinforce);
        // middle band, conflict irrelevant
        assert_eq!(classify(Some(0.85), false, DEDUP), ReconRoute::Reconsolidate);
        assert_eq!(classify(Some(0.85), true, DEDUP), ReconRoute::Reconsolidate);
        assert_eq!(classify(Some(0.78), false, DEDUP), ReconRoute::Reconsolidate);
        // below the band
        assert_eq!(classify(Some(0.5), false, DEDUP), ReconRoute::NewTrace);
        assert_eq!(classify(Some(0.5), true, DEDUP), ReconRoute::Reconsolidate);
        // no candidate at all
        assert_eq!(classify(None, false, DEDUP), ReconRoute::NewTrace);
    }

    #[test]
    fn test_custom_dedup_threshold() {
        assert_eq!(classify(Some(0.85), false, 0.80), ReconRoute::Reinforce);
        assert_eq!(classify(Some(0.79), false, 0.80), ReconRoute::Reconsolidate);
    }

    #[test]
    fn test_normalize_value() {
        assert_eq!(normalize_value("  Acme   Corp "), "acme corp");
        assert_eq!(normalize_value("01.50"), "1.5");
        assert_eq!(normalize_value("42"), "42");
        assert_eq!(normalize_value("042"), "42");
        assert_eq!(normalize_value("3.0"), "3");
    }

    #[test]
    fn test_conflict_on_type_change() {
        let candidate = vec![("Acme".to_string(), EntityType::Organization)];
        let incoming = vec![("acme".to_string(), EntityType::Person)];
        assert_eq!(detect_conflicts(&candidate, &incoming), vec!["acme"]);
    }

    #[test]
    fn test_no_conflict_on_same_type_or_disjoint_names() {
        let candidate = vec![
            ("Acme".to_string(), EntityType::Organization),
            ("Paris".to_string(), EntityType::Place),
        ];
        let incoming = vec![
            ("ACME".to_string(), EntityType::Organization),
            ("Bob".to_string(), EntityType::Person),
        ];
        assert!(detect_conflicts(&candidate, &incoming).is_empty());
    }

    #[test]
    fn test_routing_is_deterministic() {
        let verdict = route_fact(Some(("m1".to_string(), 0.93)), vec![], DEDUP);
        for _ in 0..50 {
            let again = route_fact(Some(("m1".to_string(), 0.93)), vec![], DEDUP);
            assert_eq!(again.route, verdict.route);
            assert_eq!(again.candidate_id, verdict.candidate_id);
        }
    }
}
