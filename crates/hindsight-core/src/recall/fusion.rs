//! Reciprocal Rank Fusion.
//!
//! Merges the per-strategy ranked lists into one candidate order using
//! RRF(m) = sum over strategies of 1/(k + rank_s(m)) with k = 60. The
//! tie-break is total - contributing source count descending, then memory
//! id ascending - so two invocations over identical inputs produce
//! identical orderings and identical scores.

use std::collections::HashMap;

use super::RetrievalMethod;

/// RRF dampening constant
pub const RRF_K: f64 = 60.0;

/// Ranked hits from one retrieval strategy
#[derive(Debug, Clone)]
pub struct StrategyHits {
    /// Which strategy produced the hits
    pub method: RetrievalMethod,
    /// (memory id, raw strategy score), best first
    pub hits: Vec<(String, f64)>,
}

/// One fused candidate
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    /// Memory id
    pub id: String,
    /// Raw RRF score
    pub rrf_score: f64,
    /// RRF score min-max normalised over the fused set
    pub rrf_normalized: f64,
    /// Strategies that surfaced this candidate
    pub sources: Vec<RetrievalMethod>,
    /// Raw score from the temporal strategy, when it contributed
    pub temporal_score: Option<f64>,
}

/// Fuse ranked strategy results into a deterministic candidate ordering
pub fn reciprocal_rank_fusion(results: &[StrategyHits]) -> Vec<FusedCandidate> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut sources: HashMap<String, Vec<RetrievalMethod>> = HashMap::new();
    let mut temporal: HashMap<String, f64> = HashMap::new();

    for strategy in results {
        for (rank, (id, score)) in strategy.hits.iter().enumerate() {
            *scores.entry(id.clone()).or_default() += 1.0 / (RRF_K + (rank + 1) as f64);
            let entry = sources.entry(id.clone()).or_default();
            if !entry.contains(&strategy.method) {
                entry.push(strategy.method);
            }
            if strategy.method == RetrievalMethod::Temporal {
                temporal.insert(id.clone(), *score);
            }
        }
    }

    let mut fused: Vec<FusedCandidate> = scores
        .into_iter()
        .map(|(id, rrf_score)| {
            let mut candidate_sources = sources.remove(&id).unwrap_or_default();
            candidate_sources.sort_by_key(|m| m.as_str());
            FusedCandidate {
                temporal_score: temporal.get(&id).copied(),
                rrf_normalized: 0.0,
                sources: candidate_sources,
                id,
                rrf_score,
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.sources.len().cmp(&a.sources.len()))
            .then_with(|| a.id.cmp(&b.id))
    });

    // Min-max normalise over the fused set
    let max = fused.first().map(|c| c.rrf_score).unwrap_or(0.0);
    let min = fused.last().map(|c| c.rrf_score).unwrap_or(0.0);
    let span = max - min;
    for candidate in &mut fused {
        candidate.rrf_normalized = if span > 0.0 {
            (candidate.rrf_score - min) / span
        } else if max > 0.0 {
            1.0
        } else {
            0.0
        };
    }

    fused
}

/// Min-max normalise raw scores into [0, 1] in place
pub fn min_max_normalize(hits: &mut [(String, f64)]) {
    let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
    for (_, score) in hits.iter() {
        min = min.min(*score);
        max = max.max(*score);
    }
    let span = max - min;
    for (_, score) in hits.iter_mut() {
        *score = if span > 0.0 { (*score - min) / span } else { 1.0 };
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(method: RetrievalMethod, ids: &[&str]) -> StrategyHits {
        StrategyHits {
            method,
            hits: ids
                .iter()
                .enumerate()
                .map(|(i, id)| (id.to_string(), 1.0 - i as f64 * 0.1))
                .collect(),
        }
    }

    #[test]
    fn test_multi_source_candidates_rank_higher() {
        let fused = reciprocal_rank_fusion(&[
            hits(RetrievalMethod::Semantic, &["a", "b", "c"]),
            hits(RetrievalMethod::Fulltext, &["b", "a", "d"]),
        ]);
        // a and b appear in both lists, so they outrank c and d
        assert!(fused[0].id == "a" || fused[0].id == "b");
        assert!(fused[1].id == "a" || fused[1].id == "b");
        assert_eq!(fused[0].sources.len(), 2);
    }

    #[test]
    fn test_ordering_is_total_and_deterministic() {
        let input = [
            hits(RetrievalMethod::Semantic, &["x", "y"]),
            hits(RetrievalMethod::Fulltext, &["y", "x"]),
            hits(RetrievalMethod::Graph, &["z"]),
        ];
        let first: Vec<(String, f64)> = reciprocal_rank_fusion(&input)
            .into_iter()
            .map(|c| (c.id, c.rrf_score))
            .collect();
        for _ in 0..50 {
            let again: Vec<(String, f64)> = reciprocal_rank_fusion(&input)
                .into_iter()
                .map(|c| (c.id, c.rrf_score))
                .collect();
            assert_eq!(again, first);
        }
    }

    #[test]
    fn test_equal_scores_tie_break_on_id() {
        // x and y get identical single-source rank-1 scores
        let fused = reciprocal_rank_fusion(&[
            hits(RetrievalMethod::Semantic, &["y"]),
            hits(RetrievalMethod::Fulltext, &["x"]),
        ]);
        assert_eq!(fused[0].id, "x");
        assert_eq!(fused[1].id, "y");
    }

    #[test]
    fn test_normalized_scores_span_unit_interval() {
        let fused = reciprocal_rank_fusion(&[hits(RetrievalMethod::Semantic, &["a", "b", "c"])]);
        assert_eq!(fused[0].rrf_normalized, 1.0);
        assert_eq!(fused.last().unwrap().rrf_normalized, 0.0);
    }

    #[test]
    fn test_temporal_score_carried() {
        let fused = reciprocal_rank_fusion(&[StrategyHits {
            method: RetrievalMethod::Temporal,
            hits: vec![("a".to_string(), 0.75)],
        }]);
        assert_eq!(fused[0].temporal_score, Some(0.75));
    }

    #[test]
    fn test_min_max_normalize() {
        let mut hits = vec![
            ("a".to_string(), 4.0),
            ("b".to_string(), 2.0),
            ("c".to_string(), 0.0),
        ];
        min_max_normalize(&mut hits);
        assert_eq!(hits[0].1, 1.0);
        assert_eq!(hits[1].1, 0.5);
        assert_eq!(hits[2].1, 0.0);
    }
}
