//! Cross-encoder reranking of fused candidates.
//!
//! Raw logits come back from the rerank model, one per surviving document;
//! the sigmoid maps them into [0, 1]. Candidates whose content is gone
//! (deleted between fusion and rerank) are dropped. A rerank failure fails
//! the recall - there is no partial-result contract.

use std::collections::HashMap;

use crate::error::Result;
use crate::runtime::{sigmoid, RerankModel};

use super::fusion::FusedCandidate;

/// A candidate after reranking
#[derive(Debug, Clone)]
pub struct RerankedCandidate {
    /// The fused candidate
    pub candidate: FusedCandidate,
    /// Sigmoid-normalised cross-encoder score in [0, 1]
    pub cross_encoder_score: f64,
}

/// Rerank candidates against the query. Output is sorted by cross-encoder
/// score descending with id as the stable tie-break.
pub async fn apply_rerank(
    model: &dyn RerankModel,
    query: &str,
    candidates: Vec<FusedCandidate>,
    content_map: &HashMap<String, String>,
) -> Result<Vec<RerankedCandidate>> {
    let survivors: Vec<FusedCandidate> = candidates
        .into_iter()
        .filter(|c| content_map.contains_key(&c.id))
        .collect();
    if survivors.is_empty() {
        return Ok(vec![]);
    }

    let docs: Vec<String> = survivors
        .iter()
        .map(|c| content_map[&c.id].clone())
        .collect();
    let logits = model.rerank(query, &docs).await?;

    let mut reranked: Vec<RerankedCandidate> = survivors
        .into_iter()
        .zip(logits)
        .map(|(candidate, logit)| RerankedCandidate {
            candidate,
            cross_encoder_score: sigmoid(logit) as f64,
        })
        .collect();
    reranked.sort_by(|a, b| {
        b.cross_encoder_score
            .partial_cmp(&a.cross_encoder_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.candidate.id.cmp(&b.candidate.id))
    });
    Ok(reranked)
}

// ============================================================================
// TESTS
// ============================================================================
