//! Test Data Factory
//!
//! Deterministic fakes and fact builders:
//! - `BagOfWordsEmbedder`: hashed bag-of-words vectors, so identical text
//!   embeds identically (cosine 1.0) and token-disjoint text embeds
//!   orthogonally (cosine 0.0)
//! - `ReversingReranker`: logits ascending by document position, reversing
//!   whatever order candidates arrive in
//! - `ScriptedLlm`: canned responses for extraction/gist prompts

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use hindsight_core::{
    CausalRelation, Embedder, EntityType, ExtractedFact, FactType, LlmAdapter, RerankModel, Result,
};

/// Dimension used by every e2e engine instance
pub const EMBEDDING_DIMENSIONS: usize = 64;

/// Hashed bag-of-words embedder. Pure function of the input text.
pub struct BagOfWordsEmbedder;

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; EMBEDDING_DIMENSIONS];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let slot = (hasher.finish() % EMBEDDING_DIMENSIONS as u64) as usize;
            vector[slot] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }
}

/// Reranker whose logits ascend with document position, so the last
/// incoming candidate ends up ranked first after the sigmoid sort.
pub struct ReversingReranker;

#[async_trait]
impl RerankModel for ReversingReranker {
    async fn rerank(&self, _query: &str, docs: &[String]) -> Result<Vec<f32>> {
        Ok((0..docs.len()).map(|i| i as f32).collect())
    }
}

/// LLM fake that replays a fixed response
pub struct ScriptedLlm {
    /// Response returned for every prompt
    pub response: String,
}

#[async_trait]
impl LlmAdapter for ScriptedLlm {
    async fn generate(&self, _prompt: &str, _max_tokens: usize) -> Result<String> {
        Ok(self.response.clone())
    }
}

/// A bare pre-extracted fact
pub fn fact(content: &str, fact_type: FactType) -> ExtractedFact {
    let mut fact = ExtractedFact::new(content);
    fact.fact_type = fact_type;
    fact
}

/// A pre-extracted fact with entity mentions
pub fn fact_with_entities(
    content: &str,
    fact_type: FactType,
    entities: &[(&str, EntityType)],
) -> ExtractedFact {
    let json = serde_json::json!({
        "content": content,
        "factType": fact_type,
        "entities": entities
            .iter()
            .map(|(name, entity_type)| serde_json::json!({"name": name, "entityType": entity_type}))
            .collect::<Vec<_>>(),
    });
    serde_json::from_value(json).expect("valid fact json")
}

/// Attach a causal relation to a fact
pub fn with_causal(mut fact: ExtractedFact, target_index: usize, strength: f64) -> ExtractedFact {
    fact.causal_relations.push(CausalRelation {
        target_index,
        relation_type: "caused_by".to_string(),
        strength,
    });
    fact
}
