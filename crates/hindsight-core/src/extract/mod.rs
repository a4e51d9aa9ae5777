//! Fact extraction.
//!
//! Turns raw retain input into `ExtractedFact`s, either verbatim from the
//! caller or through the configured LLM adapter. The LLM is treated as an
//! untrusted JSON producer: malformed entries degrade to bare facts, and
//! invalid causal relations are dropped one relation at a time - a bad
//! index never fails the fact that carried it.

mod temporal;

pub use temporal::{extract_time_range, TimeRange};

use crate::error::{HindsightError, Result};
use crate::model::{Bank, ExtractedFact, ExtractionMode};
use crate::runtime::LlmAdapter;

// ============================================================================
// PROMPTS
// ============================================================================

const CONCISE_GUIDELINES: &str = "Extract the minimal set of standalone facts. \
Merge near-duplicates. Drop filler and pleasantries.";

const VERBOSE_GUIDELINES: &str = "Extract every stated fact, keeping qualifiers, \
hedges, and attributions intact.";

/// Assemble the extraction prompt for one content chunk
fn build_prompt(bank: &Bank, content: &str, context: Option<&str>) -> String {
    let guidelines = match bank.config.extraction_mode {
        ExtractionMode::Concise => CONCISE_GUIDELINES,
        ExtractionMode::Verbose => VERBOSE_GUIDELINES,
        ExtractionMode::Custom => bank
            .config
            .custom_guidelines
            .as_deref()
            .unwrap_or(CONCISE_GUIDELINES),
    };

    let mut prompt = String::with_capacity(content.len() + 512);
    prompt.push_str(
        "You extract durable memory facts from text. Respond with a JSON array; each \
         element has: content (string), factType (experience|world|opinion|observation|other), \
         confidence (0..1), entities ([{name, entityType}]), tags ([string]), \
         causalRelations ([{targetIndex, relationType, strength}] referencing strictly \
         earlier facts in this array), occurredStart/occurredEnd (epoch ms, optional).\n",
    );
    prompt.push_str("Guidelines: ");
    prompt.push_str(guidelines);
    prompt.push('\n');
    if let Some(context) = context {
        prompt.push_str("Context: ");
        prompt.push_str(context);
        prompt.push('\n');
    }
    prompt.push_str("Text:\n");
    prompt.push_str(content);
    prompt
}

// ============================================================================
// EXTRACTION
// ============================================================================

/// Extract facts from `content` via the LLM adapter, chunking long inputs
/// by `chunk_size` characters.
pub async fn extract_facts(
    llm: &dyn LlmAdapter,
    bank: &Bank,
    content: &str,
    context: Option<&str>,
    max_completion_tokens: usize,
    chunk_size: usize,
) -> Result<Vec<ExtractedFact>> {
    if content.trim().is_empty() {
        return Err(HindsightError::InvalidInput(
            "content is empty and no pre-extracted facts were supplied".to_string(),
        ));
    }

    let mut facts = Vec::new();
    for chunk in chunk_content(content, chunk_size) {
        let prompt = build_prompt(bank, chunk, context);
        let response = llm.generate(&prompt, max_completion_tokens).await?;
        let mut chunk_facts = parse_fact_response(&response)?;
        facts.append(&mut chunk_facts);
    }

    Ok(sanitize_facts(facts))
}

/// Split content into character chunks of at most `chunk_size`
fn chunk_content(content: &str, chunk_size: usize) -> Vec<&str> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut rest = content;
    while rest.chars().count() > chunk_size {
        let boundary = rest
            .char_indices()
            .nth(chunk_size)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(boundary);
        chunks.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}

/// Parse an LLM response into facts. The array is located inside whatever
/// prose or code fences surround it; entries that fail strict parsing
/// degrade to a bare fact when they at least carry content.
fn parse_fact_response(response: &str) -> Result<Vec<ExtractedFact>> {
    let json = locate_json_array(response).ok_or_else(|| {
        HindsightError::Extraction(format!(
            "no JSON array found in extraction response ({} chars)",
            response.len()
        ))
    })?;

    let values: Vec<serde_json::Value> = serde_json::from_str(json)
        .map_err(|e| HindsightError::Extraction(format!("invalid extraction JSON: {}", e)))?;

    let mut facts = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value::<ExtractedFact>(value.clone()) {
            Ok(fact) => facts.push(fact),
            Err(e) => {
                // Keep what we can: a content string alone still makes a fact.
                if let Some(content) = value.get("content").and_then(|c| c.as_str()) {
                    tracing::debug!("degrading malformed fact entry: {}", e);
                    facts.push(ExtractedFact::new(content));
                } else {
                    tracing::warn!("dropping extraction entry without content: {}", e);
                }
            }
        }
    }
    Ok(facts)
}

fn locate_json_array(response: &str) -> Option<&str> {
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    if end <= start {
        return None;
    }
    Some(&response[start..=end])
}

/// Clean up an extractor-produced fact list: validate causal relations
/// against the original positions, then drop empty-content facts while
/// remapping every surviving `target_index` through the retained positions.
/// Relations whose target fact was dropped are removed; the emitting fact
/// survives. Dropping before remapping would silently retarget relations
/// that pointed past a removed entry.
pub fn sanitize_facts(mut facts: Vec<ExtractedFact>) -> Vec<ExtractedFact> {
    validate_causal_relations(&mut facts);

    let mut new_index: Vec<Option<usize>> = Vec::with_capacity(facts.len());
    let mut next = 0usize;
    for fact in &facts {
        if fact.content.trim().is_empty() {
            new_index.push(None);
        } else {
            new_index.push(Some(next));
            next += 1;
        }
    }

    let mut retained = Vec::with_capacity(next);
    for (i, mut fact) in facts.into_iter().enumerate() {
        if new_index[i].is_none() {
            tracing::debug!("dropping empty-content extracted fact at index {}", i);
            continue;
        }
        // validate_causal_relations bounded target_index below the emitting
        // fact's own original index, so the lookup cannot go out of range.
        let relations = std::mem::take(&mut fact.causal_relations);
        for mut relation in relations {
            match new_index[relation.target_index] {
                Some(target) => {
                    relation.target_index = target;
                    fact.causal_relations.push(relation);
                }
                None => {
                    tracing::debug!(
                        "dropping causal relation targeting empty fact {}",
                        relation.target_index
                    );
                }
            }
        }
        retained.push(fact);
    }
    retained
}

/// Drop causal relations that are self-referencing, forward-looking, or out
/// of bounds, and clamp strengths into [0, 1]. The emitting fact survives.
pub fn validate_causal_relations(facts: &mut [ExtractedFact]) {
    for i in 0..facts.len() {
        let own_index = i;
        facts[i].causal_relations.retain(|relation| {
            let valid = relation.target_index < own_index;
            if !valid {
                tracing::debug!(
                    "dropping causal relation from fact {} to index {}",
                    own_index,
                    relation.target_index
                );
            }
            valid
        });
        for relation in &mut facts[i].causal_relations {
            relation.strength = relation.strength.clamp(0.0, 1.0);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
