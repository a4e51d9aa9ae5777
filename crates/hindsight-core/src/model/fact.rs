//! Extracted facts - the intermediate form between raw input and durable
//! memory units.

use serde::{Deserialize, Serialize};

use super::memory::FactType;

/// A causal relation a fact asserts against an earlier fact in the same
/// retain call. `target_index` refers into the extracted fact list and must
/// be strictly less than the emitting fact's own index; invalid indices are
/// dropped relation-by-relation without failing the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CausalRelation {
    /// Index of the cause within the same extraction batch
    pub target_index: usize,
    /// Relation label, e.g. "caused_by"
    #[serde(default = "default_relation_type")]
    pub relation_type: String,
    /// Edge weight (0.0 to 1.0)
    pub strength: f64,
}

fn default_relation_type() -> String {
    "caused_by".to_string()
}

/// One fact produced by extraction (LLM or caller-supplied)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExtractedFact {
    /// The fact text
    pub content: String,
    /// Fact classification
    #[serde(default)]
    pub fact_type: FactType,
    /// Extraction confidence (0.0 to 1.0)
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Entity mentions as (name, type) pairs; type defaults to `other`
    #[serde(default)]
    pub entities: Vec<FactEntity>,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Backward-looking causal assertions
    #[serde(default)]
    pub causal_relations: Vec<CausalRelation>,
    /// Start of the period the fact refers to (epoch ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurred_start: Option<i64>,
    /// End of the period the fact refers to (epoch ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurred_end: Option<i64>,
}

fn default_confidence() -> f64 {
    1.0
}

/// An entity mention inside an extracted fact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FactEntity {
    /// Entity name as mentioned
    pub name: String,
    /// Entity classification
    #[serde(default)]
    pub entity_type: super::entity::EntityType,
}

impl ExtractedFact {
    /// Create a bare fact from content alone
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            fact_type: FactType::default(),
            confidence: 1.0,
            entities: vec![],
            tags: vec![],
            causal_relations: vec![],
            occurred_start: None,
            occurred_end: None,
        }
    }
}

/// One turn of a conversation transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TranscriptTurn {
    /// Speaker role, e.g. "user" or "assistant"
    pub role: String,
    /// Turn text
    pub content: String,
}

/// Retain input content - plain text or a structured transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum RetainContentInput {
    /// Free text
    Text(String),
    /// Conversation turns, flattened as "role: content" lines for extraction
    Transcript(Vec<TranscriptTurn>),
}

impl RetainContentInput {
    /// Flatten to the text handed to the extractor
    pub fn as_text(&self) -> String {
        match self {
            RetainContentInput::Text(text) => text.clone(),
            RetainContentInput::Transcript(turns) => turns
                .iter()
                .map(|t| format!("{}: {}", t.role, t.content))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Whether there is any content at all
    pub fn is_empty(&self) -> bool {
        match self {
            RetainContentInput::Text(text) => text.trim().is_empty(),
            RetainContentInput::Transcript(turns) => {
                turns.iter().all(|t| t.content.trim().is_empty())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_flattening() {
        let input = RetainContentInput::Transcript(vec![
            TranscriptTurn {
                role: "user".to_string(),
                content: "hello".to_string(),
            },
            TranscriptTurn {
                role: "assistant".to_string(),
                content: "hi".to_string(),
            },
        ]);
        assert_eq!(input.as_text(), "user: hello\nassistant: hi");
        assert!(!input.is_empty());
    }

    #[test]
    fn test_fact_deny_unknown_fields() {
        let json = r#"{"content": "test", "factType": "world"}"#;
        assert!(serde_json::from_str::<ExtractedFact>(json).is_ok());

        let json_with_unknown = r#"{"content": "test", "surprise": 1}"#;
        assert!(serde_json::from_str::<ExtractedFact>(json_with_unknown).is_err());
    }
}
