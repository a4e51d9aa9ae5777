//! Deterministic in-process fakes for the model-runtime seams.

mod fixtures;

pub use fixtures::{
    fact, fact_with_entities, with_causal, BagOfWordsEmbedder, ReversingReranker, ScriptedLlm,
    EMBEDDING_DIMENSIONS,
};
