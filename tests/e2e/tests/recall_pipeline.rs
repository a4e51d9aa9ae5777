//! Recall fusion, reranking, filtering, and payload journeys.

use std::sync::Arc;

use hindsight_core::{
    FactType, RecallOptions, RetainContentInput, RetainOptions, RetrievalMethod, TagsMatch,
};
use hindsight_e2e_tests::harness::TestEngine;
use hindsight_e2e_tests::mocks::{fact, ReversingReranker};

fn text(content: &str) -> RetainContentInput {
    RetainContentInput::Text(content.to_string())
}

async fn seed(harness: &TestEngine, bank_id: &str, contents: &[&str]) {
    for content in contents {
        harness
            .engine
            .retain(
                bank_id,
                text(""),
                RetainOptions {
                    facts: Some(vec![fact(content, FactType::World)]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }
}

/// Ten contents with strictly decreasing similarity to the query "alpha".
/// Padding tokens are unique per content so no pair lands in the
/// reconsolidation band during seeding.
fn graded_contents() -> Vec<String> {
    (0..10)
        .map(|i| {
            let mut tokens = vec!["alpha".to_string()];
            for k in 0..i {
                tokens.push(format!("pad{}x{}", i, k));
            }
            tokens.join(" ")
        })
        .collect()
}

#[tokio::test]
async fn recall_finds_semantically_close_memories() {
    let harness = TestEngine::new();
    let bank = harness.bank("recall");
    seed(
        &harness,
        &bank.id,
        &["the cat sat on the mat", "quarterly report was filed"],
    )
    .await;

    let result = harness
        .engine
        .recall(&bank.id, "cat mat", RecallOptions::default())
        .await
        .unwrap();
    assert!(!result.memories.is_empty());
    assert_eq!(result.memories[0].memory.content, "the cat sat on the mat");
    assert_eq!(result.query, "cat mat");
}

#[tokio::test]
async fn rerank_reverses_rrf_order_and_normalises_scores() {
    let harness = TestEngine::with_reranker(Arc::new(ReversingReranker));
    let bank = harness.bank("rerank");
    let contents = graded_contents();
    seed(
        &harness,
        &bank.id,
        &contents.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
    )
    .await;

    let result = harness
        .engine
        .recall(
            &bank.id,
            "alpha",
            RecallOptions {
                enable_trace: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // The reranker scores later documents higher, so the memory that ranked
    // last in RRF (the least similar content) comes out on top.
    assert_eq!(result.memories.len(), 10);
    assert_eq!(
        result.memories[0].memory.content,
        *contents.last().unwrap()
    );

    for scored in &result.memories {
        assert!((0.0..=1.0).contains(&scored.score));
    }

    // The trace records both fusion fields for every candidate.
    let trace = result.trace.unwrap();
    assert_eq!(trace.candidates.len(), 10);
    for candidate in &trace.candidates {
        assert!((0.0..=1.0).contains(&candidate.rrf_normalized));
        let ce = candidate
            .cross_encoder_score_normalized
            .expect("cross-encoder score recorded");
        assert!((0.0..=1.0).contains(&ce));
    }
    assert!(trace.strategy_durations_ms.contains_key("semantic"));
    assert!(trace.strategy_ranks.contains_key("fulltext"));
}

#[tokio::test]
async fn identical_recalls_produce_identical_orderings() {
    let harness = TestEngine::new();
    let bank = harness.bank("deterministic");
    let contents = graded_contents();
    seed(
        &harness,
        &bank.id,
        &contents.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
    )
    .await;

    let options = || RecallOptions {
        enable_trace: true,
        ..Default::default()
    };
    let first = harness
        .engine
        .recall(&bank.id, "alpha beta", options())
        .await
        .unwrap();
    for _ in 0..5 {
        let again = harness
            .engine
            .recall(&bank.id, "alpha beta", options())
            .await
            .unwrap();
        let first_ids: Vec<&str> = first.memories.iter().map(|m| m.memory.id.as_str()).collect();
        let again_ids: Vec<&str> = again.memories.iter().map(|m| m.memory.id.as_str()).collect();
        assert_eq!(first_ids, again_ids);
        for (a, b) in first.memories.iter().zip(again.memories.iter()) {
            assert!((a.score - b.score).abs() < 1e-12);
        }
    }
}

#[tokio::test]
async fn method_subset_disables_strategies() {
    let harness = TestEngine::new();
    let bank = harness.bank("methods");
    seed(&harness, &bank.id, &["alpha content here"]).await;

    let result = harness
        .engine
        .recall(
            &bank.id,
            "alpha",
            RecallOptions {
                methods: Some(vec![RetrievalMethod::Fulltext]),
                enable_trace: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let trace = result.trace.unwrap();
    assert!(trace.strategy_durations_ms.contains_key("fulltext"));
    assert!(!trace.strategy_durations_ms.contains_key("semantic"));
    for scored in &result.memories {
        assert_eq!(scored.sources, vec![RetrievalMethod::Fulltext]);
    }
}

#[tokio::test]
async fn tag_filters_honour_matching_modes() {
    let harness = TestEngine::new();
    let bank = harness.bank("tags");

    for (content, tags) in [
        ("work note alpha", vec!["work"]),
        ("play song alpha", vec!["play"]),
        ("plain entry alpha", vec![]),
    ] {
        harness
            .engine
            .retain(
                &bank.id,
                text(""),
                RetainOptions {
                    facts: Some(vec![fact(content, FactType::World)]),
                    tags: tags.into_iter().map(String::from).collect(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let recall_with = |tags_match: TagsMatch| {
        let bank_id = bank.id.clone();
        let harness = &harness;
        async move {
            harness
                .engine
                .recall(
                    &bank_id,
                    "alpha",
                    RecallOptions {
                        tags: vec!["work".to_string()],
                        tags_match,
                        // Keep fulltext out so the post-filter is exercised
                        methods: Some(vec![RetrievalMethod::Semantic]),
                        ..Default::default()
                    },
                )
                .await
                .unwrap()
        }
    };

    // any: untagged passes, wrong tag is rejected
    let any = recall_with(TagsMatch::Any).await;
    let contents: Vec<&str> = any.memories.iter().map(|m| m.memory.content.as_str()).collect();
    assert!(contents.contains(&"work note alpha"));
    assert!(contents.contains(&"plain entry alpha"));
    assert!(!contents.contains(&"play song alpha"));

    // any_strict: untagged is rejected too
    let strict = recall_with(TagsMatch::AnyStrict).await;
    let contents: Vec<&str> = strict
        .memories
        .iter()
        .map(|m| m.memory.content.as_str())
        .collect();
    assert_eq!(contents, vec!["work note alpha"]);
}

#[tokio::test]
async fn confidence_and_fact_type_filters() {
    let harness = TestEngine::new();
    let bank = harness.bank("filters");

    let mut confident = fact("confident alpha statement", FactType::World);
    confident.confidence = 0.9;
    let mut hesitant = fact("hesitant alpha statement", FactType::Opinion);
    hesitant.confidence = 0.2;
    harness
        .engine
        .retain(
            &bank.id,
            text(""),
            RetainOptions {
                facts: Some(vec![confident, hesitant]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = harness
        .engine
        .recall(
            &bank.id,
            "alpha statement",
            RecallOptions {
                min_confidence: Some(0.5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(result.memories.len(), 1);
    assert_eq!(result.memories[0].memory.content, "confident alpha statement");

    let result = harness
        .engine
        .recall(
            &bank.id,
            "alpha statement",
            RecallOptions {
                fact_types: vec![FactType::Opinion],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(result.memories.len(), 1);
    assert_eq!(result.memories[0].memory.fact_type, FactType::Opinion);
}

#[tokio::test]
async fn visual_share_is_hard_capped() {
    let harness = TestEngine::new();
    let bank = harness.bank("visual");
    seed(&harness, &bank.id, &["textual alpha memory"]).await;
    for i in 0..8 {
        harness
            .engine
            .add_visual_memory(&bank.id, &format!("screenshot {} showing alpha", i), None)
            .unwrap();
    }

    let result = harness
        .engine
        .recall(
            &bank.id,
            "alpha",
            RecallOptions {
                limit: 10,
                include_visual: true,
                // Caller asks for half; the cap clamps to 0.20
                visual_max_share: Some(0.5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let visual = result.visual_memories.unwrap();
    assert!(visual.len() <= 2, "floor(10 * 0.20) = 2");
    assert!(!visual.is_empty());
}

#[tokio::test]
async fn entity_payload_maps_entities_to_memories() {
    let harness = TestEngine::new();
    let bank = harness.bank("payload");
    harness
        .engine
        .retain(
            &bank.id,
            text(""),
            RetainOptions {
                facts: Some(vec![hindsight_e2e_tests::mocks::fact_with_entities(
                    "Alice presented the roadmap",
                    FactType::Experience,
                    &[("Alice", hindsight_core::EntityType::Person)],
                )]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = harness
        .engine
        .recall(
            &bank.id,
            "roadmap",
            RecallOptions {
                include_entities: true,
                include_chunks: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let entities = result.entities.unwrap();
    assert_eq!(entities.len(), 1);
    let state = entities.values().next().unwrap();
    assert_eq!(state.entity.name, "Alice");
    assert_eq!(state.memory_ids.len(), 1);

    let chunks = result.chunks.unwrap();
    assert!(!chunks.is_empty());
    for chunk in &chunks {
        assert_eq!(chunk.tokens, hindsight_core::estimate_tokens(&chunk.text));
    }
}

#[tokio::test]
async fn token_budget_halts_accumulation() {
    let harness = TestEngine::new();
    let bank = harness.bank("budget");
    // Each content is 40 chars -> 10 tokens
    let contents: Vec<String> = (0..6)
        .map(|i| format!("alpha filler {:026}", i))
        .collect();
    seed(
        &harness,
        &bank.id,
        &contents.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
    )
    .await;

    let result = harness
        .engine
        .recall(
            &bank.id,
            "alpha",
            RecallOptions {
                token_budget: Some(30),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // 3 memories of 10 tokens fill the budget of 30
    assert_eq!(result.memories.len(), 3);
    let packed = result.packed.unwrap();
    assert!(!packed.overflow);
    assert!(packed.total_tokens_used <= 30);
    assert_eq!(
        packed.budget_remaining,
        30 - packed.total_tokens_used
    );
}

#[tokio::test]
async fn deleted_memories_are_skipped_during_hydration() {
    let harness = TestEngine::new();
    let bank = harness.bank("deleted");
    seed(&harness, &bank.id, &["alpha one", "alpha two"]).await;

    let before = harness
        .engine
        .recall(&bank.id, "alpha", RecallOptions::default())
        .await
        .unwrap();
    assert_eq!(before.memories.len(), 2);

    let victim = before.memories[0].memory.id.clone();
    assert!(harness.engine.delete_memory_unit(&victim).unwrap());

    let after = harness
        .engine
        .recall(&bank.id, "alpha", RecallOptions::default())
        .await
        .unwrap();
    assert_eq!(after.memories.len(), 1);
    assert!(after.memories.iter().all(|m| m.memory.id != victim));
}

#[tokio::test]
async fn cognitive_mode_boosts_recently_accessed_memories() {
    use hindsight_core::{Scope, ScoringMode};

    let harness = TestEngine::new();
    let bank = harness.bank("cognitive");
    seed(&harness, &bank.id, &["alpha red stone", "alpha blue stone"]).await;

    let session_scope = Scope {
        profile: None,
        project: None,
        session: Some("s1".to_string()),
    };

    // First recall touches exactly one memory under the session tag
    let first = harness
        .engine
        .recall(
            &bank.id,
            "alpha stone",
            RecallOptions {
                limit: 1,
                scope: Some(session_scope.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let touched = first.memories[0].memory.id.clone();

    // Cognitive mode lifts it via base-level activation + the working-memory
    // boost for same-session accesses
    let second = harness
        .engine
        .recall(
            &bank.id,
            "alpha stone",
            RecallOptions {
                scope: Some(session_scope),
                mode: ScoringMode::Cognitive,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(second.memories.len(), 2);
    assert_eq!(second.memories[0].memory.id, touched);
    assert!(second.memories[0].score > second.memories[1].score);
}

#[tokio::test]
async fn generated_gists_feed_the_packer() {
    let harness = TestEngine::with_llm(Arc::new(hindsight_e2e_tests::mocks::ScriptedLlm {
        response: "alpha condensed".to_string(),
    }));
    let bank = harness.bank("gists");
    let long_content = format!("alpha {}", "filler ".repeat(120));
    seed(&harness, &bank.id, &[long_content.as_str(), "alpha short one", "alpha short two"]).await;

    // Generate gists for everything retained so far
    for memory in harness.engine.list_memory_units(&bank.id, 10, 0).unwrap() {
        let gist = harness.engine.generate_gist(&memory.id).await.unwrap();
        assert!(!gist.is_empty());
        assert!(gist.chars().count() <= 280);
    }
    let stored = harness.engine.list_memory_units(&bank.id, 10, 0).unwrap();
    assert!(stored.iter().all(|m| m.gist.is_some()));

    // The packed result uses the stored gists for the tail entries
    let result = harness
        .engine
        .recall(
            &bank.id,
            "alpha",
            RecallOptions {
                token_budget: Some(40),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let packed = result.packed.unwrap();
    assert!(packed.total_tokens_used <= 40 || packed.overflow);
}

#[tokio::test]
async fn unknown_bank_is_not_found() {
    let harness = TestEngine::new();
    let err = harness
        .engine
        .recall("missing-bank", "anything", RecallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, hindsight_core::HindsightError::NotFound(_)));
}
