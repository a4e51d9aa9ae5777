//! Retain pipeline and reconsolidation routing journeys.

use hindsight_core::{
    EntityType, FactType, LinkType, ReconRoute, RetainContentInput, RetainOptions,
};
use hindsight_e2e_tests::harness::TestEngine;
use hindsight_e2e_tests::mocks::{fact, fact_with_entities, with_causal};

fn text(content: &str) -> RetainContentInput {
    RetainContentInput::Text(content.to_string())
}

fn options_with_facts(facts: Vec<hindsight_core::ExtractedFact>) -> RetainOptions {
    RetainOptions {
        facts: Some(facts),
        ..Default::default()
    }
}

#[tokio::test]
async fn reinforce_on_duplicate_content() {
    let harness = TestEngine::new();
    let bank = harness.bank("routing");
    let alice = || {
        fact_with_entities(
            "Alice works at Acme Corp",
            FactType::World,
            &[
                ("Alice", EntityType::Person),
                ("Acme Corp", EntityType::Organization),
            ],
        )
    };

    let first = harness
        .engine
        .retain(&bank.id, text(""), options_with_facts(vec![alice()]))
        .await
        .unwrap();
    let strength_before = first.memories[0].encoding_strength;

    let second = harness
        .engine
        .retain(&bank.id, text(""), options_with_facts(vec![alice()]))
        .await
        .unwrap();

    // Byte-identical content within the same bank reinforces: no new memory
    // row, no version row.
    assert_eq!(
        harness.engine.get_bank_stats(&bank.id).unwrap().memory_count,
        1
    );
    assert_eq!(
        harness.engine.get_bank_stats(&bank.id).unwrap().version_count,
        0
    );

    let decisions = harness.engine.list_decisions(&bank.id).unwrap();
    assert_eq!(decisions.len(), 2);
    assert_eq!(decisions[0].route, ReconRoute::NewTrace);
    assert_eq!(decisions[1].route, ReconRoute::Reinforce);

    let memory = &second.memories[0];
    assert_eq!(memory.id, first.memories[0].id);
    assert!(memory.access_count >= 2);
    assert!(memory.encoding_strength > strength_before);
}

#[tokio::test]
async fn new_trace_on_dissimilar_content() {
    let harness = TestEngine::new();
    let bank = harness.bank("routing");

    harness
        .engine
        .retain(
            &bank.id,
            text(""),
            options_with_facts(vec![fact("Alice works at Acme Corp", FactType::World)]),
        )
        .await
        .unwrap();
    harness
        .engine
        .retain(
            &bank.id,
            text(""),
            options_with_facts(vec![fact(
                "xyz 123 !@# totally different",
                FactType::Experience,
            )]),
        )
        .await
        .unwrap();

    assert_eq!(
        harness.engine.get_bank_stats(&bank.id).unwrap().memory_count,
        2
    );
    let decisions = harness.engine.list_decisions(&bank.id).unwrap();
    assert_eq!(decisions.last().unwrap().route, ReconRoute::NewTrace);
}

#[tokio::test]
async fn every_decision_row_is_v1_and_points_at_a_memory() {
    let harness = TestEngine::new();
    let bank = harness.bank("audit");

    for content in ["rust is a language", "the sky was clear", "rust is a language"] {
        harness
            .engine
            .retain(
                &bank.id,
                text(""),
                options_with_facts(vec![fact(content, FactType::World)]),
            )
            .await
            .unwrap();
    }

    let decisions = harness.engine.list_decisions(&bank.id).unwrap();
    assert_eq!(decisions.len(), 3);
    for decision in &decisions {
        assert_eq!(decision.policy_version, "v1");
        let applied = harness
            .engine
            .get_memory_unit(&decision.applied_memory_id)
            .unwrap();
        assert!(applied.is_some(), "appliedMemoryId must exist");
    }
}

#[tokio::test]
async fn causal_chain_from_caller_supplied_facts() {
    let harness = TestEngine::new();
    let bank = harness.bank("causal");

    let result = harness
        .engine
        .retain(
            &bank.id,
            text(""),
            options_with_facts(vec![
                fact("It started raining", FactType::Experience),
                with_causal(
                    fact("The trail became muddy", FactType::Experience),
                    0,
                    0.8,
                ),
            ]),
        )
        .await
        .unwrap();

    assert_eq!(result.memories.len(), 2);
    assert_eq!(
        result.memories[1].mentioned_at,
        result.memories[0].mentioned_at + 1
    );

    let causal: Vec<_> = result
        .links
        .iter()
        .filter(|l| l.link_type == LinkType::CausedBy)
        .collect();
    assert_eq!(causal.len(), 1);
    assert_eq!(causal[0].source_id, result.memories[1].id);
    assert_eq!(causal[0].target_id, result.memories[0].id);
    assert!((causal[0].weight - 0.8).abs() < 1e-12);
}

#[tokio::test]
async fn causal_links_are_backward_looking() {
    let harness = TestEngine::new();
    let bank = harness.bank("causal-invariants");

    let result = harness
        .engine
        .retain(
            &bank.id,
            text(""),
            options_with_facts(vec![
                fact("power went out downtown", FactType::World),
                with_causal(fact("the servers shut down", FactType::World), 0, 0.9),
                // Forward and self references are dropped, the facts survive
                with_causal(fact("alarms kept ringing", FactType::World), 5, 0.9),
            ]),
        )
        .await
        .unwrap();

    assert_eq!(result.memories.len(), 3);
    let mentioned: std::collections::HashMap<&str, i64> = result
        .memories
        .iter()
        .map(|m| (m.id.as_str(), m.mentioned_at))
        .collect();
    for link in result.links.iter().filter(|l| l.link_type == LinkType::CausedBy) {
        assert_ne!(link.source_id, link.target_id);
        assert!((0.0..=1.0).contains(&link.weight));
        assert!(mentioned[link.source_id.as_str()] > mentioned[link.target_id.as_str()]);
    }
    // Only the valid relation materialised
    assert_eq!(
        result
            .links
            .iter()
            .filter(|l| l.link_type == LinkType::CausedBy)
            .count(),
        1
    );
}

#[tokio::test]
async fn caller_supplied_facts_with_empty_content_are_rejected() {
    let harness = TestEngine::new();
    let bank = harness.bank("verbatim");

    // Caller facts are verbatim: an empty entry is an input error, not a
    // silent drop that would shift later causal target indices.
    let err = harness
        .engine
        .retain(
            &bank.id,
            text(""),
            options_with_facts(vec![
                fact("first fact", FactType::World),
                fact("   ", FactType::World),
                with_causal(fact("third fact", FactType::World), 0, 0.6),
            ]),
        )
        .await
        .unwrap_err();
    match err {
        hindsight_core::HindsightError::InvalidInput(message) => {
            assert!(message.contains("facts[1]"), "names the offending index: {}", message);
        }
        other => panic!("expected InvalidInput, got {}", other),
    }
    // Nothing was applied
    assert_eq!(
        harness.engine.get_bank_stats(&bank.id).unwrap().memory_count,
        0
    );
}

#[tokio::test]
async fn extracted_empty_facts_do_not_shift_causal_targets() {
    use std::sync::Arc;

    // The extractor returns an empty-content entry mid-list; a later fact's
    // causal relation indexes past it. The pruned list must keep the edge
    // on the originally named fact, and the relation that targeted the
    // empty entry must vanish with it.
    let response = r#"[
        {"content": "power flickered briefly"},
        {"content": "   "},
        {"content": "the ups engaged",
         "causalRelations": [{"targetIndex": 1, "relationType": "caused_by", "strength": 0.5}]},
        {"content": "the alarm sounded",
         "causalRelations": [{"targetIndex": 2, "relationType": "caused_by", "strength": 0.7}]}
    ]"#;
    let harness = TestEngine::with_llm(Arc::new(hindsight_e2e_tests::mocks::ScriptedLlm {
        response: response.to_string(),
    }));
    let bank = harness.bank("index-shift");

    let result = harness
        .engine
        .retain(
            &bank.id,
            text("overnight incident report"),
            RetainOptions::default(),
        )
        .await
        .unwrap();

    let contents: Vec<&str> = result.memories.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        vec!["power flickered briefly", "the ups engaged", "the alarm sounded"]
    );

    let causal: Vec<_> = result
        .links
        .iter()
        .filter(|l| l.link_type == LinkType::CausedBy)
        .collect();
    // The relation targeting the dropped empty fact is gone; the surviving
    // one still points at "the ups engaged", not at whatever slid into
    // original index 2 after the drop.
    assert_eq!(causal.len(), 1);
    assert_eq!(causal[0].source_id, result.memories[2].id);
    assert_eq!(causal[0].target_id, result.memories[1].id);
    assert!((causal[0].weight - 0.7).abs() < 1e-12);
}

#[tokio::test]
async fn temporal_links_respect_floor_and_cap() {
    let harness = TestEngine::new();
    let bank = harness.bank("temporal-links");

    // 14 entity-free facts: each new trace links temporally to earlier ones
    let facts: Vec<_> = (0..14)
        .map(|i| fact(&format!("isolated event number{}", i), FactType::Experience))
        .collect();
    let result = harness
        .engine
        .retain(&bank.id, text(""), options_with_facts(facts))
        .await
        .unwrap();

    assert_eq!(result.memories.len(), 14);
    for memory in &result.memories {
        let temporal: Vec<_> = result
            .links
            .iter()
            .filter(|l| l.link_type == LinkType::Temporal && l.source_id == memory.id)
            .collect();
        assert!(temporal.len() <= 10, "at most 10 temporal links per source");
        for link in temporal {
            assert!(link.weight >= 0.3);
            assert!(link.weight <= 1.0);
        }
    }
    // The last fact saw 13 candidates and must have been capped
    let last = &result.memories[13];
    assert_eq!(
        result
            .links
            .iter()
            .filter(|l| l.link_type == LinkType::Temporal && l.source_id == last.id)
            .count(),
        10
    );
}

#[tokio::test]
async fn entity_canonicalisation_is_unique_per_bank() {
    let harness = TestEngine::new();
    let bank = harness.bank("entities");

    harness
        .engine
        .retain(
            &bank.id,
            text(""),
            options_with_facts(vec![fact_with_entities(
                "Acme Corp shipped a product",
                FactType::World,
                &[("Acme Corp", EntityType::Organization)],
            )]),
        )
        .await
        .unwrap();
    harness
        .engine
        .retain(
            &bank.id,
            text(""),
            options_with_facts(vec![fact_with_entities(
                "a filing mentioned the same company",
                FactType::World,
                &[("ACME  corp", EntityType::Organization)],
            )]),
        )
        .await
        .unwrap();

    let entities = harness.engine.list_entities(&bank.id, 10, 0).unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].canonical_name, "acme corp");
    assert_eq!(entities[0].mention_count, 2);
}

#[tokio::test]
async fn entity_type_conflict_routes_to_reconsolidate() {
    let harness = TestEngine::new();
    let bank = harness.bank("conflict");

    harness
        .engine
        .retain(
            &bank.id,
            text(""),
            options_with_facts(vec![fact_with_entities(
                "Mercury is a chemical element",
                FactType::World,
                &[("Mercury", EntityType::Concept)],
            )]),
        )
        .await
        .unwrap();
    // Identical content, but the entity shows up as a different type
    harness
        .engine
        .retain(
            &bank.id,
            text(""),
            options_with_facts(vec![fact_with_entities(
                "Mercury is a chemical element",
                FactType::World,
                &[("Mercury", EntityType::Place)],
            )]),
        )
        .await
        .unwrap();

    let decisions = harness.engine.list_decisions(&bank.id).unwrap();
    let last = decisions.last().unwrap();
    assert_eq!(last.route, ReconRoute::Reconsolidate);
    assert!(last.conflict_detected);
    assert_eq!(last.conflict_keys, vec!["mercury".to_string()]);

    // Reconsolidate wrote exactly one version row and no new memory row
    let stats = harness.engine.get_bank_stats(&bank.id).unwrap();
    assert_eq!(stats.memory_count, 1);
    assert_eq!(stats.version_count, 1);
}

#[tokio::test]
async fn batch_failures_are_captured_per_item() {
    let harness = TestEngine::new();
    let bank = harness.bank("batch");

    let items = vec![
        hindsight_core::retain::RetainBatchItem {
            content: text("ignored"),
            options: Some(options_with_facts(vec![fact(
                "first document fact",
                FactType::World,
            )])),
        },
        // Empty content and no facts: this item fails alone
        hindsight_core::retain::RetainBatchItem {
            content: text("   "),
            options: None,
        },
        hindsight_core::retain::RetainBatchItem {
            content: text("ignored"),
            options: Some(options_with_facts(vec![fact(
                "third document fact",
                FactType::World,
            )])),
        },
    ];

    let results = harness.engine.retain_batch(&bank.id, items).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].result.is_some());
    assert!(results[1].error.is_some());
    assert!(results[2].result.is_some());

    // Batch items advance the monotonic mention offset: the third item's
    // fact sits after the first item's.
    let first = results[0].result.as_ref().unwrap().memories[0].mentioned_at;
    let third = results[2].result.as_ref().unwrap().memories[0].mentioned_at;
    assert!(third > first);
}

#[tokio::test]
async fn empty_content_without_facts_is_invalid() {
    let harness = TestEngine::new();
    let bank = harness.bank("invalid");
    let err = harness
        .engine
        .retain(&bank.id, text("  "), RetainOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, hindsight_core::HindsightError::InvalidInput(_)));
}

#[tokio::test]
async fn bank_deletion_cascades() {
    let harness = TestEngine::new();
    let bank = harness.bank("cascade");
    let result = harness
        .engine
        .retain(
            &bank.id,
            text(""),
            options_with_facts(vec![fact_with_entities(
                "Bob visited Paris",
                FactType::Experience,
                &[("Bob", EntityType::Person), ("Paris", EntityType::Place)],
            )]),
        )
        .await
        .unwrap();
    let memory_id = result.memories[0].id.clone();

    assert!(harness.engine.delete_bank(&bank.id).unwrap());
    assert!(harness.engine.get_bank_by_id(&bank.id).unwrap().is_none());
    assert!(harness.engine.get_memory_unit(&memory_id).unwrap().is_none());
    assert!(harness.engine.list_decisions(&bank.id).unwrap().is_empty());
}
