//! Scope isolation and location signal journeys.

use hindsight_core::{
    ActivityType, FactType, RecallOptions, RetainContentInput, RetainOptions, Scope, ScopeMode,
};
use hindsight_e2e_tests::harness::TestEngine;
use hindsight_e2e_tests::mocks::fact;

fn text(content: &str) -> RetainContentInput {
    RetainContentInput::Text(content.to_string())
}

async fn retain_scoped(
    harness: &TestEngine,
    bank_id: &str,
    content: &str,
    scope: Option<Scope>,
) -> String {
    let result = harness
        .engine
        .retain(
            bank_id,
            text(""),
            RetainOptions {
                facts: Some(vec![fact(content, FactType::World)]),
                scope,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    result.memories[0].id.clone()
}

/// Null out scope columns to fabricate a pre-scoping legacy row
fn make_legacy(harness: &TestEngine, memory_id: &str) {
    let conn = rusqlite::Connection::open(harness.db_path()).unwrap();
    conn.execute(
        "UPDATE memory_units SET scope_profile = NULL, scope_project = NULL WHERE id = ?1",
        rusqlite::params![memory_id],
    )
    .unwrap();
}

#[tokio::test]
async fn strict_scope_isolation_has_zero_cross_project_bleed() {
    let harness = TestEngine::new();
    let bank = harness.bank("scope");

    let m_ap = retain_scoped(
        &harness,
        &bank.id,
        "alpha roadmap for apples",
        Some(Scope::new("alice", "project-a")),
    )
    .await;
    let m_bp = retain_scoped(
        &harness,
        &bank.id,
        "alpha budget of bananas",
        Some(Scope::new("alice", "project-b")),
    )
    .await;
    let m_legacy = retain_scoped(
        &harness,
        &bank.id,
        "alpha legacy archive entry",
        None,
    )
    .await;
    make_legacy(&harness, &m_legacy);

    let result = harness
        .engine
        .recall(
            &bank.id,
            "alpha",
            RecallOptions {
                scope: Some(Scope::new("alice", "project-a")),
                scope_mode: ScopeMode::Strict,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let returned: Vec<&str> = result.memories.iter().map(|m| m.memory.id.as_str()).collect();
    assert!(returned.contains(&m_ap.as_str()));
    assert!(returned.contains(&m_legacy.as_str()), "legacy rows match any filter");
    assert!(
        !returned.contains(&m_bp.as_str()),
        "cross-project bleed must be zero in strict mode"
    );
}

#[tokio::test]
async fn broad_scope_admits_everything() {
    let harness = TestEngine::new();
    let bank = harness.bank("broad");

    retain_scoped(
        &harness,
        &bank.id,
        "alpha apples red",
        Some(Scope::new("alice", "project-a")),
    )
    .await;
    retain_scoped(
        &harness,
        &bank.id,
        "alpha bananas yellow",
        Some(Scope::new("alice", "project-b")),
    )
    .await;

    let result = harness
        .engine
        .recall(
            &bank.id,
            "alpha",
            RecallOptions {
                scope: Some(Scope::new("alice", "project-a")),
                scope_mode: ScopeMode::Broad,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(result.memories.len(), 2);
}

#[tokio::test]
async fn retain_stamps_resolved_scope_on_memories() {
    let harness = TestEngine::new();
    let bank = harness.bank("stamp");

    let result = harness
        .engine
        .retain(
            &bank.id,
            text(""),
            RetainOptions {
                facts: Some(vec![fact("a scoped fact", FactType::World)]),
                scope: Some(Scope {
                    profile: Some("alice".to_string()),
                    project: None,
                    session: Some("s1".to_string()),
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let memory = &result.memories[0];
    assert_eq!(memory.scope_profile.as_deref(), Some("alice"));
    // Missing fields fall back to "default"
    assert_eq!(memory.scope_project.as_deref(), Some("default"));
    assert_eq!(memory.scope_session.as_deref(), Some("s1"));
}

#[tokio::test]
async fn location_boost_lifts_path_associated_memories() {
    let harness = TestEngine::new();
    let bank = harness.bank("location");

    let boosted = retain_scoped(&harness, &bank.id, "alpha parser grammar notes", None).await;
    let plain = retain_scoped(&harness, &bank.id, "alpha lexer scanner cards", None).await;

    // Only the first memory was touched at the queried path
    harness
        .engine
        .location_record(
            &bank.id,
            "src/parser/grammar.rs",
            &[boosted.clone()],
            None,
            ActivityType::Retain,
        )
        .unwrap();

    let result = harness
        .engine
        .recall(
            &bank.id,
            "alpha src/parser/grammar.rs",
            RecallOptions {
                enable_trace: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.memories[0].memory.id, boosted);
    let trace = result.trace.unwrap();
    let boosted_trace = trace.candidates.iter().find(|c| c.id == boosted).unwrap();
    let plain_trace = trace.candidates.iter().find(|c| c.id == plain).unwrap();
    assert!(boosted_trace.location.path_match > 0.0);
    assert!(boosted_trace.location.frequency_recency > 0.0);
    assert_eq!(plain_trace.location.total(), 0.0);
}

#[tokio::test]
async fn co_access_associations_build_within_session_window() {
    let harness = TestEngine::new();
    let bank = harness.bank("co-access");
    let memory = retain_scoped(&harness, &bank.id, "shared context note", None).await;

    let first = harness
        .engine
        .location_record(
            &bank.id,
            "src/recall/fusion.rs",
            &[memory.clone()],
            None,
            ActivityType::Access,
        )
        .unwrap();
    let second = harness
        .engine
        .location_record(
            &bank.id,
            "src/recall/rerank.rs",
            &[memory.clone()],
            None,
            ActivityType::Access,
        )
        .unwrap();
    assert_ne!(first.id, second.id);

    // Touching both paths inside the 30-minute window built one association;
    // a third touch of either path strengthens the same row.
    harness
        .engine
        .location_record(
            &bank.id,
            "src/recall/fusion.rs",
            &[memory],
            None,
            ActivityType::Access,
        )
        .unwrap();

    let conn = rusqlite::Connection::open(harness.db_path()).unwrap();
    let (count, co_access, strength): (i64, i64, f64) = conn
        .query_row(
            "SELECT COUNT(*), MAX(co_access_count), MAX(strength) FROM location_associations",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(count, 1, "one row per unordered pair");
    assert_eq!(co_access, 2);
    assert!(strength > 0.0 && strength < 1.0);
}

#[tokio::test]
async fn path_normalisation_collapses_variants() {
    let harness = TestEngine::new();
    let bank = harness.bank("normalise");
    let memory = retain_scoped(&harness, &bank.id, "path variant note", None).await;

    let first = harness
        .engine
        .location_record(
            &bank.id,
            "Src\\Recall\\Fusion.rs",
            &[memory.clone()],
            None,
            ActivityType::Access,
        )
        .unwrap();
    let second = harness
        .engine
        .location_record(
            &bank.id,
            "src//recall/fusion.rs/",
            &[memory],
            None,
            ActivityType::Access,
        )
        .unwrap();

    // Both spellings normalise to the same row
    assert_eq!(first.id, second.id);
    assert_eq!(first.normalized_path, "src/recall/fusion.rs");
}
