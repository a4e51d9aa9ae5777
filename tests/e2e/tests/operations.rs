//! Async operation queue, tracing, and extension hook journeys.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hindsight_core::{
    AsyncRetainPayload, ExtensionHooks, FactType, HindsightError, RecallOptions,
    RetainContentInput, RetainOptions,
};
use hindsight_e2e_tests::harness::TestEngine;
use hindsight_e2e_tests::mocks::fact;

fn retain_payload(content: &str) -> AsyncRetainPayload {
    AsyncRetainPayload {
        content: RetainContentInput::Text(String::new()),
        options: Some(RetainOptions {
            facts: Some(vec![fact(content, FactType::World)]),
            ..Default::default()
        }),
    }
}

async fn wait_for_terminal(harness: &TestEngine, operation_id: &str) -> String {
    for _ in 0..200 {
        let record = harness.engine.get_operation(operation_id).unwrap().unwrap();
        if matches!(record.status.as_str(), "completed" | "failed" | "cancelled") {
            return record.status;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("operation {} never reached a terminal state", operation_id);
}

#[tokio::test]
async fn async_retain_runs_to_completion() {
    let harness = TestEngine::new();
    let bank = harness.bank("async");

    let receipt = harness
        .engine
        .submit_async_retain(&bank.id, &retain_payload("asynchronous fact"))
        .unwrap();
    assert!(!receipt.deduplicated);

    let status = wait_for_terminal(&harness, &receipt.operation_id).await;
    assert_eq!(status, "completed");
    assert_eq!(
        harness.engine.get_bank_stats(&bank.id).unwrap().memory_count,
        1
    );
}

#[tokio::test]
async fn duplicate_submissions_are_deduplicated() {
    let harness = TestEngine::new();
    let bank = harness.bank("dedup");
    let payload = retain_payload("duplicated submission");

    let first = harness.engine.submit_async_retain(&bank.id, &payload).unwrap();
    let second = harness.engine.submit_async_retain(&bank.id, &payload).unwrap();
    // Either the duplicate was detected while the first was live, or the
    // first had already completed and a fresh item was queued; both end in
    // completed state.
    if second.deduplicated {
        assert_eq!(second.operation_id, first.operation_id);
    }
    wait_for_terminal(&harness, &first.operation_id).await;
    wait_for_terminal(&harness, &second.operation_id).await;
}

#[tokio::test]
async fn consolidation_and_refresh_are_tracked_to_completion() {
    let harness = TestEngine::new();
    let bank = harness.bank("tracked");

    let consolidation = harness.engine.submit_async_consolidation(&bank.id).unwrap();
    let refresh = harness
        .engine
        .submit_async_refresh_mental_model(&bank.id, "model-1")
        .unwrap();

    assert_eq!(
        wait_for_terminal(&harness, &consolidation.operation_id).await,
        "completed"
    );
    assert_eq!(
        wait_for_terminal(&harness, &refresh.operation_id).await,
        "completed"
    );
}

#[tokio::test]
async fn cancelled_operations_reach_terminal_cancelled() {
    let harness = TestEngine::new();
    let bank = harness.bank("cancel");

    let receipt = harness
        .engine
        .submit_async_retain(&bank.id, &retain_payload("to be cancelled maybe"))
        .unwrap();
    let _ = harness.engine.cancel_operation(&receipt.operation_id);

    // Whichever side wins the race, the operation lands in a terminal state
    // and a cancelled operation never half-applies.
    let status = wait_for_terminal(&harness, &receipt.operation_id).await;
    assert!(matches!(status.as_str(), "completed" | "cancelled"));
    if status == "completed" {
        assert_eq!(
            harness.engine.get_bank_stats(&bank.id).unwrap().memory_count,
            1
        );
    }
}

#[tokio::test]
async fn trace_callback_fires_for_core_operations() {
    let harness = TestEngine::new();
    let bank = harness.bank("traced");

    harness
        .engine
        .retain(
            &bank.id,
            RetainContentInput::Text(String::new()),
            RetainOptions {
                facts: Some(vec![fact("traced fact", FactType::World)]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    harness
        .engine
        .recall(&bank.id, "traced", RecallOptions::default())
        .await
        .unwrap();

    let traces = harness.traces.lock().unwrap();
    let operations: Vec<&str> = traces.iter().map(|t| t.operation.as_str()).collect();
    assert!(operations.contains(&"createBank"));
    assert!(operations.contains(&"retain"));
    assert!(operations.contains(&"recall"));
    for event in traces.iter() {
        assert!(event.duration_ms >= 0);
        assert!(event.started_at > 0);
    }
}

#[tokio::test]
async fn authorize_hook_aborts_operations() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = hindsight_core::HindsightConfig {
        db_path: Some(temp_dir.path().join("hooked.db")),
        embedding_model: "test-bag-of-words".to_string(),
        embedding_dimensions: hindsight_e2e_tests::mocks::EMBEDDING_DIMENSIONS,
        ..Default::default()
    };
    let engine = hindsight_core::Hindsight::builder(config)
        .embedder(Arc::new(hindsight_e2e_tests::mocks::BagOfWordsEmbedder))
        .hooks(ExtensionHooks {
            authorize: Some(Arc::new(|ctx| {
                if ctx.operation == "retain" {
                    Err(HindsightError::InvalidInput("retain denied".to_string()))
                } else {
                    Ok(())
                }
            })),
            ..Default::default()
        })
        .build()
        .unwrap();

    let bank = engine.create_bank("hooked", None, None, None).unwrap();
    let err = engine
        .retain(
            &bank.id,
            RetainContentInput::Text(String::new()),
            RetainOptions {
                facts: Some(vec![fact("denied fact", FactType::World)]),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HindsightError::InvalidInput(_)));
    assert_eq!(engine.get_bank_stats(&bank.id).unwrap().memory_count, 0);
}

#[tokio::test]
async fn on_complete_failures_never_surface() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let temp_dir = tempfile::tempdir().unwrap();
    let config = hindsight_core::HindsightConfig {
        db_path: Some(temp_dir.path().join("oncomplete.db")),
        embedding_model: "test-bag-of-words".to_string(),
        embedding_dimensions: hindsight_e2e_tests::mocks::EMBEDDING_DIMENSIONS,
        ..Default::default()
    };
    let engine = hindsight_core::Hindsight::builder(config)
        .embedder(Arc::new(hindsight_e2e_tests::mocks::BagOfWordsEmbedder))
        .hooks(ExtensionHooks {
            on_complete: Some(Arc::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(HindsightError::InvalidInput("hook exploded".to_string()))
            })),
            ..Default::default()
        })
        .build()
        .unwrap();

    let bank = engine.create_bank("resilient", None, None, None).unwrap();
    let result = engine
        .retain(
            &bank.id,
            RetainContentInput::Text(String::new()),
            RetainOptions {
                facts: Some(vec![fact("surviving fact", FactType::World)]),
                ..Default::default()
            },
        )
        .await;
    assert!(result.is_ok(), "onComplete failure must not fail the call");
    assert!(calls.load(Ordering::SeqCst) >= 1);
}
