//! Context packer journeys (the packer itself is pure; these cover the
//! spec-level boundary behaviour end to end).

use hindsight_core::{
    estimate_tokens, pack_context, PackCandidate, PackMode,
};

fn candidate(id: &str, content: &str, gist: Option<&str>, score: f64) -> PackCandidate {
    PackCandidate {
        id: id.to_string(),
        content: content.to_string(),
        gist: gist.map(String::from),
        score,
    }
}

/// The §-four-style boundary scenario: two short full entries, two long
/// tails with short gists, and a budget that admits gists but not tails.
#[test]
fn packer_boundary_scenario() {
    let long = "x".repeat(400);
    let candidates = vec![
        candidate("a", &"x".repeat(100), Some("g"), 0.9),
        candidate("b", &"x".repeat(100), Some("g"), 0.8),
        candidate("c", &long, Some("short gist c"), 0.7),
        candidate("d", &long, Some("short gist d"), 0.6),
    ];

    let result = pack_context(&candidates, 60);

    assert!(!result.overflow);
    assert_eq!(result.entries[0].mode, PackMode::Full);
    assert_eq!(result.entries[1].mode, PackMode::Full);
    assert_eq!(result.entries[0].id, "a");
    assert_eq!(result.entries[1].id, "b");
    assert!(
        result
            .entries
            .iter()
            .any(|e| (e.id == "c" || e.id == "d") && e.mode == PackMode::Gist),
        "at least one long tail is emitted as a gist"
    );
    assert!(result.total_tokens_used <= 60);
}

#[test]
fn budget_is_respected_whenever_not_overflowing() {
    let candidates: Vec<PackCandidate> = (0..30)
        .map(|i| {
            candidate(
                &format!("m{:02}", i),
                &"content ".repeat(i + 1),
                Some("a one line gist"),
                1.0 - i as f64 / 30.0,
            )
        })
        .collect();

    for budget in [10, 25, 60, 150, 400, 2000] {
        let result = pack_context(&candidates, budget);
        if result.overflow {
            // Overflow only when even the top-2 alone exceed the budget
            assert_eq!(result.entries.len(), 2);
            assert!(result.total_tokens_used > budget);
            assert_eq!(result.budget_remaining, 0);
        } else {
            assert!(
                result.total_tokens_used <= budget,
                "budget {} exceeded: {}",
                budget,
                result.total_tokens_used
            );
            assert_eq!(result.budget_remaining, budget - result.total_tokens_used);
        }
        // Top-2 are always full and first
        for entry in result.entries.iter().take(2) {
            assert_eq!(entry.mode, PackMode::Full);
        }
    }
}

#[test]
fn every_entry_token_count_matches_the_estimator() {
    let candidates = vec![
        candidate("a", "alpha bravo charlie", None, 0.9),
        candidate("b", &"y".repeat(301), Some("condensed version"), 0.8),
        candidate("c", &"z".repeat(777), None, 0.7),
    ];
    let result = pack_context(&candidates, 300);
    assert!(!result.entries.is_empty());
    for entry in &result.entries {
        assert_eq!(entry.tokens, estimate_tokens(&entry.text));
    }
}

#[test]
fn fallback_gists_cap_at_280_chars() {
    let long = "w".repeat(1000);
    // No precomputed gist: the packer falls back to truncation
    let candidates = vec![
        candidate("a", "top", None, 0.9),
        candidate("b", "next", None, 0.8),
        candidate("c", &long, None, 0.7),
    ];
    let result = pack_context(&candidates, 100);
    let c = result.entries.iter().find(|e| e.id == "c").unwrap();
    assert_eq!(c.mode, PackMode::Gist);
    assert_eq!(c.text.chars().count(), 280);
    assert!(c.text.ends_with("..."));
}

#[test]
fn packing_is_deterministic() {
    let candidates: Vec<PackCandidate> = (0..12)
        .map(|i| {
            candidate(
                &format!("m{:02}", i),
                &"body ".repeat(20 + i),
                (i % 2 == 0).then_some("stable gist"),
                0.9 - i as f64 / 20.0,
            )
        })
        .collect();
    let reference = serde_json::to_string(&pack_context(&candidates, 120)).unwrap();
    for _ in 0..50 {
        assert_eq!(
            serde_json::to_string(&pack_context(&candidates, 120)).unwrap(),
            reference
        );
    }
}
