//! Context packing.
//!
//! Compresses a ranked candidate list into a token budget. The packer is
//! pure: no IO, no clock, no failure path. The top two candidates always go
//! in full (or alone with `overflow` when even they do not fit); the
//! remaining budget splits 70/30 between gists and full-text backfill, with
//! a reallocation pass that hands leftover budget to skipped candidates.

mod gist;

pub use gist::{fallback_gist, GistService, MAX_GIST_CHARS};

use serde::Serialize;

/// Estimate tokens as ceil(chars / 4)
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Share of the post-top-2 budget reserved for gists
const GIST_SHARE: f64 = 0.70;

/// A ranked candidate entering the packer
#[derive(Debug, Clone)]
pub struct PackCandidate {
    /// Memory id
    pub id: String,
    /// Full content
    pub content: String,
    /// Precomputed gist, when available
    pub gist: Option<String>,
    /// Ranking score (descending order expected)
    pub score: f64,
}

/// How an entry was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackMode {
    /// Full content
    Full,
    /// Gist only
    Gist,
}

/// One packed entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackedEntry {
    /// Memory id
    pub id: String,
    /// Emitted text (content or gist)
    pub text: String,
    /// Emission mode
    pub mode: PackMode,
    /// Token estimate of `text`
    pub tokens: usize,
    /// Candidate score
    pub score: f64,
}

/// Packer output
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PackResult {
    /// Entries in emission order: top-2 full first, extras by score desc
    pub entries: Vec<PackedEntry>,
    /// Sum of entry token estimates
    pub total_tokens_used: usize,
    /// max(0, budget - total_tokens_used)
    pub budget_remaining: usize,
    /// True when the top-2 alone exceeded the budget
    pub overflow: bool,
}

/// Pack `candidates` (already ranked, best first) into `budget` tokens.
pub fn pack_context(candidates: &[PackCandidate], budget: usize) -> PackResult {
    if candidates.is_empty() {
        return PackResult {
            budget_remaining: budget,
            ..Default::default()
        };
    }

    let top2 = &candidates[..candidates.len().min(2)];
    let top2_entries: Vec<PackedEntry> = top2
        .iter()
        .map(|c| PackedEntry {
            id: c.id.clone(),
            text: c.content.clone(),
            mode: PackMode::Full,
            tokens: estimate_tokens(&c.content),
            score: c.score,
        })
        .collect();
    let t2: usize = top2_entries.iter().map(|e| e.tokens).sum();

    if t2 > budget {
        return PackResult {
            total_tokens_used: t2,
            budget_remaining: 0,
            overflow: true,
            entries: top2_entries,
        };
    }

    let remaining = budget - t2;
    let gist_budget = (GIST_SHARE * remaining as f64).floor() as usize;
    let full_backfill_budget = remaining - gist_budget;

    let mut gist_used = 0usize;
    let mut full_used = 0usize;
    let mut extras: Vec<PackedEntry> = Vec::new();
    let mut skipped: Vec<&PackCandidate> = Vec::new();

    for candidate in candidates.iter().skip(2) {
        let gist_text = candidate
            .gist
            .clone()
            .unwrap_or_else(|| fallback_gist(&candidate.content));
        let g = estimate_tokens(&gist_text);
        let f = estimate_tokens(&candidate.content);

        if gist_used + g <= gist_budget {
            gist_used += g;
            extras.push(PackedEntry {
                id: candidate.id.clone(),
                text: gist_text,
                mode: PackMode::Gist,
                tokens: g,
                score: candidate.score,
            });
        } else if full_used + f <= full_backfill_budget {
            full_used += f;
            extras.push(PackedEntry {
                id: candidate.id.clone(),
                text: candidate.content.clone(),
                mode: PackMode::Full,
                tokens: f,
                score: candidate.score,
            });
        } else {
            skipped.push(candidate);
        }
    }

    // Reallocation: hand whatever is left of either bucket to skipped
    // candidates, full first, gist second.
    let mut leftover = (gist_budget - gist_used) + (full_backfill_budget - full_used);
    for candidate in skipped {
        let f = estimate_tokens(&candidate.content);
        if f <= leftover {
            leftover -= f;
            extras.push(PackedEntry {
                id: candidate.id.clone(),
                text: candidate.content.clone(),
                mode: PackMode::Full,
                tokens: f,
                score: candidate.score,
            });
            continue;
        }
        let gist_text = candidate
            .gist
            .clone()
            .unwrap_or_else(|| fallback_gist(&candidate.content));
        let g = estimate_tokens(&gist_text);
        if g <= leftover {
            leftover -= g;
            extras.push(PackedEntry {
                id: candidate.id.clone(),
                text: gist_text,
                mode: PackMode::Gist,
                tokens: g,
                score: candidate.score,
            });
        }
    }

    extras.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut entries = top2_entries;
    entries.extend(extras);
    let total_tokens_used: usize = entries.iter().map(|e| e.tokens).sum();

    PackResult {
        total_tokens_used,
        budget_remaining: budget.saturating_sub(total_tokens_used),
        overflow: false,
        entries,
    }
}

// ============================================================================
// TESTS
// ============================================================================
