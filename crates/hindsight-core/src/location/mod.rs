//! Location signals.
//!
//! Memories are often about *somewhere* - a source file, a module, a config
//! path. This module normalises paths, spots path-like tokens in recall
//! queries, resolves them to known path rows, maintains co-access
//! associations within a session window, and computes the additive location
//! boost applied to recall candidates.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{ActivityType, LocationAccessContext, LocationPath, Scope};
use crate::storage::GraphStore;

/// Session window for co-access association updates (30 minutes)
pub const CO_ACCESS_WINDOW_MS: i64 = 30 * 60 * 1000;

/// Recency half-life-ish constant in the frequency/recency boost term (30 days)
const RECENCY_SCALE_MS: f64 = 30.0 * 24.0 * 3_600_000.0;

/// Weight of the direct path-match boost term
const PATH_MATCH_WEIGHT: f64 = 0.12;
/// Weight of the frequency/recency boost term
const FREQ_RECENCY_WEIGHT: f64 = 0.10;
/// Weight of the co-access association boost term
const ASSOCIATION_WEIGHT: f64 = 0.08;

/// Suffix-match candidates returned per unresolved signal
const SUFFIX_MATCH_LIMIT: i64 = 5;

// ============================================================================
// NORMALISATION AND SIGNAL DETECTION
// ============================================================================

/// Normalise a path: trim, backslashes to slashes, collapse slash runs,
/// strip the trailing slash (except for the root), lowercase.
pub fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim().replace('\\', "/");
    let mut collapsed = String::with_capacity(trimmed.len());
    let mut prev_slash = false;
    for ch in trimmed.chars() {
        if ch == '/' {
            if !prev_slash {
                collapsed.push('/');
            }
            prev_slash = true;
        } else {
            collapsed.push(ch);
            prev_slash = false;
        }
    }
    while collapsed.len() > 1 && collapsed.ends_with('/') {
        collapsed.pop();
    }
    collapsed.to_lowercase()
}

fn path_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([./]{0,2}[\w@.\-]+/)+[\w@.\-]+(\.\w+)?").expect("static regex")
    })
}

fn dotted_module_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w\-]+(\.[\w\-]+)+").expect("static regex"))
}

fn sentence_boundary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.[A-Z]").expect("static regex"))
}

fn version_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\d+(\.\d+)*$").expect("static regex"))
}

/// Extract path-like tokens from a query: slash-separated file paths and
/// dotted module names, excluding sentence boundaries ("end.Of sentence")
/// and bare version numbers ("1.2.3"). Deterministic; duplicates removed
/// preserving first appearance.
pub fn detect_location_signals(query: &str) -> Vec<String> {
    fn push(signals: &mut Vec<String>, signal: &str) {
        if signal.len() > 2 && !signals.iter().any(|s| s == signal) {
            signals.push(signal.to_string());
        }
    }

    let mut signals: Vec<String> = Vec::new();
    for m in path_token_re().find_iter(query) {
        push(&mut signals, m.as_str());
    }
    for m in dotted_module_re().find_iter(query) {
        let token = m.as_str();
        if version_number_re().is_match(token) {
            continue;
        }
        if sentence_boundary_re().is_match(token) {
            continue;
        }
        // Skip tokens already covered by a path match
        if signals.iter().any(|s| s.contains(token)) {
            continue;
        }
        push(&mut signals, token);
    }
    signals
}

// ============================================================================
// SIGNAL RESOLUTION
// ============================================================================

/// Resolve detected signals to known path rows: exact match on the
/// normalised form first, suffix match (`%/<normalised>`) capped at
/// `SUFFIX_MATCH_LIMIT` on miss.
pub fn resolve_signals_to_paths(
    store: &GraphStore,
    bank_id: &str,
    signals: &[String],
    scope: Option<&Scope>,
) -> Result<HashMap<String, Vec<String>>> {
    let mut resolved = HashMap::new();
    for signal in signals {
        let normalized = normalize_path(signal);
        if normalized.is_empty() {
            continue;
        }
        let mut paths = store.find_paths_exact(bank_id, &normalized)?;
        if paths.is_empty() {
            paths = store.find_paths_by_suffix(bank_id, &normalized, SUFFIX_MATCH_LIMIT)?;
        }
        if let Some(scope) = scope {
            paths.retain(|p| scope_admits(p, scope));
        }
        if !paths.is_empty() {
            resolved.insert(signal.clone(), paths.into_iter().map(|p| p.id).collect());
        }
    }
    Ok(resolved)
}

fn scope_admits(path: &LocationPath, scope: &Scope) -> bool {
    let profile_ok = scope
        .profile
        .as_deref()
        .map(|p| p == path.profile)
        .unwrap_or(true);
    let project_ok = scope
        .project
        .as_deref()
        .map(|p| p == path.project)
        .unwrap_or(true);
    profile_ok && project_ok
}

// ============================================================================
// RECORDING AND CO-ACCESS
// ============================================================================

/// Record that `memory_ids` were touched at `raw_path`, then update
/// co-access associations for every other path touched within the session
/// window. Conflicts on the association upsert are logged and skipped -
/// the increment is commutative so a retry is safe.
#[allow(clippy::too_many_arguments)]
pub fn record_access(
    store: &GraphStore,
    bank_id: &str,
    raw_path: &str,
    memory_ids: &[String],
    scope: &Scope,
    activity: ActivityType,
    now: i64,
) -> Result<LocationPath> {
    let normalized = normalize_path(raw_path);
    let profile = scope.profile.as_deref().unwrap_or("default");
    let project = scope.project.as_deref().unwrap_or("default");
    let path = store.upsert_location_path(bank_id, raw_path, &normalized, profile, project, now)?;

    for memory_id in memory_ids {
        store.insert_access_context(&LocationAccessContext {
            id: Uuid::new_v4().to_string(),
            bank_id: bank_id.to_string(),
            path_id: path.id.clone(),
            memory_id: memory_id.clone(),
            session: scope.session.clone(),
            activity_type: activity,
            accessed_at: now,
        })?;
    }

    let window_start = now - CO_ACCESS_WINDOW_MS;
    for other in store.paths_touched_since(bank_id, window_start, &path.id)? {
        if let Err(e) = store.bump_association(bank_id, &path.id, &other, now) {
            tracing::warn!("co-access update skipped for ({}, {}): {}", path.id, other, e);
        }
    }

    Ok(path)
}

// ============================================================================
// LOCATION BOOST
// ============================================================================

/// Breakdown of one candidate's location boost
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationBoost {
    /// 0.12 term: a candidate path directly matches a query path
    pub path_match: f64,
    /// 0.10 term: per-path access frequency decayed by recency
    pub frequency_recency: f64,
    /// 0.08 term: strongest co-access association to a query path
    pub association: f64,
}

impl LocationBoost {
    /// Sum of the three terms
    pub fn total(&self) -> f64 {
        self.path_match + self.frequency_recency + self.association
    }
}

/// Compute the additive boost for one candidate memory given the query's
/// resolved path ids.
///
///     boost = 0.12 * (any candidate path matches a query path)
///           + 0.10 * max_p normalize(log1p(count_p) * exp(-dt_p / 30d))
///           + 0.08 * max_p (assoc.strength / max_strength)
pub fn location_boost(
    store: &GraphStore,
    bank_id: &str,
    memory_id: &str,
    query_path_ids: &[String],
    now: i64,
) -> Result<LocationBoost> {
    if query_path_ids.is_empty() {
        return Ok(LocationBoost::default());
    }

    let stats = store.memory_path_access_stats(memory_id)?;
    if stats.is_empty() {
        return Ok(LocationBoost::default());
    }

    let direct_match = stats
        .iter()
        .any(|(path_id, _, _)| query_path_ids.iter().any(|q| q == path_id));

    let mut best_freq_recency = 0.0f64;
    for (_, count, last_accessed) in &stats {
        let dt = (now - last_accessed).max(0) as f64;
        let raw = (*count as f64).ln_1p() * (-dt / RECENCY_SCALE_MS).exp();
        // Normalise through x/(1+x): monotone, 0 at no accesses, asymptote 1
        let normalized = raw / (1.0 + raw);
        best_freq_recency = best_freq_recency.max(normalized);
    }

    let max_strength = store.max_association_strength(bank_id)?;
    let mut best_association = 0.0f64;
    if max_strength > 0.0 {
        let candidate_paths: Vec<&String> = stats.iter().map(|(p, _, _)| p).collect();
        for query_path in query_path_ids {
            for assoc in store.associations_for_path(query_path)? {
                let other = if &assoc.source_path_id == query_path {
                    &assoc.related_path_id
                } else {
                    &assoc.source_path_id
                };
                if candidate_paths.iter().any(|p| *p == other) {
                    best_association = best_association.max(assoc.strength / max_strength);
                }
            }
        }
    }

    Ok(LocationBoost {
        path_match: if direct_match { PATH_MATCH_WEIGHT } else { 0.0 },
        frequency_recency: FREQ_RECENCY_WEIGHT * best_freq_recency,
        association: ASSOCIATION_WEIGHT * best_association,
    })
}

// ============================================================================
// TESTS
// ============================================================================
