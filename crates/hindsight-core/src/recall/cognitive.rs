//! Cognitive scoring mode.
//!
//! Augments (never replaces) the RRF ranking with three ACT-R-flavoured
//! signals: base-level activation from the access history, probe activation
//! spreading from query-anchored entities, and a short-term working-memory
//! boost for candidates touched in the current session.

/// ACT-R base-level decay exponent
pub const ACT_R_DECAY: f64 = 0.5;

/// Working-memory boost for same-session accesses
pub const WM_BOOST: f64 = 0.2;

/// Working-memory window (30 minutes)
pub const WM_WINDOW_MS: i64 = 30 * 60 * 1000;

/// Weight of probe activation in the combined score
pub const PROBE_WEIGHT: f64 = 0.3;

/// Weight of normalised base-level activation in the combined score
pub const BASE_LEVEL_WEIGHT: f64 = 0.2;

const MIN_AGE_HOURS: f64 = 1.0 / 60.0;

/// Base-level activation: sum of t_i^(-d) over past access ages, in hours.
/// Ages are floored at one minute so an access moments ago cannot blow up
/// the sum.
pub fn base_level_activation(access_times_ms: &[i64], now_ms: i64) -> f64 {
    access_times_ms
        .iter()
        .map(|accessed_at| {
            let age_hours = ((now_ms - accessed_at).max(0) as f64 / 3_600_000.0).max(MIN_AGE_HOURS);
            age_hours.powf(-ACT_R_DECAY)
        })
        .sum()
}

/// Probe activation: the share of a candidate's entities whose name appears
/// in the query text. Query-anchored entities spread activation to the
/// memories that mention them.
pub fn probe_activation(query_lower: &str, entity_names: &[String]) -> f64 {
    if entity_names.is_empty() {
        return 0.0;
    }
    let anchored = entity_names
        .iter()
        .filter(|name| {
            let name = name.to_lowercase();
            !name.is_empty() && query_lower.contains(&name)
        })
        .count();
    anchored as f64 / entity_names.len() as f64
}

/// Combined cognitive augmentation for one candidate
pub fn cognitive_bonus(probe: f64, base_level_normalized: f64, in_working_memory: bool) -> f64 {
    PROBE_WEIGHT * probe
        + BASE_LEVEL_WEIGHT * base_level_normalized
        + if in_working_memory { WM_BOOST } else { 0.0 }
}

// ============================================================================
// TESTS
// ============================================================================
