//! Scope tags and isolation rules.
//!
//! A scope is a `(profile, project, session?)` triple attached to every
//! memory at retain time and used as a filter at recall time. Strict mode
//! guarantees zero cross-project bleed while still admitting legacy rows
//! that predate scoping (both fields null).

use serde::{Deserialize, Serialize};

/// Default value for unset profile/project fields
pub const DEFAULT_SCOPE_FIELD: &str = "default";

/// A `(profile, project, session?)` tag triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Scope {
    /// Profile tag
    #[serde(default)]
    pub profile: Option<String>,
    /// Project tag
    #[serde(default)]
    pub project: Option<String>,
    /// Session tag
    #[serde(default)]
    pub session: Option<String>,
}

impl Scope {
    /// Build a fully-specified scope
    pub fn new(profile: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            profile: Some(profile.into()),
            project: Some(project.into()),
            session: None,
        }
    }

    /// Whether both profile and project are set
    pub fn is_fully_specified(&self) -> bool {
        self.profile.is_some() && self.project.is_some()
    }
}

/// How strictly recall enforces scope isolation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScopeMode {
    /// Per-field null-or-equal matching; legacy rows always match
    #[default]
    Strict,
    /// No scope filtering at all
    Broad,
}

impl ScopeMode {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeMode::Strict => "strict",
            ScopeMode::Broad => "broad",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "broad" => ScopeMode::Broad,
            _ => ScopeMode::Strict,
        }
    }
}

/// Resolve the effective scope for an operation.
///
/// An explicit fully-specified pair wins outright. Otherwise explicit fields
/// are merged over context fields, and anything still missing falls back to
/// `"default"`. Session propagates explicit-first, then context, else unset.
pub fn resolve_scope(explicit: Option<&Scope>, context: Option<&Scope>) -> Scope {
    if let Some(explicit) = explicit {
        if explicit.is_fully_specified() {
            return Scope {
                profile: explicit.profile.clone(),
                project: explicit.project.clone(),
                session: explicit
                    .session
                    .clone()
                    .or_else(|| context.and_then(|c| c.session.clone())),
            };
        }
    }

    let pick = |f: fn(&Scope) -> Option<&String>| {
        explicit
            .and_then(|s| f(s).cloned())
            .or_else(|| context.and_then(|s| f(s).cloned()))
    };

    Scope {
        profile: Some(pick(|s| s.profile.as_ref()).unwrap_or_else(|| DEFAULT_SCOPE_FIELD.to_string())),
        project: Some(pick(|s| s.project.as_ref()).unwrap_or_else(|| DEFAULT_SCOPE_FIELD.to_string())),
        session: pick(|s| s.session.as_ref()),
    }
}

/// Derive the scope tags to stamp on produced rows from ambient context
/// alone (no explicit scope): context fields with `"default"` fill-ins.
pub fn derive_scope_tags_from_context(context: Option<&Scope>) -> Scope {
    resolve_scope(None, context)
}

/// Decide whether a memory's stored scope tags pass a recall filter.
///
/// `broad` admits everything. `strict` admits legacy rows (both fields
/// null), otherwise each non-null field must equal the filter's.
pub fn scope_matches(
    memory_profile: Option<&str>,
    memory_project: Option<&str>,
    filter: &Scope,
    mode: ScopeMode,
) -> bool {
    if mode == ScopeMode::Broad {
        return true;
    }
    if memory_profile.is_none() && memory_project.is_none() {
        return true;
    }

    let profile_ok = match (memory_profile, filter.profile.as_deref()) {
        (None, _) => true,
        (Some(_), None) => true,
        (Some(m), Some(f)) => m == f,
    };
    let project_ok = match (memory_project, filter.project.as_deref()) {
        (None, _) => true,
        (Some(_), None) => true,
        (Some(m), Some(f)) => m == f,
    };
    profile_ok && project_ok
}

// ============================================================================
// TESTS
// ============================================================================
