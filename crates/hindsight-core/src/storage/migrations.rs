//! Database Migrations
//!
//! Schema migration definitions for the storage layer.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: banks, memory units, entities, links, decisions",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Location paths, access contexts, and co-access associations",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Visual memories, access log, and the async operation queue",
        up: MIGRATION_V3_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS banks (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    extraction_mode TEXT NOT NULL DEFAULT 'concise',
    dedup_threshold REAL NOT NULL DEFAULT 0.92,
    reflect_budget TEXT NOT NULL DEFAULT 'mid',
    enable_consolidation INTEGER NOT NULL DEFAULT 0,
    custom_guidelines TEXT,
    skepticism INTEGER NOT NULL DEFAULT 0,
    literalism INTEGER NOT NULL DEFAULT 0,
    empathy INTEGER NOT NULL DEFAULT 0,
    mission TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS memory_units (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    fact_type TEXT NOT NULL DEFAULT 'world',
    confidence REAL NOT NULL DEFAULT 1.0,
    tags TEXT NOT NULL DEFAULT '[]',
    scope_profile TEXT,
    scope_project TEXT,
    scope_session TEXT,
    document_id TEXT,
    event_date INTEGER,
    mentioned_at INTEGER NOT NULL,
    occurred_start INTEGER,
    occurred_end INTEGER,
    encoding_strength REAL NOT NULL DEFAULT 1.0,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed INTEGER,
    gist TEXT,
    metadata TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    CHECK (occurred_start IS NULL OR occurred_end IS NULL OR occurred_start <= occurred_end)
);

CREATE INDEX IF NOT EXISTS idx_memory_bank ON memory_units(bank_id);
CREATE INDEX IF NOT EXISTS idx_memory_mentioned ON memory_units(bank_id, mentioned_at);
CREATE INDEX IF NOT EXISTS idx_memory_scope ON memory_units(bank_id, scope_profile, scope_project);

-- FTS5 virtual table for full-text search over memory content
CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
    id,
    content,
    content='memory_units',
    content_rowid='rowid',
    tokenize='porter ascii'
);

-- Triggers to keep FTS in sync
CREATE TRIGGER IF NOT EXISTS memory_units_ai AFTER INSERT ON memory_units BEGIN
    INSERT INTO memory_fts(rowid, id, content)
    VALUES (NEW.rowid, NEW.id, NEW.content);
END;

CREATE TRIGGER IF NOT EXISTS memory_units_ad AFTER DELETE ON memory_units BEGIN
    INSERT INTO memory_fts(memory_fts, rowid, id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content);
END;

CREATE TRIGGER IF NOT EXISTS memory_units_au AFTER UPDATE ON memory_units BEGIN
    INSERT INTO memory_fts(memory_fts, rowid, id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content);
    INSERT INTO memory_fts(rowid, id, content)
    VALUES (NEW.rowid, NEW.id, NEW.content);
END;

-- Reconsolidation snapshots: one row per reconsolidate application
CREATE TABLE IF NOT EXISTS memory_versions (
    id TEXT PRIMARY KEY,
    memory_id TEXT NOT NULL REFERENCES memory_units(id) ON DELETE CASCADE,
    previous_content TEXT NOT NULL,
    new_content TEXT NOT NULL,
    reason TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_versions_memory ON memory_versions(memory_id);

-- Routing audit: one row per ingested fact
CREATE TABLE IF NOT EXISTS reconsolidation_decisions (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    memory_hash TEXT NOT NULL,
    candidate_memory_id TEXT,
    candidate_score REAL,
    route TEXT NOT NULL,
    conflict_detected INTEGER NOT NULL DEFAULT 0,
    conflict_keys TEXT NOT NULL DEFAULT '[]',
    policy_version TEXT NOT NULL DEFAULT 'v1',
    applied_memory_id TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_decisions_bank ON reconsolidation_decisions(bank_id, created_at);

CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    canonical_name TEXT NOT NULL,
    entity_type TEXT NOT NULL DEFAULT 'other',
    description TEXT,
    mention_count INTEGER NOT NULL DEFAULT 1,
    first_seen INTEGER NOT NULL,
    last_updated INTEGER NOT NULL,
    UNIQUE (bank_id, canonical_name)
);

CREATE INDEX IF NOT EXISTS idx_entities_bank ON entities(bank_id);

CREATE TABLE IF NOT EXISTS memory_entities (
    memory_id TEXT NOT NULL REFERENCES memory_units(id) ON DELETE CASCADE,
    entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    PRIMARY KEY (memory_id, entity_id)
);

CREATE INDEX IF NOT EXISTS idx_memory_entities_entity ON memory_entities(entity_id);

CREATE TABLE IF NOT EXISTS memory_links (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    source_id TEXT NOT NULL REFERENCES memory_units(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES memory_units(id) ON DELETE CASCADE,
    link_type TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 1.0,
    created_at INTEGER NOT NULL,
    CHECK (source_id <> target_id)
);

CREATE INDEX IF NOT EXISTS idx_links_source ON memory_links(source_id, link_type);
CREATE INDEX IF NOT EXISTS idx_links_target ON memory_links(target_id, link_type);

-- Embedding vectors as little-endian f32 blobs; the in-memory cosine index
-- is rebuilt from this table at open
CREATE TABLE IF NOT EXISTS memory_embeddings (
    memory_id TEXT PRIMARY KEY REFERENCES memory_units(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    model TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Location signals
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS location_paths (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    raw_path TEXT NOT NULL,
    normalized_path TEXT NOT NULL,
    profile TEXT NOT NULL DEFAULT 'default',
    project TEXT NOT NULL DEFAULT 'default',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (bank_id, normalized_path, profile, project)
);

CREATE TABLE IF NOT EXISTS location_access_contexts (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    path_id TEXT NOT NULL REFERENCES location_paths(id) ON DELETE CASCADE,
    memory_id TEXT NOT NULL,
    session TEXT,
    activity_type TEXT NOT NULL DEFAULT 'access',
    accessed_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_location_access_path ON location_access_contexts(path_id, accessed_at);
CREATE INDEX IF NOT EXISTS idx_location_access_memory ON location_access_contexts(memory_id);
CREATE INDEX IF NOT EXISTS idx_location_access_time ON location_access_contexts(bank_id, accessed_at);

-- One row per unordered path pair: source_path_id < related_path_id
CREATE TABLE IF NOT EXISTS location_associations (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    source_path_id TEXT NOT NULL REFERENCES location_paths(id) ON DELETE CASCADE,
    related_path_id TEXT NOT NULL REFERENCES location_paths(id) ON DELETE CASCADE,
    co_access_count INTEGER NOT NULL DEFAULT 1,
    strength REAL NOT NULL DEFAULT 0.0,
    updated_at INTEGER NOT NULL,
    UNIQUE (bank_id, source_path_id, related_path_id),
    CHECK (source_path_id < related_path_id)
);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// V3: Visual memories, per-memory access log, async operation queue
const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS visual_memories (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    description TEXT NOT NULL,
    media_ref TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_visual_bank ON visual_memories(bank_id);

CREATE TABLE IF NOT EXISTS visual_access (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    visual_id TEXT NOT NULL REFERENCES visual_memories(id) ON DELETE CASCADE,
    accessed_at INTEGER NOT NULL
);

-- Per-memory access history for cognitive-mode base-level activation
CREATE TABLE IF NOT EXISTS memory_access_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    memory_id TEXT NOT NULL REFERENCES memory_units(id) ON DELETE CASCADE,
    session TEXT,
    accessed_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_access_log_memory ON memory_access_log(memory_id, accessed_at);

CREATE TABLE IF NOT EXISTS async_operations (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',
    dedup_hash TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    error TEXT,
    created_at INTEGER NOT NULL,
    started_at INTEGER,
    completed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_operations_status ON async_operations(bank_id, status);
CREATE INDEX IF NOT EXISTS idx_operations_dedup ON async_operations(dedup_hash, status);

UPDATE schema_version SET version = 3, applied_at = datetime('now');
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}
