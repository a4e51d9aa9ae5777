//! SQLite Storage Implementation
//!
//! Core graph store: banks, memory units + FTS5, entities, typed links,
//! location rows, routing decisions, version snapshots, visual memories,
//! and the async operation queue.
//!
//! Uses separate reader/writer connections for interior mutability. All
//! methods take `&self`, making the store `Send + Sync` so the engine can
//! hold it in an `Arc` without an outer lock. Multi-statement ingest
//! operations run under a savepoint so a mid-application failure never
//! leaves a fact half-applied.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{HindsightError, Result};
use crate::model::{
    Bank, BankConfig, BankStats, Disposition, Entity, EntityType, ExtractionMode, FactType,
    LinkType, LocationAccessContext, LocationAssociation, LocationPath, MemoryLink, MemoryUnit,
    MemoryVersion, ReconRoute, ReconsolidationDecision, ReflectBudget,
};

use super::vector::{vector_from_bytes, vector_to_bytes};

// ============================================================================
// RECORD TYPES
// ============================================================================

/// Row of the async operation queue
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning bank
    pub bank_id: String,
    /// Operation kind: "retain", "consolidation", "refresh_mental_model"
    pub kind: String,
    /// Serialized work item
    pub payload: String,
    /// SHA-256 over (bank, kind, payload) used for submit dedup
    pub dedup_hash: String,
    /// pending | processing | completed | failed | cancelled
    pub status: String,
    /// Failure description for failed operations
    pub error: Option<String>,
    /// Enqueue time (epoch ms)
    pub created_at: i64,
    /// Processing start time (epoch ms)
    pub started_at: Option<i64>,
    /// Terminal time (epoch ms)
    pub completed_at: Option<i64>,
}

/// Fields rewritten on the canonical memory during a reconsolidate route
#[derive(Debug, Clone)]
pub struct ReconsolidateUpdate {
    /// New content
    pub content: String,
    /// New fact type
    pub fact_type: FactType,
    /// New confidence
    pub confidence: f64,
    /// New tags
    pub tags: Vec<String>,
    /// New occurred range start
    pub occurred_start: Option<i64>,
    /// New occurred range end
    pub occurred_end: Option<i64>,
    /// Update time (epoch ms)
    pub updated_at: i64,
}

// ============================================================================
// GRAPH STORE
// ============================================================================

/// SQLite-backed graph store
pub struct GraphStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl GraphStore {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (and migrate) the database at `db_path`, or the platform
    /// default data directory when `None`.
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = ProjectDirs::from("ai", "hindsight", "core").ok_or_else(|| {
                    HindsightError::Init("Could not determine project directories".to_string())
                })?;
                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                data_dir.join("hindsight.db")
            }
        };

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    fn write(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| HindsightError::Init("Writer lock poisoned".into()))
    }

    fn read(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| HindsightError::Init("Reader lock poisoned".into()))
    }

    /// Run `f` against the writer inside a savepoint. Commits on `Ok`,
    /// rolls back on `Err`.
    pub fn with_savepoint<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut writer = self.write()?;
        let sp = writer.savepoint()?;
        let out = f(&sp)?;
        sp.commit()?;
        Ok(out)
    }

    // ========================================================================
    // BANKS
    // ========================================================================

    /// Insert a bank row
    pub fn insert_bank(&self, bank: &Bank) -> Result<()> {
        let writer = self.write()?;
        writer.execute(
            "INSERT INTO banks (
                id, name, extraction_mode, dedup_threshold, reflect_budget,
                enable_consolidation, custom_guidelines,
                skepticism, literalism, empathy, mission, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                bank.id,
                bank.name,
                bank.config.extraction_mode.as_str(),
                bank.config.dedup_threshold,
                bank.config.reflect_budget.as_str(),
                bank.config.enable_consolidation as i64,
                bank.config.custom_guidelines,
                bank.disposition.skepticism,
                bank.disposition.literalism,
                bank.disposition.empathy,
                bank.mission,
                bank.created_at,
                bank.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Fetch a bank by id
    pub fn get_bank(&self, id: &str) -> Result<Option<Bank>> {
        let reader = self.read()?;
        let bank = reader
            .query_row(
                "SELECT id, name, extraction_mode, dedup_threshold, reflect_budget,
                        enable_consolidation, custom_guidelines,
                        skepticism, literalism, empathy, mission, created_at, updated_at
                 FROM banks WHERE id = ?1",
                params![id],
                Self::row_to_bank,
            )
            .optional()?;
        Ok(bank)
    }

    /// List every bank
    pub fn list_banks(&self) -> Result<Vec<Bank>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT id, name, extraction_mode, dedup_threshold, reflect_budget,
                    enable_consolidation, custom_guidelines,
                    skepticism, literalism, empathy, mission, created_at, updated_at
             FROM banks ORDER BY created_at",
        )?;
        let banks = stmt
            .query_map([], Self::row_to_bank)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(banks)
    }

    /// Rewrite a bank row
    pub fn update_bank(&self, bank: &Bank) -> Result<()> {
        let writer = self.write()?;
        let changed = writer.execute(
            "UPDATE banks SET
                name = ?2, extraction_mode = ?3, dedup_threshold = ?4,
                reflect_budget = ?5, enable_consolidation = ?6, custom_guidelines = ?7,
                skepticism = ?8, literalism = ?9, empathy = ?10, mission = ?11,
                updated_at = ?12
             WHERE id = ?1",
            params![
                bank.id,
                bank.name,
                bank.config.extraction_mode.as_str(),
                bank.config.dedup_threshold,
                bank.config.reflect_budget.as_str(),
                bank.config.enable_consolidation as i64,
                bank.config.custom_guidelines,
                bank.disposition.skepticism,
                bank.disposition.literalism,
                bank.disposition.empathy,
                bank.mission,
                bank.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(HindsightError::NotFound(format!("bank {}", bank.id)));
        }
        Ok(())
    }

    /// Delete a bank; cascades through every bank-keyed table
    pub fn delete_bank(&self, id: &str) -> Result<bool> {
        let writer = self.write()?;
        let changed = writer.execute("DELETE FROM banks WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Aggregate counts and strength/confidence averages for one bank
    pub fn bank_stats(&self, bank_id: &str) -> Result<BankStats> {
        let reader = self.read()?;
        let (memory_count, average_encoding_strength, average_confidence, oldest, newest): (
            i64,
            Option<f64>,
            Option<f64>,
            Option<i64>,
            Option<i64>,
        ) = reader.query_row(
            "SELECT COUNT(*), AVG(encoding_strength), AVG(confidence),
                    MIN(mentioned_at), MAX(mentioned_at)
             FROM memory_units WHERE bank_id = ?1",
            params![bank_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )?;
        let entity_count: i64 = reader.query_row(
            "SELECT COUNT(*) FROM entities WHERE bank_id = ?1",
            params![bank_id],
            |row| row.get(0),
        )?;
        let link_count: i64 = reader.query_row(
            "SELECT COUNT(*) FROM memory_links WHERE bank_id = ?1",
            params![bank_id],
            |row| row.get(0),
        )?;
        let version_count: i64 = reader.query_row(
            "SELECT COUNT(*) FROM memory_versions v
             JOIN memory_units m ON m.id = v.memory_id
             WHERE m.bank_id = ?1",
            params![bank_id],
            |row| row.get(0),
        )?;
        let decision_count: i64 = reader.query_row(
            "SELECT COUNT(*) FROM reconsolidation_decisions WHERE bank_id = ?1",
            params![bank_id],
            |row| row.get(0),
        )?;

        Ok(BankStats {
            memory_count,
            entity_count,
            link_count,
            version_count,
            decision_count,
            average_encoding_strength: average_encoding_strength.unwrap_or(0.0),
            average_confidence: average_confidence.unwrap_or(0.0),
            oldest_mentioned_at: oldest,
            newest_mentioned_at: newest,
        })
    }

    fn row_to_bank(row: &rusqlite::Row) -> rusqlite::Result<Bank> {
        let extraction_mode: String = row.get(2)?;
        let reflect_budget: String = row.get(4)?;
        Ok(Bank {
            id: row.get(0)?,
            name: row.get(1)?,
            config: BankConfig {
                extraction_mode: ExtractionMode::parse_name(&extraction_mode),
                dedup_threshold: row.get(3)?,
                reflect_budget: ReflectBudget::parse_name(&reflect_budget),
                enable_consolidation: row.get::<_, i64>(5)? != 0,
                custom_guidelines: row.get(6)?,
            },
            disposition: Disposition {
                skepticism: row.get(7)?,
                literalism: row.get(8)?,
                empathy: row.get(9)?,
            },
            mission: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    // ========================================================================
    // MEMORY UNITS
    // ========================================================================

    const MEMORY_COLUMNS: &'static str = "id, bank_id, content, fact_type, confidence, tags, \
        scope_profile, scope_project, scope_session, document_id, event_date, mentioned_at, \
        occurred_start, occurred_end, encoding_strength, access_count, last_accessed, gist, \
        metadata, created_at, updated_at";

    fn insert_memory_stmt(conn: &Connection, memory: &MemoryUnit) -> Result<()> {
        let tags_json = serde_json::to_string(&memory.tags).unwrap_or_else(|_| "[]".to_string());
        conn.execute(
            "INSERT INTO memory_units (
                id, bank_id, content, fact_type, confidence, tags,
                scope_profile, scope_project, scope_session, document_id, event_date,
                mentioned_at, occurred_start, occurred_end, encoding_strength,
                access_count, last_accessed, gist, metadata, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                      ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
            params![
                memory.id,
                memory.bank_id,
                memory.content,
                memory.fact_type.as_str(),
                memory.confidence,
                tags_json,
                memory.scope_profile,
                memory.scope_project,
                memory.scope_session,
                memory.document_id,
                memory.event_date,
                memory.mentioned_at,
                memory.occurred_start,
                memory.occurred_end,
                memory.encoding_strength,
                memory.access_count,
                memory.last_accessed,
                memory.gist,
                memory.metadata,
                memory.created_at,
                memory.updated_at,
            ],
        )?;
        Ok(())
    }

    fn insert_decision_stmt(conn: &Connection, decision: &ReconsolidationDecision) -> Result<()> {
        let keys_json =
            serde_json::to_string(&decision.conflict_keys).unwrap_or_else(|_| "[]".to_string());
        conn.execute(
            "INSERT INTO reconsolidation_decisions (
                id, bank_id, memory_hash, candidate_memory_id, candidate_score,
                route, conflict_detected, conflict_keys, policy_version,
                applied_memory_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                decision.id,
                decision.bank_id,
                decision.memory_hash,
                decision.candidate_memory_id,
                decision.candidate_score,
                decision.route.as_str(),
                decision.conflict_detected as i64,
                keys_json,
                decision.policy_version,
                decision.applied_memory_id,
                decision.created_at,
            ],
        )?;
        Ok(())
    }

    fn upsert_embedding_stmt(
        conn: &Connection,
        memory_id: &str,
        vector: &[f32],
        model: &str,
        now: i64,
    ) -> Result<()> {
        // The blob table carries no upsert semantics: delete then insert.
        conn.execute(
            "DELETE FROM memory_embeddings WHERE memory_id = ?1",
            params![memory_id],
        )?;
        conn.execute(
            "INSERT INTO memory_embeddings (memory_id, embedding, dimensions, model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![memory_id, vector_to_bytes(vector), vector.len() as i64, model, now],
        )?;
        Ok(())
    }

    /// Apply a `new_trace` route: memory row, embedding, and decision row
    /// under one savepoint.
    pub fn apply_new_trace(
        &self,
        memory: &MemoryUnit,
        vector: &[f32],
        model: &str,
        decision: &ReconsolidationDecision,
    ) -> Result<()> {
        self.with_savepoint(|conn| {
            Self::insert_memory_stmt(conn, memory)?;
            Self::upsert_embedding_stmt(conn, &memory.id, vector, model, memory.created_at)?;
            Self::insert_decision_stmt(conn, decision)?;
            Ok(())
        })
    }

    /// Apply a `reinforce` route: metadata-only bump plus the decision row.
    /// Never creates a memory row or version row.
    pub fn apply_reinforce(
        &self,
        memory_id: &str,
        strength_increment: f64,
        now: i64,
        decision: &ReconsolidationDecision,
    ) -> Result<()> {
        self.with_savepoint(|conn| {
            let changed = conn.execute(
                "UPDATE memory_units SET
                    access_count = access_count + 1,
                    last_accessed = ?2,
                    encoding_strength = encoding_strength + ?3,
                    updated_at = ?2
                 WHERE id = ?1",
                params![memory_id, now, strength_increment],
            )?;
            if changed == 0 {
                return Err(HindsightError::NotFound(format!("memory {}", memory_id)));
            }
            Self::insert_decision_stmt(conn, decision)?;
            Ok(())
        })
    }

    /// Apply a `reconsolidate` route: exactly one version snapshot, the
    /// canonical rewrite, an embedding refresh, and the decision row.
    pub fn apply_reconsolidate(
        &self,
        version: &MemoryVersion,
        update: &ReconsolidateUpdate,
        vector: &[f32],
        model: &str,
        decision: &ReconsolidationDecision,
    ) -> Result<()> {
        self.with_savepoint(|conn| {
            conn.execute(
                "INSERT INTO memory_versions (
                    id, memory_id, previous_content, new_content, reason, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    version.id,
                    version.versioned_memory_id,
                    version.previous_content,
                    version.new_content,
                    version.reason,
                    version.created_at,
                ],
            )?;
            let tags_json =
                serde_json::to_string(&update.tags).unwrap_or_else(|_| "[]".to_string());
            let changed = conn.execute(
                "UPDATE memory_units SET
                    content = ?2, fact_type = ?3, confidence = ?4, tags = ?5,
                    occurred_start = ?6, occurred_end = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![
                    version.versioned_memory_id,
                    update.content,
                    update.fact_type.as_str(),
                    update.confidence,
                    tags_json,
                    update.occurred_start,
                    update.occurred_end,
                    update.updated_at,
                ],
            )?;
            if changed == 0 {
                return Err(HindsightError::NotFound(format!(
                    "memory {}",
                    version.versioned_memory_id
                )));
            }
            Self::upsert_embedding_stmt(
                conn,
                &version.versioned_memory_id,
                vector,
                model,
                update.updated_at,
            )?;
            Self::insert_decision_stmt(conn, decision)?;
            Ok(())
        })
    }

    /// Fetch a memory with its entity ids hydrated
    pub fn get_memory(&self, id: &str) -> Result<Option<MemoryUnit>> {
        let reader = self.read()?;
        let memory = reader
            .query_row(
                &format!(
                    "SELECT {} FROM memory_units WHERE id = ?1",
                    Self::MEMORY_COLUMNS
                ),
                params![id],
                Self::row_to_memory,
            )
            .optional()?;
        let Some(mut memory) = memory else {
            return Ok(None);
        };
        memory.entities = Self::entity_ids_stmt(&reader, id)?;
        Ok(Some(memory))
    }

    /// List a bank's memories, newest mention first
    pub fn list_memory_units(
        &self,
        bank_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MemoryUnit>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {} FROM memory_units WHERE bank_id = ?1
             ORDER BY mentioned_at DESC LIMIT ?2 OFFSET ?3",
            Self::MEMORY_COLUMNS
        ))?;
        let mut memories = stmt
            .query_map(params![bank_id, limit, offset], Self::row_to_memory)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for memory in &mut memories {
            memory.entities = Self::entity_ids_stmt(&reader, &memory.id)?;
        }
        Ok(memories)
    }

    /// Delete a memory (embedding row and junctions cascade)
    pub fn delete_memory(&self, id: &str) -> Result<bool> {
        let writer = self.write()?;
        let changed = writer.execute("DELETE FROM memory_units WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Content for a set of ids; missing (deleted) ids are absent
    pub fn memory_content_map(&self, ids: &[String]) -> Result<HashMap<String, String>> {
        let reader = self.read()?;
        let mut map = HashMap::with_capacity(ids.len());
        let mut stmt = reader.prepare("SELECT content FROM memory_units WHERE id = ?1")?;
        for id in ids {
            if let Some(content) = stmt
                .query_row(params![id], |row| row.get::<_, String>(0))
                .optional()?
            {
                map.insert(id.clone(), content);
            }
        }
        Ok(map)
    }

    /// All memory ids in a bank (the vector-index bank filter)
    pub fn memory_ids_for_bank(&self, bank_id: &str) -> Result<HashSet<String>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare("SELECT id FROM memory_units WHERE bank_id = ?1")?;
        let ids = stmt
            .query_map(params![bank_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(ids)
    }

    /// Bump access counters on recall hits. Commutative, safe to run
    /// concurrently with other recalls.
    pub fn touch_memories(&self, ids: &[String], now: i64) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let writer = self.write()?;
        let mut stmt = writer.prepare(
            "UPDATE memory_units SET access_count = access_count + 1, last_accessed = ?2
             WHERE id = ?1",
        )?;
        for id in ids {
            stmt.execute(params![id, now])?;
        }
        Ok(())
    }

    /// Store a generated gist on a memory
    pub fn update_gist(&self, memory_id: &str, gist: &str) -> Result<()> {
        let writer = self.write()?;
        writer.execute(
            "UPDATE memory_units SET gist = ?2 WHERE id = ?1",
            params![memory_id, gist],
        )?;
        Ok(())
    }

    /// Memories mentioned within [from, to], newest first
    pub fn memories_in_range(
        &self,
        bank_id: &str,
        from: i64,
        to: i64,
        limit: i64,
    ) -> Result<Vec<(String, i64)>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT id, mentioned_at FROM memory_units
             WHERE bank_id = ?1 AND mentioned_at >= ?2 AND mentioned_at <= ?3
             ORDER BY mentioned_at DESC, id ASC LIMIT ?4",
        )?;
        let rows = stmt
            .query_map(params![bank_id, from, to, limit], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<MemoryUnit> {
        let fact_type: String = row.get(3)?;
        let tags_json: String = row.get(5)?;
        Ok(MemoryUnit {
            id: row.get(0)?,
            bank_id: row.get(1)?,
            content: row.get(2)?,
            fact_type: FactType::parse_name(&fact_type),
            confidence: row.get(4)?,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            entities: vec![],
            scope_profile: row.get(6)?,
            scope_project: row.get(7)?,
            scope_session: row.get(8)?,
            document_id: row.get(9)?,
            event_date: row.get(10)?,
            mentioned_at: row.get(11)?,
            occurred_start: row.get(12)?,
            occurred_end: row.get(13)?,
            encoding_strength: row.get(14)?,
            access_count: row.get(15)?,
            last_accessed: row.get(16)?,
            gist: row.get(17)?,
            metadata: row.get(18)?,
            created_at: row.get(19)?,
            updated_at: row.get(20)?,
        })
    }

    // ========================================================================
    // FULL-TEXT SEARCH
    // ========================================================================

    /// BM25 search over memory content. When `tags` is supplied, only
    /// memories carrying at least one of them are considered (pre-filter).
    pub fn fulltext_search(
        &self,
        bank_id: &str,
        query: &str,
        limit: i64,
        tags: Option<&[String]>,
    ) -> Result<Vec<(String, f64)>> {
        let sanitized = sanitize_fts_query(query);
        if sanitized.is_empty() {
            return Ok(vec![]);
        }

        let reader = self.read()?;
        let mut sql = String::from(
            "SELECT m.id, bm25(memory_fts) AS rank FROM memory_units m
             JOIN memory_fts fts ON m.id = fts.id
             WHERE memory_fts MATCH ?1 AND m.bank_id = ?2",
        );
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(sanitized),
            Box::new(bank_id.to_string()),
        ];
        if let Some(tags) = tags.filter(|t| !t.is_empty()) {
            let placeholders = (0..tags.len())
                .map(|i| format!("?{}", i + 3))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM json_each(m.tags) WHERE json_each.value IN ({}))",
                placeholders
            ));
            for tag in tags {
                bound.push(Box::new(tag.clone()));
            }
        }
        sql.push_str(&format!(" ORDER BY rank ASC, m.id ASC LIMIT ?{}", bound.len() + 1));
        bound.push(Box::new(limit));

        let mut stmt = reader.prepare(&sql)?;
        let bound_refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(bound_refs.as_slice(), |row| {
                let id: String = row.get(0)?;
                let rank: f64 = row.get(1)?;
                Ok((id, rank))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // bm25() returns lower-is-better; flip into a descending score.
        Ok(rows
            .into_iter()
            .map(|(id, rank)| (id, 1.0 / (1.0 + rank.max(0.0))))
            .collect())
    }

    // ========================================================================
    // ENTITIES
    // ========================================================================

    /// Upsert by (bank, canonical name): inserts with mention_count 1 or
    /// increments the existing counter. `first_seen` never moves.
    pub fn upsert_entity(
        &self,
        bank_id: &str,
        name: &str,
        canonical_name: &str,
        entity_type: EntityType,
        now: i64,
    ) -> Result<Entity> {
        let writer = self.write()?;
        let existing: Option<String> = writer
            .query_row(
                "SELECT id FROM entities WHERE bank_id = ?1 AND canonical_name = ?2",
                params![bank_id, canonical_name],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => {
                writer.execute(
                    "UPDATE entities SET mention_count = mention_count + 1, last_updated = ?2
                     WHERE id = ?1",
                    params![id, now],
                )?;
                id
            }
            None => {
                let id = Uuid::new_v4().to_string();
                writer.execute(
                    "INSERT INTO entities (
                        id, bank_id, name, canonical_name, entity_type,
                        mention_count, first_seen, last_updated
                    ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
                    params![id, bank_id, name, canonical_name, entity_type.as_str(), now],
                )?;
                id
            }
        };

        let entity = writer.query_row(
            "SELECT id, bank_id, name, canonical_name, entity_type, description,
                    mention_count, first_seen, last_updated
             FROM entities WHERE id = ?1",
            params![id],
            Self::row_to_entity,
        )?;
        Ok(entity)
    }

    /// Fetch an entity by id
    pub fn get_entity(&self, id: &str) -> Result<Option<Entity>> {
        let reader = self.read()?;
        let entity = reader
            .query_row(
                "SELECT id, bank_id, name, canonical_name, entity_type, description,
                        mention_count, first_seen, last_updated
                 FROM entities WHERE id = ?1",
                params![id],
                Self::row_to_entity,
            )
            .optional()?;
        Ok(entity)
    }

    /// List a bank's entities by descending mention count
    pub fn list_entities(&self, bank_id: &str, limit: i64, offset: i64) -> Result<Vec<Entity>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT id, bank_id, name, canonical_name, entity_type, description,
                    mention_count, first_seen, last_updated
             FROM entities WHERE bank_id = ?1
             ORDER BY mention_count DESC, canonical_name ASC LIMIT ?2 OFFSET ?3",
        )?;
        let entities = stmt
            .query_map(params![bank_id, limit, offset], Self::row_to_entity)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entities)
    }

    /// Update an entity's description and/or type
    pub fn update_entity(
        &self,
        id: &str,
        description: Option<&str>,
        entity_type: Option<EntityType>,
        now: i64,
    ) -> Result<Entity> {
        {
            let writer = self.write()?;
            let changed = writer.execute(
                "UPDATE entities SET
                    description = COALESCE(?2, description),
                    entity_type = COALESCE(?3, entity_type),
                    last_updated = ?4
                 WHERE id = ?1",
                params![id, description, entity_type.map(|t| t.as_str()), now],
            )?;
            if changed == 0 {
                return Err(HindsightError::NotFound(format!("entity {}", id)));
            }
        }
        self.get_entity(id)?
            .ok_or_else(|| HindsightError::NotFound(format!("entity {}", id)))
    }

    /// Insert a junction row (idempotent)
    pub fn link_memory_entity(&self, memory_id: &str, entity_id: &str) -> Result<()> {
        let writer = self.write()?;
        writer.execute(
            "INSERT OR IGNORE INTO memory_entities (memory_id, entity_id) VALUES (?1, ?2)",
            params![memory_id, entity_id],
        )?;
        Ok(())
    }

    /// Replace a memory's junction rows with a new entity set
    pub fn replace_memory_entities(&self, memory_id: &str, entity_ids: &[String]) -> Result<()> {
        self.with_savepoint(|conn| {
            conn.execute(
                "DELETE FROM memory_entities WHERE memory_id = ?1",
                params![memory_id],
            )?;
            for entity_id in entity_ids {
                conn.execute(
                    "INSERT OR IGNORE INTO memory_entities (memory_id, entity_id) VALUES (?1, ?2)",
                    params![memory_id, entity_id],
                )?;
            }
            Ok(())
        })
    }

    fn entity_ids_stmt(conn: &Connection, memory_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT entity_id FROM memory_entities WHERE memory_id = ?1 ORDER BY entity_id",
        )?;
        let ids = stmt
            .query_map(params![memory_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Entity ids linked to a memory
    pub fn entity_ids_for_memory(&self, memory_id: &str) -> Result<Vec<String>> {
        let reader = self.read()?;
        Self::entity_ids_stmt(&reader, memory_id)
    }

    /// Entities linked to a memory, fully hydrated
    pub fn entities_for_memory(&self, memory_id: &str) -> Result<Vec<Entity>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT e.id, e.bank_id, e.name, e.canonical_name, e.entity_type, e.description,
                    e.mention_count, e.first_seen, e.last_updated
             FROM entities e JOIN memory_entities me ON me.entity_id = e.id
             WHERE me.memory_id = ?1 ORDER BY e.canonical_name",
        )?;
        let entities = stmt
            .query_map(params![memory_id], Self::row_to_entity)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entities)
    }

    /// Memory ids mentioning an entity
    pub fn memory_ids_for_entity(&self, entity_id: &str) -> Result<Vec<String>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT memory_id FROM memory_entities WHERE entity_id = ?1 ORDER BY memory_id",
        )?;
        let ids = stmt
            .query_map(params![entity_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Other memories sharing at least one entity with `memory_id`,
    /// with the shared-entity count per neighbour
    pub fn memories_sharing_entities(&self, memory_id: &str) -> Result<Vec<(String, i64)>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT other.memory_id, COUNT(*) AS shared
             FROM memory_entities own
             JOIN memory_entities other
               ON other.entity_id = own.entity_id AND other.memory_id <> own.memory_id
             WHERE own.memory_id = ?1
             GROUP BY other.memory_id
             ORDER BY shared DESC, other.memory_id ASC",
        )?;
        let rows = stmt
            .query_map(params![memory_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Look up entities by canonical name within a bank
    pub fn find_entities_by_canonical(
        &self,
        bank_id: &str,
        canonical_names: &[String],
    ) -> Result<Vec<Entity>> {
        let reader = self.read()?;
        let mut out = Vec::new();
        let mut stmt = reader.prepare(
            "SELECT id, bank_id, name, canonical_name, entity_type, description,
                    mention_count, first_seen, last_updated
             FROM entities WHERE bank_id = ?1 AND canonical_name = ?2",
        )?;
        for name in canonical_names {
            if let Some(entity) = stmt
                .query_row(params![bank_id, name], Self::row_to_entity)
                .optional()?
            {
                out.push(entity);
            }
        }
        Ok(out)
    }

    fn row_to_entity(row: &rusqlite::Row) -> rusqlite::Result<Entity> {
        let entity_type: String = row.get(4)?;
        Ok(Entity {
            id: row.get(0)?,
            bank_id: row.get(1)?,
            name: row.get(2)?,
            canonical_name: row.get(3)?,
            entity_type: EntityType::parse_name(&entity_type),
            description: row.get(5)?,
            mention_count: row.get(6)?,
            first_seen: row.get(7)?,
            last_updated: row.get(8)?,
        })
    }

    // ========================================================================
    // LINKS
    // ========================================================================

    /// Insert a typed edge. Self-edges and out-of-range weights are rejected.
    pub fn insert_link(&self, link: &MemoryLink) -> Result<()> {
        if link.source_id == link.target_id {
            return Err(HindsightError::InvalidInput(format!(
                "link source and target must differ, both are {}",
                link.source_id
            )));
        }
        if !(0.0..=1.0).contains(&link.weight) {
            return Err(HindsightError::InvalidInput(format!(
                "link weight must be in [0, 1], got {}",
                link.weight
            )));
        }
        let writer = self.write()?;
        writer.execute(
            "INSERT INTO memory_links (id, bank_id, source_id, target_id, link_type, weight, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                link.id,
                link.bank_id,
                link.source_id,
                link.target_id,
                link.link_type.as_str(),
                link.weight,
                link.created_at,
            ],
        )?;
        Ok(())
    }

    /// Edges of the given types touching any of `ids`, in either direction
    pub fn links_touching(
        &self,
        ids: &[String],
        link_types: &[LinkType],
    ) -> Result<Vec<MemoryLink>> {
        if ids.is_empty() || link_types.is_empty() {
            return Ok(vec![]);
        }
        let reader = self.read()?;
        let type_names: Vec<String> = link_types.iter().map(|t| t.as_str().to_string()).collect();
        let mut out = Vec::new();
        let mut stmt = reader.prepare(&format!(
            "SELECT id, bank_id, source_id, target_id, link_type, weight, created_at
             FROM memory_links
             WHERE (source_id = ?1 OR target_id = ?1) AND link_type IN ({})",
            type_names
                .iter()
                .enumerate()
                .map(|(i, _)| format!("?{}", i + 2))
                .collect::<Vec<_>>()
                .join(", ")
        ))?;
        for id in ids {
            let mut bound: Vec<&dyn rusqlite::ToSql> = vec![id];
            for name in &type_names {
                bound.push(name);
            }
            let links = stmt
                .query_map(bound.as_slice(), Self::row_to_link)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            out.extend(links);
        }
        Ok(out)
    }

    /// All links for a bank
    pub fn links_for_bank(&self, bank_id: &str) -> Result<Vec<MemoryLink>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT id, bank_id, source_id, target_id, link_type, weight, created_at
             FROM memory_links WHERE bank_id = ?1 ORDER BY created_at",
        )?;
        let links = stmt
            .query_map(params![bank_id], Self::row_to_link)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(links)
    }

    /// Temporal edges already emitted by a source
    pub fn count_temporal_links(&self, source_id: &str) -> Result<i64> {
        let reader = self.read()?;
        let count = reader.query_row(
            "SELECT COUNT(*) FROM memory_links WHERE source_id = ?1 AND link_type = 'temporal'",
            params![source_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn row_to_link(row: &rusqlite::Row) -> rusqlite::Result<MemoryLink> {
        let link_type: String = row.get(4)?;
        Ok(MemoryLink {
            id: row.get(0)?,
            bank_id: row.get(1)?,
            source_id: row.get(2)?,
            target_id: row.get(3)?,
            link_type: LinkType::parse_name(&link_type),
            weight: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    // ========================================================================
    // VERSIONS AND DECISIONS
    // ========================================================================

    /// Version snapshots for one memory, oldest first
    pub fn list_versions(&self, memory_id: &str) -> Result<Vec<MemoryVersion>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT id, memory_id, previous_content, new_content, reason, created_at
             FROM memory_versions WHERE memory_id = ?1 ORDER BY created_at",
        )?;
        let versions = stmt
            .query_map(params![memory_id], |row| {
                Ok(MemoryVersion {
                    id: row.get(0)?,
                    versioned_memory_id: row.get(1)?,
                    previous_content: row.get(2)?,
                    new_content: row.get(3)?,
                    reason: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(versions)
    }

    /// Decision audit rows for a bank, oldest first
    pub fn list_decisions(&self, bank_id: &str) -> Result<Vec<ReconsolidationDecision>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT id, bank_id, memory_hash, candidate_memory_id, candidate_score,
                    route, conflict_detected, conflict_keys, policy_version,
                    applied_memory_id, created_at
             FROM reconsolidation_decisions WHERE bank_id = ?1 ORDER BY rowid",
        )?;
        let decisions = stmt
            .query_map(params![bank_id], |row| {
                let route: String = row.get(5)?;
                let keys_json: String = row.get(7)?;
                Ok(ReconsolidationDecision {
                    id: row.get(0)?,
                    bank_id: row.get(1)?,
                    memory_hash: row.get(2)?,
                    candidate_memory_id: row.get(3)?,
                    candidate_score: row.get(4)?,
                    route: ReconRoute::parse_name(&route),
                    conflict_detected: row.get::<_, i64>(6)? != 0,
                    conflict_keys: serde_json::from_str(&keys_json).unwrap_or_default(),
                    policy_version: row.get(8)?,
                    applied_memory_id: row.get(9)?,
                    created_at: row.get(10)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(decisions)
    }

    // ========================================================================
    // EMBEDDINGS
    // ========================================================================

    /// Upsert an embedding row outside a retain savepoint
    pub fn upsert_embedding(
        &self,
        memory_id: &str,
        vector: &[f32],
        model: &str,
        now: i64,
    ) -> Result<()> {
        self.with_savepoint(|conn| Self::upsert_embedding_stmt(conn, memory_id, vector, model, now))
    }

    /// Load every persisted embedding (index rebuild at open)
    pub fn load_all_embeddings(&self) -> Result<Vec<(String, Vec<f32>)>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare("SELECT memory_id, embedding FROM memory_embeddings")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, bytes)| vector_from_bytes(&bytes).map(|v| (id, v)))
            .collect())
    }

    // ========================================================================
    // LOCATION
    // ========================================================================

    /// Upsert a location path row by its unique key
    pub fn upsert_location_path(
        &self,
        bank_id: &str,
        raw_path: &str,
        normalized_path: &str,
        profile: &str,
        project: &str,
        now: i64,
    ) -> Result<LocationPath> {
        let writer = self.write()?;
        let existing: Option<String> = writer
            .query_row(
                "SELECT id FROM location_paths
                 WHERE bank_id = ?1 AND normalized_path = ?2 AND profile = ?3 AND project = ?4",
                params![bank_id, normalized_path, profile, project],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => {
                writer.execute(
                    "UPDATE location_paths SET updated_at = ?2 WHERE id = ?1",
                    params![id, now],
                )?;
                id
            }
            None => {
                let id = Uuid::new_v4().to_string();
                writer.execute(
                    "INSERT INTO location_paths (
                        id, bank_id, raw_path, normalized_path, profile, project,
                        created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                    params![id, bank_id, raw_path, normalized_path, profile, project, now],
                )?;
                id
            }
        };

        let path = writer.query_row(
            "SELECT id, bank_id, raw_path, normalized_path, profile, project, created_at, updated_at
             FROM location_paths WHERE id = ?1",
            params![id],
            Self::row_to_location_path,
        )?;
        Ok(path)
    }

    /// Exact-match lookup on the normalised form
    pub fn find_paths_exact(&self, bank_id: &str, normalized: &str) -> Result<Vec<LocationPath>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT id, bank_id, raw_path, normalized_path, profile, project, created_at, updated_at
             FROM location_paths WHERE bank_id = ?1 AND normalized_path = ?2 ORDER BY id",
        )?;
        let paths = stmt
            .query_map(params![bank_id, normalized], Self::row_to_location_path)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(paths)
    }

    /// Suffix lookup: normalised paths ending in `/<suffix>`
    pub fn find_paths_by_suffix(
        &self,
        bank_id: &str,
        suffix: &str,
        limit: i64,
    ) -> Result<Vec<LocationPath>> {
        let reader = self.read()?;
        let pattern = format!("%/{}", escape_like(suffix));
        let mut stmt = reader.prepare(
            "SELECT id, bank_id, raw_path, normalized_path, profile, project, created_at, updated_at
             FROM location_paths
             WHERE bank_id = ?1 AND normalized_path LIKE ?2 ESCAPE '\\'
             ORDER BY id LIMIT ?3",
        )?;
        let paths = stmt
            .query_map(params![bank_id, pattern, limit], Self::row_to_location_path)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(paths)
    }

    /// Append an access context row
    pub fn insert_access_context(&self, ctx: &LocationAccessContext) -> Result<()> {
        let writer = self.write()?;
        writer.execute(
            "INSERT INTO location_access_contexts (
                id, bank_id, path_id, memory_id, session, activity_type, accessed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                ctx.id,
                ctx.bank_id,
                ctx.path_id,
                ctx.memory_id,
                ctx.session,
                ctx.activity_type.as_str(),
                ctx.accessed_at,
            ],
        )?;
        Ok(())
    }

    /// Distinct paths touched in a bank since `since` (the 30-minute
    /// co-access session window), excluding `except_path`
    pub fn paths_touched_since(
        &self,
        bank_id: &str,
        since: i64,
        except_path: &str,
    ) -> Result<Vec<String>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT DISTINCT path_id FROM location_access_contexts
             WHERE bank_id = ?1 AND accessed_at >= ?2 AND path_id <> ?3
             ORDER BY path_id",
        )?;
        let ids = stmt
            .query_map(params![bank_id, since, except_path], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Upsert a co-access association for the canonical (min, max) pair and
    /// recompute strength from the post-update count. Two statements under
    /// one savepoint.
    pub fn bump_association(&self, bank_id: &str, path_a: &str, path_b: &str, now: i64) -> Result<()> {
        if path_a == path_b {
            return Ok(());
        }
        let (source, related) = if path_a < path_b {
            (path_a, path_b)
        } else {
            (path_b, path_a)
        };
        self.with_savepoint(|conn| {
            conn.execute(
                "INSERT INTO location_associations (
                    id, bank_id, source_path_id, related_path_id, co_access_count, strength, updated_at
                ) VALUES (?1, ?2, ?3, ?4, 1, 0.0, ?5)
                ON CONFLICT (bank_id, source_path_id, related_path_id)
                DO UPDATE SET co_access_count = co_access_count + 1, updated_at = ?5",
                params![Uuid::new_v4().to_string(), bank_id, source, related, now],
            )?;
            let count: i64 = conn.query_row(
                "SELECT co_access_count FROM location_associations
                 WHERE bank_id = ?1 AND source_path_id = ?2 AND related_path_id = ?3",
                params![bank_id, source, related],
                |row| row.get(0),
            )?;
            conn.execute(
                "UPDATE location_associations SET strength = ?4
                 WHERE bank_id = ?1 AND source_path_id = ?2 AND related_path_id = ?3",
                params![bank_id, source, related, crate::model::association_strength(count)],
            )?;
            Ok(())
        })
    }

    /// Associations touching a path, searched canonically in both directions
    pub fn associations_for_path(&self, path_id: &str) -> Result<Vec<LocationAssociation>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT id, bank_id, source_path_id, related_path_id, co_access_count, strength, updated_at
             FROM location_associations
             WHERE source_path_id = ?1 OR related_path_id = ?1
             ORDER BY strength DESC, id",
        )?;
        let associations = stmt
            .query_map(params![path_id], |row| {
                Ok(LocationAssociation {
                    id: row.get(0)?,
                    bank_id: row.get(1)?,
                    source_path_id: row.get(2)?,
                    related_path_id: row.get(3)?,
                    co_access_count: row.get(4)?,
                    strength: row.get(5)?,
                    updated_at: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(associations)
    }

    /// Largest association strength within a bank (boost normaliser)
    pub fn max_association_strength(&self, bank_id: &str) -> Result<f64> {
        let reader = self.read()?;
        let max: Option<f64> = reader.query_row(
            "SELECT MAX(strength) FROM location_associations WHERE bank_id = ?1",
            params![bank_id],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0.0))
    }

    /// Per-path access frequency and recency for one memory
    pub fn memory_path_access_stats(&self, memory_id: &str) -> Result<Vec<(String, i64, i64)>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT path_id, COUNT(*), MAX(accessed_at)
             FROM location_access_contexts WHERE memory_id = ?1
             GROUP BY path_id ORDER BY path_id",
        )?;
        let rows = stmt
            .query_map(params![memory_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn row_to_location_path(row: &rusqlite::Row) -> rusqlite::Result<LocationPath> {
        Ok(LocationPath {
            id: row.get(0)?,
            bank_id: row.get(1)?,
            raw_path: row.get(2)?,
            normalized_path: row.get(3)?,
            profile: row.get(4)?,
            project: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    // ========================================================================
    // VISUAL MEMORIES
    // ========================================================================

    /// Insert a visual memory description
    pub fn insert_visual(
        &self,
        bank_id: &str,
        description: &str,
        media_ref: Option<&str>,
        now: i64,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let writer = self.write()?;
        writer.execute(
            "INSERT INTO visual_memories (id, bank_id, description, media_ref, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, bank_id, description, media_ref, now],
        )?;
        Ok(id)
    }

    /// All visual descriptions for a bank
    pub fn list_visuals(&self, bank_id: &str) -> Result<Vec<(String, String)>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT id, description FROM visual_memories WHERE bank_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map(params![bank_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Append-only access event for a returned visual memory
    pub fn record_visual_access(&self, visual_id: &str, now: i64) -> Result<()> {
        let writer = self.write()?;
        writer.execute(
            "INSERT INTO visual_access (visual_id, accessed_at) VALUES (?1, ?2)",
            params![visual_id, now],
        )?;
        Ok(())
    }

    // ========================================================================
    // ACCESS LOG
    // ========================================================================

    /// Append per-memory access events (cognitive-mode activation history)
    pub fn log_memory_accesses(
        &self,
        bank_id: &str,
        memory_ids: &[String],
        session: Option<&str>,
        now: i64,
    ) -> Result<()> {
        if memory_ids.is_empty() {
            return Ok(());
        }
        let writer = self.write()?;
        let mut stmt = writer.prepare(
            "INSERT INTO memory_access_log (bank_id, memory_id, session, accessed_at)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for id in memory_ids {
            stmt.execute(params![bank_id, id, session, now])?;
        }
        Ok(())
    }

    /// Access timestamps for one memory, newest first
    pub fn access_history(&self, memory_id: &str, limit: i64) -> Result<Vec<i64>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT accessed_at FROM memory_access_log
             WHERE memory_id = ?1 ORDER BY accessed_at DESC LIMIT ?2",
        )?;
        let times = stmt
            .query_map(params![memory_id, limit], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(times)
    }

    /// Memory ids accessed under a session tag since `since`
    pub fn session_accesses_since(
        &self,
        bank_id: &str,
        session: &str,
        since: i64,
    ) -> Result<HashSet<String>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT DISTINCT memory_id FROM memory_access_log
             WHERE bank_id = ?1 AND session = ?2 AND accessed_at >= ?3",
        )?;
        let ids = stmt
            .query_map(params![bank_id, session, since], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(ids)
    }

    // ========================================================================
    // OPERATION QUEUE
    // ========================================================================

    /// Enqueue an operation. Returns `(id, true)` when a pending or
    /// processing duplicate already exists.
    pub fn enqueue_operation(&self, record: &OperationRecord) -> Result<(String, bool)> {
        let writer = self.write()?;
        let existing: Option<String> = writer
            .query_row(
                "SELECT id FROM async_operations
                 WHERE dedup_hash = ?1 AND status IN ('pending', 'processing')",
                params![record.dedup_hash],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok((id, true));
        }
        writer.execute(
            "INSERT INTO async_operations (
                id, bank_id, kind, payload, dedup_hash, status, error,
                created_at, started_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id,
                record.bank_id,
                record.kind,
                record.payload,
                record.dedup_hash,
                record.status,
                record.error,
                record.created_at,
                record.started_at,
                record.completed_at,
            ],
        )?;
        Ok((record.id.clone(), false))
    }

    /// Fetch an operation row
    pub fn get_operation(&self, id: &str) -> Result<Option<OperationRecord>> {
        let reader = self.read()?;
        let record = reader
            .query_row(
                "SELECT id, bank_id, kind, payload, dedup_hash, status, error,
                        created_at, started_at, completed_at
                 FROM async_operations WHERE id = ?1",
                params![id],
                Self::row_to_operation,
            )
            .optional()?;
        Ok(record)
    }

    /// Move an operation from an expected status to a new one. Returns
    /// whether the transition happened (false = someone else won the race,
    /// e.g. cancellation beat the worker).
    pub fn transition_operation(
        &self,
        id: &str,
        from: &[&str],
        to: &str,
        error: Option<&str>,
        now: i64,
    ) -> Result<bool> {
        let writer = self.write()?;
        let placeholders = (0..from.len())
            .map(|i| format!("?{}", i + 4))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE async_operations SET
                status = ?2,
                error = COALESCE(?3, error),
                started_at = CASE WHEN ?2 = 'processing' THEN ?{n} ELSE started_at END,
                completed_at = CASE WHEN ?2 IN ('completed', 'failed', 'cancelled') THEN ?{n} ELSE completed_at END
             WHERE id = ?1 AND status IN ({placeholders})",
            n = from.len() + 4,
            placeholders = placeholders
        );
        let mut bound: Vec<&dyn rusqlite::ToSql> = vec![&id, &to, &error];
        for status in from {
            bound.push(status);
        }
        bound.push(&now);
        let changed = writer.execute(&sql, bound.as_slice())?;
        Ok(changed > 0)
    }

    /// Pending operations, oldest first
    pub fn pending_operations(&self) -> Result<Vec<OperationRecord>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT id, bank_id, kind, payload, dedup_hash, status, error,
                    created_at, started_at, completed_at
             FROM async_operations WHERE status = 'pending' ORDER BY created_at, id",
        )?;
        let records = stmt
            .query_map([], Self::row_to_operation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn row_to_operation(row: &rusqlite::Row) -> rusqlite::Result<OperationRecord> {
        Ok(OperationRecord {
            id: row.get(0)?,
            bank_id: row.get(1)?,
            kind: row.get(2)?,
            payload: row.get(3)?,
            dedup_hash: row.get(4)?,
            status: row.get(5)?,
            error: row.get(6)?,
            created_at: row.get(7)?,
            started_at: row.get(8)?,
            completed_at: row.get(9)?,
        })
    }
}

// ============================================================================
// FTS SANITIZER
// ============================================================================

/// Quote user text into a safe FTS5 MATCH expression: each token becomes a
/// quoted phrase, tokens are OR-ed so partial matches still rank.
pub fn sanitize_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| token.replace('"', ""))
        .filter(|token| !token.is_empty())
        .map(|token| format!("\"{}\"", token))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// ============================================================================
// TESTS
// ============================================================================
