//! Storage Module
//!
//! SQLite-based graph store with:
//! - FTS5 full-text search with query sanitization
//! - Embedded vector blob storage with an in-memory cosine index
//! - Savepoint-wrapped multi-statement ingest operations
//! - Bank-deletion cascade through every bank-keyed table

mod migrations;
mod sqlite;
mod vector;

pub use migrations::{apply_migrations, get_current_version, Migration, MIGRATIONS};
pub use sqlite::{sanitize_fts_query, GraphStore, OperationRecord, ReconsolidateUpdate};
pub use vector::{
    cosine_similarity, vector_from_bytes, vector_to_bytes, VectorIndex, VectorIndexError,
};
