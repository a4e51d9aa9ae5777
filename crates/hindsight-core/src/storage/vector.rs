//! In-memory cosine nearest-neighbour index over the persisted embedding rows.
//!
//! Vectors live durably as little-endian f32 blobs in `memory_embeddings`
//! (delete-then-insert under a savepoint; the blob table has no upsert
//! semantics). This index is rebuilt from that table at open and kept in
//! sync by the engine on every insert/refresh/delete.

use std::collections::HashMap;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Vector index error types
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum VectorIndexError {
    /// Dimension mismatch: (expected, got)
    InvalidDimensions(usize, usize),
}

impl std::fmt::Display for VectorIndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorIndexError::InvalidDimensions(expected, got) => {
                write!(f, "Invalid dimensions: expected {}, got {}", expected, got)
            }
        }
    }
}

impl std::error::Error for VectorIndexError {}

// ============================================================================
// VECTOR CODEC
// ============================================================================

/// Encode a vector as little-endian f32 bytes for blob storage
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a blob back into a vector; `None` when the length is not a
/// multiple of 4
pub fn vector_from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// Cosine similarity between two equal-length vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

// ============================================================================
// VECTOR INDEX
// ============================================================================

/// Exhaustive cosine KNN over all embeddings of an instance.
///
/// Bank scoping is not encoded here; the engine passes an id-filter closure
/// so one index serves every bank without leaking candidates across banks.
pub struct VectorIndex {
    dimensions: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl VectorIndex {
    /// Create an empty index for vectors of the given dimension
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: HashMap::new(),
        }
    }

    /// Configured dimension D
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of indexed vectors
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Insert or replace a vector. Dimension violations are fatal to the call.
    pub fn add(&mut self, id: &str, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimensions {
            return Err(VectorIndexError::InvalidDimensions(
                self.dimensions,
                vector.len(),
            ));
        }
        self.vectors.insert(id.to_string(), vector.to_vec());
        Ok(())
    }

    /// Remove a vector; returns whether it was present
    pub fn remove(&mut self, id: &str) -> bool {
        self.vectors.remove(id).is_some()
    }

    /// Fetch a stored vector
    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.vectors.get(id).map(|v| v.as_slice())
    }

    /// K nearest neighbours by cosine similarity among ids accepted by
    /// `filter`. Results are (id, similarity) sorted descending, ties broken
    /// by id ascending so repeated searches are order-stable.
    pub fn search<F>(
        &self,
        query: &[f32],
        k: usize,
        filter: F,
    ) -> Result<Vec<(String, f32)>, VectorIndexError>
    where
        F: Fn(&str) -> bool,
    {
        if query.len() != self.dimensions {
            return Err(VectorIndexError::InvalidDimensions(
                self.dimensions,
                query.len(),
            ));
        }

        let mut scored: Vec<(String, f32)> = self
            .vectors
            .iter()
            .filter(|(id, _)| filter(id))
            .map(|(id, vec)| (id.clone(), cosine_similarity(query, vec)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_roundtrip() {
        let vector = vec![0.5f32, -1.25, 3.0];
        let bytes = vector_to_bytes(&vector);
        assert_eq!(vector_from_bytes(&bytes), Some(vector));
        assert_eq!(vector_from_bytes(&[0u8, 1, 2]), None);
    }

    #[test]
    fn test_cosine_identity() {
        let v = vec![1.0f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let mut index = VectorIndex::new(3);
        assert!(index.add("a", &[1.0, 2.0]).is_err());
        assert!(index.search(&[1.0, 2.0], 5, |_| true).is_err());
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let mut index = VectorIndex::new(2);
        index.add("x", &[1.0, 0.0]).unwrap();
        index.add("y", &[0.0, 1.0]).unwrap();
        index.add("z", &[0.7, 0.7]).unwrap();

        let results = index.search(&[1.0, 0.0], 2, |_| true).unwrap();
        assert_eq!(results[0].0, "x");
        assert_eq!(results[1].0, "z");
    }

    #[test]
    fn test_search_respects_filter() {
        let mut index = VectorIndex::new(2);
        index.add("x", &[1.0, 0.0]).unwrap();
        index.add("y", &[1.0, 0.0]).unwrap();

        let results = index.search(&[1.0, 0.0], 5, |id| id != "x").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "y");
    }

    #[test]
    fn test_equal_scores_tie_break_on_id() {
        let mut index = VectorIndex::new(2);
        index.add("b", &[1.0, 0.0]).unwrap();
        index.add("a", &[1.0, 0.0]).unwrap();

        let results = index.search(&[1.0, 0.0], 2, |_| true).unwrap();
        assert_eq!(results[0].0, "a");
        assert_eq!(results[1].0, "b");
    }
}
