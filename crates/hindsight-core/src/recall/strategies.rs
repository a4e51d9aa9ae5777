//! The four retrieval strategies.
//!
//! Each returns a ranked `(memory id, score)` list scoped to one bank. The
//! graph strategy is a meta-path forward propagation: an ordered sequence of
//! (link type, direction, decay) steps walked from seed memories, with edges
//! loaded lazily per node and cached for the duration of one recall.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::extract::TimeRange;
use crate::model::{LinkType, MemoryLink};
use crate::storage::{GraphStore, VectorIndex};

use super::fusion::min_max_normalize;

/// Seeds taken from the semantic ranking for graph expansion
pub const GRAPH_SEED_COUNT: usize = 5;

/// Per-hop score decay default
pub const GRAPH_HOP_DECAY: f64 = 0.5;

// ============================================================================
// SEMANTIC
// ============================================================================

/// KNN by cosine similarity over the bank's embeddings
pub fn semantic_strategy(
    index: &VectorIndex,
    bank_ids: &HashSet<String>,
    query_vector: &[f32],
    limit: usize,
) -> Result<Vec<(String, f64)>> {
    let hits = index
        .search(query_vector, limit, |id| bank_ids.contains(id))
        .map_err(crate::engine::index_error)?;
    Ok(hits
        .into_iter()
        .filter(|(_, similarity)| *similarity > 0.0)
        .map(|(id, similarity)| (id, similarity as f64))
        .collect())
}

// ============================================================================
// FULLTEXT
// ============================================================================

/// BM25 over the FTS index, pre-filtering tags when supplied
pub fn fulltext_strategy(
    store: &GraphStore,
    bank_id: &str,
    query: &str,
    limit: usize,
    tags: Option<&[String]>,
) -> Result<Vec<(String, f64)>> {
    store.fulltext_search(bank_id, query, limit as i64, tags)
}

// ============================================================================
// TEMPORAL
// ============================================================================

/// Memories inside the time range, scored by recency within it
pub fn temporal_strategy(
    store: &GraphStore,
    bank_id: &str,
    range: &TimeRange,
    limit: usize,
) -> Result<Vec<(String, f64)>> {
    let (from, to) = range.bounds();
    let rows = store.memories_in_range(bank_id, from, to, limit as i64)?;
    let span = (to - from).max(1) as f64;
    Ok(rows
        .into_iter()
        .map(|(id, mentioned_at)| {
            let score = if to == i64::MAX || from == i64::MIN {
                1.0
            } else {
                ((mentioned_at - from) as f64 / span).clamp(0.0, 1.0)
            };
            (id, score)
        })
        .collect())
}

// ============================================================================
// GRAPH (META-PATH FORWARD PROPAGATION)
// ============================================================================

/// Edge traversal direction relative to the current node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Follow edges where the node is the source
    Forward,
    /// Follow edges where the node is the target
    Backward,
    /// Follow edges in either direction
    Both,
}

/// One step of a meta-path
#[derive(Debug, Clone, Copy)]
pub struct MetaPathStep {
    /// Edge type to traverse
    pub link_type: LinkType,
    /// Traversal direction
    pub direction: Direction,
    /// Score decay applied across the hop
    pub decay: f64,
}

/// A named typed walk from seeds to related memories
#[derive(Debug, Clone)]
pub struct MetaPath {
    /// Path name (trace labelling)
    pub name: &'static str,
    /// Ordered steps
    pub steps: Vec<MetaPathStep>,
    /// Contribution weight of this path's scores
    pub weight: f64,
}

/// Default expansion paths: shared-entity neighbours, two causal hops
/// backwards, and observation edges in either direction.
pub fn default_meta_paths() -> Vec<MetaPath> {
    vec![
        MetaPath {
            name: "shared-entity",
            steps: vec![MetaPathStep {
                link_type: LinkType::Entity,
                direction: Direction::Both,
                decay: GRAPH_HOP_DECAY,
            }],
            weight: 1.0,
        },
        MetaPath {
            name: "causal-chain",
            steps: vec![
                MetaPathStep {
                    link_type: LinkType::CausedBy,
                    direction: Direction::Both,
                    decay: GRAPH_HOP_DECAY,
                },
                MetaPathStep {
                    link_type: LinkType::CausedBy,
                    direction: Direction::Both,
                    decay: GRAPH_HOP_DECAY,
                },
            ],
            weight: 0.9,
        },
        MetaPath {
            name: "observation",
            steps: vec![MetaPathStep {
                link_type: LinkType::ObservationOf,
                direction: Direction::Both,
                decay: GRAPH_HOP_DECAY,
            }],
            weight: 0.8,
        },
    ]
}

/// Lazy per-recall edge cache: edges are loaded per (node, link type) on
/// first touch and reused for the rest of the invocation.
pub struct EdgeCache<'a> {
    store: &'a GraphStore,
    edges: HashMap<(String, LinkType), Vec<MemoryLink>>,
}

impl<'a> EdgeCache<'a> {
    /// Create an empty cache over the store
    pub fn new(store: &'a GraphStore) -> Self {
        Self {
            store,
            edges: HashMap::new(),
        }
    }

    fn edges_for(&mut self, node: &str, link_type: LinkType) -> Result<&[MemoryLink]> {
        let key = (node.to_string(), link_type);
        if !self.edges.contains_key(&key) {
            let loaded = self
                .store
                .links_touching(std::slice::from_ref(&key.0), &[link_type])?;
            self.edges.insert(key.clone(), loaded);
        }
        Ok(self.edges.get(&key).map(|v| v.as_slice()).unwrap_or(&[]))
    }
}

/// Walk the meta-paths from the seeds, accumulating decayed scores across
/// paths, then min-max normalise into [0, 1].
pub fn graph_strategy(
    store: &GraphStore,
    seeds: &[(String, f64)],
    paths: &[MetaPath],
    limit: usize,
) -> Result<Vec<(String, f64)>> {
    if seeds.is_empty() {
        return Ok(vec![]);
    }
    let seed_ids: HashSet<&str> = seeds.iter().map(|(id, _)| id.as_str()).collect();
    let mut cache = EdgeCache::new(store);
    let mut scores: HashMap<String, f64> = HashMap::new();

    for path in paths {
        for (seed_id, seed_score) in seeds {
            let mut frontier: HashMap<String, f64> = HashMap::new();
            frontier.insert(seed_id.clone(), *seed_score);

            for step in &path.steps {
                let mut next: HashMap<String, f64> = HashMap::new();
                for (node, score) in &frontier {
                    for edge in cache.edges_for(node, step.link_type)? {
                        let neighbour = match step.direction {
                            Direction::Forward if &edge.source_id == node => &edge.target_id,
                            Direction::Backward if &edge.target_id == node => &edge.source_id,
                            Direction::Both => {
                                if &edge.source_id == node {
                                    &edge.target_id
                                } else {
                                    &edge.source_id
                                }
                            }
                            _ => continue,
                        };
                        *next.entry(neighbour.clone()).or_default() +=
                            score * step.decay * edge.weight;
                    }
                }
                // Reached nodes contribute at every hop, weighted by path
                for (node, score) in &next {
                    if !seed_ids.contains(node.as_str()) {
                        *scores.entry(node.clone()).or_default() += score * path.weight;
                    }
                }
                frontier = next;
                if frontier.is_empty() {
                    break;
                }
            }
        }
    }

    let mut hits: Vec<(String, f64)> = scores.into_iter().collect();
    hits.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    hits.truncate(limit);
    min_max_normalize(&mut hits);
    Ok(hits)
}

// ============================================================================
// TESTS
// ============================================================================
