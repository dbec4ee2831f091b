//! # HNSW Vector Index Implementation
//!
//! Hierarchical Navigable Small World graph for approximate nearest neighbor
//! search over a `VECTOR(n)` column.
//!
//! ## Architecture Overview
//!
//! ```text
//! Level 3:     [A]-------------[B]           (few nodes, long edges)
//!               |               |
//! Level 2:     [A]----[C]------[B]----[D]    (more nodes)
//!               |      |        |      |
//! Level 1:     [A]-[E]-[C]-[F]-[B]-[G]-[D]   (even more nodes)
//!               |   |   |   |   |   |   |
//! Level 0:     [A]-[E]-[C]-[F]-[B]-[G]-[D]-[H]-[I]  (all nodes)
//! ```
//!
//! Nodes live in a flat `Vec` and are addressed by `NodeId` (their index).
//! Adjacency lists store indices, never references, so growing the arena or
//! tombstoning a node never invalidates a live edge.
//!
//! ## Parameters
//!
//! - **M**: maximum neighbors per node above level 0. Default: 16
//! - **M0**: maximum neighbors at level 0. Default: 2*M = 32
//! - **ef_construction**: beam width during insertion. Default: 100
//! - **ef_search**: beam width during queries, passed per search. Default: 32
//!
//! ## MVCC Integration
//!
//! The graph is a superset of every committed row version that carries a
//! vector. One row may own several nodes while older versions are still
//! visible to some snapshot. Search returns raw `(row_id, distance)`
//! candidates; the executor resolves each against the reader's snapshot and
//! recomputes the exact distance on the visible vector. Garbage collection
//! tombstones nodes whose version is gone.
//!
//! ## Module Structure
//!
//! - `distance`: metric definitions and scalar distance kernels
//! - `search`: candidate heaps, visited set, greedy and beam search
//! - `operations`: level selection and neighbor selection heuristic

pub mod distance;
pub mod operations;
pub mod search;

pub use distance::DistanceMetric;

use eyre::Result;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use crate::config::{HNSW_DEFAULT_EF_CONSTRUCTION, HNSW_DEFAULT_M, HNSW_DEFAULT_M0};
use crate::error::DbError;
use crate::types::RowId;
use operations::{calculate_ml, select_level, select_neighbors_heuristic};
use search::{descend, Beam, Candidate};

pub type NodeId = u32;

const GREEDY_MAX_ITERATIONS: usize = 1000;
const COMPACTION_MIN_NODES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswParams {
    pub m: usize,
    pub m0: usize,
    pub ef_construction: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: HNSW_DEFAULT_M,
            m0: HNSW_DEFAULT_M0,
            ef_construction: HNSW_DEFAULT_EF_CONSTRUCTION,
        }
    }
}

impl HnswParams {
    pub fn with_m(m: usize) -> Self {
        Self {
            m,
            m0: m * 2,
            ..Self::default()
        }
    }
}

struct Node {
    row_id: RowId,
    vector: Vec<f32>,
    neighbors: Vec<Vec<NodeId>>,
    deleted: bool,
}

pub struct HnswIndex {
    dims: usize,
    metric: DistanceMetric,
    params: HnswParams,
    ml: f64,
    nodes: Vec<Node>,
    entry_point: Option<NodeId>,
    max_level: usize,
    rows: HashMap<RowId, SmallVec<[NodeId; 1]>>,
    live: usize,
    rng: fastrand::Rng,
}

impl HnswIndex {
    pub fn new(dims: usize, metric: DistanceMetric, params: HnswParams) -> Self {
        Self {
            dims,
            metric,
            params,
            ml: calculate_ml(params.m),
            nodes: Vec::new(),
            entry_point: None,
            max_level: 0,
            rows: HashMap::new(),
            live: 0,
            rng: fastrand::Rng::new(),
        }
    }

    /// Deterministic level assignment, for reproducible graphs in tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    pub fn dimensions(&self) -> usize {
        self.dims
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn params(&self) -> HnswParams {
        self.params
    }

    /// Number of live (non-tombstoned) nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    pub fn contains(&self, row_id: RowId, vector: &[f32]) -> bool {
        self.find_live(row_id, vector).is_some()
    }

    fn check_dims(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dims {
            return Err(DbError::type_mismatch(format!(
                "vector dimension mismatch: index expects {}, got {}",
                self.dims,
                vector.len()
            )));
        }
        Ok(())
    }

    fn find_live(&self, row_id: RowId, vector: &[f32]) -> Option<NodeId> {
        self.rows.get(&row_id).and_then(|ids| {
            ids.iter().copied().find(|&id| {
                let node = &self.nodes[id as usize];
                !node.deleted && node.vector == vector
            })
        })
    }

    /// Adds a node for `(row_id, vector)`. Inserting a pair that is already
    /// live is a no-op.
    pub fn insert(&mut self, row_id: RowId, vector: &[f32]) -> Result<()> {
        self.check_dims(vector)?;
        if self.find_live(row_id, vector).is_some() {
            return Ok(());
        }

        let level = select_level(self.rng.f64(), self.ml);
        let new_id = self.nodes.len() as NodeId;
        self.nodes.push(Node {
            row_id,
            vector: vector.to_vec(),
            neighbors: vec![Vec::new(); level + 1],
            deleted: false,
        });
        self.rows.entry(row_id).or_default().push(new_id);
        self.live += 1;

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(new_id);
            self.max_level = level;
            return Ok(());
        };

        let metric = self.metric;
        let mut ep = Candidate::new(entry, metric.distance(vector, &self.nodes[entry as usize].vector));

        for lvl in (level + 1..=self.max_level).rev() {
            let nodes = &self.nodes;
            ep = descend(
                ep,
                |n| neighbors_at(nodes, n, lvl),
                |n| metric.distance(vector, &nodes[n as usize].vector),
                GREEDY_MAX_ITERATIONS,
            );
        }

        let mut beam = Beam::new(self.params.ef_construction, self.nodes.len());
        let mut entries = vec![ep];

        for lvl in (0..=level.min(self.max_level)).rev() {
            let found = {
                let nodes = &self.nodes;
                beam.run(
                    &entries,
                    |n| neighbors_at(nodes, n, lvl),
                    |n| metric.distance(vector, &nodes[n as usize].vector),
                    |_| true,
                )
            };

            let max_neighbors = self.max_neighbors(lvl);
            let selected = {
                let nodes = &self.nodes;
                select_neighbors_heuristic(&found, max_neighbors, |a, b| {
                    metric.distance(&nodes[a as usize].vector, &nodes[b as usize].vector)
                })
            };

            self.nodes[new_id as usize].neighbors[lvl] = selected.clone();
            for neighbor in selected {
                self.link(neighbor, new_id, lvl);
            }

            if !found.is_empty() {
                entries = found;
            }
        }

        if level > self.max_level {
            self.entry_point = Some(new_id);
            self.max_level = level;
        }

        Ok(())
    }

    fn max_neighbors(&self, level: usize) -> usize {
        if level == 0 {
            self.params.m0
        } else {
            self.params.m
        }
    }

    fn link(&mut self, from: NodeId, to: NodeId, level: usize) {
        let max_neighbors = self.max_neighbors(level);
        let metric = self.metric;

        let list = &mut self.nodes[from as usize].neighbors[level];
        if list.contains(&to) {
            return;
        }
        list.push(to);
        if list.len() <= max_neighbors {
            return;
        }

        let pruned = {
            let nodes = &self.nodes;
            let origin = &nodes[from as usize].vector;
            let candidates: Vec<Candidate> = nodes[from as usize].neighbors[level]
                .iter()
                .map(|&n| Candidate::new(n, metric.distance(origin, &nodes[n as usize].vector)))
                .collect();
            select_neighbors_heuristic(&candidates, max_neighbors, |a, b| {
                metric.distance(&nodes[a as usize].vector, &nodes[b as usize].vector)
            })
        };
        self.nodes[from as usize].neighbors[level] = pruned;
    }

    /// Tombstones the node holding `(row_id, vector)`.
    pub fn remove(&mut self, row_id: RowId, vector: &[f32]) -> bool {
        match self.find_live(row_id, vector) {
            Some(id) => {
                self.tombstone(id);
                true
            }
            None => false,
        }
    }

    /// Tombstones every node of `row_id`.
    pub fn remove_row(&mut self, row_id: RowId) -> usize {
        let Some(ids) = self.rows.get(&row_id).cloned() else {
            return 0;
        };
        let mut removed = 0;
        for id in ids {
            if !self.nodes[id as usize].deleted {
                self.tombstone(id);
                removed += 1;
            }
        }
        removed
    }

    fn tombstone(&mut self, id: NodeId) {
        let node = &mut self.nodes[id as usize];
        if !node.deleted {
            node.deleted = true;
            self.live -= 1;
            let row_id = node.row_id;
            if let Some(ids) = self.rows.get_mut(&row_id) {
                ids.retain(|n| *n != id);
                if ids.is_empty() {
                    self.rows.remove(&row_id);
                }
            }
        }
    }

    /// Approximate k nearest neighbors as `(row_id, distance)`, closest first.
    /// The beam width is `max(ef_search, k)`.
    pub fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Result<Vec<(RowId, f32)>> {
        self.check_dims(query)?;
        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };
        if k == 0 || self.live == 0 {
            return Ok(Vec::new());
        }

        let metric = self.metric;
        let nodes = &self.nodes;
        let distance = |n: NodeId| metric.distance(query, &nodes[n as usize].vector);

        let mut ep = Candidate::new(entry, distance(entry));
        for lvl in (1..=self.max_level).rev() {
            ep = descend(ep, |n| neighbors_at(nodes, n, lvl), distance, GREEDY_MAX_ITERATIONS);
        }

        let mut beam = Beam::new(ef_search.max(k), nodes.len());
        let found = beam.run(
            &[ep],
            |n| neighbors_at(nodes, n, 0),
            distance,
            |n| !nodes[n as usize].deleted,
        );

        Ok(found
            .into_iter()
            .take(k)
            .map(|c| (nodes[c.node_id as usize].row_id, c.distance))
            .collect())
    }

    pub fn needs_compaction(&self) -> bool {
        let dead = self.nodes.len() - self.live;
        self.nodes.len() >= COMPACTION_MIN_NODES && dead > self.live
    }

    /// Rebuilds the graph from live nodes, dropping all tombstones.
    pub fn compact(&mut self) -> Result<()> {
        let live: Vec<(RowId, Vec<f32>)> = std::mem::take(&mut self.nodes)
            .into_iter()
            .filter(|n| !n.deleted)
            .map(|n| (n.row_id, n.vector))
            .collect();

        self.entry_point = None;
        self.max_level = 0;
        self.rows.clear();
        self.live = 0;

        for (row_id, vector) in live {
            self.insert(row_id, &vector)?;
        }
        Ok(())
    }
}

fn neighbors_at(nodes: &[Node], id: NodeId, level: usize) -> Vec<NodeId> {
    nodes[id as usize]
        .neighbors
        .get(level)
        .cloned()
        .unwrap_or_default()
}

impl fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HnswIndex")
            .field("dims", &self.dims)
            .field("metric", &self.metric)
            .field("params", &self.params)
            .field("live", &self.live)
            .field("nodes", &self.nodes.len())
            .field("max_level", &self.max_level)
            .finish()
    }
}
