//! # Graph Traversal
//!
//! Upper layers are crossed by greedy descent; the target layer is explored
//! by a beam of bounded width.
//!
//! ```text
//! level L .. 1   descend: hop to the closest neighbor until no hop improves
//! level 0 (or the insertion level)
//!                beam: frontier (closest first) feeding a bounded result set
//! ```
//!
//! The beam stops when the closest frontier node is further away than the
//! worst of `width` results already held. Nodes rejected by `admit` (row
//! tombstones) still extend the frontier so the graph stays navigable
//! around them, but never enter the result set.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use super::NodeId;

/// A node paired with its distance to the query. Orders by distance, ties
/// broken by node id so heaps are deterministic.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub node_id: NodeId,
    pub distance: f32,
}

impl Candidate {
    pub fn new(node_id: NodeId, distance: f32) -> Self {
        Self { node_id, distance }
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.node_id.cmp(&other.node_id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Visit marks stamped with an epoch. Starting a new traversal bumps the
/// epoch rather than clearing the slots.
struct VisitMarks {
    epoch: u32,
    marks: Vec<u32>,
}

impl VisitMarks {
    fn with_capacity(nodes: usize) -> Self {
        Self {
            epoch: 1,
            marks: vec![0; nodes],
        }
    }

    fn next_epoch(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        if self.epoch == 0 {
            self.marks.iter_mut().for_each(|m| *m = 0);
            self.epoch = 1;
        }
    }

    /// Marks `node`; false if it was already marked this epoch.
    fn mark(&mut self, node: NodeId) -> bool {
        let slot = node as usize;
        if slot >= self.marks.len() {
            self.marks.resize((slot + 1).next_power_of_two(), 0);
        }
        let fresh = self.marks[slot] != self.epoch;
        self.marks[slot] = self.epoch;
        fresh
    }
}

/// Follows the single best neighbor from `start` until no neighbor is
/// closer, or `max_hops` hops have been taken.
pub fn descend<N, D>(start: Candidate, neighbors: N, distance: D, max_hops: usize) -> Candidate
where
    N: Fn(NodeId) -> Vec<NodeId>,
    D: Fn(NodeId) -> f32,
{
    let mut at = start;
    for _ in 0..max_hops {
        let best = neighbors(at.node_id)
            .into_iter()
            .map(|n| Candidate::new(n, distance(n)))
            .min();
        match best {
            Some(next) if next.distance < at.distance => at = next,
            _ => break,
        }
    }
    at
}

/// Reusable beam state. One `Beam` serves every level of an insertion.
pub struct Beam {
    width: usize,
    frontier: BinaryHeap<Reverse<Candidate>>,
    kept: BinaryHeap<Candidate>,
    visited: VisitMarks,
}

impl Beam {
    pub fn new(width: usize, nodes: usize) -> Self {
        let width = width.max(1);
        Self {
            width,
            frontier: BinaryHeap::with_capacity(width * 2),
            kept: BinaryHeap::with_capacity(width + 1),
            visited: VisitMarks::with_capacity(nodes),
        }
    }

    fn bound(&self) -> f32 {
        if self.kept.len() < self.width {
            f32::INFINITY
        } else {
            self.kept.peek().map_or(f32::INFINITY, |c| c.distance)
        }
    }

    fn keep(&mut self, candidate: Candidate) {
        self.kept.push(candidate);
        if self.kept.len() > self.width {
            self.kept.pop();
        }
    }

    /// Explores from `entries` and returns up to `width` admitted nodes,
    /// closest first.
    pub fn run<N, D, A>(
        &mut self,
        entries: &[Candidate],
        neighbors: N,
        distance: D,
        admit: A,
    ) -> Vec<Candidate>
    where
        N: Fn(NodeId) -> Vec<NodeId>,
        D: Fn(NodeId) -> f32,
        A: Fn(NodeId) -> bool,
    {
        self.frontier.clear();
        self.kept.clear();
        self.visited.next_epoch();

        for &entry in entries {
            if self.visited.mark(entry.node_id) {
                self.frontier.push(Reverse(entry));
                if admit(entry.node_id) {
                    self.keep(entry);
                }
            }
        }

        while let Some(Reverse(closest)) = self.frontier.pop() {
            if closest.distance > self.bound() {
                break;
            }
            for n in neighbors(closest.node_id) {
                if !self.visited.mark(n) {
                    continue;
                }
                let candidate = Candidate::new(n, distance(n));
                if candidate.distance >= self.bound() {
                    continue;
                }
                self.frontier.push(Reverse(candidate));
                if admit(n) {
                    self.keep(candidate);
                }
            }
        }

        std::mem::take(&mut self.kept).into_sorted_vec()
    }
}
