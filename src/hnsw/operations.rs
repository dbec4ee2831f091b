//! # HNSW Graph Operations
//!
//! Level selection and neighbor selection used while inserting into the
//! graph.
//!
//! ## Level Selection
//!
//! ```text
//! level = floor(-ln(uniform(0, 1)) * ml)
//! where ml = 1 / ln(M)
//! ```
//!
//! With M = 16 roughly 94% of nodes live only on level 0 and each higher level
//! is exponentially rarer. Levels are capped at `HNSW_MAX_LEVEL`.
//!
//! ## Neighbor Selection Heuristic
//!
//! Candidates are visited closest first. A candidate is kept only if it is
//! closer to the new node than to every neighbor already kept, which favors
//! edges that reach new regions of the graph over redundant short cuts. If
//! the heuristic keeps fewer than `max_neighbors`, the remaining slots are
//! filled with the closest discarded candidates so sparse regions stay
//! connected.
//!
//! ## Deletion Strategy
//!
//! Nodes are never unlinked. A deleted node is tombstoned, still participates
//! in traversal, and is filtered out of results. `HnswIndex::compact` rebuilds
//! the graph once tombstones dominate.

use super::search::Candidate;
use super::NodeId;
use crate::config::HNSW_MAX_LEVEL;

pub fn select_level(random_value: f64, ml: f64) -> usize {
    if random_value <= 0.0 {
        return HNSW_MAX_LEVEL;
    }
    let level = (-random_value.ln() * ml).floor();
    (level as usize).min(HNSW_MAX_LEVEL)
}

pub fn calculate_ml(m: usize) -> f64 {
    1.0 / (m.max(2) as f64).ln()
}

pub fn select_neighbors_heuristic<F>(
    candidates: &[Candidate],
    max_neighbors: usize,
    compute_distance: F,
) -> Vec<NodeId>
where
    F: Fn(NodeId, NodeId) -> f32,
{
    if candidates.is_empty() || max_neighbors == 0 {
        return Vec::new();
    }

    let mut ordered: Vec<&Candidate> = candidates.iter().collect();
    ordered.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    let mut selected: Vec<NodeId> = Vec::with_capacity(max_neighbors);
    let mut discarded: Vec<NodeId> = Vec::new();

    for candidate in ordered {
        if selected.len() >= max_neighbors {
            break;
        }

        let shadowed = selected
            .iter()
            .any(|&existing| compute_distance(candidate.node_id, existing) < candidate.distance);

        if shadowed {
            discarded.push(candidate.node_id);
        } else {
            selected.push(candidate.node_id);
        }
    }

    for node in discarded {
        if selected.len() >= max_neighbors {
            break;
        }
        selected.push(node);
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_selection_mostly_level_0() {
        let ml = calculate_ml(16);
        let samples = 10_000;

        let level_0 = (0..samples)
            .map(|i| (i as f64 + 0.5) / samples as f64)
            .filter(|&r| select_level(r, ml) == 0)
            .count();

        assert!(level_0 as f64 / samples as f64 > 0.5);
    }

    #[test]
    fn level_selection_is_capped() {
        let ml = calculate_ml(16);
        assert!(select_level(f64::MIN_POSITIVE, ml) <= HNSW_MAX_LEVEL);
        assert_eq!(select_level(0.0, ml), HNSW_MAX_LEVEL);
    }

    #[test]
    fn heuristic_skips_shadowed_candidates_then_backfills() {
        // Points on a line: node 1 at 1.0, node 2 at 1.1, node 3 at -1.0; new node at 0.
        let position = |id: NodeId| match id {
            1 => 1.0f32,
            2 => 1.1,
            _ => -1.0,
        };
        let candidates = vec![
            Candidate::new(1, 1.0),
            Candidate::new(2, 1.1),
            Candidate::new(3, 1.0),
        ];
        let dist = |a: NodeId, b: NodeId| (position(a) - position(b)).abs();

        let two = select_neighbors_heuristic(&candidates, 2, dist);
        assert!(two.contains(&1) && two.contains(&3));

        let three = select_neighbors_heuristic(&candidates, 3, dist);
        assert_eq!(three.len(), 3);
    }
}
