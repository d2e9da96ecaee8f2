//! Proximity graph over track positions.
//!
//! Each track is joined to its `k` nearest neighbours in the (x, y) plane.
//! Neighbour search runs independently from both endpoints, so a pair can be
//! selected twice; an edge is only emitted when it is discovered from the
//! endpoint whose id sorts first.  A pair selected only from the larger-id
//! side is therefore dropped, which keeps the web sparse and every logical
//! edge unique.
//!
//! The search is O(n²), fine for the few hundred stars the map shows.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::track::Track;

/// Default neighbour count used by the map.
pub const DEFAULT_NEIGHBORS: usize = 2;

/// Unordered pair of track ids plus their distance.  `a < b` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborEdge {
    pub a: String,
    pub b: String,
    pub distance: f64,
}

impl NeighborEdge {
    /// Build an edge with the ids in canonical order.
    pub fn new(x: &str, y: &str, distance: f64) -> Self {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        Self {
            a: a.to_string(),
            b: b.to_string(),
            distance,
        }
    }
}

fn distance(p: &Track, q: &Track) -> f64 {
    (p.x - q.x).hypot(p.y - q.y)
}

/// Compute the neighbour edges for `tracks`.
///
/// Ties on distance are broken by id so the result is deterministic.  With
/// fewer than `k + 1` tracks every track considers all the others; `n <= 1`
/// or `k == 0` yields no edges.
pub fn compute_neighbor_graph(tracks: &[Track], k: usize) -> Vec<NeighborEdge> {
    if tracks.len() < 2 || k == 0 {
        return Vec::new();
    }

    let mut edges = Vec::new();
    let mut candidates: Vec<(f64, &Track)> = Vec::with_capacity(tracks.len());

    for source in tracks {
        candidates.clear();
        candidates.extend(
            tracks
                .iter()
                .filter(|t| t.id != source.id)
                .map(|t| (distance(source, t), t)),
        );
        candidates.sort_by(|(da, ta), (db, tb)| {
            da.total_cmp(db).then_with(|| ta.id.cmp(&tb.id))
        });

        for (dist, target) in candidates.iter().take(k) {
            if source.id < target.id {
                edges.push(NeighborEdge::new(&source.id, &target.id, *dist));
            }
        }
    }

    edges.sort_by(|e, f| match e.a.cmp(&f.a) {
        Ordering::Equal => e.b.cmp(&f.b),
        other => other,
    });
    edges.dedup_by(|e, f| e.a == f.a && e.b == f.b);
    edges
}

/// Content key of a track set: ids and positions only, independent of order.
/// Vote or title changes leave the key (and therefore the graph) untouched.
pub fn track_set_key(tracks: &[Track]) -> u64 {
    let mut rows: Vec<(&str, u64, u64)> = tracks
        .iter()
        .map(|t| (t.id.as_str(), t.x.to_bits(), t.y.to_bits()))
        .collect();
    rows.sort_unstable();
    let mut h = DefaultHasher::new();
    rows.hash(&mut h);
    h.finish()
}

/// Cached neighbour graph, recomputed only when the track set's content key
/// changes rather than on every paint.
#[derive(Debug, Clone)]
pub struct NeighborGraph {
    k: usize,
    key: Option<u64>,
    edges: Vec<NeighborEdge>,
}

impl NeighborGraph {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            key: None,
            edges: Vec::new(),
        }
    }

    pub fn edges(&self) -> &[NeighborEdge] {
        &self.edges
    }

    /// Recompute if `tracks` differs from the set the cache was built from.
    /// Returns `true` when a recomputation happened.
    pub fn refresh(&mut self, tracks: &[Track]) -> bool {
        let key = track_set_key(tracks);
        if self.key == Some(key) {
            return false;
        }
        self.edges = compute_neighbor_graph(tracks, self.k);
        self.key = Some(key);
        true
    }
}

impl Default for NeighborGraph {
    fn default() -> Self {
        Self::new(DEFAULT_NEIGHBORS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn track(id: &str, x: f64, y: f64) -> Track {
        Track {
            id: id.to_string(),
            x,
            y,
            ..Track::default()
        }
    }

    fn pairs(edges: &[NeighborEdge]) -> Vec<(&str, &str)> {
        edges.iter().map(|e| (e.a.as_str(), e.b.as_str())).collect()
    }

    /// Pseudo-random but reproducible layout.
    fn scatter(n: usize, seed: u64) -> Vec<Track> {
        let mut state = seed;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 33) % 10_000) as f64 / 100.0
        };
        (0..n)
            .map(|i| {
                let x = next();
                let y = next();
                track(&format!("t{:03}", i), x, y)
            })
            .collect()
    }

    #[test]
    fn test_three_track_scenario_keeps_only_smaller_id_discoveries() {
        let tracks = vec![track("1", 0.0, 0.0), track("2", 1.0, 0.0), track("3", 10.0, 10.0)];
        let edges = compute_neighbor_graph(&tracks, 1);
        // "3" picks "2" as its nearest, but that discovery comes from the
        // larger id, so it is not emitted.
        assert_eq!(pairs(&edges), vec![("1", "2")]);
        assert!((edges[0].distance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_small_inputs() {
        assert!(compute_neighbor_graph(&[], 2).is_empty());
        assert!(compute_neighbor_graph(&[track("solo", 5.0, 5.0)], 2).is_empty());
        assert!(compute_neighbor_graph(&[track("a", 0.0, 0.0), track("b", 1.0, 1.0)], 0).is_empty());

        // Fewer than k + 1 tracks: every track considers all others.
        let tracks = vec![track("a", 0.0, 0.0), track("b", 3.0, 4.0), track("c", 50.0, 50.0)];
        let edges = compute_neighbor_graph(&tracks, 5);
        assert_eq!(pairs(&edges), vec![("a", "b"), ("a", "c"), ("b", "c")]);
        assert!((edges[0].distance - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_duplicates_no_self_edges_bounded_degree() {
        for seed in [1u64, 7, 42, 1234] {
            let tracks = scatter(60, seed);
            for k in 1..=4 {
                let edges = compute_neighbor_graph(&tracks, k);

                let mut seen = HashSet::new();
                let mut out_degree: HashMap<&str, usize> = HashMap::new();
                for e in &edges {
                    assert_ne!(e.a, e.b, "self edge");
                    assert!(e.a < e.b, "non-canonical edge");
                    assert!(seen.insert((e.a.clone(), e.b.clone())), "duplicate edge");
                    assert!(e.distance >= 0.0);
                    // Every edge is discovered from its smaller endpoint.
                    *out_degree.entry(e.a.as_str()).or_default() += 1;
                }
                assert!(out_degree.values().all(|&d| d <= k));
            }
        }
    }

    #[test]
    fn test_ties_broken_by_id() {
        // "b" and "c" are equidistant from "a"; with k = 1 "b" wins.
        let tracks = vec![track("a", 0.0, 0.0), track("c", 0.0, 1.0), track("b", 1.0, 0.0)];
        let edges = compute_neighbor_graph(&tracks, 1);
        assert!(pairs(&edges).contains(&("a", "b")));
        assert!(!pairs(&edges).contains(&("a", "c")));
    }

    #[test]
    fn test_order_independent() {
        let tracks = scatter(25, 99);
        let mut reversed = tracks.clone();
        reversed.reverse();
        assert_eq!(
            compute_neighbor_graph(&tracks, 2),
            compute_neighbor_graph(&reversed, 2)
        );
        assert_eq!(track_set_key(&tracks), track_set_key(&reversed));
    }

    #[test]
    fn test_graph_cache_recomputes_on_position_change_only() {
        let mut tracks = vec![track("1", 0.0, 0.0), track("2", 1.0, 0.0), track("3", 10.0, 10.0)];
        let mut graph = NeighborGraph::new(1);
        assert!(graph.refresh(&tracks));
        assert!(!graph.refresh(&tracks));

        tracks[0].vote_score = 12;
        tracks[1].title = "renamed".into();
        assert!(!graph.refresh(&tracks), "vote/title change must not recompute");

        tracks[2].x = 1.5;
        tracks[2].y = 0.5;
        assert!(graph.refresh(&tracks));
        assert_eq!(graph.edges().len(), 2);
    }
}
