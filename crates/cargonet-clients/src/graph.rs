//! In-process directed graph for terminal path lookup.
//!
//! The terminal client caches routes added via `addRoute`/`addRoutes`
//! locally so `findShortestPath`/`findTopPaths` can answer without a
//! server round trip: add routes, then query paths with no intervening
//! event wait.

use serde::{Deserialize, Serialize};
use std::collections::{BinaryHeap, HashMap};

/// One directed edge between two terminals for a given transportation mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSegment {
    pub segment_id: String,
    pub start: String,
    pub end: String,
    pub mode: i32,
    pub cost: f64,
}

/// An ordered sequence of segments from `start` to `end`, with total cost.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Path {
    pub segments: Vec<PathSegmentRef>,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathSegmentRef {
    pub segment_id: String,
    pub start: String,
    pub end: String,
    pub mode: i32,
    pub cost: f64,
}

/// A directed multigraph of terminals connected by mode-tagged routes.
///
/// Mirrors the source's `Route`/`PathSegment` model objects as owned
/// values rather than raw pointers, and adds the actual graph-search
/// behavior the original left to the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminalGraph {
    nodes: Vec<String>,
    edges: HashMap<String, Vec<PathSegment>>,
}

impl TerminalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_terminal(&mut self, name: &str) {
        if !self.nodes.iter().any(|n| n == name) {
            self.nodes.push(name.to_string());
            self.edges.entry(name.to_string()).or_default();
        }
    }

    pub fn has_terminal(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n == name)
    }

    pub fn terminal_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn remove_terminal(&mut self, name: &str) {
        self.nodes.retain(|n| n != name);
        self.edges.remove(name);
        for segs in self.edges.values_mut() {
            segs.retain(|s| s.end != name);
        }
    }

    pub fn add_route(&mut self, segment: PathSegment) {
        self.add_terminal(&segment.start);
        self.add_terminal(&segment.end);
        self.edges.entry(segment.start.clone()).or_default().push(segment);
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }

    /// Dijkstra shortest path restricted to edges of `mode`, matching
    /// `findShortestPath(start, end, mode)`.
    pub fn shortest_path(&self, start: &str, end: &str, mode: i32) -> Option<Path> {
        self.k_shortest_paths(start, end, mode, 1).into_iter().next()
    }

    /// Yen's algorithm for the top-`k` loopless paths by cost, in
    /// ascending cost order, matching `findTopPaths(start, end, k, mode)`.
    pub fn k_shortest_paths(&self, start: &str, end: &str, mode: i32, k: usize) -> Vec<Path> {
        if k == 0 || !self.has_terminal(start) || !self.has_terminal(end) {
            return Vec::new();
        }

        let mut found: Vec<Path> = Vec::new();
        let Some(first) = self.dijkstra(start, end, mode, &[], &[]) else {
            return Vec::new();
        };
        found.push(first);

        let mut candidates: BinaryHeap<std::cmp::Reverse<OrderedPath>> = BinaryHeap::new();

        while found.len() < k {
            let prev = found.last().unwrap().clone();
            for i in 0..prev.segments.len() {
                let spur_node = &prev.segments[i].start;
                let root_path: Vec<PathSegmentRef> = prev.segments[..i].to_vec();

                let removed_edges: Vec<(String, String, i32)> = found
                    .iter()
                    .filter(|p| p.segments.len() > i && p.segments[..i] == root_path[..])
                    .map(|p| {
                        let seg = &p.segments[i];
                        (seg.start.clone(), seg.end.clone(), seg.mode)
                    })
                    .collect();

                let removed_nodes: Vec<String> =
                    root_path.iter().map(|s| s.start.clone()).collect();

                if let Some(spur_path) =
                    self.dijkstra(spur_node, end, mode, &removed_edges, &removed_nodes)
                {
                    let mut total: Vec<PathSegmentRef> = root_path.clone();
                    total.extend(spur_path.segments.clone());
                    let total_cost =
                        root_path.iter().map(|s| s.cost).sum::<f64>() + spur_path.total_cost;
                    let candidate = Path { segments: total, total_cost };
                    if !found.contains(&candidate) {
                        candidates.push(std::cmp::Reverse(OrderedPath(candidate)));
                    }
                }
            }

            match candidates.pop() {
                Some(std::cmp::Reverse(OrderedPath(next))) => found.push(next),
                None => break,
            }
        }

        found.truncate(k);
        found
    }

    fn dijkstra(
        &self,
        start: &str,
        end: &str,
        mode: i32,
        removed_edges: &[(String, String, i32)],
        removed_nodes: &[String],
    ) -> Option<Path> {
        if removed_nodes.iter().any(|n| n == start) {
            return None;
        }

        let mut dist: HashMap<&str, f64> = HashMap::new();
        let mut prev: HashMap<&str, (&str, &PathSegment)> = HashMap::new();
        let mut heap: BinaryHeap<std::cmp::Reverse<(ordered_float::OrderedF64, &str)>> =
            BinaryHeap::new();

        dist.insert(start, 0.0);
        heap.push(std::cmp::Reverse((ordered_float::OrderedF64(0.0), start)));

        while let Some(std::cmp::Reverse((d, node))) = heap.pop() {
            if node == end {
                break;
            }
            if d.0 > *dist.get(node).unwrap_or(&f64::INFINITY) {
                continue;
            }
            let Some(edges) = self.edges.get(node) else { continue };
            for edge in edges {
                if edge.mode != mode {
                    continue;
                }
                if removed_nodes.iter().any(|n| n == &edge.end) {
                    continue;
                }
                if removed_edges
                    .iter()
                    .any(|(s, e, m)| s == &edge.start && e == &edge.end && *m == edge.mode)
                {
                    continue;
                }
                let next_dist = d.0 + edge.cost;
                if next_dist < *dist.get(edge.end.as_str()).unwrap_or(&f64::INFINITY) {
                    dist.insert(&edge.end, next_dist);
                    prev.insert(&edge.end, (node, edge));
                    heap.push(std::cmp::Reverse((ordered_float::OrderedF64(next_dist), &edge.end)));
                }
            }
        }

        if !dist.contains_key(end) {
            return None;
        }

        let mut segments = Vec::new();
        let mut cur = end;
        while let Some((p, edge)) = prev.get(cur) {
            segments.push(PathSegmentRef {
                segment_id: edge.segment_id.clone(),
                start: edge.start.clone(),
                end: edge.end.clone(),
                mode: edge.mode,
                cost: edge.cost,
            });
            cur = p;
        }
        segments.reverse();

        Some(Path {
            total_cost: *dist.get(end).unwrap(),
            segments,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct OrderedPath(Path);

impl Eq for OrderedPath {}

impl PartialOrd for OrderedPath {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedPath {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .total_cost
            .partial_cmp(&other.0.total_cost)
            .unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// Minimal total-order wrapper over `f64` for use as a `BinaryHeap` key.
/// Graph edge costs are finite by construction (defaulted to 1.0, never
/// user-supplied NaN), so this never needs to handle `NaN` specially.
mod ordered_float {
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct OrderedF64(pub f64);

    impl Eq for OrderedF64 {}

    impl PartialOrd for OrderedF64 {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }

    impl Ord for OrderedF64 {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(id: &str, start: &str, end: &str, mode: i32, cost: f64) -> PathSegment {
        PathSegment {
            segment_id: id.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            mode,
            cost,
        }
    }

    #[test]
    fn shortest_path_prefers_direct_edge_over_two_hops() {
        let mut g = TerminalGraph::new();
        g.add_route(seg("ab", "A", "B", 1, 1.0));
        g.add_route(seg("bc", "B", "C", 1, 1.0));
        g.add_route(seg("ac", "A", "C", 1, 1.5));

        let path = g.shortest_path("A", "C", 1).unwrap();
        assert_eq!(path.segments.len(), 1);
        assert_eq!(path.segments[0].segment_id, "ac");
        assert_eq!(path.total_cost, 1.5);
    }

    #[test]
    fn k_shortest_paths_returns_in_cost_order() {
        let mut g = TerminalGraph::new();
        g.add_route(seg("ab", "A", "B", 1, 1.0));
        g.add_route(seg("bc", "B", "C", 1, 1.0));
        g.add_route(seg("ac", "A", "C", 1, 1.5));

        let paths = g.k_shortest_paths("A", "C", 1, 2);
        assert_eq!(paths.len(), 2);
        assert!(paths[0].total_cost <= paths[1].total_cost);
        assert_eq!(paths[0].segments[0].segment_id, "ac");
    }

    #[test]
    fn mode_filter_excludes_other_mode_edges() {
        let mut g = TerminalGraph::new();
        g.add_route(seg("ab-road", "A", "B", 1, 1.0));
        g.add_route(seg("ab-rail", "A", "B", 2, 1.0));

        assert!(g.shortest_path("A", "B", 3).is_none());
        assert!(g.shortest_path("A", "B", 1).is_some());
    }

    #[test]
    fn remove_terminal_drops_incident_edges() {
        let mut g = TerminalGraph::new();
        g.add_route(seg("ab", "A", "B", 1, 1.0));
        assert_eq!(g.terminal_count(), 2);
        g.remove_terminal("B");
        assert_eq!(g.terminal_count(), 1);
        assert!(g.shortest_path("A", "B", 1).is_none());
    }

    #[test]
    fn serialize_deserialize_round_trips() {
        let mut g = TerminalGraph::new();
        g.add_route(seg("ab", "A", "B", 1, 2.0));
        let json = serde_json::to_string(&g).unwrap();
        let restored: TerminalGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.terminal_count(), g.terminal_count());
        assert_eq!(
            restored.shortest_path("A", "B", 1).unwrap().total_cost,
            2.0
        );
    }
}
