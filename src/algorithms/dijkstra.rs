use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use crate::topology::TopologySnapshot;
use crate::{NodeName, Weight};

/// Paths from every source to every reachable destination, as full node-name
/// sequences (source first, destination last). Unreachable pairs are absent.
pub type AllPaths = BTreeMap<NodeName, BTreeMap<NodeName, Vec<NodeName>>>;

#[derive(Debug)]
struct State {
    cost: Weight,
    node: NodeName,
}

impl Eq for State {}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.node == other.node
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap; ties broken by name so equal
        // topologies always pop in the same order.
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Single-source Dijkstra over the snapshot's adjacency.
pub fn shortest_paths_from(
    snapshot: &TopologySnapshot,
    source: &str,
) -> BTreeMap<NodeName, Vec<NodeName>> {
    let mut distances: HashMap<&str, Weight> = HashMap::new();
    let mut previous: HashMap<NodeName, NodeName> = HashMap::new();
    let mut heap = BinaryHeap::new();

    distances.insert(source, 0);
    heap.push(State {
        cost: 0,
        node: source.to_string(),
    });

    while let Some(State { cost, node }) = heap.pop() {
        // Skip if a better path was already settled.
        if cost > *distances.get(node.as_str()).unwrap_or(&Weight::MAX) {
            continue;
        }

        let Some(neighbors) = snapshot.adjacency.get(&node) else {
            continue;
        };
        for (neighbor, link_cost) in neighbors {
            let new_cost = cost.saturating_add(*link_cost);
            if new_cost < *distances.get(neighbor.as_str()).unwrap_or(&Weight::MAX) {
                distances.insert(neighbor, new_cost);
                previous.insert(neighbor.clone(), node.clone());
                heap.push(State {
                    cost: new_cost,
                    node: neighbor.clone(),
                });
            }
        }
    }

    let mut paths = BTreeMap::new();
    for dest in snapshot.adjacency.keys() {
        if distances.contains_key(dest.as_str()) {
            paths.insert(dest.clone(), reconstruct_path(&previous, source, dest));
        }
    }
    paths
}

/// Runs Dijkstra from every node. The dominant cost of a topology change;
/// always re-run in full, since a removed link can shift paths non-locally.
pub fn all_pairs_shortest_paths(snapshot: &TopologySnapshot) -> AllPaths {
    snapshot
        .adjacency
        .keys()
        .map(|source| (source.clone(), shortest_paths_from(snapshot, source)))
        .collect()
}

fn reconstruct_path(
    previous: &HashMap<NodeName, NodeName>,
    source: &str,
    dest: &str,
) -> Vec<NodeName> {
    let mut path = vec![dest.to_string()];
    let mut current = dest;
    while current != source {
        match previous.get(current) {
            Some(prev) => {
                path.push(prev.clone());
                current = prev;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{Network, NodeKind};

    fn net_from_edges(nodes: &[&str], edges: &[(&str, &str, Weight)]) -> Network {
        let mut net = Network::new();
        for (i, name) in nodes.iter().enumerate() {
            net.add_node(i as u32 + 1, name, None, NodeKind::Router)
                .unwrap();
        }
        let id_of = |name: &str| net.node_by_name(name).unwrap().id;
        let ids: Vec<(u32, u32, Weight)> = edges
            .iter()
            .map(|(s, d, w)| (id_of(s), id_of(d), *w))
            .collect();
        for (s, d, w) in ids {
            net.add_link(s, d, w).unwrap();
            net.add_link(d, s, w).unwrap();
        }
        net
    }

    fn path_cost(snapshot: &TopologySnapshot, path: &[NodeName]) -> Weight {
        path.windows(2)
            .map(|pair| {
                snapshot.adjacency[&pair[0]]
                    .iter()
                    .find(|(n, _)| *n == pair[1])
                    .map(|(_, w)| *w)
                    .unwrap()
            })
            .sum()
    }

    /// Exhaustive minimum over all simple paths, for cross-checking.
    fn brute_force_min_cost(
        snapshot: &TopologySnapshot,
        source: &str,
        dest: &str,
    ) -> Option<Weight> {
        fn walk(
            snapshot: &TopologySnapshot,
            current: &str,
            dest: &str,
            visited: &mut Vec<NodeName>,
            cost: Weight,
            best: &mut Option<Weight>,
        ) {
            if current == dest {
                *best = Some(best.map_or(cost, |b: Weight| b.min(cost)));
                return;
            }
            for (next, w) in &snapshot.adjacency[current] {
                if !visited.contains(next) {
                    visited.push(next.clone());
                    walk(snapshot, next, dest, visited, cost + w, best);
                    visited.pop();
                }
            }
        }
        let mut best = None;
        let mut visited = vec![source.to_string()];
        walk(snapshot, source, dest, &mut visited, 0, &mut best);
        best
    }

    #[test]
    fn matches_brute_force_on_small_graph() {
        let net = net_from_edges(
            &["A", "B", "C", "D", "E"],
            &[
                ("A", "B", 2),
                ("A", "C", 7),
                ("B", "C", 3),
                ("B", "D", 6),
                ("C", "D", 1),
                ("D", "E", 4),
            ],
        );
        let snap = net.snapshot();
        let all = all_pairs_shortest_paths(&snap);

        for source in snap.adjacency.keys() {
            for dest in snap.adjacency.keys() {
                let expected = brute_force_min_cost(&snap, source, dest);
                let actual = all[source].get(dest).map(|p| path_cost(&snap, p));
                assert_eq!(actual, expected, "{source} -> {dest}");
            }
        }
    }

    #[test]
    fn paths_start_and_end_correctly() {
        let net = net_from_edges(&["A", "B", "C"], &[("A", "B", 1), ("B", "C", 1)]);
        let all = all_pairs_shortest_paths(&net.snapshot());
        let path = &all["A"]["C"];
        assert_eq!(path, &["A", "B", "C"]);
        assert_eq!(all["A"]["A"], vec!["A"]);
    }

    #[test]
    fn unreachable_pairs_absent() {
        let mut net = net_from_edges(&["A", "B"], &[("A", "B", 1)]);
        net.add_node(3, "Z", None, NodeKind::Router).unwrap();
        let all = all_pairs_shortest_paths(&net.snapshot());
        assert!(!all["A"].contains_key("Z"));
        assert!(!all["Z"].contains_key("A"));
        // Z still routes to itself.
        assert_eq!(all["Z"]["Z"], vec!["Z"]);
    }

    #[test]
    fn deterministic_on_equal_inputs() {
        // Two equal-cost routes A->D; the chosen one must be stable.
        let edges = [("A", "B", 1), ("A", "C", 1), ("B", "D", 1), ("C", "D", 1)];
        let first = all_pairs_shortest_paths(
            &net_from_edges(&["A", "B", "C", "D"], &edges).snapshot(),
        );
        let second = all_pairs_shortest_paths(
            &net_from_edges(&["A", "B", "C", "D"], &edges).snapshot(),
        );
        assert_eq!(first, second);
    }

    #[test]
    fn linear_removal_and_expensive_rejoin() {
        // A-B-C line, weights 1 and 1.
        let mut net = net_from_edges(&["A", "B", "C"], &[("A", "B", 1), ("B", "C", 1)]);
        let all = all_pairs_shortest_paths(&net.snapshot());
        let snap = net.snapshot();
        assert_eq!(all["A"]["C"], vec!["A", "B", "C"]);
        assert_eq!(path_cost(&snap, &all["A"]["C"]), 2);

        // Remove B: A->C unreachable.
        let b = net.node_by_name("B").unwrap().id;
        net.remove_node(b).unwrap();
        let all = all_pairs_shortest_paths(&net.snapshot());
        assert!(!all["A"].contains_key("C"));

        // Re-add B plus a direct A-C link of weight 5.
        net.add_node(b, "B", None, NodeKind::Router).unwrap();
        let a = net.node_by_name("A").unwrap().id;
        let c = net.node_by_name("C").unwrap().id;
        net.add_link(a, c, 5).unwrap();
        net.add_link(c, a, 5).unwrap();
        let snap = net.snapshot();
        let all = all_pairs_shortest_paths(&snap);
        assert_eq!(all["A"]["C"], vec!["A", "C"]);
        assert_eq!(path_cost(&snap, &all["A"]["C"]), 5);
    }
}
