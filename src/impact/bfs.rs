//! BFS traversal over adjacency maps
//!
//! Both the module graph and the package dependency graph store adjacency as
//! `HashMap<String, Vec<String>>`; these helpers work on either.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};

/// Adjacency list keyed by node id
pub(crate) type Adjacency = HashMap<String, Vec<String>>;

/// Multi-source reverse BFS from multiple target nodes simultaneously.
///
/// Walks `reverse` (node -> nodes depending on it) from every target at
/// once. Targets are at depth 0 and every other node gets its distance to the
/// nearest target: FIFO order reaches each node first along a shortest path.
/// Cycles terminate through the visited map.
pub(crate) fn reverse_bfs_multi(reverse: &Adjacency, targets: &[&str]) -> HashMap<String, usize> {
    let mut ancestors: HashMap<String, usize> = HashMap::new();
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();

    for &target in targets {
        if !ancestors.contains_key(target) {
            ancestors.insert(target.to_string(), 0);
            queue.push_back((target.to_string(), 0));
        }
    }

    while let Some((current, d)) = queue.pop_front() {
        let Some(dependents) = reverse.get(&current) else {
            continue;
        };
        for dependent in dependents {
            if let Entry::Vacant(e) = ancestors.entry(dependent.clone()) {
                e.insert(d + 1);
                queue.push_back((dependent.clone(), d + 1));
            }
        }
    }

    ancestors
}

/// Every node reachable from `starts` along `forward`, starts included
pub(crate) fn forward_reachable<'a>(
    forward: &'a Adjacency,
    starts: impl IntoIterator<Item = &'a str>,
) -> HashSet<&'a str> {
    let mut seen: HashSet<&'a str> = HashSet::new();
    let mut queue: VecDeque<&'a str> = VecDeque::new();
    for start in starts {
        if seen.insert(start) {
            queue.push_back(start);
        }
    }
    while let Some(current) = queue.pop_front() {
        if let Some(next) = forward.get(current) {
            for n in next {
                if seen.insert(n.as_str()) {
                    queue.push_back(n.as_str());
                }
            }
        }
    }
    seen
}
