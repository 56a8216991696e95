//! Transitive Reduction
//!
//! An edge `v -> c` is redundant when `c` can also be reached through another
//! child of `v`. Redundancy is decided with the descendant closures of the
//! *children* of `v`; the closure of `v` itself always contains `c` through
//! the very edge under test.
//!
//! # How It Works
//!
//! 1. Order the vertices parents-first with Kahn's algorithm and compute
//!    descendant closures in the reverse of that order. Every child is
//!    cached before its parents, so each computation stops at its children.
//! 2. For every vertex, union the closures of its children and drop each
//!    edge to a child found in that union.
//! 3. If anything was dropped, flush both caches: reachability is unchanged
//!    but cached entries were computed from edges that no longer exist.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::closure::Direction;
use crate::dag::Dag;
use crate::options::VertexHasher;
use crate::store::{IdSet, Store};

/// Vertex ids with every parent before its children.
fn parents_first<V, H>(store: &Store<V, H>) -> Vec<String>
where
    H: VertexHasher<V>,
{
    let mut waiting: HashMap<&str, usize> = HashMap::new();
    let mut queue: VecDeque<&String> = VecDeque::new();
    for (id, _) in store.values() {
        match store.parent_count(id) {
            0 => queue.push_back(id),
            n => {
                waiting.insert(id.as_str(), n);
            }
        }
    }

    let mut order = Vec::with_capacity(store.order());
    while let Some(id) = queue.pop_front() {
        for child in store.children(id) {
            if let Some(left) = waiting.get_mut(child.as_str()) {
                *left -= 1;
                if *left == 0 {
                    queue.push_back(child);
                }
            }
        }
        order.push(id.clone());
    }
    order
}

impl<V, H> Dag<V, H>
where
    V: Send + Sync,
    H: VertexHasher<V>,
{
    /// Remove every edge implied by a longer path. Returns the number of
    /// removed edges.
    pub fn reduce_transitively(&self) -> usize {
        let mut store = self.write();
        let cache = self.cache();

        let ids = parents_first(&*store);
        for id in ids.iter().rev() {
            cache.closure(&*store, Direction::Descendants, id);
        }

        let mut redundant = Vec::new();
        for v in &ids {
            let mut reachable = IdSet::new();
            for child in store.children(v) {
                let closure = cache.closure(&*store, Direction::Descendants, child);
                reachable.extend(closure.iter().cloned());
            }
            redundant.extend(
                store
                    .children(v)
                    .filter(|child| reachable.contains(*child))
                    .map(|child| (v.clone(), child.clone())),
            );
        }

        for (src, dst) in &redundant {
            store.remove_edge(src, dst);
            debug!(src = %src, dst = %dst, "removed transitive edge");
        }
        if !redundant.is_empty() {
            cache.flush();
        }
        redundant.len()
    }
}
