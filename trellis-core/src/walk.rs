//! Traversal Engine
//!
//! Two families of traversal, both reading the live adjacency rather than the
//! closure cache:
//!
//! - **Visitor walks** ([`Dag::dfs_walk`], [`Dag::bfs_walk`],
//!   [`Dag::ordered_walk`]) visit every vertex exactly once, starting from
//!   the roots. Roots and children are taken in ascending id order, so the
//!   visit order of a given graph is stable.
//!
//! - **Walkers** ([`Dag::ancestors_walker`], [`Dag::descendants_walker`]) are
//!   lazy breadth-first iterators over the relatives of one vertex, paired
//!   with a [`WalkSignal`] that stops them.
//!
//! # Locking
//!
//! A visitor walk computes its visit order under the structural read lock and
//! calls the visitor after the lock is released, so a visitor may query or
//! mutate the DAG. A walker takes the read lock for the duration of a single
//! `next()`; dropping a walker half way never leaves anything blocked.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::closure::Direction;
use crate::dag::Dag;
use crate::error::Result;
use crate::options::VertexHasher;
use crate::store::Store;

/// Receives vertices during a visitor walk.
pub trait Visitor<V> {
    fn visit(&mut self, id: &str, value: &Arc<V>);
}

impl<V, F> Visitor<V> for F
where
    F: FnMut(&str, &Arc<V>),
{
    fn visit(&mut self, id: &str, value: &Arc<V>) {
        self(id, value)
    }
}

/// Cancellation handle of a [`Walker`].
///
/// Cloneable and safe to raise from any thread, any number of times.
#[derive(Debug, Clone, Default)]
pub struct WalkSignal {
    cancelled: Arc<AtomicBool>,
}

impl WalkSignal {
    /// Stop every walker sharing this signal.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Lazy, duplicate free, breadth-first sequence of the ids related to one
/// vertex.
///
/// Vertices deleted while the walk is in progress are skipped.
pub struct Walker<'a, V, H: VertexHasher<V>> {
    dag: &'a Dag<V, H>,
    direction: Direction,
    queue: VecDeque<String>,
    seen: HashSet<String>,
    signal: WalkSignal,
}

impl<'a, V, H> Walker<'a, V, H>
where
    V: Send + Sync,
    H: VertexHasher<V>,
{
    fn start(dag: &'a Dag<V, H>, direction: Direction, id: &str) -> Result<(Self, WalkSignal)> {
        let store = dag.read();
        store.check_id(id)?;

        let mut seen = HashSet::from([id.to_owned()]);
        let queue = store
            .neighbours(direction, id)
            .filter(|n| seen.insert((*n).clone()))
            .cloned()
            .collect();
        drop(store);

        let signal = WalkSignal::default();
        let walker = Self {
            dag,
            direction,
            queue,
            seen,
            signal: signal.clone(),
        };
        Ok((walker, signal))
    }

    /// A handle that cancels this walker.
    pub fn signal(&self) -> WalkSignal {
        self.signal.clone()
    }
}

impl<V, H> Iterator for Walker<'_, V, H>
where
    V: Send + Sync,
    H: VertexHasher<V>,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if self.signal.is_cancelled() {
                self.queue.clear();
                return None;
            }
            let id = self.queue.pop_front()?;

            let store = self.dag.read();
            if !store.contains(&id) {
                continue;
            }
            for n in store.neighbours(self.direction, &id) {
                if self.seen.insert(n.clone()) {
                    self.queue.push_back(n.clone());
                }
            }
            return Some(id);
        }
    }
}

impl<V, H> Dag<V, H>
where
    V: Send + Sync,
    H: VertexHasher<V>,
{
    /// Depth-first visit of every vertex, starting from the roots.
    pub fn dfs_walk(&self, visitor: &mut impl Visitor<V>) {
        let order = dfs_order(&*self.read());
        visit_all(visitor, order);
    }

    /// Breadth-first visit of every vertex, starting from the roots.
    pub fn bfs_walk(&self, visitor: &mut impl Visitor<V>) {
        let order = {
            let store = self.read();
            let mut queue: VecDeque<String> = store.sorted_roots().into();
            let mut visited = HashSet::with_capacity(store.order());
            let mut order = Vec::with_capacity(store.order());

            while let Some(id) = queue.pop_front() {
                if !visited.insert(id.clone()) {
                    continue;
                }
                queue.extend(store.sorted_children(&id));
                if let Some(value) = store.value(&id) {
                    order.push((id, Arc::clone(value)));
                }
            }
            order
        };
        visit_all(visitor, order);
    }

    /// Breadth-first visit in which no vertex is visited before all of its
    /// parents.
    pub fn ordered_walk(&self, visitor: &mut impl Visitor<V>) {
        let order = {
            let store = self.read();
            let mut queue: VecDeque<String> = store.sorted_roots().into();
            let mut visited: HashSet<String> = HashSet::with_capacity(store.order());
            let mut order = Vec::with_capacity(store.order());

            while let Some(id) = queue.pop_front() {
                if visited.contains(&id) {
                    continue;
                }
                if !store.parents(&id).all(|p| visited.contains(p)) {
                    // a later path reaches the missing parent first
                    queue.push_back(id);
                    continue;
                }
                visited.insert(id.clone());
                queue.extend(store.sorted_children(&id));
                if let Some(value) = store.value(&id) {
                    order.push((id, Arc::clone(value)));
                }
            }
            order
        };
        visit_all(visitor, order);
    }

    /// Lazily walk the ancestors of `id`, nearest first.
    pub fn ancestors_walker(&self, id: &str) -> Result<(Walker<'_, V, H>, WalkSignal)> {
        Walker::start(self, Direction::Ancestors, id)
    }

    /// Lazily walk the descendants of `id`, nearest first.
    pub fn descendants_walker(&self, id: &str) -> Result<(Walker<'_, V, H>, WalkSignal)> {
        Walker::start(self, Direction::Descendants, id)
    }

    /// Ancestor ids of `id` in breadth-first order.
    pub fn get_ordered_ancestors(&self, id: &str) -> Result<Vec<String>> {
        let (walker, _signal) = self.ancestors_walker(id)?;
        Ok(walker.collect())
    }

    /// Descendant ids of `id` in breadth-first order.
    pub fn get_ordered_descendants(&self, id: &str) -> Result<Vec<String>> {
        let (walker, _signal) = self.descendants_walker(id)?;
        Ok(walker.collect())
    }
}

/// Vertices in depth-first order, roots and children ascending by id.
pub(crate) fn dfs_order<V, H>(store: &Store<V, H>) -> Vec<(String, Arc<V>)>
where
    H: VertexHasher<V>,
{
    let mut stack: Vec<String> = store.sorted_roots();
    stack.reverse();
    let mut visited = HashSet::with_capacity(store.order());
    let mut order = Vec::with_capacity(store.order());

    while let Some(id) = stack.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        stack.extend(store.sorted_children(&id).into_iter().rev());
        if let Some(value) = store.value(&id) {
            order.push((id, Arc::clone(value)));
        }
    }
    order
}

fn visit_all<V>(visitor: &mut impl Visitor<V>, order: Vec<(String, Arc<V>)>) {
    for (id, value) in &order {
        visitor.visit(id, value);
    }
}
