//! Closure Cache
//!
//! Memoized ancestor and descendant sets, one per vertex and direction.
//!
//! # Population
//!
//! The closure of a vertex is collected with an explicit stack, so the depth
//! of the graph never turns into call depth. A reached vertex whose own
//! closure is already cached contributes that set and is not expanded any
//! further; every other vertex is expanded through its neighbours. Only the
//! requested vertex gets an entry, so one query costs memory proportional to
//! its own closure. Entries are plain id sets; an entry never points into
//! another entry.
//!
//! Computing the closure of a vertex holds that vertex's lock from the
//! [`MutexPool`] for the direction, so two threads never compute the same
//! entry at once while unrelated vertices proceed in parallel. A computation
//! holds a single vertex lock and only reads other entries, so it cannot
//! deadlock.
//!
//! # Invalidation
//!
//! The cache lives outside the structural lock of the [`Dag`](crate::Dag).
//! Population runs while the structural lock is held for reading and
//! invalidation while it is held for writing, so an entry always reflects a
//! single topology. Mutations read the closures they need for invalidation
//! *before* changing any edge.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::mutex_pool::MutexPool;
use crate::options::VertexHasher;
use crate::store::{IdSet, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Ancestors,
    Descendants,
}

#[derive(Default)]
pub(crate) struct ClosureCache {
    ancestors: Mutex<HashMap<String, Arc<IdSet>>>,
    descendants: Mutex<HashMap<String, Arc<IdSet>>>,
    ancestor_locks: MutexPool,
    descendant_locks: MutexPool,
}

impl ClosureCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn entries(&self, direction: Direction) -> &Mutex<HashMap<String, Arc<IdSet>>> {
        match direction {
            Direction::Ancestors => &self.ancestors,
            Direction::Descendants => &self.descendants,
        }
    }

    fn locks(&self, direction: Direction) -> &MutexPool {
        match direction {
            Direction::Ancestors => &self.ancestor_locks,
            Direction::Descendants => &self.descendant_locks,
        }
    }

    /// The cached closure, if present.
    pub(crate) fn cached(&self, direction: Direction, id: &str) -> Option<Arc<IdSet>> {
        self.entries(direction).lock().get(id).cloned()
    }

    /// The closure of `id`, computed from `store` and cached if missing.
    ///
    /// The caller must hold the structural lock (read or write) that guards
    /// `store` for the whole call.
    pub(crate) fn closure<V, H>(
        &self,
        store: &Store<V, H>,
        direction: Direction,
        id: &str,
    ) -> Arc<IdSet>
    where
        H: VertexHasher<V>,
    {
        if let Some(closure) = self.cached(direction, id) {
            return closure;
        }

        let _guard = self.locks(direction).lock(id);

        // another thread may have filled the entry while we waited
        if let Some(closure) = self.cached(direction, id) {
            return closure;
        }

        let mut closure = IdSet::new();
        let mut stack: Vec<&String> = store.neighbours(direction, id).collect();
        while let Some(current) = stack.pop() {
            if !closure.insert(current.clone()) {
                continue;
            }
            match self.cached(direction, current) {
                Some(known) => closure.extend(known.iter().cloned()),
                None => stack.extend(store.neighbours(direction, current)),
            }
        }

        trace!(id, ?direction, len = closure.len(), "populated closure");
        let closure = Arc::new(closure);
        self.entries(direction)
            .lock()
            .insert(id.to_owned(), Arc::clone(&closure));
        closure
    }

    /// Drop the entries of `ids` for one direction.
    pub(crate) fn invalidate<'a, I>(&self, direction: Direction, ids: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut entries = self.entries(direction).lock();
        for id in ids {
            entries.remove(id);
        }
    }

    pub(crate) fn invalidate_one(&self, direction: Direction, id: &str) {
        self.entries(direction).lock().remove(id);
    }

    /// Drop every entry.
    pub(crate) fn flush(&self) {
        let mut ancestors = self.ancestors.lock();
        let mut descendants = self.descendants.lock();
        debug!(
            ancestors = ancestors.len(),
            descendants = descendants.len(),
            "flushing closure caches"
        );
        ancestors.clear();
        descendants.clear();
    }

    pub(crate) fn len(&self, direction: Direction) -> usize {
        self.entries(direction).lock().len()
    }
}
