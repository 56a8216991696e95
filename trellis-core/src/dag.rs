//! The DAG Handle
//!
//! [`Dag`] is the shared, thread-safe entry point. It owns:
//!
//! - the [`Store`] (vertices and both edge directions) behind one
//!   read/write lock: mutations take it exclusively, queries take it shared
//! - the [`ClosureCache`], which has its own short-lived locks
//!
//! # Cycle Guard
//!
//! `add_edge(src, dst)` is rejected when `src` is already a descendant of
//! `dst`. The check reads the descendant closure of `dst`, which stays cached
//! until an edge below `dst` changes.
//!
//! # Invalidation
//!
//! Every structural change first reads the closures it is about to make
//! stale, then changes the edges, then drops exactly those entries, all
//! while the structural lock is held exclusively.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::closure::{ClosureCache, Direction};
use crate::error::{DagError, Result};
use crate::options::{Identity, Keyed, Options, VertexHasher};
use crate::store::{IdSet, Store};

/// A directed acyclic graph of opaque values, safe to share across threads.
pub struct Dag<V, H: VertexHasher<V> = Identity> {
    store: RwLock<Store<V, H>>,
    cache: ClosureCache,
    flow_threads: Option<NonZeroUsize>,
    flow_pool: Option<rayon::ThreadPool>,
}

impl<V> Dag<V, Identity>
where
    V: Eq + Hash + Send + Sync,
{
    /// Create an empty DAG keyed by vertex value.
    pub fn new() -> Self {
        Self {
            store: RwLock::new(Store::new(Identity)),
            cache: ClosureCache::new(),
            flow_threads: None,
            flow_pool: None,
        }
    }
}

impl<V> Default for Dag<V, Identity>
where
    V: Eq + Hash + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, H> Dag<V, H>
where
    V: Send + Sync,
    H: VertexHasher<V>,
{
    /// Create an empty DAG from explicit options.
    ///
    /// # Errors
    /// `ThreadPool` if a dedicated flow pool was requested and could not be
    /// built.
    pub fn with_options(options: Options<H>) -> Result<Self> {
        let flow_pool = options
            .flow_threads
            .map(|threads| {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads.get())
                    .thread_name(|i| format!("trellis-flow-{i}"))
                    .build()
                    .map_err(|e| DagError::ThreadPool(e.to_string()))
            })
            .transpose()?;

        Ok(Self {
            store: RwLock::new(Store::new(options.vertex_hasher)),
            cache: ClosureCache::new(),
            flow_threads: options.flow_threads,
            flow_pool,
        })
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Store<V, H>> {
        self.store.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Store<V, H>> {
        self.store.write()
    }

    pub(crate) fn cache(&self) -> &ClosureCache {
        &self.cache
    }

    pub(crate) fn flow_pool(&self) -> Option<&rayon::ThreadPool> {
        self.flow_pool.as_ref()
    }

    // ------------------------------------------------------------------
    // Vertices
    // ------------------------------------------------------------------

    /// Add a vertex under a freshly generated id and return that id.
    pub fn add_vertex(&self, value: V) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.add_vertex_by_id(id.clone(), value)?;
        Ok(id)
    }

    /// Add a vertex under the id it declares itself.
    pub fn add_keyed_vertex(&self, value: V) -> Result<String>
    where
        V: Keyed,
    {
        let id = value.id();
        self.add_vertex_by_id(id.clone(), value)?;
        Ok(id)
    }

    /// Add a vertex under a caller assigned id.
    ///
    /// # Errors
    /// `IdEmpty` for an empty id, `VertexDuplicate` if an equal value (by
    /// hasher key) is stored already, `IdDuplicate` if the id is taken.
    pub fn add_vertex_by_id(&self, id: impl Into<String>, value: V) -> Result<()> {
        let id = id.into();
        self.store.write().insert_vertex(id.clone(), Arc::new(value))?;
        debug!(id = %id, "added vertex");
        Ok(())
    }

    /// The value stored under `id`.
    pub fn get_vertex(&self, id: &str) -> Result<Arc<V>> {
        let store = self.store.read();
        store.check_id(id)?;
        store
            .value(id)
            .cloned()
            .ok_or_else(|| DagError::IdUnknown(id.to_owned()))
    }

    /// All vertices by id.
    pub fn get_vertices(&self) -> HashMap<String, Arc<V>> {
        self.store
            .read()
            .values()
            .map(|(id, value)| (id.clone(), Arc::clone(value)))
            .collect()
    }

    /// Delete a vertex together with all its inbound and outbound edges.
    pub fn delete_vertex(&self, id: &str) -> Result<()> {
        let mut store = self.store.write();
        store.check_id(id)?;

        let descendants = self.cache.closure(&*store, Direction::Descendants, id);
        let ancestors = self.cache.closure(&*store, Direction::Ancestors, id);

        store.remove_vertex(id);

        self.cache.invalidate(Direction::Ancestors, descendants.iter());
        self.cache.invalidate_one(Direction::Ancestors, id);
        self.cache.invalidate(Direction::Descendants, ancestors.iter());
        self.cache.invalidate_one(Direction::Descendants, id);

        debug!(id, "deleted vertex");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Add an edge between two existing vertices while preventing cycles.
    ///
    /// # Errors
    /// `IdEmpty`/`IdUnknown` for bad ids, `SrcDstEqual` for self-loops,
    /// `EdgeDuplicate` for known edges and `EdgeLoop` if `src` is reachable
    /// from `dst`.
    pub fn add_edge(&self, src: &str, dst: &str) -> Result<()> {
        let mut store = self.store.write();
        store.check_id(src)?;
        store.check_id(dst)?;
        if src == dst {
            return Err(DagError::src_dst_equal(src, dst));
        }
        if store.is_edge(src, dst) {
            return Err(DagError::edge_duplicate(src, dst));
        }

        let descendants = self.cache.closure(&*store, Direction::Descendants, dst);
        if descendants.contains(src) {
            return Err(DagError::edge_loop(src, dst));
        }
        let ancestors = self.cache.closure(&*store, Direction::Ancestors, src);

        store.insert_edge(src, dst);

        // dst and everything below it gained ancestors
        self.cache.invalidate(Direction::Ancestors, descendants.iter());
        self.cache.invalidate_one(Direction::Ancestors, dst);
        // src and everything above it gained descendants
        self.cache.invalidate(Direction::Descendants, ancestors.iter());
        self.cache.invalidate_one(Direction::Descendants, src);

        debug!(src, dst, "added edge");
        Ok(())
    }

    /// Add an edge between two values, adding whichever endpoint is not
    /// stored yet. Endpoints are resolved through the vertex hasher; new
    /// ones get a generated id. Returns the ids of both endpoints.
    ///
    /// Nothing is added when the edge is rejected.
    pub fn connect(&self, src: V, dst: V) -> Result<(String, String)> {
        let src = Arc::new(src);
        let dst = Arc::new(dst);
        let mut store = self.store.write();

        let src_id = store.id_of(&src).cloned();
        let dst_id = store.id_of(&dst).cloned();
        let src_known = src_id.is_some();
        let dst_known = dst_id.is_some();

        let src_id = src_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let dst_id = match dst_id {
            Some(id) => id,
            // both values share one key: they are the same vertex
            None if store.hasher.key(&src) == store.hasher.key(&dst) => src_id.clone(),
            None => uuid::Uuid::new_v4().to_string(),
        };

        if src_id == dst_id {
            return Err(DagError::src_dst_equal(&src_id, &dst_id));
        }
        if src_known && dst_known {
            if store.is_edge(&src_id, &dst_id) {
                return Err(DagError::edge_duplicate(&src_id, &dst_id));
            }
            let descendants = self.cache.closure(&*store, Direction::Descendants, &dst_id);
            if descendants.contains(&src_id) {
                return Err(DagError::edge_loop(&src_id, &dst_id));
            }
        }

        // a fresh endpoint has no relatives, so only known endpoints carry
        // closures worth reading before the change
        let descendants = dst_known
            .then(|| self.cache.closure(&*store, Direction::Descendants, &dst_id));
        let ancestors = src_known
            .then(|| self.cache.closure(&*store, Direction::Ancestors, &src_id));

        if !src_known {
            store.insert_vertex(src_id.clone(), src)?;
        }
        if !dst_known {
            store.insert_vertex(dst_id.clone(), dst)?;
        }
        store.insert_edge(&src_id, &dst_id);

        if let Some(descendants) = descendants {
            self.cache.invalidate(Direction::Ancestors, descendants.iter());
        }
        self.cache.invalidate_one(Direction::Ancestors, &dst_id);
        if let Some(ancestors) = ancestors {
            self.cache.invalidate(Direction::Descendants, ancestors.iter());
        }
        self.cache.invalidate_one(Direction::Descendants, &src_id);

        debug!(src = %src_id, dst = %dst_id, "connected vertices");
        Ok((src_id, dst_id))
    }

    /// Delete the edge from `src` to `dst`.
    ///
    /// # Errors
    /// `IdEmpty`/`IdUnknown` for bad ids and `EdgeUnknown` if there is no
    /// such edge.
    pub fn delete_edge(&self, src: &str, dst: &str) -> Result<()> {
        let mut store = self.store.write();
        store.check_id(src)?;
        store.check_id(dst)?;
        if !store.is_edge(src, dst) {
            return Err(DagError::edge_unknown(src, dst));
        }

        let descendants = self.cache.closure(&*store, Direction::Descendants, dst);
        let ancestors = self.cache.closure(&*store, Direction::Ancestors, src);

        store.remove_edge(src, dst);

        self.cache.invalidate(Direction::Ancestors, descendants.iter());
        self.cache.invalidate_one(Direction::Ancestors, dst);
        self.cache.invalidate(Direction::Descendants, ancestors.iter());
        self.cache.invalidate_one(Direction::Descendants, src);

        debug!(src, dst, "deleted edge");
        Ok(())
    }

    /// Whether an edge from `src` to `dst` exists.
    pub fn is_edge(&self, src: &str, dst: &str) -> Result<bool> {
        let store = self.store.read();
        store.check_id(src)?;
        store.check_id(dst)?;
        Ok(store.is_edge(src, dst))
    }

    // ------------------------------------------------------------------
    // Structure queries
    // ------------------------------------------------------------------

    /// Number of vertices.
    pub fn get_order(&self) -> usize {
        self.store.read().order()
    }

    /// Number of edges.
    pub fn get_size(&self) -> usize {
        self.store.read().size()
    }

    /// Vertices without parents.
    pub fn get_roots(&self) -> HashMap<String, Arc<V>> {
        let store = self.store.read();
        collect_where(&*store, |id| store.is_root(id))
    }

    /// Vertices without children.
    pub fn get_leaves(&self) -> HashMap<String, Arc<V>> {
        let store = self.store.read();
        collect_where(&*store, |id| store.is_leaf(id))
    }

    /// Whether `id` has no parents.
    pub fn is_root(&self, id: &str) -> Result<bool> {
        let store = self.store.read();
        store.check_id(id)?;
        Ok(store.is_root(id))
    }

    /// Whether `id` has no children.
    pub fn is_leaf(&self, id: &str) -> Result<bool> {
        let store = self.store.read();
        store.check_id(id)?;
        Ok(store.is_leaf(id))
    }

    /// Direct children of `id`.
    pub fn get_children(&self, id: &str) -> Result<HashMap<String, Arc<V>>> {
        let store = self.store.read();
        store.check_id(id)?;
        Ok(with_values(&*store, store.children(id)))
    }

    /// Direct parents of `id`.
    pub fn get_parents(&self, id: &str) -> Result<HashMap<String, Arc<V>>> {
        let store = self.store.read();
        store.check_id(id)?;
        Ok(with_values(&*store, store.parents(id)))
    }

    // ------------------------------------------------------------------
    // Closures
    // ------------------------------------------------------------------

    /// Ids of every vertex reachable from `id`.
    pub fn get_descendants(&self, id: &str) -> Result<Arc<IdSet>> {
        let store = self.store.read();
        store.check_id(id)?;
        Ok(self.cache.closure(&*store, Direction::Descendants, id))
    }

    /// Ids of every vertex `id` is reachable from.
    pub fn get_ancestors(&self, id: &str) -> Result<Arc<IdSet>> {
        let store = self.store.read();
        store.check_id(id)?;
        Ok(self.cache.closure(&*store, Direction::Ancestors, id))
    }

    /// Drop all cached closures. They are recomputed on demand.
    pub fn flush_caches(&self) {
        let _store = self.store.write();
        self.cache.flush();
    }

    // ------------------------------------------------------------------
    // Derived graphs
    // ------------------------------------------------------------------

    fn empty_like(&self, hasher: H) -> Result<Self> {
        Self::with_options(Options {
            vertex_hasher: hasher,
            flow_threads: self.flow_threads,
        })
    }

    /// A new DAG holding `id`, its descendants and the edges among them.
    /// Values are shared with this DAG. Returns the graph and the id of the
    /// copied vertex.
    pub fn get_descendants_graph(&self, id: &str) -> Result<(Self, String)>
    where
        H: Clone,
    {
        self.relatives_graph(id, Direction::Descendants)
    }

    /// A new DAG holding `id`, its ancestors and the edges among them.
    pub fn get_ancestors_graph(&self, id: &str) -> Result<(Self, String)>
    where
        H: Clone,
    {
        self.relatives_graph(id, Direction::Ancestors)
    }

    fn relatives_graph(&self, id: &str, direction: Direction) -> Result<(Self, String)>
    where
        H: Clone,
    {
        let store = self.store.read();
        store.check_id(id)?;
        let graph = self.empty_like(store.hasher.clone())?;

        {
            let mut target = graph.store.write();
            let value = store
                .value(id)
                .ok_or_else(|| DagError::IdUnknown(id.to_owned()))?;
            target.insert_vertex(id.to_owned(), Arc::clone(value))?;

            let mut queue = VecDeque::from([id.to_owned()]);
            while let Some(current) = queue.pop_front() {
                for neighbour in store.neighbours(direction, &current) {
                    if !target.contains(neighbour) {
                        let value = store
                            .value(neighbour)
                            .ok_or_else(|| DagError::IdUnknown(neighbour.clone()))?;
                        target.insert_vertex(neighbour.clone(), Arc::clone(value))?;
                        queue.push_back(neighbour.clone());
                    }
                    match direction {
                        Direction::Descendants => target.insert_edge(&current, neighbour),
                        Direction::Ancestors => target.insert_edge(neighbour, &current),
                    }
                }
            }
        }

        Ok((graph, id.to_owned()))
    }

    /// A structural copy of this DAG. Values are shared, caches are not.
    pub fn copy(&self) -> Result<Self>
    where
        H: Clone,
    {
        let store = self.store.read();
        let graph = self.empty_like(store.hasher.clone())?;
        {
            let mut target = graph.store.write();
            for (id, value) in store.values() {
                target.insert_vertex(id.clone(), Arc::clone(value))?;
            }
            for (src, dst) in store.edges() {
                target.insert_edge(src, dst);
            }
        }
        Ok(graph)
    }
}

fn collect_where<V, H, F>(store: &Store<V, H>, keep: F) -> HashMap<String, Arc<V>>
where
    H: VertexHasher<V>,
    F: Fn(&str) -> bool,
{
    store
        .values()
        .filter(|(id, _)| keep(id))
        .map(|(id, value)| (id.clone(), Arc::clone(value)))
        .collect()
}

fn with_values<'a, V, H, I>(store: &Store<V, H>, ids: I) -> HashMap<String, Arc<V>>
where
    H: VertexHasher<V>,
    I: Iterator<Item = &'a String>,
{
    ids.filter_map(|id| store.value(id).map(|value| (id.clone(), Arc::clone(value))))
        .collect()
}

impl<V, H> fmt::Display for Dag<V, H>
where
    V: Send + Sync,
    H: VertexHasher<V>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store.read();
        writeln!(f, "DAG Vertices: {} - Edges: {}", store.order(), store.size())?;

        let mut ids: Vec<&String> = store.values().map(|(id, _)| id).collect();
        ids.sort_unstable();
        writeln!(f, "Vertices:")?;
        for id in ids {
            writeln!(f, "  {id}")?;
        }

        let mut edges: Vec<(&String, &String)> = store.edges().collect();
        edges.sort_unstable();
        writeln!(f, "Edges:")?;
        for (src, dst) in edges {
            writeln!(f, "  {src} -> {dst}")?;
        }
        Ok(())
    }
}

impl<V, H> fmt::Debug for Dag<V, H>
where
    V: Send + Sync,
    H: VertexHasher<V>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store.read();
        f.debug_struct("Dag")
            .field("order", &store.order())
            .field("size", &store.size())
            .field("cached_ancestors", &self.cache.len(Direction::Ancestors))
            .field("cached_descendants", &self.cache.len(Direction::Descendants))
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
