//! Vertex Store and Adjacency Index
//!
//! Plain data: the id/value registry and both edge directions. Locking is the
//! job of the owning [`Dag`](crate::Dag), which keeps the store behind a
//! single read/write lock so a vertex and its edges always change together.
//!
//! Invariants maintained here:
//!
//! - every id in `outbound`/`inbound` is present in `values`
//! - an edge `src -> dst` is recorded in `outbound[src]` and `inbound[dst]`
//! - `keys` maps exactly one key to every stored id

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexSet;

use crate::closure::Direction;
use crate::error::{DagError, Result};
use crate::options::VertexHasher;

/// Set of vertex ids in insertion order.
pub type IdSet = IndexSet<String>;

pub(crate) struct Store<V, H: VertexHasher<V>> {
    pub(crate) hasher: H,
    /// id -> value
    values: HashMap<String, Arc<V>>,
    /// key(value) -> id
    keys: HashMap<H::Key, String>,
    outbound: HashMap<String, IdSet>,
    inbound: HashMap<String, IdSet>,
}

impl<V, H: VertexHasher<V>> Store<V, H> {
    pub(crate) fn new(hasher: H) -> Self {
        Self {
            hasher,
            values: HashMap::new(),
            keys: HashMap::new(),
            outbound: HashMap::new(),
            inbound: HashMap::new(),
        }
    }

    /// Fail with `IdEmpty` / `IdUnknown` unless `id` names a stored vertex.
    pub(crate) fn check_id(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(DagError::IdEmpty);
        }
        if !self.values.contains_key(id) {
            return Err(DagError::IdUnknown(id.to_owned()));
        }
        Ok(())
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    pub(crate) fn insert_vertex(&mut self, id: String, value: Arc<V>) -> Result<()> {
        if id.is_empty() {
            return Err(DagError::IdEmpty);
        }
        let key = self.hasher.key(&value);
        if let Some(existing) = self.keys.get(&key) {
            return Err(DagError::VertexDuplicate(existing.clone()));
        }
        if self.values.contains_key(&id) {
            return Err(DagError::IdDuplicate(id));
        }
        self.keys.insert(key, id.clone());
        self.values.insert(id, value);
        Ok(())
    }

    /// Remove a vertex and every edge touching it.
    pub(crate) fn remove_vertex(&mut self, id: &str) -> Option<Arc<V>> {
        let value = self.values.remove(id)?;
        self.keys.remove(&self.hasher.key(&value));

        if let Some(parents) = self.inbound.remove(id) {
            for parent in &parents {
                if let Some(children) = self.outbound.get_mut(parent) {
                    children.shift_remove(id);
                }
            }
        }
        if let Some(children) = self.outbound.remove(id) {
            for child in &children {
                if let Some(parents) = self.inbound.get_mut(child) {
                    parents.shift_remove(id);
                }
            }
        }
        Some(value)
    }

    /// Id of the stored vertex whose key equals the key of `value`.
    pub(crate) fn id_of(&self, value: &Arc<V>) -> Option<&String> {
        self.keys.get(&self.hasher.key(value))
    }

    pub(crate) fn value(&self, id: &str) -> Option<&Arc<V>> {
        self.values.get(id)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = (&String, &Arc<V>)> {
        self.values.iter()
    }

    pub(crate) fn insert_edge(&mut self, src: &str, dst: &str) {
        self.outbound
            .entry(src.to_owned())
            .or_default()
            .insert(dst.to_owned());
        self.inbound
            .entry(dst.to_owned())
            .or_default()
            .insert(src.to_owned());
    }

    pub(crate) fn remove_edge(&mut self, src: &str, dst: &str) {
        if let Some(children) = self.outbound.get_mut(src) {
            children.shift_remove(dst);
        }
        if let Some(parents) = self.inbound.get_mut(dst) {
            parents.shift_remove(src);
        }
    }

    pub(crate) fn is_edge(&self, src: &str, dst: &str) -> bool {
        self.outbound
            .get(src)
            .is_some_and(|children| children.contains(dst))
    }

    pub(crate) fn children(&self, id: &str) -> impl Iterator<Item = &String> {
        self.outbound.get(id).into_iter().flatten()
    }

    pub(crate) fn parents(&self, id: &str) -> impl Iterator<Item = &String> {
        self.inbound.get(id).into_iter().flatten()
    }

    /// Parents or children of `id`, depending on `direction`.
    pub(crate) fn neighbours(
        &self,
        direction: Direction,
        id: &str,
    ) -> impl Iterator<Item = &String> {
        let edges = match direction {
            Direction::Ancestors => &self.inbound,
            Direction::Descendants => &self.outbound,
        };
        edges.get(id).into_iter().flatten()
    }

    pub(crate) fn child_count(&self, id: &str) -> usize {
        self.outbound.get(id).map_or(0, IdSet::len)
    }

    pub(crate) fn parent_count(&self, id: &str) -> usize {
        self.inbound.get(id).map_or(0, IdSet::len)
    }

    pub(crate) fn order(&self) -> usize {
        self.values.len()
    }

    pub(crate) fn size(&self) -> usize {
        self.outbound.values().map(IdSet::len).sum()
    }

    pub(crate) fn is_root(&self, id: &str) -> bool {
        self.parent_count(id) == 0
    }

    pub(crate) fn is_leaf(&self, id: &str) -> bool {
        self.child_count(id) == 0
    }

    /// Root ids in ascending order.
    pub(crate) fn sorted_roots(&self) -> Vec<String> {
        let mut roots: Vec<String> = self
            .values
            .keys()
            .filter(|id| self.is_root(id))
            .cloned()
            .collect();
        roots.sort_unstable();
        roots
    }

    /// Child ids of `id` in ascending order.
    pub(crate) fn sorted_children(&self, id: &str) -> Vec<String> {
        let mut children: Vec<String> = self.children(id).cloned().collect();
        children.sort_unstable();
        children
    }

    /// Every edge as `(src, dst)`.
    pub(crate) fn edges(&self) -> impl Iterator<Item = (&String, &String)> {
        self.outbound
            .iter()
            .flat_map(|(src, children)| children.iter().map(move |dst| (src, dst)))
    }
}
