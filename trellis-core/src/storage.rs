//! Snapshot Adapter
//!
//! A DAG is projected into, and rebuilt from, anything implementing
//! [`Storable`]: an ordered list of `(id, value)` pairs and an ordered list of
//! `(src, dst)` pairs. [`StorableDag`] is the default representation and
//! serializes with serde as
//!
//! ```json
//! {"vs":[{"i":"1","v":..}],"es":[{"s":"1","d":"2"}]}
//! ```
//!
//! Rebuilding goes through the same checks as live mutation, so a snapshot
//! with duplicate ids, unknown endpoints or a cycle is rejected.

use std::hash::Hash;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dag::Dag;
use crate::error::Result;
use crate::options::{Identity, Options, VertexHasher};
use crate::walk::dfs_order;

/// A graph snapshot: vertices and edges in a fixed order.
pub trait Storable<V> {
    /// Vertices as `(id, value)` pairs.
    fn vertices(&self) -> Vec<(String, Arc<V>)>;
    /// Edges as `(src, dst)` pairs.
    fn edges(&self) -> Vec<(String, String)>;
}

/// One vertex of a [`StorableDag`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredVertex<V> {
    #[serde(rename = "i")]
    pub id: String,
    #[serde(rename = "v")]
    pub value: Arc<V>,
}

/// One edge of a [`StorableDag`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoredEdge {
    #[serde(rename = "s")]
    pub src: String,
    #[serde(rename = "d")]
    pub dst: String,
}

/// Serde friendly snapshot of a [`Dag`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorableDag<V> {
    #[serde(rename = "vs")]
    pub vertices: Vec<StoredVertex<V>>,
    #[serde(rename = "es")]
    pub edges: Vec<StoredEdge>,
}

impl<V> Default for StorableDag<V> {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl<V> Storable<V> for StorableDag<V> {
    fn vertices(&self) -> Vec<(String, Arc<V>)> {
        self.vertices
            .iter()
            .map(|v| (v.id.clone(), Arc::clone(&v.value)))
            .collect()
    }

    fn edges(&self) -> Vec<(String, String)> {
        self.edges
            .iter()
            .map(|e| (e.src.clone(), e.dst.clone()))
            .collect()
    }
}

impl<V> Dag<V, Identity>
where
    V: Eq + Hash + Send + Sync,
{
    /// Rebuild a DAG keyed by vertex value from a snapshot.
    pub fn from_storable(storable: &impl Storable<V>) -> Result<Self> {
        Self::from_storable_with(Options::default(), storable)
    }
}

impl<V, H> Dag<V, H>
where
    V: Send + Sync,
    H: VertexHasher<V>,
{
    /// Snapshot of this DAG. Vertices are listed depth first; each vertex is
    /// followed by its outgoing edges in ascending child id order.
    pub fn to_storable(&self) -> StorableDag<V> {
        let store = self.read();
        let mut storable = StorableDag::default();
        for (id, value) in dfs_order(&*store) {
            for child in store.sorted_children(&id) {
                storable.edges.push(StoredEdge {
                    src: id.clone(),
                    dst: child,
                });
            }
            storable.vertices.push(StoredVertex { id, value });
        }
        storable
    }

    /// Rebuild a DAG from a snapshot with explicit options.
    ///
    /// # Errors
    /// Any error the equivalent sequence of `add_vertex_by_id` and
    /// `add_edge` calls would return.
    pub fn from_storable_with(options: Options<H>, storable: &impl Storable<V>) -> Result<Self> {
        let dag = Self::with_options(options)?;
        {
            let mut store = dag.write();
            for (id, value) in storable.vertices() {
                store.insert_vertex(id, value)?;
            }
        }
        for (src, dst) in storable.edges() {
            dag.add_edge(&src, &dst)?;
        }
        debug!(
            vertices = dag.get_order(),
            edges = dag.get_size(),
            "restored dag from snapshot"
        );
        Ok(dag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DagError;
    use crate::options::HashFn;

    fn snapshot(vertices: &[&str], edges: &[(&str, &str)]) -> StorableDag<String> {
        StorableDag {
            vertices: vertices
                .iter()
                .map(|id| StoredVertex {
                    id: id.to_string(),
                    value: Arc::new(format!("v{id}")),
                })
                .collect(),
            edges: edges
                .iter()
                .map(|(s, d)| StoredEdge {
                    src: s.to_string(),
                    dst: d.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn snapshot_is_depth_first() {
        let dag = Dag::new();
        for id in ["1", "2", "3", "4", "5"] {
            dag.add_vertex_by_id(id, format!("v{id}")).unwrap();
        }
        for (src, dst) in [("1", "2"), ("2", "3"), ("2", "4"), ("4", "5")] {
            dag.add_edge(src, dst).unwrap();
        }

        let storable = dag.to_storable();
        let ids: Vec<&str> = storable.vertices.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
        let expected = snapshot(&[], &[("1", "2"), ("2", "3"), ("2", "4"), ("4", "5")]);
        assert_eq!(storable.edges, expected.edges);
        assert!(Arc::ptr_eq(
            &storable.vertices[0].value,
            &dag.get_vertex("1").unwrap()
        ));
    }

    #[test]
    fn rebuild_shares_values() {
        let storable = snapshot(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let dag = Dag::from_storable(&storable).unwrap();
        assert_eq!(dag.get_order(), 3);
        assert_eq!(dag.get_size(), 2);
        assert_eq!(dag.get_descendants("a").unwrap().len(), 2);
        assert!(Arc::ptr_eq(
            &dag.get_vertex("a").unwrap(),
            &storable.vertices[0].value
        ));
        assert_eq!(dag.to_storable(), storable);
    }

    #[test]
    fn rebuild_revalidates() {
        let cycle = snapshot(&["a", "b"], &[("a", "b"), ("b", "a")]);
        assert_eq!(
            Dag::from_storable(&cycle).unwrap_err(),
            DagError::edge_loop("b", "a")
        );

        let unknown = snapshot(&["a"], &[("a", "z")]);
        assert_eq!(
            Dag::from_storable(&unknown).unwrap_err(),
            DagError::IdUnknown("z".into())
        );

        let duplicate = snapshot(&["a", "a"], &[]);
        assert_eq!(
            Dag::from_storable(&duplicate).unwrap_err(),
            DagError::VertexDuplicate("a".into())
        );
    }

    #[test]
    fn rebuild_with_custom_hasher() {
        let storable = snapshot(&["a", "b"], &[("a", "b")]);
        let options = Options::with_hasher(HashFn(|v: &String| v.len()));
        // both values have the same length and collapse into one key
        assert_eq!(
            Dag::from_storable_with(options, &storable).unwrap_err(),
            DagError::VertexDuplicate("a".into())
        );
    }
}
