//! Trellis Core
//!
//! A concurrency-safe, mutable directed acyclic graph of opaque values.
//! It provides:
//!
//! - Cycle-free mutation: an edge that would close a loop is rejected
//! - Cached ancestor and descendant closures that stay correct under
//!   concurrent mutation
//! - Visitor walks and cancellable lazy walkers
//! - Transitive reduction
//! - A parallel dataflow executor ("descendants flow") over the sub-graph
//!   below a vertex
//!
//! # Architecture
//!
//! - `store`: id/value registry and both edge directions (plain data)
//! - `closure`: memoized closures, computed under per-vertex locks from
//!   `mutex_pool`
//! - `dag`: the shared [`Dag`] handle guarding the store with one
//!   read/write lock
//! - `walk`, `reduce`, `flow`: traversal, reduction and execution on top of
//!   the handle
//! - `storage`: snapshots for persistence layers owned by the caller
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::Dag;
//!
//! let dag = Dag::new();
//! for i in 0..5 {
//!     dag.add_vertex_by_id(i.to_string(), i)?;
//! }
//! dag.add_edge("0", "1")?;
//! dag.add_edge("0", "3")?;
//! dag.add_edge("1", "2")?;
//! dag.add_edge("2", "4")?;
//! dag.add_edge("3", "4")?;
//!
//! assert_eq!(dag.get_descendants("0")?.len(), 4);
//! assert!(dag.add_edge("4", "0").is_err());
//!
//! // own value plus the results of all parents
//! let results = dag.descendants_flow("0", None, |dag, id, parents| {
//!     let own = *dag.get_vertex(id)?;
//!     Ok::<_, trellis_core::DagError>(own + parents.iter().map(|p| *p.result).sum::<i32>())
//! })?;
//! assert_eq!(results["4"], 10);
//! ```

mod closure;
pub mod dag;
pub mod error;
pub mod flow;
pub mod mutex_pool;
pub mod options;
pub mod reduce;
pub mod storage;
mod store;
pub mod walk;

pub use dag::Dag;
pub use error::{DagError, ErrorKind, FlowError, Result};
pub use flow::ParentResult;
pub use mutex_pool::{KeyGuard, MutexPool};
pub use options::{HashFn, Identity, Keyed, Options, VertexHasher};
pub use storage::{Storable, StorableDag, StoredEdge, StoredVertex};
pub use store::IdSet;
pub use walk::{Visitor, WalkSignal, Walker};
