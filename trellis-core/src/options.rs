//! DAG Options
//!
//! Configuration is supplied once, when the [`Dag`](crate::Dag) is built.
//!
//! # Vertex keys
//!
//! Besides its id, every vertex has a *key* derived from its value. Two
//! vertices with equal keys are considered the same vertex, which is how
//! adding one value twice is detected. By default the value itself is the
//! key ([`Identity`]); values that are not comparable (or that should be
//! compared by a single field) get a [`HashFn`] instead.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Derives the deduplication key of a vertex value.
pub trait VertexHasher<V>: Send + Sync {
    type Key: Eq + Hash + Send + Sync;

    fn key(&self, value: &Arc<V>) -> Self::Key;
}

/// Keys a vertex by its value. The key shares the stored `Arc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<V> VertexHasher<V> for Identity
where
    V: Eq + Hash + Send + Sync,
{
    type Key = Arc<V>;

    fn key(&self, value: &Arc<V>) -> Arc<V> {
        Arc::clone(value)
    }
}

/// Keys a vertex by the result of a caller supplied function.
///
/// ```rust,ignore
/// let options = Options::with_hasher(HashFn(|doc: &Document| doc.name.clone()));
/// ```
#[derive(Clone)]
pub struct HashFn<F>(pub F);

impl<V, K, F> VertexHasher<V> for HashFn<F>
where
    F: Fn(&V) -> K + Send + Sync,
    K: Eq + Hash + Send + Sync,
{
    type Key = K;

    fn key(&self, value: &Arc<V>) -> K {
        (self.0)(value.as_ref())
    }
}

/// Values that carry their own vertex id.
pub trait Keyed {
    fn id(&self) -> String;
}

/// Options for a [`Dag`](crate::Dag).
#[derive(Debug, Clone)]
pub struct Options<H = Identity> {
    /// Key derivation used to detect duplicate vertex values.
    pub vertex_hasher: H,

    /// Number of threads of a dedicated pool for flow execution.
    /// `None` runs flows on the global rayon pool.
    pub flow_threads: Option<NonZeroUsize>,
}

impl Default for Options<Identity> {
    fn default() -> Self {
        Self {
            vertex_hasher: Identity,
            flow_threads: None,
        }
    }
}

impl<H> Options<H> {
    /// Options that key vertices with `vertex_hasher`.
    pub fn with_hasher(vertex_hasher: H) -> Self {
        Self {
            vertex_hasher,
            flow_threads: None,
        }
    }

    /// Run flows on a dedicated pool of `threads` workers.
    pub fn flow_threads(mut self, threads: NonZeroUsize) -> Self {
        self.flow_threads = Some(threads);
        self
    }
}
