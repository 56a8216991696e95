//! Error Types
//!
//! Every fallible DAG operation returns a [`DagError`]. Errors are raised
//! synchronously by the offending call and are never retried internally:
//! a rejected edge or a duplicate id is a decision the caller has to make.
//!
//! The flow executor has its own error type, [`FlowError`], because it is
//! generic over the callback's error and carries the partial results that
//! were computed before the failure.

use std::collections::HashMap;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DagError>;

/// Coarse classification of a [`DagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The argument itself is malformed (e.g. an empty id).
    Validation,
    /// A referenced vertex or edge does not exist.
    NotFound,
    /// The operation clashes with existing state (duplicates, self-loops).
    Conflict,
    /// The operation would break acyclicity.
    InvariantViolation,
}

/// Errors returned by [`Dag`](crate::Dag) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DagError {
    #[error("don't know what to do with \"\"")]
    IdEmpty,

    /// A vertex whose hasher key is already present was added again.
    #[error("'{0}' is already known")]
    VertexDuplicate(String),

    #[error("the id '{0}' is already known")]
    IdDuplicate(String),

    #[error("'{0}' is unknown")]
    IdUnknown(String),

    #[error("edge between '{src}' and '{dst}' is already known")]
    EdgeDuplicate { src: String, dst: String },

    #[error("edge between '{src}' and '{dst}' is unknown")]
    EdgeUnknown { src: String, dst: String },

    #[error("edge between '{src}' and '{dst}' would create a loop")]
    EdgeLoop { src: String, dst: String },

    #[error("src ('{src}') and dst ('{dst}') equal")]
    SrcDstEqual { src: String, dst: String },

    /// The dedicated flow thread pool could not be built.
    #[error("failed to build flow thread pool: {0}")]
    ThreadPool(String),
}

impl DagError {
    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DagError::IdEmpty | DagError::ThreadPool(_) => ErrorKind::Validation,
            DagError::IdUnknown(_) | DagError::EdgeUnknown { .. } => ErrorKind::NotFound,
            DagError::VertexDuplicate(_)
            | DagError::IdDuplicate(_)
            | DagError::EdgeDuplicate { .. }
            | DagError::SrcDstEqual { .. } => ErrorKind::Conflict,
            DagError::EdgeLoop { .. } => ErrorKind::InvariantViolation,
        }
    }

    pub(crate) fn edge_duplicate(src: &str, dst: &str) -> Self {
        DagError::EdgeDuplicate {
            src: src.to_owned(),
            dst: dst.to_owned(),
        }
    }

    pub(crate) fn edge_unknown(src: &str, dst: &str) -> Self {
        DagError::EdgeUnknown {
            src: src.to_owned(),
            dst: dst.to_owned(),
        }
    }

    pub(crate) fn edge_loop(src: &str, dst: &str) -> Self {
        DagError::EdgeLoop {
            src: src.to_owned(),
            dst: dst.to_owned(),
        }
    }

    pub(crate) fn src_dst_equal(src: &str, dst: &str) -> Self {
        DagError::SrcDstEqual {
            src: src.to_owned(),
            dst: dst.to_owned(),
        }
    }
}

/// Failure of [`Dag::descendants_flow`](crate::Dag::descendants_flow).
#[derive(Debug, Error)]
pub enum FlowError<R, E> {
    /// The flow could not start (empty or unknown root id).
    #[error(transparent)]
    Dag(#[from] DagError),

    /// A callback returned an error. Vertices that completed before the
    /// failure are kept in `partial`.
    #[error("flow callback for '{id}' failed: {error}")]
    Callback {
        id: String,
        error: E,
        partial: HashMap<String, R>,
    },
}

impl<R, E> FlowError<R, E> {
    /// Results of the vertices that completed before the flow was aborted.
    pub fn partial_results(&self) -> Option<&HashMap<String, R>> {
        match self {
            FlowError::Dag(_) => None,
            FlowError::Callback { partial, .. } => Some(partial),
        }
    }
}
