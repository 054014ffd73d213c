//! Errors are split by who must react to them: a bad cache root is a
//! configuration mistake, an inconsistent tree is on-disk corruption
//! that must abort the operation rather than guess at a node, and a
//! task failure carries the submission index so batch callers can
//! report which unit of work went wrong.
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The configured cache root exists but is not a directory, or
    /// could not be created.  The I/O error behind a failed creation
    /// is attached as the source.
    #[error("cache root {path:?} is not a usable directory")]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// `locate` found a split node none of whose children covers the
    /// digest.  This only happens when the on-disk tree is corrupt
    /// (e.g., after an interrupted rebalance); the operation must be
    /// aborted, not retried.
    #[error("inconsistent cache tree: no child of {node:?} covers digest {digest}")]
    InconsistentTree { digest: String, node: PathBuf },

    /// A split node carries a directory name that does not parse as
    /// a range bound, or its range cannot be subdivided further.
    /// Like an inconsistent tree, this signals corruption and aborts
    /// the operation.
    #[error("node {node:?} has an invalid range name")]
    InvalidNodeName { node: PathBuf },

    /// A submitted task returned an error.  The whole batch fails.
    #[error("task {index} failed")]
    TaskFailed {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    /// A submitted task panicked.  Treated like any other task
    /// failure, with no result to salvage.
    #[error("task {index} panicked")]
    TaskPanicked { index: usize },

    /// A caller-supplied fetch function failed.  The cache does not
    /// special-case transient network errors; retry policy belongs to
    /// the fetch function itself.
    #[error("fetch failed: {0}")]
    Fetch(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps an arbitrary fetch-side error.
    pub fn fetch(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Error {
        Error::Fetch(err.into())
    }
}
