//! Source Error Types
//!
//! Failures of individual requests are never Rust errors: they are delivered
//! as [`Response`](cartage_resource::Response)s carrying a
//! [`ResponseError`](cartage_resource::ResponseError). The errors here cover
//! assembling the sources and talking to the offline worker.

use derive_more::{Display, Error};

/// A source error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for source operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Sources must be created from within a tokio runtime.
    #[display("no tokio runtime available")]
    Runtime,
    /// Configuration failed validation.
    #[display("invalid configuration")]
    Config,
    /// A cache could not be opened or queried.
    #[display("cache error")]
    Cache,
    /// The asset bundle could not be opened.
    #[display("asset bundle error")]
    Storage,
    /// A required collaborator was not supplied to the builder.
    #[display("missing collaborator: {_0}")]
    MissingCollaborator(#[error(not(source))] &'static str),
    /// The offline worker has stopped and no longer accepts jobs.
    #[display("offline worker stopped")]
    WorkerStopped,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cache)
    }
}
