//! Error types for the strata-ingest crate.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reading a run archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Invalid archive key: expected base64 encoded 256 bit AES key")]
    InvalidKey,

    #[error("Archive member not found: {0}")]
    MissingMember(String),

    #[error("Unable to decode archive object: {0}")]
    Object(String),

    #[error("{} is not a valid run", .0.display())]
    InvalidRun(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Run at {} is in {status} status", path.display())]
    InvalidStatus { path: PathBuf, status: String },

    #[error("Run at {} is already synced", .0.display())]
    AlreadySynced(PathBuf),

    #[error("Run at {} has no valid completion time", .0.display())]
    MissingCompletion(PathBuf),

    #[error("Run completed at {completed} is not newer than the last update at {last_update}")]
    StaleRun { completed: i64, last_update: i64 },

    #[error("Lock error: {0}")]
    Lock(#[from] strata_graph::LockError),

    #[error("Graph error: {0}")]
    Graph(#[from] strata_graph::GraphError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] strata_core::LookupError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
