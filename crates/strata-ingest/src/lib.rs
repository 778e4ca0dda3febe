//! strata-ingest: Apply collection runs to the Strata graph.
//!
//! A run is a gzip tarball of JSON documents, optionally encrypted, with a
//! `run_data.json` manifest naming the environment. [`SyncPipeline`] checks
//! the run is finished, unsynced and newer than the graph, then runs every
//! [`Snitcher`] in order under the environment lock, all stamped with the
//! run's completion time.

pub mod archive;
pub mod error;
pub mod pipeline;
pub mod run;
pub mod snitchers;

pub use archive::{ArchiveWriter, RunArchive};
pub use error::{ArchiveError, IngestError};
pub use pipeline::{SyncPipeline, SyncReport};
pub use run::{Run, SyncContext};
pub use snitchers::Snitcher;
