//! Error types for the strata-diff crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiffError {
    #[error("Graph error: {0}")]
    Graph(#[from] strata_graph::GraphError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] strata_core::LookupError),

    #[error("Invalid identity: {0}")]
    Identity(#[from] strata_core::ConversionError),
}

pub type Result<T> = std::result::Result<T, DiffError>;
