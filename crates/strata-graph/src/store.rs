//! The storage seam between versioned entities and a graph backend.
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `GraphClient` | `neo4j` | Neo4j over Bolt |
//! | `MemoryStore` | `memory` | In-process graph for tests and tooling |
//!
//! Writes go through a [`StoreTxn`], which is all-or-nothing. Diff reads and
//! bulk deletes run in their own short transactions directly on the store.

use async_trait::async_trait;
use strata_core::{PropertyMap, PropertyValue};

use crate::client::GraphError;
use crate::query::{
    CloseChildren, CloseState, CreateNode, CreateState, DeleteBatch, DiffSideQuery,
    DiffStateQuery, FindNode, LastStateChange, LinkChildren, NodeAtTime, OpenChildren, OpenState,
    SetProperties,
};

/// One row of identity values, aligned with a diff query's selects.
pub type Row = Vec<PropertyValue>;

/// A graph backend.
#[async_trait]
pub trait GraphStore: Clone + Send + Sync + 'static {
    type Txn: StoreTxn;

    /// Begin a read-write transaction.
    async fn begin(&self) -> Result<Self::Txn, GraphError>;

    /// One page of a side query. Pages are numbered from 1.
    async fn side_rows(
        &self,
        query: &DiffSideQuery,
        page: usize,
        size: usize,
    ) -> Result<Vec<Row>, GraphError>;

    /// One page of a state-change query. Pages are numbered from 1.
    async fn state_rows(
        &self,
        query: &DiffStateQuery,
        page: usize,
        size: usize,
    ) -> Result<Vec<Row>, GraphError>;

    /// Node and state properties merged, or `None` when nothing matched.
    async fn node_at(&self, query: &NodeAtTime) -> Result<Option<PropertyMap>, GraphError>;

    /// Delete one batch and report how many nodes went.
    async fn delete_batch(&self, query: &DeleteBatch) -> Result<u64, GraphError>;
}

/// An open read-write transaction.
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait StoreTxn: Send + Sized {
    async fn find_node(&mut self, query: &FindNode) -> Result<Option<PropertyMap>, GraphError>;

    /// Create the node unless it exists, and return it as stored.
    async fn create_node(&mut self, query: &CreateNode) -> Result<PropertyMap, GraphError>;

    async fn set_properties(&mut self, query: &SetProperties) -> Result<(), GraphError>;

    async fn open_state(&mut self, query: &OpenState) -> Result<Option<PropertyMap>, GraphError>;

    async fn close_state(&mut self, query: &CloseState) -> Result<(), GraphError>;

    async fn create_state(&mut self, query: &CreateState) -> Result<(), GraphError>;

    async fn last_state_change(&mut self, query: &LastStateChange)
        -> Result<Option<i64>, GraphError>;

    async fn open_children(
        &mut self,
        query: &OpenChildren,
    ) -> Result<Vec<PropertyValue>, GraphError>;

    async fn close_children(&mut self, query: &CloseChildren) -> Result<(), GraphError>;

    /// Identities of the children that got an edge.
    async fn link_children(&mut self, query: &LinkChildren)
        -> Result<Vec<PropertyValue>, GraphError>;

    async fn commit(self) -> Result<(), GraphError>;

    async fn rollback(self) -> Result<(), GraphError>;
}

/// Commit on success, roll back on failure, and hand back the result.
pub async fn finish<Tx, T, E>(txn: Tx, result: Result<T, E>) -> Result<T, E>
where
    Tx: StoreTxn,
    E: From<GraphError> + std::fmt::Display,
{
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = txn.rollback().await {
                tracing::warn!(error = %rollback, "Rollback failed");
            }
            tracing::debug!(error = %e, "Transaction rolled back");
            Err(e)
        }
    }
}
