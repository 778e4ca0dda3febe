//! Strata Graph: bitemporal storage for infrastructure facts.
//!
//! Every write goes through a [`GraphStore`] transaction so that a versioned
//! entity update, a child reconciliation, or a lock transition is applied
//! whole or not at all. Neo4j is the production store; [`MemoryStore`]
//! implements the same query semantics in process.

pub mod client;
pub mod entity;
pub mod lock;
pub mod memory;
pub mod neo4j;
pub mod query;
pub mod remove;
pub mod store;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use entity::{ChildChanges, Entity, EntityBuilder, StoredEntity, UpdateOutcome, VersionedGraph};
pub use lock::{with_lock, EnvironmentLock, EnvironmentRef, LockError};
pub use memory::{MemoryGraph, MemoryStore};
pub use query::NodeRef;
pub use remove::{remove_environment, RemovalStats};
pub use store::{GraphStore, Row, StoreTxn};
