//! strata-diff: What changed in an environment between two instants.
//!
//! Subtree diffs walk every schema path below a root entity and report
//! nodes that appeared, disappeared, or changed state. Node diffs compare
//! the properties of one entity side by side.

pub mod engine;
pub mod error;
pub mod tree;

pub use engine::{DiffEngine, PropertyDiff, DEFAULT_PAGE_SIZE};
pub use error::DiffError;
pub use tree::{DiffNode, DiffTree, Flag, NodeKey};
