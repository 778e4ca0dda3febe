//! Per-operation query builders.
//!
//! Each builder carries everything a store needs to execute one operation.
//! [`Cypher`] renders the parameterized query text for Neo4j; the
//! in-memory store reads the same fields directly. Labels, relationship
//! types, and property names come from the schema registry and are
//! interpolated; every observed value travels as a parameter.

pub mod diff;
pub mod entity;
pub mod remove;

use std::collections::BTreeMap;
use std::fmt;

use strata_core::{PropertyKind, PropertyValue};

pub use diff::{DiffSideQuery, DiffStateQuery, NodeAtTime, Select};
pub use entity::{
    CloseChildren, CloseState, CreateNode, CreateState, FindNode, LastStateChange, LinkChildren,
    OpenChildren, OpenState, SetProperties,
};
pub use remove::{DeleteBatch, DeleteTarget};

/// A query parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Value(PropertyValue),
    List(Vec<PropertyValue>),
}

impl From<PropertyValue> for Param {
    fn from(v: PropertyValue) -> Self {
        Param::Value(v)
    }
}

/// Named query parameters.
pub type Params = BTreeMap<String, Param>;

/// Renders one operation as Cypher.
pub trait Cypher {
    fn cypher(&self) -> String;
    fn params(&self) -> Params;
}

/// Points at one node by its identity property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub label: String,
    pub property: String,
    pub value: PropertyValue,
}

impl NodeRef {
    pub fn new(label: impl Into<String>, property: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            label: label.into(),
            property: property.into(),
            value,
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}={})", self.label, self.property, self.value)
    }
}

/// Property names with the type to decode them as.
pub type Columns = Vec<(String, PropertyKind)>;

/// Query variable for a label.
pub fn var(label: &str) -> String {
    label.to_lowercase()
}

/// `SET v.a = $p_a, v.b = $p_b` for the non-null entries of `props`.
pub(crate) fn set_clause<'a>(
    variable: &str,
    props: impl IntoIterator<Item = (&'a String, &'a PropertyValue)>,
) -> Option<String> {
    let assignments: Vec<String> = props
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, _)| format!("{variable}.{k} = $p_{k}"))
        .collect();
    if assignments.is_empty() {
        None
    } else {
        Some(format!("SET {}", assignments.join(", ")))
    }
}

pub(crate) fn set_params<'a>(
    params: &mut Params,
    props: impl IntoIterator<Item = (&'a String, &'a PropertyValue)>,
) {
    for (k, v) in props {
        if !v.is_null() {
            params.insert(format!("p_{k}"), Param::Value(v.clone()));
        }
    }
}
