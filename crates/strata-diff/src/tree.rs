//! The diff result: a rooted tree keyed by node identity.

use std::collections::{BTreeMap, BTreeSet};

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use strata_core::PropertyValue;

/// Identity of one node in the tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey {
    pub label: String,
    pub property: String,
    pub value: PropertyValue,
}

impl NodeKey {
    pub fn new(label: impl Into<String>, property: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            label: label.into(),
            property: property.into(),
            value,
        }
    }
}

/// Which side of the comparison a node shows up on.
///
/// `T1` alone: present only at t1. `T2` alone: present only at t2. Both:
/// state changed between the two. Neither: an unchanged ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    T1,
    T2,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffNode {
    pub flags: BTreeSet<Flag>,
    pub children: BTreeMap<NodeKey, DiffNode>,
}

impl DiffNode {
    pub fn child(&self, key: &NodeKey) -> Option<&DiffNode> {
        self.children.get(key)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffTree {
    roots: BTreeMap<NodeKey, DiffNode>,
}

impl DiffTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Add one result row, ordered root to leaf.
    ///
    /// Every prefix gets a node if it has none yet. Flags only go on the
    /// last node of the row.
    pub fn feed(&mut self, row: Vec<NodeKey>, flags: &[Flag]) {
        let mut level = &mut self.roots;
        let mut keys = row.into_iter().peekable();
        while let Some(key) = keys.next() {
            let node = level.entry(key).or_default();
            if keys.peek().is_none() {
                node.flags.extend(flags.iter().copied());
            }
            level = &mut node.children;
        }
    }

    /// The root node. A subtree diff has at most one.
    pub fn root(&self) -> Option<(&NodeKey, &DiffNode)> {
        self.roots.iter().next()
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

struct NodeView<'a>(&'a NodeKey, &'a DiffNode);

impl Serialize for NodeView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let NodeView(key, node) = self;
        let children: Vec<NodeView<'_>> = node
            .children
            .iter()
            .map(|(k, n)| NodeView(k, n))
            .collect();
        let mut s = serializer.serialize_struct("DiffNode", 4)?;
        s.serialize_field("model", &key.label)?;
        s.serialize_field("id", &key.value)?;
        s.serialize_field("flags", &node.flags)?;
        s.serialize_field("children", &children)?;
        s.end()
    }
}

impl Serialize for DiffTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.root() {
            Some((key, node)) => NodeView(key, node).serialize(serializer),
            None => serializer.serialize_map(Some(0))?.end(),
        }
    }
}
