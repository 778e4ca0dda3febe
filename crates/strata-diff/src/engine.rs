//! Temporal diffs over the versioned graph.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use strata_core::convert::convert;
use strata_core::{PropertyMap, PropertyValue, Registry};
use strata_graph::query::{DiffSideQuery, DiffStateQuery, NodeAtTime, Select};
use strata_graph::{GraphStore, Row};

use crate::error::Result;
use crate::tree::{DiffTree, Flag, NodeKey};

/// Rows fetched per query page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 5000;

/// One property of a node compared across two times. Absent on a side
/// means null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDiff {
    pub name: String,
    pub t1: PropertyValue,
    pub t2: PropertyValue,
}

/// Computes subtree and node diffs between two instants.
pub struct DiffEngine<S> {
    store: S,
    registry: Arc<Registry>,
    page_size: usize,
}

impl<S: GraphStore> DiffEngine<S> {
    pub fn new(store: S, registry: Arc<Registry>) -> Self {
        Self {
            store,
            registry,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the number of rows fetched per page.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    fn identity(&self, model: &str, identity: PropertyValue) -> Result<PropertyValue> {
        let model = self.registry.model(model)?;
        let kind = model
            .property(model.identity_property())
            .map(|p| p.kind)
            .unwrap_or_default();
        Ok(convert(&identity, kind)?)
    }

    /// Diff the subtree rooted at `model` `identity` between `t1` and `t2`.
    ///
    /// Every path below the root is queried three ways: reachable at t1
    /// only, reachable at t2 only, and reachable at both with a different
    /// state node at each. An unchanged subtree yields an empty tree.
    pub async fn subtree(
        &self,
        model: &str,
        identity: impl Into<PropertyValue>,
        t1: i64,
        t2: i64,
    ) -> Result<DiffTree> {
        let identity = self.identity(model, identity.into())?;
        let mut tree = DiffTree::new();

        for path in self.registry.paths_from(model) {
            let Some(end) = path.last() else { continue };

            let only_t1 = DiffSideQuery::new(&self.registry, &path, identity.clone(), (t1, t2))?;
            let rows = self.side_rows(&only_t1).await?;
            feed(&mut tree, rows, only_t1.selects(), &[Flag::T1]);

            let only_t2 = DiffSideQuery::new(&self.registry, &path, identity.clone(), (t2, t1))?;
            let rows = self.side_rows(&only_t2).await?;
            feed(&mut tree, rows, only_t2.selects(), &[Flag::T2]);

            if self.registry.model(end)?.has_state() {
                let changed = DiffStateQuery::new(&self.registry, &path, identity.clone(), (t1, t2))?;
                let rows = self.state_rows(&changed).await?;
                feed(&mut tree, rows, changed.selects(), &[Flag::T1, Flag::T2]);
            }
        }

        tracing::debug!(%model, %identity, t1, t2, empty = tree.is_empty(), "Computed subtree diff");
        Ok(tree)
    }

    /// Compare every property of one node at `t1` and `t2`.
    pub async fn node(
        &self,
        model: &str,
        identity: impl Into<PropertyValue>,
        t1: i64,
        t2: i64,
    ) -> Result<Vec<PropertyDiff>> {
        let identity = self.identity(model, identity.into())?;
        let at_t1 = self.node_at(model, &identity, t1).await?;
        let at_t2 = self.node_at(model, &identity, t2).await?;

        let names: BTreeSet<&String> = at_t1.keys().chain(at_t2.keys()).collect();
        Ok(names
            .into_iter()
            .map(|name| PropertyDiff {
                name: name.clone(),
                t1: at_t1.get(name).cloned().unwrap_or_default(),
                t2: at_t2.get(name).cloned().unwrap_or_default(),
            })
            .collect())
    }

    async fn node_at(&self, model: &str, identity: &PropertyValue, t: i64) -> Result<PropertyMap> {
        let query = NodeAtTime::new(&self.registry, model, identity.clone(), t)?;
        Ok(self.store.node_at(&query).await?.unwrap_or_default())
    }

    async fn side_rows(&self, query: &DiffSideQuery) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        for page in 1.. {
            let batch = self.store.side_rows(query, page, self.page_size).await?;
            if batch.is_empty() {
                break;
            }
            rows.extend(batch);
        }
        Ok(rows)
    }

    async fn state_rows(&self, query: &DiffStateQuery) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        for page in 1.. {
            let batch = self.store.state_rows(query, page, self.page_size).await?;
            if batch.is_empty() {
                break;
            }
            rows.extend(batch);
        }
        Ok(rows)
    }
}

fn feed(tree: &mut DiffTree, rows: Vec<Row>, selects: &[Select], flags: &[Flag]) {
    for row in rows {
        let keys = selects
            .iter()
            .zip(row)
            .map(|(s, value)| NodeKey::new(&s.label, &s.property, value))
            .collect();
        tree.feed(keys, flags);
    }
}
