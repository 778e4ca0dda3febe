//! In-memory graph store.
//!
//! Holds a labelled property graph in ordered maps behind one async mutex.
//! A transaction owns the mutex until it finishes and works on a staged
//! copy, so commits are atomic and a dropped transaction leaves no trace.
//!
//! Query semantics follow the Cypher each builder renders, including
//! duplicate rows and `ORDER BY` on the selected identities.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use strata_core::{valid_at, PropertyMap, PropertyValue, EOT};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::client::GraphError;
use crate::query::diff::{Chain, Select};
use crate::query::{
    CloseChildren, CloseState, CreateNode, CreateState, DeleteBatch, DeleteTarget,
    DiffSideQuery, DiffStateQuery, FindNode, LastStateChange, LinkChildren, NodeAtTime, NodeRef,
    OpenChildren, OpenState, SetProperties,
};
use crate::query::entity::ChildEdges;
use crate::store::{GraphStore, Row, StoreTxn};

pub type NodeId = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    pub label: String,
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEdge {
    pub src: NodeId,
    pub dst: NodeId,
    pub reltype: String,
    pub from: i64,
    pub to: i64,
}

/// The graph itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryGraph {
    nodes: BTreeMap<NodeId, StoredNode>,
    edges: BTreeMap<u64, StoredEdge>,
    next_id: u64,
}

impl MemoryGraph {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn add_node(&mut self, label: &str, properties: PropertyMap) -> NodeId {
        let id = self.allocate();
        self.nodes.insert(
            id,
            StoredNode {
                label: label.to_string(),
                properties,
            },
        );
        id
    }

    fn add_edge(&mut self, src: NodeId, dst: NodeId, reltype: &str, from: i64, to: i64) {
        let id = self.allocate();
        self.edges.insert(
            id,
            StoredEdge {
                src,
                dst,
                reltype: reltype.to_string(),
                from,
                to,
            },
        );
    }

    fn matching(&self, label: &str, property: &str, value: &PropertyValue) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.label == label && n.properties.get(property) == Some(value))
            .map(|(id, _)| *id)
            .collect()
    }

    fn matching_ref(&self, node: &NodeRef) -> Vec<NodeId> {
        self.matching(&node.label, &node.property, &node.value)
    }

    /// Edges leaving `src` with `reltype` into a node labelled `dst_label`.
    fn out_edges<'a>(
        &'a self,
        src: NodeId,
        reltype: &'a str,
        dst_label: &'a str,
    ) -> impl Iterator<Item = (u64, &'a StoredEdge)> + 'a {
        self.edges.iter().filter_map(move |(id, e)| {
            let hit = e.src == src
                && e.reltype == reltype
                && self.nodes.get(&e.dst).is_some_and(|n| n.label == dst_label);
            hit.then_some((*id, e))
        })
    }

    fn property(&self, id: NodeId, name: &str) -> PropertyValue {
        self.nodes
            .get(&id)
            .and_then(|n| n.properties.get(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Every node sequence matching `labels` joined by `reltypes`, with every
    /// edge valid at `t`. One entry per distinct edge path.
    fn chains(&self, labels: &[&str], reltypes: &[&str], t: i64) -> Vec<Vec<NodeId>> {
        let Some(first) = labels.first() else {
            return Vec::new();
        };
        let mut paths: Vec<Vec<NodeId>> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.label == *first)
            .map(|(id, _)| vec![*id])
            .collect();

        for (reltype, label) in reltypes.iter().zip(&labels[1..]) {
            let mut next = Vec::new();
            for path in &paths {
                let Some(&tail) = path.last() else { continue };
                for (_, edge) in self.out_edges(tail, reltype, label) {
                    if valid_at(edge.from, edge.to, t) {
                        let mut extended = path.clone();
                        extended.push(edge.dst);
                        next.push(extended);
                    }
                }
            }
            paths = next;
        }
        paths
    }

    fn rooted_chains(
        &self,
        chain: &Chain,
        root: &Select,
        identity: &PropertyValue,
        t: i64,
    ) -> Vec<Vec<NodeId>> {
        let labels: Vec<&str> = chain.labels().collect();
        let reltypes: Vec<&str> = chain.hops.iter().map(|(_, r)| r.as_str()).collect();
        self.chains(&labels, &reltypes, t)
            .into_iter()
            .filter(|p| &self.property(p[root.position], &root.property) == identity)
            .collect()
    }

    fn project(&self, path: &[NodeId], selects: &[Select]) -> Row {
        selects
            .iter()
            .map(|s| self.property(path[s.position], &s.property))
            .collect()
    }

    fn side_rows(&self, q: &DiffSideQuery) -> Vec<Row> {
        let present: BTreeSet<Vec<NodeId>> = self
            .rooted_chains(q.chain(), q.root(), q.identity(), q.t2)
            .into_iter()
            .collect();
        let mut rows: Vec<Row> = self
            .rooted_chains(q.chain(), q.root(), q.identity(), q.t1)
            .into_iter()
            .filter(|p| !present.contains(p))
            .map(|p| self.project(&p, q.selects()))
            .collect();
        rows.sort();
        rows
    }

    fn state_rows(&self, q: &DiffStateQuery) -> Vec<Row> {
        let at_t2 = self.rooted_chains(q.chain(), q.root(), q.identity(), q.t2);
        let mut rows = Vec::new();
        for p1 in self.rooted_chains(q.chain(), q.root(), q.identity(), q.t1) {
            let matches_t2 = at_t2.iter().filter(|p2| **p2 == p1).count();
            let Some(&end) = p1.last() else { continue };
            let states = |t: i64| -> Vec<NodeId> {
                self.out_edges(end, "HAS_STATE", &q.state_label)
                    .filter(|(_, e)| valid_at(e.from, e.to, t))
                    .map(|(_, e)| e.dst)
                    .collect()
            };
            let (s1, s2) = (states(q.t1), states(q.t2));
            let changed = s1
                .iter()
                .flat_map(|a| s2.iter().filter(move |b| *b != a))
                .count();
            let row = self.project(&p1, q.selects());
            for _ in 0..matches_t2 * changed {
                rows.push(row.clone());
            }
        }
        rows.sort();
        rows
    }

    fn node_at(&self, q: &NodeAtTime) -> Option<PropertyMap> {
        let mut labels: Vec<&str> = q.chain.iter().map(|(l, _)| l.as_str()).collect();
        let mut reltypes: Vec<&str> = q.chain.iter().map(|(_, r)| r.as_str()).collect();
        labels.push(&q.label);
        if let Some(state) = &q.state_label {
            labels.push(state);
            reltypes.push("HAS_STATE");
        }
        let position = q.chain.len();
        let path = self
            .chains(&labels, &reltypes, q.t)
            .into_iter()
            .find(|p| self.property(p[position], &q.property) == q.identity)?;

        let mut props = self.nodes.get(&path[position])?.properties.clone();
        if q.state_label.is_some() {
            if let Some(state) = path.last().and_then(|id| self.nodes.get(id)) {
                props.extend(state.properties.clone());
            }
        }
        Some(props)
    }

    /// Nodes reachable from `start` over one or more outgoing edges.
    fn reachable(&self, start: NodeId) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            for edge in self.edges.values().filter(|e| e.src == id) {
                if seen.insert(edge.dst) {
                    queue.push_back(edge.dst);
                }
            }
        }
        seen
    }

    fn delete_targets(&self, q: &DeleteBatch) -> Vec<NodeId> {
        let uuid = PropertyValue::from(q.uuid.as_str());
        let environments = self.matching("Environment", "uuid", &uuid);
        let labelled = |label: &str| -> BTreeSet<NodeId> {
            environments
                .iter()
                .flat_map(|env| self.reachable(*env))
                .filter(|id| self.nodes.get(id).is_some_and(|n| n.label == label))
                .collect()
        };
        let targets: BTreeSet<NodeId> = match &q.target {
            DeleteTarget::Environment => environments.iter().copied().collect(),
            DeleteTarget::EnvironmentState(state_label) => environments
                .iter()
                .flat_map(|env| {
                    self.out_edges(*env, "HAS_STATE", state_label)
                        .map(|(_, e)| e.dst)
                        .collect::<Vec<_>>()
                })
                .collect(),
            DeleteTarget::Nodes(label) => labelled(label),
            DeleteTarget::StateOf { label, state_label } => labelled(label)
                .into_iter()
                .flat_map(|owner| {
                    self.out_edges(owner, "HAS_STATE", state_label)
                        .map(|(_, e)| e.dst)
                        .collect::<Vec<_>>()
                })
                .collect(),
        };
        targets.into_iter().take(q.limit).collect()
    }

    fn detach_delete(&mut self, id: NodeId) {
        self.nodes.remove(&id);
        self.edges.retain(|_, e| e.src != id && e.dst != id);
    }

    // ── Inspection ───────────────────────────────────────────────

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Properties of every node with `label`.
    pub fn nodes_labelled(&self, label: &str) -> Vec<&PropertyMap> {
        self.nodes
            .values()
            .filter(|n| n.label == label)
            .map(|n| &n.properties)
            .collect()
    }

    pub fn node(&self, label: &str, property: &str, value: &PropertyValue) -> Option<&PropertyMap> {
        let id = self.matching(label, property, value).into_iter().next()?;
        self.nodes.get(&id).map(|n| &n.properties)
    }

    /// `(from, to)` of every `HAS_STATE` edge on a node, in start order.
    pub fn state_intervals(&self, node: &NodeRef) -> Vec<(i64, i64)> {
        let mut intervals: Vec<(i64, i64)> = self
            .matching_ref(node)
            .into_iter()
            .flat_map(|id| {
                self.edges
                    .values()
                    .filter(move |e| e.src == id && e.reltype == "HAS_STATE")
                    .map(|e| (e.from, e.to))
            })
            .collect();
        intervals.sort();
        intervals
    }

    /// `(child identity, from, to)` of every `reltype` edge out of `node`.
    pub fn child_edges(
        &self,
        node: &NodeRef,
        reltype: &str,
        child_property: &str,
    ) -> Vec<(PropertyValue, i64, i64)> {
        let mut edges: Vec<_> = self
            .matching_ref(node)
            .into_iter()
            .flat_map(|id| {
                self.edges
                    .values()
                    .filter(move |e| e.src == id && e.reltype == reltype)
                    .map(|e| (self.property(e.dst, child_property), e.from, e.to))
            })
            .collect();
        edges.sort();
        edges
    }

    // ── Entity operations ────────────────────────────────────────

    fn open_child_edges(&self, q: &ChildEdges) -> Vec<(u64, NodeId)> {
        self.matching_ref(&q.parent)
            .into_iter()
            .flat_map(|parent| {
                self.out_edges(parent, &q.reltype, &q.child_label)
                    .filter(|(_, e)| e.to == EOT)
                    .map(|(id, e)| (id, e.dst))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn open_state_edges(&self, node: &NodeRef, state_label: &str) -> Vec<(u64, NodeId)> {
        self.matching_ref(node)
            .into_iter()
            .flat_map(|id| {
                self.out_edges(id, "HAS_STATE", state_label)
                    .filter(|(_, e)| e.to == EOT)
                    .map(|(eid, e)| (eid, e.dst))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn close_edges(&mut self, ids: &[u64], t: i64) {
        for id in ids {
            if let Some(edge) = self.edges.get_mut(id) {
                edge.to = t;
            }
        }
    }
}

fn non_null(props: &PropertyMap) -> impl Iterator<Item = (&String, &PropertyValue)> {
    props.iter().filter(|(_, v)| !v.is_null())
}

/// In-process [`GraphStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<MemoryGraph>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the committed graph.
    pub async fn snapshot(&self) -> MemoryGraph {
        self.data.lock().await.clone()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    type Txn = MemoryTxn;

    async fn begin(&self) -> Result<MemoryTxn, GraphError> {
        let guard = self.data.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryTxn { guard, staged })
    }

    async fn side_rows(
        &self,
        q: &DiffSideQuery,
        page: usize,
        size: usize,
    ) -> Result<Vec<Row>, GraphError> {
        let rows = self.data.lock().await.side_rows(q);
        Ok(page_of(rows, page, size))
    }

    async fn state_rows(
        &self,
        q: &DiffStateQuery,
        page: usize,
        size: usize,
    ) -> Result<Vec<Row>, GraphError> {
        let rows = self.data.lock().await.state_rows(q);
        Ok(page_of(rows, page, size))
    }

    async fn node_at(&self, q: &NodeAtTime) -> Result<Option<PropertyMap>, GraphError> {
        Ok(self.data.lock().await.node_at(q))
    }

    async fn delete_batch(&self, q: &DeleteBatch) -> Result<u64, GraphError> {
        let mut graph = self.data.lock().await;
        let targets = graph.delete_targets(q);
        for id in &targets {
            graph.detach_delete(*id);
        }
        Ok(targets.len() as u64)
    }
}

fn page_of(rows: Vec<Row>, page: usize, size: usize) -> Vec<Row> {
    let skip = page.saturating_sub(1) * size;
    rows.into_iter().skip(skip).take(size).collect()
}

/// A staged write transaction on a [`MemoryStore`].
pub struct MemoryTxn {
    guard: OwnedMutexGuard<MemoryGraph>,
    staged: MemoryGraph,
}

#[async_trait]
impl StoreTxn for MemoryTxn {
    async fn find_node(&mut self, q: &FindNode) -> Result<Option<PropertyMap>, GraphError> {
        let g = &self.staged;
        Ok(g.matching_ref(&q.node)
            .into_iter()
            .next()
            .and_then(|id| g.nodes.get(&id))
            .map(|n| n.properties.clone()))
    }

    async fn create_node(&mut self, q: &CreateNode) -> Result<PropertyMap, GraphError> {
        if let Some(existing) = self
            .staged
            .matching_ref(&q.node)
            .into_iter()
            .next()
            .and_then(|id| self.staged.nodes.get(&id))
        {
            return Ok(existing.properties.clone());
        }
        let mut props: PropertyMap = non_null(&q.properties)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        props.insert(q.node.property.clone(), q.node.value.clone());
        self.staged.add_node(&q.node.label, props.clone());
        Ok(props)
    }

    async fn set_properties(&mut self, q: &SetProperties) -> Result<(), GraphError> {
        for id in self.staged.matching_ref(&q.node) {
            if let Some(node) = self.staged.nodes.get_mut(&id) {
                for (k, v) in non_null(&q.properties) {
                    node.properties.insert(k.clone(), v.clone());
                }
            }
        }
        Ok(())
    }

    async fn open_state(&mut self, q: &OpenState) -> Result<Option<PropertyMap>, GraphError> {
        let g = &self.staged;
        Ok(g.open_state_edges(&q.node, &q.state_label)
            .into_iter()
            .next()
            .and_then(|(_, state)| g.nodes.get(&state))
            .map(|n| n.properties.clone()))
    }

    async fn close_state(&mut self, q: &CloseState) -> Result<(), GraphError> {
        let ids: Vec<u64> = self
            .staged
            .open_state_edges(&q.node, &q.state_label)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        self.staged.close_edges(&ids, q.t);
        Ok(())
    }

    async fn create_state(&mut self, q: &CreateState) -> Result<(), GraphError> {
        let props: PropertyMap = non_null(&q.properties)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for owner in self.staged.matching_ref(&q.node) {
            let state = self.staged.add_node(&q.state_label, props.clone());
            self.staged.add_edge(owner, state, "HAS_STATE", q.t, EOT);
        }
        Ok(())
    }

    async fn last_state_change(&mut self, q: &LastStateChange) -> Result<Option<i64>, GraphError> {
        let g = &self.staged;
        Ok(g.matching_ref(&q.node)
            .into_iter()
            .flat_map(|id| {
                g.out_edges(id, "HAS_STATE", &q.state_label)
                    .map(|(_, e)| e.from)
                    .collect::<Vec<_>>()
            })
            .max())
    }

    async fn open_children(&mut self, q: &OpenChildren) -> Result<Vec<PropertyValue>, GraphError> {
        let g = &self.staged;
        Ok(g.open_child_edges(&q.edges)
            .into_iter()
            .map(|(_, child)| g.property(child, &q.edges.child_property))
            .collect())
    }

    async fn close_children(&mut self, q: &CloseChildren) -> Result<(), GraphError> {
        let wanted: BTreeSet<&PropertyValue> = q.children.iter().collect();
        let ids: Vec<u64> = self
            .staged
            .open_child_edges(&q.edges)
            .into_iter()
            .filter(|(_, child)| {
                wanted.contains(&self.staged.property(*child, &q.edges.child_property))
            })
            .map(|(id, _)| id)
            .collect();
        self.staged.close_edges(&ids, q.t);
        Ok(())
    }

    async fn link_children(&mut self, q: &LinkChildren) -> Result<Vec<PropertyValue>, GraphError> {
        let e = &q.edges;
        let mut linked = Vec::new();
        for parent in self.staged.matching_ref(&e.parent) {
            for value in &q.children {
                for child in self.staged.matching(&e.child_label, &e.child_property, value) {
                    self.staged.add_edge(parent, child, &e.reltype, q.t, EOT);
                    linked.push(value.clone());
                }
            }
        }
        Ok(linked)
    }

    async fn commit(mut self) -> Result<(), GraphError> {
        *self.guard = std::mem::take(&mut self.staged);
        Ok(())
    }

    async fn rollback(self) -> Result<(), GraphError> {
        Ok(())
    }
}
