//! Read-only queries for the diff engine.
//!
//! Every query walks the full ancestor chain of its terminal label, from the
//! graph root down, and filters relationship intervals by timestamp. The
//! subtree root only pins one position on that chain by identity.

use std::fmt;

use strata_core::registry::Hop;
use strata_core::{LookupError, Model, PropertyKind, PropertyValue, Registry};

use super::{var, Columns, Cypher, Param, Params};

/// One returned identity column, `label.identity_property`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    pub label: String,
    pub property: String,
    pub kind: PropertyKind,
    /// Index of the label on the matched chain.
    pub position: usize,
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", var(&self.label), self.property)
    }
}

/// The labelled chain a diff query matches: ancestor hops plus the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub hops: Vec<Hop>,
    pub end: String,
}

impl Chain {
    fn of(registry: &Registry, end: &str) -> Self {
        Self {
            hops: registry.path(end),
            end: end.to_string(),
        }
    }

    /// Labels from the root down to and including the terminal.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.hops
            .iter()
            .map(|(label, _)| label.as_str())
            .chain(std::iter::once(self.end.as_str()))
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels().position(|l| l == label)
    }

    /// `(a:A)-[:R]->(b:B)` with every variable named after its label.
    fn pattern(&self) -> String {
        let mut cypher = String::new();
        for (label, reltype) in &self.hops {
            cypher.push_str(&format!("({}:{label})-[:{reltype}]->", var(label)));
        }
        cypher.push_str(&format!("({}:{})", var(&self.end), self.end));
        cypher
    }

    fn vars(&self) -> String {
        self.labels().map(var).collect::<Vec<_>>().join(",")
    }
}

/// Shared shape of the paged diff queries.
#[derive(Debug, Clone)]
struct PathQuery {
    chain: Chain,
    root: Select,
    selects: Vec<Select>,
    identity: PropertyValue,
}

impl PathQuery {
    fn new(registry: &Registry, path: &[String], identity: PropertyValue) -> Result<Self, LookupError> {
        let end = path
            .last()
            .ok_or_else(|| LookupError::ModelNotFound(String::new()))?;
        registry.model(end)?;
        let chain = Chain::of(registry, end);

        let selects = path
            .iter()
            .map(|label| {
                let model = registry.model(label)?;
                let position = chain
                    .position(label)
                    .ok_or_else(|| LookupError::ModelNotFound(label.clone()))?;
                Ok(select(model, position))
            })
            .collect::<Result<Vec<_>, LookupError>>()?;

        Ok(Self {
            root: selects[0].clone(),
            chain,
            selects,
            identity,
        })
    }

    fn root_where(&self) -> String {
        format!("{} = $identity", self.root)
    }

    fn returns(&self) -> String {
        let cols: Vec<String> = self.selects.iter().map(Select::to_string).collect();
        let cols = cols.join(",");
        format!("RETURN {cols}\nORDER BY {cols}")
    }
}

fn select(model: &Model, position: usize) -> Select {
    let property = model.identity_property();
    Select {
        label: model.label().to_string(),
        property: property.to_string(),
        kind: model.property(property).map(|p| p.kind).unwrap_or_default(),
        position,
    }
}

/// Append paging to a query: pages are numbered from 1.
pub fn paged(cypher: &str, page: usize, size: usize) -> String {
    let skip = page.saturating_sub(1) * size;
    format!("{cypher} \nSKIP {skip}\nLIMIT {size}")
}

// ── Side query ───────────────────────────────────────────────────

/// Identity tuples along `path` reachable at `t1` but not at `t2`.
#[derive(Debug, Clone)]
pub struct DiffSideQuery {
    inner: PathQuery,
    pub t1: i64,
    pub t2: i64,
}

impl DiffSideQuery {
    pub fn new(
        registry: &Registry,
        path: &[String],
        identity: PropertyValue,
        (t1, t2): (i64, i64),
    ) -> Result<Self, LookupError> {
        Ok(Self {
            inner: PathQuery::new(registry, path, identity)?,
            t1,
            t2,
        })
    }

    pub fn chain(&self) -> &Chain {
        &self.inner.chain
    }

    pub fn root(&self) -> &Select {
        &self.inner.root
    }

    pub fn selects(&self) -> &[Select] {
        &self.inner.selects
    }

    pub fn identity(&self) -> &PropertyValue {
        &self.inner.identity
    }
}

impl Cypher for DiffSideQuery {
    fn cypher(&self) -> String {
        let q = &self.inner;
        let pattern = q.chain.pattern();
        let vars = q.chain.vars();
        format!(
            "MATCH p_t2 = {pattern}\
             \nWHERE {root} AND ALL (r IN RELATIONSHIPS(p_t2) WHERE r.from <= $t2 < r.to)\
             \nWITH COLLECT([{vars}]) as t2_nodes\
             \nMATCH p_t1 = {pattern}\
             \nWHERE {root} AND ALL (r IN RELATIONSHIPS(p_t1) WHERE r.from <= $t1 < r.to) \
             AND NOT [{vars}] IN t2_nodes\
             \n{returns}",
            root = q.root_where(),
            returns = q.returns(),
        )
    }

    fn params(&self) -> Params {
        diff_params(&self.inner.identity, self.t1, self.t2)
    }
}

// ── State query ──────────────────────────────────────────────────

/// Identity tuples along `path` whose terminal has different state nodes
/// at `t1` and `t2`.
#[derive(Debug, Clone)]
pub struct DiffStateQuery {
    inner: PathQuery,
    pub state_label: String,
    pub t1: i64,
    pub t2: i64,
}

impl DiffStateQuery {
    pub fn new(
        registry: &Registry,
        path: &[String],
        identity: PropertyValue,
        (t1, t2): (i64, i64),
    ) -> Result<Self, LookupError> {
        let inner = PathQuery::new(registry, path, identity)?;
        let state_label = registry.state_label(&inner.chain.end)?.to_string();
        Ok(Self {
            inner,
            state_label,
            t1,
            t2,
        })
    }

    pub fn chain(&self) -> &Chain {
        &self.inner.chain
    }

    pub fn root(&self) -> &Select {
        &self.inner.root
    }

    pub fn selects(&self) -> &[Select] {
        &self.inner.selects
    }

    pub fn identity(&self) -> &PropertyValue {
        &self.inner.identity
    }
}

impl Cypher for DiffStateQuery {
    fn cypher(&self) -> String {
        let q = &self.inner;
        let pattern = q.chain.pattern();
        let end = var(&q.chain.end);
        let state = &self.state_label;
        let wheres = [
            q.root_where(),
            "r_t1_state.from <= $t1 < r_t1_state.to".to_string(),
            "r_t2_state.from <= $t2 < r_t2_state.to".to_string(),
            "t1_state <> t2_state".to_string(),
            "ALL (r IN RELATIONSHIPS(p_t1) WHERE r.from <= $t1 < r.to)".to_string(),
            "ALL (r in RELATIONSHIPS(p_t2) WHERE r.from <= $t2 < r.to)".to_string(),
        ];
        format!(
            "MATCH p_t1 = {pattern}\
             \nMATCH p_t2 = {pattern}\
             \nMATCH ({end})-[r_t1_state:HAS_STATE]->(t1_state:{state})\
             \nMATCH ({end})-[r_t2_state:HAS_STATE]->(t2_state:{state})\
             \nWHERE {wheres}\
             \n{returns}",
            wheres = wheres.join(" AND "),
            returns = q.returns(),
        )
    }

    fn params(&self) -> Params {
        diff_params(&self.inner.identity, self.t1, self.t2)
    }
}

fn diff_params(identity: &PropertyValue, t1: i64, t2: i64) -> Params {
    Params::from([
        ("identity".to_string(), Param::Value(identity.clone())),
        ("t1".to_string(), Param::Value(t1.into())),
        ("t2".to_string(), Param::Value(t2.into())),
    ])
}

// ── Node at time ─────────────────────────────────────────────────

/// The properties of one entity as they stood at `t`.
#[derive(Debug, Clone)]
pub struct NodeAtTime {
    pub chain: Vec<Hop>,
    pub label: String,
    pub property: String,
    pub state_label: Option<String>,
    pub node_columns: Columns,
    pub state_columns: Columns,
    pub identity: PropertyValue,
    pub t: i64,
}

impl NodeAtTime {
    pub fn new(
        registry: &Registry,
        label: &str,
        identity: PropertyValue,
        t: i64,
    ) -> Result<Self, LookupError> {
        let model = registry.model(label)?;
        let columns = |names: &[String]| -> Columns {
            names
                .iter()
                .filter_map(|n| model.property(n).map(|p| (p.name.clone(), p.kind)))
                .collect()
        };
        let mut node_names = vec![model.identity_property().to_string()];
        node_names.extend(model.static_properties().iter().cloned());

        Ok(Self {
            chain: registry.path(label),
            label: label.to_string(),
            property: model.identity_property().to_string(),
            state_label: model.has_state().then(|| model.state_label().to_string()),
            node_columns: columns(&node_names),
            state_columns: columns(model.state_properties()),
            identity,
            t,
        })
    }
}

impl Cypher for NodeAtTime {
    fn cypher(&self) -> String {
        let mut steps: Vec<(String, &str)> = self
            .chain
            .iter()
            .map(|(label, _)| (var(label), label.as_str()))
            .collect();
        let mut rels: Vec<&str> = self.chain.iter().map(|(_, r)| r.as_str()).collect();
        steps.push(("n".to_string(), &self.label));
        let mut returns = vec!["n"];
        if let Some(state) = &self.state_label {
            steps.push(("ns".to_string(), state));
            rels.push("HAS_STATE");
            returns.push("ns");
        }

        let (first_var, first_label) = &steps[0];
        let mut cypher = format!("MATCH p = ({first_var}:{first_label})");
        for ((v, label), rel) in steps[1..].iter().zip(rels) {
            cypher.push_str(&format!("-[:{rel}]->({v}:{label})"));
        }
        cypher.push_str(" WHERE ALL (r IN RELATIONSHIPS(p) WHERE r.from <= $t < r.to) AND");
        cypher.push_str(&format!(" n.{} = $identity", self.property));
        cypher.push_str(&format!(" RETURN {} LIMIT 1", returns.join(",")));
        cypher
    }

    fn params(&self) -> Params {
        Params::from([
            ("identity".to_string(), Param::Value(self.identity.clone())),
            ("t".to_string(), Param::Value(self.t.into())),
        ])
    }
}
