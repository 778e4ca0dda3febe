//! Builders for versioned entity reads and writes.

use strata_core::{Model, PropertyMap, PropertyValue, EOT};

use super::{set_clause, set_params, Columns, Cypher, NodeRef, Param, Params};

fn node_columns(model: &Model) -> Columns {
    std::iter::once(model.identity_property())
        .chain(model.static_properties().iter().map(String::as_str))
        .filter_map(|name| model.property(name).map(|p| (p.name.clone(), p.kind)))
        .collect()
}

fn state_columns(model: &Model) -> Columns {
    model
        .state_properties()
        .iter()
        .filter_map(|name| model.property(name).map(|p| (p.name.clone(), p.kind)))
        .collect()
}

fn identity_params(node: &NodeRef) -> Params {
    Params::from([("identity".to_string(), Param::Value(node.value.clone()))])
}

// ── Nodes ────────────────────────────────────────────────────────

/// Point lookup of one node by identity.
#[derive(Debug, Clone)]
pub struct FindNode {
    pub node: NodeRef,
    pub columns: Columns,
    /// Take a write lock on the matched node for the rest of the transaction.
    pub for_update: bool,
}

impl FindNode {
    pub fn new(model: &Model, value: PropertyValue) -> Self {
        Self {
            node: NodeRef::new(model.label(), model.identity_property(), value),
            columns: node_columns(model),
            for_update: false,
        }
    }

    pub fn for_update(mut self) -> Self {
        self.for_update = true;
        self
    }
}

impl Cypher for FindNode {
    fn cypher(&self) -> String {
        let NodeRef { label, property, .. } = &self.node;
        let lock = if self.for_update {
            format!(" SET n.{property} = n.{property}")
        } else {
            String::new()
        };
        format!("MATCH (n:{label}) WHERE n.{property} = $identity{lock} RETURN n LIMIT 1")
    }

    fn params(&self) -> Params {
        identity_params(&self.node)
    }
}

/// Create a node with its identity and static properties.
///
/// Uses MERGE so that concurrent writers of shared models converge on
/// one node. Returns the node as stored, which differs from `properties`
/// when another transaction created it first.
#[derive(Debug, Clone)]
pub struct CreateNode {
    pub node: NodeRef,
    pub properties: PropertyMap,
    pub columns: Columns,
}

impl CreateNode {
    pub fn new(model: &Model, value: PropertyValue, properties: PropertyMap) -> Self {
        Self {
            node: NodeRef::new(model.label(), model.identity_property(), value),
            properties,
            columns: node_columns(model),
        }
    }
}

impl Cypher for CreateNode {
    fn cypher(&self) -> String {
        let NodeRef { label, property, .. } = &self.node;
        let others = self.properties.iter().filter(|(k, _)| *k != property);
        let mut cypher = format!("MERGE (n:{label} {{{property}: $identity}})");
        if let Some(set) = set_clause("n", others) {
            cypher.push_str(" ON CREATE ");
            cypher.push_str(&set);
        }
        cypher.push_str(" RETURN n");
        cypher
    }

    fn params(&self) -> Params {
        let mut params = identity_params(&self.node);
        let property = &self.node.property;
        set_params(&mut params, self.properties.iter().filter(|(k, _)| *k != property));
        params
    }
}

/// Overwrite properties on an existing node.
#[derive(Debug, Clone)]
pub struct SetProperties {
    pub node: NodeRef,
    pub properties: PropertyMap,
}

impl Cypher for SetProperties {
    fn cypher(&self) -> String {
        let NodeRef { label, property, .. } = &self.node;
        let set = set_clause("n", &self.properties).unwrap_or_default();
        format!("MATCH (n:{label}) WHERE n.{property} = $identity {set}")
            .trim_end()
            .to_string()
    }

    fn params(&self) -> Params {
        let mut params = identity_params(&self.node);
        set_params(&mut params, &self.properties);
        params
    }
}

// ── State ────────────────────────────────────────────────────────

/// The state node behind the open `HAS_STATE` edge.
#[derive(Debug, Clone)]
pub struct OpenState {
    pub node: NodeRef,
    pub state_label: String,
    pub columns: Columns,
}

impl OpenState {
    pub fn new(model: &Model, value: PropertyValue) -> Self {
        Self {
            node: NodeRef::new(model.label(), model.identity_property(), value),
            state_label: model.state_label().to_string(),
            columns: state_columns(model),
        }
    }
}

impl Cypher for OpenState {
    fn cypher(&self) -> String {
        let NodeRef { label, property, .. } = &self.node;
        format!(
            "MATCH (n:{label})-[r:HAS_STATE]->(s:{state}) \
             WHERE n.{property} = $identity AND r.to = $eot RETURN s LIMIT 1",
            state = self.state_label
        )
    }

    fn params(&self) -> Params {
        let mut params = identity_params(&self.node);
        params.insert("eot".into(), Param::Value(EOT.into()));
        params
    }
}

/// Close the open `HAS_STATE` edge at `t`.
#[derive(Debug, Clone)]
pub struct CloseState {
    pub node: NodeRef,
    pub state_label: String,
    pub t: i64,
}

impl Cypher for CloseState {
    fn cypher(&self) -> String {
        let NodeRef { label, property, .. } = &self.node;
        format!(
            "MATCH (n:{label})-[r:HAS_STATE]->(:{state}) \
             WHERE n.{property} = $identity AND r.to = $eot SET r.to = $t",
            state = self.state_label
        )
    }

    fn params(&self) -> Params {
        let mut params = identity_params(&self.node);
        params.insert("eot".into(), Param::Value(EOT.into()));
        params.insert("t".into(), Param::Value(self.t.into()));
        params
    }
}

/// Attach a new state node through an edge open from `t`.
#[derive(Debug, Clone)]
pub struct CreateState {
    pub node: NodeRef,
    pub state_label: String,
    pub properties: PropertyMap,
    pub t: i64,
}

impl Cypher for CreateState {
    fn cypher(&self) -> String {
        let NodeRef { label, property, .. } = &self.node;
        let mut cypher = format!(
            "MATCH (n:{label}) WHERE n.{property} = $identity \
             CREATE (n)-[:HAS_STATE {{from: $t, to: $eot}}]->(s:{state})",
            state = self.state_label
        );
        if let Some(set) = set_clause("s", &self.properties) {
            cypher.push(' ');
            cypher.push_str(&set);
        }
        cypher
    }

    fn params(&self) -> Params {
        let mut params = identity_params(&self.node);
        params.insert("eot".into(), Param::Value(EOT.into()));
        params.insert("t".into(), Param::Value(self.t.into()));
        set_params(&mut params, &self.properties);
        params
    }
}

/// Start of the most recent state interval.
#[derive(Debug, Clone)]
pub struct LastStateChange {
    pub node: NodeRef,
    pub state_label: String,
}

impl Cypher for LastStateChange {
    fn cypher(&self) -> String {
        let NodeRef { label, property, .. } = &self.node;
        format!(
            "MATCH (n:{label})-[r:HAS_STATE]->(:{state}) \
             WHERE n.{property} = $identity RETURN max(r.from) AS last_update",
            state = self.state_label
        )
    }

    fn params(&self) -> Params {
        identity_params(&self.node)
    }
}

// ── Children ─────────────────────────────────────────────────────

/// One named child relationship of one parent node.
#[derive(Debug, Clone)]
pub struct ChildEdges {
    pub parent: NodeRef,
    pub reltype: String,
    pub child_label: String,
    pub child_property: String,
}

impl ChildEdges {
    fn match_clause(&self) -> String {
        format!(
            "MATCH (p:{pl})-[r:{rel}]->(c:{cl}) WHERE p.{pp} = $identity AND r.to = $eot",
            pl = self.parent.label,
            rel = self.reltype,
            cl = self.child_label,
            pp = self.parent.property,
        )
    }

    fn base_params(&self) -> Params {
        let mut params = identity_params(&self.parent);
        params.insert("eot".into(), Param::Value(EOT.into()));
        params
    }
}

/// Identities of children linked through open edges.
#[derive(Debug, Clone)]
pub struct OpenChildren {
    pub edges: ChildEdges,
    pub child_kind: strata_core::PropertyKind,
}

impl Cypher for OpenChildren {
    fn cypher(&self) -> String {
        format!(
            "{} RETURN c.{} AS child",
            self.edges.match_clause(),
            self.edges.child_property
        )
    }

    fn params(&self) -> Params {
        self.edges.base_params()
    }
}

/// Close the open edges to the listed children at `t`.
#[derive(Debug, Clone)]
pub struct CloseChildren {
    pub edges: ChildEdges,
    pub children: Vec<PropertyValue>,
    pub t: i64,
}

impl Cypher for CloseChildren {
    fn cypher(&self) -> String {
        format!(
            "{} AND c.{} IN $children SET r.to = $t",
            self.edges.match_clause(),
            self.edges.child_property
        )
    }

    fn params(&self) -> Params {
        let mut params = self.edges.base_params();
        params.insert("children".into(), Param::List(self.children.clone()));
        params.insert("t".into(), Param::Value(self.t.into()));
        params
    }
}

/// Open edges `[t, EOT)` to the listed, already stored children.
///
/// Yields one row per edge created. A child with no stored node yields
/// nothing.
#[derive(Debug, Clone)]
pub struct LinkChildren {
    pub edges: ChildEdges,
    pub child_kind: strata_core::PropertyKind,
    pub children: Vec<PropertyValue>,
    pub t: i64,
}

impl Cypher for LinkChildren {
    fn cypher(&self) -> String {
        let e = &self.edges;
        format!(
            "MATCH (p:{pl}) WHERE p.{pp} = $identity \
             UNWIND $children AS child \
             MATCH (c:{cl}) WHERE c.{cp} = child \
             CREATE (p)-[:{rel} {{from: $t, to: $eot}}]->(c) \
             RETURN c.{cp} AS child",
            pl = e.parent.label,
            pp = e.parent.property,
            cl = e.child_label,
            cp = e.child_property,
            rel = e.reltype,
        )
    }

    fn params(&self) -> Params {
        let mut params = self.edges.base_params();
        params.insert("children".into(), Param::List(self.children.clone()));
        params.insert("t".into(), Param::Value(self.t.into()));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::ModelBuilder;

    fn host() -> Model {
        ModelBuilder::new("Host")
            .identity_concat("hostname_environment", &["hostname", "environment"])
            .statics(&["hostname", "environment"])
            .states(&["kernel"])
            .build()
            .unwrap()
    }

    fn host_ref() -> NodeRef {
        NodeRef::new("Host", "hostname_environment", "h1_e1".into())
    }

    #[test]
    fn find_node_text() {
        let q = FindNode::new(&host(), "h1_e1".into());
        assert_eq!(
            q.cypher(),
            "MATCH (n:Host) WHERE n.hostname_environment = $identity RETURN n LIMIT 1"
        );
        assert_eq!(q.columns.len(), 3);
        assert_eq!(
            q.for_update().cypher(),
            "MATCH (n:Host) WHERE n.hostname_environment = $identity \
             SET n.hostname_environment = n.hostname_environment RETURN n LIMIT 1"
        );
    }

    #[test]
    fn create_node_merges_on_identity() {
        let q = CreateNode::new(
            &host(),
            "h1_e1".into(),
            [
                ("hostname_environment".to_string(), PropertyValue::from("h1_e1")),
                ("hostname".to_string(), PropertyValue::from("h1")),
                ("environment".to_string(), PropertyValue::from("e1")),
            ]
            .into_iter()
            .collect(),
        );
        assert_eq!(
            q.cypher(),
            "MERGE (n:Host {hostname_environment: $identity}) \
             ON CREATE SET n.environment = $p_environment, n.hostname = $p_hostname RETURN n"
        );
        assert_eq!(q.columns.len(), 3);
        let params = q.params();
        assert_eq!(params.len(), 3);
        assert!(params.contains_key("identity"));
    }

    #[test]
    fn state_transition_text() {
        let close = CloseState {
            node: host_ref(),
            state_label: "HostState".into(),
            t: 200,
        };
        assert_eq!(
            close.cypher(),
            "MATCH (n:Host)-[r:HAS_STATE]->(:HostState) \
             WHERE n.hostname_environment = $identity AND r.to = $eot SET r.to = $t"
        );
        assert_eq!(close.params()["t"], Param::Value(PropertyValue::Int(200)));
        assert_eq!(close.params()["eot"], Param::Value(PropertyValue::Int(EOT)));

        let create = CreateState {
            node: host_ref(),
            state_label: "HostState".into(),
            properties: [("kernel".to_string(), PropertyValue::from("5.15"))]
                .into_iter()
                .collect(),
            t: 200,
        };
        assert_eq!(
            create.cypher(),
            "MATCH (n:Host) WHERE n.hostname_environment = $identity \
             CREATE (n)-[:HAS_STATE {from: $t, to: $eot}]->(s:HostState) SET s.kernel = $p_kernel"
        );
    }

    #[test]
    fn child_reconciliation_text() {
        let edges = ChildEdges {
            parent: NodeRef::new("Environment", "uuid", "e1".into()),
            reltype: "HAS_HOST".into(),
            child_label: "Host".into(),
            child_property: "hostname_environment".into(),
        };
        let open = OpenChildren {
            edges: edges.clone(),
            child_kind: strata_core::PropertyKind::Str,
        };
        assert_eq!(
            open.cypher(),
            "MATCH (p:Environment)-[r:HAS_HOST]->(c:Host) WHERE p.uuid = $identity \
             AND r.to = $eot RETURN c.hostname_environment AS child"
        );

        let close = CloseChildren {
            edges: edges.clone(),
            children: vec!["h1_e1".into()],
            t: 200,
        };
        assert!(close.cypher().ends_with("AND c.hostname_environment IN $children SET r.to = $t"));
        assert_eq!(
            close.params()["children"],
            Param::List(vec![PropertyValue::from("h1_e1")])
        );

        let link = LinkChildren {
            edges,
            child_kind: strata_core::PropertyKind::Str,
            children: vec!["h2_e1".into()],
            t: 200,
        };
        assert_eq!(
            link.cypher(),
            "MATCH (p:Environment) WHERE p.uuid = $identity \
             UNWIND $children AS child \
             MATCH (c:Host) WHERE c.hostname_environment = child \
             CREATE (p)-[:HAS_HOST {from: $t, to: $eot}]->(c) \
             RETURN c.hostname_environment AS child"
        );
    }

    #[test]
    fn set_properties_text() {
        let q = SetProperties {
            node: NodeRef::new("EnvironmentLock", "uuid", "e1".into()),
            properties: [("locked".to_string(), PropertyValue::from(0))]
                .into_iter()
                .collect(),
        };
        assert_eq!(
            q.cypher(),
            "MATCH (n:EnvironmentLock) WHERE n.uuid = $identity SET n.locked = $p_locked"
        );
    }
}
