//! Batched deletes for environment removal.

use super::{Cypher, Param, Params};

/// What one delete batch targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    /// State nodes of every `label` node reachable from the environment.
    StateOf { label: String, state_label: String },
    /// State nodes of the environment node itself.
    EnvironmentState(String),
    /// `label` nodes reachable from the environment.
    Nodes(String),
    /// The environment node itself.
    Environment,
}

/// Detach and delete up to `limit` matched nodes.
#[derive(Debug, Clone)]
pub struct DeleteBatch {
    pub target: DeleteTarget,
    pub uuid: String,
    pub limit: usize,
}

impl Cypher for DeleteBatch {
    fn cypher(&self) -> String {
        let matched = match &self.target {
            DeleteTarget::StateOf { label, state_label } => format!(
                "MATCH (e:Environment)-[*]->(:{label})-[:HAS_STATE]->(n:{state_label}) \
                 WHERE e.uuid = $uuid"
            ),
            DeleteTarget::EnvironmentState(state_label) => format!(
                "MATCH (e:Environment)-[:HAS_STATE]->(n:{state_label}) WHERE e.uuid = $uuid"
            ),
            DeleteTarget::Nodes(label) => {
                format!("MATCH (e:Environment)-[*]->(n:{label}) WHERE e.uuid = $uuid")
            }
            DeleteTarget::Environment => "MATCH (n:Environment) WHERE n.uuid = $uuid".to_string(),
        };
        format!(
            "{matched} WITH n LIMIT {} DETACH DELETE n RETURN count(*) as `deleted`",
            self.limit
        )
    }

    fn params(&self) -> Params {
        Params::from([("uuid".to_string(), Param::Value(self.uuid.as_str().into()))])
    }
}
