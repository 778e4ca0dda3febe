//! Neo4j connection pool and the errors every graph operation reports.

use neo4rs::{ConfigBuilder, Graph, Query};
use strata_core::config::Neo4jSettings;
use strata_core::LookupError;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("cannot reach Neo4j: {0}")]
    Connection(String),

    #[error("cypher failed: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("no {label} node with identity {identity}")]
    NotFound { label: String, identity: String },

    #[error("{label} identity needs property {property}")]
    MissingIdentity { label: String, property: String },

    #[error("{0}")]
    Lookup(#[from] LookupError),

    #[error("cannot encode property: {0}")]
    Serialization(String),
}

/// Connection settings, usually taken from `[neo4j]` in the config file.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Neo4jSettings::default().into()
    }
}

impl From<Neo4jSettings> for GraphConfig {
    fn from(s: Neo4jSettings) -> Self {
        Self {
            uri: s.uri,
            user: s.user,
            password: s.password,
            max_connections: s.max_connections,
            fetch_size: s.fetch_size,
        }
    }
}

/// Pooled Neo4j connection. Cloning shares the pool.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, pool = config.max_connections, "Graph client ready");
        Ok(Self { graph })
    }

    /// Run a statement and discard its results.
    pub async fn run(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Every row of a read query.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        tracing::trace!(rows = rows.len(), "Query returned");
        Ok(rows)
    }

    /// The first row of a read query. Remaining rows are not fetched.
    pub async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>, GraphError> {
        Ok(self.graph.execute(query).await?.next().await?)
    }

    /// Open an explicit transaction for a [`crate::StoreTxn`].
    pub async fn start_txn(&self) -> Result<neo4rs::Txn, GraphError> {
        Ok(self.graph.start_txn().await?)
    }
}
