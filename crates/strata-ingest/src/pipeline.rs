//! Applying one run to the graph, exactly once.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use strata_core::{LookupError, PropertyMap, PropertyValue, Registry};
use strata_graph::{
    remove_environment, with_lock, EnvironmentRef, GraphStore, RemovalStats, VersionedGraph,
};

use crate::error::{IngestError, Result};
use crate::run::{Run, SyncContext};
use crate::snitchers::Snitcher;

/// Environment property holding the completion time of the last full sync.
const LAST_SYNC: &str = "last_sync";

/// What one sync wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub uuid: String,
    pub time_ms: i64,
    /// Entities written per snitcher.
    pub counts: BTreeMap<Snitcher, usize>,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

pub struct SyncPipeline<S> {
    graph: VersionedGraph<S>,
}

impl<S: GraphStore> SyncPipeline<S> {
    pub fn new(store: S, registry: Arc<Registry>) -> Self {
        Self {
            graph: VersionedGraph::new(store, registry),
        }
    }

    pub fn graph(&self) -> &VersionedGraph<S> {
        &self.graph
    }

    /// Completion time of the last run fully applied to environment `uuid`.
    ///
    /// Kept on the Environment node outside its state chain, so a run that
    /// fails part way leaves it where it was.
    pub async fn last_sync(&self, uuid: &str) -> Result<Option<i64>> {
        let env = self.graph.find("Environment", uuid).await?;
        Ok(env.and_then(|env| env.properties.get(LAST_SYNC).and_then(PropertyValue::as_i64)))
    }

    /// Fail unless `completed` is newer than the environment's last sync.
    pub async fn check_staleness(&self, run: &Run, completed: i64) -> Result<()> {
        let env = run.environment();
        match self.last_sync(&env.uuid).await? {
            Some(last_update) if completed <= last_update => {
                tracing::debug!(uuid = %env.uuid, completed, last_update, "Run is stale");
                Err(IngestError::StaleRun {
                    completed,
                    last_update,
                })
            }
            _ => Ok(()),
        }
    }

    /// Sync one run under the environment lock.
    ///
    /// Nothing is written unless the run is finished, unsynced and newer
    /// than the last sync. A snitcher failure leaves the run unsynced and
    /// the last sync untouched; whatever it already wrote stays, and the
    /// same run can be synced again.
    pub async fn sync_run(&self, run: &Run) -> Result<SyncReport> {
        let start = Instant::now();
        run.start()?;
        let time_ms = run.completed_ms()?;
        self.check_staleness(run, time_ms).await?;

        let env = run.environment();
        tracing::info!(path = %run.path().display(), env = %env, time_ms, "Starting sync");

        let report = with_lock(
            self.graph.store().clone(),
            self.graph.registry(),
            env,
            |key| async move {
                tracing::debug!(key, "Environment locked");
                // Another sync may have landed since the first check.
                self.check_staleness(run, time_ms).await?;
                let report = self.consume(run, time_ms).await?;
                let stamp = PropertyMap::from([(LAST_SYNC.to_string(), time_ms.into())]);
                self.graph
                    .annotate("Environment", report.uuid.as_str(), stamp)
                    .await?;
                run.mark_synced()?;
                Ok::<_, IngestError>(report)
            },
        )
        .await?;

        tracing::info!(
            uuid = %report.uuid,
            entities = report.total(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Sync complete"
        );
        Ok(report)
    }

    async fn consume(&self, run: &Run, time_ms: i64) -> Result<SyncReport> {
        let ctx = SyncContext::new(run, &self.graph, time_ms)?;
        let mut counts = BTreeMap::new();
        for snitcher in Snitcher::ORDER {
            let written = snitcher.snitch(&ctx).await?;
            tracing::debug!(snitcher = snitcher.name(), written, "Snitcher finished");
            counts.insert(snitcher, written);
        }
        Ok(SyncReport {
            uuid: ctx.uuid().to_string(),
            time_ms,
            counts,
        })
    }

    /// The stored environment `uuid`.
    pub async fn find_environment(&self, uuid: &str) -> Result<EnvironmentRef> {
        let env = self
            .graph
            .find("Environment", uuid)
            .await?
            .ok_or_else(|| LookupError::EnvironmentNotFound(uuid.to_string()))?;
        let text = |name: &str| {
            env.properties
                .get(name)
                .map(ToString::to_string)
                .unwrap_or_default()
        };
        Ok(EnvironmentRef {
            uuid: uuid.to_string(),
            account_number: text("account_number"),
            name: text("name"),
        })
    }

    /// Delete everything the environment owns, under its lock.
    pub async fn remove(&self, env: EnvironmentRef, batch: usize) -> Result<RemovalStats> {
        let uuid = env.uuid.clone();
        let store = self.graph.store().clone();
        let registry = self.graph.registry();
        with_lock(store.clone(), registry, env, |_| async move {
            Ok::<_, IngestError>(remove_environment(&store, registry, &uuid, batch).await?)
        })
        .await
    }
}
