//! A collection run: one archive, one environment, one completion time.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use strata_core::schema::CONCAT_DELIMITER;
use strata_core::{LookupError, Model, Registry};
use strata_graph::{Entity, EnvironmentRef, GraphError, GraphStore, VersionedGraph};

use crate::archive::RunArchive;
use crate::error::{ArchiveError, IngestError, Result};

/// Name of the manifest member.
pub const MANIFEST: &str = "run_data.json";

/// Status a run must have before it can be synced.
pub const FINISHED: &str = "finished";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestEnvironment {
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uuid: String,
}

/// Contents of `run_data.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub environment: ManifestEnvironment,
    #[serde(default)]
    pub status: String,
    pub started: Option<String>,
    pub completed: Option<String>,
    pub synced: Option<String>,
}

/// Parse an ISO-8601 timestamp. Naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone)]
pub struct Run {
    archive: RunArchive,
    manifest: Manifest,
}

impl Run {
    /// Open the run archive at `path`.
    ///
    /// A missing or unreadable archive, or one without a usable manifest,
    /// is [`ArchiveError::InvalidRun`]. A manifest that does not decrypt is
    /// [`ArchiveError::Object`].
    pub fn open(path: impl AsRef<Path>, key: Option<&str>) -> std::result::Result<Self, ArchiveError> {
        let path = path.as_ref();
        let invalid = || ArchiveError::InvalidRun(path.to_path_buf());

        let archive = match RunArchive::open(path, key) {
            Ok(archive) => archive,
            Err(ArchiveError::InvalidKey) => return Err(ArchiveError::InvalidKey),
            Err(_) => return Err(invalid()),
        };
        let raw = match archive.read(MANIFEST) {
            Ok(raw) => raw,
            Err(e @ ArchiveError::Object(_)) => return Err(e),
            Err(_) => return Err(invalid()),
        };
        let manifest: Manifest = serde_json::from_value(raw).map_err(|_| invalid())?;
        Ok(Self { archive, manifest })
    }

    pub fn path(&self) -> &Path {
        self.archive.path()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn status(&self) -> &str {
        &self.manifest.status
    }

    pub fn environment(&self) -> EnvironmentRef {
        let env = &self.manifest.environment;
        EnvironmentRef {
            uuid: env.uuid.clone(),
            account_number: env.account_number.clone(),
            name: env.name.clone(),
        }
    }

    pub fn completed(&self) -> Option<DateTime<Utc>> {
        self.manifest.completed.as_deref().and_then(parse_timestamp)
    }

    /// Completion time in ms. Every fact in the run is stamped with it.
    pub fn completed_ms(&self) -> Result<i64> {
        self.completed()
            .map(|dt| dt.timestamp_millis())
            .ok_or_else(|| IngestError::MissingCompletion(self.path().to_path_buf()))
    }

    /// Basenames of every document in the run.
    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.archive.names()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.archive.contains(name)
    }

    pub fn get_object(&self, name: &str) -> std::result::Result<Value, ArchiveError> {
        self.archive.read(name)
    }

    /// The `data` payload of a document, or `None` when the run lacks it.
    pub fn data(&self, name: &str) -> std::result::Result<Option<Value>, ArchiveError> {
        if !self.contains(name) {
            return Ok(None);
        }
        let mut doc = self.get_object(name)?;
        Ok(Some(doc.get_mut("data").map(Value::take).unwrap_or_default()))
    }

    /// `(hostname, member)` for every `<doctype>_<hostname>.json`, sorted.
    pub fn host_files(&self, doctype: &str) -> Vec<(String, String)> {
        let prefix = format!("{doctype}_");
        self.filenames()
            .filter_map(|name| {
                let host = name.strip_prefix(&prefix)?.strip_suffix(".json")?;
                (!host.is_empty()).then(|| (host.to_string(), name.to_string()))
            })
            .collect()
    }

    /// Marker written next to the archive once the run is synced.
    pub fn sidecar_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path().as_os_str());
        name.push(".synced");
        PathBuf::from(name)
    }

    pub fn is_synced(&self) -> bool {
        self.manifest.synced.is_some() || self.sidecar_path().exists()
    }

    /// Check the run can be synced.
    pub fn start(&self) -> Result<()> {
        if self.status() != FINISHED {
            return Err(IngestError::InvalidStatus {
                path: self.path().to_path_buf(),
                status: self.status().to_string(),
            });
        }
        if self.is_synced() {
            return Err(IngestError::AlreadySynced(self.path().to_path_buf()));
        }
        Ok(())
    }

    /// Record a successful sync.
    pub fn mark_synced(&self) -> Result<()> {
        let marker = serde_json::json!({ "synced": Utc::now().to_rfc3339() });
        std::fs::write(self.sidecar_path(), marker.to_string())?;
        tracing::debug!(path = %self.sidecar_path().display(), "Marked run synced");
        Ok(())
    }
}

/// Everything a snitcher needs for one run.
pub struct SyncContext<'a, S> {
    pub run: &'a Run,
    pub graph: &'a VersionedGraph<S>,
    pub time_ms: i64,
    environment: Entity<'a>,
}

impl<'a, S: GraphStore> SyncContext<'a, S> {
    pub fn new(run: &'a Run, graph: &'a VersionedGraph<S>, time_ms: i64) -> Result<Self> {
        let env = &run.manifest().environment;
        let environment = Entity::builder(graph.registry().model("Environment")?)
            .set("uuid", env.uuid.as_str())
            .set("account_number", env.account_number.as_str())
            .set("name", env.name.as_str())
            .set("status", run.status())
            .build()?;
        Ok(Self {
            run,
            graph,
            time_ms,
            environment,
        })
    }

    pub fn registry(&self) -> &'a Registry {
        self.graph.registry()
    }

    pub fn model(&self, label: &str) -> std::result::Result<&'a Model, LookupError> {
        self.registry().model(label)
    }

    pub fn environment(&self) -> &Entity<'a> {
        &self.environment
    }

    pub fn uuid(&self) -> &str {
        &self.run.manifest().environment.uuid
    }

    /// The Host entity for `hostname` if the graph already has it.
    pub async fn find_host(&self, hostname: &str) -> Result<Option<Entity<'a>>> {
        let identity = format!("{hostname}{CONCAT_DELIMITER}{}", self.uuid());
        if self.graph.find("Host", identity.as_str()).await?.is_none() {
            tracing::warn!(%hostname, uuid = %self.uuid(), "Unable to locate host");
            return Ok(None);
        }
        let host = Entity::builder(self.model("Host")?)
            .set("hostname", hostname)
            .set("environment", self.uuid())
            .build()?;
        Ok(Some(host))
    }

    /// Update every child, then make them the open `child_set` of `parent`.
    pub async fn reconcile(
        &self,
        parent: &Entity<'_>,
        child_set: &str,
        children: &[Entity<'_>],
    ) -> std::result::Result<usize, GraphError> {
        for child in children {
            self.graph.update(child, self.time_ms).await?;
        }
        self.graph
            .update_children(parent, child_set, children, self.time_ms)
            .await?;
        Ok(children.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01T12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T12:30:00.000000"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn manifest_defaults() {
        let manifest: Manifest = serde_json::from_value(serde_json::json!({
            "status": "running",
            "started": "2024-03-01T12:00:00",
        }))
        .unwrap();
        assert_eq!(manifest.status, "running");
        assert!(manifest.completed.is_none());
        assert!(manifest.environment.uuid.is_empty());
    }
}
