//! Configuration management for Strata services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`STRATA__` prefix, `__` separator)
//! 2. Config file (`strata.toml`, or any format the `config` crate reads)
//! 3. Defaults

use serde::Deserialize;

use crate::error::StrataError;

/// Top-level settings shared by the Strata binaries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub neo4j: Neo4jSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub diff: DiffSettings,
}

/// `[neo4j]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jSettings {
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_password")]
    pub password: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

/// `[sync]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// Base64 encoded AES-256 key for encrypted run archives.
    #[serde(default)]
    pub key: Option<String>,

    /// Nodes deleted per transaction when removing an environment.
    #[serde(default = "default_page_size")]
    pub delete_batch: usize,
}

/// `[diff]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DiffSettings {
    /// Rows fetched per diff query page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "neo4j".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    500
}

fn default_page_size() -> usize {
    5000
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            key: None,
            delete_batch: default_page_size(),
        }
    }
}

impl Default for DiffSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

impl Settings {
    /// Load settings from `<file_prefix>.*` and `STRATA__*` variables.
    pub fn load(file_prefix: &str) -> Result<Self, StrataError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("STRATA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(cfg.try_deserialize()?)
    }
}
