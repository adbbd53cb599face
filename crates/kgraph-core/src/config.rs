//! Configuration management for kgraph services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`KGRAPH__` prefix, `__` separator)
//! 2. Config file (`kgraph.toml` by default)
//! 3. Defaults

use serde::Deserialize;

use crate::error::KgError;

/// Keyword traversal never goes deeper than this many hops.
pub const MAX_SEARCH_HOPS: u32 = 2;

/// Top-level kgraph configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct KgConfig {
    /// Neo4j connection settings.
    #[serde(default)]
    pub neo4j: Neo4jSettings,

    /// Owner used when a request does not name one.
    #[serde(default = "default_user_id")]
    pub default_user_id: String,

    /// Depth of the keyword traversal; clamped to [`MAX_SEARCH_HOPS`].
    #[serde(default = "default_search_hops")]
    pub search_max_hops: u32,

    /// File name used for downloaded exports.
    #[serde(default = "default_export_file_name")]
    pub export_file_name: String,
}

/// Connection settings for the Neo4j store.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jSettings {
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default = "default_neo4j_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

impl KgConfig {
    /// Load from `<file_prefix>.toml` (optional) overlaid with `KGRAPH__*` env vars.
    pub fn load(file_prefix: &str) -> Result<Self, KgError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("KGRAPH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: KgConfig = cfg.try_deserialize()?;
        tracing::debug!(
            uri = %loaded.neo4j.uri,
            default_user_id = %loaded.default_user_id,
            "Loaded configuration"
        );
        Ok(loaded)
    }

    /// Traversal depth actually used for keyword search.
    pub fn search_hops(&self) -> u32 {
        self.search_max_hops.min(MAX_SEARCH_HOPS)
    }
}

impl Default for KgConfig {
    fn default() -> Self {
        Self {
            neo4j: Neo4jSettings::default(),
            default_user_id: default_user_id(),
            search_max_hops: default_search_hops(),
            export_file_name: default_export_file_name(),
        }
    }
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_neo4j_user(),
            password: String::new(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

fn default_user_id() -> String {
    "default_user".to_string()
}

fn default_search_hops() -> u32 {
    MAX_SEARCH_HOPS
}

fn default_export_file_name() -> String {
    "knowledge_graph_export.json".to_string()
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_neo4j_user() -> String {
    "neo4j".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}
