//! Neo4j connection management and shared graph client.

use neo4rs::{query, ConfigBuilder, Graph, Query};

use kgraph_core::config::Neo4jSettings;
use kgraph_core::KgError;

/// Neo4j error code raised when a uniqueness constraint rejects a write.
const CONSTRAINT_VIOLATION: &str = "ConstraintValidationFailed";

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    /// A concurrent writer claimed the same key first. Retryable.
    #[error("Write conflict in graph {graph_id}: {detail}")]
    Conflict { graph_id: String, detail: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The write was refused by a domain rule, e.g. an exhausted id sequence.
    #[error(transparent)]
    Rejected(#[from] KgError),
}

impl GraphError {
    /// Turn a uniqueness-constraint failure into [`GraphError::Conflict`].
    pub(crate) fn classify(err: neo4rs::Error, graph_id: &str) -> Self {
        let detail = err.to_string();
        if detail.contains(CONSTRAINT_VIOLATION) {
            Self::Conflict {
                graph_id: graph_id.to_string(),
                detail,
            }
        } else {
            Self::Query(err)
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Configuration for connecting to Neo4j.
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
        Self::from(&Neo4jSettings::default())
    }
}

impl From<&Neo4jSettings> for GraphConfig {
    fn from(settings: &Neo4jSettings) -> Self {
        Self {
            uri: settings.uri.clone(),
            user: settings.user.clone(),
            password: settings.password.clone(),
            max_connections: settings.max_connections,
            fetch_size: settings.fetch_size,
        }
    }
}

/// Schema statements applied by [`GraphClient::ensure_schema`].
const SCHEMA: &[&str] = &[
    "CREATE CONSTRAINT entity_scope_key IF NOT EXISTS
     FOR (n:Entity) REQUIRE (n.id, n.graph_id, n.user_id) IS UNIQUE",
    "CREATE CONSTRAINT graph_lock_key IF NOT EXISTS
     FOR (l:GraphLock) REQUIRE l.graph_id IS UNIQUE",
    "CREATE INDEX entity_graph_id IF NOT EXISTS FOR (n:Entity) ON (n.graph_id)",
    "CREATE INDEX entity_user_id IF NOT EXISTS FOR (n:Entity) ON (n.user_id)",
];

/// Thread-safe Neo4j graph client with connection pooling.
///
/// Constructed once at process start and passed to whatever needs it.
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
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

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Create the uniqueness constraints and lookup indexes. Idempotent.
    pub async fn ensure_schema(&self) -> Result<(), GraphError> {
        for statement in SCHEMA {
            self.run(query(statement)).await?;
        }
        tracing::info!(statements = SCHEMA.len(), "Neo4j schema ensured");
        Ok(())
    }

    /// Execute a write-only query (CREATE, MERGE, DELETE, SET).
    pub async fn run(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a read query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a read query and return the first row, if any.
    pub async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }

    /// Execute a single-statement write whose constraint failures count as conflicts.
    pub(crate) async fn query_one_guarded(
        &self,
        query: Query,
        graph_id: &str,
    ) -> Result<Option<neo4rs::Row>, GraphError> {
        let mut stream = self
            .graph
            .execute(query)
            .await
            .map_err(|e| GraphError::classify(e, graph_id))?;
        stream
            .next()
            .await
            .map_err(|e| GraphError::classify(e, graph_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_settings() {
        let settings = Neo4jSettings {
            uri: "bolt://db:7687".into(),
            password: "pw".into(),
            ..Default::default()
        };
        let config = GraphConfig::from(&settings);
        assert_eq!(config.uri, "bolt://db:7687");
        assert_eq!(config.user, "neo4j");
        assert_eq!(config.password, "pw");
        assert_eq!(config.max_connections, 16);
    }

    #[test]
    fn schema_covers_entity_key() {
        assert!(SCHEMA
            .iter()
            .any(|s| s.contains("(n.id, n.graph_id, n.user_id) IS UNIQUE")));
    }
}
