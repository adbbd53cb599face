//! Error types for the kgraph-engine crate.

use thiserror::Error;

use kgraph_core::KgError;
use kgraph_graph::GraphError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Source node {node_id} not found in graph {graph_id}")]
    SourceNotFound { node_id: String, graph_id: String },

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// HTTP-equivalent status for callers that surface the failure.
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::SourceNotFound { .. } => 404,
            Self::Graph(GraphError::Rejected(_)) => 400,
            Self::Graph(e) if e.is_conflict() => 409,
            Self::Graph(_) | Self::Serialization(_) | Self::Io(_) => 500,
        }
    }
}

impl From<KgError> for EngineError {
    fn from(err: KgError) -> Self {
        match err {
            KgError::Serialization(e) => Self::Serialization(e.to_string()),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use kgraph_core::RelationType;

    #[test]
    fn status_codes() {
        assert_eq!(EngineError::Validation("x".into()).status(), 400);
        let missing = EngineError::SourceNotFound {
            node_id: "e9".into(),
            graph_id: "g1".into(),
        };
        assert_eq!(missing.status(), 404);
        assert_eq!(missing.to_string(), "Source node e9 not found in graph g1");

        let conflict = EngineError::from(GraphError::Conflict {
            graph_id: "g1".into(),
            detail: "taken".into(),
        });
        assert_eq!(conflict.status(), 409);
        assert_eq!(
            EngineError::from(GraphError::Connection("down".into())).status(),
            500
        );
        let rejected = GraphError::from(KgError::Validation("exhausted".into()));
        assert_eq!(EngineError::from(rejected).status(), 400);
    }

    #[test]
    fn invalid_relation_type_is_a_validation_error() {
        let err = RelationType::sanitize("!!!").unwrap_err();
        let engine: EngineError = KgError::from(err).into();
        assert!(matches!(engine, EngineError::Validation(_)));
    }
}
