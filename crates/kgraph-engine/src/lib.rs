//! kgraph-engine: the knowledge-graph service layer.
//!
//! Owns the batch and single-node write protocols on top of a
//! [`GraphStore`], reconstructs node/link views for one graph, one user, a
//! keyword neighborhood, or everything, and renders exports.

pub mod assemble;
pub mod error;
pub mod export;
pub mod tenancy;
pub mod types;
pub mod writer;

pub use assemble::GraphSelector;
pub use error::EngineError;
pub use export::{ExportDocument, ExportFormat};
pub use types::{
    AddNodeRequest, AddNodeResponse, Assembled, CreateGraphReport, GraphView,
    LinkView, NewNode, NodeView, SearchHit, SkipReason, SkipReport, UserGraphView,
};

use kgraph_core::config::MAX_SEARCH_HOPS;
use kgraph_core::{KgConfig, UserId};
use kgraph_graph::GraphStore;

/// The knowledge-graph service over one store backend.
pub struct KnowledgeGraph<S: GraphStore> {
    store: S,
    default_user: UserId,
    search_hops: u32,
}

impl<S: GraphStore> KnowledgeGraph<S> {
    /// Create a service with the stock defaults.
    pub fn new(store: S) -> Self {
        Self::with_config(store, &KgConfig::default())
    }

    pub fn with_config(store: S, config: &KgConfig) -> Self {
        Self {
            store,
            default_user: UserId::new(config.default_user_id.clone()),
            search_hops: config.search_hops(),
        }
    }

    /// Override the keyword traversal depth. Clamped to the maximum.
    pub fn with_search_hops(mut self, hops: u32) -> Self {
        self.search_hops = hops.min(MAX_SEARCH_HOPS);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Owner used when a request does not name one.
    pub fn default_user(&self) -> &UserId {
        &self.default_user
    }

    /// Resolve an optional, possibly blank, user id to an owner.
    pub fn user_or_default(&self, user_id: Option<&str>) -> UserId {
        match user_id.map(str::trim) {
            Some(u) if !u.is_empty() => UserId::new(u),
            _ => self.default_user.clone(),
        }
    }
}
