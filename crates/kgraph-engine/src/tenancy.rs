//! Tenancy index and identifier allocation.
//!
//! Read-only views derived from the entities in the store: which graphs a
//! user owns, how big a graph is, and the next free id in each sequence.
//! Allocation here is advisory; the write paths that must not race
//! allocate inside the store instead.

use kgraph_core::{ids, EntityId, GraphId, RelationId, Scope, UserId};
use kgraph_graph::GraphStore;

use crate::error::{EngineError, Result};
use crate::KnowledgeGraph;

impl<S: GraphStore> KnowledgeGraph<S> {
    /// Distinct graph ids among the entities owned by `user_id`.
    pub async fn list_graph_ids(&self, user_id: &UserId) -> Result<Vec<GraphId>> {
        require_user(user_id)?;
        Ok(self.store.graph_ids(Some(user_id)).await?)
    }

    /// Every distinct graph id in the store. Administrative.
    pub async fn list_all_graph_ids(&self) -> Result<Vec<GraphId>> {
        Ok(self.store.graph_ids(None).await?)
    }

    /// Entity count of a graph, optionally for one owner.
    pub async fn count_entities(&self, graph_id: &GraphId, owner: Option<&UserId>) -> Result<u64> {
        Ok(self.store.count_entities(graph_id, owner).await?)
    }

    pub async fn count_relations(&self, graph_id: &GraphId, owner: Option<&UserId>) -> Result<u64> {
        Ok(self.store.count_relations(graph_id, owner).await?)
    }

    /// Next `e<N>` id for a scope.
    pub async fn next_entity_id(&self, scope: &Scope) -> Result<EntityId> {
        scope.validate()?;
        let existing = self.store.entity_ids(scope).await?;
        Ok(ids::next_entity_id(existing.iter().map(String::as_str))?)
    }

    /// Next numeric relation id for a graph.
    pub async fn next_relation_id(&self, graph_id: &GraphId) -> Result<RelationId> {
        let existing = self.store.relation_ids(graph_id).await?;
        Ok(ids::next_relation_id(existing.iter().map(String::as_str))?)
    }

    /// Fresh `<user_id>_<N>` graph id.
    pub async fn next_graph_id(&self, user_id: &UserId) -> Result<GraphId> {
        require_user(user_id)?;
        let existing = self.store.graph_ids(Some(user_id)).await?;
        Ok(ids::next_graph_id(user_id, &existing)?)
    }
}

pub(crate) fn require_user(user_id: &UserId) -> Result<()> {
    if user_id.0.trim().is_empty() {
        return Err(EngineError::Validation("user_id must not be empty".into()));
    }
    Ok(())
}

pub(crate) fn require_graph(graph_id: &GraphId) -> Result<()> {
    if graph_id.0.trim().is_empty() {
        return Err(EngineError::Validation("graph_id must not be empty".into()));
    }
    Ok(())
}
