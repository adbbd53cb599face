//! The `GraphStore` trait: scoped primitives every backend provides.
//!
//! Backends own atomicity. Relation ids and single-add entity ids are
//! allocated inside the same store operation that creates the record, so
//! concurrent writers against one graph can never share an id.

use async_trait::async_trait;
use serde::Serialize;

use kgraph_core::{
    Entity, EntityId, EntityRecord, GraphId, RelationId, RelationType, Scope, StoredRelation,
    UserId,
};

use crate::client::{GraphClient, GraphError};

/// A relation ready for the store: endpoints resolved, type sanitized.
#[derive(Debug, Clone)]
pub struct RelationWrite {
    pub scope: Scope,
    pub source: EntityId,
    pub target: EntityId,
    pub rel_type: RelationType,
    pub verb: String,
    pub similarity: f64,
}

/// Result of merging a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelationOutcome {
    pub id: RelationId,
    /// False when an edge with the same identity already existed.
    pub created: bool,
}

/// A new entity hung off an existing one, created atomically with its edge.
#[derive(Debug, Clone)]
pub struct LinkedEntityWrite {
    pub scope: Scope,
    pub source: EntityId,
    pub name: String,
    pub entity_type: String,
    pub rel_type: RelationType,
    pub verb: String,
    pub similarity: f64,
}

/// Raw records for one assembled view.
#[derive(Debug, Clone, Default)]
pub struct SubgraphRecords {
    pub entities: Vec<EntityRecord>,
    pub relations: Vec<StoredRelation>,
}

/// Scoped persistence primitives for entities and relations.
///
/// `owner: Option<&UserId>` narrows graph-level operations to one tenant;
/// `None` means every owner of that graph (administrative use).
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create constraints and indexes. Idempotent.
    async fn ensure_schema(&self) -> Result<(), GraphError>;

    /// Create or update the entity keyed by (id, graph_id, user_id).
    async fn upsert_entity(&self, entity: &Entity) -> Result<(), GraphError>;

    /// Create-or-merge a directed edge. The edge payload (verb, similarity,
    /// id) is written only on creation. Returns `None` when either endpoint
    /// is missing from the scope.
    async fn merge_relation(
        &self,
        relation: &RelationWrite,
    ) -> Result<Option<RelationOutcome>, GraphError>;

    /// Allocate an entity id and relation id, create the entity and the edge
    /// from `source` to it, all as one unit. Returns `None` when `source`
    /// does not exist in the scope; nothing is written in that case.
    async fn create_linked_entity(
        &self,
        write: &LinkedEntityWrite,
    ) -> Result<Option<(EntityId, RelationId)>, GraphError>;

    /// Delete one entity and every incident relation. False if absent.
    async fn delete_entity(&self, scope: &Scope, id: &EntityId) -> Result<bool, GraphError>;

    /// Delete every entity of a graph (and their relations). Returns the entity count removed.
    async fn delete_graph(
        &self,
        graph_id: &GraphId,
        owner: Option<&UserId>,
    ) -> Result<u64, GraphError>;

    /// Delete every graph owned by a user.
    async fn delete_user(&self, user_id: &UserId) -> Result<u64, GraphError>;

    /// Delete everything.
    async fn delete_all(&self) -> Result<u64, GraphError>;

    /// Raw ids of every entity in a scope.
    async fn entity_ids(&self, scope: &Scope) -> Result<Vec<String>, GraphError>;

    /// Raw ids of every relation in a graph, across owners.
    async fn relation_ids(&self, graph_id: &GraphId) -> Result<Vec<String>, GraphError>;

    /// Distinct graph ids, sorted, optionally restricted to one owner.
    async fn graph_ids(&self, owner: Option<&UserId>) -> Result<Vec<GraphId>, GraphError>;

    async fn count_entities(
        &self,
        graph_id: &GraphId,
        owner: Option<&UserId>,
    ) -> Result<u64, GraphError>;

    async fn count_relations(
        &self,
        graph_id: &GraphId,
        owner: Option<&UserId>,
    ) -> Result<u64, GraphError>;

    /// Every entity of a graph and every edge between two of them.
    async fn fetch_graph(
        &self,
        graph_id: &GraphId,
        owner: Option<&UserId>,
    ) -> Result<SubgraphRecords, GraphError>;

    /// Entities with any property value containing `keyword` (case-insensitive),
    /// plus everything reachable within `max_hops` of them.
    async fn keyword_neighborhood(
        &self,
        keyword: &str,
        owner: Option<&UserId>,
        max_hops: u32,
    ) -> Result<SubgraphRecords, GraphError>;
}

#[async_trait]
impl GraphStore for GraphClient {
    async fn ensure_schema(&self) -> Result<(), GraphError> {
        GraphClient::ensure_schema(self).await
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<(), GraphError> {
        GraphClient::upsert_entity(self, entity).await
    }

    async fn merge_relation(
        &self,
        relation: &RelationWrite,
    ) -> Result<Option<RelationOutcome>, GraphError> {
        GraphClient::merge_relation(self, relation).await
    }

    async fn create_linked_entity(
        &self,
        write: &LinkedEntityWrite,
    ) -> Result<Option<(EntityId, RelationId)>, GraphError> {
        GraphClient::create_linked_entity(self, write).await
    }

    async fn delete_entity(&self, scope: &Scope, id: &EntityId) -> Result<bool, GraphError> {
        GraphClient::delete_entity(self, scope, id).await
    }

    async fn delete_graph(
        &self,
        graph_id: &GraphId,
        owner: Option<&UserId>,
    ) -> Result<u64, GraphError> {
        GraphClient::delete_graph(self, graph_id, owner).await
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<u64, GraphError> {
        GraphClient::delete_user(self, user_id).await
    }

    async fn delete_all(&self) -> Result<u64, GraphError> {
        GraphClient::delete_all(self).await
    }

    async fn entity_ids(&self, scope: &Scope) -> Result<Vec<String>, GraphError> {
        GraphClient::entity_ids(self, scope).await
    }

    async fn relation_ids(&self, graph_id: &GraphId) -> Result<Vec<String>, GraphError> {
        GraphClient::relation_ids(self, graph_id).await
    }

    async fn graph_ids(&self, owner: Option<&UserId>) -> Result<Vec<GraphId>, GraphError> {
        GraphClient::graph_ids(self, owner).await
    }

    async fn count_entities(
        &self,
        graph_id: &GraphId,
        owner: Option<&UserId>,
    ) -> Result<u64, GraphError> {
        GraphClient::count_entities(self, graph_id, owner).await
    }

    async fn count_relations(
        &self,
        graph_id: &GraphId,
        owner: Option<&UserId>,
    ) -> Result<u64, GraphError> {
        GraphClient::count_relations(self, graph_id, owner).await
    }

    async fn fetch_graph(
        &self,
        graph_id: &GraphId,
        owner: Option<&UserId>,
    ) -> Result<SubgraphRecords, GraphError> {
        GraphClient::fetch_graph(self, graph_id, owner).await
    }

    async fn keyword_neighborhood(
        &self,
        keyword: &str,
        owner: Option<&UserId>,
        max_hops: u32,
    ) -> Result<SubgraphRecords, GraphError> {
        GraphClient::keyword_neighborhood(self, keyword, owner, max_hops).await
    }
}
