//! Request, report, and view types for the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kgraph_core::{EntityRecord, GraphId, RelationId, StoredRelation, UserId};

// ── Write Reports ────────────────────────────────────────────────

/// Why a relation in a batch was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    MissingEndpoint,
    InvalidType,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedRelation {
    pub source: String,
    pub target: String,
    pub label: String,
    pub reason: SkipReason,
}

/// Per-item outcome of a relation batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SkipReport {
    /// Ids of edges created by this batch.
    pub created: Vec<RelationId>,
    /// Ids of edges that already existed and were left untouched.
    pub merged: Vec<RelationId>,
    pub skipped: Vec<SkippedRelation>,
}

impl SkipReport {
    pub fn written(&self) -> usize {
        self.created.len() + self.merged.len()
    }

    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|s| s.reason == reason).count()
    }
}

/// Outcome of `create_graph`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateGraphReport {
    pub graph_id: GraphId,
    pub user_id: UserId,
    pub entities: usize,
    pub relations: SkipReport,
}

// ── Single-Node Add / Delete ─────────────────────────────────────

/// Payload for the node hung off an existing one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewNode {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub similarity: Option<f64>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub verb: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddNodeRequest {
    pub graph_id: String,
    pub source_node_id: String,
    /// Raw relation label from the source to the new node.
    pub link: String,
    #[serde(default)]
    pub new_node: NewNode,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddNodeResponse {
    pub success: bool,
    pub message: String,
    pub node: NodeView,
    pub relationship: LinkView,
}

/// `{success, message}` body shared by delete and failure responses.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
}

// ── Views ────────────────────────────────────────────────────────

/// A node as presented to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub graph_id: GraphId,
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl NodeView {
    /// Display key: the id when present, else the name. Not a storage key.
    pub fn key(&self) -> &str {
        if self.id.is_empty() {
            &self.name
        } else {
            &self.id
        }
    }
}

impl From<EntityRecord> for NodeView {
    fn from(record: EntityRecord) -> Self {
        Self {
            id: record.entity.id.0,
            name: record.entity.name,
            entity_type: record.entity.entity_type,
            graph_id: record.entity.graph_id,
            user_id: record.entity.user_id,
            first_seen: record.first_seen,
            last_seen: record.last_seen,
        }
    }
}

/// A directed edge as presented to callers. Endpoints resolve within the
/// edge's own `(graph_id, user_id)` scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkView {
    pub id: RelationId,
    pub graph_id: GraphId,
    pub user_id: UserId,
    pub source: String,
    pub target: String,
    /// Sanitized structural type.
    #[serde(rename = "type")]
    pub rel_type: String,
    /// Human-readable label: the verb when present.
    pub label: String,
    pub similarity: f64,
}

impl From<StoredRelation> for LinkView {
    fn from(relation: StoredRelation) -> Self {
        let label = relation.display_label().to_string();
        Self {
            id: relation.id,
            graph_id: relation.graph_id,
            user_id: relation.user_id,
            source: relation.source.0,
            target: relation.target.0,
            rel_type: relation.rel_type,
            label,
            similarity: relation.similarity,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphView {
    pub nodes: Vec<NodeView>,
    pub links: Vec<LinkView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserGraphView {
    pub graph_id: GraphId,
    pub nodes: Vec<NodeView>,
    pub links: Vec<LinkView>,
}

/// One graph view, or one block per graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Assembled {
    Graph(GraphView),
    Graphs(Vec<UserGraphView>),
}

/// Structural node label every search hit reports as its `type`.
pub const ENTITY_LABEL: &str = "Entity";

/// An entity returned by keyword search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub name: String,
    pub graph_id: GraphId,
    pub user_id: UserId,
    /// Structural label of the node.
    #[serde(rename = "type")]
    pub label: String,
    /// Semantic category (Person, Organization, ...).
    pub category: String,
}

impl From<NodeView> for SearchHit {
    fn from(node: NodeView) -> Self {
        Self {
            id: node.id,
            name: node.name,
            graph_id: node.graph_id,
            user_id: node.user_id,
            label: ENTITY_LABEL.to_string(),
            category: node.entity_type,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgraph_core::{Entity, EntityId, Scope};

    #[test]
    fn node_key_falls_back_to_name() {
        let scope = Scope::new("g1", "u1");
        let mut node = NodeView::from(EntityRecord {
            entity: Entity::new(EntityId::new("e1"), &scope, "Alice", "Person"),
            first_seen: None,
            last_seen: None,
        });
        assert_eq!(node.key(), "e1");
        node.id.clear();
        assert_eq!(node.key(), "Alice");
    }

    #[test]
    fn add_node_request_accepts_sparse_payload() {
        let json = r#"{"graph_id": "g1", "source_node_id": "e1", "link": "包含", "new_node": {"name": "X"}}"#;
        let request: AddNodeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.new_node.name.as_deref(), Some("X"));
        assert!(request.new_node.entity_type.is_none());
        assert!(request.new_node.user_id.is_none());
    }

    #[test]
    fn search_hit_reports_structural_label() {
        let scope = Scope::new("g1", "u1");
        let node = NodeView::from(EntityRecord {
            entity: Entity::new(EntityId::new("e1"), &scope, "Acme", "Organization"),
            first_seen: None,
            last_seen: None,
        });
        let hit = SearchHit::from(node);
        let value = serde_json::to_value(&hit).unwrap();
        assert_eq!(value["type"], "Entity");
        assert_eq!(value["category"], "Organization");
    }
}
