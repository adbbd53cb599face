//! Core domain types for the kgraph knowledge graph.
//!
//! Every entity and relation belongs to a scope: the (graph_id, user_id)
//! pair that isolates one tenant's graph from all others. Entity ids are
//! only unique inside a scope, never globally.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KgError;

/// Display name given to entities extracted or added without one.
pub const DEFAULT_ENTITY_NAME: &str = "Unnamed";

/// Category given to entities that arrive without a type.
pub const DEFAULT_ENTITY_TYPE: &str = "Node";

// ── Scope ─────────────────────────────────────────────────────────

/// Identifier of one graph (one uploaded document / session).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct GraphId(pub String);

impl GraphId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The owning tenant. No user record is needed for graph operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The isolation unit for every entity read and write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Scope {
    pub graph_id: GraphId,
    pub user_id: UserId,
}

impl Scope {
    pub fn new(graph_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            graph_id: GraphId::new(graph_id),
            user_id: UserId::new(user_id),
        }
    }

    /// Both halves of the scope must be non-blank.
    pub fn validate(&self) -> Result<(), KgError> {
        if self.graph_id.0.trim().is_empty() {
            return Err(KgError::Validation("graph_id must not be empty".into()));
        }
        if self.user_id.0.trim().is_empty() {
            return Err(KgError::Validation("user_id must not be empty".into()));
        }
        Ok(())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.graph_id)
    }
}

// ── Identifiers ───────────────────────────────────────────────────

/// Entity identifier, canonically `e<N>`. Unique within a scope only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Build the canonical `e<seq>` form.
    pub fn from_seq(seq: u64) -> Self {
        Self(format!("e{seq}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Relation identifier: a per-graph numeric sequence, independent of entity ids.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RelationId(pub u64);

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Entities ──────────────────────────────────────────────────────

/// An extracted real-world object or concept.
///
/// The (id, graph_id, user_id) triple is the entity's key: re-upserting
/// the same triple updates `name` and `type` in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub graph_id: GraphId,
    pub user_id: UserId,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

impl Entity {
    /// Create an entity in `scope`, substituting defaults for blank name/type.
    pub fn new(
        id: EntityId,
        scope: &Scope,
        name: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            id,
            graph_id: scope.graph_id.clone(),
            user_id: scope.user_id.clone(),
            name: non_blank_or(name.into(), DEFAULT_ENTITY_NAME),
            entity_type: non_blank_or(entity_type.into(), DEFAULT_ENTITY_TYPE),
        }
    }

    pub fn scope(&self) -> Scope {
        Scope {
            graph_id: self.graph_id.clone(),
            user_id: self.user_id.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), KgError> {
        self.scope().validate()?;
        if self.id.0.trim().is_empty() {
            return Err(KgError::Validation("entity id must not be empty".into()));
        }
        Ok(())
    }
}

/// An entity as read back from the store, with store-managed timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityRecord {
    #[serde(flatten)]
    pub entity: Entity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl EntityRecord {
    /// Every property value as a string, the way a keyword matcher sees them.
    pub fn property_values(&self) -> Vec<String> {
        let mut values = vec![
            self.entity.id.0.clone(),
            self.entity.graph_id.0.clone(),
            self.entity.user_id.0.clone(),
            self.entity.name.clone(),
            self.entity.entity_type.clone(),
        ];
        values.extend(self.first_seen.map(|t| t.to_rfc3339()));
        values.extend(self.last_seen.map(|t| t.to_rfc3339()));
        values
    }
}

// ── Relations ─────────────────────────────────────────────────────

/// A directed relation waiting to be written.
///
/// `label` is the raw, unsanitized relation type. It becomes the structural
/// type only after passing through [`crate::RelationType::sanitize`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relation {
    pub graph_id: GraphId,
    pub user_id: UserId,
    pub source: EntityId,
    pub target: EntityId,
    #[serde(rename = "type")]
    pub label: String,
    #[serde(default)]
    pub verb: String,
    #[serde(default)]
    pub similarity: f64,
}

impl Relation {
    pub fn scope(&self) -> Scope {
        Scope {
            graph_id: self.graph_id.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

/// A relation as persisted: sanitized structural type plus its allocated id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRelation {
    pub id: RelationId,
    pub graph_id: GraphId,
    pub user_id: UserId,
    pub source: EntityId,
    pub target: EntityId,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub verb: String,
    pub similarity: f64,
}

impl StoredRelation {
    /// Human-readable label: the verb when present, else the structural type.
    pub fn display_label(&self) -> &str {
        if self.verb.is_empty() {
            &self.rel_type
        } else {
            &self.verb
        }
    }
}

// ── Extraction input ──────────────────────────────────────────────

/// Output of the extraction collaborator: `extract(text) -> Extraction`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub relations: Vec<ExtractedRelation>,
}

/// An entity candidate. Batch extraction numbers them `e1..eN`; the
/// single-add path leaves `id` empty for the allocator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedEntity {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub entity_type: Option<String>,
}

/// A relation candidate between two extracted entity ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRelation {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub label: String,
    #[serde(default)]
    pub verb: Option<String>,
    #[serde(default)]
    pub similarity: Option<f64>,
}

impl ExtractedRelation {
    /// Bind the candidate to `scope`. Similarity is clamped into [0, 1].
    pub fn to_relation(&self, scope: &Scope) -> Relation {
        Relation {
            graph_id: scope.graph_id.clone(),
            user_id: scope.user_id.clone(),
            source: EntityId::new(self.source.clone()),
            target: EntityId::new(self.target.clone()),
            label: self.label.clone(),
            verb: self.verb.clone().unwrap_or_default(),
            similarity: clamp_similarity(self.similarity.unwrap_or(0.0)),
        }
    }
}

/// Clamp a similarity score into [0, 1]; NaN becomes 0.
pub fn clamp_similarity(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

fn non_blank_or(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_defaults_fill_blank_fields() {
        let scope = Scope::new("g1", "u1");
        let entity = Entity::new(EntityId::from_seq(3), &scope, "  ", "");
        assert_eq!(entity.id.as_str(), "e3");
        assert_eq!(entity.name, DEFAULT_ENTITY_NAME);
        assert_eq!(entity.entity_type, DEFAULT_ENTITY_TYPE);
        assert_eq!(entity.scope(), scope);
    }

    #[test]
    fn scope_rejects_blank_components() {
        assert!(Scope::new("g1", "u1").validate().is_ok());
        assert!(matches!(
            Scope::new("", "u1").validate(),
            Err(KgError::Validation(_))
        ));
        assert!(matches!(
            Scope::new("g1", " ").validate(),
            Err(KgError::Validation(_))
        ));
    }

    #[test]
    fn extraction_parses_collaborator_output() {
        let json = r#"{
            "entities": [
                {"id": "e1", "name": "A", "type": "Person", "start": 0, "end": 1},
                {"name": "B"}
            ],
            "relations": [
                {"source": "e1", "target": "e2", "type": "co-occurrence", "verb": "同现", "similarity": 0.42}
            ]
        }"#;
        let extraction: Extraction = serde_json::from_str(json).unwrap();
        assert_eq!(extraction.entities.len(), 2);
        assert_eq!(extraction.entities[0].id.as_deref(), Some("e1"));
        assert!(extraction.entities[1].id.is_none());
        assert!(extraction.entities[1].entity_type.is_none());

        let relation = extraction.relations[0].to_relation(&Scope::new("g1", "u1"));
        assert_eq!(relation.label, "co-occurrence");
        assert_eq!(relation.verb, "同现");
        assert_eq!(relation.similarity, 0.42);
    }

    #[test]
    fn similarity_is_clamped() {
        assert_eq!(clamp_similarity(1.7), 1.0);
        assert_eq!(clamp_similarity(-0.2), 0.0);
        assert_eq!(clamp_similarity(f64::NAN), 0.0);
        assert_eq!(clamp_similarity(0.5), 0.5);
    }

    #[test]
    fn display_label_prefers_verb() {
        let mut rel = StoredRelation {
            id: RelationId(1),
            graph_id: GraphId::new("g1"),
            user_id: UserId::new("u1"),
            source: EntityId::new("e1"),
            target: EntityId::new("e2"),
            rel_type: "WORK_AT".into(),
            verb: "work_at".into(),
            similarity: 0.0,
        };
        assert_eq!(rel.display_label(), "work_at");
        rel.verb.clear();
        assert_eq!(rel.display_label(), "WORK_AT");
    }

    #[test]
    fn entity_serializes_type_field() {
        let entity = Entity::new(EntityId::new("e1"), &Scope::new("g1", "u1"), "A", "Person");
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["type"], "Person");
        assert_eq!(json["graph_id"], "g1");
    }
}
