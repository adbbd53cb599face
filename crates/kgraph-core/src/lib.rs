//! kgraph-core: Shared types, configuration, and error handling for kgraph.
//!
//! This crate provides the foundational pieces used by every kgraph component:
//! - Entity and relation types bound to a (graph_id, user_id) scope
//! - The relation-type sanitizer that guards structural query positions
//! - Identifier allocation rules for entities, relations, and graphs
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod ids;
pub mod sanitize;
pub mod types;

pub use config::KgConfig;
pub use error::KgError;
pub use sanitize::{InvalidRelationType, RelationType};
pub use types::{
    Entity, EntityId, EntityRecord, Extraction, ExtractedEntity, ExtractedRelation, GraphId,
    Relation, RelationId, Scope, StoredRelation, UserId,
};
