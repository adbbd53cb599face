//! Write protocols: batch graph creation, single-node add, scoped deletes.
//!
//! Entities are always written before relations so endpoint resolution
//! succeeds. Per-relation failures are collected into a [`SkipReport`]
//! and never abort the batch; everything else propagates.

use std::collections::HashSet;
use std::future::Future;

use kgraph_core::types::{clamp_similarity, DEFAULT_ENTITY_NAME, DEFAULT_ENTITY_TYPE};
use kgraph_core::{
    ids, Entity, EntityId, Extraction, GraphId, Relation, RelationId, RelationType, Scope, UserId,
};
use kgraph_graph::{GraphError, GraphStore, LinkedEntityWrite, RelationWrite};

use crate::error::{EngineError, Result};
use crate::tenancy::{require_graph, require_user};
use crate::types::{
    AddNodeRequest, AddNodeResponse, CreateGraphReport, LinkView, NewNode, NodeView, SkipReason,
    SkipReport, SkippedRelation,
};
use crate::KnowledgeGraph;

impl<S: GraphStore> KnowledgeGraph<S> {
    // ── Batch Creation ───────────────────────────────────────────

    /// Write one extraction into `scope`: entities first, then relations.
    ///
    /// Entities without an id are numbered after the highest `e<N>` already
    /// present in the scope or the batch.
    pub async fn create_graph(
        &self,
        extraction: &Extraction,
        scope: &Scope,
    ) -> Result<CreateGraphReport> {
        scope.validate()?;

        let existing = self.store.entity_ids(scope).await?;
        let mut next_seq = existing
            .iter()
            .map(String::as_str)
            .chain(extraction.entities.iter().filter_map(|e| e.id.as_deref()))
            .filter_map(ids::entity_seq)
            .max()
            .unwrap_or(0);

        let mut entities: Vec<Entity> = Vec::with_capacity(extraction.entities.len());
        for candidate in &extraction.entities {
            let id = match candidate.id.as_deref().map(str::trim) {
                Some(raw) if !raw.is_empty() => EntityId::new(raw),
                _ => {
                    next_seq = ids::successor(next_seq, "entity")?;
                    EntityId::from_seq(next_seq)
                }
            };
            entities.push(Entity::new(
                id,
                scope,
                candidate.name.clone().unwrap_or_default(),
                candidate.entity_type.clone().unwrap_or_default(),
            ));
        }

        let written = self.upsert_entities(&entities).await?;

        let relations: Vec<Relation> = extraction
            .relations
            .iter()
            .map(|r| r.to_relation(scope))
            .collect();
        let report = self.upsert_relations(&relations, &entities).await?;

        tracing::info!(
            graph_id = %scope.graph_id,
            user_id = %scope.user_id,
            entities = written,
            relations_created = report.created.len(),
            relations_merged = report.merged.len(),
            relations_skipped = report.skipped.len(),
            "Graph written"
        );

        Ok(CreateGraphReport {
            graph_id: scope.graph_id.clone(),
            user_id: scope.user_id.clone(),
            entities: written,
            relations: report,
        })
    }

    /// Allocate a fresh graph id for `user_id` and write the extraction into it.
    pub async fn create_graph_for_user(
        &self,
        extraction: &Extraction,
        user_id: &UserId,
    ) -> Result<CreateGraphReport> {
        let graph_id = self.next_graph_id(user_id).await?;
        let scope = Scope {
            graph_id,
            user_id: user_id.clone(),
        };
        self.create_graph(extraction, &scope).await
    }

    // ── Upserts ──────────────────────────────────────────────────

    /// Upsert entities keyed by (id, graph_id, user_id). The whole batch is
    /// validated before anything is written.
    pub async fn upsert_entities(&self, entities: &[Entity]) -> Result<usize> {
        for entity in entities {
            entity.validate()?;
        }
        for entity in entities {
            retry_on_conflict(|| self.store.upsert_entity(entity)).await?;
        }
        Ok(entities.len())
    }

    /// Create-or-merge each relation whose endpoints are among `known`
    /// in the relation's own scope. Bad items are skipped and reported.
    pub async fn upsert_relations(
        &self,
        relations: &[Relation],
        known: &[Entity],
    ) -> Result<SkipReport> {
        let known: HashSet<(&GraphId, &UserId, &EntityId)> = known
            .iter()
            .map(|e| (&e.graph_id, &e.user_id, &e.id))
            .collect();

        let mut report = SkipReport::default();
        for relation in relations {
            let resolves = |id: &EntityId| known.contains(&(&relation.graph_id, &relation.user_id, id));
            if !resolves(&relation.source) || !resolves(&relation.target) {
                skip(&mut report, relation, SkipReason::MissingEndpoint);
                continue;
            }

            let rel_type = match RelationType::sanitize(&relation.label) {
                Ok(t) => t,
                Err(_) => {
                    skip(&mut report, relation, SkipReason::InvalidType);
                    continue;
                }
            };

            let write = RelationWrite {
                scope: relation.scope(),
                source: relation.source.clone(),
                target: relation.target.clone(),
                rel_type,
                verb: relation.verb.clone(),
                similarity: clamp_similarity(relation.similarity),
            };
            match retry_on_conflict(|| self.store.merge_relation(&write)).await? {
                Some(outcome) if outcome.created => report.created.push(outcome.id),
                Some(outcome) => report.merged.push(outcome.id),
                None => skip(&mut report, relation, SkipReason::MissingEndpoint),
            }
        }
        Ok(report)
    }

    // ── Single-Node Add ──────────────────────────────────────────

    /// Create a new entity linked from `source` with `relation_label`.
    ///
    /// Id allocation and both creates happen as one store operation.
    pub async fn add_single_entity(
        &self,
        scope: &Scope,
        source: &EntityId,
        new_entity: &NewNode,
        relation_label: &str,
    ) -> Result<(EntityId, RelationId)> {
        scope.validate()?;
        if source.0.trim().is_empty() {
            return Err(EngineError::Validation("source_node_id must not be empty".into()));
        }
        let write = linked_write(scope, source, new_entity, relation_label)?;

        let created = retry_on_conflict(|| self.store.create_linked_entity(&write)).await?;
        let Some((entity_id, relation_id)) = created else {
            return Err(EngineError::SourceNotFound {
                node_id: source.0.clone(),
                graph_id: scope.graph_id.0.clone(),
            });
        };

        tracing::info!(
            scope = %scope,
            source = %source,
            entity_id = %entity_id,
            relation_id = %relation_id,
            "Node added"
        );
        Ok((entity_id, relation_id))
    }

    /// Handle an add-node request; a missing user id falls back to the default user.
    pub async fn add_node(&self, request: &AddNodeRequest) -> Result<AddNodeResponse> {
        if request.link.trim().is_empty() {
            return Err(EngineError::Validation(
                "Missing required fields: graph_id, source_node_id, new_node or link".into(),
            ));
        }
        let user_id = self.user_or_default(request.new_node.user_id.as_deref());
        let scope = Scope {
            graph_id: GraphId::new(request.graph_id.clone()),
            user_id,
        };
        let source = EntityId::new(request.source_node_id.clone());
        let write = linked_write(&scope, &source, &request.new_node, &request.link)?;

        let (entity_id, relation_id) = self
            .add_single_entity(&scope, &source, &request.new_node, &request.link)
            .await?;

        Ok(AddNodeResponse {
            success: true,
            message: format!(
                "New node connected to {} with relationship: {}",
                request.source_node_id, request.link
            ),
            node: NodeView {
                id: entity_id.0.clone(),
                name: write.name,
                entity_type: write.entity_type,
                graph_id: scope.graph_id.clone(),
                user_id: scope.user_id.clone(),
                first_seen: None,
                last_seen: None,
            },
            relationship: LinkView {
                id: relation_id,
                graph_id: scope.graph_id.clone(),
                user_id: scope.user_id.clone(),
                source: source.0,
                target: entity_id.0,
                rel_type: write.rel_type.to_string(),
                label: if write.verb.is_empty() {
                    write.rel_type.to_string()
                } else {
                    write.verb
                },
                similarity: write.similarity,
            },
        })
    }

    // ── Deletes ──────────────────────────────────────────────────

    /// Delete one entity and its incident relations. False when absent.
    pub async fn delete_entity(&self, scope: &Scope, id: &EntityId) -> Result<bool> {
        scope.validate()?;
        let deleted = self.store.delete_entity(scope, id).await?;
        if deleted {
            tracing::info!(scope = %scope, entity_id = %id, "Entity deleted");
        } else {
            tracing::debug!(scope = %scope, entity_id = %id, "Entity not found for delete");
        }
        Ok(deleted)
    }

    /// Delete a graph for every owner. Administrative; no-op when absent.
    pub async fn delete_graph(&self, graph_id: &GraphId) -> Result<u64> {
        require_graph(graph_id)?;
        let removed = self.store.delete_graph(graph_id, None).await?;
        tracing::info!(graph_id = %graph_id, entities = removed, "Graph deleted");
        Ok(removed)
    }

    /// Delete one owner's slice of a graph.
    pub async fn delete_graph_scoped(&self, scope: &Scope) -> Result<u64> {
        scope.validate()?;
        let removed = self
            .store
            .delete_graph(&scope.graph_id, Some(&scope.user_id))
            .await?;
        tracing::info!(scope = %scope, entities = removed, "Graph deleted");
        Ok(removed)
    }

    pub async fn delete_user_graphs(&self, user_id: &UserId) -> Result<u64> {
        require_user(user_id)?;
        let removed = self.store.delete_user(user_id).await?;
        tracing::info!(user_id = %user_id, entities = removed, "User graphs deleted");
        Ok(removed)
    }

    pub async fn delete_all(&self) -> Result<u64> {
        let removed = self.store.delete_all().await?;
        tracing::warn!(entities = removed, "All graphs deleted");
        Ok(removed)
    }
}

/// Build the store write for a single-node add, applying defaults.
fn linked_write(
    scope: &Scope,
    source: &EntityId,
    new_entity: &NewNode,
    relation_label: &str,
) -> Result<LinkedEntityWrite> {
    let rel_type = RelationType::sanitize(relation_label)
        .map_err(|e| EngineError::Validation(e.to_string()))?;
    let verb = new_entity
        .verb
        .clone()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| relation_label.to_string());

    Ok(LinkedEntityWrite {
        scope: scope.clone(),
        source: source.clone(),
        name: non_blank(new_entity.name.as_deref(), DEFAULT_ENTITY_NAME),
        entity_type: non_blank(new_entity.entity_type.as_deref(), DEFAULT_ENTITY_TYPE),
        rel_type,
        verb,
        similarity: clamp_similarity(new_entity.similarity.unwrap_or(0.0)),
    })
}

fn non_blank(value: Option<&str>, fallback: &str) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.to_string(),
        _ => fallback.to_string(),
    }
}

fn skip(report: &mut SkipReport, relation: &Relation, reason: SkipReason) {
    tracing::warn!(
        graph_id = %relation.graph_id,
        user_id = %relation.user_id,
        source = %relation.source,
        target = %relation.target,
        label = %relation.label,
        reason = ?reason,
        "Skipping relation"
    );
    report.skipped.push(SkippedRelation {
        source: relation.source.0.clone(),
        target: relation.target.0.clone(),
        label: relation.label.clone(),
        reason,
    });
}

/// Run a store write, retrying once when it loses an id or key race.
async fn retry_on_conflict<T, F, Fut>(mut op: F) -> std::result::Result<T, GraphError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, GraphError>>,
{
    match op().await {
        Err(e) if e.is_conflict() => {
            tracing::debug!(error = %e, "Write conflict, retrying once");
            op().await
        }
        other => other,
    }
}
