//! In-process graph store.
//!
//! Mirrors the Neo4j backend's semantics: entities keyed by
//! (graph_id, user_id, id), relations keyed by (graph_id, id) and merged on
//! (source, target, type, scope). Every mutation holds the write lock for
//! its whole read-allocate-create sequence, which makes it atomic.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use kgraph_core::{
    ids, Entity, EntityId, EntityRecord, GraphId, RelationId, Scope, StoredRelation, UserId,
};

use crate::client::GraphError;
use crate::store::{GraphStore, LinkedEntityWrite, RelationOutcome, RelationWrite, SubgraphRecords};

type EntityKey = (GraphId, UserId, EntityId);
type RelationKey = (GraphId, RelationId);

#[derive(Debug, Default)]
struct Inner {
    entities: BTreeMap<EntityKey, EntityRecord>,
    relations: BTreeMap<RelationKey, StoredRelation>,
}

impl Inner {
    fn has_entity(&self, scope: &Scope, id: &EntityId) -> bool {
        self.entities.contains_key(&entity_key(scope, id))
    }

    fn next_relation_id(&self, graph_id: &GraphId) -> Result<RelationId, GraphError> {
        let max = self
            .relations
            .keys()
            .filter(|(g, _)| g == graph_id)
            .map(|(_, id)| id.0)
            .max()
            .unwrap_or(0);
        Ok(RelationId(ids::successor(max, "relation")?))
    }

    fn insert_relation(&mut self, relation: StoredRelation) -> Result<(), GraphError> {
        let key = (relation.graph_id.clone(), relation.id);
        if self.relations.contains_key(&key) {
            return Err(GraphError::Conflict {
                graph_id: relation.graph_id.0.clone(),
                detail: format!("relation id {} already exists", relation.id),
            });
        }
        self.relations.insert(key, relation);
        Ok(())
    }

    /// Remove matching entities and every relation touching one of them.
    fn remove_entities<F>(&mut self, pred: F) -> u64
    where
        F: Fn(&EntityKey) -> bool,
    {
        let doomed: HashSet<EntityKey> = self.entities.keys().filter(|k| pred(k)).cloned().collect();
        if doomed.is_empty() {
            return 0;
        }
        self.relations.retain(|_, r| {
            let source = (r.graph_id.clone(), r.user_id.clone(), r.source.clone());
            let target = (r.graph_id.clone(), r.user_id.clone(), r.target.clone());
            !doomed.contains(&source) && !doomed.contains(&target)
        });
        self.entities.retain(|k, _| !doomed.contains(k));
        doomed.len() as u64
    }

    fn scoped_relations<'a>(
        &'a self,
        graph_id: &'a GraphId,
        owner: Option<&'a UserId>,
    ) -> impl Iterator<Item = &'a StoredRelation> + 'a {
        self.relations
            .values()
            .filter(move |r| &r.graph_id == graph_id && owner.map_or(true, |u| &r.user_id == u))
    }
}

/// In-memory [`GraphStore`]. Clone shares the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn entity_key(scope: &Scope, id: &EntityId) -> EntityKey {
    (scope.graph_id.clone(), scope.user_id.clone(), id.clone())
}

fn relation_endpoint_keys(r: &StoredRelation) -> (EntityKey, EntityKey) {
    (
        (r.graph_id.clone(), r.user_id.clone(), r.source.clone()),
        (r.graph_id.clone(), r.user_id.clone(), r.target.clone()),
    )
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<(), GraphError> {
        Ok(())
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<(), GraphError> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let key = entity_key(&entity.scope(), &entity.id);
        inner
            .entities
            .entry(key)
            .and_modify(|rec| {
                rec.entity.name = entity.name.clone();
                rec.entity.entity_type = entity.entity_type.clone();
                rec.last_seen = Some(now);
            })
            .or_insert_with(|| EntityRecord {
                entity: entity.clone(),
                first_seen: Some(now),
                last_seen: Some(now),
            });
        Ok(())
    }

    async fn merge_relation(
        &self,
        relation: &RelationWrite,
    ) -> Result<Option<RelationOutcome>, GraphError> {
        let mut inner = self.inner.write().await;
        let scope = &relation.scope;
        if !inner.has_entity(scope, &relation.source) || !inner.has_entity(scope, &relation.target)
        {
            return Ok(None);
        }

        let existing = inner.relations.values().find(|r| {
            r.graph_id == scope.graph_id
                && r.user_id == scope.user_id
                && r.source == relation.source
                && r.target == relation.target
                && r.rel_type == relation.rel_type.as_str()
        });
        if let Some(r) = existing {
            return Ok(Some(RelationOutcome {
                id: r.id,
                created: false,
            }));
        }

        let id = inner.next_relation_id(&scope.graph_id)?;
        inner.insert_relation(StoredRelation {
            id,
            graph_id: scope.graph_id.clone(),
            user_id: scope.user_id.clone(),
            source: relation.source.clone(),
            target: relation.target.clone(),
            rel_type: relation.rel_type.to_string(),
            verb: relation.verb.clone(),
            similarity: relation.similarity,
        })?;
        Ok(Some(RelationOutcome { id, created: true }))
    }

    async fn create_linked_entity(
        &self,
        write: &LinkedEntityWrite,
    ) -> Result<Option<(EntityId, RelationId)>, GraphError> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let scope = &write.scope;
        if !inner.has_entity(scope, &write.source) {
            return Ok(None);
        }

        let entity_id = ids::next_entity_id(
            inner
                .entities
                .keys()
                .filter(|(g, u, _)| g == &scope.graph_id && u == &scope.user_id)
                .map(|(_, _, id)| id.as_str()),
        )?;
        let relation_id = inner.next_relation_id(&scope.graph_id)?;

        let key = entity_key(scope, &entity_id);
        if inner.entities.contains_key(&key) {
            return Err(GraphError::Conflict {
                graph_id: scope.graph_id.0.clone(),
                detail: format!("entity {entity_id} already exists"),
            });
        }
        inner.insert_relation(StoredRelation {
            id: relation_id,
            graph_id: scope.graph_id.clone(),
            user_id: scope.user_id.clone(),
            source: write.source.clone(),
            target: entity_id.clone(),
            rel_type: write.rel_type.to_string(),
            verb: write.verb.clone(),
            similarity: write.similarity,
        })?;
        inner.entities.insert(
            key,
            EntityRecord {
                entity: Entity {
                    id: entity_id.clone(),
                    graph_id: scope.graph_id.clone(),
                    user_id: scope.user_id.clone(),
                    name: write.name.clone(),
                    entity_type: write.entity_type.clone(),
                },
                first_seen: Some(now),
                last_seen: Some(now),
            },
        );
        Ok(Some((entity_id, relation_id)))
    }

    async fn delete_entity(&self, scope: &Scope, id: &EntityId) -> Result<bool, GraphError> {
        let mut inner = self.inner.write().await;
        let target = entity_key(scope, id);
        Ok(inner.remove_entities(|k| k == &target) > 0)
    }

    async fn delete_graph(
        &self,
        graph_id: &GraphId,
        owner: Option<&UserId>,
    ) -> Result<u64, GraphError> {
        let mut inner = self.inner.write().await;
        Ok(inner.remove_entities(|(g, u, _)| g == graph_id && owner.map_or(true, |o| u == o)))
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<u64, GraphError> {
        let mut inner = self.inner.write().await;
        Ok(inner.remove_entities(|(_, u, _)| u == user_id))
    }

    async fn delete_all(&self) -> Result<u64, GraphError> {
        let mut inner = self.inner.write().await;
        let removed = inner.entities.len() as u64;
        inner.entities.clear();
        inner.relations.clear();
        Ok(removed)
    }

    async fn entity_ids(&self, scope: &Scope) -> Result<Vec<String>, GraphError> {
        let inner = self.inner.read().await;
        Ok(inner
            .entities
            .keys()
            .filter(|(g, u, _)| g == &scope.graph_id && u == &scope.user_id)
            .map(|(_, _, id)| id.0.clone())
            .collect())
    }

    async fn relation_ids(&self, graph_id: &GraphId) -> Result<Vec<String>, GraphError> {
        let inner = self.inner.read().await;
        Ok(inner
            .relations
            .keys()
            .filter(|(g, _)| g == graph_id)
            .map(|(_, id)| id.to_string())
            .collect())
    }

    async fn graph_ids(&self, owner: Option<&UserId>) -> Result<Vec<GraphId>, GraphError> {
        let inner = self.inner.read().await;
        let ids: BTreeSet<GraphId> = inner
            .entities
            .keys()
            .filter(|(_, u, _)| owner.map_or(true, |o| u == o))
            .map(|(g, _, _)| g.clone())
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn count_entities(
        &self,
        graph_id: &GraphId,
        owner: Option<&UserId>,
    ) -> Result<u64, GraphError> {
        let inner = self.inner.read().await;
        Ok(inner
            .entities
            .keys()
            .filter(|(g, u, _)| g == graph_id && owner.map_or(true, |o| u == o))
            .count() as u64)
    }

    async fn count_relations(
        &self,
        graph_id: &GraphId,
        owner: Option<&UserId>,
    ) -> Result<u64, GraphError> {
        let inner = self.inner.read().await;
        Ok(inner.scoped_relations(graph_id, owner).count() as u64)
    }

    async fn fetch_graph(
        &self,
        graph_id: &GraphId,
        owner: Option<&UserId>,
    ) -> Result<SubgraphRecords, GraphError> {
        let inner = self.inner.read().await;
        let entities = inner
            .entities
            .iter()
            .filter(|((g, u, _), _)| g == graph_id && owner.map_or(true, |o| u == o))
            .map(|(_, rec)| rec.clone())
            .collect();
        let relations = inner.scoped_relations(graph_id, owner).cloned().collect();
        Ok(SubgraphRecords {
            entities,
            relations,
        })
    }

    async fn keyword_neighborhood(
        &self,
        keyword: &str,
        owner: Option<&UserId>,
        max_hops: u32,
    ) -> Result<SubgraphRecords, GraphError> {
        let needle = keyword.to_lowercase();
        let inner = self.inner.read().await;

        let mut visited: BTreeSet<EntityKey> = inner
            .entities
            .iter()
            .filter(|((_, u, _), _)| owner.map_or(true, |o| u == o))
            .filter(|(_, rec)| {
                rec.property_values()
                    .iter()
                    .any(|v| v.to_lowercase().contains(&needle))
            })
            .map(|(k, _)| k.clone())
            .collect();
        let mut frontier = visited.clone();
        let mut touched: BTreeSet<RelationKey> = BTreeSet::new();

        for _ in 0..max_hops {
            if frontier.is_empty() {
                break;
            }
            let mut next = BTreeSet::new();
            for (key, r) in &inner.relations {
                let (source, target) = relation_endpoint_keys(r);
                let hit_source = frontier.contains(&source);
                let hit_target = frontier.contains(&target);
                if !hit_source && !hit_target {
                    continue;
                }
                touched.insert(key.clone());
                for end in [source, target] {
                    if !visited.contains(&end) {
                        next.insert(end);
                    }
                }
            }
            visited.extend(next.iter().cloned());
            frontier = next;
        }

        let entities = visited
            .iter()
            .filter_map(|k| inner.entities.get(k).cloned())
            .collect();
        let relations = touched
            .iter()
            .filter_map(|k| inner.relations.get(k).cloned())
            .collect();
        Ok(SubgraphRecords {
            entities,
            relations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgraph_core::RelationType;

    fn entity(scope: &Scope, id: &str, name: &str) -> Entity {
        Entity::new(EntityId::new(id), scope, name, "Person")
    }

    fn edge(scope: &Scope, source: &str, target: &str, label: &str) -> RelationWrite {
        RelationWrite {
            scope: scope.clone(),
            source: EntityId::new(source),
            target: EntityId::new(target),
            rel_type: RelationType::sanitize(label).unwrap(),
            verb: label.to_string(),
            similarity: 0.0,
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_updates_in_place() {
        let store = MemoryStore::new();
        let scope = Scope::new("g1", "u1");
        store.upsert_entity(&entity(&scope, "e1", "Alice")).await.unwrap();
        store.upsert_entity(&entity(&scope, "e1", "Alicia")).await.unwrap();

        assert_eq!(store.count_entities(&scope.graph_id, None).await.unwrap(), 1);
        let graph = store.fetch_graph(&scope.graph_id, None).await.unwrap();
        assert_eq!(graph.entities[0].entity.name, "Alicia");
        assert!(graph.entities[0].first_seen <= graph.entities[0].last_seen);
    }

    #[tokio::test]
    async fn merge_relation_is_first_write_wins() {
        let store = MemoryStore::new();
        let scope = Scope::new("g1", "u1");
        store.upsert_entity(&entity(&scope, "e1", "A")).await.unwrap();
        store.upsert_entity(&entity(&scope, "e2", "B")).await.unwrap();

        let first = store.merge_relation(&edge(&scope, "e1", "e2", "knows")).await.unwrap();
        let mut again = edge(&scope, "e1", "e2", "knows");
        again.verb = "overwritten".into();
        again.similarity = 0.9;
        let second = store.merge_relation(&again).await.unwrap();

        assert_eq!(first, Some(RelationOutcome { id: RelationId(1), created: true }));
        assert_eq!(second, Some(RelationOutcome { id: RelationId(1), created: false }));
        let graph = store.fetch_graph(&scope.graph_id, None).await.unwrap();
        assert_eq!(graph.relations.len(), 1);
        assert_eq!(graph.relations[0].verb, "knows");
        assert_eq!(graph.relations[0].similarity, 0.0);
    }

    #[tokio::test]
    async fn merge_relation_requires_endpoints_in_scope() {
        let store = MemoryStore::new();
        let mine = Scope::new("g1", "u1");
        let theirs = Scope::new("g1", "u2");
        store.upsert_entity(&entity(&mine, "e1", "A")).await.unwrap();
        store.upsert_entity(&entity(&theirs, "e2", "B")).await.unwrap();

        let outcome = store.merge_relation(&edge(&mine, "e1", "e2", "knows")).await.unwrap();
        assert!(outcome.is_none());
        assert_eq!(store.count_relations(&mine.graph_id, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn linked_entity_allocates_past_sparse_ids() {
        let store = MemoryStore::new();
        let scope = Scope::new("g1", "u1");
        for id in ["e1", "e3"] {
            store.upsert_entity(&entity(&scope, id, id)).await.unwrap();
        }
        let write = LinkedEntityWrite {
            scope: scope.clone(),
            source: EntityId::new("e1"),
            name: "New".into(),
            entity_type: "Node".into(),
            rel_type: RelationType::sanitize("contains").unwrap(),
            verb: "contains".into(),
            similarity: 0.0,
        };
        let (entity_id, relation_id) = store.create_linked_entity(&write).await.unwrap().unwrap();
        assert_eq!(entity_id.as_str(), "e4");
        assert_eq!(relation_id, RelationId(1));

        let missing = LinkedEntityWrite {
            source: EntityId::new("e42"),
            ..write
        };
        assert!(store.create_linked_entity(&missing).await.unwrap().is_none());
        assert_eq!(store.count_entities(&scope.graph_id, None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn linked_entity_refuses_exhausted_sequence() {
        let store = MemoryStore::new();
        let scope = Scope::new("g1", "u1");
        let top = format!("e{}", u64::MAX);
        store.upsert_entity(&entity(&scope, &top, "Top")).await.unwrap();

        let write = LinkedEntityWrite {
            scope: scope.clone(),
            source: EntityId::new(top),
            name: "Next".into(),
            entity_type: "Node".into(),
            rel_type: RelationType::sanitize("has").unwrap(),
            verb: "has".into(),
            similarity: 0.0,
        };
        let err = store.create_linked_entity(&write).await.unwrap_err();
        assert!(matches!(err, GraphError::Rejected(_)));
        assert_eq!(store.count_entities(&scope.graph_id, None).await.unwrap(), 1);
        assert_eq!(store.count_relations(&scope.graph_id, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_entity_cascades() {
        let store = MemoryStore::new();
        let scope = Scope::new("g1", "u1");
        for id in ["e1", "e2", "e3"] {
            store.upsert_entity(&entity(&scope, id, id)).await.unwrap();
        }
        store.merge_relation(&edge(&scope, "e1", "e2", "a")).await.unwrap();
        store.merge_relation(&edge(&scope, "e3", "e1", "b")).await.unwrap();
        store.merge_relation(&edge(&scope, "e2", "e3", "c")).await.unwrap();

        assert!(store.delete_entity(&scope, &EntityId::new("e1")).await.unwrap());
        assert!(!store.delete_entity(&scope, &EntityId::new("e1")).await.unwrap());
        let graph = store.fetch_graph(&scope.graph_id, None).await.unwrap();
        assert_eq!(graph.entities.len(), 2);
        assert_eq!(graph.relations.len(), 1);
        assert_eq!(graph.relations[0].rel_type, "C");
    }

    #[tokio::test]
    async fn keyword_traversal_is_bounded() {
        let store = MemoryStore::new();
        let scope = Scope::new("g1", "u1");
        // Chain: e1 - e2 - e3 - e4
        for (id, name) in [("e1", "Needle Corp"), ("e2", "b"), ("e3", "c"), ("e4", "d")] {
            store.upsert_entity(&entity(&scope, id, name)).await.unwrap();
        }
        store.merge_relation(&edge(&scope, "e1", "e2", "r")).await.unwrap();
        store.merge_relation(&edge(&scope, "e3", "e2", "r")).await.unwrap();
        store.merge_relation(&edge(&scope, "e3", "e4", "r")).await.unwrap();

        let hood = store.keyword_neighborhood("needle", None, 2).await.unwrap();
        let mut names: Vec<_> = hood.entities.iter().map(|e| e.entity.id.0.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["e1", "e2", "e3"]);
        assert_eq!(hood.relations.len(), 2);

        let none = store
            .keyword_neighborhood("needle", Some(&UserId::new("u2")), 2)
            .await
            .unwrap();
        assert!(none.entities.is_empty());
    }
}
