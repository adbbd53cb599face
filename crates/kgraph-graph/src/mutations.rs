//! Write operations for the knowledge graph.
//!
//! Entities are upserted with MERGE on their full (id, graph_id, user_id)
//! key. Relation ids and single-add entity ids are allocated server-side in
//! the same statement that creates the record, after taking the graph's
//! `GraphLock` node; the entity uniqueness constraint turns any remaining
//! race into a detectable conflict.

use chrono::Utc;
use neo4rs::query;

use kgraph_core::{Entity, EntityId, GraphId, RelationId, Scope, UserId};

use crate::client::{GraphClient, GraphError};
use crate::store::{LinkedEntityWrite, RelationOutcome, RelationWrite};

/// Placeholder passed for "no owner filter"; blank user ids never reach the store.
pub(crate) const ANY_OWNER: &str = "";

/// Cypher fragment computing the next relation id of `$graph_id` into `next_relation`.
/// Expects the graph lock to be held and `carry` to be the variables kept in scope.
fn next_relation_clause(carry: &str) -> String {
    format!(
        "OPTIONAL MATCH (:Entity {{graph_id: $graph_id}})-[x]->(:Entity {{graph_id: $graph_id}})
         WHERE x.graph_id = $graph_id AND toString(x.id) =~ '[0-9]+'
         WITH {carry}, coalesce(max(toInteger(x.id)), 0) + 1 AS next_relation"
    )
}

impl GraphClient {
    // ── Entity Upserts ───────────────────────────────────────────

    /// Upsert an entity. Name and type are updated in place on match.
    pub async fn upsert_entity(&self, entity: &Entity) -> Result<(), GraphError> {
        let q = query(
            "MERGE (n:Entity {id: $id, graph_id: $graph_id, user_id: $user_id})
             ON CREATE SET
               n.name = $name, n.type = $type,
               n.first_seen = $now, n.last_seen = $now
             ON MATCH SET
               n.name = $name, n.type = $type,
               n.last_seen = $now",
        )
        .param("id", entity.id.0.clone())
        .param("graph_id", entity.graph_id.0.clone())
        .param("user_id", entity.user_id.0.clone())
        .param("name", entity.name.clone())
        .param("type", entity.entity_type.clone())
        .param("now", Utc::now().to_rfc3339());

        self.run(q)
            .await
            .map_err(|e| reclassify(e, entity.graph_id.as_str()))
    }

    // ── Relation Upserts ─────────────────────────────────────────

    /// Create-or-merge a directed edge between two entities of one scope.
    ///
    /// The structural type has already been sanitized, so it is safe to
    /// splice into the query text. Verb and similarity are first-write-wins.
    pub async fn merge_relation(
        &self,
        relation: &RelationWrite,
    ) -> Result<Option<RelationOutcome>, GraphError> {
        let rel_type = relation.rel_type.as_str();
        let next = next_relation_clause("a, b");
        let cypher = format!(
            "MATCH (a:Entity {{id: $source_id, graph_id: $graph_id, user_id: $user_id}})
             MATCH (b:Entity {{id: $target_id, graph_id: $graph_id, user_id: $user_id}})
             MERGE (lock:GraphLock {{graph_id: $graph_id}})
             SET lock.touched_at = $now
             WITH a, b
             {next}
             MERGE (a)-[r:{rel_type} {{graph_id: $graph_id, user_id: $user_id}}]->(b)
             ON CREATE SET
               r.id = next_relation, r.verb = $verb,
               r.similarity = $similarity, r.created_at = $now
             RETURN r.id AS relation_id, r.id = next_relation AS created"
        );

        let q = query(&cypher)
            .param("graph_id", relation.scope.graph_id.0.clone())
            .param("user_id", relation.scope.user_id.0.clone())
            .param("source_id", relation.source.0.clone())
            .param("target_id", relation.target.0.clone())
            .param("verb", relation.verb.clone())
            .param("similarity", relation.similarity)
            .param("now", Utc::now().to_rfc3339());

        let Some(row) = self
            .query_one_guarded(q, relation.scope.graph_id.as_str())
            .await?
        else {
            return Ok(None);
        };

        let id: i64 = row.get("relation_id").map_err(|e| {
            GraphError::Serialization(format!("Failed to read relation id: {e}"))
        })?;
        let created: bool = row.get("created").unwrap_or(false);
        Ok(Some(RelationOutcome {
            id: RelationId(id.max(0) as u64),
            created,
        }))
    }

    // ── Single-Node Add ──────────────────────────────────────────

    /// Allocate ids, create the entity, and link it from `source` in one statement.
    pub async fn create_linked_entity(
        &self,
        write: &LinkedEntityWrite,
    ) -> Result<Option<(EntityId, RelationId)>, GraphError> {
        let rel_type = write.rel_type.as_str();
        let next = next_relation_clause("src, next_entity");
        let cypher = format!(
            "MATCH (src:Entity {{id: $source_id, graph_id: $graph_id, user_id: $user_id}})
             MERGE (lock:GraphLock {{graph_id: $graph_id}})
             SET lock.touched_at = $now
             WITH src
             OPTIONAL MATCH (e:Entity {{graph_id: $graph_id, user_id: $user_id}})
             WHERE e.id =~ 'e[0-9]+'
             WITH src, coalesce(max(toInteger(substring(e.id, 1))), 0) + 1 AS next_entity
             {next}
             CREATE (n:Entity {{
               id: 'e' + toString(next_entity), graph_id: $graph_id, user_id: $user_id,
               name: $name, type: $type, first_seen: $now, last_seen: $now
             }})
             CREATE (src)-[r:{rel_type} {{
               id: next_relation, graph_id: $graph_id, user_id: $user_id,
               verb: $verb, similarity: $similarity, created_at: $now
             }}]->(n)
             RETURN n.id AS entity_id, r.id AS relation_id"
        );

        let q = query(&cypher)
            .param("graph_id", write.scope.graph_id.0.clone())
            .param("user_id", write.scope.user_id.0.clone())
            .param("source_id", write.source.0.clone())
            .param("name", write.name.clone())
            .param("type", write.entity_type.clone())
            .param("verb", write.verb.clone())
            .param("similarity", write.similarity)
            .param("now", Utc::now().to_rfc3339());

        let Some(row) = self
            .query_one_guarded(q, write.scope.graph_id.as_str())
            .await?
        else {
            return Ok(None);
        };

        let entity_id: String = row
            .get("entity_id")
            .map_err(|e| GraphError::Serialization(format!("Failed to read entity id: {e}")))?;
        let relation_id: i64 = row.get("relation_id").map_err(|e| {
            GraphError::Serialization(format!("Failed to read relation id: {e}"))
        })?;

        Ok(Some((
            EntityId(entity_id),
            RelationId(relation_id.max(0) as u64),
        )))
    }

    // ── Deletes ──────────────────────────────────────────────────

    /// Delete one entity and its incident relations.
    pub async fn delete_entity(&self, scope: &Scope, id: &EntityId) -> Result<bool, GraphError> {
        let q = query(
            "MATCH (n:Entity {id: $id, graph_id: $graph_id, user_id: $user_id})
             DETACH DELETE n
             RETURN count(n) AS cnt",
        )
        .param("id", id.0.clone())
        .param("graph_id", scope.graph_id.0.clone())
        .param("user_id", scope.user_id.0.clone());

        Ok(self.count_from(q).await? > 0)
    }

    /// Delete a graph's entities (all owners when `owner` is None).
    pub async fn delete_graph(
        &self,
        graph_id: &GraphId,
        owner: Option<&UserId>,
    ) -> Result<u64, GraphError> {
        let q = query(
            "MATCH (n:Entity {graph_id: $graph_id})
             WHERE $user_id = '' OR n.user_id = $user_id
             DETACH DELETE n
             RETURN count(n) AS cnt",
        )
        .param("graph_id", graph_id.0.clone())
        .param("user_id", owner_param(owner));

        let deleted = self.count_from(q).await?;

        if owner.is_none() {
            let q = query("MATCH (l:GraphLock {graph_id: $graph_id}) DELETE l")
                .param("graph_id", graph_id.0.clone());
            self.run(q).await?;
        }

        Ok(deleted)
    }

    /// Delete every entity owned by a user.
    pub async fn delete_user(&self, user_id: &UserId) -> Result<u64, GraphError> {
        let q = query(
            "MATCH (n:Entity {user_id: $user_id})
             DETACH DELETE n
             RETURN count(n) AS cnt",
        )
        .param("user_id", user_id.0.clone());

        self.count_from(q).await
    }

    /// Delete every entity, relation, and lock node.
    pub async fn delete_all(&self) -> Result<u64, GraphError> {
        let deleted = self
            .count_from(query("MATCH (n:Entity) DETACH DELETE n RETURN count(n) AS cnt"))
            .await?;
        self.run(query("MATCH (l:GraphLock) DELETE l")).await?;
        Ok(deleted)
    }

    /// Run a query returning a single `cnt` column.
    pub(crate) async fn count_from(&self, q: neo4rs::Query) -> Result<u64, GraphError> {
        match self.query_one(q).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0).max(0) as u64),
            None => Ok(0),
        }
    }
}

/// Owner filter parameter value.
pub(crate) fn owner_param(owner: Option<&UserId>) -> String {
    owner
        .map(|u| u.0.clone())
        .unwrap_or_else(|| ANY_OWNER.to_string())
}

fn reclassify(err: GraphError, graph_id: &str) -> GraphError {
    match err {
        GraphError::Query(e) => GraphError::classify(e, graph_id),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_param_uses_placeholder() {
        assert_eq!(owner_param(None), ANY_OWNER);
        assert_eq!(owner_param(Some(&UserId::new("u1"))), "u1");
    }

    #[test]
    fn next_relation_clause_carries_variables() {
        let clause = next_relation_clause("a, b");
        assert!(clause.contains("WITH a, b, coalesce(max(toInteger(x.id)), 0) + 1 AS next_relation"));
        assert!(clause.contains("x.graph_id = $graph_id"));
    }
}
