//! Read operations for the knowledge graph.

use chrono::{DateTime, Utc};
use neo4rs::query;

use kgraph_core::{
    Entity, EntityId, EntityRecord, GraphId, RelationId, Scope, StoredRelation, UserId,
};

use crate::client::{GraphClient, GraphError};
use crate::mutations::owner_param;
use crate::store::SubgraphRecords;

/// Columns every relation query returns, in this shape.
const RELATION_COLUMNS: &str = "toString(r.id) AS id, a.graph_id AS graph_id,
    a.user_id AS user_id, a.id AS source, b.id AS target, type(r) AS rel_type,
    r.verb AS verb, r.similarity AS similarity";

/// Start-node predicate shared by both halves of the keyword traversal.
const KEYWORD_START: &str = "MATCH (start:Entity)
     WHERE ($user_id = '' OR start.user_id = $user_id)
       AND any(k IN keys(start) WHERE toLower(toString(start[k])) CONTAINS $keyword)";

impl GraphClient {
    // ── Id Scans ─────────────────────────────────────────────────

    /// Every entity id in a scope.
    pub async fn entity_ids(&self, scope: &Scope) -> Result<Vec<String>, GraphError> {
        let q = query(
            "MATCH (n:Entity {graph_id: $graph_id, user_id: $user_id})
             RETURN n.id AS id",
        )
        .param("graph_id", scope.graph_id.0.clone())
        .param("user_id", scope.user_id.0.clone());

        let rows = self.query_rows(q).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get::<String>("id").ok())
            .collect())
    }

    /// Every relation id in a graph, rendered as strings.
    pub async fn relation_ids(&self, graph_id: &GraphId) -> Result<Vec<String>, GraphError> {
        let q = query(
            "MATCH (:Entity {graph_id: $graph_id})-[r]->(:Entity {graph_id: $graph_id})
             WHERE r.graph_id = $graph_id AND r.id IS NOT NULL
             RETURN toString(r.id) AS id",
        )
        .param("graph_id", graph_id.0.clone());

        let rows = self.query_rows(q).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get::<String>("id").ok())
            .collect())
    }

    // ── Tenancy ──────────────────────────────────────────────────

    /// Distinct graph ids, optionally for one owner.
    pub async fn graph_ids(&self, owner: Option<&UserId>) -> Result<Vec<GraphId>, GraphError> {
        let q = query(
            "MATCH (n:Entity)
             WHERE $user_id = '' OR n.user_id = $user_id
             RETURN DISTINCT n.graph_id AS graph_id
             ORDER BY graph_id",
        )
        .param("user_id", owner_param(owner));

        let rows = self.query_rows(q).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get::<String>("graph_id").ok())
            .map(GraphId)
            .collect())
    }

    pub async fn count_entities(
        &self,
        graph_id: &GraphId,
        owner: Option<&UserId>,
    ) -> Result<u64, GraphError> {
        let q = query(
            "MATCH (n:Entity {graph_id: $graph_id})
             WHERE $user_id = '' OR n.user_id = $user_id
             RETURN count(n) AS cnt",
        )
        .param("graph_id", graph_id.0.clone())
        .param("user_id", owner_param(owner));

        self.count_from(q).await
    }

    pub async fn count_relations(
        &self,
        graph_id: &GraphId,
        owner: Option<&UserId>,
    ) -> Result<u64, GraphError> {
        let q = query(
            "MATCH (a:Entity {graph_id: $graph_id})-[r]->(b:Entity {graph_id: $graph_id})
             WHERE ($user_id = '' OR a.user_id = $user_id)
               AND b.user_id = a.user_id AND r.graph_id = $graph_id
             RETURN count(r) AS cnt",
        )
        .param("graph_id", graph_id.0.clone())
        .param("user_id", owner_param(owner));

        self.count_from(q).await
    }

    // ── Subgraphs ────────────────────────────────────────────────

    /// All entities of a graph and all edges between two of them.
    pub async fn fetch_graph(
        &self,
        graph_id: &GraphId,
        owner: Option<&UserId>,
    ) -> Result<SubgraphRecords, GraphError> {
        let node_q = query(
            "MATCH (n:Entity {graph_id: $graph_id})
             WHERE $user_id = '' OR n.user_id = $user_id
             RETURN n
             ORDER BY n.user_id, n.id",
        )
        .param("graph_id", graph_id.0.clone())
        .param("user_id", owner_param(owner));

        let edge_q = query(&format!(
            "MATCH (a:Entity {{graph_id: $graph_id}})-[r]->(b:Entity {{graph_id: $graph_id}})
             WHERE ($user_id = '' OR a.user_id = $user_id)
               AND b.user_id = a.user_id AND r.graph_id = $graph_id
             RETURN {RELATION_COLUMNS}"
        ))
        .param("graph_id", graph_id.0.clone())
        .param("user_id", owner_param(owner));

        let entities = self.entity_rows(node_q, "n").await?;
        let relations = self.relation_rows(edge_q).await?;
        tracing::debug!(
            graph_id = %graph_id,
            nodes = entities.len(),
            links = relations.len(),
            "Fetched graph"
        );
        Ok(SubgraphRecords {
            entities,
            relations,
        })
    }

    /// Keyword-seeded traversal, bounded to `max_hops`.
    pub async fn keyword_neighborhood(
        &self,
        keyword: &str,
        owner: Option<&UserId>,
        max_hops: u32,
    ) -> Result<SubgraphRecords, GraphError> {
        let keyword = keyword.to_lowercase();

        let node_q = query(&format!(
            "{KEYWORD_START}
             MATCH (start)-[*0..{max_hops}]-(n:Entity)
             RETURN DISTINCT n"
        ))
        .param("keyword", keyword.clone())
        .param("user_id", owner_param(owner));
        let entities = self.entity_rows(node_q, "n").await?;

        let relations = if max_hops == 0 {
            Vec::new()
        } else {
            let edge_q = query(&format!(
                "{KEYWORD_START}
                 MATCH p = (start)-[*1..{max_hops}]-(:Entity)
                 UNWIND relationships(p) AS r
                 WITH DISTINCT r
                 WITH r, startNode(r) AS a, endNode(r) AS b
                 RETURN {RELATION_COLUMNS}"
            ))
            .param("keyword", keyword.clone())
            .param("user_id", owner_param(owner));
            self.relation_rows(edge_q).await?
        };

        tracing::debug!(
            keyword = %keyword,
            nodes = entities.len(),
            links = relations.len(),
            "Keyword traversal"
        );
        Ok(SubgraphRecords {
            entities,
            relations,
        })
    }

    // ── Row Conversion ───────────────────────────────────────────

    async fn entity_rows(
        &self,
        q: neo4rs::Query,
        column: &str,
    ) -> Result<Vec<EntityRecord>, GraphError> {
        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let node: neo4rs::Node = row.get(column).map_err(|e| {
                GraphError::Serialization(format!("Failed to deserialize node: {e}"))
            })?;
            results.push(neo4j_node_to_entity(&node));
        }
        Ok(results)
    }

    async fn relation_rows(&self, q: neo4rs::Query) -> Result<Vec<StoredRelation>, GraphError> {
        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let raw_id: String = row.get("id").unwrap_or_default();
            let Ok(id) = raw_id.parse::<u64>() else {
                tracing::warn!(id = %raw_id, "Skipping relation with non-numeric id");
                continue;
            };
            results.push(StoredRelation {
                id: RelationId(id),
                graph_id: GraphId(row.get("graph_id").unwrap_or_default()),
                user_id: UserId(row.get("user_id").unwrap_or_default()),
                source: EntityId(row.get("source").unwrap_or_default()),
                target: EntityId(row.get("target").unwrap_or_default()),
                rel_type: row.get("rel_type").unwrap_or_default(),
                verb: row.get("verb").unwrap_or_default(),
                similarity: row.get("similarity").unwrap_or(0.0),
            });
        }
        Ok(results)
    }
}

/// Convert a neo4rs::Node to an EntityRecord.
fn neo4j_node_to_entity(node: &neo4rs::Node) -> EntityRecord {
    EntityRecord {
        entity: Entity {
            id: EntityId(node.get("id").unwrap_or_default()),
            graph_id: GraphId(node.get("graph_id").unwrap_or_default()),
            user_id: UserId(node.get("user_id").unwrap_or_default()),
            name: node.get("name").unwrap_or_default(),
            entity_type: node.get("type").unwrap_or_default(),
        },
        first_seen: timestamp(node, "first_seen"),
        last_seen: timestamp(node, "last_seen"),
    }
}

fn timestamp(node: &neo4rs::Node, key: &str) -> Option<DateTime<Utc>> {
    let raw: String = node.get(key).ok()?;
    DateTime::parse_from_rfc3339(&raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
