//! Export of assembled views as JSON documents.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;

use kgraph_core::{GraphId, UserId};
use kgraph_graph::GraphStore;

use crate::assemble::GraphSelector;
use crate::error::Result;
use crate::types::{Assembled, LinkView, NodeView};
use crate::KnowledgeGraph;

/// Output shape of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// The `nodes/links` view, as returned by the query paths.
    #[default]
    Graph,
    /// Flat `[{node1, relationship, node2}]` list, one entry per edge.
    Triples,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "graph" => Ok(Self::Graph),
            "triples" => Ok(Self::Triples),
            other => Err(format!("unknown export format: {other} (expected graph or triples)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripleRelationship {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub verb: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Triple {
    pub node1: NodeView,
    pub relationship: TripleRelationship,
    pub node2: NodeView,
}

/// A rendered export.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExportDocument {
    Graph(Assembled),
    Triples(Vec<Triple>),
}

impl<S: GraphStore> KnowledgeGraph<S> {
    /// Assemble the selected view and render it in `format`.
    pub async fn export(
        &self,
        selector: &GraphSelector,
        format: ExportFormat,
    ) -> Result<ExportDocument> {
        let assembled = self.assemble(selector).await?;
        Ok(match format {
            ExportFormat::Graph => ExportDocument::Graph(assembled),
            ExportFormat::Triples => ExportDocument::Triples(to_triples(&assembled)),
        })
    }

    /// Export to a pretty-printed UTF-8 JSON file.
    pub async fn write_export(
        &self,
        path: &Path,
        selector: &GraphSelector,
        format: ExportFormat,
    ) -> Result<()> {
        let document = self.export(selector, format).await?;
        let bytes = serde_json::to_vec_pretty(&document)?;
        tokio::fs::write(path, &bytes).await?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "Export written");
        Ok(())
    }
}

/// One triple per link whose endpoints are both in the same block and in
/// the link's own scope.
pub fn to_triples(assembled: &Assembled) -> Vec<Triple> {
    match assembled {
        Assembled::Graph(view) => block_triples(&view.nodes, &view.links),
        Assembled::Graphs(blocks) => blocks
            .iter()
            .flat_map(|b| block_triples(&b.nodes, &b.links))
            .collect(),
    }
}

type ScopedKey<'a> = (&'a GraphId, &'a UserId, &'a str);

fn block_triples(nodes: &[NodeView], links: &[LinkView]) -> Vec<Triple> {
    let mut by_key: HashMap<ScopedKey<'_>, &NodeView> = HashMap::with_capacity(nodes.len());
    for node in nodes {
        by_key
            .entry((&node.graph_id, &node.user_id, node.key()))
            .or_insert(node);
    }

    links
        .iter()
        .filter_map(|link| {
            let node1 = by_key.get(&(&link.graph_id, &link.user_id, link.source.as_str()))?;
            let node2 = by_key.get(&(&link.graph_id, &link.user_id, link.target.as_str()))?;
            Some(Triple {
                node1: (*node1).clone(),
                relationship: TripleRelationship {
                    rel_type: link.rel_type.clone(),
                    verb: link.label.clone(),
                    similarity: link.similarity,
                },
                node2: (*node2).clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(user: &str, id: &str, name: &str) -> NodeView {
        NodeView {
            id: id.into(),
            name: name.into(),
            entity_type: "Person".into(),
            graph_id: GraphId::new("shared"),
            user_id: UserId::new(user),
            first_seen: None,
            last_seen: None,
        }
    }

    #[test]
    fn triples_join_nodes_in_the_link_scope() {
        let nodes = vec![
            node("alice", "e1", "AliceA"),
            node("alice", "e2", "AliceB"),
            node("bob", "e1", "BobA"),
            node("bob", "e2", "BobB"),
        ];
        let link = LinkView {
            id: kgraph_core::RelationId(1),
            graph_id: GraphId::new("shared"),
            user_id: UserId::new("bob"),
            source: "e1".into(),
            target: "e2".into(),
            rel_type: "KNOWS".into(),
            label: "knows".into(),
            similarity: 0.0,
        };
        let orphan = LinkView {
            user_id: UserId::new("carol"),
            ..link.clone()
        };

        let triples = block_triples(&nodes, &[link, orphan]);
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].node1.name, "BobA");
        assert_eq!(triples[0].node2.name, "BobB");
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("Triples".parse::<ExportFormat>(), Ok(ExportFormat::Triples));
        assert_eq!("graph".parse::<ExportFormat>(), Ok(ExportFormat::Graph));
        assert!("csv".parse::<ExportFormat>().is_err());
    }
}
