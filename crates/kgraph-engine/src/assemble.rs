//! Subgraph assembly: node/link views for presentation.

use std::collections::HashSet;

use kgraph_core::{GraphId, RelationId, UserId};
use kgraph_graph::{GraphStore, SubgraphRecords};

use crate::error::{EngineError, Result};
use crate::tenancy::{require_graph, require_user};
use crate::types::{Assembled, GraphView, LinkView, NodeView, SearchHit, UserGraphView};
use crate::KnowledgeGraph;

/// Which view to build. Precedence: graph id, then user id, then keyword,
/// else everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphSelector {
    /// One graph; narrowed to a single owner when one is given.
    Graph {
        graph_id: GraphId,
        owner: Option<UserId>,
    },
    User(UserId),
    Keyword {
        keyword: String,
        owner: Option<UserId>,
    },
    All,
}

impl GraphSelector {
    /// Dispatch from optional request parameters. Blank values count as absent.
    /// A user id alongside a graph id narrows that graph to the user.
    pub fn from_params(
        graph_id: Option<&str>,
        user_id: Option<&str>,
        keyword: Option<&str>,
    ) -> Self {
        let owner = present(user_id).map(UserId::new);

        if let Some(g) = present(graph_id) {
            return Self::Graph {
                graph_id: GraphId::new(g),
                owner,
            };
        }
        if let Some(u) = owner {
            return Self::User(u);
        }
        match present(keyword) {
            Some(k) => Self::Keyword {
                keyword: k.to_string(),
                owner: None,
            },
            None => Self::All,
        }
    }
}

impl<S: GraphStore> KnowledgeGraph<S> {
    /// Build the view named by `selector`.
    pub async fn assemble(&self, selector: &GraphSelector) -> Result<Assembled> {
        Ok(match selector {
            GraphSelector::Graph { graph_id, owner } => {
                Assembled::Graph(self.assemble_by_graph(graph_id, owner.as_ref()).await?)
            }
            GraphSelector::User(user_id) => {
                Assembled::Graphs(self.assemble_by_user(user_id).await?)
            }
            GraphSelector::Keyword { keyword, owner } => {
                Assembled::Graph(self.assemble_by_keyword(keyword, owner.as_ref()).await?)
            }
            GraphSelector::All => Assembled::Graphs(self.assemble_all().await?),
        })
    }

    /// All entities of a graph as nodes and every edge between two of them.
    /// Isolated entities are still returned.
    pub async fn assemble_by_graph(
        &self,
        graph_id: &GraphId,
        owner: Option<&UserId>,
    ) -> Result<GraphView> {
        require_graph(graph_id)?;
        let records = self.store.fetch_graph(graph_id, owner).await?;
        Ok(to_view(records))
    }

    /// One `{graph_id, nodes, links}` block per graph the user owns.
    pub async fn assemble_by_user(&self, user_id: &UserId) -> Result<Vec<UserGraphView>> {
        require_user(user_id)?;
        let graph_ids = self.store.graph_ids(Some(user_id)).await?;
        let mut blocks = Vec::with_capacity(graph_ids.len());
        for graph_id in graph_ids {
            let view = self.assemble_by_graph(&graph_id, Some(user_id)).await?;
            blocks.push(UserGraphView {
                graph_id,
                nodes: view.nodes,
                links: view.links,
            });
        }
        Ok(blocks)
    }

    /// Bounded traversal from every entity with a property value containing
    /// `keyword`, merged into one deduplicated view.
    pub async fn assemble_by_keyword(
        &self,
        keyword: &str,
        owner: Option<&UserId>,
    ) -> Result<GraphView> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(EngineError::Validation("keyword must not be empty".into()));
        }
        let records = self
            .store
            .keyword_neighborhood(keyword, owner, self.search_hops)
            .await?;
        Ok(dedup(to_view(records)))
    }

    /// Every graph in the store, across all owners. Administrative.
    pub async fn assemble_all(&self) -> Result<Vec<UserGraphView>> {
        let graph_ids = self.store.graph_ids(None).await?;
        let mut blocks = Vec::with_capacity(graph_ids.len());
        for graph_id in graph_ids {
            let view = self.assemble_by_graph(&graph_id, None).await?;
            blocks.push(UserGraphView {
                graph_id,
                nodes: view.nodes,
                links: view.links,
            });
        }
        tracing::debug!(graphs = blocks.len(), "Assembled full dump");
        Ok(blocks)
    }

    /// Entities of the keyword neighborhood as search hits.
    pub async fn search(&self, keyword: &str, owner: Option<&UserId>) -> Result<Vec<SearchHit>> {
        let view = self.assemble_by_keyword(keyword, owner).await?;
        Ok(view.nodes.into_iter().map(SearchHit::from).collect())
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn to_view(records: SubgraphRecords) -> GraphView {
    GraphView {
        nodes: records.entities.into_iter().map(NodeView::from).collect(),
        links: records.relations.into_iter().map(LinkView::from).collect(),
    }
}

/// Drop repeated nodes (by scope and id) and links (by scope and id).
fn dedup(view: GraphView) -> GraphView {
    let mut seen_nodes: HashSet<(GraphId, UserId, String)> = HashSet::new();
    let nodes = view
        .nodes
        .into_iter()
        .filter(|n| seen_nodes.insert((n.graph_id.clone(), n.user_id.clone(), n.id.clone())))
        .collect();

    let mut seen_links: HashSet<(GraphId, UserId, RelationId)> = HashSet::new();
    let links = view
        .links
        .into_iter()
        .filter(|l| seen_links.insert((l.graph_id.clone(), l.user_id.clone(), l.id)))
        .collect();

    GraphView { nodes, links }
}
