//! CLI entry point for the kgraph knowledge-graph service.
//!
//! Mirrors the HTTP surface: request bodies are read as JSON from stdin,
//! results are written as JSON to stdout, logs go to stderr.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use kgraph_core::{EntityId, Extraction, GraphId, KgConfig, Scope};
use kgraph_engine::types::{SearchResponse, StatusResponse};
use kgraph_engine::{
    AddNodeRequest, EngineError, ExportFormat, GraphSelector, KnowledgeGraph,
};
use kgraph_graph::{GraphClient, GraphConfig, GraphStore, MemoryStore};

#[derive(Parser)]
#[command(name = "kgraph")]
#[command(about = "Per-user knowledge graph store: ingest, query, search, export")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Owner for scoped commands (default: the configured default user).
    #[arg(long, global = true)]
    user_id: Option<String>,

    /// Config file prefix (default: kgraph).
    #[arg(short, long, default_value = "kgraph", global = true)]
    config: String,

    /// Smoke-test mode: run against an empty in-process store instead of
    /// Neo4j. Nothing is kept between invocations, so only write commands
    /// and their immediate output are meaningful.
    #[arg(long, global = true)]
    in_memory: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Write an extraction (JSON on stdin) into a graph.
    Ingest {
        /// Target graph; a fresh `<user>_<N>` id is allocated when omitted.
        #[arg(long)]
        graph_id: Option<String>,
    },
    /// Add a node linked from an existing one (AddNodeRequest JSON on stdin).
    AddNode,
    /// Delete a node and its relations.
    DeleteNode {
        #[arg(long)]
        graph_id: String,
        #[arg(long)]
        node_id: String,
    },
    /// Show one graph as nodes and links.
    Graph {
        #[arg(long)]
        graph_id: String,
    },
    /// Show every graph owned by the user.
    UserGraphs,
    /// List graph ids (the user's, or all when no user is given).
    ListGraphs,
    /// Keyword search over entities and their neighborhood.
    Search {
        keyword: String,
    },
    /// Export a graph, a user's graphs, or everything.
    Export {
        #[arg(long)]
        graph_id: Option<String>,
        /// graph or triples.
        #[arg(long, default_value = "graph")]
        format: ExportFormat,
        /// Write the export to this file instead of stdout.
        #[arg(long)]
        download: Option<PathBuf>,
    },
    /// Delete a graph (only the user's slice when --user-id is given).
    DeleteGraph {
        #[arg(long)]
        graph_id: String,
    },
    /// Delete every graph owned by the user.
    DeleteUser,
    /// Delete everything.
    DeleteAll,
    /// Print the next free graph id for the user.
    NextGraphId,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json_logs {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    let config = KgConfig::load(&cli.config)?;

    if cli.in_memory {
        tracing::warn!("In-memory store: state is discarded when this command exits");
        let kg = KnowledgeGraph::with_config(MemoryStore::new(), &config);
        run(&cli, &config, kg).await
    } else {
        let graph = GraphClient::connect(&GraphConfig::from(&config.neo4j)).await?;
        graph.ensure_schema().await?;
        let kg = KnowledgeGraph::with_config(graph, &config);
        run(&cli, &config, kg).await
    }
}

async fn run<S: GraphStore>(
    cli: &Cli,
    config: &KgConfig,
    kg: KnowledgeGraph<S>,
) -> anyhow::Result<()> {
    let user_id = kg.user_or_default(cli.user_id.as_deref());

    match &cli.command {
        Command::Ingest { graph_id } => {
            let extraction: Extraction = read_stdin_json()?;
            let report = match graph_id {
                Some(g) => {
                    let scope = Scope {
                        graph_id: GraphId::new(g.clone()),
                        user_id,
                    };
                    kg.create_graph(&extraction, &scope).await?
                }
                None => kg.create_graph_for_user(&extraction, &user_id).await?,
            };
            print_json(&report)?;
        }
        Command::AddNode => {
            let mut request: AddNodeRequest = read_stdin_json()?;
            if request.new_node.user_id.is_none() {
                request.new_node.user_id = cli.user_id.clone();
            }
            match kg.add_node(&request).await {
                Ok(response) => print_json(&response)?,
                Err(e) => fail(&format!("Error adding node: {e}"), &e)?,
            }
        }
        Command::DeleteNode { graph_id, node_id } => {
            let scope = Scope {
                graph_id: GraphId::new(graph_id.clone()),
                user_id,
            };
            match kg.delete_entity(&scope, &EntityId::new(node_id.clone())).await {
                Ok(true) => print_json(&StatusResponse {
                    success: true,
                    message: format!(
                        "Node {node_id} and its relationships deleted successfully from graph {graph_id}"
                    ),
                })?,
                Ok(false) => {
                    print_json(&StatusResponse {
                        success: false,
                        message: format!("Node {node_id} not found in graph {graph_id}"),
                    })?;
                    std::process::exit(exit_code(404));
                }
                Err(e) => fail(&format!("Error deleting node: {e}"), &e)?,
            }
        }
        Command::Graph { graph_id } => {
            let owner = cli.user_id.as_ref().map(|_| &user_id);
            let view = kg.assemble_by_graph(&GraphId::new(graph_id.clone()), owner).await?;
            print_json(&view)?;
        }
        Command::UserGraphs => {
            print_json(&kg.assemble_by_user(&user_id).await?)?;
        }
        Command::ListGraphs => {
            let ids = match cli.user_id {
                Some(_) => kg.list_graph_ids(&user_id).await?,
                None => kg.list_all_graph_ids().await?,
            };
            print_json(&ids)?;
        }
        Command::Search { keyword } => {
            let owner = cli.user_id.as_ref().map(|_| &user_id);
            let results = kg.search(keyword, owner).await?;
            print_json(&SearchResponse { results })?;
        }
        Command::Export {
            graph_id,
            format,
            download,
        } => {
            let selector =
                GraphSelector::from_params(graph_id.as_deref(), cli.user_id.as_deref(), None);
            match download {
                Some(path) => {
                    let path = if path.is_dir() {
                        path.join(&config.export_file_name)
                    } else {
                        path.clone()
                    };
                    kg.write_export(&path, &selector, *format).await?;
                    print_json(&serde_json::json!({ "file": path.display().to_string() }))?;
                }
                None => print_json(&kg.export(&selector, *format).await?)?,
            }
        }
        Command::DeleteGraph { graph_id } => {
            let graph_id = GraphId::new(graph_id.clone());
            if cli.user_id.is_some() {
                let scope = Scope {
                    graph_id: graph_id.clone(),
                    user_id,
                };
                kg.delete_graph_scoped(&scope).await?;
            } else {
                kg.delete_graph(&graph_id).await?;
            }
            print_message(format!("Graph graph_id={graph_id} deleted."))?;
        }
        Command::DeleteUser => {
            kg.delete_user_graphs(&user_id).await?;
            print_message(format!("All graphs of user user_id={user_id} deleted."))?;
        }
        Command::DeleteAll => {
            kg.delete_all().await?;
            print_message("All graphs deleted.".to_string())?;
        }
        Command::NextGraphId => {
            print_json(&kg.next_graph_id(&user_id).await?)?;
        }
    }

    Ok(())
}

fn read_stdin_json<T: serde::de::DeserializeOwned>() -> anyhow::Result<T> {
    let input = std::io::read_to_string(std::io::stdin())?;
    Ok(serde_json::from_str(&input)?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn print_message(message: String) -> anyhow::Result<()> {
    print_json(&serde_json::json!({ "message": message }))
}

/// Print a `{success: false, message}` body and exit with a status-derived code.
fn fail(message: &str, err: &EngineError) -> anyhow::Result<()> {
    print_json(&StatusResponse {
        success: false,
        message: message.to_string(),
    })?;
    std::process::exit(exit_code(err.status()));
}

/// 4xx statuses exit with 2, everything else with 1.
fn exit_code(status: u16) -> i32 {
    if (400..500).contains(&status) {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn in_memory_flag_is_documented_as_ephemeral() {
        let command = Cli::command();
        let flag = command
            .get_arguments()
            .find(|a| a.get_id() == "in_memory")
            .unwrap();
        let help = flag.get_long_help().or(flag.get_help()).unwrap().to_string();
        assert!(help.contains("Nothing is kept between invocations"));
    }

    #[test]
    fn delete_node_takes_ids_from_flags() {
        let cli = Cli::try_parse_from([
            "kgraph", "delete-node", "--graph-id", "g1", "--node-id", "e3", "--user-id", "u1",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::DeleteNode { ref graph_id, ref node_id } if graph_id == "g1" && node_id == "e3"
        ));
        assert_eq!(cli.user_id.as_deref(), Some("u1"));
    }
}
