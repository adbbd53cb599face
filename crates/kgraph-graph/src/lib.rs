//! kgraph-graph: the graph store boundary.
//!
//! Every entity and relation read or write flows through a [`GraphStore`].
//! Two backends share the same semantics: [`GraphClient`] talks to Neo4j,
//! [`MemoryStore`] keeps everything in process. Every entity predicate is
//! scoped by both graph_id and user_id.

pub mod client;
pub mod memory;
pub mod mutations;
pub mod queries;
pub mod store;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use memory::MemoryStore;
pub use store::{GraphStore, LinkedEntityWrite, RelationOutcome, RelationWrite, SubgraphRecords};
