//! tessera: partitioned graph-serving engine.
//!
//! A graph is pre-partitioned into shards; each server process loads an
//! assigned subset and answers type, feature, neighbor and sampling
//! queries over them. Clients federate replies from many servers to
//! reconstruct answers over the full graph, which is why missing node
//! ids are silently skipped rather than errors.
//!
//! The crate splits into:
//! - [`node_map`]: the node location index built from binary
//!   `node_<suffix>.map` files
//! - [`partition`]: the per-shard storage contract plus the in-memory
//!   backend
//! - [`engine`]: the query composer over index + partitions
//! - [`parallel`]: the worker pool feature queries fan out on
//! - [`server`]: the framed unix-socket facade

pub mod engine;
pub mod error;
pub mod metadata;
pub mod node_map;
pub mod parallel;
pub mod partition;
pub mod server;
pub mod types;
pub mod wire;

pub use engine::GraphEngine;
pub use error::{GraphError, Result};
pub use metadata::Metadata;
pub use node_map::{NodeLocation, NodeLocationIndex};
pub use parallel::WorkerPool;
pub use partition::{MemoryEdge, MemoryNode, MemoryPartition, Partition};
pub use types::{
    EngineOptions, FeatureId, FeatureMeta, NodeId, StorageType, Type, DEFAULT_NODE_TYPE,
};
