//! Typed request/reply messages for the query surface.
//!
//! These are the shapes the engine handlers consume and produce; the
//! socket facade wraps them in a tagged envelope (see `server`). Offsets
//! in replies refer to positions in the request's `node_ids` batch, so a
//! client can match results back after this server silently skips ids it
//! does not hold.

use serde::{Deserialize, Serialize};

use crate::types::{FeatureId, FeatureMeta, NodeId, Type};

// ── Node Types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypesRequest {
    pub node_ids: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypesReply {
    pub offsets: Vec<u64>,
    pub types: Vec<Type>,
}

// ── Dense Features ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFeaturesRequest {
    pub node_ids: Vec<NodeId>,
    pub features: Vec<FeatureMeta>,
}

/// Dense edge-feature request: `node_ids` holds sources in the first
/// half and destinations in the second, `types[i]` the edge type of pair
/// `i`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeFeaturesRequest {
    pub node_ids: Vec<NodeId>,
    pub types: Vec<Type>,
    pub features: Vec<FeatureMeta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturesReply {
    pub offsets: Vec<u64>,
    pub feature_values: Vec<u8>,
}

// ── Sparse Features ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSparseFeaturesRequest {
    pub node_ids: Vec<NodeId>,
    pub feature_ids: Vec<FeatureId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeSparseFeaturesRequest {
    pub node_ids: Vec<NodeId>,
    pub types: Vec<Type>,
    pub feature_ids: Vec<FeatureId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparseFeaturesReply {
    /// One dimension per requested feature id.
    pub dimensions: Vec<i64>,
    pub indices: Vec<i64>,
    pub values: Vec<u8>,
    pub indices_counts: Vec<u64>,
    pub values_counts: Vec<u64>,
}

// ── String Features ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringFeaturesReply {
    /// `features_count` entries per request row, row-major.
    pub dimensions: Vec<i64>,
    pub values: Vec<u8>,
}

// ── Neighbors ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborsRequest {
    pub node_ids: Vec<NodeId>,
    /// Sorted ascending.
    pub edge_types: Vec<Type>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborCountsReply {
    pub neighbor_counts: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborsReply {
    pub neighbor_counts: Vec<u64>,
    pub node_ids: Vec<NodeId>,
    pub edge_types: Vec<Type>,
    pub edge_weights: Vec<f32>,
}

// ── Sampling ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedSampleRequest {
    pub node_ids: Vec<NodeId>,
    /// Sorted ascending.
    pub edge_types: Vec<Type>,
    /// Samples per found node.
    pub count: u64,
    pub seed: u64,
    pub default_node_id: NodeId,
    pub default_node_weight: f32,
    pub default_edge_type: Type,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedSampleReply {
    /// The request node ids this server resolved, in request order.
    pub node_ids: Vec<NodeId>,
    pub neighbor_ids: Vec<NodeId>,
    pub neighbor_types: Vec<Type>,
    pub neighbor_weights: Vec<f32>,
    /// Total sampling weight observed per found node, for federation.
    pub shard_weights: Vec<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniformSampleRequest {
    pub node_ids: Vec<NodeId>,
    /// Sorted ascending.
    pub edge_types: Vec<Type>,
    pub count: u64,
    pub seed: u64,
    pub without_replacement: bool,
    pub default_node_id: NodeId,
    pub default_edge_type: Type,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniformSampleReply {
    pub node_ids: Vec<NodeId>,
    pub neighbor_ids: Vec<NodeId>,
    pub neighbor_types: Vec<Type>,
    /// Eligible neighbor count observed per found node, for federation.
    pub shard_counts: Vec<u64>,
}

// ── Metadata ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataReply {
    pub version: String,
    pub nodes: u64,
    pub edges: u64,
    pub node_types: usize,
    pub edge_types: usize,
    pub node_features: usize,
    pub edge_features: usize,
    pub partitions: usize,
    /// `[partition][type]` weights flattened partition-major.
    pub node_partition_weights: Vec<f32>,
    pub edge_partition_weights: Vec<f32>,
    pub node_count_per_type: Vec<u64>,
    pub edge_count_per_type: Vec<u64>,
}
