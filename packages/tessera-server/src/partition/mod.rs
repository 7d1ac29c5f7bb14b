//! Per-partition storage contract.
//!
//! The query composer is generic over partition storage: anything that can
//! answer these per-local-index operations can back the server. The
//! composer owns node -> slot resolution and reply assembly; partitions
//! own the data behind one shard.

pub mod memory;

pub use memory::{MemoryEdge, MemoryNode, MemoryPartition, SparseFeature};

use crate::types::{FeatureId, FeatureMeta, NodeId, Type};

/// One loaded shard. All operations are keyed by a partition-local slot
/// index assigned by the node-map file, and all are read-only.
///
/// Implementations are shared across session threads without locks, so
/// they must be `Send + Sync`.
pub trait Partition: Send + Sync {
    /// Type of the node in slot `local_index`;
    /// [`crate::types::DEFAULT_NODE_TYPE`] when absent or untyped.
    fn get_node_type(&self, local_index: u64) -> Type;

    /// Whether the node in this slot carries any dense features here.
    fn has_node_features(&self, local_index: u64) -> bool;

    /// Fill `out` with the requested dense features in request order.
    /// `out` is exactly the summed feature width; missing columns stay
    /// zeroed.
    fn get_node_feature(&self, local_index: u64, features: &[FeatureMeta], out: &mut [u8]);

    /// Dense features of the edge `(local slot, dst_node_id, edge_type)`.
    /// Returns false when this shard holds no such feature-bearing edge;
    /// `out` contents are unspecified in that case.
    fn get_edge_feature(
        &self,
        local_index: u64,
        dst_node_id: NodeId,
        edge_type: Type,
        features: &[FeatureMeta],
        out: &mut [u8],
    ) -> bool;

    /// Sparse features of a node. For each requested feature the shard
    /// carries, writes the coordinate dimension into `dimensions`, appends
    /// `[row_id, coord...]` tuples to `out_indices[feature]`, and appends
    /// raw value bytes to `out_values[feature]`. Returns true when any
    /// requested feature was found.
    fn get_node_sparse_feature(
        &self,
        local_index: u64,
        feature_ids: &[FeatureId],
        row_id: i64,
        dimensions: &mut [i64],
        out_indices: &mut [Vec<i64>],
        out_values: &mut [Vec<u8>],
    ) -> bool;

    /// Edge-keyed variant of [`Partition::get_node_sparse_feature`].
    #[allow(clippy::too_many_arguments)]
    fn get_edge_sparse_feature(
        &self,
        local_index: u64,
        dst_node_id: NodeId,
        edge_type: Type,
        feature_ids: &[FeatureId],
        row_id: i64,
        dimensions: &mut [i64],
        out_indices: &mut [Vec<i64>],
        out_values: &mut [Vec<u8>],
    ) -> bool;

    /// String features of a node. Byte lengths go into `dimensions` (one
    /// slot per requested feature), bytes are appended to `out_values`.
    /// Returns true when any requested feature was found.
    fn get_node_string_feature(
        &self,
        local_index: u64,
        feature_ids: &[FeatureId],
        dimensions: &mut [i64],
        out_values: &mut Vec<u8>,
    ) -> bool;

    /// Edge-keyed variant of [`Partition::get_node_string_feature`].
    fn get_edge_string_feature(
        &self,
        local_index: u64,
        dst_node_id: NodeId,
        edge_type: Type,
        feature_ids: &[FeatureId],
        dimensions: &mut [i64],
        out_values: &mut Vec<u8>,
    ) -> bool;

    /// Number of neighbors reachable from this slot over `edge_types`
    /// (sorted ascending).
    fn neighbor_count(&self, local_index: u64, edge_types: &[Type]) -> u64;

    /// Append every neighbor over `edge_types` to the output vectors and
    /// return how many were appended.
    fn full_neighbor(
        &self,
        local_index: u64,
        edge_types: &[Type],
        out_ids: &mut Vec<NodeId>,
        out_types: &mut Vec<Type>,
        out_weights: &mut Vec<f32>,
    ) -> u64;

    /// Merge this shard's weighted neighbor sample into the output slices.
    ///
    /// The slices hold the best sample seen so far across this node's
    /// shards; `shard_weight` accumulates the total eligible weight so
    /// replacement stays weight-proportional across calls (and so clients
    /// can normalize across servers). Slots the merge does not replace are
    /// left untouched; callers pre-fill them with the defaults.
    #[allow(clippy::too_many_arguments)]
    fn sample_neighbor(
        &self,
        seed: u64,
        local_index: u64,
        edge_types: &[Type],
        count: usize,
        out_ids: &mut [NodeId],
        out_types: &mut [Type],
        out_weights: &mut [f32],
        shard_weight: &mut f32,
        default_node_id: NodeId,
        default_weight: f32,
        default_edge_type: Type,
    );

    /// Uniform counterpart of [`Partition::sample_neighbor`];
    /// `shard_count` accumulates the eligible neighbor count.
    #[allow(clippy::too_many_arguments)]
    fn uniform_sample_neighbor(
        &self,
        without_replacement: bool,
        seed: u64,
        local_index: u64,
        edge_types: &[Type],
        count: usize,
        out_ids: &mut [NodeId],
        out_types: &mut [Type],
        shard_count: &mut u64,
        default_node_id: NodeId,
        default_edge_type: Type,
    );
}
