//! In-memory partition backend.
//!
//! Holds one shard's node records entirely in memory, indexed by the
//! dense local slot assigned in the node-map file. Used by the server
//! binary (loaded from a JSON snapshot) and throughout the test suite.
//! Sampling is deterministic for a given seed: every call derives its own
//! ChaCha stream, so replies are reproducible per (request, server) pair.

use std::collections::BTreeMap;
use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::partition::Partition;
use crate::types::{FeatureId, FeatureMeta, NodeId, Type, DEFAULT_NODE_TYPE};

// ── Records ────────────────────────────────────────────────────────

/// One sparse feature: fixed-arity coordinate tuples plus raw values.
///
/// `coordinates` is flattened, `dimension` values per entry. A fetch
/// emits `[row_id, coord...]` index tuples so federated clients can
/// reassemble a batch-level sparse tensor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseFeature {
    pub dimension: i64,
    #[serde(default)]
    pub coordinates: Vec<i64>,
    #[serde(default)]
    pub values: Vec<u8>,
}

/// Outgoing edge of a node, with its own feature payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEdge {
    pub dst: NodeId,
    pub edge_type: Type,
    #[serde(default = "default_edge_weight")]
    pub weight: f32,
    #[serde(default)]
    pub features: BTreeMap<FeatureId, Vec<u8>>,
    #[serde(default)]
    pub sparse_features: BTreeMap<FeatureId, SparseFeature>,
    #[serde(default)]
    pub string_features: BTreeMap<FeatureId, Vec<u8>>,
}

fn default_edge_weight() -> f32 {
    1.0
}

impl MemoryEdge {
    pub fn new(dst: NodeId, edge_type: Type, weight: f32) -> Self {
        Self {
            dst,
            edge_type,
            weight,
            features: BTreeMap::new(),
            sparse_features: BTreeMap::new(),
            string_features: BTreeMap::new(),
        }
    }
}

/// One node record, addressed by its local slot index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryNode {
    #[serde(default = "default_node_type")]
    pub node_type: Type,
    #[serde(default)]
    pub features: BTreeMap<FeatureId, Vec<u8>>,
    #[serde(default)]
    pub sparse_features: BTreeMap<FeatureId, SparseFeature>,
    #[serde(default)]
    pub string_features: BTreeMap<FeatureId, Vec<u8>>,
    #[serde(default)]
    pub neighbors: Vec<MemoryEdge>,
}

fn default_node_type() -> Type {
    DEFAULT_NODE_TYPE
}

impl Default for MemoryNode {
    fn default() -> Self {
        Self::new(DEFAULT_NODE_TYPE)
    }
}

impl MemoryNode {
    pub fn new(node_type: Type) -> Self {
        Self {
            node_type,
            features: BTreeMap::new(),
            sparse_features: BTreeMap::new(),
            string_features: BTreeMap::new(),
            neighbors: Vec::new(),
        }
    }
}

// ── Partition ──────────────────────────────────────────────────────

/// Fully in-memory shard; `nodes[local_index]` is the record for a slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryPartition {
    #[serde(default)]
    pub nodes: Vec<MemoryNode>,
}

impl MemoryPartition {
    pub fn new(nodes: Vec<MemoryNode>) -> Self {
        Self { nodes }
    }

    /// Load `partition_<suffix>.json` from `dir`.
    ///
    /// A missing snapshot yields an empty partition: the node map may
    /// still reference its slots, which then answer with defaults.
    pub fn read_from(dir: &Path, suffix: &str) -> Result<Self> {
        let path = dir.join(format!("partition_{}.json", suffix));
        if !path.exists() {
            tracing::warn!(suffix, "no partition snapshot found, serving empty partition");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|source| GraphError::OpenFile {
            path: path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn node(&self, local_index: u64) -> Option<&MemoryNode> {
        self.nodes.get(local_index as usize)
    }

    fn edge(&self, local_index: u64, dst: NodeId, edge_type: Type) -> Option<&MemoryEdge> {
        self.node(local_index)?
            .neighbors
            .iter()
            .find(|e| e.dst == dst && e.edge_type == edge_type)
    }

    /// Neighbors of a slot whose type is in the sorted `edge_types` set.
    fn eligible_neighbors<'a>(
        &'a self,
        local_index: u64,
        edge_types: &'a [Type],
    ) -> impl Iterator<Item = &'a MemoryEdge> + 'a {
        self.node(local_index)
            .map(|n| n.neighbors.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter(move |e| edge_types.binary_search(&e.edge_type).is_ok())
    }
}

// ── Feature Fill Helpers ───────────────────────────────────────────

fn fill_dense(source: &BTreeMap<FeatureId, Vec<u8>>, features: &[FeatureMeta], out: &mut [u8]) {
    let mut offset = 0;
    for feature in features {
        let span = &mut out[offset..offset + feature.size];
        span.fill(0);
        if let Some(bytes) = source.get(&feature.id) {
            let n = feature.size.min(bytes.len());
            span[..n].copy_from_slice(&bytes[..n]);
        }
        offset += feature.size;
    }
}

fn fetch_sparse(
    source: &BTreeMap<FeatureId, SparseFeature>,
    feature_ids: &[FeatureId],
    row_id: i64,
    dimensions: &mut [i64],
    out_indices: &mut [Vec<i64>],
    out_values: &mut [Vec<u8>],
) -> bool {
    let mut found = false;
    for (i, id) in feature_ids.iter().enumerate() {
        let Some(feature) = source.get(id) else {
            continue;
        };
        found = true;
        dimensions[i] = feature.dimension;
        if feature.dimension > 0 {
            for coords in feature.coordinates.chunks(feature.dimension as usize) {
                out_indices[i].push(row_id);
                out_indices[i].extend_from_slice(coords);
            }
        }
        out_values[i].extend_from_slice(&feature.values);
    }
    found
}

fn fetch_strings(
    source: &BTreeMap<FeatureId, Vec<u8>>,
    feature_ids: &[FeatureId],
    dimensions: &mut [i64],
    out_values: &mut Vec<u8>,
) -> bool {
    let mut found = false;
    for (i, id) in feature_ids.iter().enumerate() {
        let Some(bytes) = source.get(id) else {
            continue;
        };
        found = true;
        dimensions[i] = bytes.len() as i64;
        out_values.extend_from_slice(bytes);
    }
    found
}

/// Draw one edge with probability proportional to its weight.
fn weighted_pick<'a>(
    eligible: &[&'a MemoryEdge],
    total_weight: f32,
    rng: &mut ChaCha8Rng,
) -> &'a MemoryEdge {
    let mut target = rng.gen::<f32>() * total_weight;
    for edge in eligible {
        if target < edge.weight {
            return edge;
        }
        target -= edge.weight;
    }
    // Floating point slack can walk past the last bucket.
    eligible.last().expect("weighted_pick on empty neighbor set")
}

// ── Partition Impl ─────────────────────────────────────────────────

impl Partition for MemoryPartition {
    fn get_node_type(&self, local_index: u64) -> Type {
        self.node(local_index)
            .map(|n| n.node_type)
            .unwrap_or(DEFAULT_NODE_TYPE)
    }

    fn has_node_features(&self, local_index: u64) -> bool {
        self.node(local_index)
            .map(|n| !n.features.is_empty())
            .unwrap_or(false)
    }

    fn get_node_feature(&self, local_index: u64, features: &[FeatureMeta], out: &mut [u8]) {
        if let Some(node) = self.node(local_index) {
            fill_dense(&node.features, features, out);
        }
    }

    fn get_edge_feature(
        &self,
        local_index: u64,
        dst_node_id: NodeId,
        edge_type: Type,
        features: &[FeatureMeta],
        out: &mut [u8],
    ) -> bool {
        match self.edge(local_index, dst_node_id, edge_type) {
            Some(edge) if !edge.features.is_empty() => {
                fill_dense(&edge.features, features, out);
                true
            }
            _ => false,
        }
    }

    fn get_node_sparse_feature(
        &self,
        local_index: u64,
        feature_ids: &[FeatureId],
        row_id: i64,
        dimensions: &mut [i64],
        out_indices: &mut [Vec<i64>],
        out_values: &mut [Vec<u8>],
    ) -> bool {
        match self.node(local_index) {
            Some(node) => fetch_sparse(
                &node.sparse_features,
                feature_ids,
                row_id,
                dimensions,
                out_indices,
                out_values,
            ),
            None => false,
        }
    }

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
    ) -> bool {
        match self.edge(local_index, dst_node_id, edge_type) {
            Some(edge) => fetch_sparse(
                &edge.sparse_features,
                feature_ids,
                row_id,
                dimensions,
                out_indices,
                out_values,
            ),
            None => false,
        }
    }

    fn get_node_string_feature(
        &self,
        local_index: u64,
        feature_ids: &[FeatureId],
        dimensions: &mut [i64],
        out_values: &mut Vec<u8>,
    ) -> bool {
        match self.node(local_index) {
            Some(node) => fetch_strings(&node.string_features, feature_ids, dimensions, out_values),
            None => false,
        }
    }

    fn get_edge_string_feature(
        &self,
        local_index: u64,
        dst_node_id: NodeId,
        edge_type: Type,
        feature_ids: &[FeatureId],
        dimensions: &mut [i64],
        out_values: &mut Vec<u8>,
    ) -> bool {
        match self.edge(local_index, dst_node_id, edge_type) {
            Some(edge) => fetch_strings(&edge.string_features, feature_ids, dimensions, out_values),
            None => false,
        }
    }

    fn neighbor_count(&self, local_index: u64, edge_types: &[Type]) -> u64 {
        self.eligible_neighbors(local_index, edge_types).count() as u64
    }

    fn full_neighbor(
        &self,
        local_index: u64,
        edge_types: &[Type],
        out_ids: &mut Vec<NodeId>,
        out_types: &mut Vec<Type>,
        out_weights: &mut Vec<f32>,
    ) -> u64 {
        let mut appended = 0;
        for edge in self.eligible_neighbors(local_index, edge_types) {
            out_ids.push(edge.dst);
            out_types.push(edge.edge_type);
            out_weights.push(edge.weight);
            appended += 1;
        }
        appended
    }

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
        _default_node_id: NodeId,
        _default_weight: f32,
        _default_edge_type: Type,
    ) {
        let eligible: Vec<&MemoryEdge> = self.eligible_neighbors(local_index, edge_types).collect();
        let partition_weight: f32 = eligible.iter().map(|e| e.weight).sum();
        if partition_weight <= 0.0 {
            return;
        }

        // Streaming weighted merge: each slot is replaced by this shard's
        // draw with probability partition_weight / total_weight_so_far,
        // which keeps the overall sample weight-proportional across the
        // node's shards.
        let total = *shard_weight + partition_weight;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for slot in 0..count {
            if rng.gen::<f32>() * total < partition_weight {
                let edge = weighted_pick(&eligible, partition_weight, &mut rng);
                out_ids[slot] = edge.dst;
                out_types[slot] = edge.edge_type;
                out_weights[slot] = edge.weight;
            }
        }
        *shard_weight = total;
    }

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
        _default_node_id: NodeId,
        _default_edge_type: Type,
    ) {
        let eligible: Vec<&MemoryEdge> = self.eligible_neighbors(local_index, edge_types).collect();
        if eligible.is_empty() {
            return;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        if without_replacement {
            // Reservoir sampling continued across shards: shard_count is
            // the stream position reached by earlier partitions.
            let base = *shard_count;
            for (j, edge) in eligible.iter().enumerate() {
                let position = base + j as u64;
                let slot = if (position as usize) < count {
                    Some(position as usize)
                } else {
                    let r = rng.gen_range(0..=position) as usize;
                    (r < count).then_some(r)
                };
                if let Some(slot) = slot {
                    out_ids[slot] = edge.dst;
                    out_types[slot] = edge.edge_type;
                }
            }
            *shard_count = base + eligible.len() as u64;
        } else {
            let total = *shard_count + eligible.len() as u64;
            for slot in 0..count {
                if rng.gen_range(0..total) < eligible.len() as u64 {
                    let edge = eligible[rng.gen_range(0..eligible.len())];
                    out_ids[slot] = edge.dst;
                    out_types[slot] = edge.edge_type;
                }
            }
            *shard_count = total;
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
