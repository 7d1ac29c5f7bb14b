//! Graph engine: loads assigned partitions and answers the query surface.
//!
//! The engine owns three immutable-after-load structures: the graph
//! [`Metadata`], the ordered partition list, and the
//! [`NodeLocationIndex`] mapping global node ids to partition-local
//! slots. Every handler resolves batch entries through the index, calls
//! the per-partition contract, and assembles worker-local buffers into a
//! reply whose order matches the request batch.
//!
//! Precedence rules differ by query family:
//! - types and features take the *first* partition that can answer
//!   (run order = partition load order),
//! - neighbor counts/lists are *additive* across all copies,
//! - sampling *merges* across copies with accumulated shard weight/count.

use std::collections::HashSet;
use std::ops::Range;
use std::path::Path;

use crate::error::{GraphError, Result};
use crate::metadata::Metadata;
use crate::node_map::NodeLocationIndex;
use crate::parallel::WorkerPool;
use crate::partition::{MemoryPartition, Partition};
use crate::types::{feature_vector_size, EngineOptions, StorageType, DEFAULT_NODE_TYPE};
use crate::wire::{
    EdgeFeaturesRequest, EdgeSparseFeaturesRequest, FeaturesReply, MetadataReply,
    NeighborCountsReply, NeighborsReply, NeighborsRequest, NodeFeaturesRequest,
    NodeSparseFeaturesRequest, NodeTypesReply, NodeTypesRequest, SparseFeaturesReply,
    StringFeaturesReply, UniformSampleReply, UniformSampleRequest, WeightedSampleReply,
    WeightedSampleRequest,
};

/// Files with neighbor lists mark the eligible partition suffixes.
const NEIGHBORS_PREFIX: &str = "neighbors_";

// ── Engine ─────────────────────────────────────────────────────────

/// One server's slice of the graph: metadata, loaded partitions and the
/// node location index, plus an optional worker pool for feature
/// queries.
pub struct GraphEngine<P> {
    metadata: Metadata,
    partitions: Vec<P>,
    index: NodeLocationIndex,
    pool: Option<WorkerPool>,
}

impl<P: std::fmt::Debug> std::fmt::Debug for GraphEngine<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphEngine")
            .field("metadata", &self.metadata)
            .field("partitions", &self.partitions)
            .field("index", &self.index)
            .field("pool", &self.pool.as_ref().map(|_| "WorkerPool"))
            .finish()
    }
}

impl GraphEngine<MemoryPartition> {
    /// Load with the built-in in-memory partition backend
    /// (`partition_<suffix>.json` snapshots).
    pub fn load(options: EngineOptions) -> Result<Self> {
        Self::load_with(options, |dir, suffix, _| MemoryPartition::read_from(dir, suffix))
    }
}

impl<P: Partition> GraphEngine<P> {
    /// Load metadata, discover assigned partitions and build the index,
    /// constructing each partition through `factory`.
    pub fn load_with<F>(options: EngineOptions, mut factory: F) -> Result<Self>
    where
        F: FnMut(&Path, &str, &EngineOptions) -> Result<P>,
    {
        let metadata = Metadata::read_from(&options.path)?;
        let suffixes = discover_suffixes(&options.path, &options.partitions, options.storage_type)?;

        let mut index = NodeLocationIndex::new();
        let mut partitions = Vec::with_capacity(suffixes.len());
        for (i, suffix) in suffixes.iter().enumerate() {
            partitions.push(factory(&options.path, suffix, &options)?);
            index.load_partition(&options.path, suffix, i as u32)?;
        }

        let pool = if options.enable_threadpool {
            Some(WorkerPool::new()?)
        } else {
            None
        };

        tracing::info!(
            partitions = partitions.len(),
            nodes = index.node_count(),
            threadpool = options.enable_threadpool,
            "graph engine loaded"
        );

        Ok(Self {
            metadata,
            partitions,
            index,
            pool,
        })
    }

    /// Assemble an engine from already-built parts (embedding and tests).
    pub fn from_parts(
        metadata: Metadata,
        partitions: Vec<P>,
        index: NodeLocationIndex,
        pool: Option<WorkerPool>,
    ) -> Self {
        Self {
            metadata,
            partitions,
            index,
            pool,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Distinct node ids this server holds at least one copy of.
    pub fn known_node_count(&self) -> usize {
        self.index.node_count()
    }

    /// Run a batch body inline or across the worker pool, returning the
    /// per-worker states in worker order.
    fn run_batch<W, F>(&self, total: usize, mut make_worker: impl FnMut() -> W, body: F) -> Vec<W>
    where
        W: Send,
        F: Fn(usize, Range<usize>, &mut W) + Sync,
    {
        match &self.pool {
            Some(pool) => pool.run_chunks(total, make_worker, body),
            None => {
                let mut worker = make_worker();
                body(0, 0..total, &mut worker);
                vec![worker]
            }
        }
    }
}

// ── Worker Buffers ─────────────────────────────────────────────────

#[derive(Default)]
struct DenseBuffer {
    offsets: Vec<u64>,
    data: Vec<u8>,
}

struct SparseBuffer {
    dimensions: Vec<i64>,
    indices: Vec<Vec<i64>>,
    values: Vec<Vec<u8>>,
}

impl SparseBuffer {
    fn sized(features_count: usize) -> Self {
        Self {
            dimensions: vec![0; features_count],
            indices: vec![Vec::new(); features_count],
            values: vec![Vec::new(); features_count],
        }
    }
}

#[derive(Default)]
struct StringBuffer {
    dimensions: Vec<i64>,
    values: Vec<u8>,
}

/// Every partition reports the same dimension for a feature id, so the
/// per-worker copies agree wherever they are non-zero.
fn reduce_dimensions(buffers: &[SparseBuffer], features_count: usize) -> Vec<i64> {
    (0..features_count)
        .map(|i| {
            buffers
                .iter()
                .map(|b| b.dimensions[i])
                .find(|&d| d != 0)
                .unwrap_or(0)
        })
        .collect()
}

// ── Query Handlers ─────────────────────────────────────────────────

impl<P: Partition> GraphEngine<P> {
    /// First non-default type across a node's copies; missing and
    /// untyped nodes are omitted from the reply.
    pub fn get_node_types(&self, request: &NodeTypesRequest) -> NodeTypesReply {
        let mut reply = NodeTypesReply::default();
        for (node_offset, &node_id) in request.node_ids.iter().enumerate() {
            let Some(run) = self.index.find(node_id) else {
                continue;
            };
            let mut result = DEFAULT_NODE_TYPE;
            for location in self.index.locations(run) {
                result =
                    self.partitions[location.partition as usize].get_node_type(location.local_index);
                if result != DEFAULT_NODE_TYPE {
                    break;
                }
            }
            if result == DEFAULT_NODE_TYPE {
                continue;
            }
            reply.offsets.push(node_offset as u64);
            reply.types.push(result);
        }
        reply
    }

    /// Dense node features from the first feature-bearing copy of each
    /// node. `feature_values` holds one `fv_size` row per reply offset.
    pub fn get_node_features(&self, request: &NodeFeaturesRequest) -> FeaturesReply {
        let features = &request.features;
        let node_ids = &request.node_ids;
        let fv_size = feature_vector_size(features);

        let buffers = self.run_batch(node_ids.len(), DenseBuffer::default, |_, range, out| {
            for node_offset in range {
                let Some(run) = self.index.find(node_ids[node_offset]) else {
                    continue;
                };
                for location in self.index.locations(run) {
                    let partition = &self.partitions[location.partition as usize];
                    if !partition.has_node_features(location.local_index) {
                        continue;
                    }
                    let feature_offset = out.data.len();
                    out.data.resize(feature_offset + fv_size, 0);
                    partition.get_node_feature(
                        location.local_index,
                        features,
                        &mut out.data[feature_offset..],
                    );
                    out.offsets.push(node_offset as u64);
                    break;
                }
            }
        });

        let mut reply = FeaturesReply::default();
        for buffer in buffers {
            reply.offsets.extend(buffer.offsets);
            reply.feature_values.extend(buffer.data);
        }
        reply
    }

    /// Dense edge features; an edge whose feature row no copy can
    /// produce is rolled back and omitted.
    pub fn get_edge_features(&self, request: &EdgeFeaturesRequest) -> FeaturesReply {
        let len = request.types.len();
        assert_eq!(
            request.node_ids.len(),
            2 * len,
            "edge requests carry sources in the first half and destinations in the second"
        );
        let features = &request.features;
        let node_ids = &request.node_ids;
        let types = &request.types;
        let fv_size = feature_vector_size(features);

        let buffers = self.run_batch(len, DenseBuffer::default, |_, range, out| {
            for edge_offset in range {
                let Some(run) = self.index.find(node_ids[edge_offset]) else {
                    continue;
                };
                let feature_offset = out.data.len();
                out.data.resize(feature_offset + fv_size, 0);
                let mut found = false;
                for location in self.index.locations(run) {
                    found = self.partitions[location.partition as usize].get_edge_feature(
                        location.local_index,
                        node_ids[len + edge_offset],
                        types[edge_offset],
                        features,
                        &mut out.data[feature_offset..],
                    );
                    if found {
                        break;
                    }
                }
                if found {
                    out.offsets.push(edge_offset as u64);
                } else {
                    out.data.truncate(feature_offset);
                }
            }
        });

        let mut reply = FeaturesReply::default();
        for buffer in buffers {
            reply.offsets.extend(buffer.offsets);
            reply.feature_values.extend(buffer.data);
        }
        reply
    }

    /// Sparse node features. Assembly is feature-major: all workers'
    /// streams for feature 0, then feature 1, with one summed count per
    /// feature.
    pub fn get_node_sparse_features(
        &self,
        request: &NodeSparseFeaturesRequest,
    ) -> SparseFeaturesReply {
        let feature_ids = &request.feature_ids;
        let node_ids = &request.node_ids;
        let features_count = feature_ids.len();

        let buffers = self.run_batch(
            node_ids.len(),
            || SparseBuffer::sized(features_count),
            |_, range, out| {
                for node_offset in range {
                    let Some(run) = self.index.find(node_ids[node_offset]) else {
                        continue;
                    };
                    for location in self.index.locations(run) {
                        let found = self.partitions[location.partition as usize]
                            .get_node_sparse_feature(
                                location.local_index,
                                feature_ids,
                                node_offset as i64,
                                &mut out.dimensions,
                                &mut out.indices,
                                &mut out.values,
                            );
                        if found {
                            break;
                        }
                    }
                }
            },
        );

        let mut reply = SparseFeaturesReply {
            dimensions: reduce_dimensions(&buffers, features_count),
            ..Default::default()
        };
        for i in 0..features_count {
            let mut indices_sum = 0u64;
            let mut values_sum = 0u64;
            for buffer in &buffers {
                reply.indices.extend_from_slice(&buffer.indices[i]);
                reply.values.extend_from_slice(&buffer.values[i]);
                indices_sum += buffer.indices[i].len() as u64;
                values_sum += buffer.values[i].len() as u64;
            }
            reply.indices_counts.push(indices_sum);
            reply.values_counts.push(values_sum);
        }
        reply
    }

    /// Sparse edge features. Unlike the node variant, counts flatten
    /// `(worker, feature)` pairs worker-major; federating clients rely
    /// on that nesting.
    pub fn get_edge_sparse_features(
        &self,
        request: &EdgeSparseFeaturesRequest,
    ) -> SparseFeaturesReply {
        let len = request.types.len();
        assert_eq!(
            request.node_ids.len(),
            2 * len,
            "edge requests carry sources in the first half and destinations in the second"
        );
        let feature_ids = &request.feature_ids;
        let node_ids = &request.node_ids;
        let types = &request.types;
        let features_count = feature_ids.len();

        let buffers = self.run_batch(
            len,
            || SparseBuffer::sized(features_count),
            |_, range, out| {
                for edge_offset in range {
                    let Some(run) = self.index.find(node_ids[edge_offset]) else {
                        continue;
                    };
                    for location in self.index.locations(run) {
                        let found = self.partitions[location.partition as usize]
                            .get_edge_sparse_feature(
                                location.local_index,
                                node_ids[len + edge_offset],
                                types[edge_offset],
                                feature_ids,
                                edge_offset as i64,
                                &mut out.dimensions,
                                &mut out.indices,
                                &mut out.values,
                            );
                        if found {
                            break;
                        }
                    }
                }
            },
        );

        let mut reply = SparseFeaturesReply {
            dimensions: reduce_dimensions(&buffers, features_count),
            ..Default::default()
        };
        for buffer in &buffers {
            for i in 0..features_count {
                reply.indices.extend_from_slice(&buffer.indices[i]);
                reply.values.extend_from_slice(&buffer.values[i]);
                reply.indices_counts.push(buffer.indices[i].len() as u64);
                reply.values_counts.push(buffer.values[i].len() as u64);
            }
        }
        reply
    }

    /// String node features; `dimensions` carries `features_count`
    /// entries per request row whether or not the row resolved.
    pub fn get_node_string_features(
        &self,
        request: &NodeSparseFeaturesRequest,
    ) -> StringFeaturesReply {
        let feature_ids = &request.feature_ids;
        let node_ids = &request.node_ids;
        let features_count = feature_ids.len();

        let buffers = self.run_batch(node_ids.len(), StringBuffer::default, |_, range, out| {
            out.dimensions.resize(features_count * range.len(), 0);
            let base = range.start;
            for node_offset in range {
                let Some(run) = self.index.find(node_ids[node_offset]) else {
                    continue;
                };
                let dims_start = features_count * (node_offset - base);
                for location in self.index.locations(run) {
                    let found = self.partitions[location.partition as usize]
                        .get_node_string_feature(
                            location.local_index,
                            feature_ids,
                            &mut out.dimensions[dims_start..dims_start + features_count],
                            &mut out.values,
                        );
                    if found {
                        break;
                    }
                }
            }
        });

        let mut reply = StringFeaturesReply::default();
        for buffer in buffers {
            reply.dimensions.extend(buffer.dimensions);
            reply.values.extend(buffer.values);
        }
        reply
    }

    /// String edge features; layout as in the node variant, one
    /// `features_count` slice per edge.
    pub fn get_edge_string_features(
        &self,
        request: &EdgeSparseFeaturesRequest,
    ) -> StringFeaturesReply {
        let len = request.types.len();
        assert_eq!(
            request.node_ids.len(),
            2 * len,
            "edge requests carry sources in the first half and destinations in the second"
        );
        let feature_ids = &request.feature_ids;
        let node_ids = &request.node_ids;
        let types = &request.types;
        let features_count = feature_ids.len();

        let buffers = self.run_batch(len, StringBuffer::default, |_, range, out| {
            out.dimensions.resize(features_count * range.len(), 0);
            let base = range.start;
            for edge_offset in range {
                let Some(run) = self.index.find(node_ids[edge_offset]) else {
                    continue;
                };
                let dims_start = features_count * (edge_offset - base);
                for location in self.index.locations(run) {
                    let found = self.partitions[location.partition as usize]
                        .get_edge_string_feature(
                            location.local_index,
                            node_ids[len + edge_offset],
                            types[edge_offset],
                            feature_ids,
                            &mut out.dimensions[dims_start..dims_start + features_count],
                            &mut out.values,
                        );
                    if found {
                        break;
                    }
                }
            }
        });

        let mut reply = StringFeaturesReply::default();
        for buffer in buffers {
            reply.dimensions.extend(buffer.dimensions);
            reply.values.extend(buffer.values);
        }
        reply
    }

    /// Neighbor counts are additive across all copies of a node; a
    /// missing node keeps its zero.
    pub fn get_neighbor_counts(&self, request: &NeighborsRequest) -> NeighborCountsReply {
        let mut reply = NeighborCountsReply {
            neighbor_counts: vec![0; request.node_ids.len()],
        };
        for (node_index, &node_id) in request.node_ids.iter().enumerate() {
            let Some(run) = self.index.find(node_id) else {
                continue;
            };
            for location in self.index.locations(run) {
                reply.neighbor_counts[node_index] += self.partitions
                    [location.partition as usize]
                    .neighbor_count(location.local_index, &request.edge_types);
            }
        }
        reply
    }

    /// Full neighbor lists, node-major then partition-major, each
    /// partition's neighbors in its natural order.
    pub fn get_neighbors(&self, request: &NeighborsRequest) -> NeighborsReply {
        let mut reply = NeighborsReply {
            neighbor_counts: vec![0; request.node_ids.len()],
            ..Default::default()
        };
        for (node_index, &node_id) in request.node_ids.iter().enumerate() {
            let Some(run) = self.index.find(node_id) else {
                continue;
            };
            for location in self.index.locations(run) {
                reply.neighbor_counts[node_index] += self.partitions
                    [location.partition as usize]
                    .full_neighbor(
                        location.local_index,
                        &request.edge_types,
                        &mut reply.node_ids,
                        &mut reply.edge_types,
                        &mut reply.edge_weights,
                    );
            }
        }
        reply
    }

    /// Weighted neighbor sampling. Output rows exist only for resolved
    /// nodes; each partition call advances the running seed, so replies
    /// are reproducible for a given request.
    pub fn weighted_sample_neighbors(&self, request: &WeightedSampleRequest) -> WeightedSampleReply {
        debug_assert!(
            request.edge_types.windows(2).all(|w| w[0] <= w[1]),
            "edge types must be sorted"
        );
        let count = request.count as usize;
        let mut seed = request.seed;
        let mut reply = WeightedSampleReply::default();

        for &node_id in &request.node_ids {
            let Some(run) = self.index.find(node_id) else {
                continue;
            };
            let offset = reply.shard_weights.len() * count;
            reply.node_ids.push(node_id);
            reply.shard_weights.push(0.0);
            reply
                .neighbor_ids
                .resize(offset + count, request.default_node_id);
            reply
                .neighbor_types
                .resize(offset + count, request.default_edge_type);
            reply
                .neighbor_weights
                .resize(offset + count, request.default_node_weight);
            let weight_slot = reply.shard_weights.len() - 1;

            for location in self.index.locations(run) {
                self.partitions[location.partition as usize].sample_neighbor(
                    seed,
                    location.local_index,
                    &request.edge_types,
                    count,
                    &mut reply.neighbor_ids[offset..offset + count],
                    &mut reply.neighbor_types[offset..offset + count],
                    &mut reply.neighbor_weights[offset..offset + count],
                    &mut reply.shard_weights[weight_slot],
                    request.default_node_id,
                    request.default_node_weight,
                    request.default_edge_type,
                );
                seed = seed.wrapping_add(1);
            }
        }
        reply
    }

    /// Uniform neighbor sampling, with or without replacement across
    /// every copy of each node.
    pub fn uniform_sample_neighbors(&self, request: &UniformSampleRequest) -> UniformSampleReply {
        debug_assert!(
            request.edge_types.windows(2).all(|w| w[0] <= w[1]),
            "edge types must be sorted"
        );
        let count = request.count as usize;
        let mut seed = request.seed;
        let mut reply = UniformSampleReply::default();

        for &node_id in &request.node_ids {
            let Some(run) = self.index.find(node_id) else {
                continue;
            };
            let offset = reply.shard_counts.len() * count;
            reply.node_ids.push(node_id);
            reply.shard_counts.push(0);
            reply
                .neighbor_ids
                .resize(offset + count, request.default_node_id);
            reply
                .neighbor_types
                .resize(offset + count, request.default_edge_type);
            let count_slot = reply.shard_counts.len() - 1;

            for location in self.index.locations(run) {
                self.partitions[location.partition as usize].uniform_sample_neighbor(
                    request.without_replacement,
                    seed,
                    location.local_index,
                    &request.edge_types,
                    count,
                    &mut reply.neighbor_ids[offset..offset + count],
                    &mut reply.neighbor_types[offset..offset + count],
                    &mut reply.shard_counts[count_slot],
                    request.default_node_id,
                    request.default_edge_type,
                );
                seed = seed.wrapping_add(1);
            }
        }
        reply
    }

    /// Snapshot of the loaded metadata, weight matrices flattened
    /// partition-major.
    pub fn get_metadata(&self) -> MetadataReply {
        let m = &self.metadata;
        MetadataReply {
            version: m.version.clone(),
            nodes: m.node_count,
            edges: m.edge_count,
            node_types: m.node_type_count,
            edge_types: m.edge_type_count,
            node_features: m.node_feature_count,
            edge_features: m.edge_feature_count,
            partitions: m.partition_count,
            node_partition_weights: m.partition_node_weights.iter().flatten().copied().collect(),
            edge_partition_weights: m.partition_edge_weights.iter().flatten().copied().collect(),
            node_count_per_type: m.node_count_per_type.clone(),
            edge_count_per_type: m.edge_count_per_type.clone(),
        }
    }
}

// ── Partition Discovery ────────────────────────────────────────────

/// Scan the base directory for `neighbors_<suffix>.*` markers whose
/// leading suffix digits name an assigned partition. Returned suffixes
/// are sorted lexicographically; position-in-sort is the partition
/// index.
fn discover_suffixes(
    dir: &Path,
    partitions: &[u32],
    storage_type: StorageType,
) -> Result<Vec<String>> {
    if storage_type == StorageType::Remote {
        return Err(GraphError::UnsupportedStorage("remote".to_string()));
    }

    let assigned: HashSet<u32> = partitions.iter().copied().collect();
    let mut suffixes = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(suffix) = stem.strip_prefix(NEIGHBORS_PREFIX) else {
            continue;
        };
        match leading_number(suffix) {
            Some(partition) if assigned.contains(&partition) => {
                suffixes.push(suffix.to_string());
            }
            Some(_) => {}
            None => {
                tracing::warn!(file = %path.display(), "neighbors file without a numeric suffix, skipping");
            }
        }
    }
    suffixes.sort();
    suffixes.dedup();
    Ok(suffixes)
}

/// Base-10 value of the leading digits of a suffix, e.g. `"12_3" -> 12`.
fn leading_number(suffix: &str) -> Option<u32> {
    let digits: &str = {
        let end = suffix
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(suffix.len());
        &suffix[..end]
    };
    digits.parse().ok()
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_map::NODE_MAP_RECORD_SIZE;
    use crate::partition::{MemoryEdge, MemoryNode, MemoryPartition};
    use crate::types::FeatureMeta;

    fn encode_node_map(records: &[(u64, u64, i32)]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(records.len() * NODE_MAP_RECORD_SIZE);
        for &(global_id, local_index, node_type) in records {
            bytes.extend_from_slice(&global_id.to_le_bytes());
            bytes.extend_from_slice(&local_index.to_le_bytes());
            bytes.extend_from_slice(&node_type.to_le_bytes());
        }
        bytes
    }

    /// Engine over in-memory partitions; `maps[p]` lists the node-map
    /// records of partition `p`.
    fn engine_with(
        partitions: Vec<MemoryPartition>,
        maps: &[&[(u64, u64, i32)]],
        threadpool: bool,
    ) -> GraphEngine<MemoryPartition> {
        assert_eq!(partitions.len(), maps.len());
        let mut index = NodeLocationIndex::new();
        for (p, records) in maps.iter().enumerate() {
            index
                .load_bytes(&encode_node_map(records), &p.to_string(), p as u32)
                .unwrap();
        }
        let pool = threadpool.then(|| WorkerPool::new().unwrap());
        GraphEngine::from_parts(Metadata::default(), partitions, index, pool)
    }

    fn typed_node(node_type: i32) -> MemoryNode {
        MemoryNode::new(node_type)
    }

    #[test]
    fn test_node_types_skips_missing_nodes() {
        let partition = MemoryPartition::new(vec![typed_node(1), typed_node(2)]);
        let engine = engine_with(vec![partition], &[&[(10, 0, 1), (20, 1, 2)]], false);

        let reply = engine.get_node_types(&NodeTypesRequest {
            node_ids: vec![10, 30, 20],
        });
        assert_eq!(reply.offsets, vec![0, 2]);
        assert_eq!(reply.types, vec![1, 2]);
    }

    #[test]
    fn test_node_types_falls_back_across_partitions() {
        let untyped = MemoryPartition::new(vec![typed_node(DEFAULT_NODE_TYPE)]);
        let typed = MemoryPartition::new(vec![typed_node(7)]);
        let engine = engine_with(vec![untyped, typed], &[&[(5, 0, -1)], &[(5, 0, 7)]], false);

        let reply = engine.get_node_types(&NodeTypesRequest { node_ids: vec![5] });
        assert_eq!(reply.offsets, vec![0]);
        assert_eq!(reply.types, vec![7]);
    }

    #[test]
    fn test_node_types_omits_fully_untyped_nodes() {
        let partition = MemoryPartition::new(vec![typed_node(DEFAULT_NODE_TYPE)]);
        let engine = engine_with(vec![partition], &[&[(5, 0, -1)]], false);

        let reply = engine.get_node_types(&NodeTypesRequest { node_ids: vec![5] });
        assert!(reply.offsets.is_empty());
        assert!(reply.types.is_empty());
    }

    #[test]
    fn test_node_features_concatenate_in_request_order() {
        let mut node = typed_node(1);
        node.features.insert(1, vec![0x01, 0x02, 0x03, 0x04]);
        node.features.insert(2, vec![0xAA, 0xBB]);
        let engine = engine_with(
            vec![MemoryPartition::new(vec![node])],
            &[&[(42, 0, 1)]],
            false,
        );

        let reply = engine.get_node_features(&NodeFeaturesRequest {
            node_ids: vec![42],
            features: vec![FeatureMeta::new(1, 4), FeatureMeta::new(2, 2)],
        });
        assert_eq!(reply.offsets, vec![0]);
        assert_eq!(reply.feature_values, vec![0x01, 0x02, 0x03, 0x04, 0xAA, 0xBB]);
    }

    #[test]
    fn test_node_features_take_first_feature_bearing_copy() {
        let bare = MemoryPartition::new(vec![typed_node(1)]);
        let mut rich_node = typed_node(1);
        rich_node.features.insert(0, vec![9]);
        let rich = MemoryPartition::new(vec![rich_node]);
        let engine = engine_with(vec![bare, rich], &[&[(5, 0, 1)], &[(5, 0, 1)]], false);

        let reply = engine.get_node_features(&NodeFeaturesRequest {
            node_ids: vec![5, 6],
            features: vec![FeatureMeta::new(0, 1)],
        });
        assert_eq!(reply.offsets, vec![0]);
        assert_eq!(reply.feature_values, vec![9]);
    }

    #[test]
    fn test_edge_features_roll_back_missing_edges() {
        let mut node = typed_node(1);
        let mut edge = MemoryEdge::new(50, 2, 1.0);
        edge.features.insert(0, vec![7, 8]);
        node.neighbors.push(edge);
        let engine = engine_with(
            vec![MemoryPartition::new(vec![node])],
            &[&[(5, 0, 1)]],
            false,
        );

        // Second pair asks for an edge type the partition lacks.
        let reply = engine.get_edge_features(&EdgeFeaturesRequest {
            node_ids: vec![5, 5, 50, 50],
            types: vec![2, 9],
            features: vec![FeatureMeta::new(0, 2)],
        });
        assert_eq!(reply.offsets, vec![0]);
        assert_eq!(reply.feature_values, vec![7, 8]);
    }

    #[test]
    #[should_panic(expected = "sources in the first half")]
    fn test_edge_features_reject_malformed_batch() {
        let engine = engine_with(vec![MemoryPartition::default()], &[&[]], false);
        engine.get_edge_features(&EdgeFeaturesRequest {
            node_ids: vec![1, 2, 3],
            types: vec![0],
            features: vec![],
        });
    }

    fn sparse_node(feature_id: i32) -> MemoryNode {
        let mut node = typed_node(1);
        node.sparse_features.insert(
            feature_id,
            crate::partition::SparseFeature {
                dimension: 1,
                coordinates: vec![3, 4],
                values: vec![10, 20],
            },
        );
        node
    }

    #[test]
    fn test_node_sparse_reply_counts_are_feature_major() {
        let engine = engine_with(
            vec![MemoryPartition::new(vec![sparse_node(0), sparse_node(1)])],
            &[&[(1, 0, 1), (2, 1, 1)]],
            false,
        );

        let reply = engine.get_node_sparse_features(&NodeSparseFeaturesRequest {
            node_ids: vec![1, 2],
            feature_ids: vec![0, 1],
        });

        assert_eq!(reply.dimensions, vec![1, 1]);
        // Feature 0 comes from node offset 0, feature 1 from offset 1.
        assert_eq!(reply.indices, vec![0, 3, 0, 4, 1, 3, 1, 4]);
        assert_eq!(reply.values, vec![10, 20, 10, 20]);
        assert_eq!(reply.indices_counts, vec![4, 4]);
        assert_eq!(reply.values_counts, vec![2, 2]);

        let indices_total: u64 = reply.indices_counts.iter().sum();
        let values_total: u64 = reply.values_counts.iter().sum();
        assert_eq!(indices_total as usize, reply.indices.len());
        assert_eq!(values_total as usize, reply.values.len());
    }

    #[test]
    fn test_edge_sparse_reply_counts_are_worker_major() {
        let mut node = typed_node(1);
        let mut edge = MemoryEdge::new(50, 2, 1.0);
        edge.sparse_features.insert(
            0,
            crate::partition::SparseFeature {
                dimension: 1,
                coordinates: vec![8],
                values: vec![1],
            },
        );
        node.neighbors.push(edge);
        let engine = engine_with(
            vec![MemoryPartition::new(vec![node])],
            &[&[(5, 0, 1)]],
            false,
        );

        let reply = engine.get_edge_sparse_features(&EdgeSparseFeaturesRequest {
            node_ids: vec![5, 50],
            types: vec![2],
            feature_ids: vec![0, 1],
        });

        // Single worker, two features: one count entry per feature, the
        // second feature empty.
        assert_eq!(reply.indices_counts, vec![2, 0]);
        assert_eq!(reply.values_counts, vec![1, 0]);
        assert_eq!(reply.indices, vec![0, 8]);
        assert_eq!(reply.values, vec![1]);
        assert_eq!(reply.dimensions, vec![1, 0]);
    }

    #[test]
    fn test_string_dimensions_cover_missing_rows() {
        let mut node = typed_node(1);
        node.string_features.insert(0, b"abc".to_vec());
        let engine = engine_with(
            vec![MemoryPartition::new(vec![node])],
            &[&[(7, 0, 1)]],
            false,
        );

        let reply = engine.get_node_string_features(&NodeSparseFeaturesRequest {
            node_ids: vec![99, 7],
            feature_ids: vec![0],
        });

        // One dimension slot per (row, feature); the missing row stays 0.
        assert_eq!(reply.dimensions, vec![0, 3]);
        assert_eq!(reply.values, b"abc".to_vec());
    }

    #[test]
    fn test_neighbor_counts_add_across_partitions() {
        let mut a = typed_node(1);
        for dst in 0..3 {
            a.neighbors.push(MemoryEdge::new(dst, 0, 1.0));
        }
        let mut b = typed_node(1);
        for dst in 0..5 {
            b.neighbors.push(MemoryEdge::new(100 + dst, 0, 1.0));
        }
        let engine = engine_with(
            vec![
                MemoryPartition::new(vec![a]),
                MemoryPartition::new(vec![b]),
            ],
            &[&[(9, 0, 1)], &[(9, 0, 1)]],
            false,
        );

        let reply = engine.get_neighbor_counts(&NeighborsRequest {
            node_ids: vec![9, 1234],
            edge_types: vec![0],
        });
        assert_eq!(reply.neighbor_counts, vec![8, 0]);
    }

    #[test]
    fn test_neighbors_listed_node_then_partition_major() {
        let mut a = typed_node(1);
        a.neighbors.push(MemoryEdge::new(11, 0, 1.0));
        let mut b = typed_node(1);
        b.neighbors.push(MemoryEdge::new(22, 0, 2.0));
        b.neighbors.push(MemoryEdge::new(33, 0, 3.0));
        let engine = engine_with(
            vec![
                MemoryPartition::new(vec![a]),
                MemoryPartition::new(vec![b]),
            ],
            &[&[(9, 0, 1)], &[(9, 0, 1)]],
            false,
        );

        let reply = engine.get_neighbors(&NeighborsRequest {
            node_ids: vec![9],
            edge_types: vec![0],
        });
        assert_eq!(reply.neighbor_counts, vec![3]);
        assert_eq!(reply.node_ids, vec![11, 22, 33]);
        assert_eq!(reply.edge_weights, vec![1.0, 2.0, 3.0]);
    }

    fn sample_fixture() -> GraphEngine<MemoryPartition> {
        let mut a = typed_node(1);
        a.neighbors.push(MemoryEdge::new(100, 0, 2.0));
        a.neighbors.push(MemoryEdge::new(101, 0, 1.0));
        let mut b = typed_node(1);
        b.neighbors.push(MemoryEdge::new(200, 0, 4.0));
        engine_with(
            vec![
                MemoryPartition::new(vec![a]),
                MemoryPartition::new(vec![b]),
            ],
            &[&[(9, 0, 1)], &[(9, 0, 1), (10, 1, 1)]],
            false,
        )
    }

    #[test]
    fn test_weighted_sample_reply_sizing() {
        let engine = sample_fixture();
        let reply = engine.weighted_sample_neighbors(&WeightedSampleRequest {
            node_ids: vec![9, 5555, 10],
            edge_types: vec![0],
            count: 4,
            seed: 1,
            default_node_id: u64::MAX,
            default_node_weight: 0.0,
            default_edge_type: -1,
        });

        // Two of three nodes resolve; the missing one produces no row.
        assert_eq!(reply.node_ids, vec![9, 10]);
        assert_eq!(reply.neighbor_ids.len(), 8);
        assert_eq!(reply.neighbor_types.len(), 8);
        assert_eq!(reply.neighbor_weights.len(), 8);
        assert_eq!(reply.shard_weights.len(), 2);

        // Node 9 saw both partitions' weight; node 10 has no neighbors,
        // so its row keeps the defaults.
        assert!((reply.shard_weights[0] - 7.0).abs() < 1e-6);
        assert_eq!(reply.shard_weights[1], 0.0);
        assert!(reply.neighbor_ids[4..].iter().all(|&id| id == u64::MAX));
        assert!(reply.neighbor_ids[..4]
            .iter()
            .all(|&id| id == 100 || id == 101 || id == 200));
    }

    #[test]
    fn test_weighted_sample_is_reproducible() {
        let engine = sample_fixture();
        let request = WeightedSampleRequest {
            node_ids: vec![9, 10],
            edge_types: vec![0],
            count: 6,
            seed: 77,
            default_node_id: 0,
            default_node_weight: 0.0,
            default_edge_type: -1,
        };
        let a = engine.weighted_sample_neighbors(&request);
        let b = engine.weighted_sample_neighbors(&request);
        assert_eq!(a, b);

        let other_seed = WeightedSampleRequest { seed: 78, ..request };
        let c = engine.weighted_sample_neighbors(&other_seed);
        assert_eq!(a.node_ids, c.node_ids);
        assert_eq!(a.shard_weights, c.shard_weights);
    }

    #[test]
    fn test_uniform_sample_without_replacement_spans_partitions() {
        let engine = sample_fixture();
        let reply = engine.uniform_sample_neighbors(&UniformSampleRequest {
            node_ids: vec![9],
            edge_types: vec![0],
            count: 3,
            seed: 5,
            without_replacement: true,
            default_node_id: u64::MAX,
            default_edge_type: -1,
        });

        assert_eq!(reply.node_ids, vec![9]);
        assert_eq!(reply.shard_counts, vec![3]);
        // count == total eligible: every neighbor appears exactly once.
        let mut ids = reply.neighbor_ids.clone();
        ids.sort_unstable();
        assert_eq!(ids, vec![100, 101, 200]);
    }

    #[test]
    fn test_parallel_and_inline_replies_match() {
        let nodes: Vec<MemoryNode> = (0..512)
            .map(|i| {
                let mut node = typed_node(1);
                node.features.insert(0, vec![i as u8, (i >> 8) as u8]);
                node.string_features.insert(0, vec![i as u8; (i % 5) + 1]);
                node
            })
            .collect();
        let records: Vec<(u64, u64, i32)> =
            (0..512).map(|i| (1000 + i as u64, i as u64, 1)).collect();

        let inline = engine_with(
            vec![MemoryPartition::new(nodes.clone())],
            &[records.as_slice()],
            false,
        );
        let pooled = engine_with(vec![MemoryPartition::new(nodes)], &[records.as_slice()], true);

        // Every other id resolves; the rest are unknown to the server.
        let node_ids: Vec<u64> = (0..1024).map(|i| 1000 + (i % 768) as u64).collect();

        let features_request = NodeFeaturesRequest {
            node_ids: node_ids.clone(),
            features: vec![FeatureMeta::new(0, 2)],
        };
        let a = inline.get_node_features(&features_request);
        let b = pooled.get_node_features(&features_request);
        assert_eq!(a, b);
        assert_eq!(a.feature_values.len(), 2 * a.offsets.len());

        let strings_request = NodeSparseFeaturesRequest {
            node_ids,
            feature_ids: vec![0],
        };
        let a = inline.get_node_string_features(&strings_request);
        let b = pooled.get_node_string_features(&strings_request);
        assert_eq!(a, b);
    }

    #[test]
    fn test_metadata_reply_flattens_weights() {
        let metadata = Metadata {
            version: "v2".to_string(),
            node_count: 10,
            edge_count: 20,
            node_type_count: 2,
            edge_type_count: 1,
            node_feature_count: 0,
            edge_feature_count: 0,
            partition_count: 2,
            partition_node_weights: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            partition_edge_weights: vec![vec![5.0], vec![6.0]],
            node_count_per_type: vec![4, 6],
            edge_count_per_type: vec![20],
        };
        let engine = GraphEngine::from_parts(
            metadata,
            vec![MemoryPartition::default()],
            NodeLocationIndex::new(),
            None,
        );

        let reply = engine.get_metadata();
        assert_eq!(reply.nodes, 10);
        assert_eq!(reply.partitions, 2);
        assert_eq!(reply.node_partition_weights, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(reply.edge_partition_weights, vec![5.0, 6.0]);
        assert_eq!(reply.node_count_per_type, vec![4, 6]);
    }

    #[test]
    fn test_leading_number_parsing() {
        assert_eq!(leading_number("0"), Some(0));
        assert_eq!(leading_number("12_extra"), Some(12));
        assert_eq!(leading_number("003"), Some(3));
        assert_eq!(leading_number("x1"), None);
        assert_eq!(leading_number(""), None);
    }
}
