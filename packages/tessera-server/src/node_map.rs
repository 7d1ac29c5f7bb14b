//! Node location index: global node id -> partition-local slots.
//!
//! Each partition ships a `node_<suffix>.map` file of packed 20-byte
//! records `[u64 global_id][u64 local_index][i32 node_type]`, little
//! endian. Loading folds every partition's map into one arena of
//! location *runs*: a hash map points a node id at a contiguous block of
//! `(partition_index, local_index)` pairs covering all local copies of
//! that node, in partition load order.
//!
//! Runs are append-only. When a later partition re-introduces a known
//! node, the old run is copied to the end of the arena with the new pair
//! appended and the map is repointed; the old block becomes dead space.
//! Loading is a one-shot startup step and per-node replication factors
//! are small, so the waste is bounded and never reclaimed.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{GraphError, Result};
use crate::types::NodeId;

/// Byte width of one node-map record: u64 id + u64 local index + i32 type.
pub const NODE_MAP_RECORD_SIZE: usize = 20;

// ── Location Run ───────────────────────────────────────────────────

/// One local copy of a node: which partition, and which slot inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLocation {
    pub partition: u32,
    pub local_index: u64,
}

/// Handle to a node's contiguous run inside the index arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationRun {
    offset: u32,
    count: u32,
}

impl LocationRun {
    pub fn count(&self) -> usize {
        self.count as usize
    }
}

// ── Index ──────────────────────────────────────────────────────────

/// In-memory multimap from global node id to partition-local slots.
///
/// Flat parallel arrays instead of per-key vectors: lookups touch one
/// hash bucket plus one contiguous block, and the whole structure is
/// immutable after load.
#[derive(Debug, Default)]
pub struct NodeLocationIndex {
    map: HashMap<NodeId, u32>,
    internal_indices: Vec<u64>,
    partition_indices: Vec<u32>,
    counts: Vec<u32>,
}

impl NodeLocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct node ids known to this server.
    pub fn node_count(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Load `node_<suffix>.map` from `dir` and fold it into the index as
    /// partition `partition_index`.
    ///
    /// Any failure here is startup-fatal: the caller aborts the load.
    pub fn load_partition(
        &mut self,
        dir: &Path,
        suffix: &str,
        partition_index: u32,
    ) -> Result<()> {
        let path = dir.join(format!("node_{}.map", suffix));
        let file = File::open(&path).map_err(|source| GraphError::OpenFile {
            path: path.clone(),
            source,
        })?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(GraphError::Io)?;
        self.load_bytes(&mmap, suffix, partition_index)?;
        tracing::info!(
            partition = partition_index,
            suffix,
            "loaded node map ({} bytes)",
            mmap.len()
        );
        Ok(())
    }

    /// Fold one partition's node-map bytes into the index.
    ///
    /// Record `i` must carry `local_index == i`: local slots are dense and
    /// written in order by the partitioner. The trailing type tag is
    /// decoded for width validation only; partitions re-expose node types
    /// through `get_node_type`.
    pub fn load_bytes(&mut self, bytes: &[u8], suffix: &str, partition_index: u32) -> Result<()> {
        if bytes.len() % NODE_MAP_RECORD_SIZE != 0 {
            return Err(GraphError::NodeMap {
                suffix: suffix.to_string(),
                message: format!(
                    "file size {} is not a multiple of the {}-byte record",
                    bytes.len(),
                    NODE_MAP_RECORD_SIZE
                ),
            });
        }

        let record_count = bytes.len() / NODE_MAP_RECORD_SIZE;
        self.internal_indices.reserve(record_count);
        self.partition_indices.reserve(record_count);
        self.counts.reserve(record_count);

        for (i, record) in bytes.chunks_exact(NODE_MAP_RECORD_SIZE).enumerate() {
            let global_id = u64::from_le_bytes(record[0..8].try_into().unwrap());
            let local_index = u64::from_le_bytes(record[8..16].try_into().unwrap());
            if local_index != i as u64 {
                return Err(GraphError::NodeMap {
                    suffix: suffix.to_string(),
                    message: format!(
                        "record {} carries local index {}; slots must be dense and in order",
                        i, local_index
                    ),
                });
            }
            self.insert(global_id, local_index, partition_index);
        }
        Ok(())
    }

    fn insert(&mut self, global_id: NodeId, local_index: u64, partition_index: u32) {
        let new_offset = self.internal_indices.len() as u32;
        match self.map.get(&global_id).copied() {
            None => {
                self.internal_indices.push(local_index);
                self.partition_indices.push(partition_index);
                self.counts.push(1);
                self.map.insert(global_id, new_offset);
            }
            Some(old_offset) => {
                // Copy the existing run to the end of the arena and append
                // the new pair; the old block is abandoned.
                let old_offset = old_offset as usize;
                let old_count = self.counts[old_offset] as usize;

                self.internal_indices
                    .extend_from_within(old_offset..old_offset + old_count);
                self.internal_indices.push(local_index);

                self.partition_indices
                    .extend_from_within(old_offset..old_offset + old_count);
                self.partition_indices.push(partition_index);

                let new_count = (old_count + 1) as u32;
                self.counts
                    .extend(std::iter::repeat(new_count).take(old_count + 1));

                self.map.insert(global_id, new_offset);
            }
        }
    }

    /// Look up a node's run. `None` means this server holds no copy.
    pub fn find(&self, node_id: NodeId) -> Option<LocationRun> {
        self.map.get(&node_id).map(|&offset| LocationRun {
            offset,
            count: self.counts[offset as usize],
        })
    }

    /// Iterate a run's `(partition, local_index)` pairs in load order.
    pub fn locations(&self, run: LocationRun) -> impl Iterator<Item = NodeLocation> + '_ {
        let start = run.offset as usize;
        let end = start + run.count as usize;
        self.partition_indices[start..end]
            .iter()
            .zip(&self.internal_indices[start..end])
            .map(|(&partition, &local_index)| NodeLocation {
                partition,
                local_index,
            })
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Encode `(global_id, local_index, node_type)` triples the way the
    /// partitioner writes them.
    pub(crate) fn encode_node_map(records: &[(u64, u64, i32)]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(records.len() * NODE_MAP_RECORD_SIZE);
        for &(global_id, local_index, node_type) in records {
            bytes.extend_from_slice(&global_id.to_le_bytes());
            bytes.extend_from_slice(&local_index.to_le_bytes());
            bytes.extend_from_slice(&node_type.to_le_bytes());
        }
        bytes
    }

    fn locations_of(index: &NodeLocationIndex, node_id: NodeId) -> Vec<(u32, u64)> {
        let run = index.find(node_id).expect("node missing");
        index
            .locations(run)
            .map(|l| (l.partition, l.local_index))
            .collect()
    }

    #[test]
    fn test_single_partition_load() {
        let mut index = NodeLocationIndex::new();
        let bytes = encode_node_map(&[(10, 0, 1), (20, 1, 2), (30, 2, 1)]);
        index.load_bytes(&bytes, "0", 0).unwrap();

        assert_eq!(index.node_count(), 3);
        assert_eq!(locations_of(&index, 10), vec![(0, 0)]);
        assert_eq!(locations_of(&index, 20), vec![(0, 1)]);
        assert_eq!(locations_of(&index, 30), vec![(0, 2)]);
        assert!(index.find(40).is_none());
    }

    #[test]
    fn test_run_copy_on_second_partition() {
        let mut index = NodeLocationIndex::new();
        index
            .load_bytes(&encode_node_map(&[(5, 0, 1), (6, 1, 1)]), "0", 0)
            .unwrap();
        index
            .load_bytes(&encode_node_map(&[(5, 0, 1)]), "1", 1)
            .unwrap();

        // Node 5 now has two copies, in partition load order.
        assert_eq!(locations_of(&index, 5), vec![(0, 0), (1, 0)]);
        // Node 6 is untouched by the second partition.
        assert_eq!(locations_of(&index, 6), vec![(0, 1)]);
    }

    #[test]
    fn test_triple_copy_preserves_order() {
        let mut index = NodeLocationIndex::new();
        index
            .load_bytes(&encode_node_map(&[(7, 0, 1)]), "0", 0)
            .unwrap();
        index
            .load_bytes(&encode_node_map(&[(9, 0, 1), (7, 1, 1)]), "1", 1)
            .unwrap();
        index
            .load_bytes(&encode_node_map(&[(7, 0, 1)]), "2", 2)
            .unwrap();

        assert_eq!(locations_of(&index, 7), vec![(0, 0), (1, 1), (2, 0)]);
        assert_eq!(index.find(7).unwrap().count(), 3);
        assert_eq!(locations_of(&index, 9), vec![(1, 0)]);
    }

    #[test]
    fn test_short_file_rejected() {
        let mut index = NodeLocationIndex::new();
        let mut bytes = encode_node_map(&[(1, 0, 1)]);
        bytes.pop(); // truncate the trailing type tag
        let err = index.load_bytes(&bytes, "0", 0).unwrap_err();
        assert!(matches!(err, GraphError::NodeMap { .. }));
    }

    #[test]
    fn test_sparse_local_index_rejected() {
        let mut index = NodeLocationIndex::new();
        let bytes = encode_node_map(&[(1, 0, 1), (2, 2, 1)]);
        let err = index.load_bytes(&bytes, "3", 0).unwrap_err();
        match err {
            GraphError::NodeMap { suffix, .. } => assert_eq!(suffix, "3"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_partition_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = encode_node_map(&[(42, 0, 3)]);
        std::fs::write(dir.path().join("node_0.map"), &bytes).unwrap();

        let mut index = NodeLocationIndex::new();
        index.load_partition(dir.path(), "0", 0).unwrap();
        assert_eq!(locations_of(&index, 42), vec![(0, 0)]);
    }

    #[test]
    fn test_missing_map_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = NodeLocationIndex::new();
        let err = index.load_partition(dir.path(), "0", 0).unwrap_err();
        assert!(matches!(err, GraphError::OpenFile { .. }));
    }
}
