//! Graph-wide metadata summary.
//!
//! Written once by the partitioning pipeline as `meta.json` in the base
//! directory and read on every server start. Immutable after load; the
//! `GetMetadata` RPC serves a flattened snapshot of it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Summary of the whole graph this server holds a slice of.
///
/// Weight vectors are indexed `[partition][type]` and drive client-side
/// normalization when sampling results are federated across servers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Format/version tag of the partitioning run that produced the data.
    pub version: String,

    pub node_count: u64,
    pub edge_count: u64,

    pub node_type_count: usize,
    pub edge_type_count: usize,

    pub node_feature_count: usize,
    pub edge_feature_count: usize,

    /// Total partition count across the whole graph, not just this server.
    pub partition_count: usize,

    /// Per-partition node weight totals, one entry per node type.
    #[serde(default)]
    pub partition_node_weights: Vec<Vec<f32>>,

    /// Per-partition edge weight totals, one entry per edge type.
    #[serde(default)]
    pub partition_edge_weights: Vec<Vec<f32>>,

    #[serde(default)]
    pub node_count_per_type: Vec<u64>,

    #[serde(default)]
    pub edge_count_per_type: Vec<u64>,
}

impl Metadata {
    /// Read metadata from `<path>/meta.json`.
    pub fn read_from(path: &Path) -> Result<Self> {
        let file_path = path.join("meta.json");
        let contents = std::fs::read_to_string(&file_path).map_err(|source| {
            GraphError::OpenFile {
                path: file_path,
                source,
            }
        })?;
        let metadata: Self = serde_json::from_str(&contents)?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Check per-type vector lengths against the declared type counts.
    ///
    /// Weight vectors may be absent entirely (older pipelines), but a
    /// present vector with the wrong arity is a broken file.
    pub fn validate(&self) -> Result<()> {
        for (partition, weights) in self.partition_node_weights.iter().enumerate() {
            if weights.len() != self.node_type_count {
                return Err(GraphError::Metadata(format!(
                    "partition {} node weights: expected {} entries, got {}",
                    partition,
                    self.node_type_count,
                    weights.len()
                )));
            }
        }
        for (partition, weights) in self.partition_edge_weights.iter().enumerate() {
            if weights.len() != self.edge_type_count {
                return Err(GraphError::Metadata(format!(
                    "partition {} edge weights: expected {} entries, got {}",
                    partition,
                    self.edge_type_count,
                    weights.len()
                )));
            }
        }
        if !self.node_count_per_type.is_empty()
            && self.node_count_per_type.len() != self.node_type_count
        {
            return Err(GraphError::Metadata(format!(
                "node counts per type: expected {} entries, got {}",
                self.node_type_count,
                self.node_count_per_type.len()
            )));
        }
        if !self.edge_count_per_type.is_empty()
            && self.edge_count_per_type.len() != self.edge_type_count
        {
            return Err(GraphError::Metadata(format!(
                "edge counts per type: expected {} entries, got {}",
                self.edge_type_count,
                self.edge_count_per_type.len()
            )));
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Metadata {
        Metadata {
            version: "v2".to_string(),
            node_count: 100,
            edge_count: 400,
            node_type_count: 2,
            edge_type_count: 3,
            node_feature_count: 4,
            edge_feature_count: 1,
            partition_count: 2,
            partition_node_weights: vec![vec![10.0, 5.0], vec![7.0, 3.0]],
            partition_edge_weights: vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
            node_count_per_type: vec![60, 40],
            edge_count_per_type: vec![100, 200, 100],
        }
    }

    #[test]
    fn test_read_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = sample();
        let json = serde_json::to_string_pretty(&metadata).unwrap();
        std::fs::write(dir.path().join("meta.json"), json).unwrap();

        let loaded = Metadata::read_from(dir.path()).unwrap();
        assert_eq!(loaded, metadata);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = Metadata::read_from(dir.path()).unwrap_err();
        assert!(matches!(err, GraphError::OpenFile { .. }));
    }

    #[test]
    fn test_bad_weight_arity_rejected() {
        let mut metadata = sample();
        metadata.partition_node_weights[1].pop();
        assert!(matches!(
            metadata.validate(),
            Err(GraphError::Metadata(_))
        ));
    }

    #[test]
    fn test_empty_per_type_vectors_allowed() {
        let mut metadata = sample();
        metadata.node_count_per_type.clear();
        metadata.edge_count_per_type.clear();
        metadata.partition_node_weights.clear();
        metadata.partition_edge_weights.clear();
        assert!(metadata.validate().is_ok());
    }
}
