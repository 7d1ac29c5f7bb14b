//! Shared identifier types, constants and engine construction options.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ── Core Identifiers ───────────────────────────────────────────────

/// Global node identifier, stable across the entire graph.
pub type NodeId = u64;

/// Node or edge type tag. Small signed integer; negative means "not set".
pub type Type = i32;

/// Identifier of a feature column.
pub type FeatureId = i32;

/// Sentinel type value for nodes/edges without an assigned type.
pub const DEFAULT_NODE_TYPE: Type = -1;

// ── Feature Metadata ───────────────────────────────────────────────

/// One dense feature column to fetch: column id plus its fixed byte width.
///
/// A dense-feature reply row is the concatenation of the requested columns
/// in request order, so `size` fully determines each column's span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMeta {
    pub id: FeatureId,
    pub size: usize,
}

impl FeatureMeta {
    pub fn new(id: FeatureId, size: usize) -> Self {
        Self { id, size }
    }
}

/// Total byte width of one reply row for a dense feature request.
pub fn feature_vector_size(features: &[FeatureMeta]) -> usize {
    features.iter().map(|f| f.size).sum()
}

// ── Storage Backend Selection ──────────────────────────────────────

/// Which storage backend partition constructors should open files through.
///
/// `Disk` is served locally via memory mapping. `Remote` is passed through
/// to the partition backend together with `config_path`; the engine core
/// never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Disk,
    Remote,
}

impl Default for StorageType {
    fn default() -> Self {
        StorageType::Disk
    }
}

// ── Engine Options ─────────────────────────────────────────────────

/// Construction parameters for [`crate::engine::GraphEngine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Base directory holding metadata, node maps and partition files.
    pub path: PathBuf,

    /// Partition numbers assigned to this server. Files whose suffix does
    /// not start with one of these numbers are ignored during discovery.
    pub partitions: Vec<u32>,

    /// Backend passed through to partition constructors.
    pub storage_type: StorageType,

    /// Extra configuration consumed only by remote storage backends.
    pub config_path: Option<PathBuf>,

    /// Build a hardware-thread worker pool and fan feature queries out
    /// over it. When false, every handler runs inline on the caller.
    pub enable_threadpool: bool,
}

impl EngineOptions {
    pub fn new(path: impl Into<PathBuf>, partitions: Vec<u32>) -> Self {
        Self {
            path: path.into(),
            partitions,
            storage_type: StorageType::Disk,
            config_path: None,
            enable_threadpool: false,
        }
    }
}
