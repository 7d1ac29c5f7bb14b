//! Unix-socket service facade.
//!
//! Binds the engine's query handlers to a framed socket protocol:
//!
//!   Request:  [4-byte length BE] [MessagePack payload]
//!   Response: [4-byte length BE] [MessagePack payload]
//!
//! Payloads are internally-tagged envelopes (`cmd` on requests, `reply`
//! on responses) wrapping the typed messages in [`crate::wire`]. One OS
//! thread per connection; the engine is shared read-only behind an
//! `Arc`, so sessions need no coordination.

use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::engine::GraphEngine;
use crate::partition::Partition;
use crate::wire::{
    EdgeFeaturesRequest, EdgeSparseFeaturesRequest, FeaturesReply, MetadataReply,
    NeighborCountsReply, NeighborsReply, NeighborsRequest, NodeFeaturesRequest,
    NodeSparseFeaturesRequest, NodeTypesReply, NodeTypesRequest, SparseFeaturesReply,
    StringFeaturesReply, UniformSampleReply, UniformSampleRequest, WeightedSampleReply,
    WeightedSampleRequest,
};

/// Reject frames larger than this before allocating for them.
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

// ── Envelopes ──────────────────────────────────────────────────────

/// Client request envelope, tagged by `cmd`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum Request {
    GetNodeTypes(NodeTypesRequest),
    GetNodeFeatures(NodeFeaturesRequest),
    GetEdgeFeatures(EdgeFeaturesRequest),
    GetNodeSparseFeatures(NodeSparseFeaturesRequest),
    GetEdgeSparseFeatures(EdgeSparseFeaturesRequest),
    GetNodeStringFeatures(NodeSparseFeaturesRequest),
    GetEdgeStringFeatures(EdgeSparseFeaturesRequest),
    GetNeighborCounts(NeighborsRequest),
    GetNeighbors(NeighborsRequest),
    WeightedSampleNeighbors(WeightedSampleRequest),
    UniformSampleNeighbors(UniformSampleRequest),
    GetMetadata,
}

/// Server response envelope, tagged by `reply`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "camelCase")]
pub enum Response {
    NodeTypes(NodeTypesReply),
    Features(FeaturesReply),
    SparseFeatures(SparseFeaturesReply),
    StringFeatures(StringFeaturesReply),
    NeighborCounts(NeighborCountsReply),
    Neighbors(NeighborsReply),
    WeightedSample(WeightedSampleReply),
    UniformSample(UniformSampleReply),
    Metadata(MetadataReply),
    Error { error: String },
}

// ── Dispatch ───────────────────────────────────────────────────────

/// Route one decoded request to the engine.
pub fn handle_request<P: Partition>(engine: &GraphEngine<P>, request: Request) -> Response {
    match request {
        Request::GetNodeTypes(req) => Response::NodeTypes(engine.get_node_types(&req)),
        Request::GetNodeFeatures(req) => Response::Features(engine.get_node_features(&req)),
        Request::GetEdgeFeatures(req) => Response::Features(engine.get_edge_features(&req)),
        Request::GetNodeSparseFeatures(req) => {
            Response::SparseFeatures(engine.get_node_sparse_features(&req))
        }
        Request::GetEdgeSparseFeatures(req) => {
            Response::SparseFeatures(engine.get_edge_sparse_features(&req))
        }
        Request::GetNodeStringFeatures(req) => {
            Response::StringFeatures(engine.get_node_string_features(&req))
        }
        Request::GetEdgeStringFeatures(req) => {
            Response::StringFeatures(engine.get_edge_string_features(&req))
        }
        Request::GetNeighborCounts(req) => {
            Response::NeighborCounts(engine.get_neighbor_counts(&req))
        }
        Request::GetNeighbors(req) => Response::Neighbors(engine.get_neighbors(&req)),
        Request::WeightedSampleNeighbors(req) => {
            Response::WeightedSample(engine.weighted_sample_neighbors(&req))
        }
        Request::UniformSampleNeighbors(req) => {
            Response::UniformSample(engine.uniform_sample_neighbors(&req))
        }
        Request::GetMetadata => Response::Metadata(engine.get_metadata()),
    }
}

// ── Framing ────────────────────────────────────────────────────────

/// Read one length-prefixed frame. `Ok(None)` means a clean EOF between
/// frames.
pub fn read_message(stream: &mut UnixStream) -> std::io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("message too large: {} bytes", len),
        ));
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;
    Ok(Some(buf))
}

/// Write one length-prefixed frame.
pub fn write_message(stream: &mut UnixStream, data: &[u8]) -> std::io::Result<()> {
    let len = data.len() as u32;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(data)?;
    stream.flush()?;
    Ok(())
}

// ── Sessions ───────────────────────────────────────────────────────

fn handle_client<P: Partition>(
    mut stream: UnixStream,
    engine: Arc<GraphEngine<P>>,
    client_id: usize,
) {
    tracing::info!(client_id, "client connected");

    loop {
        let msg = match read_message(&mut stream) {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                tracing::info!(client_id, "client disconnected");
                break;
            }
            Err(e) => {
                tracing::warn!(client_id, "read error: {}", e);
                break;
            }
        };

        let response = match rmp_serde::from_slice::<Request>(&msg) {
            Ok(request) => handle_request(&engine, request),
            Err(e) => Response::Error {
                error: format!("invalid request: {}", e),
            },
        };

        let resp_bytes = match rmp_serde::to_vec_named(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(client_id, "serialize error: {}", e);
                continue;
            }
        };

        if let Err(e) = write_message(&mut stream, &resp_bytes) {
            tracing::warn!(client_id, "write error: {}", e);
            break;
        }
    }
}

/// Accept connections forever, one session thread per client.
pub fn serve<P: Partition + 'static>(
    listener: UnixListener,
    engine: Arc<GraphEngine<P>>,
) -> std::io::Result<()> {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let engine = Arc::clone(&engine);
                let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::SeqCst);
                thread::spawn(move || handle_client(stream, engine, client_id));
            }
            Err(e) => tracing::warn!("accept error: {}", e),
        }
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use crate::node_map::NodeLocationIndex;
    use crate::partition::{MemoryNode, MemoryPartition};

    fn empty_engine() -> GraphEngine<MemoryPartition> {
        GraphEngine::from_parts(
            Metadata::default(),
            vec![MemoryPartition::default()],
            NodeLocationIndex::new(),
            None,
        )
    }

    #[test]
    fn test_request_envelope_roundtrip() {
        let request = Request::GetNodeTypes(NodeTypesRequest {
            node_ids: vec![1, 2, 3],
        });
        let bytes = rmp_serde::to_vec_named(&request).unwrap();
        let decoded: Request = rmp_serde::from_slice(&bytes).unwrap();
        match decoded {
            Request::GetNodeTypes(req) => assert_eq!(req.node_ids, vec![1, 2, 3]),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_metadata_request_has_no_body() {
        let bytes = rmp_serde::to_vec_named(&Request::GetMetadata).unwrap();
        let decoded: Request = rmp_serde::from_slice(&bytes).unwrap();
        assert!(matches!(decoded, Request::GetMetadata));
    }

    #[test]
    fn test_dispatch_reaches_engine() {
        let mut index = NodeLocationIndex::new();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&7u64.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&2i32.to_le_bytes());
        index.load_bytes(&bytes, "0", 0).unwrap();
        let engine = GraphEngine::from_parts(
            Metadata::default(),
            vec![MemoryPartition::new(vec![MemoryNode::new(2)])],
            index,
            None,
        );

        let response = handle_request(
            &engine,
            Request::GetNodeTypes(NodeTypesRequest { node_ids: vec![7] }),
        );
        match response {
            Response::NodeTypes(reply) => {
                assert_eq!(reply.offsets, vec![0]);
                assert_eq!(reply.types, vec![2]);
            }
            other => panic!("wrong response: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_command_yields_error_response() {
        let engine = empty_engine();
        let garbage = rmp_serde::to_vec_named(&serde_json::json!({"cmd": "dropTables"})).unwrap();
        let decoded = rmp_serde::from_slice::<Request>(&garbage);
        assert!(decoded.is_err());
        // The session loop turns that into an Error response.
        let response = match decoded {
            Ok(request) => handle_request(&engine, request),
            Err(e) => Response::Error {
                error: format!("invalid request: {}", e),
            },
        };
        assert!(matches!(response, Response::Error { .. }));
    }
}
