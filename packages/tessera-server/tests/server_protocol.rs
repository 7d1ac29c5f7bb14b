//! Integration test: framed MessagePack protocol over a unix socket.

use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use std::thread;

use tessera::server::{read_message, serve, write_message, Request, Response};
use tessera::wire::NodeTypesRequest;
use tessera::{GraphEngine, MemoryNode, MemoryPartition, Metadata, NodeLocationIndex};

fn encode_node_map(records: &[(u64, u64, i32)]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(records.len() * 20);
    for &(global_id, local_index, node_type) in records {
        bytes.extend_from_slice(&global_id.to_le_bytes());
        bytes.extend_from_slice(&local_index.to_le_bytes());
        bytes.extend_from_slice(&node_type.to_le_bytes());
    }
    bytes
}

fn test_engine() -> Arc<GraphEngine<MemoryPartition>> {
    let mut index = NodeLocationIndex::new();
    index
        .load_bytes(&encode_node_map(&[(10, 0, 1), (20, 1, 2)]), "0", 0)
        .unwrap();
    let partition = MemoryPartition::new(vec![MemoryNode::new(1), MemoryNode::new(2)]);
    Arc::new(GraphEngine::from_parts(
        Metadata {
            version: "proto-test".to_string(),
            ..Default::default()
        },
        vec![partition],
        index,
        None,
    ))
}

fn start_server() -> UnixStream {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("tessera.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();
    let engine = test_engine();
    thread::spawn(move || {
        let _dir = dir; // keep the socket directory alive for the server
        let _ = serve(listener, engine);
    });
    UnixStream::connect(&socket_path).unwrap()
}

fn roundtrip(stream: &mut UnixStream, request: &Request) -> Response {
    let bytes = rmp_serde::to_vec_named(request).unwrap();
    write_message(stream, &bytes).unwrap();
    let reply = read_message(stream).unwrap().expect("server closed early");
    rmp_serde::from_slice(&reply).unwrap()
}

#[test]
fn node_types_roundtrip() {
    let mut stream = start_server();

    let response = roundtrip(
        &mut stream,
        &Request::GetNodeTypes(NodeTypesRequest {
            node_ids: vec![10, 99, 20],
        }),
    );
    match response {
        Response::NodeTypes(reply) => {
            assert_eq!(reply.offsets, vec![0, 2]);
            assert_eq!(reply.types, vec![1, 2]);
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[test]
fn metadata_roundtrip() {
    let mut stream = start_server();

    let response = roundtrip(&mut stream, &Request::GetMetadata);
    match response {
        Response::Metadata(reply) => assert_eq!(reply.version, "proto-test"),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[test]
fn malformed_payload_yields_error_and_keeps_session() {
    let mut stream = start_server();

    write_message(&mut stream, b"\xC1not msgpack").unwrap();
    let reply = read_message(&mut stream).unwrap().expect("server closed early");
    let response: Response = rmp_serde::from_slice(&reply).unwrap();
    assert!(matches!(response, Response::Error { .. }));

    // The session survives a bad frame.
    let response = roundtrip(&mut stream, &Request::GetMetadata);
    assert!(matches!(response, Response::Metadata(_)));
}

#[test]
fn sequential_requests_share_one_session() {
    let mut stream = start_server();

    for _ in 0..3 {
        let response = roundtrip(
            &mut stream,
            &Request::GetNodeTypes(NodeTypesRequest { node_ids: vec![10] }),
        );
        match response {
            Response::NodeTypes(reply) => assert_eq!(reply.types, vec![1]),
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
