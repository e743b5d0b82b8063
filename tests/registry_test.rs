//! Tests for the connection registry and broadcast fan-out

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::time::{timeout, Duration};
use netpipe::relay::{ConnectionId, PeerHandle, PeerSession, Registry, SharedSink};

fn new_peer() -> (PeerHandle, DuplexStream) {
    let (writer, reader) = tokio::io::duplex(256);
    let addr: SocketAddr = "127.0.0.1:7000".parse().unwrap();
    let session = Arc::new(PeerSession::new(ConnectionId::next(), addr));
    (PeerHandle::new(session, SharedSink::new("peer", writer)), reader)
}

async fn drain(peer: PeerHandle, mut reader: DuplexStream) -> Vec<u8> {
    peer.sink.shutdown().await.unwrap();
    drop(peer);
    let mut received = Vec::new();
    timeout(Duration::from_secs(2), reader.read_to_end(&mut received))
        .await
        .expect("read timed out")
        .unwrap();
    received
}

#[tokio::test]
async fn test_every_peer_receives_each_byte_once() {
    let registry = Registry::new();
    let mut peers = Vec::new();

    for _ in 0..8 {
        let (peer, reader) = new_peer();
        registry.add(peer.clone()).await;
        peers.push((peer, reader));
    }

    registry.broadcast(b'q').await;

    for (peer, reader) in peers {
        assert_eq!(drain(peer, reader).await, b"q");
    }
}

#[tokio::test]
async fn test_failed_peer_is_evicted_and_others_continue() {
    let registry = Registry::new();

    let (healthy, healthy_reader) = new_peer();
    let (broken, broken_reader) = new_peer();
    let broken_id = broken.id();

    registry.add(healthy.clone()).await;
    registry.add(broken).await;
    drop(broken_reader);

    registry.broadcast(b'1').await;
    assert!(!registry.contains(broken_id).await);
    assert_eq!(registry.len().await, 1);

    registry.broadcast(b'2').await;
    assert_eq!(registry.len().await, 1);

    assert_eq!(drain(healthy, healthy_reader).await, b"12");
}

#[tokio::test]
async fn test_removed_peer_receives_nothing() {
    let registry = Registry::new();
    let (peer, reader) = new_peer();

    registry.add(peer.clone()).await;
    registry.broadcast(b'a').await;
    registry.remove(peer.id()).await;
    registry.broadcast(b'b').await;

    assert_eq!(drain(peer, reader).await, b"a");
}

#[tokio::test]
async fn test_broadcast_with_no_peers() {
    let registry = Registry::new();
    registry.broadcast(b'x').await;
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_concurrent_registration_sees_whole_bytes() {
    let registry = Registry::new();
    let (first, first_reader) = new_peer();
    registry.add(first.clone()).await;

    let broadcaster = {
        let registry = registry.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                registry.broadcast(b'z').await;
            }
        })
    };

    let (late, late_reader) = new_peer();
    registry.add(late.clone()).await;
    broadcaster.await.unwrap();

    let first_bytes = drain(first, first_reader).await;
    let late_bytes = drain(late, late_reader).await;

    assert_eq!(first_bytes.len(), 50);
    assert!(late_bytes.len() <= 50);
    assert!(late_bytes.iter().all(|b| *b == b'z'));
}
