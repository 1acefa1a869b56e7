//! Integration tests for the line-delimited TCP interface

use bpmchain::blockchain::Block;
use bpmchain::config::Config;
use bpmchain::error::ChainError;
use bpmchain::network::{StreamServer, PROMPT};
use bpmchain::node::Node;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

async fn start_server(snapshot_interval: Duration) -> (SocketAddr, Node) {
    let (addr, node, _) = start_capped_server(snapshot_interval, 1024 * 1024).await;
    (addr, node)
}

async fn start_capped_server(
    snapshot_interval: Duration,
    max_line_bytes: usize,
) -> (SocketAddr, Node, JoinHandle<Result<(), ChainError>>) {
    let node = Node::new(&Config::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = StreamServer::new(node.clone(), snapshot_interval).with_max_line_bytes(max_line_bytes);
    let handle = tokio::spawn(server.serve(listener));
    (addr, node, handle)
}

async fn wait_for_len(node: &Node, len: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while node.store().len() < len {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("chain did not grow in time");
}

#[tokio::test]
async fn test_prompt_and_payload_submission() {
    let (addr, node) = start_server(Duration::from_secs(30)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut prompt = vec![0u8; PROMPT.len()];
    stream.read_exact(&mut prompt).await.unwrap();
    assert_eq!(prompt, PROMPT.as_bytes());

    stream.write_all(b"72\nnot-a-number\n85\n").await.unwrap();
    wait_for_len(&node, 3).await;

    let chain = node.store().snapshot();
    assert_eq!(chain[1].payload, 72);
    assert_eq!(chain[2].payload, 85);
    assert_eq!(chain[2].prev_hash, chain[1].hash);
}

#[tokio::test]
async fn test_snapshot_pushed_periodically() {
    let (addr, node) = start_server(Duration::from_millis(100)).await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();

    writer.write_all(b"60\n").await.unwrap();
    wait_for_len(&node, 2).await;

    let mut lines = BufReader::new(reader).lines();
    let chain: Vec<Block> = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let line = lines.next_line().await.unwrap().expect("connection closed");
            let Some(start) = line.find('[') else { continue };
            let chain: Vec<Block> = serde_json::from_str(&line[start..]).unwrap();
            if chain.len() == 2 {
                return chain;
            }
        }
    })
    .await
    .expect("no snapshot received");

    assert_eq!(chain, node.store().snapshot());
}

#[tokio::test]
async fn test_competing_chain_line() {
    let (addr, node) = start_server(Duration::from_secs(30)).await;

    let remote = Node::new(&Config::default());
    for payload in [1, 2, 3] {
        remote.submit_payload(payload).unwrap();
    }
    let line = serde_json::to_string(&remote.store().snapshot()).unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(format!("{}\n", line).as_bytes()).await.unwrap();
    wait_for_len(&node, 4).await;

    assert_eq!(node.store().snapshot(), remote.store().snapshot());
}

#[tokio::test]
async fn test_oversized_line_is_dropped() {
    let (addr, node, _server) = start_capped_server(Duration::from_secs(30), 64).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // A long run of digits would parse as a number if it were ever buffered whole.
    let flood = "9".repeat(10_000);
    stream.write_all(flood.as_bytes()).await.unwrap();
    stream.write_all(b"\n72\n").await.unwrap();
    wait_for_len(&node, 2).await;

    let chain = node.store().snapshot();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[1].payload, 72);
}

#[tokio::test]
async fn test_server_stops_on_shutdown() {
    let (_addr, node, server) = start_capped_server(Duration::from_secs(30), 64).await;

    node.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server kept accepting after shutdown")
        .unwrap();
    assert!(result.is_ok());
}
