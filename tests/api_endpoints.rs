//! Integration tests for the bpmchain HTTP interface

#![cfg(feature = "api")]

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum_test::TestServer;
use bpmchain::api::{build_api_router, ApiError};
use bpmchain::blockchain::{Block, HashAlgorithm, Rejection};
use bpmchain::config::Config;
use bpmchain::error::ChainError;
use bpmchain::node::{Node, NodeState};
use serde_json::{json, Value};

fn test_server(difficulty: u32) -> (TestServer, Node) {
    let mut config = Config::default();
    config.chain.difficulty = difficulty;
    let node = Node::new(&config);
    node.set_state(NodeState::Ready);

    let server = TestServer::new(build_api_router(node.clone())).expect("Failed to create test server");
    (server, node)
}

#[tokio::test]
async fn test_get_chain_returns_indented_genesis() {
    let (server, _node) = test_server(0);

    let response = server.get("/").await;
    assert_eq!(response.status_code(), 200);
    assert!(response.text().contains("\n  "), "chain JSON should be indented");

    let chain: Vec<Block> = response.json();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0].index, 0);
    assert_eq!(chain[0].prev_hash, "");
}

#[tokio::test]
async fn test_post_payload_creates_block() {
    let (server, node) = test_server(0);
    let genesis = node.store().tip();

    let response = server.post("/").json(&json!({ "payload": 72 })).await;
    assert_eq!(response.status_code(), 201);
    let first: Block = response.json();
    assert_eq!(first.index, 1);
    assert_eq!(first.payload, 72);
    assert_eq!(first.prev_hash, genesis.hash);
    assert_eq!(first.hash, first.computed_hash(HashAlgorithm::Sha256));

    let response = server.post("/").json(&json!({ "payload": 85 })).await;
    assert_eq!(response.status_code(), 201);
    let second: Block = response.json();
    assert_eq!(second.index, 2);
    assert_eq!(second.prev_hash, first.hash);

    let chain: Vec<Block> = server.get("/").await.json();
    assert_eq!(chain, vec![genesis, first, second]);
}

#[tokio::test]
async fn test_post_with_proof_of_work() {
    let (server, _node) = test_server(1);

    let response = server.post("/").json(&json!({ "payload": 60 })).await;
    assert_eq!(response.status_code(), 201);
    let block: Block = response.json();
    assert!(block.hash.starts_with('0'));
    assert_eq!(block.difficulty, Some(1));
}

#[tokio::test]
async fn test_malformed_bodies_are_rejected() {
    let (server, node) = test_server(0);

    let response = server.post("/").json(&json!({ "payload": "abc" })).await;
    assert_eq!(response.status_code(), 400);
    let json: Value = response.json();
    assert!(json["error"].is_string());

    let response = server.post("/").json(&json!({ "payload": -1 })).await;
    assert_eq!(response.status_code(), 400);

    let response = server.post("/").json(&json!({ "bpm": 72 })).await;
    assert_eq!(response.status_code(), 400);

    let response = server.post("/").text("72").await;
    assert_eq!(response.status_code(), 400);

    assert_eq!(node.store().len(), 1);
}

#[tokio::test]
async fn test_tip_and_block_lookup() {
    let (server, _node) = test_server(0);
    server.post("/").json(&json!({ "payload": 72 })).await;

    let tip: Block = server.get("/tip").await.json();
    assert_eq!(tip.index, 1);

    let response = server.get("/blocks/1").await;
    assert_eq!(response.status_code(), 200);
    let block: Block = response.json();
    assert_eq!(block, tip);

    let response = server.get("/blocks/999").await;
    assert_eq!(response.status_code(), 404);
    let json: Value = response.json();
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_offer_chain_runs_fork_choice() {
    let (server, node) = test_server(0);

    let remote = Node::new(&Config::default());
    remote.submit_payload(1).unwrap();
    remote.submit_payload(2).unwrap();

    let response = server.post("/chain").json(&remote.store().snapshot()).await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["replaced"], true);
    assert_eq!(json["length"], 3);
    assert_eq!(json["outcome"], "replaced");
    assert_eq!(node.store().snapshot(), remote.store().snapshot());

    // Same length again: local chain kept.
    let response = server.post("/chain").json(&remote.store().snapshot()).await;
    let json: Value = response.json();
    assert_eq!(json["replaced"], false);
    assert_eq!(json["length"], 3);

    // Longer but broken: refused.
    remote.submit_payload(3).unwrap();
    let mut forged = remote.store().snapshot();
    forged[3].payload = 250;
    let response = server.post("/chain").json(&forged).await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(node.store().len(), 3);
}

#[tokio::test]
async fn test_validate_health_and_stats() {
    let (server, _node) = test_server(0);
    server.post("/").json(&json!({ "payload": 72 })).await;

    let json: Value = server.get("/validate").await.json();
    assert_eq!(json["ok"], true);
    assert_eq!(json["length"], 2);
    assert!(json["error"].is_null());

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["height"], 1);
    assert!(json["timestamp"].is_string());

    let json: Value = server.get("/stats").await.json();
    assert_eq!(json["blocks_submitted"], 1);
    assert_eq!(json["chain_length"], 2);
    assert!(json["total_requests"].as_u64().unwrap() >= 3);
    assert!(json["uptime_seconds"].is_number());
}

#[tokio::test]
async fn test_health_reports_shutdown() {
    let (server, node) = test_server(0);
    node.shutdown();

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), 503);
    let json: Value = response.json();
    assert_eq!(json["status"], "unhealthy");
}

#[tokio::test]
async fn test_cancelled_mining_returns_503() {
    // 64 leading zeros is unreachable; only the shutdown can end the search.
    let (server, node) = test_server(64);
    node.shutdown();

    let response = server.post("/").json(&json!({ "payload": 72 })).await;
    assert_eq!(response.status_code(), 503);
    let json: Value = response.json();
    assert!(json["error"].as_str().unwrap().contains("cancelled"));
    assert_eq!(node.store().len(), 1);
}

#[test]
fn test_chain_error_status_mapping() {
    let status = |err: ChainError| ApiError::from(err).into_response().status();

    let rejected = ChainError::InvalidBlock(Rejection::IndexMismatch { expected: 2, found: 1 });
    assert_eq!(status(rejected), StatusCode::CONFLICT);
    assert_eq!(status(ChainError::InvalidGenesis("empty".into())), StatusCode::CONFLICT);
    assert_eq!(status(ChainError::MiningCancelled { attempts: 1024 }), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(status(ChainError::MiningTimedOut { attempts: 1024 }), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(status(ChainError::IndexOverflow { parent: u64::MAX }), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(status(ChainError::Internal("boom".into())), StatusCode::INTERNAL_SERVER_ERROR);
}
