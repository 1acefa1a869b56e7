//! REST interface for bpmchain
//!
//! `GET /` returns the chain as indented JSON and `POST /` appends a block
//! carrying `{ "payload": <u64> }`. The remaining endpoints expose the tip,
//! single blocks, whole-chain validation, fork choice and node health.

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{self, header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::blockchain::{validate_chain, Block, Chain};
use crate::consensus::ForkOutcome;
use crate::error::ChainError;
use crate::node::{Node, NodeState};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    pub node: Node,
    stats: Arc<RwLock<ApiStats>>,
}

impl ApiState {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            stats: Arc::new(RwLock::new(ApiStats::new())),
        }
    }
}

/// API statistics and monitoring
#[derive(Debug, Default)]
struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    blocks_submitted: u64,
    chains_offered: u64,
    start_time: Option<Instant>,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BlockchainError(ChainError),
    InvalidInput(String),
    NotFound(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BlockchainError(e) => {
                let status = match &e {
                    e if e.is_rejection() => StatusCode::CONFLICT,
                    ChainError::MiningCancelled { .. } | ChainError::MiningTimedOut { .. } => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::BlockchainError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitPayload {
    pub payload: u64,
}

#[derive(Serialize)]
pub struct ForkChoiceResponse {
    pub replaced: bool,
    pub length: usize,
    #[serde(flatten)]
    pub outcome: ForkOutcome,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub ok: bool,
    pub length: usize,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct ApiStatsResponse {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub blocks_submitted: u64,
    pub chains_offered: u64,
    pub chain_length: usize,
    pub uptime_seconds: u64,
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging and statistics middleware
async fn stats_middleware(State(state): State<ApiState>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let status = response.status();
    state.stats.write().await.record_request(status.is_success());

    tracing::info!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the API router with all endpoints
pub fn build_api_router(node: Node) -> Router {
    let state = ApiState::new(node);

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(vec![header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(get_chain).post(submit_block))
        .route("/tip", get(get_tip))
        .route("/blocks/:index", get(get_block))
        .route("/chain", post(offer_chain))
        .route("/validate", get(validate))
        .route("/health", get(health_check))
        .route("/stats", get(get_api_stats))
        .layer(middleware::from_fn_with_state(state.clone(), stats_middleware))
        .with_state(state)
        .layer(cors)
}

/// Bind `addr` and serve the API until the listener fails.
pub async fn run_api_server(node: Node, addr: &str) -> Result<(), ChainError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ChainError::NetworkError(format!("failed to bind {}: {}", addr, e)))?;
    tracing::info!("API server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_api_router(node))
        .await
        .map_err(|e| ChainError::NetworkError(format!("API server failed: {}", e)))
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn get_chain(State(state): State<ApiState>) -> Result<Response, ApiError> {
    let body = serde_json::to_string_pretty(&state.node.store().snapshot())
        .map_err(|e| ApiError::InternalError(format!("failed to serialize chain: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

async fn submit_block(
    State(state): State<ApiState>,
    body: Result<Json<SubmitPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Block>), ApiError> {
    let Json(request) = body?;
    let block = state.node.submit_payload_async(request.payload).await?;

    state.stats.write().await.blocks_submitted += 1;
    Ok((StatusCode::CREATED, Json(block)))
}

async fn get_tip(State(state): State<ApiState>) -> Json<Block> {
    Json(state.node.store().tip())
}

async fn get_block(State(state): State<ApiState>, Path(index): Path<u64>) -> Result<Json<Block>, ApiError> {
    state
        .node
        .store()
        .block(index)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Block {} not found", index)))
}

async fn offer_chain(
    State(state): State<ApiState>,
    body: Result<Json<Chain>, JsonRejection>,
) -> Result<Json<ForkChoiceResponse>, ApiError> {
    let Json(candidate) = body?;
    state.stats.write().await.chains_offered += 1;

    let outcome = state.node.consider_replacement_async(candidate).await.map_err(|e| match e {
        e if e.is_rejection() => ApiError::InvalidInput(e.to_string()),
        e => ApiError::from(e),
    })?;

    Ok(Json(ForkChoiceResponse {
        replaced: outcome.replaced(),
        length: outcome.resulting_len(),
        outcome,
    }))
}

async fn validate(State(state): State<ApiState>) -> Json<ValidateResponse> {
    let store = state.node.store();
    let chain = store.snapshot();
    let result = validate_chain(&chain, store.genesis(), &store.params());

    Json(ValidateResponse {
        ok: result.is_ok(),
        length: chain.len(),
        error: result.err().map(|e| e.to_string()),
    })
}

async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    let node_state = state.node.state();
    let status = match node_state {
        NodeState::Ready => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    let tip = state.node.store().tip();

    (
        status,
        Json(serde_json::json!({
            "status": if status == StatusCode::OK { "healthy" } else { "unhealthy" },
            "node_state": format!("{:?}", node_state),
            "height": tip.index,
            "tip": tip.hash,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

async fn get_api_stats(State(state): State<ApiState>) -> Json<ApiStatsResponse> {
    let stats = state.stats.read().await;
    let uptime = stats.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0);

    Json(ApiStatsResponse {
        total_requests: stats.total_requests,
        successful_requests: stats.successful_requests,
        failed_requests: stats.failed_requests,
        blocks_submitted: stats.blocks_submitted,
        chains_offered: stats.chains_offered,
        chain_length: state.node.store().len(),
        uptime_seconds: uptime,
    })
}
