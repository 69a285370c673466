//! Read-only HTTP status endpoint.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use corvid_consensus::RoundInfo;
use corvid_core::{Address, View};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::network::{DynChain, LocalNetwork};

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Core error: {0}")]
    Core(#[from] corvid_core::CoreError),
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = match &self {
            RpcError::NotFound(_) => StatusCode::NOT_FOUND,
            RpcError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// What the endpoint can see of one validator
#[derive(Clone)]
pub struct ValidatorHandle {
    pub address: Address,
    pub chain: Arc<DynChain>,
    pub rounds: watch::Receiver<RoundInfo>,
}

pub struct RpcState {
    pub chain_id: u64,
    pub network: Arc<LocalNetwork>,
    pub validators: Vec<ValidatorHandle>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub chain_id: u64,
    pub messages_delivered: u64,
    pub validators: Vec<ValidatorStatus>,
}

#[derive(Debug, Serialize)]
pub struct ValidatorStatus {
    pub address: String,
    pub height: Option<u64>,
    pub head_hash: Option<String>,
    pub view: View,
    pub proposer: String,
    pub awaiting_request: bool,
}

#[derive(Debug, Serialize)]
pub struct BlockResponse {
    pub height: u64,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: u64,
    pub coinbase: String,
    pub round: u64,
    pub tx_count: usize,
    pub tx_root: String,
    pub committed_seals: usize,
}

/// GET /status - every validator's head and current view
pub async fn get_status(State(state): State<Arc<RpcState>>) -> Json<StatusResponse> {
    let validators = state
        .validators
        .iter()
        .map(|v| {
            let round = v.rounds.borrow().clone();
            ValidatorStatus {
                address: v.address.to_hex(),
                height: v.chain.height(),
                head_hash: v
                    .chain
                    .head()
                    .and_then(|b| b.hash().ok())
                    .map(|h| h.to_hex()),
                view: round.view,
                proposer: round.proposer.to_hex(),
                awaiting_request: round.awaiting_request,
            }
        })
        .collect();

    Json(StatusResponse {
        chain_id: state.chain_id,
        messages_delivered: state.network.delivered(),
        validators,
    })
}

/// GET /blocks/{height} - finalized block as seen by the first validator
pub async fn get_block(
    State(state): State<Arc<RpcState>>,
    Path(height): Path<u64>,
) -> Result<Json<BlockResponse>, RpcError> {
    let block = state
        .validators
        .first()
        .and_then(|v| v.chain.block_by_height(height))
        .ok_or_else(|| RpcError::NotFound(format!("Block at height {} not found", height)))?;

    let extra = block.extra()?;
    Ok(Json(BlockResponse {
        height: block.height(),
        hash: block.hash()?.to_hex(),
        parent_hash: block.parent_hash().to_hex(),
        timestamp: block.header.timestamp,
        coinbase: block.coinbase().to_hex(),
        round: extra.salt.round,
        tx_count: block.txs.len(),
        tx_root: block.header.tx_root.to_hex(),
        committed_seals: extra.committed_seals.len(),
    }))
}

pub fn create_router(state: Arc<RpcState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/status", get(get_status))
        .route("/blocks/{height}", get(get_block))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
