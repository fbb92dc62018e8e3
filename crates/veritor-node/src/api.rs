use crate::node::VeritorNode;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use veritor_economics::{AccountAddress, VeriAmount};
use veritor_oracle::{
    InferenceRequest, ModelHash, OracleConfig, OracleError, OracleStats, RequestId,
};

#[derive(Clone)]
struct AppState {
    node: VeritorNode,
}

// ==================== Request / response bodies ====================
//
// Caller identity arrives in the body; authentication lives in the wallet
// gateway in front of this API, not here.

#[derive(Serialize, Deserialize)]
pub struct RegisterProverRequest {
    pub address: String,
    /// Whole VERI
    pub stake: f64,
}

#[derive(Serialize, Deserialize)]
pub struct IncreaseStakeRequest {
    pub address: String,
    pub amount: f64,
}

#[derive(Serialize, Deserialize)]
pub struct UnregisterProverRequest {
    pub address: String,
}

#[derive(Serialize, Deserialize)]
pub struct RequestInferenceRequest {
    pub requester: String,
    /// 32-byte hex commitment to the model
    pub model_hash: String,
    /// Hex-encoded input payload
    pub input_data: String,
    pub stake: f64,
}

#[derive(Serialize, Deserialize)]
pub struct RequestInferenceResponse {
    pub request_id: u64,
}

#[derive(Serialize, Deserialize)]
pub struct PostInferenceRequest {
    pub prover: String,
    pub request_id: u64,
    /// Hex-encoded output payload
    pub output_data: String,
}

#[derive(Serialize, Deserialize)]
pub struct DisputeInferenceRequest {
    pub challenger: String,
    pub request_id: u64,
    /// Hex-encoded counter-example
    pub counter_example: String,
    pub stake: f64,
}

#[derive(Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub caller: String,
}

#[derive(Serialize, Deserialize)]
pub struct AdminRequest {
    pub owner: String,
}

#[derive(Serialize, Deserialize)]
pub struct UpdateConfigRequest {
    pub owner: String,
    pub min_requester_stake: f64,
    pub min_prover_stake: f64,
    pub dispute_window_secs: u64,
}

#[derive(Serialize, Deserialize)]
pub struct AckResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

#[derive(Serialize, Deserialize)]
pub struct ConfigResponse {
    pub min_requester_stake: String,
    pub min_prover_stake: String,
    pub dispute_window_secs: u64,
}

impl From<OracleConfig> for ConfigResponse {
    fn from(config: OracleConfig) -> Self {
        Self {
            min_requester_stake: config.min_requester_stake.to_string(),
            min_prover_stake: config.min_prover_stake.to_string(),
            dispute_window_secs: config.dispute_window_secs,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct InferenceResponse {
    pub id: u64,
    pub status: String,
    pub requester: String,
    pub prover: Option<String>,
    pub challenger: Option<String>,
    pub model_hash: String,
    pub input_data: String,
    pub output_data: Option<String>,
    pub counter_example: Option<String>,
    pub requester_stake: String,
    pub prover_stake: String,
    pub challenger_stake: String,
    pub dispute_deadline: Option<String>,
    pub inference_valid: Option<bool>,
    pub created_at: String,
    pub settled_at: Option<String>,
}

impl From<InferenceRequest> for InferenceResponse {
    fn from(record: InferenceRequest) -> Self {
        Self {
            id: record.id.value(),
            status: record.status.to_string(),
            requester: record.requester.to_hex(),
            prover: record.prover.map(|p| p.to_hex()),
            challenger: record.challenger.map(|c| c.to_hex()),
            model_hash: record.model_hash.to_hex(),
            input_data: hex::encode(&record.input_data),
            output_data: record.output_data.map(hex::encode),
            counter_example: record.counter_example.map(hex::encode),
            requester_stake: record.requester_stake.to_string(),
            prover_stake: record.prover_stake.to_string(),
            challenger_stake: record.challenger_stake.to_string(),
            dispute_deadline: record.dispute_deadline.map(|d| d.to_rfc3339()),
            inference_valid: record.inference_valid,
            created_at: record.created_at.to_rfc3339(),
            settled_at: record.settled_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ProverResponse {
    pub address: String,
    pub free_stake: String,
    pub registered_at: String,
    pub active_requests: Vec<u64>,
    pub total_posted: u64,
    pub total_finalized: u64,
    pub total_slashed: u64,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub node: String,
    pub oracle: OracleStats,
    pub config: ConfigResponse,
    pub circulating_supply: String,
}

// ==================== Server ====================

pub fn start_api_server(node: VeritorNode, host: String, port: u16) -> JoinHandle<()> {
    let state = AppState { node };

    let app = Router::new()
        .route("/health", get(health))
        .route("/stats", get(get_stats))
        .route("/metrics", get(get_metrics))
        .route("/prover/register", post(register_prover))
        .route("/prover/stake", post(increase_stake))
        .route("/prover/unregister", post(unregister_prover))
        .route("/prover/:address", get(get_prover))
        .route("/inference/request", post(request_inference))
        .route("/inference/post", post(post_inference))
        .route("/inference/dispute", post(dispute_inference))
        .route("/inference/:id", get(get_inference))
        .route("/inference/:id/finalize", post(finalize_inference))
        .route("/admin/config", post(update_config))
        .route("/admin/pause", post(pause_oracle))
        .route("/admin/resume", post(resume_oracle))
        .with_state(Arc::new(state));

    let addr = format!("{}:{}", host, port);
    info!(%addr, "📡 Starting API server");

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind API server");

        axum::serve(listener, app).await.expect("API server failed");
    })
}

// ==================== Error and parse helpers ====================

type ApiError = (StatusCode, Json<ErrorResponse>);

fn oracle_error(err: OracleError) -> ApiError {
    let status = match &err {
        OracleError::InsufficientStake { .. } | OracleError::InvalidConfiguration(_) => {
            StatusCode::BAD_REQUEST
        }
        OracleError::NotFound(_) => StatusCode::NOT_FOUND,
        OracleError::Unauthorized(_) => StatusCode::FORBIDDEN,
        OracleError::InvalidState(_) => StatusCode::CONFLICT,
        OracleError::Paused => StatusCode::SERVICE_UNAVAILABLE,
        OracleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %err, "Oracle operation failed");
    } else {
        debug!(error = %err, "Oracle request rejected");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: err.kind().to_string(),
        }),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            kind: "invalid_request".to_string(),
        }),
    )
}

fn parse_address(s: &str) -> Result<AccountAddress, ApiError> {
    AccountAddress::from_hex(s).map_err(|e| bad_request(format!("invalid address: {}", e)))
}

fn parse_model_hash(s: &str) -> Result<ModelHash, ApiError> {
    ModelHash::from_hex(s).map_err(|e| bad_request(format!("invalid model hash: {}", e)))
}

fn parse_payload(s: &str) -> Result<Vec<u8>, ApiError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(stripped).map_err(|e| bad_request(format!("invalid hex payload: {}", e)))
}

fn parse_amount(veri: f64) -> Result<VeriAmount, ApiError> {
    if !veri.is_finite() || veri < 0.0 {
        return Err(bad_request(format!("invalid amount: {}", veri)));
    }
    Ok(VeriAmount::from_veri(veri))
}

// ==================== Handlers ====================

async fn health() -> &'static str {
    "OK"
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, ApiError> {
    let oracle = state.node.engine.stats().await;
    let config = state.node.engine.get_config().await;
    let supply = state
        .node
        .economics
        .circulating_supply()
        .await
        .map_err(|e| oracle_error(OracleError::Internal(e)))?;

    Ok(Json(StatsResponse {
        node: state.node.name().to_string(),
        oracle,
        config: config.into(),
        circulating_supply: supply.to_string(),
    }))
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> String {
    if let Err(e) = state.node.refresh_gauges().await {
        error!(error = %e, "Failed to refresh metric gauges");
    }
    state.node.metrics.gather()
}

async fn register_prover(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterProverRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let address = parse_address(&req.address)?;
    let stake = parse_amount(req.stake)?;

    state
        .node
        .engine
        .register_prover(address, stake)
        .await
        .map_err(oracle_error)?;
    Ok(Json(AckResponse {
        status: "registered".to_string(),
    }))
}

async fn increase_stake(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IncreaseStakeRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let address = parse_address(&req.address)?;
    let amount = parse_amount(req.amount)?;

    state
        .node
        .engine
        .increase_prover_stake(address, amount)
        .await
        .map_err(oracle_error)?;
    Ok(Json(AckResponse {
        status: "staked".to_string(),
    }))
}

async fn unregister_prover(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UnregisterProverRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let address = parse_address(&req.address)?;

    state
        .node
        .engine
        .unregister_prover(address)
        .await
        .map_err(oracle_error)?;
    Ok(Json(AckResponse {
        status: "unregistered".to_string(),
    }))
}

async fn get_prover(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<ProverResponse>, ApiError> {
    let address = parse_address(&address)?;

    let account = state
        .node
        .engine
        .get_prover_account(address)
        .await
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("prover {} is not registered", address),
                    kind: "not_found".to_string(),
                }),
            )
        })?;

    let mut active: Vec<u64> = account
        .active_requests
        .iter()
        .map(|id| id.value())
        .collect();
    active.sort_unstable();

    Ok(Json(ProverResponse {
        address: account.address.to_hex(),
        free_stake: account.free_stake.to_string(),
        registered_at: account.registered_at.to_rfc3339(),
        active_requests: active,
        total_posted: account.total_posted,
        total_finalized: account.total_finalized,
        total_slashed: account.total_slashed,
    }))
}

async fn request_inference(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RequestInferenceRequest>,
) -> Result<Json<RequestInferenceResponse>, ApiError> {
    let requester = parse_address(&req.requester)?;
    let model_hash = parse_model_hash(&req.model_hash)?;
    let input_data = parse_payload(&req.input_data)?;
    let stake = parse_amount(req.stake)?;

    let id = state
        .node
        .engine
        .request_inference(requester, model_hash, input_data, stake)
        .await
        .map_err(oracle_error)?;
    Ok(Json(RequestInferenceResponse {
        request_id: id.value(),
    }))
}

async fn post_inference(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PostInferenceRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let prover = parse_address(&req.prover)?;
    let output_data = parse_payload(&req.output_data)?;

    state
        .node
        .engine
        .post_inference(prover, RequestId(req.request_id), output_data)
        .await
        .map_err(oracle_error)?;
    Ok(Json(AckResponse {
        status: "posted".to_string(),
    }))
}

async fn dispute_inference(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DisputeInferenceRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let challenger = parse_address(&req.challenger)?;
    let counter_example = parse_payload(&req.counter_example)?;
    let stake = parse_amount(req.stake)?;

    state
        .node
        .engine
        .dispute_inference(challenger, RequestId(req.request_id), counter_example, stake)
        .await
        .map_err(oracle_error)?;
    Ok(Json(AckResponse {
        status: "settled".to_string(),
    }))
}

async fn finalize_inference(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(req): Json<FinalizeRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let caller = parse_address(&req.caller)?;

    state
        .node
        .engine
        .finalize_inference(caller, RequestId(id))
        .await
        .map_err(oracle_error)?;
    Ok(Json(AckResponse {
        status: "finalized".to_string(),
    }))
}

async fn get_inference(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<InferenceResponse>, ApiError> {
    let record = state
        .node
        .engine
        .get_request(RequestId(id))
        .await
        .map_err(oracle_error)?;
    Ok(Json(record.into()))
}

async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateConfigRequest>,
) -> Result<Json<ConfigResponse>, ApiError> {
    let owner = parse_address(&req.owner)?;
    let min_requester_stake = parse_amount(req.min_requester_stake)?;
    let min_prover_stake = parse_amount(req.min_prover_stake)?;

    let new_config = OracleConfig {
        min_requester_stake,
        min_prover_stake,
        dispute_window_secs: req.dispute_window_secs,
    };
    state
        .node
        .engine
        .update_config(owner, new_config.clone())
        .await
        .map_err(oracle_error)?;
    Ok(Json(new_config.into()))
}

async fn pause_oracle(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdminRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let owner = parse_address(&req.owner)?;

    state.node.engine.pause(owner).await.map_err(oracle_error)?;
    Ok(Json(AckResponse {
        status: "paused".to_string(),
    }))
}

async fn resume_oracle(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdminRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let owner = parse_address(&req.owner)?;

    state
        .node
        .engine
        .unpause(owner)
        .await
        .map_err(oracle_error)?;
    Ok(Json(AckResponse {
        status: "resumed".to_string(),
    }))
}
