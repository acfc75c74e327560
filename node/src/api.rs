//! # REST + WebSocket API
//!
//! The axum router in front of the payment engine and the wallet bridges.
//! Handlers are thin: parse, call one engine or bridge operation, map the
//! result onto a status code. All the interesting decisions live in
//! `ridepay-protocol`.
//!
//! ## Endpoints
//!
//! | Method | Path                                   | Description                      |
//! |--------|----------------------------------------|----------------------------------|
//! | GET    | `/health`                              | Liveness check                   |
//! | GET    | `/status`                              | Node summary                     |
//! | GET    | `/ws`                                  | Live payment and wallet events   |
//! | GET    | `/sessions`                            | All tracked sessions             |
//! | POST   | `/sessions`                            | Open a payment session           |
//! | GET    | `/sessions/:id`                        | Session status (lazy expiry)     |
//! | POST   | `/sessions/:id/verify`                 | Check the ledger now             |
//! | DELETE | `/sessions/:id`                        | Cancel a pending session         |
//! | GET    | `/rides/:ride_id/bids/:bid_id/session` | Active session for a ride/bid    |
//! | GET    | `/wallets`                             | Every bridge's state             |
//! | GET    | `/wallets/:provider`                   | One bridge's state               |
//! | POST   | `/wallets/:provider/connect`           | Start the wallet handshake       |
//! | POST   | `/wallets/:provider/sign`              | Ask the wallet to sign           |
//! | DELETE | `/wallets/:provider`                   | Forget the wallet                |
//! | POST   | `/deeplinks`                           | Deliver an inbound wallet link   |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ridepay_protocol::bridge::{
    BridgeError, BridgeStatus, CallbackOutcome, DeepLinkRouter, DispatchedLink,
    WalletBridgeSession, WalletProvider,
};
use ridepay_protocol::config::Cluster;
use ridepay_protocol::crypto::decode_base58;
use ridepay_protocol::payment::{
    CreateSessionRequest, PaymentEngine, PaymentError, PaymentSession, SessionCreated,
    StatusReport,
};

use crate::events::NodeEvent;
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub cluster: Cluster,
    pub engine: PaymentEngine,
    pub wallets: DeepLinkRouter,
    /// Merged event stream served on `/ws`.
    pub event_tx: broadcast::Sender<NodeEvent>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/ws", get(ws_handler))
        .route("/sessions", get(list_sessions_handler).post(create_session_handler))
        .route(
            "/sessions/:id",
            get(session_status_handler).delete(cancel_session_handler),
        )
        .route("/sessions/:id/verify", post(verify_session_handler))
        .route(
            "/rides/:ride_id/bids/:bid_id/session",
            get(active_session_handler),
        )
        .route("/wallets", get(wallets_handler))
        .route(
            "/wallets/:provider",
            get(wallet_status_handler).delete(wallet_disconnect_handler),
        )
        .route("/wallets/:provider/connect", post(wallet_connect_handler))
        .route("/wallets/:provider/sign", post(wallet_sign_handler))
        .route("/deeplinks", post(deeplink_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub cluster: String,
    pub sessions: usize,
    pub active_pollers: usize,
    pub wallets: Vec<BridgeStatus>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// Whether this call completed the session.
    pub verified: bool,
    #[serde(flatten)]
    pub report: StatusReport,
}

#[derive(Debug, Deserialize)]
pub struct SignBody {
    /// Serialized unsigned transaction, base58.
    pub transaction: String,
}

#[derive(Debug, Deserialize)]
pub struct DeepLinkBody {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeepLinkResponse {
    pub provider: WalletProvider,
    pub outcome: CallbackOutcome,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An error on its way to becoming a JSON response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            code: self.code.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<PaymentError> for ApiError {
    fn from(e: PaymentError) -> Self {
        let (status, code) = match &e {
            PaymentError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "invalid_amount"),
            PaymentError::MissingField(_) => (StatusCode::BAD_REQUEST, "missing_field"),
            PaymentError::InvalidReceivingAddress(_) | PaymentError::InvalidTimeout(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "invalid_config")
            }
            PaymentError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            PaymentError::NotPending { .. } => (StatusCode::CONFLICT, "not_pending"),
        };
        ApiError::new(status, code, e.to_string())
    }
}

impl From<BridgeError> for ApiError {
    fn from(e: BridgeError) -> Self {
        let status = match &e {
            BridgeError::InvalidState { .. } | BridgeError::UnexpectedCallback { .. } => {
                StatusCode::CONFLICT
            }
            BridgeError::UnroutableCallback => StatusCode::NOT_FOUND,
            BridgeError::MalformedCallback(_)
            | BridgeError::Crypto(_)
            | BridgeError::Rejected { .. }
            | BridgeError::UnrecognizedResponse
            | BridgeError::InvalidTransaction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BridgeError::Broadcast(_) | BridgeError::Dispatch(_) => StatusCode::BAD_GATEWAY,
            BridgeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, e.code(), e.to_string())
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn bridge_for(state: &AppState, provider: &str) -> ApiResult<WalletBridgeSession> {
    let provider: WalletProvider = provider
        .parse()
        .map_err(|e: String| ApiError::new(StatusCode::NOT_FOUND, "unknown_provider", e))?;
    state.wallets.bridge(provider).cloned().ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "unknown_provider",
            format!("no bridge configured for {provider}"),
        )
    })
}

// ---------------------------------------------------------------------------
// Node Handlers
// ---------------------------------------------------------------------------

/// `GET /health`. Liveness only; says nothing about the ledger.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: state.version.clone(),
        cluster: state.cluster.to_string(),
        sessions: state.engine.session_count(),
        active_pollers: state.engine.active_poller_count(),
        wallets: state.wallets.bridges().iter().map(|b| b.status()).collect(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /ws`. Push-only: clients get JSON [`NodeEvent`]s and anything they
/// send is ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to serialize ws event");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "ws subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Session Handlers
// ---------------------------------------------------------------------------

async fn list_sessions_handler(State(state): State<AppState>) -> Json<Vec<PaymentSession>> {
    Json(state.engine.list_sessions())
}

async fn create_session_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<SessionCreated>)> {
    let created = state.engine.create_session(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /sessions/:id`. Unknown ids get a 404 carrying the usual report.
async fn session_status_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> (StatusCode, Json<StatusReport>) {
    let report = state.engine.get_status(&id);
    let status = if report.found {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (status, Json(report))
}

async fn verify_session_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> (StatusCode, Json<VerifyResponse>) {
    let verified = state.engine.verify_now(&id).await;
    let report = state.engine.get_status(&id);
    let status = if report.found {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (status, Json(VerifyResponse { verified, report }))
}

async fn cancel_session_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<PaymentSession>> {
    Ok(Json(state.engine.cancel_session(&id)?))
}

async fn active_session_handler(
    Path((ride_id, bid_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> ApiResult<Json<PaymentSession>> {
    state
        .engine
        .get_active_session_for(&ride_id, &bid_id)
        .map(Json)
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("no pending session for ride {ride_id} bid {bid_id}"),
            )
        })
}

// ---------------------------------------------------------------------------
// Wallet Handlers
// ---------------------------------------------------------------------------

async fn wallets_handler(State(state): State<AppState>) -> Json<Vec<BridgeStatus>> {
    Json(state.wallets.bridges().iter().map(|b| b.status()).collect())
}

async fn wallet_status_handler(
    Path(provider): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<BridgeStatus>> {
    Ok(Json(bridge_for(&state, &provider)?.status()))
}

/// `POST /wallets/:provider/connect`. Returns the link the client should
/// open: the wallet's connect URL, or its install page.
async fn wallet_connect_handler(
    Path(provider): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<DispatchedLink>> {
    let bridge = bridge_for(&state, &provider)?;
    Ok(Json(bridge.connect().await?))
}

async fn wallet_sign_handler(
    Path(provider): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<SignBody>,
) -> ApiResult<Json<DispatchedLink>> {
    let bridge = bridge_for(&state, &provider)?;
    let transaction = decode_base58("transaction", &body.transaction).map_err(|e| {
        ApiError::new(StatusCode::BAD_REQUEST, "invalid_transaction", e.to_string())
    })?;
    Ok(Json(bridge.sign_transaction(&transaction).await?))
}

async fn wallet_disconnect_handler(
    Path(provider): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<BridgeStatus>> {
    let bridge = bridge_for(&state, &provider)?;
    bridge.disconnect();
    Ok(Json(bridge.status()))
}

/// `POST /deeplinks`. The client forwards whatever URL the OS handed it.
async fn deeplink_handler(
    State(state): State<AppState>,
    Json(body): Json<DeepLinkBody>,
) -> ApiResult<Json<DeepLinkResponse>> {
    let routed = match state.wallets.route(&body.url).await {
        Ok(routed) => routed,
        Err(e) => {
            state
                .metrics
                .bridge_callbacks_total
                .with_label_values(&["none", e.code()])
                .inc();
            return Err(e.into());
        }
    };

    let provider = routed.provider;
    let label = match &routed.outcome {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    state
        .metrics
        .bridge_callbacks_total
        .with_label_values(&[provider.slug(), label])
        .inc();

    Ok(Json(DeepLinkResponse {
        provider,
        outcome: routed.outcome?,
    }))
}
