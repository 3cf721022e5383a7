//! Webhook listener for lmgram.
//!
//! Telegram POSTs each update to `/webhook`; the handler hands it to the
//! dispatcher on a background task and answers `200` straight away so
//! Telegram does not retry while the model is still generating.
//!
//! Built on Axum. TLS is expected to be terminated in front of this listener
//! (reverse proxy or load balancer).

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use lmgram_channels::Update;
use lmgram_relay::UpdateDispatcher;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Shared application state for the listener.
pub struct GatewayState {
    pub dispatcher: Arc<UpdateDispatcher>,
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with the webhook and health routes.
pub fn build_router(dispatcher: Arc<UpdateDispatcher>) -> Router {
    let state = Arc::new(GatewayState { dispatcher });
    Router::new()
        .route("/health", get(health_handler))
        .route("/webhook", post(webhook_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB body limit
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve `router` until the process exits.
pub async fn serve(addr: &str, router: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Webhook listener started");
    axum::serve(listener, router).await
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn webhook_handler(
    State(state): State<SharedState>,
    Json(update): Json<Update>,
) -> StatusCode {
    let update = update.into_inbound();
    let Some(event) = update.event else {
        debug!(update_id = update.update_id, "Skipping non-message update");
        return StatusCode::OK;
    };

    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        let chat_id = event.chat_id;
        let outcome = dispatcher.dispatch(event).await;
        debug!(chat_id, ?outcome, "Update handled");
    });

    StatusCode::OK
}
