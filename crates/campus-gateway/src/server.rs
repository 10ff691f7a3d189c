//! Gateway HTTP server: Axum routes over the dispatcher and session store

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use campus_core::Dispatcher;
use campus_core::types::Turn;
use campus_store::SessionStore;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::protocol::{
    ClearRequest, HistoryMessage, HistoryResponse, MessageRequest, MessageResponse,
    SessionResponse, StatusResponse, tool_turn,
};
use crate::session::SessionLocks;

/// Shared state for all requests
#[derive(Clone)]
pub struct GatewayState {
    pub store: SessionStore,
    pub dispatcher: Arc<Dispatcher>,
    pub locks: Arc<SessionLocks>,
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(store: SessionStore, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            locks: Arc::new(SessionLocks::new()),
            start_time: Instant::now(),
        }
    }
}

/// The gateway server
pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
}

impl GatewayServer {
    pub fn new(bind: SocketAddr, state: GatewayState) -> Self {
        Self { state, bind }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Serve until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!("Gateway listening on {}", listener.local_addr()?);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        info!("Gateway stopped");
        Ok(())
    }
}

/// Routes with permissive CORS for the browser frontend
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/", get(index_handler))
        .route("/api/status", get(status_handler))
        .route("/api/session/", post(session_handler))
        .route("/api/message/", post(message_handler))
        .route("/api/chat/", post(message_handler))
        .route("/api/clear/", post(clear_handler))
        .route("/api/history/{session_id}/", get(history_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── HTTP Handlers ──

async fn index_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "campus helpdesk",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "GET /api/status",
            "POST /api/session/",
            "POST /api/message/",
            "POST /api/chat/",
            "POST /api/clear/",
            "GET /api/history/{session_id}/",
        ],
    }))
}

async fn status_handler(State(state): State<GatewayState>) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
        sessions: state.store.session_count().await?,
        uptime_secs: state.start_time.elapsed().as_secs(),
    }))
}

async fn session_handler(State(state): State<GatewayState>) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.store.create_session(None).await?;
    Ok(Json(SessionResponse {
        session_id: session.id,
    }))
}

async fn message_handler(
    State(state): State<GatewayState>,
    body: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = body?;
    let text = request
        .text()
        .ok_or_else(|| ApiError::BadRequest("text is required".to_string()))?
        .to_string();

    let session_id = match request.session_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => {
            if !state.store.session_exists(id).await? {
                return Err(ApiError::NotFound(format!("Unknown session: {}", id)));
            }
            id.to_string()
        }
        _ => state.store.create_session(None).await?.id,
    };

    let _guard = state.locks.acquire(&session_id).await;
    // A clear may have won the lock while this request waited
    if !state.store.session_exists(&session_id).await? {
        return Err(ApiError::NotFound(format!("Unknown session: {}", session_id)));
    }
    let history = state.store.history(&session_id).await?;
    debug!(
        "Session {}: {} prior turn(s), handling message",
        session_id,
        history.len()
    );

    let reply = state.dispatcher.handle(&history, &text).await;

    let mut turns = Vec::with_capacity(reply.tool_calls.len() + 2);
    turns.push(Turn::user(&text));
    turns.extend(reply.tool_calls.iter().map(tool_turn));
    turns.push(Turn::responder(reply.responder, &reply.text));
    state.store.append_turns(&session_id, turns).await?;

    info!("Session {}: answered by {}", session_id, reply.responder);

    Ok(Json(MessageResponse {
        session_id,
        agent: reply.responder,
        text: reply.text,
        tool_calls: reply.tool_calls,
    }))
}

async fn clear_handler(
    State(state): State<GatewayState>,
    body: Option<Json<ClearRequest>>,
) -> Result<Json<SessionResponse>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    if let Some(old) = request.session_id.as_deref().filter(|id| !id.trim().is_empty()) {
        let _guard = state.locks.acquire(old).await;
        if state.store.delete_session(old).await? {
            info!("Cleared session {}", old);
        } else {
            debug!("Clear for unknown session {}, nothing to delete", old);
        }
    }

    let session = state.store.create_session(None).await?;
    Ok(Json(SessionResponse {
        session_id: session.id,
    }))
}

async fn history_handler(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    if !state.store.session_exists(&session_id).await? {
        return Err(ApiError::NotFound(format!("Unknown session: {}", session_id)));
    }
    let messages = state
        .store
        .history(&session_id)
        .await?
        .into_iter()
        .map(HistoryMessage::from)
        .collect();
    Ok(Json(HistoryResponse {
        session_id,
        messages,
    }))
}
