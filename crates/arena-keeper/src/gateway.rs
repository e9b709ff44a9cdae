//! Broadcast gateway: fans state-change notifications out to WebSocket
//! subscribers and serves read-only views of the local store.
//!
//! Delivery is best effort. A subscriber that falls behind the broadcast
//! buffer is disconnected rather than slowing down publishers.

use crate::head::ChainHead;
use alloy::primitives::Address;
use arena_core::{
    Arena,
    ArenaStatus,
    GatewayMessage,
    PlayerEntry,
};
use arena_store::{
    ArenaStore,
    StoreError,
};
use axum::{
    Json,
    Router,
    extract::{
        Path,
        Query,
        State,
        ws::{
            Message,
            WebSocket,
            WebSocketUpgrade,
        },
    },
    http::StatusCode,
    response::{
        IntoResponse,
        Response,
    },
    routing::get,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    io,
    net::SocketAddr,
};
use tokio::sync::broadcast::{
    self,
    error::RecvError,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    error,
    info,
    instrument,
    warn,
};

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("failed to bind gateway address: {addr}")]
    BindAddress {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("gateway server error on {addr}")]
    ServerError {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Publishing half of the gateway. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Gateway {
    tx: broadcast::Sender<GatewayMessage>,
}

impl Gateway {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Sends to every connected subscriber. Never blocks; with no
    /// subscribers the message is dropped.
    pub fn publish(&self, message: GatewayMessage) {
        let kind = message.kind;
        match self.tx.send(message) {
            Ok(receivers) => debug!(target: "arena_keeper::gateway", kind, receivers, "Published"),
            Err(_) => debug!(target: "arena_keeper::gateway", kind, "Published with no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[derive(Clone)]
struct AppState {
    gateway: Gateway,
    store: ArenaStore,
    head: ChainHead,
}

/// HTTP/WebSocket server exposing the gateway.
pub struct GatewayServer {
    bind_addr: SocketAddr,
    state: AppState,
}

impl GatewayServer {
    pub fn new(bind_addr: SocketAddr, gateway: Gateway, store: ArenaStore, head: ChainHead) -> Self {
        Self {
            bind_addr,
            state: AppState {
                gateway,
                store,
                head,
            },
        }
    }

    #[instrument(
        name = "gateway_server::run",
        skip(self, shutdown),
        fields(bind_addr = %self.bind_addr),
        level = "debug"
    )]
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), GatewayError> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| {
                error!(bind_addr = %self.bind_addr, error = ?e, "Failed to bind gateway listener");
                GatewayError::BindAddress {
                    addr: self.bind_addr,
                    source: e,
                }
            })?;
        info!(bind_addr = %self.bind_addr, "Gateway starting");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| {
                error!(error = ?e, "Gateway server failed");
                GatewayError::ServerError {
                    addr: self.bind_addr,
                    source: e,
                }
            })?;

        info!("Gateway stopped");
        Ok(())
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_upgrade))
        .route("/arenas", get(list_arenas))
        .route("/arenas/{id}", get(get_arena))
        .route("/players/{address}", get(get_player))
        .route("/leaderboard", get(leaderboard))
        .with_state(state)
}

/// Router over the given components, for serving on a caller-owned listener.
pub fn gateway_router(gateway: Gateway, store: ArenaStore, head: ChainHead) -> Router {
    router(AppState {
        gateway,
        store,
        head,
    })
}

async fn health() -> &'static str {
    "OK"
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let rx = state.gateway.subscribe();
    ws.on_upgrade(move |socket| stream_to_socket(socket, rx))
}

async fn stream_to_socket(mut socket: WebSocket, mut rx: broadcast::Receiver<GatewayMessage>) {
    debug!(target: "arena_keeper::gateway", "Subscriber connected");
    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Ok(message) => {
                        let Ok(text) = message.to_json() else {
                            continue;
                        };
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(target: "arena_keeper::gateway", missed, "Dropping lagging subscriber");
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    debug!(target: "arena_keeper::gateway", "Subscriber disconnected");
}

enum ApiError {
    NotFound,
    BadRequest(String),
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found").into_response(),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Store(err) => {
                error!(target: "arena_keeper::gateway", error = ?err, "Store read failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

impl ListParams {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ArenaView {
    #[serde(flatten)]
    arena: Arena,
    current_status: ArenaStatus,
}

impl ArenaView {
    fn new(arena: Arena, head: u64) -> Self {
        let current_status = arena.status_at(head);
        Self {
            arena,
            current_status,
        }
    }
}

#[derive(Debug, Serialize)]
struct ArenaDetail {
    #[serde(flatten)]
    arena: ArenaView,
    players: Vec<PlayerEntry>,
}

async fn list_arenas(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ArenaView>>, ApiError> {
    let head = state.head.get();
    let arenas = state.store.arenas(params.limit())?;
    Ok(Json(
        arenas
            .into_iter()
            .map(|arena| ArenaView::new(arena, head))
            .collect(),
    ))
}

async fn get_arena(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ArenaDetail>, ApiError> {
    let arena = state.store.arena(id)?.ok_or(ApiError::NotFound)?;
    let players = state.store.players(id)?;
    Ok(Json(ArenaDetail {
        arena: ArenaView::new(arena, state.head.get()),
        players,
    }))
}

async fn get_player(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Response, ApiError> {
    let address: Address = address
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid address {address}")))?;
    let stats = state.store.player_stats(&address)?.ok_or(ApiError::NotFound)?;
    Ok(Json(stats).into_response())
}

async fn leaderboard(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    Ok(Json(state.store.leaderboard(params.limit())?).into_response())
}
