use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use pairlink_server::config::ServerConfig;
use pairlink_server::constants::OUTBOUND_QUEUE_CAPACITY;
use pairlink_server::error::AppError;
use pairlink_server::leaderboard_store::LeaderboardStore;
use pairlink_server::protocol::parse_client_message;
use pairlink_server::room_registry::RoomRegistry;
use pairlink_server::server_utils::{make_id, now_ms, parse_room_query, parse_score_submission};
use pairlink_server::session::{Delivery, Outbound, SessionHub};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::EnvFilter;

type SharedState = Arc<Mutex<ServerState>>;

const CLOSE_NORMAL: u16 = 1000;
const CLOSE_POLICY: u16 = 1008;

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
    /// Separate from `tx` so a close still lands when the queue is full.
    close_tx: mpsc::Sender<OutboundMessage>,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

impl From<Delivery> for QueuePolicy {
    fn from(delivery: Delivery) -> Self {
        match delivery {
            Delivery::Direct => Self::DisconnectOnFull,
            Delivery::Broadcast => Self::DropOnFull,
        }
    }
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    hub: SessionHub,
    leaderboard: LeaderboardStore,
}

impl ServerState {
    fn new(hub: SessionHub, leaderboard: LeaderboardStore) -> Self {
        Self {
            clients: HashMap::new(),
            hub,
            leaderboard,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RoomsQuery {
    sort: Option<String>,
    page: Option<String>,
    size: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::parse();
    let board_config = match config.validate().and_then(|()| config.board_config()) {
        Ok(board_config) => board_config,
        Err(error) => {
            tracing::error!(%error, "invalid configuration");
            std::process::exit(2);
        }
    };

    let hub = SessionHub::new(RoomRegistry::new(config.room_capacity), board_config);
    let leaderboard = LeaderboardStore::new(config.leaderboard_path.clone());
    let state = Arc::new(Mutex::new(ServerState::new(hub, leaderboard)));

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/rooms", get(rooms_handler))
        .route(
            "/api/leaderboard",
            get(leaderboard_handler).post(submit_score_handler),
        )
        .route("/ws", get(ws_handler))
        .with_state(state);

    let static_dir = config
        .static_dir
        .clone()
        .filter(|dir| dir.join("index.html").is_file());
    let app = if let Some(static_dir) = static_dir {
        let index_file = static_dir.join("index.html");
        tracing::info!(root = %static_dir.display(), "serving static files");
        app.fallback_service(ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)))
    } else {
        if let Some(dir) = config.static_dir.as_ref() {
            tracing::warn!(root = %dir.display(), "static dir has no index.html, not serving it");
        }
        app
    };

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    tracing::info!(
        port = config.port,
        capacity = config.room_capacity,
        cols = board_config.cols,
        rows = board_config.rows,
        kinds = board_config.kinds,
        "listening"
    );
    axum::serve(listener, app)
        .await
        .expect("server runtime failed");
}

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn rooms_handler(
    State(state): State<SharedState>,
    Query(query): Query<RoomsQuery>,
) -> impl IntoResponse {
    let query = parse_room_query(
        query.sort.as_deref(),
        query.page.as_deref(),
        query.size.as_deref(),
    );
    let guard = state.lock().await;
    Json(guard.hub.room_listing(query))
}

async fn leaderboard_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let guard = state.lock().await;
    Json(guard.leaderboard.top())
}

async fn submit_score_handler(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let value: Value = serde_json::from_slice(&body)
        .map_err(|_| AppError::BadRequest("body must be a JSON object".to_string()))?;
    let (name, score) = parse_score_submission(&value).ok_or_else(|| {
        AppError::BadRequest("name must be a string and score a finite number".to_string())
    })?;
    let mut guard = state.lock().await;
    guard.leaderboard.append(&name, score, now_ms());
    tracing::info!(score, "score submitted");
    Ok(Json(json!({ "ok": true })))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("conn");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_QUEUE_CAPACITY);
    let (close_tx, mut close_rx) = mpsc::channel::<OutboundMessage>(1);

    {
        let mut guard = state.lock().await;
        guard.clients.insert(
            client_id.clone(),
            ClientContext {
                tx: tx.clone(),
                close_tx,
            },
        );
    }
    tracing::info!(client_id, "client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        loop {
            let outbound = tokio::select! {
                biased;
                Some(close) = close_rx.recv() => close,
                Some(outbound) = rx.recv() => outbound,
                else => break,
            };
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(&state, &client_id, raw.as_str()).await;
            }
            Message::Binary(raw) => match std::str::from_utf8(&raw) {
                Ok(text) => handle_client_message(&state, &client_id, text).await,
                Err(_) => tracing::debug!(client_id, "dropping non-utf8 frame"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    handle_disconnect(&state, &client_id).await;
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: &SharedState, client_id: &str, raw: &str) {
    let Some(message) = parse_client_message(raw) else {
        tracing::debug!(client_id, "dropping malformed frame");
        return;
    };
    tracing::trace!(client_id, room_id = message.room_id().unwrap_or("-"), "frame received");
    let mut guard = state.lock().await;
    if !guard.clients.contains_key(client_id) {
        return;
    }
    let outbound = guard.hub.handle(client_id, message);
    deliver(&mut guard, outbound);
}

async fn handle_disconnect(state: &SharedState, client_id: &str) {
    let mut guard = state.lock().await;
    disconnect_client_internal(&mut guard, client_id, CLOSE_NORMAL, "closing");
}

fn disconnect_client_internal(state: &mut ServerState, client_id: &str, code: u16, reason: &str) {
    let Some(context) = state.clients.remove(client_id) else {
        return;
    };
    let _ = context.close_tx.try_send(OutboundMessage::Close {
        code,
        reason: reason.to_string(),
    });
    tracing::info!(client_id, code, "client disconnected");
    let outbound = state.hub.disconnect(client_id);
    deliver(state, outbound);
}

fn deliver(state: &mut ServerState, outbound: Vec<Outbound>) {
    let mut failed_clients = Vec::new();
    for Outbound {
        to,
        message,
        delivery,
    } in outbound
    {
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(%error, "failed to serialize server message");
                continue;
            }
        };
        let policy = QueuePolicy::from(delivery);
        if !send_to_client(state, &to, payload) && policy == QueuePolicy::DisconnectOnFull {
            failed_clients.push(to);
        }
    }
    for client_id in failed_clients {
        tracing::warn!(client_id, "outbound queue full, disconnecting");
        disconnect_client_internal(state, &client_id, CLOSE_POLICY, "outbound queue full");
    }
}

/// `false` only when the client exists and its queue rejected the message.
fn send_to_client(state: &ServerState, client_id: &str, payload: String) -> bool {
    match state.clients.get(client_id) {
        Some(client) => client.tx.try_send(OutboundMessage::Text(payload)).is_ok(),
        None => true,
    }
}
