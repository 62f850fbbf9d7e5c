use std::sync::Arc;

use axum::{
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    extract::State,
    http::Method,
    response::Response,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use varta_shared::constants::{MAX_FRAME_SIZE, RELAY_WS_PATH};
use varta_shared::protocol::{ClientFrame, ServerFrame};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::hub::RelayHub;

#[derive(Clone)]
pub struct AppState {
    pub hub: RelayHub,
    pub config: Arc<RelayConfig>,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            hub: RelayHub::new(config.channel_capacity),
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route(RELAY_WS_PATH, get(ws_upgrade))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    connections: usize,
    rooms: usize,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        connections: state.hub.connection_count().await,
        rooms: state.hub.room_count().await,
    })
}

async fn ws_upgrade(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, RelayError> {
    let max = state.config.max_connections;
    if max > 0 && state.hub.connection_count().await >= max {
        warn!(max, "Connection limit reached, refusing upgrade");
        return Err(RelayError::ConnectionLimit(max));
    }
    Ok(ws
        .max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| handle_socket(state.hub, socket)))
}

/// One client session: greet, then pump frames both ways until either side closes.
async fn handle_socket(hub: RelayHub, socket: WebSocket) {
    let (id, mut outbound) = hub.register().await;
    let (mut ws_sender, mut ws_receiver) = socket.split();

    hub.send_to(
        &id,
        &ServerFrame::Welcome {
            connection_id: id.clone(),
        },
    )
    .await;

    let writer_id = id.clone();
    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if let Err(e) = ws_sender.send(WsMessage::Text(text)).await {
                debug!(connection = %writer_id, error = %e, "Write failed");
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => match ClientFrame::from_json(&text) {
                Ok(frame) => hub.handle_frame(&id, frame).await,
                Err(e) => warn!(connection = %id, error = %e, "Malformed client frame dropped"),
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection = %id, error = %e, "Read failed");
                break;
            }
        }
    }

    hub.unregister(&id).await;
    writer.abort();
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_listener(state, listener).await
}

/// Serve on an already bound listener (tests bind port 0).
pub async fn serve_listener(state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %listener.local_addr()?, "Starting relay HTTP/WebSocket server");

    axum::serve(listener, app).await?;

    Ok(())
}
