//! Infectmoji - game server with the embedded web client.

use axum::{
    Router,
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use rust_embed::RustEmbed;
use server::{Broadcast, GameState, Inbound};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// Embedded static assets
#[derive(RustEmbed)]
#[folder = "web"]
struct Assets;

#[derive(Clone)]
struct AppState {
    game_state: Arc<RwLock<GameState>>,
    tx: broadcast::Sender<Broadcast>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,server=debug")),
        )
        .init();

    info!("Infectmoji v{}", env!("CARGO_PKG_VERSION"));

    let config = server::Config::load()?;
    info!("Loaded configuration");
    info!("  Port: {}", config.server.port);
    info!("  Canvas: {} (entity {})", config.world.canvas_size, config.world.entity_size);
    info!("  NPCs: {}", config.npc.count);
    info!("  Stage duration: {}ms", config.stage.duration_ms);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let (game_state, tx) = server::spawn_game(config);
    let state = AppState { game_state, tx };

    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .route("/", get(serve_index))
        .fallback(static_handler)
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);
    info!("Game WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, addr, state))
}

/// Adapt an axum socket to the server's connection driver.
async fn handle_websocket(socket: WebSocket, addr: SocketAddr, state: AppState) {
    info!("New game connection from {}", addr);

    let (write, read) = socket.split();
    let sink = write.with(|text: String| async move { Ok::<_, axum::Error>(Message::Text(text.into())) });
    let stream = read.map(|msg| msg.map(inbound).map_err(anyhow::Error::from));

    if let Err(e) =
        server::drive_connection(Box::pin(sink), stream, addr, state.game_state, state.tx).await
    {
        error!("Connection error from {}: {}", addr, e);
    }
}

fn inbound(message: Message) -> Inbound {
    match message {
        Message::Text(text) => Inbound::Text(text.as_str().to_owned()),
        Message::Close(_) => Inbound::Close,
        _ => Inbound::Ignored,
    }
}

async fn serve_index() -> Response {
    serve_static_file("index.html")
}

/// Handle static file requests
async fn static_handler(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    if path.is_empty() {
        return serve_static_file("index.html");
    }
    serve_static_file(path)
}

/// Serve a static file from embedded assets
fn serve_static_file(path: &str) -> Response {
    match Assets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref().to_owned())],
                content.data.into_owned(),
            )
                .into_response()
        }
        None => {
            warn!("Static file not found: {}", path);
            (StatusCode::NOT_FOUND, "404 Not Found").into_response()
        }
    }
}
