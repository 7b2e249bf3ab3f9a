//! Broadcast gateway.
//!
//! Every event is encoded once and published on a single broadcast channel.
//! Each connection task relays the channel to its socket, skipping items
//! that exclude it, and feeds `move` messages into the game state.

use crate::config::Config;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use protocol::{EntityId, ServerEvent};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{RwLock, broadcast};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};

pub mod game;

pub use game::{GameState, Joined, run_game_loop, spawn_game};

/// Capacity of the broadcast channel. A full NPC tick is one item per NPC.
pub const BROADCAST_CAPACITY: usize = 4096;

/// One encoded event on the broadcast channel.
#[derive(Debug, Clone)]
pub struct Broadcast {
    /// Client that must not receive this item.
    pub except: Option<EntityId>,
    /// JSON text frame.
    pub text: Arc<str>,
}

impl Broadcast {
    pub fn encode(event: &ServerEvent, except: Option<EntityId>) -> Result<Self, protocol::ProtocolError> {
        Ok(Self {
            except,
            text: event.to_json()?.into(),
        })
    }

    /// Whether the connection owning `id` should forward this item.
    #[inline]
    pub fn is_for(&self, id: EntityId) -> bool {
        self.except != Some(id)
    }
}

/// Encode and publish events. Nobody listening is not an error.
pub fn publish(tx: &broadcast::Sender<Broadcast>, events: Vec<ServerEvent>, except: Option<EntityId>) {
    for event in events {
        match Broadcast::encode(&event, except) {
            Ok(item) => {
                let _ = tx.send(item);
            }
            Err(e) => warn!("Failed to encode {}: {}", event.name(), e),
        }
    }
}

/// A frame read from a client socket, independent of the websocket library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Close,
    /// Pings, pongs and binary frames.
    Ignored,
}

impl From<Message> for Inbound {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Inbound::Text(text.as_str().to_owned()),
            Message::Close(_) => Inbound::Close,
            _ => Inbound::Ignored,
        }
    }
}

/// Drive one client connection until it closes.
///
/// Joins the game, sends the snapshot, then relays broadcasts to `sink` and
/// client messages from `stream` into the game state. The avatar is removed
/// however the connection ends.
pub async fn drive_connection<S, R>(
    mut sink: S,
    mut stream: R,
    addr: SocketAddr,
    state: Arc<RwLock<GameState>>,
    tx: broadcast::Sender<Broadcast>,
) -> anyhow::Result<()>
where
    S: Sink<String> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
    R: Stream<Item = anyhow::Result<Inbound>> + Unpin,
{
    // Subscribe under the write lock so nothing published after the
    // snapshot is missed.
    let (joined, mut rx) = {
        let mut game = state.write().await;
        (game.join(addr), tx.subscribe())
    };
    let id = joined.id;
    publish(&tx, vec![joined.announce], Some(id));

    let result = relay(&mut sink, &mut stream, id, joined.init, &state, &tx, &mut rx).await;

    let left = state.write().await.leave(id);
    publish(&tx, left.into_iter().collect(), None);
    result
}

async fn relay<S, R>(
    sink: &mut S,
    stream: &mut R,
    id: EntityId,
    init: ServerEvent,
    state: &RwLock<GameState>,
    tx: &broadcast::Sender<Broadcast>,
    rx: &mut broadcast::Receiver<Broadcast>,
) -> anyhow::Result<()>
where
    S: Sink<String> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
    R: Stream<Item = anyhow::Result<Inbound>> + Unpin,
{
    sink.send(init.to_json()?).await?;

    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Inbound::Text(text))) => {
                        let result = state.write().await.handle_message(id, &text);
                        match result {
                            Ok(event) => publish(tx, event.into_iter().collect(), None),
                            Err(e) => warn!("Dropping message from {}: {}", id, e),
                        }
                    }
                    Some(Ok(Inbound::Ignored)) => {}
                    Some(Ok(Inbound::Close)) | None => {
                        info!("Client {} closed the connection", id);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", id, e);
                        break;
                    }
                }
            }
            item = rx.recv() => {
                match item {
                    Ok(item) if item.is_for(id) => sink.send(item.text.to_string()).await?,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Client {} lagging, skipped {} events", id, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
    Ok(())
}

/// Connection tracking state (shared across connection handlers).
struct ConnectionState {
    /// Number of connections per IP address.
    ip_connections: HashMap<IpAddr, usize>,
    /// Total number of connections.
    total_connections: usize,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            ip_connections: HashMap::new(),
            total_connections: 0,
        }
    }

    /// Try to add a connection, returns true if allowed.
    fn try_add_connection(&mut self, ip: IpAddr, max_total: usize, max_per_ip: usize) -> bool {
        if self.total_connections >= max_total {
            return false;
        }

        let current = self.ip_connections.get(&ip).copied().unwrap_or(0);
        if current >= max_per_ip {
            return false;
        }

        *self.ip_connections.entry(ip).or_insert(0) += 1;
        self.total_connections += 1;
        true
    }

    fn remove_connection(&mut self, ip: IpAddr) {
        if let Some(count) = self.ip_connections.get_mut(&ip) {
            if *count > 0 {
                *count -= 1;
                self.total_connections = self.total_connections.saturating_sub(1);
            }
            if *count == 0 {
                self.ip_connections.remove(&ip);
            }
        }
    }
}

/// Run the websocket-only game server.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on ws://{}", addr);

    let conn_state = Arc::new(RwLock::new(ConnectionState::new()));
    let max_connections = config.server.max_connections;
    let ip_limit = config.server.ip_limit;

    let (game_state, tx) = spawn_game(config);

    loop {
        let (stream, addr) = listener.accept().await?;
        let ip = addr.ip();

        if !conn_state
            .write()
            .await
            .try_add_connection(ip, max_connections, ip_limit)
        {
            warn!("Connection rejected (limit reached): {}", addr);
            continue;
        }

        let game_state = Arc::clone(&game_state);
        let conn_state = Arc::clone(&conn_state);
        let tx = tx.clone();

        tokio::spawn(async move {
            let result = handle_connection(stream, addr, game_state, tx).await;

            // Always remove from connection tracking when done
            conn_state.write().await.remove_connection(ip);

            if let Err(e) = result {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    game_state: Arc<RwLock<GameState>>,
    tx: broadcast::Sender<Broadcast>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New connection from {}", addr);

    let (write, read) = ws_stream.split();
    let sink = write.with(|text: String| async move {
        Ok::<_, tokio_tungstenite::tungstenite::Error>(Message::text(text))
    });
    let stream = read.map(|msg| msg.map(Inbound::from).map_err(anyhow::Error::from));

    drive_connection(Box::pin(sink), stream, addr, game_state, tx).await
}
