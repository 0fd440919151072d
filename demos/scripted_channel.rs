//! # Scripted Channel Example
//!
//! Drives a [`ChannelManager`] from an in-process fake server, without any
//! network. Useful as a template for testing UI code against scripted
//! room traffic.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example scripted_channel
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use botc_room_client::{
    BotcError, ChannelManager, ClientConfig, ClientMessage, Connector, RoomSessionRole,
    Transport, VisitorIdentity,
};
use serde_json::json;
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// An in-memory transport and the connector that hands it out
// ─────────────────────────────────────────────────────────────────────

struct ScriptedTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, message: String) -> Result<(), BotcError> {
        self.tx
            .send(message)
            .map_err(|e| BotcError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, BotcError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), BotcError> {
        self.rx.close();
        Ok(())
    }
}

/// Hands out a single pre-wired transport; later attempts are refused.
struct ScriptedConnector {
    transport: Mutex<Option<ScriptedTransport>>,
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, BotcError> {
        tracing::info!("Connector asked for {url}");
        let transport = self
            .transport
            .lock()
            .map_err(|_| BotcError::Connection("connector poisoned".into()))?
            .take()
            .ok_or_else(|| BotcError::Connection("script already used".into()))?;
        Ok(Box::new(transport))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (client_tx, mut server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    let connector = Arc::new(ScriptedConnector {
        transport: Mutex::new(Some(ScriptedTransport {
            tx: client_tx,
            rx: client_rx,
        })),
    });

    let identity = VisitorIdentity::register("Scripted Spectator")?;
    let mut channel = ChannelManager::new(
        RoomSessionRole::Spectator,
        identity,
        connector,
        &ClientConfig::default(),
    );
    channel.connect("demo-room").await?;
    tracing::info!(status = %channel.status(), "Channel open");

    // ── The fake server speaks ──────────────────────────────────────
    let script = [
        json!({"type": "hello", "gid": "demo-room"}),
        json!({
            "type": "state",
            "view": {
                "info": {"gid": "demo-room", "name": "Scripted Table"},
                "seats": [
                    {"seat": 1, "occupant": {"id": "v-ann", "name": "Ann"}},
                    {"seat": 2, "occupant": null},
                    {"seat": 3, "occupant": null}
                ],
                "spectators": [],
                "phase": "SETUP"
            }
        }),
        json!({
            "type": "event",
            "kind": "SpectatorJoined",
            "data": {"spectator_id": "v-bob", "spectator_name": "Bob"}
        }),
        json!({"type": "mystery"}),
        json!({
            "type": "patch",
            "kind": "PhaseChange",
            "data": {"night": 1, "wake_list": []}
        }),
    ];
    for frame in script {
        server_tx.send(frame.to_string())?;
    }

    // Two imperatives are expected; the unknown frame is dropped with a warning.
    for _ in 0..2 {
        let message = channel.next_imperative().await;
        match message.describe() {
            Some(text) => tracing::info!("Imperative: {text}"),
            None => tracing::info!("Imperative: {message:?}"),
        }
    }

    if let Some(snapshot) = channel.latest_snapshot() {
        tracing::info!(
            seats = snapshot.seats().len(),
            occupied = snapshot.occupied_seats(),
            phase = snapshot.phase().unwrap_or("unknown"),
            "Latest snapshot"
        );
    }

    // ── The client speaks back ──────────────────────────────────────
    channel.send(ClientMessage::GetState);
    if let Some(sent) = server_rx.recv().await {
        tracing::info!("Server received: {sent}");
    }

    channel.close().await;
    tracing::info!(status = %channel.status(), "Done");
    Ok(())
}
