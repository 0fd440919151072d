//! # Room Session Example
//!
//! Joins a Blood on the Clocktower room over the real services:
//!
//! 1. Load (or register) the persisted visitor identity
//! 2. Create a room, or enter the one named by `BOTC_ROOM`
//! 3. Log every imperative message as it arrives
//! 4. Answer setup tasks automatically with their first option
//! 5. Leave the room on Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! # Start the room service on localhost:8765, then:
//! cargo run --example room_session
//!
//! # Enter an existing room under a chosen name:
//! BOTC_ROOM=abc123 BOTC_NAME=Alice cargo run --example room_session
//!
//! # Point at another deployment:
//! BOTC_SERVICE_WS=wss://botc.example/ws BOTC_SERVICE_URI=https://botc.example/api \
//!     cargo run --example room_session
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use botc_room_client::protocol::{Task, TaskOption};
use botc_room_client::{
    ClientConfig, HttpRoomApi, IdentityStore, RoomSession, TaskPrompter, TaskResolver,
    VisitorIdentity, WebSocketConnector,
};

/// Picks the first offered option for every task.
struct FirstChoice;

#[async_trait]
impl TaskResolver for FirstChoice {
    async fn resolve(&mut self, task: &Task) -> Option<TaskOption> {
        let pick = task.options.first().cloned();
        match &pick {
            Some(option) => tracing::info!(task = %task.id, choice = %option.name, "Answering task"),
            None => tracing::warn!(task = %task.id, "Task offers no options, dismissing"),
        }
        pick
    }
}

async fn load_identity(
    store: &IdentityStore,
) -> Result<VisitorIdentity, Box<dyn std::error::Error>> {
    if let Some(identity) = store.load().await? {
        return Ok(identity);
    }
    let name = std::env::var("BOTC_NAME").unwrap_or_else(|_| "RustVisitor".to_string());
    let identity = VisitorIdentity::register(&name)?;
    store.save(&identity).await?;
    tracing::info!(id = %identity.id, "Registered new visitor");
    Ok(identity)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for frame-level output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let config = ClientConfig::from_env();
    let identity = load_identity(&IdentityStore::new(config.identity_path.clone())).await?;
    tracing::info!(name = %identity.name, ws = %config.ws_base, api = %config.api_base, "Starting");

    let api = Arc::new(HttpRoomApi::new(config.api_base.clone()));
    let connector = Arc::new(
        WebSocketConnector::new()
            .with_connect_timeout(std::time::Duration::from_secs(10)),
    );
    let mut session = RoomSession::new(identity.clone(), api, connector, config);
    let mut prompter = TaskPrompter::new(identity, FirstChoice);

    // ── Enter ───────────────────────────────────────────────────────
    let role = match std::env::var("BOTC_ROOM") {
        Ok(room_id) => session.enter(&room_id).await?,
        Err(_) => session.create_room().await?,
    };
    tracing::info!(
        room = session.room_id().unwrap_or_default(),
        %role,
        "Entered room"
    );

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            message = session.store().next_imperative() => {
                if let Some(text) = message.describe() {
                    tracing::info!("{text}");
                }
                if let Some(outcome) = prompter.handle(&message, session.store()).await {
                    tracing::info!(
                        sent = ?outcome.sent,
                        skipped = ?outcome.skipped,
                        undelivered = ?outcome.undelivered,
                        "Setup tasks handled"
                    );
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, leaving room…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    if let Err(e) = session.leave().await {
        tracing::warn!(error = %e, "Leave request failed");
    }
    tracing::info!("Goodbye!");
    Ok(())
}
