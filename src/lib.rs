//! # BotC Room Client
//!
//! Session and channel synchronization for Blood on the Clocktower rooms.
//!
//! A visitor is a spectator, a seated player or the storyteller of a room.
//! Each role has its own real-time channel; this crate keeps exactly one of
//! them open at a time and turns its traffic into two streams the display
//! reads:
//!
//! - a **snapshot** of the full room view, replaced by every `state` frame;
//! - a queue of **imperative messages** (events, patches, role reveals,
//!   server errors) that each drive a one-off reaction.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any
//!   backend; `transport-websocket` (default) provides [`WebSocketConnector`]
//! - **Self-healing channels**: unexpected closes reconnect with capped
//!   exponential backoff and resync the room state
//! - **Single active binding**: [`StateStore`] can only hold one channel, so
//!   stale roles never reach the display
//! - **REST collaborator**: [`RoomApi`] with an HTTP implementation under
//!   `rest-http` (default)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! let identity = IdentityStore::new("visitor.json").require().await?;
//! let config = ClientConfig::from_env();
//! let api = Arc::new(HttpRoomApi::new(config.api_base.clone()));
//! let mut session = RoomSession::new(identity, api, Arc::new(WebSocketConnector::new()), config);
//!
//! session.enter("ab12cd34").await?;
//! session.sit(3).await?;
//!
//! loop {
//!     let message = session.store().next_imperative().await;
//!     if let Some(line) = message.describe() {
//!         println!("{line}");
//!     }
//! }
//! ```

pub mod backoff;
pub mod channel;
pub mod config;
pub mod error;
pub mod identity;
pub mod prompter;
pub mod protocol;
pub mod rest;
pub mod role;
pub mod session;
pub mod store;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use backoff::ReconnectPolicy;
pub use channel::{ChannelManager, CommandSink, ConnectionStatus};
pub use config::ClientConfig;
pub use error::{BotcError, Result};
pub use identity::{IdentityStore, VisitorIdentity};
pub use prompter::{PromptOutcome, TaskPrompter, TaskResolver};
pub use protocol::{ClientMessage, Frame, FrameParseError, ImperativeMessage, Snapshot, Task};
pub use rest::RoomApi;
pub use role::{ChannelTarget, ConnectionSelector, RoomSessionRole};
pub use session::RoomSession;
pub use store::StateStore;
pub use transport::{Connector, Transport};

#[cfg(feature = "rest-http")]
pub use rest::HttpRoomApi;
#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
