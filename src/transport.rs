//! Transport abstraction for room channels.
//!
//! A [`Transport`] is one open, bidirectional text-message connection. Room
//! channels exchange JSON text frames, so every implementation handles message
//! framing internally (WebSocket frames, in-memory queues, ...).
//!
//! Because a channel must be able to reopen its socket after an unexpected
//! close, connection setup is expressed separately as a [`Connector`]: given a
//! URL it resolves once the connection is open and returns the transport.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use botc_room_client::error::BotcError;
//! use botc_room_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), BotcError> {
//!         // Send the JSON text message over your transport
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, BotcError>> {
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), BotcError> {
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, BotcError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::BotcError;

/// A bidirectional text message transport for a room channel.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because the
/// channel loop uses it inside `tokio::select!`. Channel-based
/// implementations (e.g., wrapping `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`BotcError::TransportSend`] if the message could not be sent.
    async fn send(&mut self, message: String) -> Result<(), BotcError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed by the server
    async fn recv(&mut self) -> Option<Result<String, BotcError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), BotcError>;
}

/// Opens [`Transport`]s. Used for the initial connect and every reconnect.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection to `url`, resolving once it is ready for traffic.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, BotcError>;
}
