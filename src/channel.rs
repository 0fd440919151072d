//! Per-role room channel.
//!
//! A [`ChannelManager`] owns one socket to one room endpoint (spectator view,
//! player view or storyteller grimoire). It is a thin handle over a background
//! channel loop task: outbound [`ClientMessage`]s travel over an unbounded
//! MPSC channel, inbound frames are classified and published into two
//! independently observable outputs:
//!
//! - the **snapshot slot**, overwritten by every `state` frame
//!   ([`latest_snapshot`](ChannelManager::latest_snapshot),
//!   [`watch_snapshot`](ChannelManager::watch_snapshot));
//! - the **imperative queue**, appended to by `event`, `patch`, `info` and
//!   `error` frames and drained by the consumer
//!   ([`next_imperative`](ChannelManager::next_imperative)).
//!
//! When the socket closes without the caller asking for it, the loop retries
//! with capped exponential backoff ([`ReconnectPolicy`]) until it reconnects
//! or the manager is closed. After a successful reconnect it asks the server
//! to resend the state.
//!
//! Every connection is stamped with a generation number. [`close`] bumps the
//! generation, so frames from a connection that has already been closed can
//! never reach the outputs.
//!
//! [`close`]: ChannelManager::close

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backoff::{ReconnectPolicy, ReconnectState};
use crate::config::ClientConfig;
use crate::error::{BotcError, Result};
use crate::identity::VisitorIdentity;
use crate::protocol::{ClientMessage, Frame, ImperativeMessage, Route, Snapshot};
use crate::role::{ChannelTarget, RoomSessionRole};
use crate::transport::{Connector, Transport};

// ── Connection status ───────────────────────────────────────────────

/// Lifecycle of one channel, observable through
/// [`ChannelManager::watch_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Never connected.
    #[default]
    Disconnected,
    /// Opening the socket for a caller-initiated connect.
    Connecting,
    /// Socket open; commands are accepted.
    Connected,
    /// The socket was lost; waiting for (or performing) reconnect `attempt`.
    Reconnecting { attempt: u32 },
    /// Closed by the caller.
    Closed,
}

impl ConnectionStatus {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// `true` while the loop is recovering a lost socket.
    pub fn is_reconnecting(self) -> bool {
        matches!(self, Self::Reconnecting { .. })
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

// ── Command sink ────────────────────────────────────────────────────

/// Anything that can forward a [`ClientMessage`] to a live channel.
///
/// Implemented by [`ChannelManager`] and by
/// [`StateStore`](crate::store::StateStore), which forwards to whichever
/// channel is currently bound.
pub trait CommandSink: Send + Sync {
    /// Queue `message` for sending. Returns `false` (and sends nothing) when
    /// there is no open socket.
    fn send_message(&self, message: ClientMessage) -> bool;
}

// ── Shared outputs ──────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ImperativeQueue {
    pending: VecDeque<ImperativeMessage>,
    latest: Option<ImperativeMessage>,
}

/// Outputs shared between a manager handle and its channel loop.
#[derive(Debug)]
pub(crate) struct ChannelShared {
    generation: AtomicU64,
    attempts: AtomicU32,
    status: watch::Sender<ConnectionStatus>,
    snapshot: watch::Sender<Option<Arc<Snapshot>>>,
    imperatives: Mutex<ImperativeQueue>,
    imperative_ready: Notify,
}

impl ChannelShared {
    pub(crate) fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            attempts: AtomicU32::new(0),
            status: watch::Sender::new(ConnectionStatus::Disconnected),
            snapshot: watch::Sender::new(None),
            imperatives: Mutex::new(ImperativeQueue::default()),
            imperative_ready: Notify::new(),
        }
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    /// Invalidate every in-flight connection.
    fn invalidate(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn queue(&self) -> MutexGuard<'_, ImperativeQueue> {
        self.imperatives
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_replace(status);
    }

    /// Update the status on behalf of the connection stamped `generation`.
    fn set_status_for(&self, generation: u64, status: ConnectionStatus) {
        self.status.send_if_modified(|current| {
            if !self.is_current(generation) || *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    /// Parse one raw frame and route it to the right output.
    ///
    /// Unparseable frames are logged and dropped. Writes from a stale
    /// generation are discarded.
    pub(crate) fn apply_text(&self, generation: u64, target: &ChannelTarget, text: &str) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(channel = %target, error = %e, raw = %text, "dropping unparseable frame");
                return;
            }
        };
        let tag = frame.tag();
        match frame.route() {
            Route::Snapshot(snapshot) => {
                if self.publish_snapshot(generation, snapshot) {
                    debug!(channel = %target, "snapshot updated");
                }
            }
            Route::Imperative(message) => {
                if self.enqueue(generation, message) {
                    debug!(channel = %target, frame = tag, "imperative message queued");
                }
            }
            Route::Ack => debug!(channel = %target, frame = tag, "handshake acknowledged"),
        }
    }

    fn publish_snapshot(&self, generation: u64, snapshot: Snapshot) -> bool {
        self.snapshot.send_if_modified(|slot| {
            if !self.is_current(generation) {
                return false;
            }
            *slot = Some(Arc::new(snapshot));
            true
        })
    }

    fn enqueue(&self, generation: u64, message: ImperativeMessage) -> bool {
        {
            let mut queue = self.queue();
            if !self.is_current(generation) {
                return false;
            }
            queue.latest = Some(message.clone());
            queue.pending.push_back(message);
        }
        self.imperative_ready.notify_one();
        true
    }

    /// Reset both outputs and the attempt counter.
    fn clear(&self) {
        self.snapshot.send_replace(None);
        let mut queue = self.queue();
        queue.pending.clear();
        queue.latest = None;
        drop(queue);
        self.attempts.store(0, Ordering::Release);
    }
}

// ── Channel manager ─────────────────────────────────────────────────

/// Settings a channel takes from [`ClientConfig`].
#[derive(Debug, Clone)]
struct ChannelSettings {
    ws_base: String,
    policy: ReconnectPolicy,
    connect_timeout: Option<Duration>,
    shutdown_timeout: Duration,
}

impl From<&ClientConfig> for ChannelSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            ws_base: config.ws_base.clone(),
            policy: config.reconnect_policy,
            connect_timeout: config.connect_timeout,
            shutdown_timeout: config.shutdown_timeout,
        }
    }
}

/// Handle to the running loop of the current connection.
struct ActiveChannel {
    target: ChannelTarget,
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ActiveChannel {
    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

/// One role's connection to a room.
///
/// A manager is parameterized by role and identity at construction; the room
/// is chosen on [`connect`](Self::connect). At most one socket is open per
/// manager.
///
/// # Example
///
/// ```rust,ignore
/// let mut channel = ChannelManager::new(
///     RoomSessionRole::Spectator,
///     identity,
///     Arc::new(WebSocketConnector::new()),
///     &ClientConfig::default(),
/// );
/// channel.connect("ab12cd34").await?;
///
/// let message = channel.next_imperative().await;
/// if let Some(line) = message.describe() {
///     println!("{line}");
/// }
/// channel.close().await;
/// ```
pub struct ChannelManager {
    role: RoomSessionRole,
    identity: VisitorIdentity,
    connector: Arc<dyn Connector>,
    settings: ChannelSettings,
    shared: Arc<ChannelShared>,
    active: Option<ActiveChannel>,
}

impl fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelManager")
            .field("role", &self.role)
            .field("target", &self.target())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl ChannelManager {
    pub fn new(
        role: RoomSessionRole,
        identity: VisitorIdentity,
        connector: Arc<dyn Connector>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            role,
            identity,
            connector,
            settings: ChannelSettings::from(config),
            shared: Arc::new(ChannelShared::new()),
            active: None,
        }
    }

    pub fn role(&self) -> RoomSessionRole {
        self.role
    }

    /// The channel this manager is connected to, or reconnecting to.
    pub fn target(&self) -> Option<&ChannelTarget> {
        self.active.as_ref().map(|a| &a.target)
    }

    /// Open the socket for this role in `room_id`.
    ///
    /// Connecting again to the room the manager is already connected to is a
    /// no-op. Connecting to a different room closes the current socket first.
    /// Only losses after a successful open are retried; a failure to open here
    /// is returned to the caller.
    ///
    /// # Errors
    ///
    /// - [`BotcError::Connection`] if the room id (or, for a player, the
    ///   visitor id) is blank.
    /// - [`BotcError::Timeout`] if a connect timeout is configured and elapses.
    /// - Any error the [`Connector`] returns.
    pub async fn connect(&mut self, room_id: &str) -> Result<()> {
        let target = ChannelTarget::for_role(room_id, self.role, &self.identity);
        target.validate()?;

        if let Some(active) = &self.active {
            if active.target == target && active.is_running() {
                debug!(channel = %target, "already connected; ignoring connect");
                return Ok(());
            }
        }
        self.close().await;

        let generation = self.shared.current_generation();
        let url = target.url(&self.settings.ws_base);
        self.shared.set_status(ConnectionStatus::Connecting);
        info!(channel = %target, role = %self.role, %url, "opening room channel");

        let transport =
            match open_transport(&*self.connector, &url, self.settings.connect_timeout).await {
                Ok(transport) => transport,
                Err(e) => {
                    warn!(channel = %target, error = %e, "failed to open room channel");
                    self.shared.set_status_for(generation, ConnectionStatus::Disconnected);
                    return Err(e);
                }
            };

        self.shared.set_status_for(generation, ConnectionStatus::Connected);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let context = LoopContext {
            target: target.clone(),
            url,
            connector: Arc::clone(&self.connector),
            policy: self.settings.policy,
            connect_timeout: self.settings.connect_timeout,
            shared: Arc::clone(&self.shared),
            generation,
        };
        let task = tokio::spawn(channel_loop(transport, context, cmd_rx, shutdown_rx));

        self.active = Some(ActiveChannel {
            target,
            cmd_tx,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        });
        Ok(())
    }

    /// Queue `message` for the server.
    ///
    /// Silently does nothing (returning `false`) unless the socket is open;
    /// messages are never buffered across a disconnect.
    pub fn send(&self, message: ClientMessage) -> bool {
        let Some(active) = &self.active else {
            debug!("send ignored: channel not connected");
            return false;
        };
        if !self.status().is_connected() {
            debug!(channel = %active.target, status = %self.status(), "send ignored: socket not open");
            return false;
        }
        active.cmd_tx.send(message).is_ok()
    }

    /// Close the socket, stop reconnecting and clear both outputs.
    ///
    /// Idempotent. Waits up to the configured shutdown timeout for the loop
    /// to close its socket, then aborts it.
    pub async fn close(&mut self) {
        self.shared.invalidate();

        if let Some(mut active) = self.active.take() {
            debug!(channel = %active.target, "closing room channel");
            if let Some(tx) = active.shutdown_tx.take() {
                let _ = tx.send(());
            }
            if let Some(mut task) = active.task.take() {
                match tokio::time::timeout(self.settings.shutdown_timeout, &mut task).await {
                    Ok(Ok(())) => {}
                    Ok(Err(join_err)) => {
                        warn!("channel loop terminated with join error: {join_err}");
                    }
                    Err(_) => {
                        warn!(channel = %active.target, "channel loop did not exit within timeout; aborting task");
                        task.abort();
                        if let Err(join_err) = task.await {
                            debug!("channel loop aborted: {join_err}");
                        }
                    }
                }
            }
            info!(channel = %active.target, "room channel closed");
            self.shared.set_status(ConnectionStatus::Closed);
        }

        self.shared.clear();
    }

    // ── Outputs ─────────────────────────────────────────────────────

    /// The most recent full room view, if any has arrived since connecting.
    pub fn latest_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.shared.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot replacements.
    pub fn watch_snapshot(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.shared.snapshot.subscribe()
    }

    /// Peek at the most recent imperative message without consuming it.
    pub fn latest_imperative(&self) -> Option<ImperativeMessage> {
        self.shared.queue().latest.clone()
    }

    /// Take the oldest unconsumed imperative message, if any.
    pub fn try_next_imperative(&self) -> Option<ImperativeMessage> {
        self.shared.queue().pending.pop_front()
    }

    /// Take every unconsumed imperative message, oldest first.
    pub fn drain_imperatives(&self) -> Vec<ImperativeMessage> {
        self.shared.queue().pending.drain(..).collect()
    }

    /// Number of imperative messages waiting to be consumed.
    pub fn pending_imperatives(&self) -> usize {
        self.shared.queue().pending.len()
    }

    /// Wait for the next imperative message.
    ///
    /// Cancel-safe: a message is only removed from the queue when this
    /// future completes.
    pub async fn next_imperative(&self) -> ImperativeMessage {
        loop {
            if let Some(message) = self.try_next_imperative() {
                return message;
            }
            self.shared.imperative_ready.notified().await;
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Reconnection attempts since the socket was last open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::Acquire)
    }
}

impl CommandSink for ChannelManager {
    fn send_message(&self, message: ClientMessage) -> bool {
        self.send(message)
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        // No executor to drive a graceful close here; just stop the loop.
        self.shared.invalidate();
        if let Some(task) = self.active.as_mut().and_then(|a| a.task.take()) {
            task.abort();
        }
    }
}

// ── Channel loop ────────────────────────────────────────────────────

struct LoopContext {
    target: ChannelTarget,
    url: String,
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    connect_timeout: Option<Duration>,
    shared: Arc<ChannelShared>,
    generation: u64,
}

/// Why a connection's pump stopped.
enum PumpExit {
    /// The caller closed the channel (or dropped the manager).
    Shutdown,
    /// The socket went away on its own.
    Lost(String),
}

async fn open_transport(
    connector: &dyn Connector,
    url: &str,
    timeout: Option<Duration>,
) -> Result<Box<dyn Transport>> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, connector.connect(url))
            .await
            .map_err(|_| BotcError::Timeout)?,
        None => connector.connect(url).await,
    }
}

async fn channel_loop(
    mut transport: Box<dyn Transport>,
    ctx: LoopContext,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!(channel = %ctx.target, "channel loop started");

    loop {
        match pump(&mut transport, &ctx, &mut cmd_rx, &mut shutdown_rx).await {
            PumpExit::Shutdown => {
                if let Err(e) = transport.close().await {
                    debug!(channel = %ctx.target, "transport close failed: {e}");
                }
                break;
            }
            PumpExit::Lost(reason) => {
                warn!(channel = %ctx.target, %reason, "room channel lost");
                let _ = transport.close().await;

                // Nothing queued for the dead socket may leak into the next one.
                let mut discarded = 0_usize;
                while cmd_rx.try_recv().is_ok() {
                    discarded += 1;
                }
                if discarded > 0 {
                    debug!(channel = %ctx.target, discarded, "discarded unsent commands");
                }

                match reconnect(&ctx, &mut shutdown_rx).await {
                    Some(next) => {
                        transport = next;
                        resync(&mut transport, &ctx).await;
                    }
                    None => break,
                }
            }
        }
    }

    debug!(channel = %ctx.target, "channel loop exited");
}

/// Move traffic for one open socket until it closes or shutdown is requested.
async fn pump(
    transport: &mut Box<dyn Transport>,
    ctx: &LoopContext,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> PumpExit {
    loop {
        tokio::select! {
            biased;

            _ = &mut *shutdown_rx => {
                debug!(channel = %ctx.target, "shutdown signal received");
                return PumpExit::Shutdown;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => ctx.shared.apply_text(ctx.generation, &ctx.target, &text),
                    Some(Err(e)) => return PumpExit::Lost(format!("receive error: {e}")),
                    None => return PumpExit::Lost("closed by server".to_owned()),
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(message) => match serde_json::to_string(&message) {
                        Ok(json) => {
                            if let Err(e) = transport.send(json).await {
                                return PumpExit::Lost(format!("send error: {e}"));
                            }
                        }
                        Err(e) => error!("failed to serialize client message: {e}"),
                    },
                    None => {
                        debug!(channel = %ctx.target, "command channel closed");
                        return PumpExit::Shutdown;
                    }
                }
            }
        }
    }
}

/// Reopen the socket with capped exponential backoff.
///
/// Returns `None` if shutdown was requested while waiting.
async fn reconnect(
    ctx: &LoopContext,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> Option<Box<dyn Transport>> {
    let mut backoff = ReconnectState::default();

    loop {
        let (attempt, delay) = backoff.next_delay(&ctx.policy);
        ctx.shared.attempts.store(attempt, Ordering::Release);
        ctx.shared
            .set_status_for(ctx.generation, ConnectionStatus::Reconnecting { attempt });
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        info!(channel = %ctx.target, attempt, delay_ms, "scheduling reconnect");

        tokio::select! {
            biased;
            _ = &mut *shutdown_rx => return None,
            () = tokio::time::sleep(delay) => {}
        }

        let opened = tokio::select! {
            biased;
            _ = &mut *shutdown_rx => return None,
            result = open_transport(&*ctx.connector, &ctx.url, ctx.connect_timeout) => result,
        };

        match opened {
            Ok(transport) => {
                backoff.reset();
                ctx.shared.attempts.store(0, Ordering::Release);
                ctx.shared
                    .set_status_for(ctx.generation, ConnectionStatus::Connected);
                info!(channel = %ctx.target, attempt, "room channel reconnected");
                return Some(transport);
            }
            Err(e) => warn!(channel = %ctx.target, attempt, error = %e, "reconnect attempt failed"),
        }
    }
}

/// Ask the server for a fresh state frame after reconnecting.
async fn resync(transport: &mut Box<dyn Transport>, ctx: &LoopContext) {
    match serde_json::to_string(&ClientMessage::GetState) {
        Ok(json) => {
            if let Err(e) = transport.send(json).await {
                // The next recv will observe the dead socket.
                warn!(channel = %ctx.target, error = %e, "state resync request failed");
            }
        }
        Err(e) => error!("failed to serialize state request: {e}"),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::RoomEvent;
    use crate::role::ChannelEndpoint;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;

    fn target() -> ChannelTarget {
        ChannelTarget {
            room_id: "r1".into(),
            endpoint: ChannelEndpoint::Storyteller,
        }
    }

    const STATE: &str = r#"{"type":"state","view":{"seats":[{"seat":1,"occupant":null}]}}"#;
    const DONE: &str = r#"{"type":"event","event":"task_done","id":4}"#;

    #[test]
    fn state_frames_overwrite_the_snapshot() {
        let shared = ChannelShared::new();
        let g = shared.current_generation();
        shared.apply_text(g, &target(), STATE);
        shared.apply_text(g, &target(), r#"{"type":"state","view":{"seats":[]}}"#);
        let snap = shared.snapshot.borrow().clone().unwrap();
        assert!(snap.seats().is_empty());
        assert!(shared.queue().pending.is_empty());
    }

    #[test]
    fn imperatives_queue_in_order_and_track_latest() {
        let shared = ChannelShared::new();
        let g = shared.current_generation();
        shared.apply_text(g, &target(), r#"{"type":"event","event":"setup_complete"}"#);
        shared.apply_text(g, &target(), DONE);

        let queue = shared.queue();
        assert_eq!(queue.pending.len(), 2);
        assert_eq!(
            queue.pending[0],
            ImperativeMessage::Event(RoomEvent::SetupComplete)
        );
        assert_eq!(
            queue.latest,
            Some(ImperativeMessage::Event(RoomEvent::TaskDone { id: 4 }))
        );
    }

    #[test]
    fn malformed_and_unknown_frames_change_nothing() {
        let shared = ChannelShared::new();
        let g = shared.current_generation();
        shared.apply_text(g, &target(), "{not json");
        shared.apply_text(g, &target(), r#"{"type":"mystery"}"#);
        shared.apply_text(g, &target(), r#"{"view":{}}"#);
        assert!(shared.snapshot.borrow().is_none());
        assert!(shared.queue().latest.is_none());
    }

    #[test]
    fn hello_is_acknowledged_without_output() {
        let shared = ChannelShared::new();
        let g = shared.current_generation();
        shared.apply_text(g, &target(), r#"{"type":"hello","gid":"r1"}"#);
        assert!(shared.snapshot.borrow().is_none());
        assert!(shared.queue().pending.is_empty());
    }

    #[test]
    fn stale_generation_writes_are_discarded() {
        let shared = ChannelShared::new();
        let stale = shared.current_generation();
        shared.invalidate();
        shared.apply_text(stale, &target(), STATE);
        shared.apply_text(stale, &target(), DONE);
        assert!(shared.snapshot.borrow().is_none());
        assert!(shared.queue().latest.is_none());
    }

    #[test]
    fn stale_generation_cannot_change_status() {
        let shared = ChannelShared::new();
        let stale = shared.current_generation();
        shared.invalidate();
        shared.set_status(ConnectionStatus::Closed);
        shared.set_status_for(stale, ConnectionStatus::Reconnecting { attempt: 1 });
        assert_eq!(*shared.status.borrow(), ConnectionStatus::Closed);
    }

    #[test]
    fn clear_resets_outputs() {
        let shared = ChannelShared::new();
        let g = shared.current_generation();
        shared.apply_text(g, &target(), STATE);
        shared.apply_text(g, &target(), DONE);
        shared.attempts.store(3, Ordering::Release);
        shared.clear();
        assert!(shared.snapshot.borrow().is_none());
        assert!(shared.queue().pending.is_empty());
        assert!(shared.queue().latest.is_none());
        assert_eq!(shared.attempts.load(Ordering::Acquire), 0);
    }

    #[test]
    fn status_display() {
        assert_eq!(
            ConnectionStatus::Reconnecting { attempt: 2 }.to_string(),
            "reconnecting (attempt 2)"
        );
        assert!(ConnectionStatus::Reconnecting { attempt: 1 }.is_reconnecting());
        assert!(!ConnectionStatus::Closed.is_connected());
    }

    // ── Shutdown timeout ────────────────────────────────────────────

    /// Never yields a frame and hangs forever on close.
    struct HangingCloseTransport {
        dropped: Arc<AtomicBool>,
    }

    impl Drop for HangingCloseTransport {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    #[async_trait]
    impl Transport for HangingCloseTransport {
        async fn send(&mut self, _message: String) -> Result<()> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<()> {
            std::future::pending().await
        }
    }

    struct HangingConnector {
        dropped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Connector for HangingConnector {
        async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>> {
            Ok(Box::new(HangingCloseTransport {
                dropped: Arc::clone(&self.dropped),
            }))
        }
    }

    fn visitor() -> VisitorIdentity {
        VisitorIdentity {
            id: "v1".into(),
            name: "Alice".into(),
        }
    }

    #[tokio::test]
    async fn close_aborts_a_loop_stuck_in_transport_close() {
        let dropped = Arc::new(AtomicBool::new(false));
        let connector = Arc::new(HangingConnector {
            dropped: Arc::clone(&dropped),
        });
        let config = ClientConfig::default().with_shutdown_timeout(Duration::from_millis(20));
        let mut channel =
            ChannelManager::new(RoomSessionRole::Storyteller, visitor(), connector, &config);

        channel.connect("r1").await.unwrap();
        assert_eq!(channel.status(), ConnectionStatus::Connected);

        channel.close().await;
        assert!(dropped.load(Ordering::Acquire));
        assert_eq!(channel.status(), ConnectionStatus::Closed);
        assert!(channel.target().is_none());
    }

    #[tokio::test]
    async fn drop_aborts_the_loop() {
        let dropped = Arc::new(AtomicBool::new(false));
        let connector = Arc::new(HangingConnector {
            dropped: Arc::clone(&dropped),
        });
        let mut channel = ChannelManager::new(
            RoomSessionRole::Spectator,
            visitor(),
            connector,
            &ClientConfig::default(),
        );
        channel.connect("r1").await.unwrap();
        drop(channel);

        for _ in 0..50 {
            if dropped.load(Ordering::Acquire) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("transport was not dropped after the manager");
    }
}
