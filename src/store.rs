//! The display-facing room state.
//!
//! [`StateStore`] owns at most one [`ChannelManager`]: the channel for the
//! visitor's current role. Everything the display reads (room view, seats,
//! phase, the imperative stream, connection status) comes from that single
//! binding, so two roles can never feed the display at once.
//!
//! Switching roles goes through [`StateStore::switch_to`], which closes the
//! old channel before the new one connects and is bound.

use std::sync::Arc;

use tracing::{debug, info};

use crate::channel::{ChannelManager, CommandSink, ConnectionStatus};
use crate::error::{BotcError, Result};
use crate::protocol::{ClientMessage, ImperativeMessage, RoomInfo, Seat, Snapshot, Spectator};
use crate::role::{ChannelTarget, RoomSessionRole};

/// Holds the single active channel binding.
#[derive(Debug, Default)]
pub struct StateStore {
    bound: Option<ChannelManager>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `channel` as the active source.
    ///
    /// # Errors
    ///
    /// Returns [`BotcError::RoleConflict`] if another channel is already
    /// bound. Debug builds treat this as a programming error and panic.
    pub fn bind(&mut self, channel: ChannelManager) -> Result<()> {
        let conflict = self.bound.as_ref().map(|current| {
            format!(
                "cannot bind {} channel while {} channel is bound",
                channel.role(),
                current.role()
            )
        });
        debug_assert!(
            conflict.is_none(),
            "role conflict: {}",
            conflict.as_deref().unwrap_or_default()
        );
        if let Some(message) = conflict {
            return Err(BotcError::RoleConflict(message));
        }
        debug!(role = %channel.role(), "channel bound");
        self.bound = Some(channel);
        Ok(())
    }

    /// Release the active binding, returning the channel still open.
    pub fn unbind(&mut self) -> Option<ChannelManager> {
        let channel = self.bound.take();
        if let Some(channel) = &channel {
            debug!(role = %channel.role(), "channel unbound");
        }
        channel
    }

    /// Close and drop the active binding, if any.
    pub async fn release(&mut self) {
        if let Some(mut channel) = self.unbind() {
            channel.close().await;
        }
    }

    /// Replace the active binding with `next`, connected to `room_id`.
    ///
    /// The previous channel is closed before `next` connects, and `next` is
    /// only bound once it is open. If `next` fails to connect the store is
    /// left unbound.
    ///
    /// # Errors
    ///
    /// Returns the error from [`ChannelManager::connect`].
    pub async fn switch_to(&mut self, mut next: ChannelManager, room_id: &str) -> Result<()> {
        let from = self.bound_role();
        self.release().await;
        next.connect(room_id).await?;
        info!(room_id, from = ?from, to = %next.role(), "switched room channel");
        self.bind(next)
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    pub fn bound_role(&self) -> Option<RoomSessionRole> {
        self.bound.as_ref().map(ChannelManager::role)
    }

    pub fn bound_target(&self) -> Option<&ChannelTarget> {
        self.bound.as_ref().and_then(ChannelManager::target)
    }

    /// The bound channel, for callers that need its watch handles.
    pub fn channel(&self) -> Option<&ChannelManager> {
        self.bound.as_ref()
    }

    // ── Read accessors ──────────────────────────────────────────────

    pub fn latest_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.bound.as_ref().and_then(ChannelManager::latest_snapshot)
    }

    pub fn latest_imperative(&self) -> Option<ImperativeMessage> {
        self.bound
            .as_ref()
            .and_then(ChannelManager::latest_imperative)
    }

    pub fn try_next_imperative(&self) -> Option<ImperativeMessage> {
        self.bound
            .as_ref()
            .and_then(ChannelManager::try_next_imperative)
    }

    pub fn drain_imperatives(&self) -> Vec<ImperativeMessage> {
        self.bound
            .as_ref()
            .map(ChannelManager::drain_imperatives)
            .unwrap_or_default()
    }

    /// Wait for the bound channel's next imperative message.
    ///
    /// Pends forever while nothing is bound.
    pub async fn next_imperative(&self) -> ImperativeMessage {
        match &self.bound {
            Some(channel) => channel.next_imperative().await,
            None => std::future::pending().await,
        }
    }

    /// Connection status of the bound channel; `Disconnected` when unbound.
    pub fn status(&self) -> ConnectionStatus {
        self.bound
            .as_ref()
            .map_or(ConnectionStatus::Disconnected, ChannelManager::status)
    }

    pub fn room_info(&self) -> Option<RoomInfo> {
        self.latest_snapshot().and_then(|s| s.info().cloned())
    }

    pub fn seats(&self) -> Vec<Seat> {
        self.latest_snapshot()
            .map(|s| s.seats().to_vec())
            .unwrap_or_default()
    }

    pub fn spectators(&self) -> Vec<Spectator> {
        self.latest_snapshot()
            .map(|s| s.spectators().to_vec())
            .unwrap_or_default()
    }

    pub fn phase(&self) -> Option<String> {
        self.latest_snapshot()
            .and_then(|s| s.phase().map(str::to_owned))
    }
}

impl CommandSink for StateStore {
    fn send_message(&self, message: ClientMessage) -> bool {
        match &self.bound {
            Some(channel) => channel.send(message),
            None => {
                debug!("send ignored: no channel bound");
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::identity::VisitorIdentity;
    use crate::transport::{Connector, Transport};
    use async_trait::async_trait;

    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>> {
            Err(BotcError::Connection("refused".into()))
        }
    }

    fn channel(role: RoomSessionRole) -> ChannelManager {
        ChannelManager::new(
            role,
            VisitorIdentity {
                id: "v1".into(),
                name: "Alice".into(),
            },
            Arc::new(RefusingConnector),
            &ClientConfig::default(),
        )
    }

    #[test]
    fn unbound_store_reads_empty() {
        let store = StateStore::new();
        assert!(!store.is_bound());
        assert!(store.latest_snapshot().is_none());
        assert!(store.latest_imperative().is_none());
        assert!(store.seats().is_empty());
        assert!(store.drain_imperatives().is_empty());
        assert_eq!(store.status(), ConnectionStatus::Disconnected);
        assert!(!store.send_message(ClientMessage::GetState));
    }

    #[test]
    fn bind_then_unbind() {
        let mut store = StateStore::new();
        store.bind(channel(RoomSessionRole::Spectator)).unwrap();
        assert_eq!(store.bound_role(), Some(RoomSessionRole::Spectator));
        let released = store.unbind().unwrap();
        assert_eq!(released.role(), RoomSessionRole::Spectator);
        assert!(store.unbind().is_none());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "role conflict")]
    fn double_bind_is_fatal_in_debug_builds() {
        let mut store = StateStore::new();
        store.bind(channel(RoomSessionRole::Spectator)).unwrap();
        let _ = store.bind(channel(RoomSessionRole::Player));
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn double_bind_is_rejected_in_release_builds() {
        let mut store = StateStore::new();
        store.bind(channel(RoomSessionRole::Spectator)).unwrap();
        let err = store.bind(channel(RoomSessionRole::Player)).unwrap_err();
        assert!(matches!(err, BotcError::RoleConflict(_)));
        assert_eq!(store.bound_role(), Some(RoomSessionRole::Spectator));
    }

    #[tokio::test]
    async fn failed_switch_leaves_store_unbound() {
        let mut store = StateStore::new();
        store.bind(channel(RoomSessionRole::Spectator)).unwrap();
        let err = store
            .switch_to(channel(RoomSessionRole::Player), "r1")
            .await
            .unwrap_err();
        assert!(matches!(err, BotcError::Connection(_)));
        assert!(!store.is_bound());
    }
}
