//! A visitor's presence in one room.
//!
//! [`RoomSession`] ties the REST collaborator to the [`StateStore`]: it picks
//! the role on entry, performs seat transitions (REST call first, channel
//! switch only after the server confirmed) and exposes the storyteller's
//! table controls.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::channel::{ChannelManager, CommandSink};
use crate::config::ClientConfig;
use crate::error::{BotcError, Result};
use crate::identity::VisitorIdentity;
use crate::protocol::{ClientMessage, RoomId};
use crate::rest::{RoomApi, StepResult};
use crate::role::{ConnectionSelector, RoomMeta, RoomSessionRole};
use crate::store::StateStore;
use crate::transport::Connector;

/// Fewest seats a table may have.
pub const MIN_SEATS: usize = 5;

/// Most seats a table may have.
pub const MAX_SEATS: usize = 20;

/// Seated players needed before the storyteller can start.
pub const MIN_PLAYERS_TO_START: usize = 5;

/// One visitor in one room at a time.
pub struct RoomSession {
    identity: VisitorIdentity,
    api: Arc<dyn RoomApi>,
    connector: Arc<dyn Connector>,
    config: ClientConfig,
    store: StateStore,
    room: Option<RoomMeta>,
    role: Option<RoomSessionRole>,
    seat: Option<u32>,
}

impl std::fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("visitor", &self.identity.id)
            .field("room", &self.room_id())
            .field("role", &self.role)
            .field("seat", &self.seat)
            .finish_non_exhaustive()
    }
}

impl RoomSession {
    pub fn new(
        identity: VisitorIdentity,
        api: Arc<dyn RoomApi>,
        connector: Arc<dyn Connector>,
        config: ClientConfig,
    ) -> Self {
        Self {
            identity,
            api,
            connector,
            config,
            store: StateStore::new(),
            room: None,
            role: None,
            seat: None,
        }
    }

    pub fn identity(&self) -> &VisitorIdentity {
        &self.identity
    }

    /// The display-facing state of the current room.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn room(&self) -> Option<&RoomMeta> {
        self.room.as_ref()
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room.as_ref().map(|r| r.gid.as_str())
    }

    pub fn role(&self) -> Option<RoomSessionRole> {
        self.role
    }

    /// The seat this visitor occupies, if seated.
    pub fn seat(&self) -> Option<u32> {
        self.seat
    }

    fn channel_for(&self, role: RoomSessionRole) -> ChannelManager {
        ChannelManager::new(
            role,
            self.identity.clone(),
            Arc::clone(&self.connector),
            &self.config,
        )
    }

    fn current_room(&self) -> Result<RoomId> {
        self.room
            .as_ref()
            .map(|r| r.gid.clone())
            .ok_or_else(|| BotcError::InvalidTransition("not in a room".into()))
    }

    // ── Entering and leaving ────────────────────────────────────────

    /// Create a room with this visitor as storyteller, then enter it.
    ///
    /// # Errors
    ///
    /// Any REST or channel error from creating or entering the room.
    pub async fn create_room(&mut self) -> Result<RoomSessionRole> {
        let created = self.api.create_room(&self.identity).await?;
        info!(room_id = %created.gid, "created room");
        self.enter(&created.gid).await
    }

    /// Enter `room_id` as storyteller (if this visitor owns the room) or as a
    /// spectator, and connect that role's channel.
    ///
    /// Leaving any previously entered room happens first.
    ///
    /// # Errors
    ///
    /// Any REST error from fetching or joining the room, or a channel error
    /// from connecting.
    pub async fn enter(&mut self, room_id: &str) -> Result<RoomSessionRole> {
        if self.room_id().is_some_and(|current| current != room_id) {
            self.leave().await?;
        }

        let meta = self.api.get_room(room_id).await?;
        let role = ConnectionSelector::resolve_role(&meta, &self.identity.id);
        if role == RoomSessionRole::Spectator {
            self.api.join_room(&meta.gid, &self.identity).await?;
        }

        let gid = meta.gid.clone();
        self.room = Some(meta);
        self.role = Some(role);
        self.seat = None;
        let channel = self.channel_for(role);
        self.store.switch_to(channel, &gid).await?;
        info!(room_id = %gid, %role, "entered room");
        Ok(role)
    }

    /// Take `seat` and switch to the player channel.
    ///
    /// The channel only switches once the server has accepted the seat; if
    /// the REST call fails the spectator channel stays bound.
    ///
    /// # Errors
    ///
    /// - [`BotcError::InvalidTransition`] when not a spectator in a room.
    /// - The REST error if the server refuses the seat.
    /// - A channel error if the player channel cannot be opened; the seat is
    ///   still held and [`reconnect`](Self::reconnect) may be retried.
    pub async fn sit(&mut self, seat: u32) -> Result<()> {
        let room_id = self.current_room()?;
        match self.role {
            Some(RoomSessionRole::Spectator) => {}
            Some(RoomSessionRole::Storyteller) => {
                return Err(BotcError::InvalidTransition(
                    "the storyteller cannot take a seat".into(),
                ))
            }
            Some(RoomSessionRole::Player) | None => {
                return Err(BotcError::InvalidTransition(
                    "only spectators can take a seat".into(),
                ))
            }
        }

        self.api.sit(&room_id, seat, &self.identity).await?;
        self.role = Some(RoomSessionRole::Player);
        self.seat = Some(seat);
        info!(%room_id, seat, "took seat");

        let channel = self.channel_for(RoomSessionRole::Player);
        self.store.switch_to(channel, &room_id).await
    }

    /// Give up the current seat and switch back to the spectator channel.
    ///
    /// # Errors
    ///
    /// - [`BotcError::InvalidTransition`] when not seated.
    /// - The REST error if the server refuses; the player channel stays bound.
    /// - A channel error if the spectator channel cannot be opened.
    pub async fn vacate(&mut self) -> Result<()> {
        let room_id = self.current_room()?;
        let seat = match (self.role, self.seat) {
            (Some(RoomSessionRole::Player), Some(seat)) => seat,
            _ => return Err(BotcError::InvalidTransition("not seated".into())),
        };

        self.api.vacate(&room_id, seat, &self.identity).await?;
        self.role = Some(RoomSessionRole::Spectator);
        self.seat = None;
        info!(%room_id, seat, "vacated seat");

        let channel = self.channel_for(RoomSessionRole::Spectator);
        self.store.switch_to(channel, &room_id).await
    }

    /// Leave the room and close its channel.
    ///
    /// The channel is closed even if the server rejects the request.
    ///
    /// # Errors
    ///
    /// The REST error, if any, after the channel has been closed.
    pub async fn leave(&mut self) -> Result<()> {
        let Some(room) = self.room.take() else {
            return Ok(());
        };
        let result = self.api.leave(&room.gid, &self.identity).await;
        if let Err(e) = &result {
            warn!(room_id = %room.gid, error = %e, "leave request failed; closing channel anyway");
        }
        self.store.release().await;
        self.role = None;
        self.seat = None;
        info!(room_id = %room.gid, "left room");
        result
    }

    /// Reopen the channel for the current role, e.g. after a failed switch.
    ///
    /// # Errors
    ///
    /// [`BotcError::InvalidTransition`] outside a room, or the channel error.
    pub async fn reconnect(&mut self) -> Result<()> {
        let room_id = self.current_room()?;
        let role = self
            .role
            .ok_or_else(|| BotcError::InvalidTransition("no role in room".into()))?;
        let channel = self.channel_for(role);
        self.store.switch_to(channel, &room_id).await
    }

    /// Close the channel without telling the server.
    pub async fn close(&mut self) {
        self.store.release().await;
    }

    // ── Channel messages ────────────────────────────────────────────

    /// Send a liveness ping stamped with the local clock.
    pub fn ping(&self) -> bool {
        self.store.send_message(ClientMessage::Ping { t: unix_millis() })
    }

    /// Ask the server to resend the room state.
    pub fn request_state(&self) -> bool {
        self.store.send_message(ClientMessage::GetState)
    }

    // ── Storyteller controls ────────────────────────────────────────

    fn require_storyteller(&self) -> Result<RoomId> {
        let room_id = self.current_room()?;
        if self.role != Some(RoomSessionRole::Storyteller) {
            return Err(BotcError::InvalidTransition(
                "only the storyteller can do that".into(),
            ));
        }
        Ok(room_id)
    }

    fn seat_count(&self) -> usize {
        self.store.seats().len()
    }

    /// Resize the table to `count` seats.
    ///
    /// # Errors
    ///
    /// - [`BotcError::InvalidTransition`] unless storyteller.
    /// - [`BotcError::SeatCount`] outside `MIN_SEATS..=MAX_SEATS`.
    /// - The REST error.
    pub async fn set_seat_count(&self, count: usize) -> Result<usize> {
        let room_id = self.require_storyteller()?;
        if !(MIN_SEATS..=MAX_SEATS).contains(&count) {
            return Err(BotcError::SeatCount {
                requested: count,
                min: MIN_SEATS,
                max: MAX_SEATS,
            });
        }
        self.api.update_seat_count(&room_id, count).await?;
        info!(%room_id, seats = count, "seat count updated");
        Ok(count)
    }

    /// Add one seat. See [`set_seat_count`](Self::set_seat_count).
    ///
    /// # Errors
    ///
    /// As for [`set_seat_count`](Self::set_seat_count).
    pub async fn add_seat(&self) -> Result<usize> {
        self.set_seat_count(self.seat_count().saturating_add(1)).await
    }

    /// Remove one seat. See [`set_seat_count`](Self::set_seat_count).
    ///
    /// # Errors
    ///
    /// As for [`set_seat_count`](Self::set_seat_count).
    pub async fn remove_seat(&self) -> Result<usize> {
        self.set_seat_count(self.seat_count().saturating_sub(1)).await
    }

    /// Start the game.
    ///
    /// # Errors
    ///
    /// [`BotcError::InvalidTransition`] unless storyteller with at least
    /// [`MIN_PLAYERS_TO_START`] seated players, or the REST error.
    pub async fn start_game(&self) -> Result<()> {
        let room_id = self.require_storyteller()?;
        let seated = self
            .store
            .latest_snapshot()
            .map_or(0, |s| s.occupied_seats());
        if seated < MIN_PLAYERS_TO_START {
            return Err(BotcError::InvalidTransition(format!(
                "need at least {MIN_PLAYERS_TO_START} seated players to start, have {seated}"
            )));
        }
        self.api.start_game(&room_id).await?;
        info!(%room_id, players = seated, "game started");
        Ok(())
    }

    /// Advance the game one phase.
    ///
    /// # Errors
    ///
    /// [`BotcError::InvalidTransition`] unless storyteller, or the REST error.
    pub async fn step(&self) -> Result<StepResult> {
        let room_id = self.require_storyteller()?;
        let result = self.api.step(&room_id).await?;
        info!(%room_id, phase = ?result.phase, night = ?result.night, "phase advanced");
        Ok(result)
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
