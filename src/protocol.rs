//! Wire types for the room channels.
//!
//! Inbound frames are JSON objects discriminated by a `type` field. Every
//! frame resolves to exactly one [`Frame`] variant or to a
//! [`FrameParseError`]; nothing here panics on hostile input.
//!
//! Key shapes:
//!
//! - `{"type":"state","view":{...}}` replaces the room [`Snapshot`] wholesale
//! - `{"type":"event", ...}` and `{"type":"patch", ...}` are imperative
//! - `{"type":"info","data":{...}}` reveals the visitor's role
//! - `{"type":"error","error":"..."}` is a server notice
//! - `{"type":"hello","gid":"..."}` acknowledges a storyteller socket

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

// ── Type aliases ────────────────────────────────────────────────────

/// Room identifier used in channel URLs and REST paths.
pub type RoomId = String;

/// Identifier of a setup task, unique within a room.
pub type TaskId = u64;

/// Visitor ids arrive as JSON strings or numbers depending on the server
/// build; both decode to a `String`.
pub(crate) mod flexible_id {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        match Value::deserialize(d)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(D::Error::custom(format!("expected id, found {other}"))),
        }
    }

    pub(crate) fn deserialize_opt<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<String>, D::Error> {
        match Option::<Value>::deserialize(d)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(D::Error::custom(format!("expected id, found {other}"))),
        }
    }

    /// Whether a raw id (string or number) names `visitor_id`.
    pub(crate) fn matches(id: &Value, visitor_id: &str) -> bool {
        match id {
            Value::String(s) => s == visitor_id,
            Value::Number(n) => n.to_string() == visitor_id,
            _ => false,
        }
    }
}

/// Keeps an explicit `null` distinct from an absent field: absent decodes to
/// `None` (via `#[serde(default)]`), `null` to `Some(None)`.
mod present {
    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, T, D>(d: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(d).map(Some)
    }
}

// ── Parse errors ────────────────────────────────────────────────────

/// Why an inbound payload could not be turned into a [`Frame`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameParseError {
    /// The payload was not valid JSON.
    #[error("malformed JSON: {0}")]
    Malformed(String),
    /// The payload had no string `type` field.
    #[error("missing \"type\" discriminator")]
    MissingDiscriminator,
    /// The `type` field named a frame kind this client does not know.
    #[error("unrecognized frame type {0:?}")]
    UnknownType(String),
    /// The frame kind was known but its body did not match.
    #[error("invalid {kind} frame: {reason}")]
    InvalidBody {
        /// The frame tag that failed to decode.
        kind: &'static str,
        /// Decoder message.
        reason: String,
    },
}

// ── Room view ───────────────────────────────────────────────────────

/// Public room metadata carried in every view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    #[serde(default)]
    pub gid: RoomId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_players: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(
        default,
        alias = "story_teller_id",
        deserialize_with = "flexible_id::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub storyteller_id: Option<String>,
    /// Fields this client does not model, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A role reference as exposed in views (`{"id": "imp"}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRef {
    #[serde(
        default,
        deserialize_with = "present::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Option<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The visitor sitting in a seat.
///
/// Seats are re-serialized for display exactly as received, so the id keeps
/// its wire type and `"role": null` stays distinct from a missing role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occupant {
    pub id: Value,
    pub name: String,
    #[serde(
        default,
        deserialize_with = "present::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub seat: Option<Option<u32>>,
    /// `Some(None)` when the storyteller view reports an unassigned role.
    #[serde(
        default,
        deserialize_with = "present::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub role: Option<Option<RoleRef>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Occupant {
    pub fn is(&self, visitor_id: &str) -> bool {
        flexible_id::matches(&self.id, visitor_id)
    }

    /// The assigned role id, when the view reveals one.
    pub fn role_id(&self) -> Option<&str> {
        self.role.as_ref()?.as_ref()?.id.as_ref()?.as_deref()
    }
}

/// One chair around the table. `occupant` is `null` for an empty seat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seat {
    pub seat: u32,
    pub occupant: Option<Occupant>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Seat {
    /// Returns `true` when nobody is sitting here.
    pub fn is_free(&self) -> bool {
        self.occupant.is_none()
    }

    /// Returns `true` when the given visitor occupies this seat.
    pub fn is_occupied_by(&self, visitor_id: &str) -> bool {
        self.occupant.as_ref().is_some_and(|o| o.is(visitor_id))
    }
}

/// A visitor watching the room without a seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spectator {
    #[serde(deserialize_with = "flexible_id::deserialize")]
    pub id: String,
    pub name: String,
}

/// The seated player's own view of themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerSelf {
    #[serde(deserialize_with = "flexible_id::deserialize")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub seat: Option<u32>,
    #[serde(default)]
    pub alive: Option<bool>,
    #[serde(default)]
    pub ghost: Option<bool>,
    #[serde(default)]
    pub role: Option<RoleRef>,
}

/// Game progress as seen by a seated player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub night: Option<u32>,
    #[serde(default)]
    pub you: Option<PlayerSelf>,
    #[serde(default)]
    pub status: Option<String>,
}

/// The full room view carried by a state frame.
///
/// Spectator, player and storyteller views share this shape; fields a role
/// does not receive are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<RoomInfo>,
    #[serde(default)]
    pub seats: Vec<Seat>,
    #[serde(default)]
    pub spectators: Vec<Spectator>,
    /// Seated player count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub night: Option<u32>,
    /// Fields this client does not model, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The latest full room view. A new state frame replaces it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub view: RoomView,
}

impl Snapshot {
    pub fn info(&self) -> Option<&RoomInfo> {
        self.view.info.as_ref()
    }

    pub fn seats(&self) -> &[Seat] {
        &self.view.seats
    }

    pub fn spectators(&self) -> &[Spectator] {
        &self.view.spectators
    }

    /// Current phase name, from the storyteller view or the player's own view.
    pub fn phase(&self) -> Option<&str> {
        self.view.phase.as_deref().or_else(|| {
            self.view
                .player
                .as_ref()
                .and_then(|p| p.phase.as_deref())
        })
    }

    /// The seat number occupied by `visitor_id`, if any.
    pub fn seat_of(&self, visitor_id: &str) -> Option<u32> {
        self.view
            .seats
            .iter()
            .find(|s| s.is_occupied_by(visitor_id))
            .map(|s| s.seat)
    }

    pub fn is_my_seat(&self, seat: u32, visitor_id: &str) -> bool {
        self.view
            .seats
            .iter()
            .any(|s| s.seat == seat && s.is_occupied_by(visitor_id))
    }

    /// Number of seats with an occupant.
    pub fn occupied_seats(&self) -> usize {
        self.view.seats.iter().filter(|s| !s.is_free()).count()
    }
}

// ── Setup tasks ─────────────────────────────────────────────────────

/// One answer the storyteller may pick for a [`Task`].
///
/// The server decides what `id` is (usually a player id); it is echoed back
/// untouched in the command. Options arrive either as `{"id", "name"}`
/// objects or as bare ids, in which case the id doubles as the name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TaskOptionRepr")]
pub struct TaskOption {
    pub id: Value,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskOptionRepr {
    Named {
        id: Value,
        name: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Bare(Value),
}

impl From<TaskOptionRepr> for TaskOption {
    fn from(repr: TaskOptionRepr) -> Self {
        match repr {
            TaskOptionRepr::Named { id, name, extra } => Self { id, name, extra },
            TaskOptionRepr::Bare(id) => Self {
                name: value_to_string(&id),
                id,
                extra: Map::new(),
            },
        }
    }
}

/// A single prompt the storyteller must answer during setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: String,
    pub role: String,
    pub owner_id: Value,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub options: Vec<TaskOption>,
}

// ── Imperative messages ─────────────────────────────────────────────

/// Who an arrival/departure event is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub seat: Option<u32>,
}

impl Participant {
    fn from_data(data: Option<&Value>, id_key: &str, name_key: &str) -> Option<Self> {
        let data = data?;
        Some(Self {
            id: value_to_string(data.get(id_key)?),
            name: data.get(name_key)?.as_str()?.to_owned(),
            seat: data
                .get("seat")
                .and_then(Value::as_u64)
                .and_then(|s| u32::try_from(s).ok()),
        })
    }
}

/// A classified `event` frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// A batch of storyteller setup tasks, to be resolved in order.
    SetupTasks(Vec<Task>),
    /// The server accepted a task answer.
    TaskDone { id: TaskId },
    /// No setup tasks remain pending.
    SetupComplete,
    SpectatorJoined(Participant),
    SpectatorLeft(Participant),
    PlayerTakenSeat(Participant),
    PlayerVacatedSeat(Participant),
    PlayerLeft(Participant),
    /// Any event name this client does not model.
    Other { name: String, data: Option<Value> },
}

/// A visitor in the night wake order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WakeEntry {
    pub role: String,
    pub owner: Value,
    #[serde(default)]
    pub name: String,
}

/// A classified `patch` frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomPatch {
    /// Night has begun; `wake_list` is the order roles are woken.
    PhaseChange {
        night: Option<u32>,
        wake_list: Vec<WakeEntry>,
    },
    Other { kind: String, data: Option<Value> },
}

/// Private role reveal delivered by an `info` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleReveal {
    pub role_name: String,
    #[serde(default)]
    pub meta: Option<String>,
}

/// A one-shot instruction that drives a transient client reaction.
#[derive(Debug, Clone, PartialEq)]
pub enum ImperativeMessage {
    Event(RoomEvent),
    Patch(RoomPatch),
    RoleReveal(RoleReveal),
    ServerError(String),
}

impl ImperativeMessage {
    /// The setup task batch carried by this message, if any.
    pub fn setup_tasks(&self) -> Option<&[Task]> {
        match self {
            Self::Event(RoomEvent::SetupTasks(tasks)) => Some(tasks),
            _ => None,
        }
    }

    /// A human-readable log line for the storyteller's event log.
    pub fn describe(&self) -> Option<String> {
        match self {
            Self::Event(event) => match event {
                RoomEvent::SetupTasks(tasks) => {
                    Some(format!("{} setup task(s) pending", tasks.len()))
                }
                RoomEvent::TaskDone { id } => Some(format!("Setup task {id} done")),
                RoomEvent::SetupComplete => Some("Setup complete".to_owned()),
                RoomEvent::SpectatorJoined(p) => Some(format!("{} is spectating", p.name)),
                RoomEvent::SpectatorLeft(p) => Some(format!("{} has left", p.name)),
                RoomEvent::PlayerTakenSeat(p) => Some(match p.seat {
                    Some(seat) => format!("{} has taken seat {seat}", p.name),
                    None => format!("{} has taken a seat", p.name),
                }),
                RoomEvent::PlayerVacatedSeat(p) => Some(match p.seat {
                    Some(seat) => {
                        format!("{} has vacated seat {seat} and is now spectating", p.name)
                    }
                    None => format!("{} has vacated a seat and is now spectating", p.name),
                }),
                RoomEvent::PlayerLeft(p) => Some(format!("{} has left the room", p.name)),
                RoomEvent::Other { .. } => None,
            },
            Self::Patch(RoomPatch::PhaseChange { night, wake_list }) => Some(match night {
                Some(n) => format!("Night {n}: {} to wake", wake_list.len()),
                None => format!("Night falls: {} to wake", wake_list.len()),
            }),
            Self::Patch(RoomPatch::Other { .. }) => None,
            Self::RoleReveal(reveal) => Some(format!("You are the {}", reveal.role_name)),
            Self::ServerError(error) => Some(format!("Server error: {error}")),
        }
    }
}

// ── Frames ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct EventBody {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    tasks: Vec<Value>,
    #[serde(default)]
    id: Option<TaskId>,
}

#[derive(Deserialize)]
struct PatchBody {
    kind: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Deserialize)]
struct InfoBody {
    data: RoleReveal,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct HelloBody {
    #[serde(default)]
    gid: Option<String>,
}

#[derive(Deserialize)]
struct PhaseChangeData {
    #[serde(default)]
    night: Option<u32>,
    #[serde(default)]
    wake_list: Vec<WakeEntry>,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    State(Snapshot),
    Event(RoomEvent),
    Patch(RoomPatch),
    Info(RoleReveal),
    Error(String),
    Hello { gid: Option<RoomId> },
}

/// Where a frame's content goes once classified.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Overwrite the snapshot slot.
    Snapshot(Snapshot),
    /// Enqueue for imperative consumers.
    Imperative(ImperativeMessage),
    /// Handshake only; nothing to publish.
    Ack,
}

impl Frame {
    /// Parse and classify one raw text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameParseError`] for malformed JSON, a missing `type`
    /// discriminator, an unknown frame type, or a body that does not match
    /// its declared type.
    pub fn parse(text: &str) -> Result<Self, FrameParseError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameParseError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }

    /// Classify an already-decoded JSON value.
    ///
    /// # Errors
    ///
    /// See [`Frame::parse`].
    pub fn from_value(value: Value) -> Result<Self, FrameParseError> {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameParseError::MissingDiscriminator)?
            .to_owned();

        match tag.as_str() {
            "state" => decode("state", value).map(Frame::State),
            "event" => decode::<EventBody>("event", value).map(|b| Frame::Event(b.classify())),
            "patch" => decode::<PatchBody>("patch", value).map(|b| Frame::Patch(b.classify())),
            "info" => decode::<InfoBody>("info", value).map(|b| Frame::Info(b.data)),
            "error" => decode::<ErrorBody>("error", value).map(|b| {
                Frame::Error(
                    b.error
                        .or(b.message)
                        .unwrap_or_else(|| "unspecified".to_owned()),
                )
            }),
            "hello" => decode::<HelloBody>("hello", value).map(|b| Frame::Hello { gid: b.gid }),
            _ => Err(FrameParseError::UnknownType(tag)),
        }
    }

    /// Short name of the frame tag, for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::State(_) => "state",
            Self::Event(_) => "event",
            Self::Patch(_) => "patch",
            Self::Info(_) => "info",
            Self::Error(_) => "error",
            Self::Hello { .. } => "hello",
        }
    }

    /// Decide which output slot this frame feeds.
    pub fn route(self) -> Route {
        match self {
            Self::State(snapshot) => Route::Snapshot(snapshot),
            Self::Event(event) => Route::Imperative(ImperativeMessage::Event(event)),
            Self::Patch(patch) => Route::Imperative(ImperativeMessage::Patch(patch)),
            Self::Info(reveal) => Route::Imperative(ImperativeMessage::RoleReveal(reveal)),
            Self::Error(error) => Route::Imperative(ImperativeMessage::ServerError(error)),
            Self::Hello { .. } => Route::Ack,
        }
    }
}

impl EventBody {
    fn classify(self) -> RoomEvent {
        let name = self.event.or(self.kind).unwrap_or_default();
        let data = self.data.as_ref();
        let participant = |id_key, name_key| Participant::from_data(data, id_key, name_key);

        let classified = match name.as_str() {
            "setup_tasks" => Some(RoomEvent::SetupTasks(decode_tasks(self.tasks))),
            "task_done" => self.id.map(|id| RoomEvent::TaskDone { id }),
            "setup_complete" => Some(RoomEvent::SetupComplete),
            "SpectatorJoined" => {
                participant("spectator_id", "spectator_name").map(RoomEvent::SpectatorJoined)
            }
            "SpectatorLeft" => {
                participant("spectator_id", "spectator_name").map(RoomEvent::SpectatorLeft)
            }
            "PlayerTakenSeat" => {
                participant("spectator_id", "spectator_name").map(RoomEvent::PlayerTakenSeat)
            }
            "PlayerVacatedSeat" => {
                participant("spectator_id", "spectator_name").map(RoomEvent::PlayerVacatedSeat)
            }
            "PlayerLeft" => participant("player_id", "player_name").map(RoomEvent::PlayerLeft),
            _ => None,
        };

        classified.unwrap_or(RoomEvent::Other {
            name,
            data: self.data,
        })
    }
}

impl PatchBody {
    fn classify(self) -> RoomPatch {
        if self.kind == "PhaseChange" {
            let parsed = self
                .data
                .clone()
                .map(serde_json::from_value::<PhaseChangeData>);
            if let Some(Ok(data)) = parsed {
                return RoomPatch::PhaseChange {
                    night: data.night,
                    wake_list: data.wake_list,
                };
            }
        }
        RoomPatch::Other {
            kind: self.kind,
            data: self.data,
        }
    }
}

fn decode<T: DeserializeOwned>(kind: &'static str, value: Value) -> Result<T, FrameParseError> {
    serde_json::from_value(value).map_err(|e| FrameParseError::InvalidBody {
        kind,
        reason: e.to_string(),
    })
}

/// Decode each task on its own so one malformed entry does not sink the batch.
fn decode_tasks(raw: Vec<Value>) -> Vec<Task> {
    raw.into_iter()
        .filter_map(|value| match serde_json::from_value::<Task>(value) {
            Ok(task) => Some(task),
            Err(error) => {
                warn!(%error, "dropping malformed setup task");
                None
            }
        })
        .collect()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Outbound messages ───────────────────────────────────────────────

/// The storyteller's answer to one [`Task`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandTask {
    pub kind: String,
    pub role: String,
    pub owner_id: Value,
    pub selection: TaskOption,
}

/// Messages sent from the client to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness probe; `t` is the client clock in unix milliseconds.
    Ping { t: u64 },
    /// Ask the server to resend the current state frame.
    GetState,
    /// Reply to a setup task.
    Command { id: TaskId, task: CommandTask },
}

impl ClientMessage {
    /// Build the command answering `task` with `selection`.
    pub fn command_for(task: &Task, selection: TaskOption) -> Self {
        Self::Command {
            id: task.id,
            task: CommandTask {
                kind: task.kind.clone(),
                role: task.role.clone(),
                owner_id: task.owner_id.clone(),
                selection,
            },
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
    use serde_json::json;

    #[test]
    fn missing_discriminator_is_rejected() {
        let err = Frame::parse(r#"{"view":{}}"#).unwrap_err();
        assert_eq!(err, FrameParseError::MissingDiscriminator);
    }

    #[test]
    fn non_string_discriminator_is_rejected() {
        let err = Frame::parse(r#"{"type":7}"#).unwrap_err();
        assert_eq!(err, FrameParseError::MissingDiscriminator);
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = Frame::parse("{not json").unwrap_err();
        assert!(matches!(err, FrameParseError::Malformed(_)));
    }

    #[test]
    fn state_without_view_is_invalid() {
        let err = Frame::parse(r#"{"type":"state"}"#).unwrap_err();
        assert!(matches!(err, FrameParseError::InvalidBody { kind: "state", .. }));
    }

    #[test]
    fn event_name_falls_back_to_kind() {
        let frame = Frame::parse(
            r#"{"type":"event","kind":"PlayerTakenSeat","gid":"abc","ts":"t",
                "data":{"spectator_id":"v1","spectator_name":"Alice","seat":3}}"#,
        )
        .unwrap();
        let Frame::Event(RoomEvent::PlayerTakenSeat(p)) = frame else {
            panic!("expected PlayerTakenSeat");
        };
        assert_eq!(p.id, "v1");
        assert_eq!(p.seat, Some(3));
    }

    #[test]
    fn known_event_with_bad_data_becomes_other() {
        let frame = Frame::parse(r#"{"type":"event","kind":"SpectatorJoined","data":{}}"#).unwrap();
        assert!(matches!(
            frame,
            Frame::Event(RoomEvent::Other { ref name, .. }) if name == "SpectatorJoined"
        ));
    }

    #[test]
    fn phase_change_patch_carries_wake_list() {
        let frame = Frame::parse(
            r#"{"type":"patch","kind":"PhaseChange",
                "data":{"night":1,"wake_list":[{"role":"poisoner","owner":"p2","name":"Bob"}]}}"#,
        )
        .unwrap();
        let Frame::Patch(RoomPatch::PhaseChange { night, wake_list }) = frame else {
            panic!("expected PhaseChange");
        };
        assert_eq!(night, Some(1));
        assert_eq!(wake_list[0].role, "poisoner");
    }

    #[test]
    fn info_frame_is_a_role_reveal() {
        let frame =
            Frame::parse(r#"{"type":"info","data":{"role_name":"Empath","meta":"x"}}"#).unwrap();
        let route = frame.route();
        assert_eq!(
            route,
            Route::Imperative(ImperativeMessage::RoleReveal(RoleReveal {
                role_name: "Empath".into(),
                meta: Some("x".into()),
            }))
        );
    }

    #[test]
    fn hello_is_acknowledged_without_output() {
        let frame = Frame::parse(r#"{"type":"hello","gid":"abc123"}"#).unwrap();
        assert_eq!(frame.tag(), "hello");
        assert_eq!(frame.route(), Route::Ack);
    }

    #[test]
    fn unknown_view_fields_survive() {
        let frame = Frame::parse(
            r#"{"type":"state","view":{"seats":[],"random":"Hello storyteller","night":2}}"#,
        )
        .unwrap();
        let Frame::State(snapshot) = frame else {
            panic!("expected state");
        };
        assert_eq!(snapshot.view.night, Some(2));
        assert_eq!(
            snapshot.view.extra.get("random"),
            Some(&json!("Hello storyteller"))
        );
    }

    #[test]
    fn phase_prefers_storyteller_field_then_player_view() {
        let mut snapshot = Snapshot::default();
        assert_eq!(snapshot.phase(), None);

        snapshot.view.player = Some(PlayerView {
            phase: Some("NIGHT".into()),
            ..Default::default()
        });
        assert_eq!(snapshot.phase(), Some("NIGHT"));

        snapshot.view.phase = Some("DAY".into());
        assert_eq!(snapshot.phase(), Some("DAY"));
    }

    #[test]
    fn command_echoes_task_fields() {
        let task = Task {
            id: 9,
            kind: "select_red_herring".into(),
            role: "fortune_teller".into(),
            owner_id: json!("p1"),
            prompt: "Pick a red herring".into(),
            status: "PENDING".into(),
            options: vec![],
        };
        let selection = TaskOption {
            id: json!("p4"),
            name: "Dana".into(),
            extra: Map::new(),
        };
        let msg = ClientMessage::command_for(&task, selection);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "command",
                "id": 9,
                "task": {
                    "kind": "select_red_herring",
                    "role": "fortune_teller",
                    "owner_id": "p1",
                    "selection": {"id": "p4", "name": "Dana"}
                }
            })
        );
    }

    #[test]
    fn describe_formats_seat_events() {
        let msg = ImperativeMessage::Event(RoomEvent::PlayerVacatedSeat(Participant {
            id: "v1".into(),
            name: "Alice".into(),
            seat: Some(3),
        }));
        assert_eq!(
            msg.describe().as_deref(),
            Some("Alice has vacated seat 3 and is now spectating")
        );
        let other = ImperativeMessage::Event(RoomEvent::Other {
            name: "Mystery".into(),
            data: None,
        });
        assert!(other.describe().is_none());
    }

    #[test]
    fn numeric_ids_decode_as_strings() {
        let frame = Frame::parse(
            r#"{"type":"state","view":{
                "info":{"gid":"r1","storyteller_id":42},
                "seats":[{"seat":1,"occupant":{"id":7,"name":"Ann"}}],
                "spectators":[{"id":8,"name":"Ben"}]
            }}"#,
        )
        .unwrap();
        let Frame::State(snapshot) = frame else {
            panic!("expected state");
        };
        assert_eq!(
            snapshot.info().and_then(|i| i.storyteller_id.as_deref()),
            Some("42")
        );
        assert_eq!(snapshot.seat_of("7"), Some(1));
        assert_eq!(snapshot.spectators()[0].id, "8");
    }
}
