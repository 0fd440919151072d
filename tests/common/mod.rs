#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for room client integration tests.
//!
//! Provides a channel-driven [`MockTransport`], a scripted [`MockConnector`],
//! a recording [`FakeRoomApi`] and helpers for building server frames.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use botc_room_client::protocol::RoomView;
use botc_room_client::rest::{RoomApi, StepResult};
use botc_room_client::role::RoomMeta;
use botc_room_client::{
    BotcError, ChannelManager, ClientConfig, Connector, ReconnectPolicy, RoomSessionRole,
    Transport, VisitorIdentity,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// Ordered log of REST calls and socket opens/closes, shared across fakes.
pub type Journal = Arc<StdMutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(StdMutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// One scripted `recv()` result: a frame, a receive error, or `None` for a
/// server-side close.
pub type Incoming = Option<Result<String, BotcError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// A transport fed by a [`ServerHandle`].
///
/// `recv()` yields whatever the handle pushes and otherwise waits, so the
/// channel loop stays alive until the test closes it.
pub struct MockTransport {
    url: String,
    incoming: mpsc::UnboundedReceiver<Incoming>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    journal: Journal,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), BotcError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BotcError::TransportClosed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, BotcError>> {
        match self.incoming.recv().await {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), BotcError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.journal.lock().unwrap().push(format!("close {}", self.url));
        }
        Ok(())
    }
}

/// The test's end of one mock connection.
#[derive(Clone)]
pub struct ServerHandle {
    tx: mpsc::UnboundedSender<Incoming>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Deliver one text frame to the client.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.tx.send(Some(Ok(frame.into())));
    }

    /// Close the connection from the server side.
    pub fn drop_connection(&self) {
        let _ = self.tx.send(None);
    }

    /// Fail the next receive with a transport error.
    pub fn fail(&self, reason: &str) {
        let _ = self.tx.send(Some(Err(BotcError::TransportReceive(reason.into()))));
    }

    /// Raw text of every message the client sent on this connection.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ── MockConnector ───────────────────────────────────────────────────

enum Outcome {
    Accept(MockTransportParts),
    Refuse,
}

struct MockTransportParts {
    incoming: mpsc::UnboundedReceiver<Incoming>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

/// A [`Connector`] that replays scripted outcomes in order.
///
/// Each [`accept`](Self::accept) queues one successful open and returns the
/// handle to drive it; [`refuse`](Self::refuse) queues failures. Opens beyond
/// the script are refused.
pub struct MockConnector {
    script: StdMutex<VecDeque<Outcome>>,
    urls: StdMutex<Vec<String>>,
    journal: Journal,
}

impl MockConnector {
    pub fn new(journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            script: StdMutex::new(VecDeque::new()),
            urls: StdMutex::new(Vec::new()),
            journal,
        })
    }

    pub fn accept(&self) -> ServerHandle {
        let (tx, incoming) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        self.script
            .lock()
            .unwrap()
            .push_back(Outcome::Accept(MockTransportParts {
                incoming,
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            }));
        ServerHandle { tx, sent, closed }
    }

    pub fn refuse(&self, times: usize) {
        let mut script = self.script.lock().unwrap();
        for _ in 0..times {
            script.push_back(Outcome::Refuse);
        }
    }

    /// Every URL a connection was attempted to, in order.
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.urls.lock().unwrap().len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, BotcError> {
        self.urls.lock().unwrap().push(url.to_owned());
        let outcome = self.script.lock().unwrap().pop_front();
        match outcome {
            Some(Outcome::Accept(parts)) => {
                self.journal.lock().unwrap().push(format!("open {url}"));
                Ok(Box::new(MockTransport {
                    url: url.to_owned(),
                    incoming: parts.incoming,
                    sent: parts.sent,
                    closed: parts.closed,
                    journal: Arc::clone(&self.journal),
                }))
            }
            Some(Outcome::Refuse) | None => {
                Err(BotcError::Connection(format!("refused: {url}")))
            }
        }
    }
}

// ── FakeRoomApi ─────────────────────────────────────────────────────

/// Records every call in the journal as `rest <op> <args>`.
pub struct FakeRoomApi {
    storyteller_id: StdMutex<Option<String>>,
    failing: StdMutex<HashSet<&'static str>>,
    journal: Journal,
}

impl FakeRoomApi {
    pub fn new(journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            storyteller_id: StdMutex::new(None),
            failing: StdMutex::new(HashSet::new()),
            journal,
        })
    }

    /// Rooms report `id` as their storyteller.
    pub fn set_storyteller(&self, id: &str) {
        *self.storyteller_id.lock().unwrap() = Some(id.to_owned());
    }

    /// Make `op` answer 409 from now on.
    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    fn call(&self, op: &'static str, args: String) -> Result<(), BotcError> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("rest {op} {args}").trim_end().to_owned());
        if self.failing.lock().unwrap().contains(op) {
            return Err(BotcError::Rest {
                status: Some(409),
                message: format!("{op} refused"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RoomApi for FakeRoomApi {
    async fn create_room(&self, creator: &VisitorIdentity) -> Result<RoomMeta, BotcError> {
        self.call("create_room", creator.id.clone())?;
        self.set_storyteller(&creator.id);
        Ok(RoomMeta {
            gid: "new-room".into(),
            name: "Untitled Room".into(),
            storyteller_id: Some(creator.id.clone()),
            status: Some("open".into()),
        })
    }

    async fn get_room(&self, room_id: &str) -> Result<RoomMeta, BotcError> {
        self.call("get_room", room_id.to_owned())?;
        Ok(RoomMeta {
            gid: room_id.to_owned(),
            name: "Friday Game".into(),
            storyteller_id: self.storyteller_id.lock().unwrap().clone(),
            status: Some("open".into()),
        })
    }

    async fn join_room(&self, room_id: &str, visitor: &VisitorIdentity) -> Result<(), BotcError> {
        self.call("join", format!("{room_id} {}", visitor.id))
    }

    async fn sit(
        &self,
        room_id: &str,
        seat: u32,
        visitor: &VisitorIdentity,
    ) -> Result<(), BotcError> {
        self.call("sit", format!("{room_id} {seat} {}", visitor.id))
    }

    async fn vacate(
        &self,
        room_id: &str,
        seat: u32,
        visitor: &VisitorIdentity,
    ) -> Result<(), BotcError> {
        self.call("vacate", format!("{room_id} {seat} {}", visitor.id))
    }

    async fn leave(&self, room_id: &str, visitor: &VisitorIdentity) -> Result<(), BotcError> {
        self.call("leave", format!("{room_id} {}", visitor.id))
    }

    async fn update_seat_count(&self, room_id: &str, seat_count: usize) -> Result<(), BotcError> {
        self.call("seats", format!("{room_id} {seat_count}"))
    }

    async fn start_game(&self, room_id: &str) -> Result<(), BotcError> {
        self.call("start", room_id.to_owned())
    }

    async fn step(&self, room_id: &str) -> Result<StepResult, BotcError> {
        self.call("step", room_id.to_owned())?;
        Ok(StepResult {
            phase: Some("NIGHT".into()),
            night: Some(1),
        })
    }

    async fn lobby(&self) -> Result<Vec<RoomView>, BotcError> {
        self.call("lobby", String::new())?;
        Ok(Vec::new())
    }
}

// ── Construction helpers ────────────────────────────────────────────

pub const WS_BASE: &str = "ws://test/ws";

pub fn visitor() -> VisitorIdentity {
    VisitorIdentity {
        id: "v-alice".into(),
        name: "Alice".into(),
    }
}

/// Config pointing at [`WS_BASE`] with a fast, recognizable backoff.
pub fn config() -> ClientConfig {
    ClientConfig::new(WS_BASE, "http://test/api")
        .with_reconnect_policy(ReconnectPolicy::from_millis(500, 15_000))
}

pub fn channel(role: RoomSessionRole, connector: Arc<MockConnector>) -> ChannelManager {
    ChannelManager::new(role, visitor(), connector, &config())
}

/// Yield to the runtime until `condition` holds.
///
/// Never advances a paused clock.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

// ── Frame fixtures ──────────────────────────────────────────────────

/// A `state` frame with the given `(seat, occupant)` pairs.
pub fn state_json(seats: &[(u32, Option<(&str, &str)>)]) -> String {
    let seats: Vec<Value> = seats
        .iter()
        .map(|(seat, occupant)| {
            json!({
                "seat": seat,
                "occupant": occupant.map(|(id, name)| json!({"id": id, "name": name})),
            })
        })
        .collect();
    json!({
        "type": "state",
        "view": {
            "info": {"gid": "r1", "name": "Friday Game", "status": "open"},
            "seats": seats,
            "spectators": [],
        }
    })
    .to_string()
}

/// A `state` frame with `n` empty seats.
pub fn empty_table_json(n: u32) -> String {
    let seats: Vec<(u32, Option<(&str, &str)>)> = (1..=n).map(|s| (s, None)).collect();
    state_json(&seats)
}

/// A `setup_tasks` event carrying one task per id.
pub fn setup_tasks_json(ids: &[u64]) -> String {
    let tasks: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "kind": "select_red_herring",
                "role": "fortune_teller",
                "owner_id": "p1",
                "prompt": "Choose a red herring",
                "status": "pending",
                "options": [
                    {"id": "p2", "name": "Bob", "role": "imp"},
                    {"id": "p3", "name": "Cara", "role": "monk"}
                ]
            })
        })
        .collect();
    json!({"type": "event", "event": "setup_tasks", "tasks": tasks}).to_string()
}

pub fn task_done_json(id: u64) -> String {
    json!({"type": "event", "event": "task_done", "id": id}).to_string()
}

pub fn spectator_joined_json(id: &str, name: &str) -> String {
    json!({
        "type": "event",
        "kind": "SpectatorJoined",
        "data": {"spectator_id": id, "spectator_name": name},
        "gid": "r1",
        "ts": 1_700_000_000
    })
    .to_string()
}

pub fn phase_change_json(night: u32) -> String {
    json!({
        "type": "patch",
        "kind": "PhaseChange",
        "data": {"night": night, "wake_list": [{"role": "poisoner", "owner": "p4", "name": "Dan"}]}
    })
    .to_string()
}

pub fn hello_json() -> String {
    json!({"type": "hello", "gid": "r1"}).to_string()
}
