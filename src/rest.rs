//! REST calls for room membership and storyteller actions.
//!
//! [`RoomApi`] is the seam a [`RoomSession`](crate::session::RoomSession)
//! talks to; [`HttpRoomApi`] implements it over `reqwest` against
//! `{api_base}/rooms/...` and `{api_base}/lobby`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::identity::VisitorIdentity;
use crate::protocol::{RoomId, RoomInfo, RoomView};
use crate::role::RoomMeta;

// ── Request bodies ──────────────────────────────────────────────────

/// `{id, name}` of the visitor making a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitorRef<'a> {
    pub id: &'a str,
    pub name: &'a str,
}

impl<'a> From<&'a VisitorIdentity> for VisitorRef<'a> {
    fn from(visitor: &'a VisitorIdentity) -> Self {
        Self {
            id: &visitor.id,
            name: &visitor.name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateRoomBody<'a> {
    pub creator: VisitorRef<'a>,
}

#[derive(Debug, Serialize)]
pub struct SitBody<'a> {
    pub spectator_id: &'a str,
    pub seat: u32,
}

#[derive(Debug, Serialize)]
pub struct VacateBody<'a> {
    pub player_id: &'a str,
    pub seat: u32,
}

#[derive(Debug, Serialize)]
pub struct LeaveBody<'a> {
    pub player_id: &'a str,
}

/// The server reads `max_players`; `seat_count` is kept for older builds.
#[derive(Debug, Serialize)]
pub struct SeatCountBody {
    pub seat_count: usize,
    pub max_players: usize,
}

// ── Response bodies ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreatedRoom {
    gid: RoomId,
    #[serde(default)]
    room: Option<RoomInfo>,
}

#[derive(Debug, Deserialize)]
struct LobbyResponse {
    #[serde(default, alias = "rooms")]
    lobby: Vec<RoomView>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Reply to a phase step: the new phase and night counter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StepResult {
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub night: Option<u32>,
}

// ── Collaborator trait ──────────────────────────────────────────────

/// Room membership and control calls.
#[async_trait]
pub trait RoomApi: Send + Sync {
    /// Create a room owned by `creator`, who becomes its storyteller.
    async fn create_room(&self, creator: &VisitorIdentity) -> Result<RoomMeta>;

    /// Fetch the details needed to pick a role.
    async fn get_room(&self, room_id: &str) -> Result<RoomMeta>;

    /// Register `visitor` as a spectator.
    async fn join_room(&self, room_id: &str, visitor: &VisitorIdentity) -> Result<()>;

    async fn sit(&self, room_id: &str, seat: u32, visitor: &VisitorIdentity) -> Result<()>;

    async fn vacate(&self, room_id: &str, seat: u32, visitor: &VisitorIdentity) -> Result<()>;

    async fn leave(&self, room_id: &str, visitor: &VisitorIdentity) -> Result<()>;

    async fn update_seat_count(&self, room_id: &str, seat_count: usize) -> Result<()>;

    async fn start_game(&self, room_id: &str) -> Result<()>;

    /// Advance the game one phase.
    async fn step(&self, room_id: &str) -> Result<StepResult>;

    /// Every open room, as its public view.
    async fn lobby(&self) -> Result<Vec<RoomView>>;
}

// ── HTTP implementation ─────────────────────────────────────────────

#[cfg(feature = "rest-http")]
pub use http::HttpRoomApi;

#[cfg(feature = "rest-http")]
mod http {
    use async_trait::async_trait;
    use reqwest::{Client, RequestBuilder, Response};
    use serde::de::DeserializeOwned;
    use tracing::{debug, warn};

    use super::{
        CreateRoomBody, CreatedRoom, ErrorBody, LeaveBody, LobbyResponse, RoomApi, SeatCountBody,
        SitBody, StepResult, VacateBody, VisitorRef,
    };
    use crate::error::{BotcError, Result};
    use crate::identity::VisitorIdentity;
    use crate::protocol::RoomView;
    use crate::role::{check_path_segment, RoomMeta};

    /// [`RoomApi`] over HTTP.
    #[derive(Debug, Clone)]
    pub struct HttpRoomApi {
        client: Client,
        base: String,
    }

    impl HttpRoomApi {
        /// `api_base` is e.g. `http://localhost:8765/api`.
        pub fn new(api_base: impl Into<String>) -> Self {
            Self::with_client(Client::new(), api_base)
        }

        pub fn with_client(client: Client, api_base: impl Into<String>) -> Self {
            let mut base = api_base.into();
            while base.ends_with('/') {
                base.pop();
            }
            Self { client, base }
        }

        pub fn base(&self) -> &str {
            &self.base
        }

        fn room_url(&self, room_id: &str, action: Option<&str>) -> Result<String> {
            check_path_segment("room id", room_id)?;
            Ok(match action {
                Some(action) => format!("{}/rooms/{room_id}/{action}", self.base),
                None => format!("{}/rooms/{room_id}", self.base),
            })
        }

        async fn execute(&self, request: RequestBuilder) -> Result<Response> {
            let response = request.send().await.map_err(|e| BotcError::Rest {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            })?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error)
                .unwrap_or(text);
            warn!(status = status.as_u16(), %message, "room api request failed");
            Err(BotcError::Rest {
                status: Some(status.as_u16()),
                message,
            })
        }

        async fn execute_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
            self.execute(request)
                .await?
                .json::<T>()
                .await
                .map_err(|e| BotcError::Rest {
                    status: None,
                    message: format!("invalid response body: {e}"),
                })
        }
    }

    #[async_trait]
    impl RoomApi for HttpRoomApi {
        async fn create_room(&self, creator: &VisitorIdentity) -> Result<RoomMeta> {
            let body = CreateRoomBody {
                creator: VisitorRef::from(creator),
            };
            let created: CreatedRoom = self
                .execute_json(self.client.post(format!("{}/rooms", self.base)).json(&body))
                .await?;
            debug!(room_id = %created.gid, "room created");

            let info = created.room.unwrap_or_default();
            Ok(RoomMeta {
                gid: created.gid,
                name: info.name,
                storyteller_id: info.storyteller_id.or_else(|| Some(creator.id.clone())),
                status: info.status,
            })
        }

        async fn get_room(&self, room_id: &str) -> Result<RoomMeta> {
            let mut meta: RoomMeta = self
                .execute_json(self.client.get(self.room_url(room_id, None)?))
                .await?;
            if meta.gid.is_empty() {
                meta.gid = room_id.to_owned();
            }
            Ok(meta)
        }

        async fn join_room(&self, room_id: &str, visitor: &VisitorIdentity) -> Result<()> {
            let url = self.room_url(room_id, Some("join"))?;
            self.execute(self.client.post(url).json(&VisitorRef::from(visitor)))
                .await?;
            Ok(())
        }

        async fn sit(&self, room_id: &str, seat: u32, visitor: &VisitorIdentity) -> Result<()> {
            let body = SitBody {
                spectator_id: &visitor.id,
                seat,
            };
            let url = self.room_url(room_id, Some("sit"))?;
            self.execute(self.client.post(url).json(&body)).await?;
            Ok(())
        }

        async fn vacate(&self, room_id: &str, seat: u32, visitor: &VisitorIdentity) -> Result<()> {
            let body = VacateBody {
                player_id: &visitor.id,
                seat,
            };
            let url = self.room_url(room_id, Some("vacate"))?;
            self.execute(self.client.post(url).json(&body)).await?;
            Ok(())
        }

        async fn leave(&self, room_id: &str, visitor: &VisitorIdentity) -> Result<()> {
            let body = LeaveBody {
                player_id: &visitor.id,
            };
            let url = self.room_url(room_id, Some("leave"))?;
            self.execute(self.client.post(url).json(&body)).await?;
            Ok(())
        }

        async fn update_seat_count(&self, room_id: &str, seat_count: usize) -> Result<()> {
            let body = SeatCountBody {
                seat_count,
                max_players: seat_count,
            };
            let url = self.room_url(room_id, Some("seats"))?;
            self.execute(self.client.post(url).json(&body)).await?;
            Ok(())
        }

        async fn start_game(&self, room_id: &str) -> Result<()> {
            let url = self.room_url(room_id, Some("start"))?;
            self.execute(self.client.post(url).json(&serde_json::json!({})))
                .await?;
            Ok(())
        }

        async fn step(&self, room_id: &str) -> Result<StepResult> {
            let url = self.room_url(room_id, Some("step"))?;
            self.execute_json(self.client.post(url).json(&serde_json::json!({})))
                .await
        }

        async fn lobby(&self) -> Result<Vec<RoomView>> {
            let response: LobbyResponse = self
                .execute_json(self.client.get(format!("{}/lobby", self.base)))
                .await?;
            Ok(response.lobby)
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
        use httpmock::prelude::*;
        use serde_json::json;

        fn visitor() -> VisitorIdentity {
            VisitorIdentity {
                id: "v-1".into(),
                name: "Alice".into(),
            }
        }

        fn api(server: &MockServer) -> HttpRoomApi {
            HttpRoomApi::new(format!("{}/api/", server.base_url()))
        }

        #[tokio::test]
        async fn create_room_posts_creator_and_reads_gid() {
            let server = MockServer::start();
            let create = server.mock(|when, then| {
                when.method(POST)
                    .path("/api/rooms")
                    .json_body(json!({"creator": {"id": "v-1", "name": "Alice"}}));
                then.status(200).json_body(json!({
                    "gid": "ab12cd34",
                    "room": {"gid": "ab12cd34", "name": "Untitled Room", "storyteller_id": "v-1"},
                    "seats": [{"seat": 1, "occupant": null}]
                }));
            });

            let meta = api(&server).create_room(&visitor()).await.unwrap();
            create.assert();
            assert_eq!(meta.gid, "ab12cd34");
            assert_eq!(meta.storyteller_id.as_deref(), Some("v-1"));
        }

        #[tokio::test]
        async fn get_room_fills_in_missing_gid() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(GET).path("/api/rooms/r1");
                then.status(200).json_body(json!({
                    "ok": true,
                    "storyteller_id": 17,
                    "total_spectators": 2,
                    "total_players": 0
                }));
            });

            let meta = api(&server).get_room("r1").await.unwrap();
            assert_eq!(meta.gid, "r1");
            assert_eq!(meta.storyteller_id.as_deref(), Some("17"));
        }

        #[tokio::test]
        async fn sit_sends_spectator_and_seat() {
            let server = MockServer::start();
            let sit = server.mock(|when, then| {
                when.method(POST)
                    .path("/api/rooms/r1/sit")
                    .json_body(json!({"spectator_id": "v-1", "seat": 3}));
                then.status(200).json_body(json!({"ok": true}));
            });

            api(&server).sit("r1", 3, &visitor()).await.unwrap();
            sit.assert();
        }

        #[tokio::test]
        async fn error_bodies_map_to_rest_errors() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(POST).path("/api/rooms/r1/vacate");
                then.status(409).json_body(json!({"error": "not_your_seat"}));
            });

            let err = api(&server).vacate("r1", 2, &visitor()).await.unwrap_err();
            let BotcError::Rest { status, message } = err else {
                panic!("expected rest error");
            };
            assert_eq!(status, Some(409));
            assert_eq!(message, "not_your_seat");
        }

        #[tokio::test]
        async fn room_ids_with_path_characters_never_reach_the_server() {
            let server = MockServer::start();
            let api = api(&server);

            let err = api.leave("r1/../lobby", &visitor()).await.unwrap_err();
            assert!(matches!(err, BotcError::InvalidId { field: "room id", .. }));

            let err = api.get_room("r1?admin=1").await.unwrap_err();
            assert!(matches!(err, BotcError::InvalidId { .. }));
        }

        #[tokio::test]
        async fn seat_count_sends_both_field_names() {
            let server = MockServer::start();
            let seats = server.mock(|when, then| {
                when.method(POST)
                    .path("/api/rooms/r1/seats")
                    .json_body(json!({"seat_count": 9, "max_players": 9}));
                then.status(200).json_body(json!({"ok": true}));
            });

            api(&server).update_seat_count("r1", 9).await.unwrap();
            seats.assert();
        }

        #[tokio::test]
        async fn step_reports_new_phase() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(POST).path("/api/rooms/r1/step");
                then.status(200)
                    .json_body(json!({"ok": true, "phase": "NIGHT", "night": 1}));
            });

            let step = api(&server).step("r1").await.unwrap();
            assert_eq!(step.phase.as_deref(), Some("NIGHT"));
            assert_eq!(step.night, Some(1));
        }

        #[tokio::test]
        async fn lobby_lists_room_views() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(GET).path("/api/lobby");
                then.status(200).json_body(json!({"lobby": [
                    {"info": {"gid": "r1", "name": "Friday"}, "seats": [], "spectators": [], "players": 0}
                ]}));
            });

            let rooms = api(&server).lobby().await.unwrap();
            assert_eq!(rooms.len(), 1);
            assert_eq!(rooms[0].info.as_ref().map(|i| i.gid.as_str()), Some("r1"));
        }

        #[tokio::test]
        async fn unreachable_server_is_a_rest_error_without_status() {
            let api = HttpRoomApi::new("http://127.0.0.1:1/api");
            let err = api.start_game("r1").await.unwrap_err();
            assert!(matches!(err, BotcError::Rest { status: None, .. }));
        }
    }
}
