//! Room roles and the channel each role speaks to.
//!
//! A visitor is exactly one of spectator, seated player or storyteller in a
//! room. [`ConnectionSelector::resolve_role`] decides which on room entry;
//! [`ChannelTarget`] turns a role into the concrete channel URL.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BotcError, Result};
use crate::identity::VisitorIdentity;
use crate::protocol::RoomId;

/// The role a visitor holds within one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomSessionRole {
    Spectator,
    Player,
    Storyteller,
}

impl fmt::Display for RoomSessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Spectator => "spectator",
            Self::Player => "player",
            Self::Storyteller => "storyteller",
        })
    }
}

/// Room details the selector needs, as returned by the REST collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMeta {
    #[serde(default)]
    pub gid: RoomId,
    #[serde(default)]
    pub name: String,
    #[serde(
        default,
        alias = "story_teller_id",
        deserialize_with = "crate::protocol::flexible_id::deserialize_opt"
    )]
    pub storyteller_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Picks the role a visitor enters a room with.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionSelector;

impl ConnectionSelector {
    /// Storyteller if the visitor created the room, otherwise spectator until
    /// a seat transition promotes them to player.
    pub fn resolve_role(room: &RoomMeta, visitor_id: &str) -> RoomSessionRole {
        match room.storyteller_id.as_deref() {
            Some(st) if !visitor_id.is_empty() && st == visitor_id => RoomSessionRole::Storyteller,
            _ => RoomSessionRole::Spectator,
        }
    }
}

/// Which per-role socket path to open under a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelEndpoint {
    /// `room`: the read-only spectator view.
    Room,
    /// `player/{player_id}`: a seated player's private view.
    Player { player_id: String },
    /// `st`: the storyteller's grimoire.
    Storyteller,
}

impl ChannelEndpoint {
    pub fn role(&self) -> RoomSessionRole {
        match self {
            Self::Room => RoomSessionRole::Spectator,
            Self::Player { .. } => RoomSessionRole::Player,
            Self::Storyteller => RoomSessionRole::Storyteller,
        }
    }

    fn path(&self) -> String {
        match self {
            Self::Room => "room".to_owned(),
            Self::Player { player_id } => format!("player/{player_id}"),
            Self::Storyteller => "st".to_owned(),
        }
    }
}

/// A fully specified channel to connect to: room plus role endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelTarget {
    pub room_id: RoomId,
    pub endpoint: ChannelEndpoint,
}

impl ChannelTarget {
    /// The channel a visitor with `role` uses in `room_id`.
    pub fn for_role(
        room_id: impl Into<RoomId>,
        role: RoomSessionRole,
        visitor: &VisitorIdentity,
    ) -> Self {
        let endpoint = match role {
            RoomSessionRole::Spectator => ChannelEndpoint::Room,
            RoomSessionRole::Player => ChannelEndpoint::Player {
                player_id: visitor.id.clone(),
            },
            RoomSessionRole::Storyteller => ChannelEndpoint::Storyteller,
        };
        Self {
            room_id: room_id.into(),
            endpoint,
        }
    }

    pub fn role(&self) -> RoomSessionRole {
        self.endpoint.role()
    }

    /// Reject targets that are missing required parameters or that would
    /// not address a single channel path.
    ///
    /// # Errors
    ///
    /// Returns [`BotcError::Connection`] if the room id or player id is blank,
    /// and [`BotcError::InvalidId`] if either contains a path-reserved character.
    pub fn validate(&self) -> Result<()> {
        if self.room_id.trim().is_empty() {
            return Err(BotcError::Connection("missing room id".into()));
        }
        check_path_segment("room id", &self.room_id)?;
        if let ChannelEndpoint::Player { player_id } = &self.endpoint {
            if player_id.trim().is_empty() {
                return Err(BotcError::Connection("missing player id".into()));
            }
            check_path_segment("player id", player_id)?;
        }
        Ok(())
    }

    /// `{ws_base}/{room_id}/{role_path}`.
    pub fn url(&self, ws_base: &str) -> String {
        format!(
            "{}/{}/{}",
            ws_base.trim_end_matches('/'),
            self.room_id,
            self.endpoint.path()
        )
    }
}

/// Ids are spliced verbatim into channel and REST paths, so they must stay
/// one segment.
pub(crate) fn check_path_segment(field: &'static str, value: &str) -> Result<()> {
    let reserved = |c: char| {
        matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control()
    };
    if value == "." || value == ".." || value.chars().any(reserved) {
        return Err(BotcError::InvalidId {
            field,
            value: value.to_owned(),
        });
    }
    Ok(())
}

impl fmt::Display for ChannelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.room_id, self.endpoint.path())
    }
}
