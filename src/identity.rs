//! Durable visitor identity.
//!
//! A visitor registers once with a display name and receives a random id.
//! The pair is persisted under a single `visitor` key in a small JSON file;
//! if the key is absent the visitor must register before entering a room.
//!
//! The identity is read once and then passed explicitly to the components
//! that need it, never re-read from storage mid-session.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BotcError, Result};

/// Storage key the identity lives under.
pub const VISITOR_KEY: &str = "visitor";

/// Who this client is: a stable id and a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorIdentity {
    pub id: String,
    pub name: String,
}

impl VisitorIdentity {
    /// Register a new visitor with a fresh random id.
    ///
    /// # Errors
    ///
    /// Returns [`BotcError::InvalidName`] if `name` is blank.
    pub fn register(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(BotcError::InvalidName);
        }
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: trimmed.to_owned(),
        })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    visitor: Option<VisitorIdentity>,
}

/// File-backed store for the [`VisitorIdentity`].
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted identity, if any.
    ///
    /// A missing file means "not registered" rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`BotcError::Io`] if the file exists but cannot be read, or
    /// [`BotcError::Serialization`] if its contents are corrupt.
    pub async fn load(&self) -> Result<Option<VisitorIdentity>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no stored identity");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let state: StoredState = serde_json::from_str(&raw)?;
        Ok(state.visitor)
    }

    /// Load the persisted identity or fail with [`BotcError::NotRegistered`].
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load); additionally returns
    /// [`BotcError::NotRegistered`] when no identity is stored.
    pub async fn require(&self) -> Result<VisitorIdentity> {
        self.load().await?.ok_or(BotcError::NotRegistered)
    }

    /// Persist `identity`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`BotcError::Io`] if the file cannot be written.
    pub async fn save(&self, identity: &VisitorIdentity) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let state = StoredState {
            visitor: Some(identity.clone()),
        };
        let json = serde_json::to_string_pretty(&state)?;
        tokio::fs::write(&self.path, json).await?;
        info!(visitor_id = %identity.id, "visitor identity saved");
        Ok(())
    }

    /// Forget the stored identity. Clearing an absent identity is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BotcError::Io`] if the file exists but cannot be removed.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
