//! Client configuration.
//!
//! # Example
//!
//! ```
//! use botc_room_client::config::ClientConfig;
//! use botc_room_client::ReconnectPolicy;
//! use std::time::Duration;
//!
//! let config = ClientConfig::new("ws://localhost:8765/ws", "http://localhost:8765/api")
//!     .with_reconnect_policy(ReconnectPolicy::from_millis(1000, 8000))
//!     .with_connect_timeout(Duration::from_secs(5));
//! assert_eq!(config.reconnect_policy.base(), Duration::from_secs(1));
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::backoff::ReconnectPolicy;

/// Default real-time channel base URL.
pub const DEFAULT_WS_BASE: &str = "ws://localhost:8765/ws";

/// Default REST base URL.
pub const DEFAULT_API_BASE: &str = "http://localhost:8765/api";

/// Environment variable overriding [`ClientConfig::ws_base`].
pub const ENV_WS_BASE: &str = "BOTC_SERVICE_WS";

/// Environment variable overriding [`ClientConfig::api_base`].
pub const ENV_API_BASE: &str = "BOTC_SERVICE_URI";

/// Default timeout for stopping a channel's background loop.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default location of the persisted visitor identity.
const DEFAULT_IDENTITY_FILE: &str = "visitor.json";

/// Settings shared by every channel and REST call of one client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base for channel URLs: `{ws_base}/{room_id}/{role_path}`.
    pub ws_base: String,
    /// Base for REST calls: `{api_base}/rooms/...`.
    pub api_base: String,
    /// Reconnection schedule after an unexpected close.
    pub reconnect_policy: ReconnectPolicy,
    /// Optional bound on how long opening a socket may take.
    ///
    /// `None` (the default) waits for the socket to open or fail.
    pub connect_timeout: Option<Duration>,
    /// How long [`close`](crate::ChannelManager::close) waits for the
    /// background loop to exit before aborting it.
    pub shutdown_timeout: Duration,
    /// Where the visitor identity is persisted.
    pub identity_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WS_BASE, DEFAULT_API_BASE)
    }
}

impl ClientConfig {
    /// Create a configuration with the given service bases and default values.
    pub fn new(ws_base: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            ws_base: trim_base(ws_base.into()),
            api_base: trim_base(api_base.into()),
            reconnect_policy: ReconnectPolicy::default(),
            connect_timeout: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            identity_path: PathBuf::from(DEFAULT_IDENTITY_FILE),
        }
    }

    /// Build from [`ENV_WS_BASE`] / [`ENV_API_BASE`], falling back to the
    /// local development defaults.
    pub fn from_env() -> Self {
        let ws = env_or(ENV_WS_BASE, DEFAULT_WS_BASE);
        let api = env_or(ENV_API_BASE, DEFAULT_API_BASE);
        Self::new(ws, api)
    }

    #[must_use]
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_identity_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_path = path.into();
        self
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_owned())
}

fn trim_base(mut base: String) -> String {
    while base.ends_with('/') {
        base.pop();
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_service() {
        let config = ClientConfig::default();
        assert_eq!(config.ws_base, DEFAULT_WS_BASE);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.reconnect_policy, ReconnectPolicy::default());
        assert!(config.connect_timeout.is_none());
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn trailing_slashes_are_trimmed() {
        let config = ClientConfig::new("ws://host/ws//", "http://host/api/");
        assert_eq!(config.ws_base, "ws://host/ws");
        assert_eq!(config.api_base, "http://host/api");
    }

    #[test]
    fn builder_methods_apply() {
        let config = ClientConfig::default()
            .with_connect_timeout(Duration::from_millis(250))
            .with_shutdown_timeout(Duration::from_millis(10))
            .with_identity_path("/tmp/me.json");
        assert_eq!(config.connect_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.shutdown_timeout, Duration::from_millis(10));
        assert_eq!(config.identity_path, PathBuf::from("/tmp/me.json"));
    }
}
