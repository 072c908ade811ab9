//! Status module - Builds the JSON status document
//!
//! The document is rebuilt for every status request from an immutable
//! snapshot of the configured server metadata.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::protocol::{DEFAULT_PROTOCOL_VERSION, DEFAULT_VERSION_NAME};

/// Favicon prefix clients understand
pub const FAVICON_PREFIX: &str = "data:image/png;base64,";

/// Server description (MOTD)
///
/// Serialized without a tag: either a bare JSON string or a chat component
/// object such as `{"text": "hello", "color": "gold"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Description {
    PlainText(String),
    RichText(serde_json::Value),
}

impl Default for Description {
    fn default() -> Self {
        Description::PlainText("A Minecraft Server".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub protocol: i32,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            name: DEFAULT_VERSION_NAME.to_string(),
            protocol: DEFAULT_PROTOCOL_VERSION,
        }
    }
}

/// One entry of the player list shown on hover
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSample {
    pub name: String,
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayersInfo {
    pub max: i32,
    pub online: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<Vec<PlayerSample>>,
}

/// The document sent in a status response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: VersionInfo,
    pub players: PlayersInfo,
    pub description: Description,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

/// Player counts as configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayersConfig {
    #[serde(default = "default_max_players")]
    pub max: i32,
    #[serde(default)]
    pub online: i32,
    #[serde(default)]
    pub sample: Vec<PlayerSample>,
}

fn default_max_players() -> i32 {
    20
}

impl Default for PlayersConfig {
    fn default() -> Self {
        Self {
            max: default_max_players(),
            online: 0,
            sample: Vec::new(),
        }
    }
}

/// Server metadata served to clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default)]
    pub version: VersionInfo,
    #[serde(default)]
    pub players: PlayersConfig,
    #[serde(default)]
    pub description: Description,
    /// Data URI of a 64x64 PNG
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

/// Builds status documents from a shared, read-only snapshot
#[derive(Debug, Clone)]
pub struct StatusResponder {
    config: Arc<StatusConfig>,
}

impl StatusResponder {
    pub fn new(config: StatusConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &StatusConfig {
        &self.config
    }

    /// Build a fresh status document
    pub fn response(&self) -> StatusResponse {
        let config = &self.config;

        let sample = if config.players.sample.is_empty() {
            None
        } else {
            Some(config.players.sample.clone())
        };

        let favicon = config
            .favicon
            .as_ref()
            .filter(|favicon| !favicon.is_empty())
            .cloned();

        StatusResponse {
            version: config.version.clone(),
            players: PlayersInfo {
                max: config.players.max,
                online: config.players.online,
                sample,
            },
            description: config.description.clone(),
            favicon,
        }
    }

    /// Serialize a fresh status document
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.response())
    }

    /// Problems with the configured metadata that clients will notice
    pub fn warnings(&self) -> Vec<String> {
        let config = &self.config;
        let mut warnings = Vec::new();

        if let Some(favicon) = config.favicon.as_deref() {
            if !favicon.is_empty() && !favicon.starts_with(FAVICON_PREFIX) {
                warnings.push(format!("favicon should start with \"{}\"", FAVICON_PREFIX));
            }
        }

        if config.players.online > config.players.max {
            warnings.push(format!(
                "online player count ({}) exceeds max ({})",
                config.players.online, config.players.max
            ));
        }

        if config.players.max < 0 || config.players.online < 0 {
            warnings.push("player counts should not be negative".to_string());
        }

        warnings
    }
}
