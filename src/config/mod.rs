//! Configuration management for meshcall-core

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::MeshError;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Signaling bus configuration
    #[serde(default)]
    pub signaling: SignalingConfig,

    /// WebRTC transport configuration
    #[serde(default)]
    pub webrtc: WebRTCConfig,

    /// Local media configuration
    #[serde(default)]
    pub media: MediaConfig,

    /// Chat relay configuration
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// WebSocket URL of the signaling server
    #[serde(default = "default_signaling_url")]
    pub url: String,

    /// Local participant identity; generated when empty
    #[serde(default)]
    pub identity: String,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: default_signaling_url(),
            identity: String::new(),
        }
    }
}

/// ICE server entry (STUN or TURN)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    /// Server URLs (stun:/turn:/turns: schemes)
    pub urls: Vec<String>,

    /// TURN username
    pub username: Option<String>,

    /// TURN credential
    pub credential: Option<String>,
}

impl Default for IceServerConfig {
    fn default() -> Self {
        Self {
            urls: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            username: None,
            credential: None,
        }
    }
}

/// WebRTC transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebRTCConfig {
    /// ICE servers passed to each peer connection
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServerConfig>,

    /// Cap on buffered remote candidates per session; overflow closes
    /// the session as a negotiation failure
    #[serde(default = "default_max_pending_candidates")]
    pub max_pending_candidates: usize,
}

impl Default for WebRTCConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            max_pending_candidates: default_max_pending_candidates(),
        }
    }
}

/// Local media configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Start with the microphone enabled
    #[serde(default = "default_true")]
    pub audio_enabled: bool,

    /// Start with the camera enabled
    #[serde(default = "default_true")]
    pub video_enabled: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            audio_enabled: true,
            video_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Maximum retained chat log entries
    #[serde(default = "default_chat_history")]
    pub history_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: default_chat_history(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file; a missing file means defaults
    pub fn load(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.signaling.url.is_empty() {
            return Err(MeshError::InvalidConfig(
                "Signaling URL must not be empty".to_string(),
            ));
        }
        if !self.signaling.url.starts_with("ws://") && !self.signaling.url.starts_with("wss://") {
            return Err(MeshError::InvalidConfig(
                "Signaling URL must use ws:// or wss://".to_string(),
            ));
        }

        if self.webrtc.max_pending_candidates == 0 {
            return Err(MeshError::InvalidConfig(
                "max_pending_candidates must be non-zero".to_string(),
            ));
        }

        for server in &self.webrtc.ice_servers {
            if server.urls.is_empty() {
                return Err(MeshError::InvalidConfig(
                    "ICE server entry has no URLs".to_string(),
                ));
            }
            for url in &server.urls {
                let is_turn = url.starts_with("turn:") || url.starts_with("turns:");
                if !url.starts_with("stun:") && !is_turn {
                    return Err(MeshError::InvalidConfig(format!(
                        "ICE server URL must be stun:/turn:/turns: ({})",
                        url
                    )));
                }
                if is_turn && (server.username.is_none() || server.credential.is_none()) {
                    return Err(MeshError::InvalidConfig(format!(
                        "TURN server requires username and credential ({})",
                        url
                    )));
                }
            }
        }

        Ok(())
    }
}

fn default_signaling_url() -> String {
    "ws://127.0.0.1:9000/signal".to_string()
}

fn default_ice_servers() -> Vec<IceServerConfig> {
    vec![IceServerConfig::default()]
}

fn default_max_pending_candidates() -> usize {
    64
}

fn default_chat_history() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.webrtc.max_pending_candidates, 64);
    }

    #[test]
    fn test_rejects_plain_http_signaling_url() {
        let mut config = Config::default();
        config.signaling.url = "http://example.com/signal".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_turn_requires_credentials() {
        let mut config = Config::default();
        config.webrtc.ice_servers.push(IceServerConfig {
            urls: vec!["turn:turn.example.com:3478".to_string()],
            username: None,
            credential: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parses_partial_toml() {
        let toml_str = r#"
            [signaling]
            url = "wss://meet.example.com/signal"

            [webrtc]
            max_pending_candidates = 16
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.signaling.url, "wss://meet.example.com/signal");
        assert_eq!(config.webrtc.max_pending_candidates, 16);
        assert!(config.media.audio_enabled);
    }
}
