//! Command-line argument parsing

use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "meshcall-core",
    about = "Mesh video call orchestrator over WebSocket signaling",
    version
)]
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Signaling bus URL (overrides config)
    #[arg(long)]
    pub url: Option<String>,

    /// Local participant identity (overrides config; generated when unset)
    #[arg(long)]
    pub identity: Option<String>,

    /// Create a new room on startup
    #[arg(long, conflicts_with = "join")]
    pub create: bool,

    /// Join this room on startup
    #[arg(long)]
    pub join: Option<String>,

    /// Start with the microphone muted
    #[arg(long)]
    pub muted: bool,

    /// Start with the camera off
    #[arg(long)]
    pub no_video: bool,
}

impl Args {
    /// Fold command-line overrides into the loaded configuration
    pub fn apply_to_config(&self, config: &mut Config) {
        if let Some(url) = &self.url {
            config.signaling.url = url.clone();
        }
        if let Some(identity) = &self.identity {
            config.signaling.identity = identity.clone();
        }
        if self.muted {
            config.media.audio_enabled = false;
        }
        if self.no_video {
            config.media.video_enabled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let args = Args::parse_from([
            "meshcall-core",
            "--url",
            "wss://meet.example.com/signal",
            "--identity",
            "alice",
            "--muted",
        ]);
        let mut config = Config::default();
        args.apply_to_config(&mut config);

        assert_eq!(config.signaling.url, "wss://meet.example.com/signal");
        assert_eq!(config.signaling.identity, "alice");
        assert!(!config.media.audio_enabled);
        assert!(config.media.video_enabled);
    }

    #[test]
    fn test_defaults_leave_config_untouched() {
        let args = Args::parse_from(["meshcall-core"]);
        let mut config = Config::default();
        args.apply_to_config(&mut config);
        assert_eq!(config.signaling.url, Config::default().signaling.url);
    }
}
