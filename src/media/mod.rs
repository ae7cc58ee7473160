//! Local and remote media track types
//!
//! The orchestrator never captures media itself; a [`MediaSource`]
//! implementation supplies local tracks (camera/mic, screen) and the
//! rendering layer consumes [`RemoteTrack`] handles. The production
//! implementation lives in [`rtp_source`].

pub mod rtp_source;

pub use rtp_source::{RtpMediaSource, TrackFeed};

use crate::error::MeshError;
use std::sync::Arc;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Where a local track's frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Microphone,
    Camera,
    Screen,
}

impl TrackSource {
    pub fn kind(&self) -> TrackKind {
        match self {
            TrackSource::Microphone => TrackKind::Audio,
            TrackSource::Camera | TrackSource::Screen => TrackKind::Video,
        }
    }
}

/// A local outgoing track attached to peer sessions
#[derive(Clone)]
pub struct LocalTrack {
    source: TrackSource,
    rtp: Arc<TrackLocalStaticRTP>,
}

impl LocalTrack {
    pub fn new(source: TrackSource, rtp: Arc<TrackLocalStaticRTP>) -> Self {
        Self { source, rtp }
    }

    pub fn kind(&self) -> TrackKind {
        self.source.kind()
    }

    pub fn source(&self) -> TrackSource {
        self.source
    }

    pub fn id(&self) -> &str {
        use webrtc::track::track_local::TrackLocal;
        self.rtp.id()
    }

    /// Underlying RTP track handed to the peer transport
    pub fn rtp(&self) -> Arc<TrackLocalStaticRTP> {
        self.rtp.clone()
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("source", &self.source)
            .field("id", &self.id())
            .finish()
    }
}

/// The camera+mic pair produced by a successful acquisition
#[derive(Debug, Clone)]
pub struct LocalMedia {
    pub audio: LocalTrack,
    pub video: LocalTrack,
}

/// Handle to a remote participant's track, forwarded to the rendering layer
#[derive(Debug, Clone)]
pub struct RemoteTrack {
    /// Remote participant the track belongs to
    pub peer: String,
    /// Track identifier as announced by the remote
    pub id: String,
    pub kind: TrackKind,
}

/// Out-of-band reports from the media source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    /// The screen feed stopped on its own (user ended capture); the
    /// coordinator reverts every session back to the camera track
    ScreenEnded,
}

/// Supplies local media tracks on demand
///
/// Acquisition is fallible: denial or missing devices abort the join/create
/// attempt without touching registry state.
pub trait MediaSource: Send + Sync {
    /// Acquire the camera and microphone pair
    fn acquire_camera_and_mic(
        &self,
    ) -> impl std::future::Future<Output = Result<LocalMedia, MeshError>> + Send;

    /// Acquire a screen capture track
    fn acquire_screen(
        &self,
    ) -> impl std::future::Future<Output = Result<LocalTrack, MeshError>> + Send;

    /// Toggle the microphone feed without renegotiation
    fn set_audio_enabled(&self, enabled: bool);

    /// Toggle the camera feed without renegotiation
    fn set_video_enabled(&self, enabled: bool);

    /// Stop screen capture initiated from our side; no [`MediaEvent`] is
    /// reported for this path
    fn release_screen(&self);

    /// Release all capture devices (room exit)
    fn release(&self);
}
