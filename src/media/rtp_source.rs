//! RTP-backed media source
//!
//! Production [`MediaSource`] implementation: local tracks are
//! `TrackLocalStaticRTP` instances fed by an external capture pipeline
//! through [`TrackFeed`] handles. The feed packetizes raw encoded frames
//! (Opus for audio, H264 for video) into RTP; a disabled feed silently
//! drops frames, which is how mute/camera-off works without renegotiation.

use super::{LocalMedia, LocalTrack, MediaEvent, MediaSource, TrackSource};
use crate::error::MeshError;
use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::api::media_engine::{MIME_TYPE_H264, MIME_TYPE_OPUS};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocalWriter;

const AUDIO_PAYLOAD_TYPE: u8 = 111;
// Opus uses a 48kHz clock; 20ms frames = 960 samples
const AUDIO_SAMPLES_PER_FRAME: u32 = 960;
const VIDEO_PAYLOAD_TYPE: u8 = 96;
// 90kHz video clock at 30fps
const VIDEO_TICKS_PER_FRAME: u32 = 3000;

/// Writer handle the capture pipeline pushes encoded frames into
#[derive(Clone)]
pub struct TrackFeed {
    track: Arc<TrackLocalStaticRTP>,
    enabled: Arc<AtomicBool>,
    payload_type: u8,
    ticks_per_frame: u32,
    ssrc: u32,
    clock: Arc<Mutex<RtpClock>>,
}

struct RtpClock {
    sequence: u16,
    timestamp: u32,
}

impl TrackFeed {
    fn new(track: Arc<TrackLocalStaticRTP>, enabled: Arc<AtomicBool>, payload_type: u8, ticks_per_frame: u32) -> Self {
        use webrtc::track::track_local::TrackLocal;
        // Derive a stable SSRC from the track id
        let ssrc = {
            let mut h: u32 = 0x811c9dc5;
            for &b in track.id().as_bytes() {
                h = h.wrapping_mul(0x01000193) ^ b as u32;
            }
            h
        };
        Self {
            track,
            enabled,
            payload_type,
            ticks_per_frame,
            ssrc,
            clock: Arc::new(Mutex::new(RtpClock { sequence: 0, timestamp: 0 })),
        }
    }

    /// Packetize one encoded frame and write it to the track
    ///
    /// Frames written while the feed is disabled are dropped; the RTP clock
    /// still advances so the receiver observes a plausible timeline when the
    /// feed resumes.
    pub async fn write_frame(&self, payload: Bytes) -> Result<(), MeshError> {
        let (sequence_number, timestamp) = {
            let mut clock = self.clock.lock();
            let snapshot = (clock.sequence, clock.timestamp);
            clock.sequence = clock.sequence.wrapping_add(1);
            clock.timestamp = clock.timestamp.wrapping_add(self.ticks_per_frame);
            snapshot
        };

        if !self.enabled.load(Ordering::Relaxed) {
            return Ok(());
        }

        let packet = webrtc::rtp::packet::Packet {
            header: webrtc::rtp::header::Header {
                version: 2,
                marker: true,
                payload_type: self.payload_type,
                sequence_number,
                timestamp,
                ssrc: self.ssrc,
                ..Default::default()
            },
            payload,
        };

        self.track
            .write_rtp(&packet)
            .await
            .map(|_| ())
            .map_err(|e| MeshError::MediaDeviceUnavailable(format!("RTP write failed: {}", e)))
    }
}

/// Production media source backed by external capture pipelines
pub struct RtpMediaSource {
    audio_enabled: Arc<AtomicBool>,
    video_enabled: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<MediaEvent>,
    feeds: Mutex<Feeds>,
}

#[derive(Default)]
struct Feeds {
    mic: Option<TrackFeed>,
    camera: Option<TrackFeed>,
    screen: Option<TrackFeed>,
}

impl RtpMediaSource {
    pub fn new(
        audio_enabled: bool,
        video_enabled: bool,
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Self {
        Self {
            audio_enabled: Arc::new(AtomicBool::new(audio_enabled)),
            video_enabled: Arc::new(AtomicBool::new(video_enabled)),
            events,
            feeds: Mutex::new(Feeds::default()),
        }
    }

    /// Feed for the microphone track, once acquired
    pub fn mic_feed(&self) -> Option<TrackFeed> {
        self.feeds.lock().mic.clone()
    }

    /// Feed for the camera track, once acquired
    pub fn camera_feed(&self) -> Option<TrackFeed> {
        self.feeds.lock().camera.clone()
    }

    /// Feed for the screen track, once acquired
    pub fn screen_feed(&self) -> Option<TrackFeed> {
        self.feeds.lock().screen.clone()
    }

    /// Called by the capture pipeline when screen capture stops on its own
    pub fn end_screen(&self) {
        let had_screen = self.feeds.lock().screen.take().is_some();
        if had_screen {
            info!("Screen feed ended");
            if self.events.send(MediaEvent::ScreenEnded).is_err() {
                debug!("No coordinator listening for screen end");
            }
        }
    }

    fn audio_track() -> Arc<TrackLocalStaticRTP> {
        Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_string(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
                rtcp_feedback: vec![],
            },
            format!("audio-{}", uuid::Uuid::new_v4()),
            "meshcall-local".to_string(),
        ))
    }

    fn video_track(label: &str) -> Arc<TrackLocalStaticRTP> {
        Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_string(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f".to_string(),
                rtcp_feedback: vec![],
            },
            format!("{}-{}", label, uuid::Uuid::new_v4()),
            "meshcall-local".to_string(),
        ))
    }
}

impl MediaSource for RtpMediaSource {
    async fn acquire_camera_and_mic(&self) -> Result<LocalMedia, MeshError> {
        let audio_rtp = Self::audio_track();
        let video_rtp = Self::video_track("camera");

        let mut feeds = self.feeds.lock();
        feeds.mic = Some(TrackFeed::new(
            audio_rtp.clone(),
            self.audio_enabled.clone(),
            AUDIO_PAYLOAD_TYPE,
            AUDIO_SAMPLES_PER_FRAME,
        ));
        feeds.camera = Some(TrackFeed::new(
            video_rtp.clone(),
            self.video_enabled.clone(),
            VIDEO_PAYLOAD_TYPE,
            VIDEO_TICKS_PER_FRAME,
        ));
        info!("Acquired camera and microphone tracks");

        Ok(LocalMedia {
            audio: LocalTrack::new(TrackSource::Microphone, audio_rtp),
            video: LocalTrack::new(TrackSource::Camera, video_rtp),
        })
    }

    async fn acquire_screen(&self) -> Result<LocalTrack, MeshError> {
        let rtp = Self::video_track("screen");
        // Screen share is always sent while active; the camera enabled flag
        // does not apply to it
        let feed = TrackFeed::new(
            rtp.clone(),
            Arc::new(AtomicBool::new(true)),
            VIDEO_PAYLOAD_TYPE,
            VIDEO_TICKS_PER_FRAME,
        );
        self.feeds.lock().screen = Some(feed);
        info!("Acquired screen capture track");
        Ok(LocalTrack::new(TrackSource::Screen, rtp))
    }

    fn set_audio_enabled(&self, enabled: bool) {
        self.audio_enabled.store(enabled, Ordering::Relaxed);
        debug!("Microphone feed enabled: {}", enabled);
    }

    fn set_video_enabled(&self, enabled: bool) {
        self.video_enabled.store(enabled, Ordering::Relaxed);
        debug!("Camera feed enabled: {}", enabled);
    }

    fn release_screen(&self) {
        if self.feeds.lock().screen.take().is_some() {
            info!("Stopped screen feed");
        }
    }

    fn release(&self) {
        let mut feeds = self.feeds.lock();
        if feeds.mic.is_some() || feeds.camera.is_some() || feeds.screen.is_some() {
            info!("Releasing local media tracks");
        } else {
            warn!("Release called with no acquired media");
        }
        *feeds = Feeds::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::TrackKind;

    fn source() -> (RtpMediaSource, mpsc::UnboundedReceiver<MediaEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RtpMediaSource::new(true, true, tx), rx)
    }

    #[tokio::test]
    async fn test_acquire_produces_one_audio_one_video() {
        let (source, _rx) = source();
        let media = source.acquire_camera_and_mic().await.unwrap();
        assert_eq!(media.audio.kind(), TrackKind::Audio);
        assert_eq!(media.video.kind(), TrackKind::Video);
        assert_eq!(media.video.source(), TrackSource::Camera);
        assert!(source.mic_feed().is_some());
        assert!(source.camera_feed().is_some());
        assert!(source.screen_feed().is_none());
    }

    #[tokio::test]
    async fn test_disabled_feed_drops_frames() {
        let (source, _rx) = source();
        source.acquire_camera_and_mic().await.unwrap();
        source.set_video_enabled(false);
        let feed = source.camera_feed().unwrap();
        // No subscribers on the track, but a disabled feed must not even try
        // to write, so this succeeds regardless
        feed.write_frame(Bytes::from_static(b"frame")).await.unwrap();
    }

    #[tokio::test]
    async fn test_end_screen_reports_event() {
        let (source, mut rx) = source();
        source.acquire_screen().await.unwrap();
        source.end_screen();
        assert_eq!(rx.recv().await, Some(MediaEvent::ScreenEnded));
        assert!(source.screen_feed().is_none());
        // Ending twice reports nothing further
        source.end_screen();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_release_clears_feeds() {
        let (source, _rx) = source();
        source.acquire_camera_and_mic().await.unwrap();
        source.release();
        assert!(source.mic_feed().is_none());
        assert!(source.camera_feed().is_none());
    }
}
