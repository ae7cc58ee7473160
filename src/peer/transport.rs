//! Transport seam over the underlying WebRTC peer connection
//!
//! [`PeerSession`](super::PeerSession) drives negotiation through the
//! [`PeerTransport`] trait so the state machine can be exercised without
//! opening real connections. [`RtcTransport`] is the production
//! implementation on top of the webrtc crate.

use super::{CandidateInit, SdpKind, SessionDescription, TransportEvent, TransportEventKind, TransportState};
use crate::config::WebRTCConfig;
use crate::error::MeshError;
use crate::media::{LocalMedia, LocalTrack, RemoteTrack, TrackKind};
use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;

/// Negotiation surface of one peer connection
pub trait PeerTransport: Send + Sync + 'static {
    /// Create an offer and install it as the local description
    fn create_offer(
        &self,
    ) -> impl Future<Output = Result<SessionDescription, MeshError>> + Send;

    /// Create an answer and install it as the local description
    fn create_answer(
        &self,
    ) -> impl Future<Output = Result<SessionDescription, MeshError>> + Send;

    /// Apply the remote side's description
    fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> impl Future<Output = Result<(), MeshError>> + Send;

    /// Apply one remote connectivity candidate
    fn add_remote_candidate(
        &self,
        candidate: CandidateInit,
    ) -> impl Future<Output = Result<(), MeshError>> + Send;

    /// Swap the outgoing video track without renegotiation
    fn replace_video_track(
        &self,
        track: LocalTrack,
    ) -> impl Future<Output = Result<(), MeshError>> + Send;

    /// Tear the connection down
    fn close(&self) -> impl Future<Output = Result<(), MeshError>> + Send;
}

/// Builds one transport per remote participant
pub trait TransportFactory: Send + Sync {
    type Transport: PeerTransport;

    /// Create a transport with the local tracks attached and callbacks wired
    /// to enqueue [`TransportEvent`]s for `peer`
    fn create(
        &self,
        peer: &str,
        media: &LocalMedia,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> impl Future<Output = Result<Self::Transport, MeshError>> + Send;
}

impl From<RTCPeerConnectionState> for TransportState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::New => TransportState::New,
            RTCPeerConnectionState::Connecting => TransportState::Connecting,
            RTCPeerConnectionState::Connected => TransportState::Connected,
            RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
            RTCPeerConnectionState::Failed => TransportState::Failed,
            RTCPeerConnectionState::Closed | RTCPeerConnectionState::Unspecified => {
                TransportState::Closed
            }
        }
    }
}

/// Production transport over a webrtc peer connection
pub struct RtcTransport {
    connection: Arc<RTCPeerConnection>,
    video_sender: Arc<RTCRtpSender>,
}

impl RtcTransport {
    fn description_out(kind: SdpKind, sdp: String) -> SessionDescription {
        SessionDescription { kind, sdp }
    }

    fn description_in(desc: SessionDescription) -> Result<RTCSessionDescription, MeshError> {
        match desc.kind {
            SdpKind::Offer => RTCSessionDescription::offer(desc.sdp),
            SdpKind::Answer => RTCSessionDescription::answer(desc.sdp),
        }
        .map_err(|e| MeshError::NegotiationFailed(format!("Invalid session description: {}", e)))
    }
}

impl PeerTransport for RtcTransport {
    async fn create_offer(&self) -> Result<SessionDescription, MeshError> {
        let offer = self
            .connection
            .create_offer(None)
            .await
            .map_err(|e| MeshError::NegotiationFailed(format!("Failed to create offer: {}", e)))?;
        let sdp = offer.sdp.clone();
        self.connection
            .set_local_description(offer)
            .await
            .map_err(|e| {
                MeshError::NegotiationFailed(format!("Failed to set local offer: {}", e))
            })?;
        Ok(Self::description_out(SdpKind::Offer, sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, MeshError> {
        let answer = self
            .connection
            .create_answer(None)
            .await
            .map_err(|e| MeshError::NegotiationFailed(format!("Failed to create answer: {}", e)))?;
        let sdp = answer.sdp.clone();
        self.connection
            .set_local_description(answer)
            .await
            .map_err(|e| {
                MeshError::NegotiationFailed(format!("Failed to set local answer: {}", e))
            })?;
        Ok(Self::description_out(SdpKind::Answer, sdp))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), MeshError> {
        let remote = Self::description_in(desc)?;
        self.connection
            .set_remote_description(remote)
            .await
            .map_err(|e| {
                MeshError::NegotiationFailed(format!("Failed to set remote description: {}", e))
            })
    }

    async fn add_remote_candidate(&self, candidate: CandidateInit) -> Result<(), MeshError> {
        self.connection
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: None,
            })
            .await
            .map_err(|e| MeshError::NegotiationFailed(format!("Failed to add candidate: {}", e)))
    }

    async fn replace_video_track(&self, track: LocalTrack) -> Result<(), MeshError> {
        let rtp: Arc<dyn TrackLocal + Send + Sync> = track.rtp();
        self.video_sender
            .replace_track(Some(rtp))
            .await
            .map_err(|e| {
                MeshError::NegotiationFailed(format!("Failed to replace video track: {}", e))
            })
    }

    async fn close(&self) -> Result<(), MeshError> {
        self.connection
            .close()
            .await
            .map_err(|e| MeshError::NegotiationFailed(format!("Failed to close connection: {}", e)))
    }
}

/// Factory producing [`RtcTransport`]s from a shared webrtc API object
pub struct RtcTransportFactory {
    api: API,
    ice_servers: Vec<RTCIceServer>,
}

impl RtcTransportFactory {
    pub fn new(config: &WebRTCConfig) -> Result<Self, MeshError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(|e| {
            MeshError::NegotiationFailed(format!("Failed to register codecs: {}", e))
        })?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| {
                MeshError::NegotiationFailed(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = config
            .ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect();

        Ok(Self { api, ice_servers })
    }

    fn wire_callbacks(
        connection: &Arc<RTCPeerConnection>,
        peer: &str,
        events: &mpsc::UnboundedSender<TransportEvent>,
    ) {
        let peer_id = peer.to_string();
        let tx = events.clone();
        connection.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            debug!("Peer {} connection state: {}", peer_id, state);
            let _ = tx.send(TransportEvent {
                peer: peer_id.clone(),
                kind: TransportEventKind::StateChanged(state.into()),
            });
            Box::pin(async {})
        }));

        let peer_id = peer.to_string();
        let tx = events.clone();
        connection.on_ice_candidate(Box::new(move |candidate| {
            if let Some(candidate) = candidate {
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = tx.send(TransportEvent {
                            peer: peer_id.clone(),
                            kind: TransportEventKind::LocalCandidate(CandidateInit {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                            }),
                        });
                    }
                    Err(e) => warn!("Failed to serialize local candidate: {}", e),
                }
            }
            Box::pin(async {})
        }));

        let peer_id = peer.to_string();
        let tx = events.clone();
        connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let kind = match track.kind() {
                RTPCodecType::Audio => TrackKind::Audio,
                _ => TrackKind::Video,
            };
            let _ = tx.send(TransportEvent {
                peer: peer_id.clone(),
                kind: TransportEventKind::RemoteTrack(RemoteTrack {
                    peer: peer_id.clone(),
                    id: track.id(),
                    kind,
                }),
            });
            Box::pin(async {})
        }));
    }
}

impl TransportFactory for RtcTransportFactory {
    type Transport = RtcTransport;

    async fn create(
        &self,
        peer: &str,
        media: &LocalMedia,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<RtcTransport, MeshError> {
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };

        let connection = Arc::new(self.api.new_peer_connection(config).await.map_err(|e| {
            MeshError::NegotiationFailed(format!("Failed to create peer connection: {}", e))
        })?);

        Self::wire_callbacks(&connection, peer, &events);

        let audio: Arc<dyn TrackLocal + Send + Sync> = media.audio.rtp();
        connection.add_track(audio).await.map_err(|e| {
            MeshError::NegotiationFailed(format!("Failed to add audio track: {}", e))
        })?;

        let video: Arc<dyn TrackLocal + Send + Sync> = media.video.rtp();
        let video_sender = connection.add_track(video).await.map_err(|e| {
            MeshError::NegotiationFailed(format!("Failed to add video track: {}", e))
        })?;

        Ok(RtcTransport {
            connection,
            video_sender,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IceServerConfig;

    #[test]
    fn test_factory_builds_with_stun_and_turn_servers() {
        let mut config = WebRTCConfig::default();
        config.ice_servers.push(IceServerConfig {
            urls: vec!["turn:turn.example.com:3478".to_string()],
            username: Some("user".to_string()),
            credential: Some("secret".to_string()),
        });

        let factory = RtcTransportFactory::new(&config).unwrap();
        assert_eq!(factory.ice_servers.len(), 2);
        assert!(factory.ice_servers[0].username.is_empty());
        assert_eq!(factory.ice_servers[1].username, "user");
        assert_eq!(factory.ice_servers[1].credential, "secret");
    }
}

#[cfg(test)]
pub mod fake {
    //! In-memory transport for exercising the session machinery in tests

    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum FakeCall {
        CreateOffer,
        CreateAnswer,
        SetRemote(SdpKind),
        AddCandidate(String),
        ReplaceVideo(String),
        Close,
    }

    #[derive(Clone, Default)]
    pub struct FakeTransport {
        pub calls: Arc<Mutex<Vec<FakeCall>>>,
        pub fail_offer: bool,
        pub fail_answer: bool,
        pub fail_set_remote: bool,
    }

    impl FakeTransport {
        pub fn calls(&self) -> Vec<FakeCall> {
            self.calls.lock().clone()
        }

        pub fn candidate_count(&self) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| matches!(c, FakeCall::AddCandidate(_)))
                .count()
        }
    }

    impl PeerTransport for FakeTransport {
        async fn create_offer(&self) -> Result<SessionDescription, MeshError> {
            self.calls.lock().push(FakeCall::CreateOffer);
            if self.fail_offer {
                return Err(MeshError::NegotiationFailed("offer refused".to_string()));
            }
            Ok(SessionDescription {
                kind: SdpKind::Offer,
                sdp: "v=0 fake-offer".to_string(),
            })
        }

        async fn create_answer(&self) -> Result<SessionDescription, MeshError> {
            self.calls.lock().push(FakeCall::CreateAnswer);
            if self.fail_answer {
                return Err(MeshError::NegotiationFailed("answer refused".to_string()));
            }
            Ok(SessionDescription {
                kind: SdpKind::Answer,
                sdp: "v=0 fake-answer".to_string(),
            })
        }

        async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), MeshError> {
            self.calls.lock().push(FakeCall::SetRemote(desc.kind));
            if self.fail_set_remote {
                return Err(MeshError::NegotiationFailed(
                    "remote description refused".to_string(),
                ));
            }
            Ok(())
        }

        async fn add_remote_candidate(&self, candidate: CandidateInit) -> Result<(), MeshError> {
            self.calls
                .lock()
                .push(FakeCall::AddCandidate(candidate.candidate));
            Ok(())
        }

        async fn replace_video_track(&self, track: LocalTrack) -> Result<(), MeshError> {
            self.calls
                .lock()
                .push(FakeCall::ReplaceVideo(track.id().to_string()));
            Ok(())
        }

        async fn close(&self) -> Result<(), MeshError> {
            self.calls.lock().push(FakeCall::Close);
            Ok(())
        }
    }

    /// Factory handing out clones of pre-seeded fakes, in order
    #[derive(Default)]
    pub struct FakeFactory {
        pub created: Arc<Mutex<Vec<(String, FakeTransport)>>>,
        pub fail_create: bool,
    }

    impl FakeFactory {
        pub fn transport_for(&self, peer: &str) -> Option<FakeTransport> {
            self.created
                .lock()
                .iter()
                .rev()
                .find(|(p, _)| p == peer)
                .map(|(_, t)| t.clone())
        }
    }

    impl TransportFactory for FakeFactory {
        type Transport = FakeTransport;

        async fn create(
            &self,
            peer: &str,
            _media: &LocalMedia,
            _events: mpsc::UnboundedSender<TransportEvent>,
        ) -> Result<FakeTransport, MeshError> {
            if self.fail_create {
                return Err(MeshError::NegotiationFailed(
                    "transport creation refused".to_string(),
                ));
            }
            let transport = FakeTransport::default();
            self.created
                .lock()
                .push((peer.to_string(), transport.clone()));
            Ok(transport)
        }
    }
}
