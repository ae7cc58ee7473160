//! Room coordinator
//!
//! Sequences room lifecycle against the peer registry: one session per
//! remote, caller/callee decided by who discovered whom, glare between
//! simultaneous offers broken by identity order. All handlers run on the
//! coordinator's event loop, so a completed registry lookup is always
//! current; work that raced a removal fails the lookup and is dropped.

use super::{RoomChannels, RoomCommand, RoomNotification};
use crate::chat::ChatRelay;
use crate::config::Config;
use crate::error::MeshError;
use crate::media::{LocalMedia, LocalTrack, MediaEvent, MediaSource};
use crate::peer::transport::TransportFactory;
use crate::peer::{
    PeerRegistry, PeerRole, PeerSession, PeerState, SessionDescription, TransportEvent,
    TransportEventKind,
};
use crate::signaling::SignalMessage;
use log::{debug, info, warn};
use tokio::sync::mpsc;

pub struct RoomCoordinator<F: TransportFactory, M: MediaSource> {
    local_id: String,
    factory: F,
    media_source: M,
    max_pending_candidates: usize,
    registry: PeerRegistry<F::Transport>,
    room_id: Option<String>,
    joining: bool,
    local_media: Option<LocalMedia>,
    screen_track: Option<LocalTrack>,
    chat: ChatRelay,
    signal_tx: mpsc::UnboundedSender<SignalMessage>,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    notifications: mpsc::UnboundedSender<RoomNotification>,
}

impl<F: TransportFactory, M: MediaSource> RoomCoordinator<F, M> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_id: String,
        config: &Config,
        factory: F,
        media_source: M,
        signal_tx: mpsc::UnboundedSender<SignalMessage>,
        transport_tx: mpsc::UnboundedSender<TransportEvent>,
        notifications: mpsc::UnboundedSender<RoomNotification>,
    ) -> Self {
        Self {
            chat: ChatRelay::new(local_id.clone(), config.chat.history_limit),
            local_id,
            factory,
            media_source,
            max_pending_candidates: config.webrtc.max_pending_candidates,
            registry: PeerRegistry::new(),
            room_id: None,
            joining: false,
            local_media: None,
            screen_track: None,
            signal_tx,
            transport_tx,
            notifications,
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn peer_count(&self) -> usize {
        self.registry.len()
    }

    pub fn peer_state(&self, peer: &str) -> Option<PeerState> {
        self.registry.get(peer).map(|s| s.state())
    }

    /// Drain all input channels until shutdown
    ///
    /// Each event is handled to completion before the next is taken, so
    /// handlers never observe half-updated sessions.
    pub async fn run(&mut self, mut channels: RoomChannels) {
        loop {
            tokio::select! {
                Some(msg) = channels.signals.recv() => self.handle_signal(msg).await,
                Some(cmd) = channels.commands.recv() => {
                    if self.handle_command(cmd).await {
                        break;
                    }
                }
                Some(event) = channels.transports.recv() => self.handle_transport_event(event).await,
                Some(event) = channels.media.recv() => self.handle_media_event(event).await,
                else => break,
            }
        }
        self.leave_room().await;
        info!("Room coordinator stopped");
    }

    /// Returns true when the loop should stop
    pub async fn handle_command(&mut self, command: RoomCommand) -> bool {
        let result = match command {
            RoomCommand::CreateRoom => self.create_room().await.map(|_| ()),
            RoomCommand::JoinRoom(room_id) => self.join_room(&room_id).await,
            RoomCommand::LeaveRoom => {
                self.leave_room().await;
                Ok(())
            }
            RoomCommand::SetAudioEnabled(enabled) => {
                self.media_source.set_audio_enabled(enabled);
                Ok(())
            }
            RoomCommand::SetVideoEnabled(enabled) => {
                self.media_source.set_video_enabled(enabled);
                Ok(())
            }
            RoomCommand::StartScreenShare => match self.start_screen_share().await {
                // Backing out of the capture picker is not a failure
                Err(MeshError::ScreenCaptureCancelled) => {
                    debug!("Screen share cancelled by the user");
                    Ok(())
                }
                other => other,
            },
            RoomCommand::StopScreenShare => {
                self.stop_screen_share().await;
                Ok(())
            }
            RoomCommand::SendChat(text) => self.send_chat(&text),
            RoomCommand::Shutdown => return true,
        };
        if let Err(e) = result {
            warn!("Command failed: {}", e);
            self.notify(RoomNotification::CommandFailed {
                message: e.to_string(),
            });
        }
        false
    }

    /// Generate a room, announce it and start listening for members
    pub async fn create_room(&mut self) -> Result<String, MeshError> {
        if self.room_id.is_some() {
            return Err(MeshError::Signaling("Already in a room".to_string()));
        }
        let media = self.media_source.acquire_camera_and_mic().await?;
        self.local_media = Some(media);

        let room_id = format!("room-{}", uuid::Uuid::new_v4());
        self.send_signal(SignalMessage::CreateRoom {
            room_id: room_id.clone(),
            user_id: self.local_id.clone(),
        });
        self.room_id = Some(room_id.clone());
        self.joining = false;
        info!("Created room {}", room_id);
        self.notify(RoomNotification::RoomReady {
            room_id: room_id.clone(),
        });
        Ok(room_id)
    }

    /// Announce intent to join; the bus answers with an error or with one
    /// joined event per existing member
    pub async fn join_room(&mut self, room_id: &str) -> Result<(), MeshError> {
        if self.room_id.is_some() {
            return Err(MeshError::Signaling("Already in a room".to_string()));
        }
        let media = self.media_source.acquire_camera_and_mic().await?;
        self.local_media = Some(media);

        self.send_signal(SignalMessage::JoinRoom {
            room_id: room_id.to_string(),
            user_id: self.local_id.clone(),
        });
        self.room_id = Some(room_id.to_string());
        self.joining = true;
        info!("Joining room {}", room_id);
        self.notify(RoomNotification::RoomReady {
            room_id: room_id.to_string(),
        });
        Ok(())
    }

    /// Close every session, release media and announce departure; no-op
    /// outside a room
    pub async fn leave_room(&mut self) {
        let Some(room_id) = self.room_id.take() else {
            return;
        };
        self.joining = false;
        self.send_signal(SignalMessage::LeaveRoom {
            room_id: room_id.clone(),
            user_id: self.local_id.clone(),
        });
        for mut session in self.registry.drain() {
            session.close().await;
        }
        self.screen_track = None;
        self.local_media = None;
        self.media_source.release();
        self.chat.clear();
        info!("Left room {}", room_id);
    }

    pub async fn handle_signal(&mut self, message: SignalMessage) {
        match message {
            SignalMessage::RoomError { message } => self.handle_room_error(message).await,
            SignalMessage::UserJoined { user_id } => self.handle_user_joined(user_id).await,
            SignalMessage::UserLeft { user_id } => self.handle_user_left(&user_id).await,
            SignalMessage::Offer { sender, offer, .. } => match sender {
                Some(sender) => self.handle_offer(sender, offer).await,
                None => warn!("Dropping offer without a sender"),
            },
            SignalMessage::Answer { sender, answer, .. } => match sender {
                Some(sender) => self.handle_answer(&sender, answer).await,
                None => warn!("Dropping answer without a sender"),
            },
            SignalMessage::IceCandidate {
                sender, candidate, ..
            } => match sender {
                Some(sender) => self.handle_candidate(&sender, candidate).await,
                None => warn!("Dropping candidate without a sender"),
            },
            SignalMessage::ChatMessage {
                room_id,
                user_id,
                message,
            } => {
                if let Some(entry) = self.chat.record_inbound(&room_id, &user_id, &message) {
                    self.notify(RoomNotification::Chat(entry));
                }
            }
            SignalMessage::CreateRoom { .. }
            | SignalMessage::JoinRoom { .. }
            | SignalMessage::LeaveRoom { .. } => {
                warn!("Dropping outbound-only message echoed by the bus");
            }
        }
    }

    async fn handle_room_error(&mut self, message: String) {
        let error = if self.joining {
            // Revert to the pre-join state
            self.joining = false;
            self.room_id = None;
            for mut session in self.registry.drain() {
                session.close().await;
            }
            self.screen_track = None;
            self.local_media = None;
            self.media_source.release();
            self.chat.clear();
            MeshError::RoomNotFound(message)
        } else {
            MeshError::Signaling(message)
        };
        warn!("Room error from bus: {}", error);
        self.notify(RoomNotification::RoomError {
            message: error.to_string(),
        });
    }

    async fn handle_user_joined(&mut self, user_id: String) {
        if user_id == self.local_id {
            return;
        }
        if self.room_id.is_none() {
            debug!("Ignoring join notification outside a room");
            return;
        }
        self.joining = false;
        if self.registry.contains(&user_id) {
            debug!("Already have a session for peer {}", user_id);
            return;
        }
        if let Err(e) = self.open_caller_session(&user_id).await {
            warn!("Failed to open session to peer {}: {}", user_id, e);
            self.close_peer(&user_id, true).await;
        }
    }

    async fn handle_user_left(&mut self, user_id: &str) {
        if self.registry.contains(user_id) {
            info!("Peer {} left the room", user_id);
            self.close_peer(user_id, true).await;
        }
    }

    async fn open_caller_session(&mut self, peer: &str) -> Result<(), MeshError> {
        let media = self.require_media()?;
        let transport = self
            .factory
            .create(peer, media, self.transport_tx.clone())
            .await?;
        // Register before any await so candidates arriving mid-offer buffer
        // against this session instead of being dropped
        self.register_session(PeerSession::new(
            peer.to_string(),
            PeerRole::Caller,
            transport,
            self.max_pending_candidates,
        ))
        .await;
        let Some(session) = self.registry.get_mut(peer) else {
            return Err(MeshError::StaleReference(format!(
                "Session for {} vanished during setup",
                peer
            )));
        };
        let offer = session.start_offer().await?;
        self.send_signal(SignalMessage::offer_to(peer, offer));
        Ok(())
    }

    async fn handle_offer(&mut self, sender: String, offer: SessionDescription) {
        if self.room_id.is_none() {
            warn!("Dropping offer received outside a room");
            return;
        }
        if let Some(session) = self.registry.get(&sender) {
            match (session.role(), session.state()) {
                (PeerRole::Caller, PeerState::New | PeerState::Negotiating)
                    if !session.has_remote_description() =>
                {
                    // Glare: both sides produced an offer. The identity that
                    // sorts lower keeps the caller role; the other side drops
                    // its own attempt and answers instead.
                    if self.local_id < sender {
                        debug!("Glare with peer {}: keeping caller role", sender);
                        return;
                    }
                    info!("Glare with peer {}: yielding to their offer", sender);
                    self.close_peer(&sender, false).await;
                }
                _ => {
                    debug!("Dropping duplicate offer from peer {}", sender);
                    return;
                }
            }
        }
        if let Err(e) = self.answer_offer(&sender, offer).await {
            warn!("Failed to answer offer from peer {}: {}", sender, e);
            self.close_peer(&sender, true).await;
        }
    }

    async fn answer_offer(
        &mut self,
        peer: &str,
        offer: SessionDescription,
    ) -> Result<(), MeshError> {
        let media = self.require_media()?;
        let transport = self
            .factory
            .create(peer, media, self.transport_tx.clone())
            .await?;
        self.register_session(PeerSession::new(
            peer.to_string(),
            PeerRole::Callee,
            transport,
            self.max_pending_candidates,
        ))
        .await;
        let Some(session) = self.registry.get_mut(peer) else {
            return Err(MeshError::StaleReference(format!(
                "Session for {} vanished during setup",
                peer
            )));
        };
        let answer = session.accept_offer(offer).await?;
        self.send_signal(SignalMessage::answer_to(peer, answer));
        Ok(())
    }

    async fn handle_answer(&mut self, sender: &str, answer: SessionDescription) {
        let Some(session) = self.registry.get_mut(sender) else {
            debug!("Discarding answer from unknown or departed peer {}", sender);
            return;
        };
        match session.apply_answer(answer).await {
            Ok(()) => {}
            Err(MeshError::StaleReference(msg)) => debug!("Discarding stale answer: {}", msg),
            Err(e) => {
                warn!("Failed to apply answer from peer {}: {}", sender, e);
                self.close_peer(sender, true).await;
            }
        }
    }

    async fn handle_candidate(&mut self, sender: &str, candidate: crate::peer::CandidateInit) {
        let Some(session) = self.registry.get_mut(sender) else {
            warn!("Dropping candidate for unknown peer {}", sender);
            return;
        };
        match session.add_candidate(candidate).await {
            Ok(()) => {}
            Err(MeshError::StaleReference(msg)) => debug!("Discarding stale candidate: {}", msg),
            Err(e) => {
                warn!("Candidate handling failed for peer {}: {}", sender, e);
                self.close_peer(sender, true).await;
            }
        }
    }

    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event.kind {
            TransportEventKind::LocalCandidate(candidate) => {
                if self.registry.contains(&event.peer) {
                    self.send_signal(SignalMessage::candidate_to(&event.peer, candidate));
                } else {
                    debug!("Dropping local candidate for departed peer {}", event.peer);
                }
            }
            TransportEventKind::StateChanged(state) => {
                let Some(session) = self.registry.get_mut(&event.peer) else {
                    debug!("Dropping state report for departed peer {}", event.peer);
                    return;
                };
                let before = session.state();
                match session.on_transport_state(state) {
                    PeerState::Connected if before != PeerState::Connected => {
                        self.notify(RoomNotification::PeerConnected { peer: event.peer });
                    }
                    PeerState::Closed => {
                        self.close_peer(&event.peer, true).await;
                    }
                    _ => {}
                }
            }
            TransportEventKind::RemoteTrack(track) => {
                if self.registry.contains(&event.peer) {
                    self.notify(RoomNotification::PeerMedia(track));
                } else {
                    debug!("Dropping track from departed peer {}", event.peer);
                }
            }
        }
    }

    pub async fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::ScreenEnded => self.revert_to_camera(false).await,
        }
    }

    /// Start sending the screen instead of the camera to every live session
    pub async fn start_screen_share(&mut self) -> Result<(), MeshError> {
        if self.room_id.is_none() {
            return Err(MeshError::Signaling("Not in a room".to_string()));
        }
        if self.screen_track.is_some() {
            debug!("Screen share already active");
            return Ok(());
        }
        let track = self.media_source.acquire_screen().await?;
        self.replace_outgoing_video(track.clone()).await;
        self.screen_track = Some(track);
        self.notify(RoomNotification::ScreenShareChanged { active: true });
        Ok(())
    }

    /// Stop the screen share started from our side; no-op when not sharing
    pub async fn stop_screen_share(&mut self) {
        self.revert_to_camera(true).await;
    }

    async fn revert_to_camera(&mut self, release_capture: bool) {
        if self.screen_track.take().is_none() {
            return;
        }
        if release_capture {
            self.media_source.release_screen();
        }
        let camera = self.local_media.as_ref().map(|m| m.video.clone());
        if let Some(camera) = camera {
            self.replace_outgoing_video(camera).await;
        }
        self.notify(RoomNotification::ScreenShareChanged { active: false });
    }

    /// Swap the outgoing video track on every live session
    ///
    /// A swap failing on one session is reported and tolerated; the others
    /// still switch.
    async fn replace_outgoing_video(&mut self, track: LocalTrack) {
        for peer in self.registry.peer_ids() {
            let Some(session) = self.registry.get_mut(&peer) else {
                continue;
            };
            if session.is_closed() {
                continue;
            }
            if let Err(e) = session.replace_video(track.clone()).await {
                warn!("Video swap failed for peer {}: {}", peer, e);
            }
        }
    }

    pub fn send_chat(&mut self, text: &str) -> Result<(), MeshError> {
        let Some(room_id) = self.room_id.clone() else {
            return Err(MeshError::Signaling("Not in a room".to_string()));
        };
        let (message, entry) = self.chat.compose(&room_id, text);
        self.send_signal(message);
        self.notify(RoomNotification::Chat(entry));
        Ok(())
    }

    fn require_media(&self) -> Result<&LocalMedia, MeshError> {
        self.local_media
            .as_ref()
            .ok_or_else(|| MeshError::NegotiationFailed("Local media not acquired".to_string()))
    }

    /// Insert a session, tearing down any session it displaces
    ///
    /// Callers remove an existing session before re-registering the same
    /// remote, so displacement indicates a bug upstream; the displaced
    /// transport is still closed rather than leaked.
    async fn register_session(&mut self, session: PeerSession<F::Transport>) {
        if let Some(mut displaced) = self.registry.insert(session) {
            warn!(
                "Closing displaced session for peer {}",
                displaced.remote_id()
            );
            displaced.close().await;
        }
    }

    async fn close_peer(&mut self, peer: &str, announce: bool) {
        if let Some(mut session) = self.registry.remove(peer) {
            session.close().await;
            if announce {
                self.notify(RoomNotification::PeerClosed {
                    peer: peer.to_string(),
                });
            }
        }
    }

    fn send_signal(&self, message: SignalMessage) {
        if self.signal_tx.send(message).is_err() {
            warn!("Signaling channel closed; message dropped");
        }
    }

    fn notify(&self, notification: RoomNotification) {
        if self.notifications.send(notification).is_err() {
            debug!("No notification listener attached");
        }
    }
}
