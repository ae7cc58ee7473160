//! Per-remote negotiation state machine
//!
//! One [`PeerSession`] exists per remote participant. The session owns its
//! transport, tracks the offer/answer progress, and buffers remote
//! candidates that arrive before the remote description is applied.
//! `Closed` is terminal: a remote that reconnects gets a fresh session.

use super::transport::PeerTransport;
use super::{CandidateInit, PeerRole, PeerState, SessionDescription, TransportState};
use crate::error::MeshError;
use crate::media::LocalTrack;
use log::{debug, info, warn};

pub struct PeerSession<T: PeerTransport> {
    remote_id: String,
    role: PeerRole,
    state: PeerState,
    transport: T,
    remote_description_set: bool,
    pending_candidates: Vec<CandidateInit>,
    max_pending_candidates: usize,
}

impl<T: PeerTransport> PeerSession<T> {
    pub fn new(remote_id: String, role: PeerRole, transport: T, max_pending_candidates: usize) -> Self {
        debug!("Created {:?} session for peer {}", role, remote_id);
        Self {
            remote_id,
            role,
            state: PeerState::New,
            transport,
            remote_description_set: false,
            pending_candidates: Vec::new(),
            max_pending_candidates,
        }
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == PeerState::Closed
    }

    /// Whether the remote description has been applied; once true, an
    /// inbound offer from this remote can only be a stale duplicate
    pub fn has_remote_description(&self) -> bool {
        self.remote_description_set
    }

    /// Produce the opening offer (caller side)
    pub async fn start_offer(&mut self) -> Result<SessionDescription, MeshError> {
        if self.role != PeerRole::Caller {
            return Err(MeshError::NegotiationFailed(format!(
                "Session for {} is not the caller",
                self.remote_id
            )));
        }
        if self.state != PeerState::New {
            return Err(MeshError::StaleReference(format!(
                "Session for {} already negotiating",
                self.remote_id
            )));
        }

        let offer = self.transport.create_offer().await?;
        self.state = PeerState::Negotiating;
        info!("Sent offer to peer {}", self.remote_id);
        Ok(offer)
    }

    /// Apply an inbound offer and produce the answer (callee side)
    pub async fn accept_offer(
        &mut self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, MeshError> {
        if self.role != PeerRole::Callee {
            return Err(MeshError::NegotiationFailed(format!(
                "Session for {} is not the callee",
                self.remote_id
            )));
        }
        if self.state != PeerState::New {
            return Err(MeshError::StaleReference(format!(
                "Offer from {} arrived on a used session",
                self.remote_id
            )));
        }

        self.state = PeerState::Negotiating;
        self.transport.set_remote_description(offer).await?;
        self.remote_description_set = true;
        let answer = self.transport.create_answer().await?;
        self.flush_pending_candidates().await?;
        info!("Answered offer from peer {}", self.remote_id);
        Ok(answer)
    }

    /// Apply the remote answer to our in-flight offer (caller side)
    pub async fn apply_answer(&mut self, answer: SessionDescription) -> Result<(), MeshError> {
        if self.role != PeerRole::Caller || self.state != PeerState::Negotiating {
            return Err(MeshError::StaleReference(format!(
                "Answer from {} does not match an in-flight offer",
                self.remote_id
            )));
        }
        if self.remote_description_set {
            return Err(MeshError::StaleReference(format!(
                "Duplicate answer from {}",
                self.remote_id
            )));
        }

        self.transport.set_remote_description(answer).await?;
        self.remote_description_set = true;
        self.flush_pending_candidates().await?;
        info!("Applied answer from peer {}", self.remote_id);
        Ok(())
    }

    /// Feed a remote candidate in, buffering until the remote description
    /// is applied
    ///
    /// Overflowing the buffer is a negotiation failure; the coordinator
    /// closes the session on error.
    pub async fn add_candidate(&mut self, candidate: CandidateInit) -> Result<(), MeshError> {
        if self.state == PeerState::Closed {
            return Err(MeshError::StaleReference(format!(
                "Candidate for closed session {}",
                self.remote_id
            )));
        }

        if self.remote_description_set {
            return self.transport.add_remote_candidate(candidate).await;
        }

        if self.pending_candidates.len() >= self.max_pending_candidates {
            warn!(
                "Candidate buffer overflow for peer {} (cap {})",
                self.remote_id, self.max_pending_candidates
            );
            return Err(MeshError::NegotiationFailed(format!(
                "Candidate buffer overflow for peer {}",
                self.remote_id
            )));
        }
        self.pending_candidates.push(candidate);
        Ok(())
    }

    async fn flush_pending_candidates(&mut self) -> Result<(), MeshError> {
        if self.pending_candidates.is_empty() {
            return Ok(());
        }
        let buffered = std::mem::take(&mut self.pending_candidates);
        debug!(
            "Applying {} buffered candidates for peer {}",
            buffered.len(),
            self.remote_id
        );
        for candidate in buffered {
            self.transport.add_remote_candidate(candidate).await?;
        }
        Ok(())
    }

    /// Absorb a transport connectivity report
    ///
    /// Returns the new session state. `Failed`, `Disconnected` and `Closed`
    /// reports are terminal; the caller tears the session down.
    pub fn on_transport_state(&mut self, transport_state: TransportState) -> PeerState {
        if self.state == PeerState::Closed {
            return self.state;
        }
        match transport_state {
            TransportState::Connected => {
                if self.state != PeerState::Connected {
                    info!("Peer {} connected", self.remote_id);
                }
                self.state = PeerState::Connected;
            }
            TransportState::Failed | TransportState::Disconnected | TransportState::Closed => {
                warn!(
                    "Peer {} transport reported {:?}",
                    self.remote_id, transport_state
                );
                self.state = PeerState::Closed;
            }
            TransportState::New | TransportState::Connecting => {}
        }
        self.state
    }

    /// Swap the outgoing video track (screen share start/stop)
    pub async fn replace_video(&self, track: LocalTrack) -> Result<(), MeshError> {
        if self.state == PeerState::Closed {
            return Err(MeshError::StaleReference(format!(
                "Video replace on closed session {}",
                self.remote_id
            )));
        }
        self.transport.replace_video_track(track).await
    }

    /// Tear the session down; idempotent
    pub async fn close(&mut self) {
        if self.state == PeerState::Closed {
            return;
        }
        self.state = PeerState::Closed;
        self.pending_candidates.clear();
        if let Err(e) = self.transport.close().await {
            warn!("Error closing session for {}: {}", self.remote_id, e);
        }
        info!("Closed session for peer {}", self.remote_id);
    }
}

#[cfg(test)]
mod tests {
    use super::super::transport::fake::{FakeCall, FakeTransport};
    use super::super::SdpKind;
    use super::*;

    fn candidate(n: usize) -> CandidateInit {
        CandidateInit {
            candidate: format!("candidate:{} 1 udp 2122260223 192.0.2.1 54321 typ host", n),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        }
    }

    fn offer() -> SessionDescription {
        SessionDescription {
            kind: SdpKind::Offer,
            sdp: "v=0 remote-offer".to_string(),
        }
    }

    fn answer() -> SessionDescription {
        SessionDescription {
            kind: SdpKind::Answer,
            sdp: "v=0 remote-answer".to_string(),
        }
    }

    fn caller(transport: FakeTransport) -> PeerSession<FakeTransport> {
        PeerSession::new("bob".to_string(), PeerRole::Caller, transport, 4)
    }

    fn callee(transport: FakeTransport) -> PeerSession<FakeTransport> {
        PeerSession::new("bob".to_string(), PeerRole::Callee, transport, 4)
    }

    #[tokio::test]
    async fn test_caller_happy_path() {
        let transport = FakeTransport::default();
        let mut session = caller(transport.clone());

        let offer = session.start_offer().await.unwrap();
        assert_eq!(offer.kind, SdpKind::Offer);
        assert_eq!(session.state(), PeerState::Negotiating);

        session.apply_answer(answer()).await.unwrap();
        assert_eq!(session.state(), PeerState::Negotiating);

        assert_eq!(
            session.on_transport_state(TransportState::Connected),
            PeerState::Connected
        );
        assert_eq!(
            transport.calls(),
            vec![FakeCall::CreateOffer, FakeCall::SetRemote(SdpKind::Answer)]
        );
    }

    #[tokio::test]
    async fn test_callee_happy_path() {
        let transport = FakeTransport::default();
        let mut session = callee(transport.clone());

        let answer = session.accept_offer(offer()).await.unwrap();
        assert_eq!(answer.kind, SdpKind::Answer);
        assert_eq!(session.state(), PeerState::Negotiating);
        assert_eq!(
            transport.calls(),
            vec![
                FakeCall::SetRemote(SdpKind::Offer),
                FakeCall::CreateAnswer
            ]
        );
    }

    #[tokio::test]
    async fn test_candidates_buffer_until_remote_description() {
        let transport = FakeTransport::default();
        let mut session = caller(transport.clone());
        session.start_offer().await.unwrap();

        session.add_candidate(candidate(1)).await.unwrap();
        session.add_candidate(candidate(2)).await.unwrap();
        assert_eq!(transport.candidate_count(), 0);

        session.apply_answer(answer()).await.unwrap();
        assert_eq!(transport.candidate_count(), 2);

        // Once the remote description is set, candidates pass straight through
        session.add_candidate(candidate(3)).await.unwrap();
        assert_eq!(transport.candidate_count(), 3);
    }

    #[tokio::test]
    async fn test_candidate_buffer_overflow_fails() {
        let transport = FakeTransport::default();
        let mut session = caller(transport.clone());
        session.start_offer().await.unwrap();

        for n in 0..4 {
            session.add_candidate(candidate(n)).await.unwrap();
        }
        let result = session.add_candidate(candidate(4)).await;
        assert!(matches!(result, Err(MeshError::NegotiationFailed(_))));
        assert_eq!(transport.candidate_count(), 0);
    }

    #[tokio::test]
    async fn test_answer_without_offer_is_stale() {
        let transport = FakeTransport::default();
        let mut session = caller(transport.clone());

        let result = session.apply_answer(answer()).await;
        assert!(matches!(result, Err(MeshError::StaleReference(_))));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_answer_is_stale() {
        let transport = FakeTransport::default();
        let mut session = caller(transport.clone());
        session.start_offer().await.unwrap();
        session.apply_answer(answer()).await.unwrap();

        let result = session.apply_answer(answer()).await;
        assert!(matches!(result, Err(MeshError::StaleReference(_))));
    }

    #[tokio::test]
    async fn test_callee_cannot_start_offer() {
        let transport = FakeTransport::default();
        let mut session = callee(transport);
        assert!(session.start_offer().await.is_err());
    }

    #[tokio::test]
    async fn test_closed_is_terminal() {
        let transport = FakeTransport::default();
        let mut session = caller(transport.clone());
        session.start_offer().await.unwrap();
        session.close().await;

        assert!(session.is_closed());
        assert!(session.add_candidate(candidate(1)).await.is_err());
        assert_eq!(
            session.on_transport_state(TransportState::Connected),
            PeerState::Closed
        );

        // Closing again is a no-op
        session.close().await;
        let close_count = transport
            .calls()
            .iter()
            .filter(|c| **c == FakeCall::Close)
            .count();
        assert_eq!(close_count, 1);
    }

    #[tokio::test]
    async fn test_transport_failure_closes_state() {
        let transport = FakeTransport::default();
        let mut session = caller(transport);
        session.start_offer().await.unwrap();
        assert_eq!(
            session.on_transport_state(TransportState::Failed),
            PeerState::Closed
        );
    }
}
