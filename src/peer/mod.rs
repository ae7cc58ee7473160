//! Peer session management
//!
//! This module provides the per-remote negotiation machinery:
//! - Session state machine (one per remote participant)
//! - Session registry keyed by remote identity
//! - Transport seam over the underlying WebRTC peer connection

pub mod registry;
pub mod session;
pub mod transport;

pub use registry::PeerRegistry;
pub use session::PeerSession;
pub use transport::{PeerTransport, RtcTransportFactory, TransportFactory};

use crate::media::RemoteTrack;
use serde::{Deserialize, Serialize};

/// Negotiation role, decided once at session creation by who discovered whom
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// This side produces the offer
    Caller,
    /// This side answers an inbound offer
    Callee,
}

/// Session connection state
///
/// `Closed` is terminal; reconnecting to the same remote requires a fresh
/// session object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Session constructed, local tracks attached
    New,
    /// Offer/answer exchange in progress
    Negotiating,
    /// Transport reported connectivity
    Connected,
    /// Torn down (terminal)
    Closed,
}

/// Which half of the offer/answer exchange a description is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A negotiated session description as carried on the signaling bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

/// A connectivity candidate as carried on the signaling bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInit {
    pub candidate: String,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
}

/// Connection state as reported by the underlying transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Event emitted by a transport's background callbacks
///
/// Transports never mutate orchestrator state directly; they enqueue these
/// into the coordinator's event loop, which re-validates the named peer
/// against the registry before acting.
#[derive(Debug, Clone)]
pub struct TransportEvent {
    /// Remote participant this event belongs to
    pub peer: String,
    pub kind: TransportEventKind,
}

#[derive(Debug, Clone)]
pub enum TransportEventKind {
    /// Transport connectivity report (observed, not polled)
    StateChanged(TransportState),
    /// Locally discovered connectivity candidate to forward to the remote
    LocalCandidate(CandidateInit),
    /// A remote media track arrived
    RemoteTrack(RemoteTrack),
}
