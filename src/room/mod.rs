//! Room lifecycle control
//!
//! The coordinator is the single writer for all negotiation state. Every
//! input reaches it as a message on one of four channels (signaling,
//! local commands, transport callbacks, media reports) and is handled to
//! completion before the next one is taken.

pub mod coordinator;

pub use coordinator::RoomCoordinator;

use crate::chat::ChatEntry;
use crate::media::{MediaEvent, RemoteTrack};
use crate::peer::TransportEvent;
use crate::signaling::SignalMessage;
use tokio::sync::mpsc;

/// Local user actions fed into the coordinator loop
#[derive(Debug, Clone)]
pub enum RoomCommand {
    CreateRoom,
    JoinRoom(String),
    LeaveRoom,
    SetAudioEnabled(bool),
    SetVideoEnabled(bool),
    StartScreenShare,
    StopScreenShare,
    SendChat(String),
    Shutdown,
}

/// Reports to the rendering layer
///
/// The coordinator never touches presentation state; it announces what
/// happened and the consumer decides what to show.
#[derive(Debug, Clone)]
pub enum RoomNotification {
    RoomReady { room_id: String },
    RoomError { message: String },
    PeerConnected { peer: String },
    PeerClosed { peer: String },
    PeerMedia(RemoteTrack),
    Chat(ChatEntry),
    ScreenShareChanged { active: bool },
    CommandFailed { message: String },
}

/// Receivers the coordinator loop drains
pub struct RoomChannels {
    pub signals: mpsc::UnboundedReceiver<SignalMessage>,
    pub commands: mpsc::UnboundedReceiver<RoomCommand>,
    pub transports: mpsc::UnboundedReceiver<TransportEvent>,
    pub media: mpsc::UnboundedReceiver<MediaEvent>,
}
