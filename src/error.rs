//! Error types
//!
//! No failure here is fatal to the process: media errors abort one
//! join/create attempt, negotiation errors close one session, stale
//! references mark a race that already resolved and are discarded.

use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum MeshError {
    /// Camera/microphone permission refused
    MediaAccessDenied(String),
    /// Capture device missing or busy
    MediaDeviceUnavailable(String),
    /// Screen capture aborted by the user before it started
    ScreenCaptureCancelled,
    /// Join rejected for an unknown room
    RoomNotFound(String),
    /// The transport rejected a description or candidate
    NegotiationFailed(String),
    /// An async continuation resolved after its session was removed
    StaleReference(String),
    /// Signaling bus connection or protocol failure
    Signaling(String),
    /// Rejected configuration value
    InvalidConfig(String),
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshError::MediaAccessDenied(msg) => write!(f, "Media access denied: {}", msg),
            MeshError::MediaDeviceUnavailable(msg) => {
                write!(f, "Media device unavailable: {}", msg)
            }
            MeshError::ScreenCaptureCancelled => write!(f, "Screen capture cancelled"),
            MeshError::RoomNotFound(room) => write!(f, "Room not found: {}", room),
            MeshError::NegotiationFailed(msg) => write!(f, "Negotiation failed: {}", msg),
            MeshError::StaleReference(msg) => write!(f, "Stale reference: {}", msg),
            MeshError::Signaling(msg) => write!(f, "Signaling error: {}", msg),
            MeshError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl Error for MeshError {}
