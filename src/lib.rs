//! meshcall-core: mesh video call orchestration
//!
//! Turns signaling bus messages (join/leave/offer/answer/candidate/chat)
//! into a correctly ordered full mesh of point-to-point media sessions,
//! one per pair of participants. Media itself flows directly between
//! peers; the bus only carries coordination.
//!
//! Layering, leaves first:
//! - [`signaling`]: wire codec and WebSocket client for the bus
//! - [`media`]: local track acquisition seam and RTP-backed source
//! - [`peer`]: per-remote session state machine and registry
//! - [`room`]: the coordinator event loop tying it all together
//! - [`chat`]: ordered chat log riding the same bus

pub mod args;
pub mod chat;
pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod room;
pub mod signaling;

pub use config::Config;
pub use error::MeshError;
pub use room::{RoomCommand, RoomCoordinator, RoomNotification};
