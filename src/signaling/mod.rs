//! Signaling bus integration: wire codec and WebSocket client

pub mod client;
pub mod message;

pub use client::SignalingClient;
pub use message::SignalMessage;
