//! WebSocket signaling client
//!
//! Connects to the signaling bus, pumps outbound [`SignalMessage`]s from a
//! channel onto the socket and parsed inbound messages into another. The
//! pumps shut down when either side of the socket drops.

use super::message::SignalMessage;
use crate::error::MeshError;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

pub struct SignalingClient {
    outgoing: mpsc::UnboundedSender<SignalMessage>,
    incoming: Option<mpsc::UnboundedReceiver<SignalMessage>>,
}

impl SignalingClient {
    /// Connect to the signaling bus and start the read/write pumps
    pub async fn connect(url: &str) -> Result<Self, MeshError> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| MeshError::Signaling(format!("Failed to connect to {}: {}", url, e)))?;
        info!(
            "Connected to signaling bus at {} (HTTP {})",
            url,
            response.status()
        );

        let (mut sink, mut source) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<SignalMessage>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<SignalMessage>();

        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let json = match msg.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to encode signaling message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json)).await {
                    error!("Signaling send failed: {}", e);
                    break;
                }
            }
            debug!("Signaling write pump stopped");
        });

        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => match SignalMessage::from_json(&text) {
                        Ok(msg) => {
                            if in_tx.send(msg).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Ignoring malformed signaling message: {}", e),
                    },
                    Ok(Message::Close(_)) => {
                        info!("Signaling bus closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("Signaling receive failed: {}", e);
                        break;
                    }
                }
            }
            debug!("Signaling read pump stopped");
        });

        Ok(Self {
            outgoing: out_tx,
            incoming: Some(in_rx),
        })
    }

    /// Handle for enqueueing outbound messages
    pub fn sender(&self) -> mpsc::UnboundedSender<SignalMessage> {
        self.outgoing.clone()
    }

    /// Take the inbound message stream; yields `None` after the first call
    pub fn take_incoming(&mut self) -> Option<mpsc::UnboundedReceiver<SignalMessage>> {
        self.incoming.take()
    }
}
