//! Signaling message codec
//!
//! One tagged enum covers every event on the signaling bus, dispatched
//! through a single exhaustive match in the room coordinator. Directed
//! negotiation payloads carry `target` on the way out and `sender` on the
//! way in; the bus rewrites one into the other.

use crate::peer::{CandidateInit, SessionDescription};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SignalMessage {
    /// Announce a new room (outbound)
    CreateRoom { room_id: String, user_id: String },

    /// Request to join an existing room (outbound)
    JoinRoom { room_id: String, user_id: String },

    /// Join or create rejected by the bus (inbound)
    RoomError { message: String },

    /// A remote participant is present in the room (inbound)
    UserJoined { user_id: String },

    /// A remote participant departed (inbound)
    UserLeft { user_id: String },

    /// Session offer, directed
    Offer {
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        offer: SessionDescription,
    },

    /// Session answer, directed
    Answer {
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        answer: SessionDescription,
    },

    /// Connectivity candidate, directed
    IceCandidate {
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        candidate: CandidateInit,
    },

    /// Chat text, broadcast within the room
    ChatMessage {
        room_id: String,
        user_id: String,
        message: String,
    },

    /// Explicit departure (outbound)
    LeaveRoom { room_id: String, user_id: String },
}

impl SignalMessage {
    pub fn offer_to(target: &str, offer: SessionDescription) -> Self {
        SignalMessage::Offer {
            target: Some(target.to_string()),
            sender: None,
            offer,
        }
    }

    pub fn answer_to(target: &str, answer: SessionDescription) -> Self {
        SignalMessage::Answer {
            target: Some(target.to_string()),
            sender: None,
            answer,
        }
    }

    pub fn candidate_to(target: &str, candidate: CandidateInit) -> Self {
        SignalMessage::IceCandidate {
            target: Some(target.to_string()),
            sender: None,
            candidate,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::SdpKind;

    #[test]
    fn test_join_room_wire_format() {
        let msg = SignalMessage::JoinRoom {
            room_id: "room-1".to_string(),
            user_id: "alice".to_string(),
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"join-room\""));
        assert!(json.contains("\"roomId\":\"room-1\""));
        assert!(json.contains("\"userId\":\"alice\""));
    }

    #[test]
    fn test_offer_round_trip() {
        let msg = SignalMessage::offer_to(
            "bob",
            SessionDescription {
                kind: SdpKind::Offer,
                sdp: "v=0".to_string(),
            },
        );
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"offer\""));
        assert!(!json.contains("sender"));
        assert_eq!(SignalMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_parses_inbound_candidate() {
        let json = r#"{
            "type": "ice-candidate",
            "sender": "bob",
            "candidate": {
                "candidate": "candidate:1 1 udp 2122260223 192.0.2.1 54321 typ host",
                "sdpMid": "0",
                "sdpMLineIndex": 0
            }
        }"#;
        match SignalMessage::from_json(json).unwrap() {
            SignalMessage::IceCandidate {
                sender, candidate, ..
            } => {
                assert_eq!(sender.as_deref(), Some("bob"));
                assert_eq!(candidate.sdp_mline_index, Some(0));
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_event() {
        assert!(SignalMessage::from_json(r#"{"type":"mute-all"}"#).is_err());
    }
}
