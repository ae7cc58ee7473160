//! Chat relay
//!
//! Thin pass-through of chat events: outbound text becomes a signaling
//! message and is appended to the local log immediately (the bus does not
//! echo a sender's own messages back); inbound messages append in arrival
//! order. The log is bounded and independent of negotiation state.

use crate::signaling::SignalMessage;
use log::debug;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub room_id: String,
    pub sender: String,
    pub text: String,
}

pub struct ChatRelay {
    local_id: String,
    history_limit: usize,
    log: VecDeque<ChatEntry>,
}

impl ChatRelay {
    pub fn new(local_id: String, history_limit: usize) -> Self {
        Self {
            local_id,
            history_limit,
            log: VecDeque::new(),
        }
    }

    /// Build the outbound message for `text` and append it to the local log
    pub fn compose(&mut self, room_id: &str, text: &str) -> (SignalMessage, ChatEntry) {
        let entry = ChatEntry {
            room_id: room_id.to_string(),
            sender: self.local_id.clone(),
            text: text.to_string(),
        };
        self.append(entry.clone());
        let message = SignalMessage::ChatMessage {
            room_id: room_id.to_string(),
            user_id: self.local_id.clone(),
            message: text.to_string(),
        };
        (message, entry)
    }

    /// Append an inbound message; the sender's own echoes are dropped
    pub fn record_inbound(
        &mut self,
        room_id: &str,
        sender: &str,
        text: &str,
    ) -> Option<ChatEntry> {
        if sender == self.local_id {
            debug!("Dropping echoed own chat message");
            return None;
        }
        let entry = ChatEntry {
            room_id: room_id.to_string(),
            sender: sender.to_string(),
            text: text.to_string(),
        };
        self.append(entry.clone());
        Some(entry)
    }

    fn append(&mut self, entry: ChatEntry) {
        if self.log.len() >= self.history_limit {
            self.log.pop_front();
        }
        self.log.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &ChatEntry> {
        self.log.iter()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Drop the log (room exit)
    pub fn clear(&mut self) {
        self.log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_appends_own_message() {
        let mut relay = ChatRelay::new("alice".to_string(), 10);
        let (message, entry) = relay.compose("room-1", "hello");

        assert_eq!(entry.sender, "alice");
        assert_eq!(relay.len(), 1);
        match message {
            SignalMessage::ChatMessage {
                room_id,
                user_id,
                message,
            } => {
                assert_eq!(room_id, "room-1");
                assert_eq!(user_id, "alice");
                assert_eq!(message, "hello");
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_inbound_kept_in_arrival_order() {
        let mut relay = ChatRelay::new("alice".to_string(), 10);
        relay.record_inbound("room-1", "bob", "first");
        relay.record_inbound("room-1", "carol", "second");

        let texts: Vec<&str> = relay.entries().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_own_echo_is_dropped() {
        let mut relay = ChatRelay::new("alice".to_string(), 10);
        relay.compose("room-1", "hello");
        assert!(relay.record_inbound("room-1", "alice", "hello").is_none());
        assert_eq!(relay.len(), 1);
    }

    #[test]
    fn test_log_is_bounded() {
        let mut relay = ChatRelay::new("alice".to_string(), 3);
        for n in 0..5 {
            relay.record_inbound("room-1", "bob", &format!("msg {}", n));
        }
        assert_eq!(relay.len(), 3);
        assert_eq!(relay.entries().next().map(|e| e.text.as_str()), Some("msg 2"));
    }
}
