//! History shaping for model input

use crate::providers::ChatMessage;
use crate::types::{SenderKind, Turn};

/// History as the responder sees it: user turns and replies, no tool records,
/// no responder labels. The current query is appended last.
pub fn generation_messages(history: &[Turn], query: &str) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = history
        .iter()
        .filter(|turn| !turn.is_malformed())
        .filter_map(|turn| match turn.sender_kind() {
            SenderKind::User => Some(ChatMessage::user(&turn.text)),
            SenderKind::Tool => None,
            SenderKind::Responder(_) | SenderKind::Unknown => {
                Some(ChatMessage::assistant(&turn.text))
            }
        })
        .collect();
    messages.push(ChatMessage::user(query));
    messages
}

/// History for the routing model: replies are prefixed `[Sender]: ` so it can
/// see who was active
pub fn routing_messages(history: &[Turn], query: &str) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = history
        .iter()
        .filter(|turn| !turn.is_malformed())
        .filter_map(|turn| match turn.sender_kind() {
            SenderKind::User => Some(ChatMessage::user(&turn.text)),
            SenderKind::Tool => None,
            SenderKind::Responder(_) | SenderKind::Unknown => Some(ChatMessage::assistant(
                format!("[{}]: {}", turn.sender.trim(), turn.text),
            )),
        })
        .collect();
    messages.push(ChatMessage::user(query));
    messages
}
