//! Webhook event payloads delivered by the LINE platform, and the reply message shape.
//!
//! Only `type`, `message` and `replyToken` are consumed; everything else is kept in `extra`
//! so nothing the platform adds later causes a parse failure.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Webhook POST body: one batch of events for a bot (the `destination` user id).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<InboundEvent>,
}

/// One notification from the platform (message, follow, join, ...).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    /// Missing `type` reads as `Other`, so the event is skipped rather than failing the batch.
    #[serde(rename = "type", default)]
    pub kind: EventKind,
    #[serde(default)]
    pub message: Option<EventMessage>,
    #[serde(default)]
    pub reply_token: Option<String>,
    /// Source, timestamp, mode, webhookEventId, deliveryContext and anything else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InboundEvent {
    /// Message text when this is a text message event; None for every other event or message type.
    pub fn text(&self) -> Option<&str> {
        if self.kind != EventKind::Message {
            return None;
        }
        let message = self.message.as_ref()?;
        if message.kind != MessageKind::Text {
            return None;
        }
        Some(message.text.as_deref().unwrap_or(""))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Message,
    Follow,
    Unfollow,
    Join,
    Leave,
    MemberJoined,
    MemberLeft,
    Postback,
    Beacon,
    AccountLink,
    Things,
    Unsend,
    VideoPlayComplete,
    #[default]
    #[serde(other)]
    Other,
}

/// Message content of a message event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    File,
    Location,
    Sticker,
    #[default]
    #[serde(other)]
    Other,
}

/// Outbound message for the reply API. Only text replies are sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReplyMessage {
    Text { text: String },
}

impl ReplyMessage {
    pub fn text(text: impl Into<String>) -> Self {
        ReplyMessage::Text { text: text.into() }
    }
}

/// Per-event outcome: the reply API's response value, or None when the event was skipped.
pub type DispatchResult = Option<Value>;
