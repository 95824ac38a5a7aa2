use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::attachment::Attachment;

/// How an [`OutboundMessage`]'s content should be rendered by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    Markdown,
    Html,
    Plain,
}

/// A message arriving from a transport, already translated into the Gateway's unified model.
///
/// All identifiers (`channel`, `channel_user_id`, `channel_chat_id`, `message_id`) are opaque
/// strings the Gateway never parses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: String,
    pub channel_user_id: String,
    pub channel_chat_id: String,
    pub content: String,
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub is_group: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, serde_json::Value>,
}

impl InboundMessage {
    /// Builds an inbound message with `timestamp` defaulted to now and empty attachments/metadata.
    pub fn new(
        channel: impl Into<String>,
        channel_user_id: impl Into<String>,
        channel_chat_id: impl Into<String>,
        content: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            channel_user_id: channel_user_id.into(),
            channel_chat_id: channel_chat_id.into(),
            content: content.into(),
            message_id: message_id.into(),
            timestamp: Utc::now(),
            attachments: Vec::new(),
            is_group: false,
            reply_to_id: None,
            user_name: None,
            metadata: Map::new(),
        }
    }
}

/// A message the Gateway hands back to an adapter for delivery to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub parse_mode: ParseMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attachments: Vec::new(),
            parse_mode: ParseMode::Plain,
            reply_to_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_new_has_no_attachments_or_metadata() {
        let m = InboundMessage::new("telegram", "42", "100", "hello", "M1");
        assert!(m.attachments.is_empty());
        assert!(m.metadata.is_empty());
        assert!(!m.is_group);
    }

    #[test]
    fn outbound_text_defaults_to_plain() {
        let m = OutboundMessage::text("hi");
        assert_eq!(m.parse_mode, ParseMode::Plain);
        assert!(m.attachments.is_empty());
    }
}
