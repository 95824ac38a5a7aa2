use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed short prefixes for the well-known channels named in the configuration schema.
/// Channels outside this list fall back to their first two characters.
fn channel_prefix(channel: &str) -> String {
    match channel {
        "telegram" => "tg".to_string(),
        "discord" => "dc".to_string(),
        "email" => "em".to_string(),
        "slack" => "sl".to_string(),
        "wechat" => "wx".to_string(),
        "whatsapp" => "wa".to_string(),
        "matrix" => "mx".to_string(),
        other => other.chars().take(2).collect(),
    }
}

/// Deterministic session key: `"{prefix}:{channel_user_id}"`. This is the only handle
/// shared with the Agent — it never sees the raw channel name.
pub fn session_key(channel: &str, channel_user_id: &str) -> String {
    format!("{}:{}", channel_prefix(channel), channel_user_id)
}

/// A live conversation between one channel user and the Agent.
///
/// Exclusively owned by the Agent Bridge; every other reader takes a snapshot copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSession {
    pub context_id: String,
    pub channel: String,
    pub channel_user_id: String,
    pub channel_chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl ChannelSession {
    pub fn new(
        channel: impl Into<String>,
        channel_user_id: impl Into<String>,
        channel_chat_id: impl Into<String>,
        user_name: Option<String>,
    ) -> Self {
        let channel = channel.into();
        let channel_user_id = channel_user_id.into();
        let context_id = session_key(&channel, &channel_user_id);
        let now = Utc::now();
        Self {
            context_id,
            channel,
            channel_user_id,
            channel_chat_id: channel_chat_id.into(),
            user_name,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}
