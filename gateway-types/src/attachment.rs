use serde::{Deserialize, Serialize};

/// Closed set of media kinds the Gateway understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Audio,
    Video,
    File,
}

const LARGE_ATTACHMENT_BYTES: i64 = 10 * 1024 * 1024;

/// A piece of media attached to an inbound or outbound message.
///
/// At least one of `url`, `data`, or `local_path` is present once the attachment
/// is consumed downstream; `local_path` is the only form the Agent ever sees
/// (raw URLs never cross the Bridge boundary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

impl Attachment {
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            url: None,
            data: None,
            filename: None,
            mime_type: None,
            size: None,
            local_path: None,
        }
    }

    pub fn with_local_path(kind: MessageType, local_path: impl Into<String>) -> Self {
        Self {
            local_path: Some(local_path.into()),
            ..Self::new(kind)
        }
    }

    /// `true` when `size` exceeds the 10 MiB large-attachment threshold.
    pub fn is_large(&self) -> bool {
        self.size.is_some_and(|s| s > LARGE_ATTACHMENT_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_large_respects_threshold() {
        let mut a = Attachment::new(MessageType::Image);
        a.size = Some(LARGE_ATTACHMENT_BYTES);
        assert!(!a.is_large());
        a.size = Some(LARGE_ATTACHMENT_BYTES + 1);
        assert!(a.is_large());
    }

    #[test]
    fn is_large_false_when_size_absent() {
        let a = Attachment::new(MessageType::File);
        assert!(!a.is_large());
    }

    #[test]
    fn message_type_serializes_lowercase() {
        let v = serde_json::to_value(MessageType::Image).unwrap();
        assert_eq!(v, serde_json::json!("image"));
    }
}
