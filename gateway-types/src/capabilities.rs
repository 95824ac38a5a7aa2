use serde::{Deserialize, Serialize};

/// What a channel adapter can do, declared once at construction and immutable thereafter.
///
/// Invariants: `max_message_length >= 1`, `edit_rate_limit_ms >= 0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChannelCapabilities {
    pub supports_markdown: bool,
    pub supports_html: bool,
    pub supports_reactions: bool,
    pub supports_threads: bool,
    pub supports_edit: bool,
    pub supports_delete: bool,
    pub max_message_length: usize,
    pub supports_attachments: bool,
    pub supports_voice: bool,
    pub supports_streaming_edit: bool,
    pub edit_rate_limit_ms: u64,
}

impl ChannelCapabilities {
    /// Safety margin subtracted from `max_message_length` before a message must be split,
    /// leaving room for a continuation marker and UTF-8 boundary slack.
    pub const CHUNK_SAFETY_MARGIN: usize = 96;

    /// Effective chunk size: `max_message_length` minus the unified safety margin, never
    /// smaller than 1.
    pub fn chunk_len(&self) -> usize {
        self.max_message_length
            .saturating_sub(Self::CHUNK_SAFETY_MARGIN)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(max_len: usize) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_markdown: true,
            supports_html: false,
            supports_reactions: false,
            supports_threads: false,
            supports_edit: true,
            supports_delete: true,
            max_message_length: max_len,
            supports_attachments: true,
            supports_voice: false,
            supports_streaming_edit: true,
            edit_rate_limit_ms: 1500,
        }
    }

    #[test]
    fn chunk_len_subtracts_margin() {
        assert_eq!(caps(4096).chunk_len(), 4000);
    }

    #[test]
    fn chunk_len_never_zero() {
        assert_eq!(caps(10).chunk_len(), 1);
    }
}
