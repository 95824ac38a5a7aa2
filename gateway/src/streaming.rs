//! Chooses how to deliver a long-running response given a channel's capabilities (§4.H).

use gateway_types::ChannelCapabilities;

const MIN_EDIT_INTERVAL_MS: u64 = 1000;
const DEFAULT_CHUNK_SIZE: usize = 500;
const DEFAULT_TYPING_TIMEOUT_MS: u64 = 5000;

/// Closed set of delivery strategies for a streaming Agent response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingMode {
    BufferAll,
    EditMessage { edit_interval_ms: u64, max_edits: u32 },
    TypingIndicator { typing_timeout_ms: u64 },
    Chunked { chunk_size: usize },
}

/// Per-channel presets overriding the generic capability-driven selection (§4.H).
pub fn select_for_channel(channel: &str, caps: &ChannelCapabilities) -> StreamingMode {
    match channel {
        "telegram" => StreamingMode::EditMessage {
            edit_interval_ms: 1500,
            max_edits: 30,
        },
        "discord" => StreamingMode::EditMessage {
            edit_interval_ms: 1000,
            max_edits: 50,
        },
        "email" => StreamingMode::BufferAll,
        _ => select(caps),
    }
}

/// Generic rule: if the channel supports streaming edits, edit in place at
/// `max(editRateLimitMs, 1000)`; otherwise buffer the whole response.
pub fn select(caps: &ChannelCapabilities) -> StreamingMode {
    if caps.supports_streaming_edit {
        StreamingMode::EditMessage {
            edit_interval_ms: caps.edit_rate_limit_ms.max(MIN_EDIT_INTERVAL_MS),
            max_edits: 50,
        }
    } else {
        StreamingMode::BufferAll
    }
}

impl StreamingMode {
    pub fn chunk_size(self) -> usize {
        match self {
            StreamingMode::Chunked { chunk_size } => chunk_size,
            _ => DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn typing_timeout_ms(self) -> u64 {
        match self {
            StreamingMode::TypingIndicator { typing_timeout_ms } => typing_timeout_ms,
            _ => DEFAULT_TYPING_TIMEOUT_MS,
        }
    }
}
