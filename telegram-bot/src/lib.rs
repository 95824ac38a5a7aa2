//! Telegram channel adapter (§4.J): concrete binding to `teloxide`.

mod adapter;
mod inbound;

pub use adapter::{TelegramAdapter, TelegramAdapterConfig};

const CAPABILITIES: gateway_types::ChannelCapabilities = gateway_types::ChannelCapabilities {
    supports_markdown: true,
    supports_html: true,
    supports_reactions: false,
    supports_threads: false,
    supports_edit: true,
    supports_delete: true,
    max_message_length: 4096,
    supports_attachments: true,
    supports_voice: true,
    supports_streaming_edit: true,
    edit_rate_limit_ms: 1500,
};
