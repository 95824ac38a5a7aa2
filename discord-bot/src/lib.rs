//! Discord channel adapter (§4.J): concrete binding to `serenity`.

mod adapter;
mod inbound;

pub use adapter::{DiscordAdapter, DiscordAdapterConfig};

const CAPABILITIES: gateway_types::ChannelCapabilities = gateway_types::ChannelCapabilities {
    supports_markdown: true,
    supports_html: false,
    supports_reactions: true,
    supports_threads: true,
    supports_edit: true,
    supports_delete: true,
    max_message_length: 2000,
    supports_attachments: true,
    supports_voice: false,
    supports_streaming_edit: true,
    edit_rate_limit_ms: 1000,
};
