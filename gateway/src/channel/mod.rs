//! Abstract channel adapter contract (§4.I): lifecycle, capability declaration, inbound
//! conversion, outbound send, typing indicator, streaming send.

pub mod backoff;
pub mod chunk;
pub mod edit_driver;

use async_trait::async_trait;
use gateway_types::{ChannelCapabilities, InboundMessage, OutboundMessage};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdapterError {
    #[error("timeout")]
    Timeout,
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("send failed: {0}")]
    Send(String),
    #[error("not connected")]
    NotConnected,
}

/// Lifecycle state machine per adapter: `Created -> Started -> (Connected <-> Reconnecting) ->
/// Stopped`. `Stopped` is terminal until `start` is invoked again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Created,
    Started,
    Connected,
    Reconnecting,
    Stopped,
}

/// The single inbound handler the Manager installs on every registered adapter.
pub type InboundHandler = std::sync::Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// Transport-specific binding between a chat SDK and the Gateway's unified message model.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> ChannelCapabilities;

    /// Registers the single inbound handler the Manager installs at startup.
    fn on_message(&self, handler: InboundHandler);

    async fn start(&self) -> Result<(), AdapterError>;

    async fn stop(&self) -> Result<(), AdapterError>;

    fn state(&self) -> AdapterState;

    /// One-shot send: chunks long messages per `maxMessageLength`, falls back from a rich
    /// `parseMode` to plain on formatter errors, then attempts each attachment independently.
    async fn send(&self, chat_id: &str, message: OutboundMessage) -> Result<(), AdapterError>;

    /// Delivers a live response: post a placeholder, edit it at most every `editIntervalMs` (up
    /// to `maxEdits` in-flight updates), then emit exactly one terminal update with the full
    /// text and no cursor glyph. Truncates to the transport limit with additional messages for
    /// the tail when the final text exceeds it.
    async fn send_streaming(
        &self,
        chat_id: &str,
        chunks: mpsc::Receiver<String>,
        reply_to_id: Option<String>,
    ) -> Result<(), AdapterError>;

    /// One-shot "is typing…" signal. The Manager refreshes this on an interval while an Agent
    /// call is in flight (§4.J); a failure here is never fatal to message delivery.
    async fn typing_indicator(&self, chat_id: &str) -> Result<(), AdapterError>;
}
