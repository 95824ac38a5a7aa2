//! Concrete [`ChannelAdapter`] binding to `serenity` (§4.J).
//!
//! `serenity`'s client drives its own `tokio` task for the gateway event loop; per the design
//! note in §9 we still treat it as an isolated execution domain and never call back into Agent
//! invocation from inside an event handler — inbound messages cross a bounded `mpsc` channel with
//! a send timeout so a busy Bridge can never stall the gateway connection.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use gateway::channel::backoff::ReconnectBackoff;
use gateway::channel::chunk::chunk_text;
use gateway::channel::edit_driver::{drive, EditSink};
use gateway::{AdapterError, AdapterState, AttachmentHandler, ChannelAdapter, InboundHandler, MetricsCollector};
use gateway_types::{Attachment, ChannelCapabilities, InboundMessage, MessageType, OutboundMessage};
use serenity::all::{
    ChannelId, CreateAttachment, CreateMessage, EditMessage, GatewayIntents, Message as SerenityMessage,
};
use serenity::async_trait as serenity_async_trait;
use serenity::client::{Client, Context, EventHandler};
use serenity::http::Http;
use tokio::sync::{mpsc, Mutex};

use crate::inbound::{filter_inbound, FilterOutcome};
use crate::CAPABILITIES;

const DISPATCH_QUEUE_CAPACITY: usize = 64;
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
const CONTINUATION_MARKER: &str = "...(续)";
const ATTACHMENT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// Per-account settings the Manager derives from `config::ChannelConfig` (§4.K).
#[derive(Debug, Clone)]
pub struct DiscordAdapterConfig {
    pub token: String,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
    pub require_mention: Option<bool>,
    pub allowed_guilds: Option<Vec<i64>>,
    pub respond_to_dms: Option<bool>,
}

pub struct DiscordAdapter {
    http: Arc<Http>,
    config: Arc<DiscordAdapterConfig>,
    attachments: Arc<AttachmentHandler>,
    metrics: Arc<MetricsCollector>,
    handler: StdMutex<Option<InboundHandler>>,
    state: Arc<StdMutex<AdapterState>>,
    client_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    dispatch_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    shard_manager: Mutex<Option<Arc<serenity::gateway::ShardManager>>>,
}

impl DiscordAdapter {
    pub fn new(config: DiscordAdapterConfig, attachments: Arc<AttachmentHandler>, metrics: Arc<MetricsCollector>) -> Self {
        let http = Arc::new(Http::new(&config.token));
        Self {
            http,
            config: Arc::new(config),
            attachments,
            metrics,
            handler: StdMutex::new(None),
            state: Arc::new(StdMutex::new(AdapterState::Created)),
            client_task: Mutex::new(None),
            dispatch_task: Mutex::new(None),
            shard_manager: Mutex::new(None),
        }
    }

    fn set_state(&self, state: AdapterState) {
        *self.state.lock().unwrap() = state;
    }

    async fn send_one(&self, channel_id: ChannelId, text: &str) -> Result<(), AdapterError> {
        channel_id
            .send_message(&self.http, CreateMessage::new().content(text))
            .await
            .map(|_| ())
            .map_err(|err| AdapterError::Send(err.to_string()))
    }
}

struct Handler {
    tx: mpsc::Sender<InboundMessage>,
    config: Arc<DiscordAdapterConfig>,
    attachments: Arc<AttachmentHandler>,
}

#[serenity_async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: SerenityMessage) {
        if msg.author.bot {
            return;
        }
        let bot_id = ctx.cache.current_user().id;
        let bot_mention = format!("<@{bot_id}>");
        let is_dm = msg.guild_id.is_none();
        let guild_id = msg.guild_id.map(|g| g.get() as i64);

        let outcome = filter_inbound(
            &msg.author.id.get().to_string(),
            &self.config.whitelist,
            &self.config.blacklist,
            is_dm,
            guild_id,
            self.config.allowed_guilds.as_deref(),
            self.config.respond_to_dms,
            self.config.require_mention,
            &bot_mention,
            &msg.content,
        );
        let content = match outcome {
            FilterOutcome::Drop => return,
            FilterOutcome::Accept { content } => content,
        };

        let _ = msg.channel_id.broadcast_typing(&ctx.http).await;

        let mut inbound = InboundMessage::new(
            "discord",
            msg.author.id.get().to_string(),
            msg.channel_id.get().to_string(),
            content,
            msg.id.get().to_string(),
        );
        inbound.is_group = !is_dm;
        inbound.user_name = Some(msg.author.name.clone());

        for attachment in &msg.attachments {
            if let Some(converted) = download_inbound_attachment(&self.attachments, attachment).await {
                inbound.attachments.push(converted);
            }
        }

        // Never block the gateway's event loop on a saturated routing queue (§4.J, §9).
        let _ = tokio::time::timeout(DISPATCH_TIMEOUT, self.tx.send(inbound)).await;
    }
}

/// Downloads a single Discord attachment into staging (§4.J). Unlike Telegram, Discord already
/// exposes a direct CDN `url` on the message, so there's no separate file-resolution call.
async fn download_inbound_attachment(
    attachments: &AttachmentHandler,
    attachment: &serenity::all::Attachment,
) -> Option<Attachment> {
    let kind = if attachment.content_type.as_deref().is_some_and(|ct| ct.starts_with("image")) {
        MessageType::Image
    } else {
        MessageType::File
    };

    match attachments
        .download_from_url(&attachment.url, Some(&attachment.filename), ATTACHMENT_DOWNLOAD_TIMEOUT_SECS)
        .await
    {
        Ok(local_path) => {
            let mut converted = Attachment::with_local_path(kind, local_path);
            converted.url = Some(attachment.url.clone());
            converted.filename = Some(attachment.filename.clone());
            converted.mime_type = attachment.content_type.clone();
            converted.size = Some(attachment.size as i64);
            Some(converted)
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to download discord attachment");
            None
        }
    }
}

#[async_trait]
impl ChannelAdapter for DiscordAdapter {
    fn name(&self) -> &str {
        "discord"
    }

    fn capabilities(&self) -> ChannelCapabilities {
        CAPABILITIES
    }

    fn on_message(&self, handler: InboundHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    async fn start(&self) -> Result<(), AdapterError> {
        let handler = self
            .handler
            .lock()
            .unwrap()
            .clone()
            .ok_or(AdapterError::NotConnected)?;

        let (tx, mut rx) = mpsc::channel(DISPATCH_QUEUE_CAPACITY);
        let dispatch = tokio::spawn(async move {
            while let Some(inbound) = rx.recv().await {
                handler(inbound);
            }
        });
        *self.dispatch_task.lock().await = Some(dispatch);

        let intents = GatewayIntents::GUILD_MESSAGES | GatewayIntents::DIRECT_MESSAGES | GatewayIntents::MESSAGE_CONTENT;
        let event_handler = Handler {
            tx,
            config: Arc::clone(&self.config),
            attachments: Arc::clone(&self.attachments),
        };
        let mut client = Client::builder(&self.config.token, intents)
            .event_handler(event_handler)
            .await
            .map_err(|err| AdapterError::Send(err.to_string()))?;

        *self.shard_manager.lock().await = Some(Arc::clone(&client.shard_manager));

        let run_task = tokio::spawn(async move {
            if let Err(err) = client.start().await {
                tracing::error!(error = %err, "discord client exited with an error");
            }
        });
        *self.client_task.lock().await = Some(run_task);
        self.set_state(AdapterState::Connected);
        Ok(())
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        if let Some(shard_manager) = self.shard_manager.lock().await.take() {
            shard_manager.shutdown_all().await;
        }

        if let Some(handle) = self.client_task.lock().await.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                tracing::warn!("discord client task did not exit within the shutdown grace period");
            }
        }
        if let Some(handle) = self.dispatch_task.lock().await.take() {
            handle.abort();
        }
        self.set_state(AdapterState::Stopped);
        Ok(())
    }

    fn state(&self) -> AdapterState {
        *self.state.lock().unwrap()
    }

    async fn send(&self, chat_id: &str, message: OutboundMessage) -> Result<(), AdapterError> {
        let channel_id = ChannelId::new(chat_id.parse().map_err(|_| AdapterError::Send("invalid channel id".into()))?);
        let max_len = CAPABILITIES.chunk_len();
        let chunks = chunk_text(&message.content, max_len);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.into_iter().enumerate() {
            let text = if i == last { chunk } else { format!("{chunk}{CONTINUATION_MARKER}") };
            self.send_one(channel_id, &text).await?;
        }

        for attachment in &message.attachments {
            let Some(path) = attachment.local_path.as_ref() else { continue };
            let file = CreateAttachment::path(path)
                .await
                .map_err(|err| AdapterError::Send(err.to_string()))?;
            channel_id
                .send_message(&self.http, CreateMessage::new().add_file(file))
                .await
                .map(|_| ())
                .map_err(|err| AdapterError::Send(err.to_string()))?;
        }

        let _ = message.reply_to_id;
        Ok(())
    }

    async fn send_streaming(
        &self,
        chat_id: &str,
        chunks: mpsc::Receiver<String>,
        _reply_to_id: Option<String>,
    ) -> Result<(), AdapterError> {
        let channel_id = ChannelId::new(chat_id.parse().map_err(|_| AdapterError::Send("invalid channel id".into()))?);

        let placeholder = channel_id
            .send_message(&self.http, CreateMessage::new().content("🤔 思考中…"))
            .await
            .map_err(|err| AdapterError::Send(err.to_string()))?;

        let sink = DiscordEditSink {
            http: Arc::clone(&self.http),
            channel_id,
            message_id: placeholder.id,
        };

        drive(
            chunks,
            Duration::from_millis(CAPABILITIES.edit_rate_limit_ms),
            50,
            CAPABILITIES.chunk_len(),
            &sink,
            "(no response)",
        )
        .await
    }

    async fn typing_indicator(&self, chat_id: &str) -> Result<(), AdapterError> {
        let channel_id = ChannelId::new(chat_id.parse().map_err(|_| AdapterError::Send("invalid channel id".into()))?);
        channel_id
            .broadcast_typing(&self.http)
            .await
            .map_err(|err| AdapterError::Send(err.to_string()))
    }
}

struct DiscordEditSink {
    http: Arc<Http>,
    channel_id: ChannelId,
    message_id: serenity::all::MessageId,
}

#[async_trait]
impl EditSink for DiscordEditSink {
    async fn edit(&self, text: &str) -> Result<(), AdapterError> {
        self.channel_id
            .edit_message(&self.http, self.message_id, EditMessage::new().content(text))
            .await
            .map(|_| ())
            .map_err(|err| AdapterError::Send(err.to_string()))
    }

    async fn finalize(&self, text: &str, has_more: bool) -> Result<(), AdapterError> {
        let text = if has_more { format!("{text}{CONTINUATION_MARKER}") } else { text.to_string() };
        self.edit(&text).await
    }

    async fn send_overflow(&self, text: &str, has_more: bool) -> Result<(), AdapterError> {
        let text = if has_more { format!("{text}{CONTINUATION_MARKER}") } else { text.to_string() };
        self.channel_id
            .send_message(&self.http, CreateMessage::new().content(text))
            .await
            .map(|_| ())
            .map_err(|err| AdapterError::Send(err.to_string()))
    }
}
