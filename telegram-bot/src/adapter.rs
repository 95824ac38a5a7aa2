//! Concrete [`ChannelAdapter`] binding to `teloxide` (§4.J).

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use gateway::channel::backoff::ReconnectBackoff;
use gateway::channel::chunk::chunk_text;
use gateway::channel::edit_driver::{drive, EditSink};
use gateway::{AdapterError, AdapterState, AttachmentHandler, ChannelAdapter, InboundHandler, MetricsCollector};
use gateway_types::{Attachment, ChannelCapabilities, InboundMessage, MessageType, OutboundMessage, ParseMode};
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ChatId as TgChatId, InputFile, MessageId, ParseMode as TgParseMode};
use teloxide::{dptree, RequestError};
use tokio::sync::{mpsc, Mutex};

use crate::inbound::{filter_inbound, FilterOutcome};
use crate::CAPABILITIES;

/// Per-account settings the Manager derives from `config::ChannelConfig` when registering this
/// adapter (§4.K).
#[derive(Debug, Clone)]
pub struct TelegramAdapterConfig {
    pub token: String,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
    pub require_mention: Option<bool>,
}

fn to_adapter_error(err: RequestError) -> AdapterError {
    match err {
        RequestError::RetryAfter(d) => AdapterError::RateLimited {
            retry_after_secs: d.seconds() as u64,
        },
        other => AdapterError::Send(other.to_string()),
    }
}

/// Maps our [`ParseMode`] onto Telegram's; callers fall back to [`TgParseMode::MarkdownV2`]
/// escaping rules being the caller's responsibility (§4.J Non-goal: no Markdown re-escaping).
fn tg_parse_mode(mode: ParseMode) -> Option<TgParseMode> {
    match mode {
        ParseMode::Markdown => Some(TgParseMode::MarkdownV2),
        ParseMode::Html => Some(TgParseMode::Html),
        ParseMode::Plain => None,
    }
}

const ATTACHMENT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;

pub struct TelegramAdapter {
    bot: Bot,
    config: TelegramAdapterConfig,
    attachments: Arc<AttachmentHandler>,
    metrics: Arc<MetricsCollector>,
    bot_username: StdMutex<Option<String>>,
    handler: StdMutex<Option<InboundHandler>>,
    state: Arc<StdMutex<AdapterState>>,
    dispatch_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TelegramAdapter {
    pub fn new(config: TelegramAdapterConfig, attachments: Arc<AttachmentHandler>, metrics: Arc<MetricsCollector>) -> Self {
        let bot = Bot::new(config.token.clone());
        Self {
            bot,
            config,
            attachments,
            metrics,
            bot_username: StdMutex::new(None),
            handler: StdMutex::new(None),
            state: Arc::new(StdMutex::new(AdapterState::Created)),
            dispatch_task: Mutex::new(None),
        }
    }

    fn set_state(&self, state: AdapterState) {
        *self.state.lock().unwrap() = state;
    }

    /// Sends one chunk, trying the requested parse mode first and falling back to plain text on
    /// a formatting rejection from the API (§4.J send step 2).
    async fn send_chunk(&self, chat_id: TgChatId, text: &str, mode: ParseMode) -> Result<(), AdapterError> {
        let mut request = self.bot.send_message(chat_id, text);
        if let Some(tg_mode) = tg_parse_mode(mode) {
            request = request.parse_mode(tg_mode);
        }
        match request.await {
            Ok(_) => Ok(()),
            Err(_) if mode != ParseMode::Plain => {
                self.bot
                    .send_message(chat_id, text)
                    .await
                    .map(|_| ())
                    .map_err(to_adapter_error)
            }
            Err(err) => Err(to_adapter_error(err)),
        }
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn name(&self) -> &str {
        "telegram"
    }

    fn capabilities(&self) -> ChannelCapabilities {
        CAPABILITIES
    }

    fn on_message(&self, handler: InboundHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    async fn start(&self) -> Result<(), AdapterError> {
        let me = self.bot.get_me().await.map_err(to_adapter_error)?;
        *self.bot_username.lock().unwrap() = me.user.username.clone();

        let handler = self
            .handler
            .lock()
            .unwrap()
            .clone()
            .ok_or(AdapterError::NotConnected)?;
        let inbound_cfg = Arc::new(self.config.clone());
        let bot_username = me.user.username.clone().unwrap_or_default();
        let attachments = Arc::clone(&self.attachments);
        let metrics = Arc::clone(&self.metrics);
        let state = Arc::clone(&self.state);
        let bot = self.bot.clone();

        let dispatch = tokio::spawn(async move {
            let mut backoff = ReconnectBackoff::new();
            loop {
                let tree = dptree::entry().branch(Update::filter_message().endpoint({
                    let handler = handler.clone();
                    let cfg = Arc::clone(&inbound_cfg);
                    let bot_username = bot_username.clone();
                    let attachments = Arc::clone(&attachments);
                    move |bot: Bot, msg: Message| {
                        let handler = handler.clone();
                        let cfg = Arc::clone(&cfg);
                        let bot_username = bot_username.clone();
                        let attachments = Arc::clone(&attachments);
                        async move {
                            on_update(bot, msg, handler, cfg, bot_username, attachments).await;
                            respond(())
                        }
                    }
                }));
                Dispatcher::builder(bot.clone(), tree).build().dispatch().await;

                // teloxide's long-poll loop only returns on a persistent failure (e.g. a revoked
                // token); transient network errors are retried internally by the dispatcher.
                metrics.record_reconnect("telegram");
                match backoff.next_delay() {
                    Some(delay) => {
                        *state.lock().unwrap() = AdapterState::Reconnecting;
                        tracing::warn!(attempt = backoff.attempts(), delay_secs = delay.as_secs(), "telegram dispatcher exited; reconnecting");
                        tokio::time::sleep(delay).await;
                        *state.lock().unwrap() = AdapterState::Connected;
                        backoff.reset();
                    }
                    None => {
                        tracing::error!("telegram dispatcher exhausted reconnect attempts; giving up");
                        *state.lock().unwrap() = AdapterState::Stopped;
                        break;
                    }
                }
            }
        });
        *self.dispatch_task.lock().await = Some(dispatch);
        self.set_state(AdapterState::Connected);
        Ok(())
    }

    async fn stop(&self) -> Result<(), AdapterError> {
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
        let chat_id = TgChatId(chat_id.parse().map_err(|_| AdapterError::Send("invalid chat id".into()))?);
        let max_len = CAPABILITIES.chunk_len();

        for chunk in chunk_text(&message.content, max_len) {
            self.send_chunk(chat_id, &chunk, message.parse_mode).await?;
        }

        for attachment in &message.attachments {
            let Some(path) = attachment.local_path.as_ref() else { continue };
            let input = InputFile::file(path);
            let result = match attachment.kind {
                MessageType::Image => self.bot.send_photo(chat_id, input).await.map(|_| ()),
                MessageType::Audio => self.bot.send_voice(chat_id, input).await.map(|_| ()),
                MessageType::Video => self.bot.send_video(chat_id, input).await.map(|_| ()),
                MessageType::File | MessageType::Text => self.bot.send_document(chat_id, input).await.map(|_| ()),
            };
            result.map_err(to_adapter_error)?;
        }
        Ok(())
    }

    async fn send_streaming(
        &self,
        chat_id: &str,
        chunks: mpsc::Receiver<String>,
        reply_to_id: Option<String>,
    ) -> Result<(), AdapterError> {
        let tg_chat_id = TgChatId(chat_id.parse().map_err(|_| AdapterError::Send("invalid chat id".into()))?);

        let mut placeholder = self.bot.send_message(tg_chat_id, "\u{1F914} \u{601D}\u{8003}\u{4E2D}\u{2026}");
        if let Some(reply_to) = reply_to_id.as_ref().and_then(|id| id.parse::<i32>().ok()) {
            placeholder = placeholder.reply_to_message_id(MessageId(reply_to));
        }
        let sent = placeholder.await.map_err(to_adapter_error)?;

        let sink = TelegramEditSink {
            bot: self.bot.clone(),
            chat_id: tg_chat_id,
            message_id: sent.id,
        };

        drive(
            chunks,
            Duration::from_millis(CAPABILITIES.edit_rate_limit_ms),
            30,
            CAPABILITIES.chunk_len(),
            &sink,
            "(no response)",
        )
        .await
    }

    async fn typing_indicator(&self, chat_id: &str) -> Result<(), AdapterError> {
        let chat_id = TgChatId(chat_id.parse().map_err(|_| AdapterError::Send("invalid chat id".into()))?);
        self.bot
            .send_chat_action(chat_id, ChatAction::Typing)
            .await
            .map(|_| ())
            .map_err(to_adapter_error)
    }
}

struct TelegramEditSink {
    bot: Bot,
    chat_id: TgChatId,
    message_id: MessageId,
}

#[async_trait]
impl EditSink for TelegramEditSink {
    async fn edit(&self, text: &str) -> Result<(), AdapterError> {
        match self.bot.edit_message_text(self.chat_id, self.message_id, text).await {
            Ok(_) => Ok(()),
            // Telegram rejects a no-op edit; that's not a delivery failure.
            Err(RequestError::Api(teloxide::ApiError::MessageNotModified)) => Ok(()),
            Err(err) => Err(to_adapter_error(err)),
        }
    }

    async fn finalize(&self, text: &str, _has_more: bool) -> Result<(), AdapterError> {
        match self.bot.edit_message_text(self.chat_id, self.message_id, text).await {
            Ok(_) => Ok(()),
            Err(RequestError::Api(teloxide::ApiError::MessageNotModified)) => Ok(()),
            Err(err) => Err(to_adapter_error(err)),
        }
    }

    async fn send_overflow(&self, text: &str, _has_more: bool) -> Result<(), AdapterError> {
        self.bot
            .send_message(self.chat_id, text)
            .await
            .map(|_| ())
            .map_err(to_adapter_error)
    }
}

async fn on_update(
    bot: Bot,
    msg: Message,
    handler: InboundHandler,
    config: Arc<TelegramAdapterConfig>,
    bot_username: String,
    attachments: Arc<AttachmentHandler>,
) {
    // Text messages carry `text()`; photo/document messages carry their text (if any) in
    // `caption()` instead. A message with neither is ignored (stickers, polls, etc.).
    let Some(raw_text) = msg.text().or_else(|| msg.caption()) else { return };
    let Some(from) = msg.from() else { return };

    let user_id = from.id.0.to_string();
    let is_group = msg.chat.is_group() || msg.chat.is_supergroup();

    let outcome = filter_inbound(
        &user_id,
        &config.whitelist,
        &config.blacklist,
        is_group,
        config.require_mention,
        &bot_username,
        raw_text,
    );
    let content = match outcome {
        FilterOutcome::Drop => return,
        FilterOutcome::Accept { content } => content,
    };

    let mut inbound = InboundMessage::new(
        "telegram",
        user_id,
        msg.chat.id.0.to_string(),
        content,
        msg.id.0.to_string(),
    );
    inbound.is_group = is_group;
    inbound.user_name = from.username.clone();

    if let Some(attachment) = download_inbound_attachment(&bot, &msg, &attachments).await {
        inbound.attachments.push(attachment);
    }

    handler(inbound);
}

/// Downloads the largest photo size or a document attached to `msg` into staging (§4.J).
/// Download failures are logged and the message is still delivered without the attachment.
async fn download_inbound_attachment(
    bot: &Bot,
    msg: &Message,
    attachments: &AttachmentHandler,
) -> Option<Attachment> {
    if let Some(sizes) = msg.photo() {
        let largest = sizes.last()?;
        let file = match bot.get_file(&largest.file.id).await {
            Ok(f) => f,
            Err(err) => {
                tracing::error!(error = %err, "failed to resolve telegram photo file");
                return None;
            }
        };
        let url = format!("https://api.telegram.org/file/bot{}/{}", bot.token(), file.path);
        return match attachments
            .download_from_url(&url, Some("photo.jpg"), ATTACHMENT_DOWNLOAD_TIMEOUT_SECS)
            .await
        {
            Ok(local_path) => Some(Attachment::with_local_path(MessageType::Image, local_path)),
            Err(err) => {
                tracing::error!(error = %err, "failed to download telegram photo");
                None
            }
        };
    }

    if let Some(doc) = msg.document() {
        let file = match bot.get_file(&doc.file.id).await {
            Ok(f) => f,
            Err(err) => {
                tracing::error!(error = %err, "failed to resolve telegram document file");
                return None;
            }
        };
        let url = format!("https://api.telegram.org/file/bot{}/{}", bot.token(), file.path);
        return match attachments
            .download_from_url(&url, doc.file_name.as_deref(), ATTACHMENT_DOWNLOAD_TIMEOUT_SECS)
            .await
        {
            Ok(local_path) => {
                let mut attachment = Attachment::with_local_path(MessageType::File, local_path);
                attachment.filename = doc.file_name.clone();
                attachment.mime_type = doc.mime_type.as_ref().map(|m| m.to_string());
                attachment.size = Some(doc.file.size as i64);
                Some(attachment)
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to download telegram document");
                None
            }
        };
    }

    None
}
