//! Registry of adapters; installs the unified inbound handler and runs the routing pipeline
//! (§4.K): dedup → security → metrics → bridge → response extraction → send.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use config::GatewayConfig;
use gateway_types::{Attachment, InboundMessage, MessageType, OutboundMessage, ParseMode};
use regex::Regex;
use serde_json::Map;
use tokio::sync::RwLock;

use crate::bridge::AgentBridge;
use crate::channel::{AdapterError, ChannelAdapter};
use crate::dedup::Deduplicator;
use crate::error_kind::{self, ErrorKind, Language};
use crate::metrics::MetricsCollector;
use crate::security::{Denial, SecurityManager};

/// Well-known staging path prefixes scanned for image attachments in an Agent's response text
/// (§4.K step 7) — a Gateway-only enrichment, not something the Agent is asked to do itself.
fn image_path_pattern() -> Regex {
    Regex::new(r"(?:/a0/|/git/agent-zero/|/app/)\S+?\.(?:jpg|jpeg|png|gif|webp|bmp)").unwrap()
}

fn image_extension_set() -> &'static [&'static str] {
    &["jpg", "jpeg", "png", "gif", "webp", "bmp"]
}

/// Owns the adapter registry and the Deduplicator; runs the fixed inbound pipeline for every
/// registered adapter.
pub struct ChannelManager {
    bridge: Arc<AgentBridge>,
    security: Arc<SecurityManager>,
    metrics: Arc<MetricsCollector>,
    dedup: Deduplicator,
    channels: RwLock<HashMap<String, Arc<dyn ChannelAdapter>>>,
    image_pattern: Regex,
}

impl ChannelManager {
    pub fn new(bridge: Arc<AgentBridge>, security: Arc<SecurityManager>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            bridge,
            security,
            metrics,
            dedup: Deduplicator::default(),
            channels: RwLock::new(HashMap::new()),
            image_pattern: image_path_pattern(),
        }
    }

    pub async fn register(&self, adapter: Arc<dyn ChannelAdapter>) {
        self.channels.write().await.insert(adapter.name().to_string(), adapter);
    }

    pub async fn unregister(&self, name: &str) -> Option<Arc<dyn ChannelAdapter>> {
        self.channels.write().await.remove(name)
    }

    pub async fn channel_names(&self) -> Vec<String> {
        self.channels.read().await.keys().cloned().collect()
    }

    /// Registry snapshot for the HTTP control plane's `/api/channels` (§4.M): each registered
    /// adapter's name and current lifecycle state.
    pub async fn channel_states(&self) -> Vec<(String, crate::channel::AdapterState)> {
        self.channels
            .read()
            .await
            .values()
            .map(|a| (a.name().to_string(), a.state()))
            .collect()
    }

    /// Starts every registered adapter concurrently; a failing adapter is logged and does not
    /// stop the others.
    pub async fn start_all(&self) {
        let adapters: Vec<_> = self.channels.read().await.values().cloned().collect();
        let handles = adapters.into_iter().map(|adapter| {
            tokio::spawn(async move {
                let name = adapter.name().to_string();
                if let Err(err) = adapter.start().await {
                    tracing::error!(channel = %name, error = %err, "channel failed to start");
                }
            })
        });
        futures::future::join_all(handles).await;
    }

    pub async fn stop_all(&self) {
        let adapters: Vec<_> = self.channels.read().await.values().cloned().collect();
        let handles = adapters.into_iter().map(|adapter| {
            tokio::spawn(async move {
                let name = adapter.name().to_string();
                if let Err(err) = adapter.stop().await {
                    tracing::error!(channel = %name, error = %err, "channel failed to stop");
                }
            })
        });
        futures::future::join_all(handles).await;
    }

    /// The fixed routing pipeline installed on every adapter. Returns `None` for duplicates
    /// (no reply owed); `Some(outbound)` otherwise, including denial/error refusals.
    pub async fn route(&self, inbound: InboundMessage, lang: Language) -> Option<OutboundMessage> {
        if self.dedup.is_duplicate(&inbound.message_id, &inbound.channel) {
            return None;
        }

        if let Err(denial) = self.security.check(&inbound.channel, &inbound.channel_user_id, &inbound.content) {
            return Some(OutboundMessage::text(error_kind::format(classify_denial(denial), lang)));
        }

        self.metrics.record_received(&inbound.channel);
        let started = Instant::now();

        let attachment_paths: Vec<String> = inbound
            .attachments
            .iter()
            .filter_map(|a| a.local_path.clone())
            .collect();

        let metadata: Map<String, serde_json::Value> = inbound.metadata.clone();

        let result = self
            .bridge
            .process_message(
                &inbound.channel,
                &inbound.channel_user_id,
                &inbound.channel_chat_id,
                &inbound.content,
                inbound.user_name.clone(),
                attachment_paths,
                Some(metadata),
                None,
            )
            .await;

        match result {
            Ok(text) => {
                self.metrics
                    .record_sent(&inbound.channel, started.elapsed().as_millis() as u64);
                let sanitized = self.security.sanitize_output(&text);
                Some(self.enrich_with_images(sanitized))
            }
            Err(err) => {
                let message = err.to_string();
                self.metrics.record_error(&inbound.channel, message.clone());
                let kind = ErrorKind::classify(&message);
                tracing::event!(target: "gateway::manager", tracing::Level::ERROR, channel = %inbound.channel, error = %message, "agent invocation failed");
                Some(OutboundMessage::text(error_kind::format(kind, lang)))
            }
        }
    }

    /// Scans the response text for well-known staging paths ending in an image extension; each
    /// existing local file is attached as an `Image`. Gateway-only enrichment (§4.K step 7).
    fn enrich_with_images(&self, content: String) -> OutboundMessage {
        let mut attachments = Vec::new();
        for m in self.image_pattern.find_iter(&content) {
            let path = m.as_str();
            if image_extension_set()
                .iter()
                .any(|ext| path.to_ascii_lowercase().ends_with(ext))
                && std::path::Path::new(path).is_file()
            {
                attachments.push(Attachment::with_local_path(MessageType::Image, path));
            }
        }
        OutboundMessage {
            content,
            attachments,
            parse_mode: ParseMode::Markdown,
            reply_to_id: None,
        }
    }

    /// Diffs `new_config` against the current registry (§4.K):
    /// - a token change is logged as requiring restart, never performed silently;
    /// - `enabled=false` stops and unregisters the channel;
    /// - `whitelist`/`blacklist`/`require_mention` reload hot, without restart (handled by the
    ///   Security Manager's own `reload_config`, called by the caller alongside this);
    /// - a channel newly present in config is left for the caller to register and start on this
    ///   same tick (§9 Open Questions).
    pub async fn apply_config_change(&self, old: &GatewayConfig, new_config: &GatewayConfig) -> Vec<String> {
        let mut newly_appeared = Vec::new();
        let registered = self.channel_names().await;

        for (name, new_channel) in &new_config.channels {
            let old_channel = old.channels.get(name);
            match old_channel {
                None => newly_appeared.push(name.clone()),
                Some(old_channel) => {
                    if old_channel.token != new_channel.token {
                        tracing::warn!(channel = %name, "auth token changed; channel requires manual restart to take effect");
                    }
                    if !new_channel.enabled && old_channel.enabled {
                        if let Some(adapter) = self.unregister(name).await {
                            if let Err(err) = adapter.stop().await {
                                tracing::error!(channel = %name, error = %err, "error stopping disabled channel");
                            }
                        }
                    }
                }
            }
        }
        let _ = registered;
        newly_appeared
    }
}

pub fn classify_denial(denial: Denial) -> ErrorKind {
    match denial {
        Denial::Blacklisted | Denial::NotWhitelisted => ErrorKind::AccessDenied,
        Denial::RateLimited => ErrorKind::RateLimit,
        Denial::ContentTooLong => ErrorKind::InvalidMessage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{Agent, AgentBridgeError, UserMessage};
    use async_trait::async_trait;
    use gateway_types::session_key;
    use std::collections::HashMap as Map2;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAgent {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Agent for CountingAgent {
        async fn communicate(&self, msg: UserMessage) -> Result<String, AgentBridgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("you said: {}", msg.content))
        }
    }

    fn base_inbound(channel: &str, message_id: &str, user: &str) -> InboundMessage {
        let mut m = InboundMessage::new(channel, user, "chat1", "hi", message_id);
        m.is_group = false;
        m
    }

    fn config_with_channel(channel: &str, whitelist: Vec<&str>, blacklist: Vec<&str>, max_requests: u32) -> GatewayConfig {
        let mut channels = Map2::new();
        channels.insert(
            channel.to_string(),
            config::ChannelConfig {
                enabled: true,
                account_id: "default".into(),
                token: "t".into(),
                whitelist: whitelist.into_iter().map(String::from).collect(),
                blacklist: blacklist.into_iter().map(String::from).collect(),
                require_mention: None,
                allowed_guilds: None,
                respond_to_dms: None,
                rate_limit: config::RateLimitConfig {
                    max_requests,
                    window_seconds: 60,
                },
                extra: Map2::new(),
            },
        );
        GatewayConfig {
            gateway: Default::default(),
            channels,
        }
    }

    fn manager_with(cfg: &GatewayConfig) -> ChannelManager {
        let agent = Arc::new(CountingAgent { calls: AtomicUsize::new(0) });
        let bridge = Arc::new(AgentBridge::new(agent));
        let security = Arc::new(SecurityManager::new(cfg));
        let metrics = Arc::new(MetricsCollector::new());
        ChannelManager::new(bridge, security, metrics)
    }

    #[tokio::test]
    async fn duplicate_message_is_routed_only_once() {
        let cfg = config_with_channel("telegram", vec![], vec![], 100);
        let manager = manager_with(&cfg);

        let m1 = base_inbound("telegram", "M1", "U1");
        let m2 = base_inbound("telegram", "M1", "U1");

        let r1 = manager.route(m1, Language::En).await;
        let r2 = manager.route(m2, Language::En).await;

        assert!(r1.is_some());
        assert!(r2.is_none());
    }

    #[tokio::test]
    async fn blacklisted_user_gets_zh_refusal_without_hitting_bridge() {
        let cfg = config_with_channel("telegram", vec![], vec!["U1"], 100);
        let manager = manager_with(&cfg);

        let out = manager
            .route(base_inbound("telegram", "M1", "U1"), Language::Zh)
            .await
            .unwrap();
        assert_eq!(out.content, "⚠️ 抱歉，您没有使用权限");
    }

    #[tokio::test]
    async fn rate_limit_denies_third_message_within_window() {
        let cfg = config_with_channel("telegram", vec![], vec![], 2);
        let manager = manager_with(&cfg);

        let r1 = manager.route(base_inbound("telegram", "M1", "U1"), Language::Zh).await.unwrap();
        let r2 = manager.route(base_inbound("telegram", "M2", "U1"), Language::Zh).await.unwrap();
        let r3 = manager.route(base_inbound("telegram", "M3", "U1"), Language::Zh).await.unwrap();

        assert!(r1.content.starts_with("you said") || !r1.content.starts_with('\u{26A0}'));
        assert!(r2.content.starts_with("you said") || !r2.content.starts_with('\u{26A0}'));
        assert_eq!(r3.content, "⚠️ 请求太频繁，请稍后再试 🔄");
    }

    #[tokio::test]
    async fn session_key_is_derived_from_channel_prefix_and_user() {
        assert_eq!(session_key("discord", "U2"), "dc:U2");
    }

    #[tokio::test]
    async fn image_path_is_extracted_when_file_exists() {
        let cfg = config_with_channel("telegram", vec![], vec![], 100);
        let mut manager = manager_with(&cfg);

        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("abcd.png");
        std::fs::write(&image_path, b"png-bytes").unwrap();

        // Swap in a pattern that matches the tempdir path, exercising the same extraction logic
        // the production regex applies to its fixed `/a0/...` style prefixes.
        let escaped = regex::escape(dir.path().to_str().unwrap());
        manager.image_pattern = Regex::new(&format!(r"{escaped}/\S+?\.(?:jpg|jpeg|png|gif|webp|bmp)")).unwrap();

        let content = format!("see {}", image_path.display());
        let outbound = manager.enrich_with_images(content);

        assert_eq!(outbound.attachments.len(), 1);
        assert_eq!(
            outbound.attachments[0].local_path.as_deref(),
            Some(image_path.to_str().unwrap())
        );
    }

    #[tokio::test]
    async fn nonexistent_image_path_is_not_attached() {
        let cfg = config_with_channel("telegram", vec![], vec![], 100);
        let manager = manager_with(&cfg);
        let outbound = manager.enrich_with_images("see /a0/tmp/uploads/missing.png".to_string());
        assert!(outbound.attachments.is_empty());
    }
}
