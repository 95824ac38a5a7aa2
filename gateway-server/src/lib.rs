//! Composition root and HTTP control plane for the messaging gateway (§4.M, §10.C).
//!
//! Used by the `gateway-server` binary. Wires configuration, the channel registry, the Agent
//! bridge, and session/attachment housekeeping into a running process, then serves the HTTP
//! control plane described in §6 until a shutdown signal arrives.

mod agent_seam;
pub mod http;
mod log_format;
pub mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use config::GatewayConfig;
use gateway::streaming::{select_for_channel, StreamingMode};
use gateway::{AgentBridge, AttachmentHandler, ChannelManager, MetricsCollector, SecurityManager, SessionCleaner};
use gateway_types::OutboundMessage;
use tokio::sync::RwLock;

const STAGING_DIR: &str = "tmp/uploads";

async fn register_channel(
    manager: &Arc<ChannelManager>,
    name: &str,
    channel_cfg: &config::ChannelConfig,
    attachments: &Arc<AttachmentHandler>,
    metrics: &Arc<MetricsCollector>,
    start_immediately: bool,
) {
    match name {
        "telegram" => {
            let adapter = Arc::new(telegram_bot::TelegramAdapter::new(
                telegram_bot::TelegramAdapterConfig {
                    token: channel_cfg.token.clone(),
                    whitelist: channel_cfg.whitelist.clone(),
                    blacklist: channel_cfg.blacklist.clone(),
                    require_mention: channel_cfg.require_mention,
                },
                Arc::clone(attachments),
                Arc::clone(metrics),
            ));
            install_and_register(manager, adapter, start_immediately).await;
        }
        "discord" => {
            let adapter = Arc::new(discord_bot::DiscordAdapter::new(
                discord_bot::DiscordAdapterConfig {
                    token: channel_cfg.token.clone(),
                    whitelist: channel_cfg.whitelist.clone(),
                    blacklist: channel_cfg.blacklist.clone(),
                    require_mention: channel_cfg.require_mention,
                    allowed_guilds: channel_cfg.allowed_guilds.clone(),
                    respond_to_dms: channel_cfg.respond_to_dms,
                },
                Arc::clone(attachments),
                Arc::clone(metrics),
            ));
            install_and_register(manager, adapter, start_immediately).await;
        }
        other => {
            tracing::warn!(channel = other, "no adapter implementation for this channel name; skipping");
        }
    }
}

/// Registers and starts every channel name in `names` (the newly-appeared channels a config
/// reload introduced), so an enabled-at-runtime channel comes up on the same tick rather than
/// waiting for the next reload (SPEC_FULL §4.K/§9). Only the newly-registered adapters are
/// started here — unlike the startup path's blanket `start_all`, this must not re-start channels
/// that were already registered and running before this reload.
async fn register_and_start_new_channels(
    manager: &Arc<ChannelManager>,
    new_config: &GatewayConfig,
    attachments: &Arc<AttachmentHandler>,
    metrics: &Arc<MetricsCollector>,
    names: &[String],
) {
    for name in names {
        let Some(channel_cfg) = new_config.channels.get(name) else { continue };
        register_channel(manager, name, channel_cfg, attachments, metrics, true).await;
    }
}

/// How often the Manager refreshes a channel's "is typing…" signal while an Agent call is in
/// flight (§4.J, §9) — independent of the per-channel edit cadence used once a reply exists.
const TYPING_REFRESH_INTERVAL: Duration = Duration::from_secs(4);

/// Installs the routing closure on `adapter` then registers it with the manager. The closure
/// runs the fixed inbound pipeline while keeping a typing indicator alive, then delivers the
/// reply back through the very same adapter instance that produced the inbound message: as a
/// live-edited placeholder when the channel supports it, as a plain send otherwise. Any
/// image attachments the response carries are always delivered as a distinct follow-up send,
/// since an in-place edit cannot attach media.
///
/// `start_immediately` starts this one adapter right away (used by the reload path, where only
/// the newly-registered adapter should come up); the initial startup path instead leaves
/// starting to the caller's single `start_all` fan-out over every registered channel.
async fn install_and_register<A: gateway::ChannelAdapter + 'static>(
    manager: &Arc<ChannelManager>,
    adapter: Arc<A>,
    start_immediately: bool,
) {
    let manager_for_handler = Arc::clone(manager);
    let adapter_for_handler = Arc::clone(&adapter);
    let channel_name = adapter.name().to_string();
    let caps = adapter.capabilities();
    let mode = select_for_channel(&channel_name, &caps);
    adapter.on_message(Arc::new(move |inbound| {
        let manager = Arc::clone(&manager_for_handler);
        let adapter = Arc::clone(&adapter_for_handler);
        tokio::spawn(async move {
            deliver(manager, adapter, inbound, mode).await;
        });
    }));
    manager.register(Arc::clone(&adapter) as Arc<dyn gateway::ChannelAdapter>).await;
    tracing::info!(channel = %channel_name, "registered channel adapter");

    if start_immediately {
        if let Err(err) = adapter.start().await {
            tracing::error!(channel = %channel_name, error = %err, "channel failed to start");
        }
    }
}

/// Runs the fixed routing pipeline for a single inbound message, refreshing the channel's typing
/// indicator while the Agent call is in flight, then delivers whatever reply (if any) it yields.
async fn deliver<A: gateway::ChannelAdapter + ?Sized>(
    manager: Arc<ChannelManager>,
    adapter: Arc<A>,
    inbound: gateway_types::InboundMessage,
    mode: StreamingMode,
) {
    let chat_id = inbound.channel_chat_id.clone();
    let reply_to_id = Some(inbound.message_id.clone());
    let lang = gateway::Language::En;

    let typing_adapter = Arc::clone(&adapter);
    let typing_chat_id = chat_id.clone();
    let typing_task = tokio::spawn(async move {
        loop {
            tokio::time::sleep(TYPING_REFRESH_INTERVAL).await;
            let _ = typing_adapter.typing_indicator(&typing_chat_id).await;
        }
    });

    let outbound = manager.route(inbound, lang).await;
    typing_task.abort();

    let Some(outbound) = outbound else { return };

    let delivered = match mode {
        StreamingMode::EditMessage { .. } => {
            let (tx, rx) = tokio::sync::mpsc::channel(1);
            let _ = tx.send(outbound.content.clone()).await;
            drop(tx);
            adapter.send_streaming(&chat_id, rx, reply_to_id).await
        }
        _ => adapter.send(&chat_id, OutboundMessage::text(outbound.content.clone())).await,
    };
    if let Err(err) = delivered {
        tracing::error!(channel = %adapter.name(), error = %err, "failed to deliver routed reply");
        return;
    }

    if !outbound.attachments.is_empty() {
        let mut follow_up = OutboundMessage::text(String::new());
        follow_up.attachments = outbound.attachments;
        follow_up.parse_mode = outbound.parse_mode;
        if let Err(err) = adapter.send(&chat_id, follow_up).await {
            tracing::error!(channel = %adapter.name(), error = %err, "failed to deliver reply attachments");
        }
    }
}

/// Composition root, in the order named by §4.M. Runs until a shutdown signal is observed, then
/// reverses the startup sequence before returning.
pub async fn run(gateway_config: GatewayConfig, config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let started_at = Instant::now();

    let metrics = Arc::new(MetricsCollector::new());
    let security = Arc::new(SecurityManager::new(&gateway_config));

    let attachments = Arc::new(AttachmentHandler::new(STAGING_DIR)?);
    attachments.start_cleanup_task(None).await;

    let agent = agent_seam::build_agent();
    let bridge = Arc::new(AgentBridge::new(agent));

    let manager = Arc::new(ChannelManager::new(Arc::clone(&bridge), Arc::clone(&security), Arc::clone(&metrics)));

    for (name, channel_cfg) in gateway_config.enabled_channels() {
        register_channel(&manager, name, channel_cfg, &attachments, &metrics, false).await;
    }
    manager.start_all().await;

    let cleaner = Arc::new(SessionCleaner::new(
        Arc::clone(&bridge),
        Some(gateway_config.gateway.session.cleanup_interval_seconds),
        Some(gateway_config.gateway.session.max_idle_hours),
    ));
    cleaner.start().await;

    let config_lock = Arc::new(RwLock::new(gateway_config.clone()));
    let _watcher = if gateway_config.gateway.hot_reload {
        let manager_for_watch = Arc::clone(&manager);
        let security_for_watch = Arc::clone(&security);
        let config_for_watch = Arc::clone(&config_lock);
        let attachments_for_watch = Arc::clone(&attachments);
        let metrics_for_watch = Arc::clone(&metrics);
        let watch_path = config_path.clone();
        Some(config::ConfigWatcher::spawn(watch_path, move |new_config| {
            let manager = Arc::clone(&manager_for_watch);
            let security = Arc::clone(&security_for_watch);
            let config_lock = Arc::clone(&config_for_watch);
            let attachments = Arc::clone(&attachments_for_watch);
            let metrics = Arc::clone(&metrics_for_watch);
            tokio::spawn(async move {
                let old_config = config_lock.read().await.clone();
                security.reload_config(&new_config);
                let newly_appeared = manager.apply_config_change(&old_config, &new_config).await;
                if !newly_appeared.is_empty() {
                    register_and_start_new_channels(&manager, &new_config, &attachments, &metrics, &newly_appeared).await;
                }
                *config_lock.write().await = new_config;
            });
        })?)
    } else {
        None
    };

    let state = Arc::new(http::AppState {
        bridge: Arc::clone(&bridge),
        manager: Arc::clone(&manager),
        metrics: Arc::clone(&metrics),
        security: Arc::clone(&security),
        attachments: Arc::clone(&attachments),
        config: Arc::clone(&config_lock),
        config_path,
        auth_token: gateway_config.gateway.auth.token.clone(),
        started_at,
    });

    let addr = format!("{}:{}", gateway_config.gateway.host, gateway_config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(gateway::GatewayError::Bind)?;
    tracing::info!(addr = %addr, "gateway control plane listening");

    let serve = axum::serve(listener, http::router(state));

    tokio::select! {
        result = serve => {
            if let Err(err) = result {
                tracing::error!(error = %err, "control plane server exited with an error");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    cleaner.stop().await;
    manager.stop_all().await;
    attachments.stop_cleanup_task().await;

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
