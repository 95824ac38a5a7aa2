//! Typed shape of the Gateway's YAML configuration (see the schema in the crate docs).

use serde::Deserialize;
use std::collections::HashMap;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    18900
}

fn default_true() -> bool {
    true
}

fn default_max_idle_hours() -> u64 {
    24
}

fn default_cleanup_interval_seconds() -> u64 {
    3600
}

fn default_account_id() -> String {
    "default".to_string()
}

fn default_max_requests() -> u32 {
    10
}

fn default_window_seconds() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    #[serde(default = "default_max_idle_hours")]
    pub max_idle_hours: u64,
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_idle_hours: default_max_idle_hours(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GatewaySection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub hot_reload: bool,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            hot_reload: true,
            verbose: false,
            auth: AuthConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
        }
    }
}

/// Per-channel configuration block, e.g. `channels.telegram` or `channels.discord`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_account_id")]
    pub account_id: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub require_mention: Option<bool>,
    #[serde(default)]
    pub allowed_guilds: Option<Vec<i64>>,
    #[serde(default)]
    pub respond_to_dms: Option<bool>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Any channel-specific key this schema does not name yet; carried verbatim.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub channels: HashMap<String, ChannelConfig>,
}

impl GatewayConfig {
    pub fn channel(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels.get(name)
    }

    pub fn enabled_channels(&self) -> impl Iterator<Item = (&String, &ChannelConfig)> {
        self.channels.iter().filter(|(_, c)| c.enabled)
    }
}
