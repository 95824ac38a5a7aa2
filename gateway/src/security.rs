//! Per-channel allow/deny lists, sliding-window rate limits, content validation (§4.D).

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use config::{ChannelConfig, GatewayConfig};

const MAX_CONTENT_LEN: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Blacklisted,
    NotWhitelisted,
    RateLimited,
    ContentTooLong,
}

#[derive(Debug, Clone)]
struct AccessLists {
    whitelist: Vec<String>,
    blacklist: Vec<String>,
    max_requests: u32,
    window: Duration,
}

impl From<&ChannelConfig> for AccessLists {
    fn from(c: &ChannelConfig) -> Self {
        Self {
            whitelist: c.whitelist.clone(),
            blacklist: c.blacklist.clone(),
            max_requests: c.rate_limit.max_requests,
            window: Duration::from_secs(c.rate_limit.window_seconds),
        }
    }
}

/// Enforces per-channel access lists, sliding-window rate limits, and content-length validation.
pub struct SecurityManager {
    lists: RwLock<HashMap<String, AccessLists>>,
    rate_state: Mutex<HashMap<(String, String), VecDeque<Instant>>>,
}

impl SecurityManager {
    pub fn new(config: &GatewayConfig) -> Self {
        let lists = config
            .channels
            .iter()
            .map(|(name, c)| (name.clone(), AccessLists::from(c)))
            .collect();
        Self {
            lists: RwLock::new(lists),
            rate_state: Mutex::new(HashMap::new()),
        }
    }

    /// Access check: blacklist wins over whitelist; an empty whitelist means "everyone allowed".
    pub fn check_access(&self, channel: &str, user_id: &str) -> Result<(), Denial> {
        let lists = self.lists.read().unwrap();
        let Some(entry) = lists.get(channel) else {
            return Ok(());
        };
        if entry.blacklist.iter().any(|u| u == user_id) {
            return Err(Denial::Blacklisted);
        }
        if !entry.whitelist.is_empty() && !entry.whitelist.iter().any(|u| u == user_id) {
            return Err(Denial::NotWhitelisted);
        }
        Ok(())
    }

    /// Sliding-window rate check: drops timestamps older than the window, then allows the call
    /// only if fewer than `max_requests` remain; on allow, records `now`.
    pub fn check_rate_limit(&self, channel: &str, user_id: &str) -> Result<(), Denial> {
        let (max_requests, window) = {
            let lists = self.lists.read().unwrap();
            match lists.get(channel) {
                Some(e) => (e.max_requests, e.window),
                None => return Ok(()),
            }
        };

        let key = (channel.to_string(), user_id.to_string());
        let now = Instant::now();
        let mut state = self.rate_state.lock().unwrap();
        let timestamps = state.entry(key).or_default();
        while let Some(front) = timestamps.front() {
            if now.duration_since(*front) > window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
        if timestamps.len() as u32 >= max_requests {
            return Err(Denial::RateLimited);
        }
        timestamps.push_back(now);
        Ok(())
    }

    pub fn validate_content(&self, content: &str) -> Result<(), Denial> {
        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(Denial::ContentTooLong);
        }
        Ok(())
    }

    /// Runs all three checks in the order named by §4.D; returns the first denial encountered.
    pub fn check(&self, channel: &str, user_id: &str, content: &str) -> Result<(), Denial> {
        self.check_access(channel, user_id)?;
        self.check_rate_limit(channel, user_id)?;
        self.validate_content(content)?;
        Ok(())
    }

    /// Output sanitization hook; identity by default (§4.D).
    pub fn sanitize_output(&self, text: &str) -> String {
        text.to_string()
    }

    /// Atomically replaces every channel's access lists and rate-limit thresholds from a new
    /// configuration. Rate-limit history for existing `(channel, user)` pairs is preserved.
    pub fn reload_config(&self, config: &GatewayConfig) {
        let lists = config
            .channels
            .iter()
            .map(|(name, c)| (name.clone(), AccessLists::from(c)))
            .collect();
        *self.lists.write().unwrap() = lists;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn config_with(channel: &str, whitelist: Vec<&str>, blacklist: Vec<&str>, max_requests: u32, window_seconds: u64) -> GatewayConfig {
        let mut channels = Map::new();
        channels.insert(
            channel.to_string(),
            ChannelConfig {
                enabled: true,
                account_id: "default".into(),
                token: String::new(),
                whitelist: whitelist.into_iter().map(String::from).collect(),
                blacklist: blacklist.into_iter().map(String::from).collect(),
                require_mention: None,
                allowed_guilds: None,
                respond_to_dms: None,
                rate_limit: config::RateLimitConfig {
                    max_requests,
                    window_seconds,
                },
                extra: Map::new(),
            },
        );
        GatewayConfig {
            gateway: Default::default(),
            channels,
        }
    }

    #[test]
    fn blacklisted_user_denied_even_if_whitelisted() {
        let cfg = config_with("telegram", vec!["U1"], vec!["U1"], 10, 60);
        let sm = SecurityManager::new(&cfg);
        assert_eq!(sm.check_access("telegram", "U1"), Err(Denial::Blacklisted));
    }

    #[test]
    fn non_whitelisted_user_denied_when_whitelist_present() {
        let cfg = config_with("telegram", vec!["U1"], vec![], 10, 60);
        let sm = SecurityManager::new(&cfg);
        assert_eq!(sm.check_access("telegram", "U2"), Err(Denial::NotWhitelisted));
        assert_eq!(sm.check_access("telegram", "U1"), Ok(()));
    }

    #[test]
    fn empty_whitelist_allows_everyone() {
        let cfg = config_with("telegram", vec![], vec![], 10, 60);
        let sm = SecurityManager::new(&cfg);
        assert_eq!(sm.check_access("telegram", "anyone"), Ok(()));
    }

    #[test]
    fn rate_limit_allows_up_to_max_then_denies() {
        let cfg = config_with("telegram", vec![], vec![], 2, 60);
        let sm = SecurityManager::new(&cfg);
        assert_eq!(sm.check_rate_limit("telegram", "U1"), Ok(()));
        assert_eq!(sm.check_rate_limit("telegram", "U1"), Ok(()));
        assert_eq!(sm.check_rate_limit("telegram", "U1"), Err(Denial::RateLimited));
    }

    #[test]
    fn content_length_boundary() {
        let cfg = config_with("telegram", vec![], vec![], 10, 60);
        let sm = SecurityManager::new(&cfg);
        let ok = "a".repeat(10_000);
        let too_long = "a".repeat(10_001);
        assert_eq!(sm.validate_content(&ok), Ok(()));
        assert_eq!(sm.validate_content(&too_long), Err(Denial::ContentTooLong));
    }

    #[test]
    fn sanitize_output_is_identity_by_default() {
        let cfg = config_with("telegram", vec![], vec![], 10, 60);
        let sm = SecurityManager::new(&cfg);
        assert_eq!(sm.sanitize_output("hello"), "hello");
    }

    #[test]
    fn reload_config_replaces_lists_atomically() {
        let cfg = config_with("telegram", vec![], vec!["U1"], 10, 60);
        let sm = SecurityManager::new(&cfg);
        assert_eq!(sm.check_access("telegram", "U1"), Err(Denial::Blacklisted));

        let new_cfg = config_with("telegram", vec![], vec![], 10, 60);
        sm.reload_config(&new_cfg);
        assert_eq!(sm.check_access("telegram", "U1"), Ok(()));
    }
}
