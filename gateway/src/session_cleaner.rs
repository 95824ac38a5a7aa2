//! Periodic GC of idle bridge sessions (§4.L).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gateway_types::ChannelSession;

use crate::bridge::AgentBridge;

const DEFAULT_CHECK_INTERVAL_SECONDS: u64 = 3600;
const DEFAULT_MAX_IDLE_HOURS: i64 = 24;

pub struct SessionCleaner {
    bridge: Arc<AgentBridge>,
    check_interval: Duration,
    max_idle_hours: i64,
    task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SessionCleaner {
    pub fn new(bridge: Arc<AgentBridge>, check_interval_seconds: Option<u64>, max_idle_hours: Option<u64>) -> Self {
        Self {
            bridge,
            check_interval: Duration::from_secs(check_interval_seconds.unwrap_or(DEFAULT_CHECK_INTERVAL_SECONDS)),
            max_idle_hours: max_idle_hours.map(|h| h as i64).unwrap_or(DEFAULT_MAX_IDLE_HOURS),
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Sessions idle longer than `idle_hours_override` (or the configured default) as of now.
    pub async fn get_idle_sessions(&self, idle_hours_override: Option<i64>) -> Vec<ChannelSession> {
        let threshold = idle_hours_override.unwrap_or(self.max_idle_hours);
        let now = Utc::now();
        self.bridge
            .list_sessions()
            .await
            .into_iter()
            .filter(|s| (now - s.last_activity).num_hours() >= threshold)
            .collect()
    }

    async fn sweep(&self) {
        let idle = self.get_idle_sessions(None).await;
        for session in idle {
            self.bridge.remove_session(&session.channel, &session.channel_user_id).await;
            tracing::info!(channel = %session.channel, user = %session.channel_user_id, "removed idle session");
        }
    }

    pub async fn start(self: &Arc<Self>) {
        let cleaner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleaner.check_interval);
            loop {
                interval.tick().await;
                cleaner.sweep().await;
            }
        });
        *self.task.lock().await = Some(handle);
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{Agent, AgentBridgeError, UserMessage};
    use async_trait::async_trait;

    struct NullAgent;
    #[async_trait]
    impl Agent for NullAgent {
        async fn communicate(&self, _msg: UserMessage) -> Result<String, AgentBridgeError> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn idle_session_is_flagged_by_get_idle_sessions() {
        let bridge = Arc::new(AgentBridge::new(Arc::new(NullAgent)));
        bridge.get_or_create_context("telegram", "1", "c", None).await;
        let cleaner = SessionCleaner::new(Arc::clone(&bridge), Some(3600), Some(0));
        // With a zero-hour threshold, a session created "just now" is already idle >= 0 hours.
        let idle = cleaner.get_idle_sessions(None).await;
        assert_eq!(idle.len(), 1);
    }

    #[tokio::test]
    async fn fresh_session_is_not_idle_under_a_normal_threshold() {
        let bridge = Arc::new(AgentBridge::new(Arc::new(NullAgent)));
        bridge.get_or_create_context("telegram", "1", "c", None).await;
        let cleaner = SessionCleaner::new(Arc::clone(&bridge), Some(3600), Some(24));
        assert!(cleaner.get_idle_sessions(None).await.is_empty());
    }

    #[tokio::test]
    async fn sweep_removes_idle_sessions_from_the_bridge() {
        let bridge = Arc::new(AgentBridge::new(Arc::new(NullAgent)));
        bridge.get_or_create_context("telegram", "1", "c", None).await;
        let cleaner = SessionCleaner::new(Arc::clone(&bridge), Some(3600), Some(0));
        cleaner.sweep().await;
        assert_eq!(bridge.get_active_session_count().await, 0);
    }
}
