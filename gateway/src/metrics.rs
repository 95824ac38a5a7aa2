//! Per-channel counters and a global summary (§4.E).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelMetrics {
    pub messages_received: u64,
    pub messages_sent: u64,
    pub errors: u64,
    pub reconnect_count: u64,
    pub last_error: Option<String>,
    pub last_activity: Option<DateTime<Utc>>,
    pub total_response_time_ms: u64,
}

impl ChannelMetrics {
    pub fn average_response_time_ms(&self) -> f64 {
        if self.messages_sent == 0 {
            0.0
        } else {
            self.total_response_time_ms as f64 / self.messages_sent as f64
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub per_channel: HashMap<String, ChannelMetrics>,
    pub total_received: u64,
    pub total_sent: u64,
    pub total_errors: u64,
    pub uptime_seconds: u64,
}

/// Collects per-channel counters: messages received/sent, errors, reconnects, and response
/// latency. All increments happen inside one critical section per record; `summary()` takes a
/// consistent snapshot.
pub struct MetricsCollector {
    started_at: Instant,
    channels: Mutex<HashMap<String, ChannelMetrics>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_received(&self, channel: &str) {
        let mut guard = self.channels.lock().unwrap();
        let m = guard.entry(channel.to_string()).or_default();
        m.messages_received += 1;
        m.last_activity = Some(Utc::now());
    }

    pub fn record_sent(&self, channel: &str, elapsed_ms: u64) {
        let mut guard = self.channels.lock().unwrap();
        let m = guard.entry(channel.to_string()).or_default();
        m.messages_sent += 1;
        m.total_response_time_ms += elapsed_ms;
        m.last_activity = Some(Utc::now());
    }

    pub fn record_error(&self, channel: &str, message: impl Into<String>) {
        let mut guard = self.channels.lock().unwrap();
        let m = guard.entry(channel.to_string()).or_default();
        m.errors += 1;
        m.last_error = Some(message.into());
    }

    pub fn record_reconnect(&self, channel: &str) {
        let mut guard = self.channels.lock().unwrap();
        guard.entry(channel.to_string()).or_default().reconnect_count += 1;
    }

    pub fn summary(&self) -> MetricsSummary {
        let guard = self.channels.lock().unwrap();
        let per_channel = guard.clone();
        let total_received = per_channel.values().map(|m| m.messages_received).sum();
        let total_sent = per_channel.values().map(|m| m.messages_sent).sum();
        let total_errors = per_channel.values().map(|m| m.errors).sum();
        MetricsSummary {
            per_channel,
            total_received,
            total_sent,
            total_errors,
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_response_time_is_zero_with_no_sends() {
        let m = ChannelMetrics::default();
        assert_eq!(m.average_response_time_ms(), 0.0);
    }

    #[test]
    fn average_response_time_divides_total_by_sent_count() {
        let mc = MetricsCollector::new();
        mc.record_sent("telegram", 100);
        mc.record_sent("telegram", 300);
        let summary = mc.summary();
        let tg = &summary.per_channel["telegram"];
        assert_eq!(tg.messages_sent, 2);
        assert_eq!(tg.average_response_time_ms(), 200.0);
    }

    #[test]
    fn summary_aggregates_across_channels() {
        let mc = MetricsCollector::new();
        mc.record_received("telegram");
        mc.record_received("discord");
        mc.record_error("discord", "boom");
        let summary = mc.summary();
        assert_eq!(summary.total_received, 2);
        assert_eq!(summary.total_errors, 1);
        assert_eq!(summary.per_channel["discord"].last_error.as_deref(), Some("boom"));
    }
}
