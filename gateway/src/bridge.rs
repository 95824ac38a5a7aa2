//! Owns the mapping from `(channel, userId)` to Agent session; invokes the Agent (§4.G).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gateway_types::{session_key, ChannelSession};
use serde_json::Map;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// A message handed to the Agent: the user's text plus any locally-staged attachment paths.
#[derive(Debug, Clone)]
pub struct UserMessage {
    pub content: String,
    pub attachments: Vec<String>,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgentBridgeError {
    #[error("agent error: {0}")]
    Agent(String),
    #[error("session not found for key {0}")]
    SessionNotFound(String),
}

/// The Agent runtime is a black-box collaborator (§1): a callable that consumes a
/// [`UserMessage`] and returns its final text, optionally streaming chunks through `on_chunk`
/// as it goes.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn communicate(&self, msg: UserMessage) -> Result<String, AgentBridgeError>;

    async fn communicate_streaming(
        &self,
        msg: UserMessage,
        on_chunk: mpsc::Sender<String>,
    ) -> Result<String, AgentBridgeError> {
        // Default: no incremental chunks, just the final text relayed as one chunk.
        let text = self.communicate(msg).await?;
        let _ = on_chunk.send(text.clone()).await;
        Ok(text)
    }
}

struct SessionEntry {
    session: ChannelSession,
    metadata: Map<String, serde_json::Value>,
    stream_sender: Option<mpsc::Sender<String>>,
}

/// Owns the session map. `getOrCreateContext` is atomic under concurrent first-use; all other
/// operations are thread-safe via a single exclusive lock.
pub struct AgentBridge {
    agent: Arc<dyn Agent>,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl AgentBridge {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self {
            agent,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the existing session for `(channel, userId)`, or creates one. A single session is
    /// created per key even under concurrent first-use since the whole check-then-insert runs
    /// under one lock. On hit, `lastActivity` is refreshed.
    pub async fn get_or_create_context(
        &self,
        channel: &str,
        user_id: &str,
        chat_id: &str,
        user_name: Option<String>,
    ) -> ChannelSession {
        let key = session_key(channel, user_id);
        let mut guard = self.sessions.lock().await;
        let entry = guard.entry(key).or_insert_with(|| SessionEntry {
            session: ChannelSession::new(channel, user_id, chat_id, user_name.clone()),
            metadata: Map::new(),
            stream_sender: None,
        });
        entry.session.touch();
        if entry.session.user_name.is_none() {
            entry.session.user_name = user_name;
        }
        entry.session.clone()
    }

    /// Builds a `UserMessage`, stores the channel metadata, registers the stream callback for
    /// the session's lifetime (cleared afterward regardless of outcome), invokes the Agent, and
    /// returns its final text. `attachments` must already be local paths, never URLs (§3).
    pub async fn process_message(
        &self,
        channel: &str,
        user_id: &str,
        chat_id: &str,
        content: &str,
        user_name: Option<String>,
        attachments: Vec<String>,
        metadata: Option<Map<String, serde_json::Value>>,
        stream_sender: Option<mpsc::Sender<String>>,
    ) -> Result<String, AgentBridgeError> {
        let key = session_key(channel, user_id);
        self.get_or_create_context(channel, user_id, chat_id, user_name)
            .await;

        {
            let mut guard = self.sessions.lock().await;
            if let Some(entry) = guard.get_mut(&key) {
                if let Some(metadata) = metadata {
                    entry.metadata = metadata;
                }
                entry.stream_sender = stream_sender.clone();
            }
        }

        let msg = UserMessage {
            content: content.to_string(),
            attachments,
        };

        let result = match stream_sender {
            Some(sender) => self.agent.communicate_streaming(msg, sender).await,
            None => self.agent.communicate(msg).await,
        };

        // Clear the stream callback regardless of outcome (finally-equivalent).
        {
            let mut guard = self.sessions.lock().await;
            if let Some(entry) = guard.get_mut(&key) {
                entry.stream_sender = None;
            }
        }

        result
    }

    /// Streaming variant: spawns a worker that runs `process_message` with a chunk sink, and
    /// returns a bounded channel the caller reads chunks from until the worker finishes. Dropping
    /// the receiver (consumer terminates early) cancels the worker.
    pub fn process_message_stream(
        self: &Arc<Self>,
        channel: String,
        user_id: String,
        chat_id: String,
        content: String,
        user_name: Option<String>,
        attachments: Vec<String>,
        metadata: Option<Map<String, serde_json::Value>>,
    ) -> mpsc::Receiver<String> {
        const QUEUE_CAPACITY: usize = 64;
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            let _ = bridge
                .process_message(
                    &channel,
                    &user_id,
                    &chat_id,
                    &content,
                    user_name,
                    attachments,
                    metadata,
                    Some(tx),
                )
                .await;
        });
        rx
    }

    pub async fn get_session(&self, channel: &str, user_id: &str) -> Option<ChannelSession> {
        let key = session_key(channel, user_id);
        self.sessions.lock().await.get(&key).map(|e| e.session.clone())
    }

    /// Snapshot copy: later bridge mutations cannot affect the returned `Vec`.
    pub async fn list_sessions(&self) -> Vec<ChannelSession> {
        self.sessions
            .lock()
            .await
            .values()
            .map(|e| e.session.clone())
            .collect()
    }

    pub async fn get_sessions_by_channel(&self, channel: &str) -> Vec<ChannelSession> {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|e| e.session.channel == channel)
            .map(|e| e.session.clone())
            .collect()
    }

    pub async fn remove_session(&self, channel: &str, user_id: &str) -> bool {
        let key = session_key(channel, user_id);
        self.sessions.lock().await.remove(&key).is_some()
    }

    pub async fn get_active_session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoAgent {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Agent for EchoAgent {
        async fn communicate(&self, msg: UserMessage) -> Result<String, AgentBridgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("echo: {}", msg.content))
        }
    }

    #[tokio::test]
    async fn same_key_yields_same_session_concurrently() {
        let agent = Arc::new(EchoAgent { calls: AtomicUsize::new(0) });
        let bridge = Arc::new(AgentBridge::new(agent));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let bridge = Arc::clone(&bridge);
            handles.push(tokio::spawn(async move {
                bridge.get_or_create_context("telegram", "42", "chat", None).await
            }));
        }
        let mut ids = std::collections::HashSet::new();
        for h in handles {
            ids.insert(h.await.unwrap().context_id);
        }
        assert_eq!(ids.len(), 1);
        assert_eq!(bridge.get_active_session_count().await, 1);
    }

    #[tokio::test]
    async fn created_at_le_last_activity_and_removal_clears_lookup() {
        let agent = Arc::new(EchoAgent { calls: AtomicUsize::new(0) });
        let bridge = AgentBridge::new(agent);
        let session = bridge.get_or_create_context("discord", "U2", "C1", None).await;
        assert!(session.created_at <= session.last_activity);

        assert!(bridge.remove_session("discord", "U2").await);
        assert!(bridge.get_session("discord", "U2").await.is_none());
    }

    #[tokio::test]
    async fn process_message_invokes_agent_and_returns_final_text() {
        let agent = Arc::new(EchoAgent { calls: AtomicUsize::new(0) });
        let bridge = AgentBridge::new(agent);
        let out = bridge
            .process_message("telegram", "42", "chat", "hello", None, vec![], None, None)
            .await
            .unwrap();
        assert_eq!(out, "echo: hello");
    }

    #[tokio::test]
    async fn list_sessions_is_an_independent_snapshot() {
        let agent = Arc::new(EchoAgent { calls: AtomicUsize::new(0) });
        let bridge = AgentBridge::new(agent);
        bridge.get_or_create_context("telegram", "1", "c", None).await;
        let snapshot = bridge.list_sessions().await;
        bridge.get_or_create_context("telegram", "2", "c", None).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(bridge.list_sessions().await.len(), 2);
    }

    #[tokio::test]
    async fn streaming_variant_yields_chunks_then_closes() {
        struct ChunkAgent;
        #[async_trait]
        impl Agent for ChunkAgent {
            async fn communicate(&self, msg: UserMessage) -> Result<String, AgentBridgeError> {
                Ok(msg.content)
            }
            async fn communicate_streaming(
                &self,
                msg: UserMessage,
                on_chunk: mpsc::Sender<String>,
            ) -> Result<String, AgentBridgeError> {
                for part in ["Hel", "lo"] {
                    let _ = on_chunk.send(part.to_string()).await;
                }
                Ok(msg.content)
            }
        }

        let bridge = Arc::new(AgentBridge::new(Arc::new(ChunkAgent)));
        let mut rx = bridge.process_message_stream(
            "telegram".into(),
            "1".into(),
            "c".into(),
            "Hello".into(),
            None,
            vec![],
            None,
        );
        let mut chunks = Vec::new();
        while let Some(c) = rx.recv().await {
            chunks.push(c);
        }
        assert_eq!(chunks, vec!["Hel".to_string(), "lo".to_string()]);
    }
}
