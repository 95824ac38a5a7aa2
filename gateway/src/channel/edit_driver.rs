//! Shared "post placeholder, edit at most every `editIntervalMs`, one terminal update" loop
//! used by both concrete adapters' `sendStreaming` (§4.I).

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::chunk::chunk_text;
use super::AdapterError;

/// What an adapter's streaming delivery needs to do against its transport; the accumulation and
/// rate-limiting logic lives once, here, instead of being duplicated per adapter.
#[async_trait]
pub trait EditSink: Send + Sync {
    /// Update the in-progress message with the accumulated text so far (a cursor glyph may be
    /// appended by the adapter; this driver never adds one itself).
    async fn edit(&self, text: &str) -> Result<(), AdapterError>;

    /// Final update to the in-progress (placeholder) message: the first chunk of the complete
    /// text, no cursor glyph. `has_more` is true when the text exceeded the transport limit and
    /// `send_overflow` will be called afterward with the remaining tail chunks.
    async fn finalize(&self, text: &str, has_more: bool) -> Result<(), AdapterError>;

    /// Sends one additional message carrying a tail chunk of text that didn't fit in the
    /// finalized placeholder. `has_more` is true when yet another overflow chunk follows this one.
    async fn send_overflow(&self, text: &str, has_more: bool) -> Result<(), AdapterError>;
}

/// Accumulates chunks from `chunks`, calling `sink.edit` no more often than `edit_interval` and
/// at most `max_edits` times. Once the stream ends, the complete text (or `fallback_empty_text`
/// if nothing was produced) is split at `max_len` the same way a one-shot `send` would: the first
/// piece finalizes the placeholder, and any remaining pieces are delivered as additional messages
/// via `sink.send_overflow`, matching `ChannelAdapter::send_streaming`'s truncation contract.
pub async fn drive(
    mut chunks: mpsc::Receiver<String>,
    edit_interval: Duration,
    max_edits: u32,
    max_len: usize,
    sink: &dyn EditSink,
    fallback_empty_text: &str,
) -> Result<(), AdapterError> {
    let mut accumulated = String::new();
    let mut edits_done: u32 = 0;
    let mut last_edit = tokio::time::Instant::now()
        .checked_sub(edit_interval)
        .unwrap_or_else(tokio::time::Instant::now);

    while let Some(chunk) = chunks.recv().await {
        accumulated.push_str(&chunk);
        if edits_done >= max_edits {
            continue;
        }
        let now = tokio::time::Instant::now();
        if now.duration_since(last_edit) < edit_interval {
            continue;
        }
        sink.edit(&accumulated).await?;
        edits_done += 1;
        last_edit = now;
    }

    let final_text = if accumulated.is_empty() {
        fallback_empty_text.to_string()
    } else {
        accumulated
    };

    let parts = chunk_text(&final_text, max_len);
    let last_idx = parts.len().saturating_sub(1);
    for (i, part) in parts.iter().enumerate() {
        let has_more = i < last_idx;
        if i == 0 {
            sink.finalize(part, has_more).await?;
        } else {
            sink.send_overflow(part, has_more).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct RecordingSink {
        edits: Mutex<Vec<String>>,
        finalized: Mutex<Option<String>>,
        overflow: Mutex<Vec<String>>,
        edit_calls: AtomicU32,
    }

    impl RecordingSink {
        fn new() -> Self {
            RecordingSink {
                edits: Mutex::new(vec![]),
                finalized: Mutex::new(None),
                overflow: Mutex::new(vec![]),
                edit_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl EditSink for RecordingSink {
        async fn edit(&self, text: &str) -> Result<(), AdapterError> {
            self.edit_calls.fetch_add(1, Ordering::SeqCst);
            self.edits.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn finalize(&self, text: &str, _has_more: bool) -> Result<(), AdapterError> {
            *self.finalized.lock().unwrap() = Some(text.to_string());
            Ok(())
        }

        async fn send_overflow(&self, text: &str, _has_more: bool) -> Result<(), AdapterError> {
            self.overflow.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn bounds_edits_and_always_finalizes() {
        let sink = RecordingSink::new();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for part in ["Hel", "lo ", "world"] {
                let _ = tx.send(part.to_string()).await;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        drive(rx, Duration::from_millis(1), 1, 1000, &sink, "no response").await.unwrap();

        assert!(sink.edit_calls.load(Ordering::SeqCst) <= 1);
        assert_eq!(sink.finalized.lock().unwrap().as_deref(), Some("Hello world"));
        assert!(sink.overflow.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_stream_finalizes_with_fallback() {
        let sink = RecordingSink::new();
        let (_tx, rx) = mpsc::channel(16);
        drive(rx, Duration::from_millis(100), 10, 1000, &sink, "no response").await.unwrap();
        assert_eq!(sink.finalized.lock().unwrap().as_deref(), Some("no response"));
        assert!(sink.overflow.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn final_text_over_max_len_is_chunked_into_overflow_sends() {
        let sink = RecordingSink::new();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let _ = tx.send("Hello world".to_string()).await;
        });

        drive(rx, Duration::from_millis(100), 10, 5, &sink, "no response").await.unwrap();

        assert_eq!(sink.finalized.lock().unwrap().as_deref(), Some("Hello"));
        assert_eq!(
            sink.overflow.lock().unwrap().as_slice(),
            &[" worl".to_string(), "d".to_string()]
        );
    }
}
