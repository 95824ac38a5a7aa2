//! Splits oversized text into transport-sized chunks (§4.I, §9 unified margin).

/// Safety margin subtracted from a transport's `maxMessageLength` before text must be split,
/// unified across adapters at `96` chars (continuation marker + UTF-8 boundary slack).
pub const CHUNK_SAFETY_MARGIN: usize = gateway_types::ChannelCapabilities::CHUNK_SAFETY_MARGIN;

/// Splits `content` into chunks no longer than `max_len` chars, breaking on a char boundary
/// (never inside a multi-byte UTF-8 sequence). A message exactly `max_len` long is returned as
/// a single chunk.
pub fn chunk_text(content: &str, max_len: usize) -> Vec<String> {
    if content.chars().count() <= max_len {
        return vec![content.to_string()];
    }
    let chars: Vec<char> = content.chars().collect();
    chars
        .chunks(max_len.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_exactly_at_limit_is_one_chunk() {
        let content = "a".repeat(10);
        assert_eq!(chunk_text(&content, 10), vec![content]);
    }

    #[test]
    fn message_one_over_limit_splits_in_two() {
        let content = "a".repeat(11);
        let chunks = chunk_text(&content, 10);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 10);
        assert_eq!(chunks[1].chars().count(), 1);
    }

    #[test]
    fn splits_on_char_boundaries_for_multibyte_text() {
        let content = "你好".repeat(5); // 10 chars, multi-byte each
        let chunks = chunk_text(&content, 4);
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert!(c.chars().count() <= 4);
        }
        assert_eq!(chunks.concat(), content);
    }
}
