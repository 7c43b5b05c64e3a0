//! Incremental decoder for `text/event-stream` bodies.
//!
//! `streamGenerateContent?alt=sse` frames each response chunk as one
//! `data: {...}` event terminated by a blank line. Network chunks do not
//! respect line boundaries (nor UTF-8 boundaries), so bytes are buffered until
//! a full line is available.

/// Stateful SSE decoder. Feed raw body bytes with [`SseDecoder::push`]; call
/// [`SseDecoder::finish`] once the body ends.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a body chunk and return the `data` payloads of every event it
    /// completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            if let Some(event) = self.feed_line(line.trim_end_matches(['\n', '\r'])) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&raw).into_owned();
            self.feed_line(line.trim_end_matches(['\n', '\r']));
        }
        if self.data.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.data))
        }
    }

    fn feed_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.data));
        }
        // `event:`, `id:`, `retry:` and comments carry nothing we use.
        if let Some(rest) = line.strip_prefix("data:") {
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_events_split_across_chunks() {
        let mut dec = SseDecoder::new();
        assert!(dec.push(b"data: {\"a\"").is_empty());
        let events = dec.push(b":1}\r\n\r\ndata: {\"b\":2}\n\n");
        assert_eq!(events, vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(dec.finish(), None);
    }

    #[test]
    fn joins_multi_line_data() {
        let mut dec = SseDecoder::new();
        let events = dec.push(b"data: line1\ndata: line2\n\n");
        assert_eq!(events, vec!["line1\nline2"]);
    }

    #[test]
    fn ignores_comments_and_other_fields() {
        let mut dec = SseDecoder::new();
        let events = dec.push(b": keepalive\nevent: message\ndata: x\n\n");
        assert_eq!(events, vec!["x"]);
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut dec = SseDecoder::new();
        assert!(dec.push(b"data: tail").is_empty());
        assert_eq!(dec.finish().as_deref(), Some("tail"));
    }

    #[test]
    fn utf8_split_inside_line_survives() {
        let mut dec = SseDecoder::new();
        let bytes = "data: é\n\n".as_bytes();
        let (a, b) = bytes.split_at(7); // splits the two-byte 'é'
        assert!(dec.push(a).is_empty());
        assert_eq!(dec.push(b), vec!["é"]);
    }
}
