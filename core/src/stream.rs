//! Incremental decoding of streamed chat answers.
//!
//! The body arrives as arbitrary byte chunks. [`LineDecoder`] turns them into
//! complete text lines, carrying both partial UTF-8 sequences and partial
//! lines over to the next chunk. [`EventDecoder`] picks the `data: ` lines out
//! of those and parses each one as a [`StreamEvent`].

use tracing::{debug, warn};

use crate::types::StreamEvent;

const DATA_PREFIX: &str = "data: ";

/// Splits a byte stream into UTF-8 lines
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending_bytes: Vec<u8>,
    pending_line: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every line it completed, without the
    /// trailing `\n` (or `\r\n`).
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending_bytes.extend_from_slice(chunk);
        self.decode_pending();

        let mut lines = Vec::new();
        while let Some(pos) = self.pending_line.find('\n') {
            let mut line: String = self.pending_line.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// Flushes whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending_bytes.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.pending_line.push_str(&tail);
            self.pending_bytes.clear();
        }

        let line = std::mem::take(&mut self.pending_line);
        let line = line.strip_suffix('\r').map(str::to_string).unwrap_or(line);
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    }

    /// Moves every complete UTF-8 sequence from `pending_bytes` into
    /// `pending_line`. Invalid sequences become U+FFFD; an incomplete
    /// sequence at the end stays buffered.
    fn decode_pending(&mut self) {
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending_bytes[start..]) {
                Ok(valid) => {
                    self.pending_line.push_str(valid);
                    start = self.pending_bytes.len();
                    break;
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.pending_bytes[start..valid_end]) {
                        self.pending_line.push_str(valid);
                    }
                    match e.error_len() {
                        Some(len) => {
                            self.pending_line.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.pending_bytes.drain(..start);
    }
}

/// Parses one line of the stream.
///
/// Returns `None` for lines that do not carry an event (blank lines,
/// comments, other SSE fields).
pub fn parse_event_line(line: &str) -> Option<Result<StreamEvent, serde_json::Error>> {
    let data = line.strip_prefix(DATA_PREFIX)?;
    Some(serde_json::from_str(data))
}

/// Turns body chunks into stream events, skipping malformed lines
#[derive(Debug, Default)]
pub struct EventDecoder {
    lines: LineDecoder,
    skipped: usize,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let lines = self.lines.feed(chunk);
        lines
            .iter()
            .filter_map(|line| self.parse(line))
            .collect()
    }

    pub fn finish(&mut self) -> Option<StreamEvent> {
        let line = self.lines.finish()?;
        self.parse(&line)
    }

    /// Number of `data: ` lines dropped because they were not valid JSON
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn parse(&mut self, line: &str) -> Option<StreamEvent> {
        match parse_event_line(line)? {
            Ok(event) => {
                debug!("Stream event: {:?}", event);
                Some(event)
            }
            Err(e) => {
                self.skipped += 1;
                warn!("Error parsing JSON line: {} ({:?})", e, line);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_chunks() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(b"data: {\"type\":").is_empty());
        let lines = decoder.feed(b" \"error\"}\r\ndata: x\n\npartial");
        assert_eq!(lines, vec!["data: {\"type\": \"error\"}", "data: x", ""]);
        assert_eq!(decoder.finish().as_deref(), Some("partial"));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let bytes = "robô\n".as_bytes();
        let split = bytes.len() - 2;
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(&bytes[..split]).is_empty());
        assert_eq!(decoder.feed(&bytes[split..]), vec!["robô"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut decoder = LineDecoder::new();
        assert_eq!(decoder.feed(b"a\xffb\n"), vec!["a\u{FFFD}b"]);
    }

    #[test]
    fn test_parse_event_line_ignores_non_data_lines() {
        assert!(parse_event_line("").is_none());
        assert!(parse_event_line("event: message").is_none());
        assert!(parse_event_line("data:{}").is_none());
        assert!(parse_event_line("data: not json").unwrap().is_err());
    }

    #[test]
    fn test_event_decoder_skips_malformed_lines() {
        let mut decoder = EventDecoder::new();
        let events = decoder.feed(
            b"data: {\"type\": \"assistant.response\", \"content\": \"A\"}\n\
              data: {broken\n\
              data: {\"type\": \"assistant.response\", \"content\": \"AB\"}\n",
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::AssistantResponse {
                    content: "A".to_string()
                },
                StreamEvent::AssistantResponse {
                    content: "AB".to_string()
                },
            ]
        );
        assert_eq!(decoder.skipped(), 1);
    }

    #[test]
    fn test_event_decoder_flushes_unterminated_last_line() {
        let mut decoder = EventDecoder::new();
        assert!(decoder
            .feed(b"data: {\"type\": \"error\", \"content\": \"quota\"}")
            .is_empty());
        assert_eq!(
            decoder.finish(),
            Some(StreamEvent::Error {
                content: "quota".to_string()
            })
        );
    }
}
