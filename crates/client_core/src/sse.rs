//! Incremental server-sent-events decoding.

use shared::error::ProviderError;

/// Buffers raw body bytes and yields the `data` payload of every completed event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, ProviderError> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8(line)
                .map_err(|err| ProviderError::malformed(format!("stream line is not UTF-8: {err}")))?;
            if let Some(payload) = self.accept_line(&line) {
                events.push(payload);
            }
        }
        Ok(events)
    }

    /// Flushes a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Result<Vec<String>, ProviderError> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8(rest)
                .map_err(|err| ProviderError::malformed(format!("stream tail is not UTF-8: {err}")))?;
            let line = line.trim_end_matches('\r');
            if let Some(payload) = self.accept_line(line) {
                events.push(payload);
            }
        }
        if let Some(payload) = self.take_event() {
            events.push(payload);
        }
        Ok(events)
    }

    fn accept_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.take_event();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data_lines.push(value.to_string());
        }
        None
    }

    fn take_event(&mut self) -> Option<String> {
        if self.data_lines.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.data_lines).join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_payload_per_blank_line_terminated_event() {
        let mut decoder = SseDecoder::default();
        let events = decoder
            .push(b"data: {\"a\":1}\r\n\r\ndata: {\"a\":2}\n\n")
            .expect("decode");
        assert_eq!(events, vec!["{\"a\":1}", "{\"a\":2}"]);
    }

    #[test]
    fn reassembles_events_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"te").expect("decode").is_empty());
        assert!(decoder.push(b"xt\":\"hi\"}\r").expect("decode").is_empty());
        let events = decoder.push(b"\n\r\n").expect("decode");
        assert_eq!(events, vec!["{\"text\":\"hi\"}"]);
    }

    #[test]
    fn keeps_multibyte_characters_split_between_chunks() {
        let bytes = "data: 故事\n\n".as_bytes();
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&bytes[..8]).expect("decode").is_empty());
        let events = decoder.push(&bytes[8..]).expect("decode");
        assert_eq!(events, vec!["故事"]);
    }

    #[test]
    fn ignores_comments_and_unknown_fields() {
        let mut decoder = SseDecoder::default();
        let events = decoder
            .push(b": keep-alive\nevent: message\nid: 7\ndata: payload\n\n")
            .expect("decode");
        assert_eq!(events, vec!["payload"]);
    }

    #[test]
    fn joins_multi_line_data_fields() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"data: first\ndata:second\n\n").expect("decode");
        assert_eq!(events, vec!["first\nsecond"]);
    }

    #[test]
    fn finish_flushes_unterminated_trailing_event() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: tail").expect("decode").is_empty());
        assert_eq!(decoder.finish().expect("finish"), vec!["tail"]);
        assert!(decoder.finish().expect("finish again").is_empty());
    }

    #[test]
    fn invalid_utf8_is_a_malformed_stream() {
        let mut decoder = SseDecoder::default();
        let err = decoder.push(b"data: \xff\xfe\n").expect_err("must fail");
        assert_eq!(err.kind, shared::error::ProviderErrorKind::MalformedStream);
    }
}
