use bytes::{Buf, BytesMut};
use serde_json::Value;

/// Literal prefix of a data-bearing line. The space is part of the prefix.
pub const DATA_PREFIX: &str = "data: ";

/// Body of a data line that ends the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Splits raw chunks into complete `\n`-terminated lines.
///
/// Splitting happens on bytes, so a multi-byte UTF-8 character cut in half by
/// a chunk boundary stays in the buffer until its line is complete. The
/// buffer never holds a full line between calls to [`SseCodec::decode`].
#[derive(Debug, Default)]
pub struct SseCodec {
    buffer: BytesMut,
}

impl SseCodec {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    pub fn decode(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();

        while let Some(i) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes = self.buffer.split_to(i);
            self.buffer.advance(1); // skip newline

            // Handle \r if present (CRLF)
            let line_slice = if line_bytes.ends_with(b"\r") {
                &line_bytes[..line_bytes.len() - 1]
            } else {
                &line_bytes[..]
            };

            if !line_slice.is_empty() {
                lines.push(String::from_utf8_lossy(line_slice).into_owned());
            }
        }

        lines
    }

    /// Bytes received after the last newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drops the unterminated tail and reports how many bytes it held.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffer.len();
        self.buffer.clear();
        discarded
    }
}

/// What a single complete line means to the decoder.
#[derive(Debug, PartialEq)]
pub enum SseLine {
    Data(Value),
    Done,
    Malformed { body: String, error: String },
    Ignored,
}

pub fn classify_line(line: &str) -> SseLine {
    let Some(body) = line.strip_prefix(DATA_PREFIX) else {
        return SseLine::Ignored;
    };

    if body == DONE_SENTINEL {
        return SseLine::Done;
    }

    match serde_json::from_str(body) {
        Ok(value) => SseLine::Data(value),
        Err(e) => SseLine::Malformed {
            body: body.to_string(),
            error: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sse_codec_fragmentation() {
        let mut codec = SseCodec::new();

        let lines = codec.decode(b"data: {\"foo\":");
        assert!(lines.is_empty());
        assert_eq!(codec.pending(), 13);

        let lines = codec.decode(b" \"bar\"}\n\ndata: [DO");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], "data: {\"foo\": \"bar\"}");

        let lines = codec.decode(b"NE]\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], "data: [DONE]");
        assert_eq!(codec.pending(), 0);
    }

    #[test]
    fn test_sse_codec_crlf() {
        let mut codec = SseCodec::new();
        let lines = codec.decode(b"data: foo\r\ndata: bar\r\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "data: foo");
        assert_eq!(lines[1], "data: bar");
    }

    #[test]
    fn test_split_multibyte_character() {
        let encoded = "data: {\"text\":\"héllo €\"}\n".as_bytes();
        let euro = encoded.iter().position(|&b| b == 0xE2).unwrap();

        let mut codec = SseCodec::new();
        assert!(codec.decode(&encoded[..euro + 1]).is_empty());
        let lines = codec.decode(&encoded[euro + 1..]);
        assert_eq!(lines, vec!["data: {\"text\":\"héllo €\"}".to_string()]);
    }

    #[test]
    fn test_finish_discards_tail() {
        let mut codec = SseCodec::new();
        let lines = codec.decode(b"data: {\"a\":1}\ndata: {\"a\"");
        assert_eq!(lines.len(), 1);
        assert_eq!(codec.finish(), 10);
        assert_eq!(codec.pending(), 0);
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line("data: {\"a\":1}"), SseLine::Data(json!({"a": 1})));
        assert_eq!(classify_line("data: [DONE]"), SseLine::Done);
        assert_eq!(classify_line(": keep-alive"), SseLine::Ignored);
        assert_eq!(classify_line("event: ping"), SseLine::Ignored);
        // no space after the colon is not a data line
        assert_eq!(classify_line("data:{\"a\":1}"), SseLine::Ignored);
        assert!(matches!(
            classify_line("data: {not json"),
            SseLine::Malformed { ref body, .. } if body == "{not json"
        ));
    }
}
