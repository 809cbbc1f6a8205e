//! Newline framing for tokio.
//!
//! Servers are not trusted to send valid UTF-8, so lines are decoded lossily
//! rather than rejected. Lines over the length cap are dropped and decoding
//! resumes after the next newline.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ParseError;

/// Default cap on a single inbound line. Far above the 512-byte IRC limit to
/// leave room for message tags.
pub const DEFAULT_MAX_LINE: usize = 8192;

/// Splits a byte stream into lines, stripping `\r\n` or `\n`.
pub struct LineCodec {
    /// Index of the next byte to scan for a newline.
    next_index: usize,
    max_len: usize,
    /// Inside an overlong line; skip up to the next newline.
    discarding: bool,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_LINE)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
            discarding: false,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, ParseError> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if self.discarding {
                    src.clear();
                    self.next_index = 0;
                } else if src.len() > self.max_len + 1 {
                    tracing::debug!(limit = self.max_len, "Dropping overlong inbound line");
                    src.clear();
                    self.next_index = 0;
                    self.discarding = true;
                } else {
                    self.next_index = src.len();
                }
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;
            if self.discarding {
                self.discarding = false;
                continue;
            }

            let line = trim_line_end(&line);
            if line.len() > self.max_len {
                tracing::debug!(limit = self.max_len, "Dropping overlong inbound line");
                continue;
            }
            return Ok(Some(String::from_utf8_lossy(line).into_owned()));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, ParseError> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if src.is_empty() || self.discarding {
            src.clear();
            self.discarding = false;
            return Ok(None);
        }
        // Unterminated last line before EOF.
        let rest = src.split_to(src.len());
        Ok(Some(String::from_utf8_lossy(trim_line_end(&rest)).into_owned()))
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\r' | b'\n') {
        end -= 1;
    }
    &line[..end]
}

impl Encoder<String> for LineCodec {
    type Error = ParseError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), ParseError> {
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_crlf_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PING :test\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :test".to_string()));
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_line_waits_for_more() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PING :");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"abc\r\nPI");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :abc".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PRIVMSG #a :caf\xe9\n"[..]);
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert!(line.starts_with("PRIVMSG #a :caf"));
    }

    #[test]
    fn overlong_line_is_skipped() {
        let mut codec = LineCodec::with_max_len(10);
        let mut buf = BytesMut::from("this is way too long\r\nPING :abc\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :abc".to_string()));
        assert!(buf.is_empty());
    }

    #[test]
    fn overlong_line_split_across_reads_is_skipped() {
        let mut codec = LineCodec::with_max_len(10);
        let mut buf = BytesMut::from("xxxxxxxxxxxxxxxx");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"yyyyyyyy");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"zz\r\nPING :ok\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :ok".to_string()));
    }

    #[test]
    fn line_at_the_cap_is_kept() {
        let mut codec = LineCodec::with_max_len(10);
        let mut buf = BytesMut::from("0123456789\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("0123456789".to_string()));
    }

    #[test]
    fn eof_flushes_unterminated_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("ERROR :Closing link");
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap(),
            Some("ERROR :Closing link".to_string())
        );
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn encode_appends_crlf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("PONG :x".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"PONG :x\r\n");
    }
}
