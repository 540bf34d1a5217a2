//! Line-based codec for the serial link.
//!
//! Both directions use `\n`-terminated ASCII lines. Some firmware builds
//! terminate with `\r\n`, so a trailing `\r` is stripped on decode.

use bytes::BytesMut;

use crate::constants::{DEFAULT_MAX_LINE_LENGTH, LINE_TERMINATOR};
use crate::error::{ProtocolError, ProtocolResult};

/// A codec for reading and writing protocol lines.
///
/// This handles the line-based nature of the protocol:
/// - Accumulates received bytes until a complete line is found
/// - Keeps a trailing partial line across calls to [`LineCodec::push`]
/// - Discards a partial line that grows past the configured ceiling, along
///   with the rest of that line once its terminator finally arrives
#[derive(Debug)]
pub struct LineCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
    /// Longest partial line kept while waiting for a terminator.
    max_line_length: usize,
    /// Set after an overflow until the terminator of the dropped line is seen.
    discarding: bool,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCodec {
    /// Create a new line codec with the default line ceiling.
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a new line codec that tolerates partial lines up to `max_line_length` bytes.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        LineCodec {
            buffer: BytesMut::with_capacity(max_line_length * 2),
            max_line_length,
            discarding: false,
        }
    }

    /// Add received data to the buffer.
    ///
    /// Complete lines already in the buffer are always kept. If the trailing
    /// partial line exceeds the ceiling it is dropped and
    /// [`ProtocolError::LineTooLong`] is returned; the codec stays usable.
    pub fn push(&mut self, data: &[u8]) -> ProtocolResult<()> {
        let mut data = data;

        if self.discarding {
            match data.iter().position(|&b| b == LINE_TERMINATOR) {
                Some(pos) => {
                    self.discarding = false;
                    data = &data[pos + 1..];
                }
                None => return Ok(()),
            }
        }

        self.buffer.extend_from_slice(data);

        let tail_start = self
            .buffer
            .iter()
            .rposition(|&b| b == LINE_TERMINATOR)
            .map_or(0, |pos| pos + 1);
        let partial = self.buffer.len() - tail_start;

        if partial > self.max_line_length {
            self.buffer.truncate(tail_start);
            self.discarding = true;
            return Err(ProtocolError::LineTooLong {
                max: self.max_line_length,
                actual: partial,
            });
        }

        Ok(())
    }

    /// Try to decode one complete line from the buffer.
    ///
    /// Returns the line without its terminator, or `None` if more data is
    /// needed. Empty lines are skipped. Invalid UTF-8 is replaced rather than
    /// rejected; the frame decoder will refuse anything it cannot read.
    pub fn decode_line(&mut self) -> Option<String> {
        loop {
            let end = self.buffer.iter().position(|&b| b == LINE_TERMINATOR)?;

            let raw = self.buffer.split_to(end + 1);
            let mut content = &raw[..end];
            if let Some(stripped) = content.strip_suffix(b"\r") {
                content = stripped;
            }

            if content.is_empty() {
                continue;
            }

            return Some(String::from_utf8_lossy(content).into_owned());
        }
    }

    /// Lazily drain every complete line currently buffered.
    pub fn lines(&mut self) -> Lines<'_> {
        Lines { codec: self }
    }

    /// Encode a command for transmission.
    ///
    /// Appends the `\n` terminator.
    pub fn encode_command(cmd: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(cmd.len() + 1);
        buf.extend_from_slice(cmd.as_bytes());
        buf.push(LINE_TERMINATOR);
        buf
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer, e.g. after the line has been reopened.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}

/// Iterator over the complete lines buffered in a [`LineCodec`].
#[derive(Debug)]
pub struct Lines<'a> {
    codec: &'a mut LineCodec,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.codec.decode_line()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_command() {
        let encoded = LineCodec::encode_command("GET_RELAYS");
        assert_eq!(encoded, b"GET_RELAYS\n");
    }

    #[test]
    fn test_decode_lines() {
        let mut codec = LineCodec::new();
        codec.push(b"PING_OK\nRELAYS:1,0,1,0,0,0,0\n").unwrap();

        let lines: Vec<String> = codec.lines().collect();
        assert_eq!(lines, vec!["PING_OK", "RELAYS:1,0,1,0,0,0,0"]);
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_strips_carriage_return() {
        let mut codec = LineCodec::new();
        codec.push(b"PING_OK\r\n").unwrap();
        assert_eq!(codec.decode_line(), Some("PING_OK".to_string()));
    }

    #[test]
    fn test_partial_line_kept_across_pushes() {
        let mut codec = LineCodec::new();
        codec.push(b"SENSORS:23.5,61,").unwrap();
        assert!(codec.decode_line().is_none());

        codec.push(b"22.1,22.3,1,0\r\nPIN").unwrap();
        assert_eq!(
            codec.decode_line(),
            Some("SENSORS:23.5,61,22.1,22.3,1,0".to_string())
        );
        assert!(codec.decode_line().is_none());
        assert_eq!(codec.buffered_len(), 3);
    }

    #[test]
    fn test_skips_empty_lines() {
        let mut codec = LineCodec::new();
        codec.push(b"\r\n\nPING_OK\n").unwrap();
        assert_eq!(codec.decode_line(), Some("PING_OK".to_string()));
        assert!(codec.decode_line().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut codec = LineCodec::new();
        codec.push(b"RELAYS:\xff\n").unwrap();
        assert_eq!(codec.decode_line(), Some("RELAYS:\u{fffd}".to_string()));
    }

    #[test]
    fn test_oversized_partial_is_discarded() {
        let mut codec = LineCodec::with_max_line_length(8);
        codec.push(b"PING_OK\n").unwrap();

        let err = codec.push(b"0123456789").unwrap_err();
        assert_eq!(err, ProtocolError::LineTooLong { max: 8, actual: 10 });

        // The complete line before the noise survives.
        assert_eq!(codec.decode_line(), Some("PING_OK".to_string()));
        assert!(codec.decode_line().is_none());

        // The remainder of the noisy line is dropped up to its terminator.
        codec.push(b"abc\nPING_OK\n").unwrap();
        assert_eq!(codec.decode_line(), Some("PING_OK".to_string()));
        assert!(codec.decode_line().is_none());
    }

    #[test]
    fn test_clear_resets_discard_state() {
        let mut codec = LineCodec::with_max_line_length(4);
        assert!(codec.push(b"0123456").is_err());
        codec.clear();

        codec.push(b"OK\n").unwrap();
        assert_eq!(codec.decode_line(), Some("OK".to_string()));
    }
}
