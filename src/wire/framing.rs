//! Byte-stream framing for newline-delimited envelopes.
//!
//! Readers accumulate bytes, split on `\n`, and retain any trailing
//! partial line as the next iteration's prefix. A trailing `\r` is
//! stripped so peers using CRLF line endings interoperate.

use std::string::FromUtf8Error;

/// Incremental decoder for newline-delimited frames.
///
/// Feed raw socket bytes with [`FrameDecoder::extend`], then pull
/// complete lines with [`FrameDecoder::next_frame`] until it returns
/// `None`. Blank lines are skipped.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Appends raw bytes read from the stream.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Returns the next complete non-blank frame, if one is buffered.
    ///
    /// # Errors
    ///
    /// Returns an error if a complete frame is not valid UTF-8. The
    /// offending bytes are consumed, so decoding can continue with the
    /// next frame.
    pub fn next_frame(&mut self) -> Option<Result<String, FromUtf8Error>> {
        loop {
            let newline = self.buf.iter().position(|&b| b == b'\n')?;
            let mut line: Vec<u8> = self.buf.drain(..=newline).collect();
            line.pop(); // the \n itself
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.is_empty() {
                continue;
            }
            return Some(String::from_utf8(line));
        }
    }

    /// Number of buffered bytes awaiting a terminator.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

/// Serialises an envelope and appends exactly one `\n`.
///
/// # Errors
///
/// Returns an error if serialisation fails.
pub fn encode_frame<T: serde::Serialize>(envelope: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(envelope)?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::envelope::ResponseEnvelope;

    #[test]
    fn split_frames_and_retain_partial() {
        let mut dec = FrameDecoder::new();
        dec.extend(b"{\"a\":1}\n{\"b\":");
        assert_eq!(dec.next_frame().unwrap().unwrap(), "{\"a\":1}");
        assert!(dec.next_frame().is_none());
        assert_eq!(dec.pending_len(), 6);

        dec.extend(b"2}\n");
        assert_eq!(dec.next_frame().unwrap().unwrap(), "{\"b\":2}");
        assert!(dec.next_frame().is_none());
        assert_eq!(dec.pending_len(), 0);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut dec = FrameDecoder::new();
        dec.extend(b"\n\r\n{\"x\":true}\n\n");
        assert_eq!(dec.next_frame().unwrap().unwrap(), "{\"x\":true}");
        assert!(dec.next_frame().is_none());
    }

    #[test]
    fn crlf_terminator_is_tolerated() {
        let mut dec = FrameDecoder::new();
        dec.extend(b"{\"y\":0}\r\n");
        assert_eq!(dec.next_frame().unwrap().unwrap(), "{\"y\":0}");
    }

    #[test]
    fn invalid_utf8_frame_is_reported_and_consumed() {
        let mut dec = FrameDecoder::new();
        dec.extend(&[0xff, 0xfe, b'\n', b'o', b'k', b'\n']);
        assert!(dec.next_frame().unwrap().is_err());
        assert_eq!(dec.next_frame().unwrap().unwrap(), "ok");
    }

    #[test]
    fn encode_frame_appends_single_newline() {
        let resp = ResponseEnvelope::success("a", "");
        let bytes = encode_frame(&resp).unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
        assert_eq!(bytes.iter().filter(|&&b| b == b'\n').count(), 1);
    }

    #[test]
    fn byte_at_a_time_delivery() {
        let mut dec = FrameDecoder::new();
        for b in b"{\"id\":\"a\"}\n" {
            dec.extend(&[*b]);
        }
        assert_eq!(dec.next_frame().unwrap().unwrap(), "{\"id\":\"a\"}");
    }
}
