use crate::error::FrameError;

/// Hard cap on a single frame. Far below the format's theoretical maximum
/// so a hostile length prefix cannot force an unbounded allocation.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Longest acceptable decimal length prefix ("65536" is five digits).
const MAX_LEN_DIGITS: usize = 5;

/// Encode a payload as a netstring: `<decimal-length>:<payload>,`.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(payload);
    out.push(b',');
    out
}

/// Streaming netstring reassembler.
///
/// Feed it whatever the socket produced; it buffers partial frames across
/// reads and yields each complete payload exactly once.
#[derive(Debug, Default)]
pub struct NetstringDecoder {
    buf: Vec<u8>,
}

impl NetstringDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes and drain every complete frame.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Vec<u8>>, FrameError> {
        self.buf.extend_from_slice(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let colon = match self.buf.iter().position(|&b| b == b':') {
            Some(i) => i,
            None => {
                // No separator yet. If the prefix is already longer than any
                // valid length, the stream is desynchronized.
                if self.buf.len() > MAX_LEN_DIGITS {
                    return Err(FrameError::BadLength);
                }
                return Ok(None);
            }
        };

        if colon == 0 || colon > MAX_LEN_DIGITS {
            return Err(FrameError::BadLength);
        }
        let prefix = &self.buf[..colon];
        if !prefix.iter().all(u8::is_ascii_digit) {
            return Err(FrameError::BadLength);
        }
        // Prefix is pure ASCII digits, so this cannot fail.
        let len: usize = std::str::from_utf8(prefix)
            .expect("digits are valid utf-8")
            .parse()
            .map_err(|_| FrameError::BadLength)?;
        if len > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge(len));
        }

        // length prefix + ':' + payload + ','
        let total = colon + 1 + len + 1;
        if self.buf.len() < total {
            return Ok(None);
        }
        if self.buf[total - 1] != b',' {
            return Err(FrameError::MissingTerminator);
        }

        let payload = self.buf[colon + 1..total - 1].to_vec();
        self.buf.drain(..total);
        Ok(Some(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_format() {
        assert_eq!(encode(b"hello"), b"5:hello,");
        assert_eq!(encode(b""), b"0:,");
    }

    #[test]
    fn decode_single_frame() {
        let mut dec = NetstringDecoder::new();
        let frames = dec.feed(b"5:hello,").unwrap();
        assert_eq!(frames, vec![b"hello".to_vec()]);
    }

    #[test]
    fn decode_multiple_frames_one_read() {
        let mut dec = NetstringDecoder::new();
        let frames = dec.feed(b"2:hi,3:you,").unwrap();
        assert_eq!(frames, vec![b"hi".to_vec(), b"you".to_vec()]);
    }

    #[test]
    fn decode_across_split_reads() {
        let mut dec = NetstringDecoder::new();
        assert!(dec.feed(b"11:hel").unwrap().is_empty());
        assert!(dec.feed(b"lo wor").unwrap().is_empty());
        let frames = dec.feed(b"ld!,").unwrap();
        assert_eq!(frames, vec![b"hello world!".to_vec()]);
    }

    #[test]
    fn decode_split_inside_length_prefix() {
        let mut dec = NetstringDecoder::new();
        assert!(dec.feed(b"1").unwrap().is_empty());
        let frames = dec.feed(b"2:hello world!,").unwrap();
        assert_eq!(frames, vec![b"hello world!".to_vec()]);
    }

    #[test]
    fn roundtrip_binary_payload() {
        let payload: Vec<u8> = (0u8..=255).collect();
        let mut dec = NetstringDecoder::new();
        let frames = dec.feed(&encode(&payload)).unwrap();
        assert_eq!(frames, vec![payload]);
    }

    #[test]
    fn rejects_non_digit_length() {
        let mut dec = NetstringDecoder::new();
        assert_eq!(dec.feed(b"5x:hello,"), Err(FrameError::BadLength));
    }

    #[test]
    fn rejects_empty_length() {
        let mut dec = NetstringDecoder::new();
        assert_eq!(dec.feed(b":a,"), Err(FrameError::BadLength));
    }

    #[test]
    fn rejects_missing_terminator() {
        let mut dec = NetstringDecoder::new();
        assert_eq!(dec.feed(b"2:hix"), Err(FrameError::MissingTerminator));
    }

    #[test]
    fn rejects_oversized_declared_length() {
        let mut dec = NetstringDecoder::new();
        assert_eq!(dec.feed(b"99999:"), Err(FrameError::TooLarge(99999)));
    }

    #[test]
    fn rejects_runaway_length_prefix() {
        let mut dec = NetstringDecoder::new();
        assert_eq!(dec.feed(b"1234567"), Err(FrameError::BadLength));
    }

    #[test]
    fn cap_boundary_is_accepted() {
        let payload = vec![b'a'; MAX_FRAME_LEN];
        let mut dec = NetstringDecoder::new();
        let frames = dec.feed(&encode(&payload)).unwrap();
        assert_eq!(frames[0].len(), MAX_FRAME_LEN);
    }
}
