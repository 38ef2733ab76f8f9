//! Newline framing for the rig → pool direction.
//!
//! Stratum is newline-delimited JSON. Lines are handled as raw bytes so
//! anything after the login passes through untouched.

/// Streaming line decoder: accumulates bytes and yields complete lines.
///
/// Lines are returned without their terminator; a `\r` before the `\n` is
/// stripped as well. A line longer than `max_line` bytes, terminated or not,
/// is an error and leaves the decoder unusable.
#[derive(Debug)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    max_line: usize,
}

impl LineDecoder {
    pub fn new(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line,
        }
    }

    /// Feed bytes and return every line completed by them.
    ///
    /// # Errors
    ///
    /// [`LineTooLong`] once a line exceeds the limit. Nothing past the limit
    /// is buffered.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Vec<u8>>, LineTooLong> {
        let mut lines = Vec::new();
        let mut rest = data;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.push(&rest[..pos])?;
            let line = std::mem::take(&mut self.buffer);
            lines.push(trim_cr(&line).to_vec());
            rest = &rest[pos + 1..];
        }
        self.push(rest)?;
        Ok(lines)
    }

    /// Take the unterminated tail left when the stream ends.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.buffer);
        Some(trim_cr(&tail).to_vec())
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn push(&mut self, bytes: &[u8]) -> Result<(), LineTooLong> {
        if self.buffer.len() + bytes.len() > self.max_line {
            return Err(LineTooLong {
                max: self.max_line,
            });
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }
}

/// A line grew past the decoder's limit before its terminator arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("line exceeds {max} bytes")]
pub struct LineTooLong {
    pub max: usize,
}

/// Append the `\n` terminator to a line.
pub fn frame_line(line: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(line.len() + 1);
    framed.extend_from_slice(line);
    framed.push(b'\n');
    framed
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_multiple_lines() {
        let mut decoder = LineDecoder::new(64);
        let lines = decoder.feed(b"one\ntwo\n\nthree").unwrap();
        assert_eq!(lines, vec![b"one".to_vec(), b"two".to_vec(), Vec::new()]);
        assert_eq!(decoder.pending(), 5);
    }

    #[test]
    fn incremental_feed() {
        let mut decoder = LineDecoder::new(64);
        let input = b"{\"method\":\"login\"}\n";
        for byte in &input[..input.len() - 1] {
            assert!(decoder.feed(std::slice::from_ref(byte)).unwrap().is_empty());
        }
        let lines = decoder.feed(b"\n").unwrap();
        assert_eq!(lines, vec![b"{\"method\":\"login\"}".to_vec()]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn strips_carriage_return() {
        let mut decoder = LineDecoder::new(64);
        let lines = decoder.feed(b"a\r\nb\r\n").unwrap();
        assert_eq!(lines, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn finish_returns_tail_once() {
        let mut decoder = LineDecoder::new(64);
        decoder.feed(b"done\nrest").unwrap();
        assert_eq!(decoder.finish(), Some(b"rest".to_vec()));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn keeps_non_utf8_bytes() {
        let mut decoder = LineDecoder::new(64);
        let lines = decoder.feed(&[0xff, 0xfe, b'\n']).unwrap();
        assert_eq!(lines, vec![vec![0xff, 0xfe]]);
    }

    #[test]
    fn line_at_limit_is_accepted() {
        let mut decoder = LineDecoder::new(4);
        let lines = decoder.feed(b"abcd\nef").unwrap();
        assert_eq!(lines, vec![b"abcd".to_vec()]);
        assert_eq!(decoder.pending(), 2);
    }

    #[test]
    fn unterminated_line_over_limit_fails() {
        let mut decoder = LineDecoder::new(8);
        assert!(decoder.feed(b"12345").unwrap().is_empty());
        assert_eq!(decoder.feed(b"6789"), Err(LineTooLong { max: 8 }));
        assert!(decoder.pending() <= 8);
    }

    #[test]
    fn terminated_line_over_limit_fails() {
        let mut decoder = LineDecoder::new(4);
        assert_eq!(decoder.feed(b"ok\ntoolong\n"), Err(LineTooLong { max: 4 }));
    }

    #[test]
    fn frame_line_appends_newline() {
        assert_eq!(frame_line(b"abc"), b"abc\n".to_vec());
        assert_eq!(frame_line(b""), b"\n".to_vec());
    }
}
