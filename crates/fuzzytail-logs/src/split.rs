/// Decode one line of bytes, dropping a trailing `\n` and `\r`
pub fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Splits a byte stream into terminated lines.
///
/// Bytes after the last `\n` are held until a later push completes them, so
/// a line is never handed out before its terminator arrives.
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every line they complete
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = bytes;

        while let Some(nl) = rest.iter().position(|&b| b == b'\n') {
            if self.partial.is_empty() {
                lines.push(decode_line(&rest[..nl]));
            } else {
                self.partial.extend_from_slice(&rest[..nl]);
                lines.push(decode_line(&self.partial));
                self.partial.clear();
            }
            rest = &rest[nl + 1..];
        }

        self.partial.extend_from_slice(rest);
        lines
    }

    /// Hand out the unterminated remainder, if any
    pub fn take_partial(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let bytes = std::mem::take(&mut self.partial);
        Some(decode_line(&bytes))
    }

    /// Number of held bytes
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Drop the held remainder
    pub fn clear(&mut self) {
        self.partial.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_partial_is_held_until_terminated() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.push(b"one\ntw"), vec!["one"]);
        assert_eq!(splitter.pending(), 2);
        assert!(splitter.push(b"o").is_empty());
        assert_eq!(splitter.push(b"\nthree\n"), vec!["two", "three"]);
        assert_eq!(splitter.take_partial(), None);
    }

    #[test]
    fn test_crlf_and_empty_lines() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.push(b"a\r\n\r\n\nb"), vec!["a", "", ""]);
        assert_eq!(splitter.take_partial().as_deref(), Some("b"));
        assert_eq!(splitter.pending(), 0);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.push(b"caf\xe9\n"), vec!["caf\u{fffd}"]);
    }

    #[test]
    fn test_multibyte_split_across_pushes() {
        let mut splitter = LineSplitter::new();
        let bytes = "grüß\n".as_bytes();
        assert!(splitter.push(&bytes[..3]).is_empty());
        assert_eq!(splitter.push(&bytes[3..]), vec!["grüß"]);
    }

    fn split_all(chunks: &[&[u8]]) -> (Vec<String>, Option<String>) {
        let mut splitter = LineSplitter::new();
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(splitter.push(chunk));
        }
        (lines, splitter.take_partial())
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_lines(
            bytes in proptest::collection::vec(
                prop_oneof![Just(b'\n'), Just(b'\r'), Just(0xc3u8), Just(0xbcu8), any::<u8>()],
                0..64,
            ),
            cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..8),
        ) {
            let mut points: Vec<usize> = cuts.iter().map(|c| c.index(bytes.len() + 1)).collect();
            points.sort_unstable();

            let mut chunks = Vec::new();
            let mut start = 0;
            for point in points {
                chunks.push(&bytes[start..point]);
                start = point;
            }
            chunks.push(&bytes[start..]);

            prop_assert_eq!(split_all(&chunks), split_all(&[bytes.as_slice()]));
        }
    }
}
