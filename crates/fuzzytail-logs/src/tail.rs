use std::io::{self, Read, Seek, SeekFrom};

use crate::split::LineSplitter;

/// How much of a source to show before following it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TailMode {
    /// Last N lines; an unterminated final line counts as a line
    Lines(usize),
    /// Last N bytes, possibly starting mid-line
    Bytes(u64),
}

impl Default for TailMode {
    fn default() -> Self {
        Self::Lines(10)
    }
}

/// Result of reading the tail of a source
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TailRead {
    /// Complete lines, oldest first
    pub lines: Vec<String>,

    /// Text after the last terminator
    pub partial: Option<String>,

    /// Offset just past the last complete line
    pub resume_at: u64,
}

impl TailRead {
    /// All lines including the unterminated remainder
    pub fn into_all_lines(self) -> Vec<String> {
        let mut lines = self.lines;
        lines.extend(self.partial);
        lines
    }
}

/// Read the tail of a seekable source.
///
/// For [`TailMode::Lines`] the source is scanned backward in chunks of
/// `buffer_size` bytes, so only the tail is ever read.
pub fn read_tail<R: Read + Seek>(
    reader: &mut R,
    mode: TailMode,
    buffer_size: usize,
) -> io::Result<TailRead> {
    let len = reader.seek(SeekFrom::End(0))?;
    let start = match mode {
        TailMode::Lines(n) => find_lines_start(reader, len, n, buffer_size)?,
        TailMode::Bytes(n) => len.saturating_sub(n),
    };

    reader.seek(SeekFrom::Start(start))?;
    let mut bytes = Vec::with_capacity((len - start) as usize);
    reader.by_ref().take(len - start).read_to_end(&mut bytes)?;

    let mut splitter = LineSplitter::new();
    let lines = splitter.push(&bytes);
    let resume_at = start + (bytes.len() - splitter.pending()) as u64;

    Ok(TailRead {
        lines,
        partial: splitter.take_partial(),
        resume_at,
    })
}

/// Offset where the last `n` lines of a `len`-byte source begin
fn find_lines_start<R: Read + Seek>(
    reader: &mut R,
    len: u64,
    n: usize,
    buffer_size: usize,
) -> io::Result<u64> {
    if n == 0 || len == 0 {
        return Ok(len);
    }

    let mut buf = vec![0u8; buffer_size.max(1)];

    // A final terminator ends the last line rather than starting a new one
    let mut end = len;
    reader.seek(SeekFrom::Start(len - 1))?;
    reader.read_exact(&mut buf[..1])?;
    if buf[0] == b'\n' {
        end -= 1;
    }

    let mut seen = 0;
    while end > 0 {
        let chunk = (buf.len() as u64).min(end) as usize;
        let start = end - chunk as u64;
        reader.seek(SeekFrom::Start(start))?;
        reader.read_exact(&mut buf[..chunk])?;

        for i in (0..chunk).rev() {
            if buf[i] == b'\n' {
                seen += 1;
                if seen == n {
                    return Ok(start + i as u64 + 1);
                }
            }
        }
        end = start;
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tail(text: &str, mode: TailMode, buffer_size: usize) -> TailRead {
        read_tail(&mut Cursor::new(text.as_bytes()), mode, buffer_size).unwrap()
    }

    #[test]
    fn test_last_lines() {
        let read = tail("a\nb\nc\nd\n", TailMode::Lines(2), 3);
        assert_eq!(read.lines, vec!["c", "d"]);
        assert_eq!(read.partial, None);
        assert_eq!(read.resume_at, 8);
    }

    #[test]
    fn test_unterminated_last_line_counts() {
        let read = tail("a\nb\nc", TailMode::Lines(2), 64);
        assert_eq!(read.lines, vec!["b"]);
        assert_eq!(read.partial.as_deref(), Some("c"));
        assert_eq!(read.resume_at, 4);
        assert_eq!(read.into_all_lines(), vec!["b", "c"]);
    }

    #[test]
    fn test_more_lines_than_available() {
        let read = tail("x\ny\n", TailMode::Lines(10), 1);
        assert_eq!(read.lines, vec!["x", "y"]);
    }

    #[test]
    fn test_zero_lines_resumes_at_end() {
        let read = tail("x\ny\n", TailMode::Lines(0), 8);
        assert!(read.lines.is_empty());
        assert_eq!(read.resume_at, 4);
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(tail("", TailMode::Lines(5), 8), TailRead::default());
    }

    #[test]
    fn test_bytes_mode_starts_mid_line() {
        let read = tail("hello\nworld\n", TailMode::Bytes(9), 8);
        assert_eq!(read.lines, vec!["lo", "world"]);
        assert_eq!(read.resume_at, 12);
    }

    #[test]
    fn test_chunk_size_does_not_change_result() {
        let text: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let expected = tail(&text, TailMode::Lines(7), 4096);
        for size in [1, 2, 5, 13, 64] {
            assert_eq!(tail(&text, TailMode::Lines(7), size), expected);
        }
        assert_eq!(expected.lines.first().map(String::as_str), Some("line 43"));
    }
}
