use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use fuzzytail_types::{LogLine, SourceId};

use crate::error::SinkError;
use crate::output::{CSV_HEADER, OutputFormat};

/// When to print `==> name <==` source headers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeaderMode {
    /// Never (`--quiet`)
    Never,
    /// Only when more than one source is read
    #[default]
    Auto,
    /// Always (`--verbose`)
    Always,
}

impl HeaderMode {
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Never,
            (false, true) => Self::Always,
            (false, false) => Self::Auto,
        }
    }

    /// Resolve the mode for a run over `sources` sources
    pub fn enabled(&self, sources: usize) -> bool {
        match self {
            Self::Never => false,
            Self::Auto => sources > 1,
            Self::Always => true,
        }
    }
}

struct SinkState {
    writer: Box<dyn Write + Send>,
    headers: bool,
    last_source: Option<SourceId>,
    csv_header_written: bool,
    closed: bool,
    buf: Vec<u8>,
}

impl SinkState {
    fn push_header(&mut self, source: &SourceId) {
        if !self.headers || self.last_source.as_ref() == Some(source) {
            return;
        }
        if self.last_source.is_some() {
            self.buf.push(b'\n');
        }
        self.buf.extend_from_slice(format!("==> {} <==\n", source).as_bytes());
        self.last_source = Some(source.clone());
    }

    /// Write and flush whatever was staged in `buf`
    fn commit(&mut self) -> Result<(), SinkError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let result = self
            .writer
            .write_all(&self.buf)
            .and_then(|()| self.writer.flush());
        self.buf.clear();

        result.map_err(|err| {
            let err = SinkError::from(err);
            if matches!(err, SinkError::Closed) {
                debug!("output closed by reader");
                self.closed = true;
            }
            err
        })
    }
}

/// Serialized writer shared by all source tasks.
///
/// Each line goes out with a single `write_all` and a flush while the lock
/// is held, so lines from concurrent sources never interleave and a header
/// always sits directly above the line it introduces.
#[derive(Clone)]
pub struct OutputSink {
    format: OutputFormat,
    state: Arc<Mutex<SinkState>>,
}

impl OutputSink {
    pub fn new(writer: impl Write + Send + 'static, format: OutputFormat) -> Self {
        Self {
            format,
            state: Arc::new(Mutex::new(SinkState {
                writer: Box::new(writer),
                headers: false,
                last_source: None,
                csv_header_written: false,
                closed: false,
                buf: Vec::with_capacity(1024),
            })),
        }
    }

    /// Sink writing to the process's standard output
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(io::stdout(), format)
    }

    /// Turn source headers on or off. Structured formats never get headers.
    pub fn with_headers(self, enabled: bool) -> Self {
        self.state.lock().headers = enabled && self.format.has_headers();
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Announce that output for `source` starts, printing its header if due
    pub fn begin_source(&self, source: &SourceId) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SinkError::Closed);
        }
        state.push_header(source);
        state.commit()
    }

    /// Write one accepted line. `rendered` is the text form of the line,
    /// colorized or not.
    pub fn write_line(&self, line: &LogLine, rendered: &str) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SinkError::Closed);
        }

        state.push_header(&line.source);
        if self.format == OutputFormat::Csv && !state.csv_header_written {
            state.buf.extend_from_slice(CSV_HEADER.as_bytes());
            state.csv_header_written = true;
        }
        if let Err(err) = self.format.encode(line, rendered, &mut state.buf) {
            state.buf.clear();
            return Err(err.into());
        }
        state.commit()
    }

    pub fn flush(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SinkError::Closed);
        }
        state.writer.flush().map_err(SinkError::from)
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn line(source: &str, seq: u64, raw: &str) -> LogLine {
        LogLine::new(Arc::from(source), seq, raw.to_string())
    }

    #[test]
    fn test_header_mode() {
        assert_eq!(HeaderMode::from_flags(true, false), HeaderMode::Never);
        assert_eq!(HeaderMode::from_flags(false, true), HeaderMode::Always);
        assert!(!HeaderMode::Auto.enabled(1));
        assert!(HeaderMode::Auto.enabled(2));
        assert!(HeaderMode::Always.enabled(1));
        assert!(!HeaderMode::Never.enabled(3));
    }

    #[test]
    fn test_plain_lines() {
        let buf = SharedBuf::default();
        let sink = OutputSink::new(buf.clone(), OutputFormat::Text);
        sink.write_line(&line("a", 1, "one"), "one").unwrap();
        sink.write_line(&line("a", 2, "two"), "two").unwrap();
        assert_eq!(buf.contents(), "one\ntwo\n");
    }

    #[test]
    fn test_headers_on_source_change() {
        let buf = SharedBuf::default();
        let sink = OutputSink::new(buf.clone(), OutputFormat::Text).with_headers(true);
        sink.write_line(&line("a.log", 1, "x"), "x").unwrap();
        sink.write_line(&line("a.log", 2, "y"), "y").unwrap();
        sink.write_line(&line("b.log", 1, "z"), "z").unwrap();
        sink.begin_source(&Arc::from("b.log")).unwrap();
        sink.begin_source(&Arc::from("c.log")).unwrap();
        assert_eq!(
            buf.contents(),
            "==> a.log <==\nx\ny\n\n==> b.log <==\nz\n\n==> c.log <==\n"
        );
    }

    #[test]
    fn test_csv_header_once_and_no_source_headers() {
        let buf = SharedBuf::default();
        let sink = OutputSink::new(buf.clone(), OutputFormat::Csv).with_headers(true);
        sink.write_line(&line("a", 1, "one"), "one").unwrap();
        sink.write_line(&line("b", 1, "two"), "two").unwrap();

        let out = buf.contents();
        let rows: Vec<_> = out.lines().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], "source,seq,level,received_at,raw");
        assert!(rows[1].starts_with("a,1,,"));
        assert!(rows[2].ends_with(",two"));
    }

    #[test]
    fn test_broken_pipe_closes_sink() {
        let sink = OutputSink::new(ClosedPipe, OutputFormat::Text);
        assert!(matches!(
            sink.write_line(&line("a", 1, "x"), "x"),
            Err(SinkError::Closed)
        ));
        assert!(matches!(sink.flush(), Err(SinkError::Closed)));
    }
}
