use std::borrow::Cow;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use fuzzytail_color::ColorEngine;
use fuzzytail_types::{LogLine, SourceId, SourceSpec};

use crate::error::{SinkError, SourceError};
use crate::filter::FilterSpec;
use crate::follow::Follower;
use crate::sink::OutputSink;
use crate::split::decode_line;
use crate::tail::{TailMode, TailRead, read_tail};

/// Default chunk size for reads
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default wait between follow-mode polls
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// How sources are read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamOptions {
    /// What to show from each source before following it
    pub tail: TailMode,

    /// Keep reading appended data after the initial tail
    pub follow: bool,

    /// Wait between polls when a followed file has no new data
    pub retry_interval: Duration,

    /// Chunk size for file and stdin reads
    pub buffer_size: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            tail: TailMode::default(),
            follow: false,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Filter followed by optional coloring. Read-only and shared by all sources.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    filter: Arc<FilterSpec>,
    engine: Option<Arc<ColorEngine>>,
}

impl Pipeline {
    /// Pass `None` for `engine` to run in no-color mode
    pub fn new(filter: FilterSpec, engine: Option<ColorEngine>) -> Self {
        Self {
            filter: Arc::new(filter),
            engine: engine.map(Arc::new),
        }
    }

    /// Drop the color engine, keeping only the filter
    pub fn without_color(mut self) -> Self {
        self.engine = None;
        self
    }

    pub fn colorizes(&self) -> bool {
        self.engine.is_some()
    }

    /// Render an accepted line, or `None` when the filter rejects it.
    ///
    /// In no-color mode the raw text is passed through untouched.
    pub fn render<'a>(&self, line: &'a LogLine) -> Option<Cow<'a, str>> {
        if !self.filter.accept(line) {
            return None;
        }
        Some(match &self.engine {
            Some(engine) => Cow::Owned(engine.apply(line)),
            None => Cow::Borrowed(line.raw.as_str()),
        })
    }
}

/// A source that stopped with an error
#[derive(Debug)]
pub struct SourceFailure {
    pub source: SourceId,
    pub error: SourceError,
}

/// Outcome of [`StreamProcessor::run`]
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Lines read across all sources
    pub lines_read: u64,

    /// Lines that passed the filter and were written
    pub lines_emitted: u64,

    /// Sources that failed, in the order they failed
    pub failures: Vec<SourceFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
struct Stats {
    lines_read: AtomicU64,
    lines_emitted: AtomicU64,
}

/// Why a follow task ended early
enum TaskError {
    Source(SourceError),
    Sink(SinkError),
}

impl From<SinkError> for TaskError {
    fn from(err: SinkError) -> Self {
        Self::Sink(err)
    }
}

/// Per-source state: numbering and emission of lines
struct SourceContext {
    source: SourceId,
    seq: u64,
    pipeline: Pipeline,
    sink: OutputSink,
    stats: Arc<Stats>,
}

impl SourceContext {
    fn emit(&mut self, raw: String) -> Result<(), SinkError> {
        self.seq += 1;
        self.stats.lines_read.fetch_add(1, Ordering::Relaxed);

        let line = LogLine::new(self.source.clone(), self.seq, raw);
        let Some(rendered) = self.pipeline.render(&line) else {
            return Ok(());
        };

        self.sink.write_line(&line, &rendered)?;
        self.stats.lines_emitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn emit_all(&mut self, lines: Vec<String>) -> Result<(), SinkError> {
        lines.into_iter().try_for_each(|raw| self.emit(raw))
    }
}

type StdinReader = Box<dyn AsyncRead + Send + Unpin>;

/// Sources waiting for the follow phase
enum FollowTarget {
    File(SourceContext, Follower),
    Stdin(SourceContext, StdinReader),
}

/// Result of the static read of one source
enum Opened {
    Done,
    Follow(FollowTarget),
    Failed(SourceFailure),
}

/// Reads sources, runs lines through the [`Pipeline`] and writes them to an
/// [`OutputSink`].
///
/// Sources are first read statically one after the other in argument order.
/// In follow mode each source then gets its own task; all tasks share one
/// cancellation token, which is also tripped when the sink fails.
pub struct StreamProcessor {
    pipeline: Pipeline,
    sink: OutputSink,
    options: StreamOptions,
    cancel: CancellationToken,
    stdin: Mutex<Option<StdinReader>>,
}

impl StreamProcessor {
    pub fn new(pipeline: Pipeline, sink: OutputSink, options: StreamOptions) -> Self {
        let pipeline = if sink.format().colorizes() {
            pipeline
        } else {
            pipeline.without_color()
        };

        Self {
            pipeline,
            sink,
            options,
            cancel: CancellationToken::new(),
            stdin: Mutex::new(None),
        }
    }

    /// Read `-` from `reader` instead of the process's standard input
    pub fn with_stdin(self, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        *self.stdin.lock() = Some(Box::new(reader));
        self
    }

    /// Token that stops every source loop when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop all sources
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Process `sources` until they are exhausted (static mode) or until
    /// cancelled (follow mode).
    ///
    /// A failing source is recorded in the summary and the others keep going.
    /// A sink error stops everything and is returned as the error.
    pub async fn run(&self, sources: &[SourceSpec]) -> Result<RunSummary, SinkError> {
        let stats = Arc::new(Stats::default());
        let mut failures = Vec::new();
        let mut targets = Vec::new();

        for spec in sources {
            if self.cancel.is_cancelled() {
                break;
            }

            let ctx = SourceContext {
                source: spec.id(),
                seq: 0,
                pipeline: self.pipeline.clone(),
                sink: self.sink.clone(),
                stats: Arc::clone(&stats),
            };

            let opened = match spec {
                SourceSpec::File(path) => self.read_file(ctx, path),
                SourceSpec::Stdin => self.read_stdin(ctx).await,
            };

            match opened {
                Ok(Opened::Done) => {}
                Ok(Opened::Follow(target)) => targets.push(target),
                Ok(Opened::Failed(failure)) => record_failure(&mut failures, failure),
                Err(err) => {
                    self.cancel.cancel();
                    return Err(err);
                }
            }
        }

        if !targets.is_empty() && !self.cancel.is_cancelled() {
            if let Some(err) = self.follow(targets, &mut failures).await {
                return Err(err);
            }
        }

        self.sink.flush()?;
        Ok(RunSummary {
            lines_read: stats.lines_read.load(Ordering::Relaxed),
            lines_emitted: stats.lines_emitted.load(Ordering::Relaxed),
            failures,
        })
    }

    /// Emit the tail of a file and, in follow mode, queue its follower
    fn read_file(&self, mut ctx: SourceContext, path: &Path) -> Result<Opened, SinkError> {
        let read = match read_file_tail(path, self.options.tail, self.options.buffer_size) {
            Ok(read) => read,
            Err(error) => return Ok(Opened::Failed(ctx.failure(error))),
        };

        self.sink.begin_source(&ctx.source)?;
        if !self.options.follow {
            ctx.emit_all(read.into_all_lines())?;
            return Ok(Opened::Done);
        }

        // The follower picks the unterminated remainder up again
        let resume_at = read.resume_at;
        ctx.emit_all(read.lines)?;
        Ok(match Follower::open(path, resume_at, self.options.buffer_size) {
            Ok(follower) => Opened::Follow(FollowTarget::File(ctx, follower)),
            Err(error) => Opened::Failed(ctx.failure(error)),
        })
    }

    /// Tail standard input (static mode) or queue it for streaming
    async fn read_stdin(&self, mut ctx: SourceContext) -> Result<Opened, SinkError> {
        let mut reader = self.take_stdin();
        if self.options.follow {
            return Ok(Opened::Follow(FollowTarget::Stdin(ctx, reader)));
        }

        let mut bytes = Vec::new();
        let result = tokio::select! {
            result = reader.read_to_end(&mut bytes) => result,
            _ = self.cancel.cancelled() => return Ok(Opened::Done),
        };

        let read = result.and_then(|_| {
            read_tail(&mut Cursor::new(bytes), self.options.tail, self.options.buffer_size)
        });
        let read = match read {
            Ok(read) => read,
            Err(source) => {
                let error = SourceError::Read {
                    name: ctx.source.to_string(),
                    source,
                };
                return Ok(Opened::Failed(ctx.failure(error)));
            }
        };

        self.sink.begin_source(&ctx.source)?;
        ctx.emit_all(read.into_all_lines())?;
        Ok(Opened::Done)
    }

    /// Run one task per target until all end or the token is cancelled.
    /// Returns the first sink error, if any.
    async fn follow(
        &self,
        targets: Vec<FollowTarget>,
        failures: &mut Vec<SourceFailure>,
    ) -> Option<SinkError> {
        let tasks = targets.into_iter().map(|target| {
            let cancel = self.cancel.clone();
            let interval = self.options.retry_interval;
            let buffer_size = self.options.buffer_size;

            tokio::spawn(async move {
                let (source, result) = match target {
                    FollowTarget::File(ctx, follower) => {
                        let source = ctx.source.clone();
                        (source, follow_file(ctx, follower, interval, &cancel).await)
                    }
                    FollowTarget::Stdin(ctx, reader) => {
                        let source = ctx.source.clone();
                        (source, stream_stdin(ctx, reader, buffer_size, &cancel).await)
                    }
                };
                if matches!(result, Err(TaskError::Sink(_))) {
                    cancel.cancel();
                }
                (source, result)
            })
        });

        let mut sink_error = None;
        for joined in join_all(tasks).await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((source, Err(TaskError::Source(error)))) => {
                    record_failure(failures, SourceFailure { source, error });
                }
                Ok((_, Err(TaskError::Sink(err)))) => {
                    sink_error.get_or_insert(err);
                }
                Err(err) => warn!(error = %err, "source task did not finish cleanly"),
            }
        }
        sink_error
    }

    fn take_stdin(&self) -> StdinReader {
        self.stdin
            .lock()
            .take()
            .unwrap_or_else(|| Box::new(tokio::io::stdin()))
    }
}

impl SourceContext {
    fn failure(&self, error: SourceError) -> SourceFailure {
        SourceFailure {
            source: self.source.clone(),
            error,
        }
    }
}

fn record_failure(failures: &mut Vec<SourceFailure>, failure: SourceFailure) {
    error!(source = %failure.source, error = %failure.error, "source failed");
    failures.push(failure);
}

fn read_file_tail(path: &Path, mode: TailMode, buffer_size: usize) -> Result<TailRead, SourceError> {
    let name = path.display().to_string();
    let mut file = File::open(path).map_err(|source| SourceError::Open {
        name: name.clone(),
        source,
    })?;
    read_tail(&mut file, mode, buffer_size).map_err(|source| SourceError::Read { name, source })
}

/// Poll a follower until cancelled or until it fails for good
async fn follow_file(
    mut ctx: SourceContext,
    mut follower: Follower,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<(), TaskError> {
    loop {
        match follower.poll() {
            Ok(lines) => ctx.emit_all(lines)?,
            Err(error) if error.is_transient() => {
                warn!(source = %ctx.source, %error, "read failed, retrying");
            }
            Err(error) => return Err(TaskError::Source(error)),
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(source = %ctx.source, "follow cancelled");
                return Ok(());
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// Stream standard input line by line until EOF or cancellation
async fn stream_stdin(
    mut ctx: SourceContext,
    reader: StdinReader,
    buffer_size: usize,
    cancel: &CancellationToken,
) -> Result<(), TaskError> {
    let mut reader = BufReader::with_capacity(buffer_size.max(1), reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => {
                debug!(source = %ctx.source, "end of input");
                return Ok(());
            }
            Ok(_) => ctx.emit(decode_line(&buf))?,
            Err(source) => {
                return Err(TaskError::Source(SourceError::Read {
                    name: ctx.source.to_string(),
                    source,
                }));
            }
        }
    }
}
