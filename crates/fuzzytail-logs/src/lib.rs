//! Log processing for fuzzytail
//!
//! This crate provides line filtering, tail reads, follow-mode polling,
//! output formatting, and the per-source streaming loop.

mod error;
mod filter;
mod follow;
mod output;
mod sink;
mod split;
mod stream;
mod tail;

pub use error::{FilterError, SinkError, SourceError, UnknownFormat};
pub use filter::FilterSpec;
pub use follow::{FollowState, Follower};
pub use output::OutputFormat;
pub use sink::{HeaderMode, OutputSink};
pub use split::{LineSplitter, decode_line};
pub use stream::{
    DEFAULT_BUFFER_SIZE, DEFAULT_RETRY_INTERVAL, Pipeline, RunSummary, SourceFailure, StreamOptions,
    StreamProcessor,
};
pub use tail::{TailMode, TailRead, read_tail};

// Re-export types used in our public API
pub use fuzzytail_types::{LogLevel, LogLine, SourceId, SourceSpec};
