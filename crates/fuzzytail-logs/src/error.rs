use std::io;

use thiserror::Error;

/// Invalid filter settings, detected before any source is opened
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid {which} pattern `{pattern}`: {source}")]
    InvalidPattern {
        which: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown log level `{0}`")]
    UnknownLevel(String),
}

/// Failure of a single source. Other sources keep running.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot open {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("error reading {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl SourceError {
    /// Read errors are retried on the next poll; open errors end the source
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Read { .. })
    }
}

/// Failure writing to the output sink
#[derive(Debug, Error)]
pub enum SinkError {
    /// The reader went away (broken pipe)
    #[error("output closed")]
    Closed,

    #[error("failed to write output: {0}")]
    Io(io::Error),

    #[error("failed to encode output record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<io::Error> for SinkError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::BrokenPipe {
            Self::Closed
        } else {
            Self::Io(err)
        }
    }
}

/// Output format name that is not text, json or csv
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown output format `{0}`, expected text, json or csv")]
pub struct UnknownFormat(pub String);
