//! Shared types for fuzzytail
//!
//! This crate contains data structures used across multiple fuzzytail crates.

use chrono::{DateTime, Utc};
use regex::{Match, Regex};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

// ============================================================================
// Source Types
// ============================================================================

/// Identifier attached to every line read from a source.
///
/// Cheap to clone; one allocation per source, shared by all its lines.
pub type SourceId = Arc<str>;

/// Display name used for standard input
pub const STDIN_NAME: &str = "standard input";

/// A source of log text named on the command line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    File(PathBuf),
    Stdin,
}

impl SourceSpec {
    /// Interpret a command line argument; `-` means standard input
    pub fn from_arg(arg: &Path) -> Self {
        if arg.as_os_str() == "-" {
            Self::Stdin
        } else {
            Self::File(arg.to_path_buf())
        }
    }

    /// Identifier used to tag lines from this source
    pub fn id(&self) -> SourceId {
        match self {
            Self::File(path) => Arc::from(path.display().to_string()),
            Self::Stdin => Arc::from(STDIN_NAME),
        }
    }

    pub fn is_stdin(&self) -> bool {
        matches!(self, Self::Stdin)
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Stdin => f.write_str(STDIN_NAME),
        }
    }
}

// ============================================================================
// Terminal Escapes
// ============================================================================

/// CSI escape sequences (colors, cursor movement)
static ESCAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]").expect("valid escape regex"));

/// Every escape sequence in `text`, in order
pub fn ansi_escapes(text: &str) -> impl Iterator<Item = Match<'_>> {
    ESCAPE_RE.find_iter(text)
}

/// Remove escape sequences, leaving the visible text
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ESCAPE_RE.replace_all(text, "")
}

// ============================================================================
// Log Types
// ============================================================================

/// Log severity level, ordered from least to most severe
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Notice,
    Warn,
    Error,
    Critical,
    Fatal,
}

/// Recognized level spellings. Matched case-insensitively against whole words.
const LEVEL_TOKENS: &[(&str, LogLevel)] = &[
    ("trace", LogLevel::Trace),
    ("debug", LogLevel::Debug),
    ("dbg", LogLevel::Debug),
    ("info", LogLevel::Info),
    ("inf", LogLevel::Info),
    ("notice", LogLevel::Notice),
    ("warn", LogLevel::Warn),
    ("warning", LogLevel::Warn),
    ("wrn", LogLevel::Warn),
    ("error", LogLevel::Error),
    ("err", LogLevel::Error),
    ("crit", LogLevel::Critical),
    ("critical", LogLevel::Critical),
    ("fatal", LogLevel::Fatal),
    ("panic", LogLevel::Fatal),
    ("alert", LogLevel::Fatal),
    ("emerg", LogLevel::Fatal),
    ("emergency", LogLevel::Fatal),
];

impl LogLevel {
    /// Parse a single level token such as `WARN` or `err`
    pub fn from_token(token: &str) -> Option<Self> {
        LEVEL_TOKENS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(token))
            .map(|(_, level)| *level)
    }

    /// Find the first word of `line` that names a level.
    ///
    /// Words are maximal runs of ASCII alphanumerics, so `[ERROR]`,
    /// `level=warn` and `INFO:` are all recognized while `STDERR` is not.
    /// Escape sequences are removed first, so a colored `ERROR` still counts.
    pub fn detect(line: &str) -> Option<Self> {
        strip_ansi(line)
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|word| !word.is_empty())
            .find_map(Self::from_token)
    }

    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Notice => "NOTICE",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single line read from a source
#[derive(Clone, Debug)]
pub struct LogLine {
    /// Source this line was read from
    pub source: SourceId,

    /// Position within the source's stream, starting at 1
    pub seq: u64,

    /// Line text without its terminator (UTF-8 lossy converted)
    pub raw: String,

    /// When the line was read
    pub received_at: DateTime<Utc>,
}

impl LogLine {
    pub fn new(source: SourceId, seq: u64, raw: String) -> Self {
        Self {
            source,
            seq,
            raw,
            received_at: Utc::now(),
        }
    }

    /// Level named by the first level token in the line, if any
    pub fn level(&self) -> Option<LogLevel> {
        LogLevel::detect(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_order() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Fatal);
    }

    #[test]
    fn test_from_token_aliases() {
        assert_eq!(LogLevel::from_token("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_token("err"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_token("Crit"), Some(LogLevel::Critical));
        assert_eq!(LogLevel::from_token("EMERG"), Some(LogLevel::Fatal));
        assert_eq!(LogLevel::from_token("verbose"), None);
    }

    #[test]
    fn test_detect_first_token_wins() {
        assert_eq!(LogLevel::detect("INFO retrying after ERROR"), Some(LogLevel::Info));
        assert_eq!(LogLevel::detect("[2024-01-15] [error] boom"), Some(LogLevel::Error));
        assert_eq!(LogLevel::detect("ts=1 level=warn msg=slow"), Some(LogLevel::Warn));
    }

    #[test]
    fn test_detect_through_color_escapes() {
        assert_eq!(
            LogLevel::detect("\x1b[31mERROR\x1b[0m disk full"),
            Some(LogLevel::Error)
        );
        assert_eq!(
            LogLevel::detect("\x1b[1;33m[warn]\x1b[m slow"),
            Some(LogLevel::Warn)
        );
        // the `m` of an escape must not glue onto the next word
        assert_eq!(LogLevel::detect("\x1b[2mINFO ok"), Some(LogLevel::Info));
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("plain"), "plain");
        assert_eq!(strip_ansi("\x1b[38;5;203mERROR\x1b[0m x"), "ERROR x");
        assert_eq!(strip_ansi("\x1b[38;2;1;2;3ma\x1b[m\x1b[2K"), "a");
        assert_eq!(ansi_escapes("a\x1b[31mb\x1b[0m").count(), 2);
    }

    #[test]
    fn test_detect_ignores_partial_words() {
        assert_eq!(LogLevel::detect("wrote to STDERR"), None);
        assert_eq!(LogLevel::detect("information only"), None);
        assert_eq!(LogLevel::detect(""), None);
    }

    #[test]
    fn test_source_from_arg() {
        assert_eq!(SourceSpec::from_arg(Path::new("-")), SourceSpec::Stdin);
        let spec = SourceSpec::from_arg(Path::new("/var/log/syslog"));
        assert_eq!(&*spec.id(), "/var/log/syslog");
        assert_eq!(&*SourceSpec::Stdin.id(), STDIN_NAME);
    }
}
