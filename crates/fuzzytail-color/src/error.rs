use thiserror::Error;

/// A color token that is neither `0`-`255` nor `#RRGGBB`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid color `{0}`, expected 0-255 or #RRGGBB")]
pub struct InvalidColor(pub String);

/// Errors raised while compiling a rule file.
///
/// Every variant names the 1-based line number and the offending line.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("line {line}: unrecognized directive: {content}")]
    UnknownDirective { line: usize, content: String },

    #[error("line {line}: rule is missing `=<color>`: {content}")]
    MissingColor { line: usize, content: String },

    #[error("line {line}: {source}: {content}")]
    InvalidColor {
        line: usize,
        content: String,
        #[source]
        source: InvalidColor,
    },

    #[error("line {line}: invalid regex: {content}")]
    InvalidPattern {
        line: usize,
        content: String,
        #[source]
        source: regex::Error,
    },

    #[error("line {line}: pattern matches the empty string: {content}")]
    EmptyMatch { line: usize, content: String },
}

impl ConfigError {
    /// 1-based line number of the offending directive
    pub fn line(&self) -> usize {
        match self {
            Self::UnknownDirective { line, .. }
            | Self::MissingColor { line, .. }
            | Self::InvalidColor { line, .. }
            | Self::InvalidPattern { line, .. }
            | Self::EmptyMatch { line, .. } => *line,
        }
    }

    /// The offending directive, trimmed
    pub fn content(&self) -> &str {
        match self {
            Self::UnknownDirective { content, .. }
            | Self::MissingColor { content, .. }
            | Self::InvalidColor { content, .. }
            | Self::InvalidPattern { content, .. }
            | Self::EmptyMatch { content, .. } => content,
        }
    }
}
