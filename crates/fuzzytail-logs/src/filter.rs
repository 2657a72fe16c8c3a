use regex::Regex;

use fuzzytail_types::{LogLevel, LogLine};

use crate::error::FilterError;

/// Accept/reject criteria for log lines.
///
/// Built once at startup and shared read-only by every source. Filtering
/// always happens before coloring and never looks at color rules.
#[derive(Clone, Default)]
pub struct FilterSpec {
    /// Lines must match this (if set)
    include: Option<Regex>,

    /// Lines must not match this (if set)
    exclude: Option<Regex>,

    /// Minimum severity (if set)
    level_threshold: Option<LogLevel>,
}

impl FilterSpec {
    /// Compile filter settings taken from the command line
    pub fn new(
        include: Option<&str>,
        exclude: Option<&str>,
        level: Option<&str>,
    ) -> Result<Self, FilterError> {
        let include = include.map(|p| compile("include", p)).transpose()?;
        let exclude = exclude.map(|p| compile("exclude", p)).transpose()?;
        let level_threshold = level
            .map(|name| {
                LogLevel::from_token(name.trim())
                    .ok_or_else(|| FilterError::UnknownLevel(name.to_string()))
            })
            .transpose()?;

        Ok(Self {
            include,
            exclude,
            level_threshold,
        })
    }

    /// Set the minimum level
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level_threshold = Some(level);
        self
    }

    /// Check if a log line passes this filter
    pub fn accept(&self, line: &LogLine) -> bool {
        self.accepts(&line.raw)
    }

    /// Check raw line text.
    ///
    /// Order is fixed: level, then include, then exclude. A line without a
    /// level token fails an active level filter.
    pub fn accepts(&self, raw: &str) -> bool {
        if let Some(threshold) = self.level_threshold {
            match LogLevel::detect(raw) {
                Some(level) if level >= threshold => {}
                _ => return false,
            }
        }

        if let Some(include) = &self.include {
            if !include.is_match(raw) {
                return false;
            }
        }

        if let Some(exclude) = &self.exclude {
            if exclude.is_match(raw) {
                return false;
            }
        }

        true
    }
}

fn compile(which: &'static str, pattern: &str) -> Result<Regex, FilterError> {
    Regex::new(pattern).map_err(|source| FilterError::InvalidPattern {
        which,
        pattern: pattern.to_string(),
        source,
    })
}

impl std::fmt::Debug for FilterSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterSpec")
            .field("include", &self.include.as_ref().map(Regex::as_str))
            .field("exclude", &self.exclude.as_ref().map(Regex::as_str))
            .field("level_threshold", &self.level_threshold)
            .finish()
    }
}
