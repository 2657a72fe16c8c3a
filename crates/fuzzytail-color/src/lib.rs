//! Rule-driven colorizing for fuzzytail
//!
//! This crate compiles rule files into an ordered [`RuleSet`] and applies it
//! to log lines without ever recoloring text that is already colored.

mod color;
mod engine;
mod error;
mod rules;
mod spans;

pub use color::{Color, RESET};
pub use engine::{ColorEngine, ColorSpan};
pub use error::{ConfigError, InvalidColor};
pub use rules::{Rule, RuleKind, RuleSet};
pub use spans::SpanTracker;

// Re-export types used in our public API
pub use fuzzytail_types::{LogLine, strip_ansi};
