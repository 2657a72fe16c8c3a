use std::ops::Range;
use std::sync::Arc;

use fuzzytail_types::{LogLine, ansi_escapes};

use crate::color::{Color, RESET};
use crate::rules::{Rule, RuleSet};
use crate::spans::{SpanTracker, is_reset};

/// A region of the raw line claimed by a word rule
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorSpan {
    pub range: Range<usize>,
    pub color: Color,
}

/// Applies a [`RuleSet`] to individual lines.
///
/// The engine holds no mutable state, so one instance can be shared by every
/// source task.
#[derive(Clone, Debug)]
pub struct ColorEngine {
    rules: Arc<RuleSet>,
}

impl ColorEngine {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }

    /// Colorize a log line
    pub fn apply(&self, line: &LogLine) -> String {
        self.colorize(&line.raw)
    }

    /// Colorize raw line text.
    ///
    /// The first matching line rule colors the whole line and nothing else
    /// runs. Otherwise word rules color their matches in declaration order
    /// and the result is wrapped in the base color, if one is set.
    ///
    /// Resets already present in the input end only their own span: the
    /// line or base color is re-emitted after each one.
    pub fn colorize(&self, raw: &str) -> String {
        if let Some(rule) = self.rules.line_rules().find(|r| r.pattern().is_match(raw)) {
            return wrap_line(raw, rule.color());
        }

        let base = self.rules.base_color();
        let spans = self.word_spans(raw);
        if spans.is_empty() && base.is_none() {
            return raw.to_string();
        }

        let tint = base.map(|color| color.fg_escape());
        let restore = tint.as_deref().unwrap_or(RESET);

        let mut out = String::with_capacity(raw.len() + (spans.len() + 1) * 32);
        if let Some(tint) = &tint {
            out.push_str(tint);
        }

        // escapes are never inside a span, so every segment holds whole ones
        let mut cursor = 0;
        for span in &spans {
            push_restoring(&mut out, &raw[cursor..span.range.start], tint.as_deref());
            span.color.write_fg(&mut out);
            out.push_str(&raw[span.range.clone()]);
            out.push_str(restore);
            cursor = span.range.end;
        }
        push_restoring(&mut out, &raw[cursor..], tint.as_deref());

        if tint.is_some() {
            out.push_str(RESET);
        }
        out
    }

    /// Regions claimed by word rules, sorted by position.
    ///
    /// Matches are searched in the raw text. A match touching a region that
    /// is already colored (by the input itself or by an earlier rule) is
    /// dropped.
    pub fn word_spans(&self, raw: &str) -> Vec<ColorSpan> {
        let mut tracker = SpanTracker::scan(raw);
        let mut spans = Vec::new();

        for rule in self.rules.word_rules() {
            let claimed = claim_matches(rule, raw, &tracker);
            for range in claimed {
                tracker.register(range.clone());
                spans.push(ColorSpan {
                    range,
                    color: rule.color(),
                });
            }
        }

        spans.sort_by_key(|s| s.range.start);
        spans
    }
}

fn wrap_line(raw: &str, color: Color) -> String {
    let tint = color.fg_escape();
    let mut out = String::with_capacity(raw.len() + 24);
    out.push_str(&tint);
    push_restoring(&mut out, raw, Some(&tint));
    out.push_str(RESET);
    out
}

/// Copy `text` into `out`, re-emitting `tint` after every reset in it
fn push_restoring(out: &mut String, text: &str, tint: Option<&str>) {
    let Some(tint) = tint else {
        out.push_str(text);
        return;
    };

    let mut cursor = 0;
    for m in ansi_escapes(text).filter(|m| is_reset(m.as_str())) {
        out.push_str(&text[cursor..m.end()]);
        out.push_str(tint);
        cursor = m.end();
    }
    out.push_str(&text[cursor..]);
}

/// Leftmost-first, non-overlapping matches of one rule that avoid `tracker`
fn claim_matches(rule: &Rule, raw: &str, tracker: &SpanTracker) -> Vec<Range<usize>> {
    let mut claimed = Vec::new();
    let mut pos = 0;

    while pos <= raw.len() {
        let Some(m) = rule.pattern().find_at(raw, pos) else {
            break;
        };

        if m.is_empty() || tracker.overlaps(&m.range()) {
            pos = next_char_boundary(raw, m.start());
            continue;
        }

        claimed.push(m.range());
        pos = m.end();
    }

    claimed
}

/// Byte index of the character after `idx`, or past the end at end of text
fn next_char_boundary(text: &str, idx: usize) -> usize {
    text[idx..]
        .chars()
        .next()
        .map_or(text.len() + 1, |c| idx + c.len_utf8())
}
