use std::ops::Range;

use fuzzytail_types::ansi_escapes;

/// SGR sequences that end a colored span
pub(crate) fn is_reset(escape: &str) -> bool {
    matches!(escape, "\x1b[0m" | "\x1b[m" | "\x1b[39m")
}

fn is_sgr(escape: &str) -> bool {
    escape.ends_with('m')
}

/// Byte ranges of a line that are already colored.
///
/// Ranges are kept sorted and disjoint. Anything registered here is off
/// limits to later rules: a match that shares a byte with a tracked range
/// is never colored.
#[derive(Clone, Debug, Default)]
pub struct SpanTracker {
    spans: Vec<Range<usize>>,
}

impl SpanTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a tracker with the colored spans already present in `text`.
    ///
    /// A span runs from a color escape to the next reset. Escapes outside any
    /// complete span (stray resets, cursor moves, an unterminated color) are
    /// tracked individually so no rule can match inside their bytes.
    pub fn scan(text: &str) -> Self {
        let mut tracker = Self::new();
        if !text.contains('\x1b') {
            return tracker;
        }

        let mut open: Option<usize> = None;
        let mut pending: Vec<Range<usize>> = Vec::new();

        for m in ansi_escapes(text) {
            let escape = m.as_str();
            match open {
                Some(start) if is_reset(escape) => {
                    tracker.register(start..m.end());
                    open = None;
                    pending.clear();
                }
                Some(_) => pending.push(m.range()),
                None if is_sgr(escape) && !is_reset(escape) => {
                    open = Some(m.start());
                    pending.push(m.range());
                }
                None => tracker.register(m.range()),
            }
        }

        for range in pending {
            tracker.register(range);
        }

        tracker
    }

    /// Whether `range` shares at least one byte with a tracked span
    pub fn overlaps(&self, range: &Range<usize>) -> bool {
        let idx = self.spans.partition_point(|s| s.end <= range.start);
        self.spans.get(idx).is_some_and(|s| s.start < range.end)
    }

    /// Track `range` as colored, merging it with any span it overlaps
    pub fn register(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }

        let first = self.spans.partition_point(|s| s.end <= range.start);
        let mut last = first;
        let mut merged = range;
        while last < self.spans.len() && self.spans[last].start < merged.end {
            merged.start = merged.start.min(self.spans[last].start);
            merged.end = merged.end.max(self.spans[last].end);
            last += 1;
        }
        self.spans.splice(first..last, std::iter::once(merged));
    }

    /// Tracked spans in ascending order
    pub fn spans(&self) -> &[Range<usize>] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlaps() {
        let mut tracker = SpanTracker::new();
        tracker.register(5..10);

        assert!(tracker.overlaps(&(0..6)));
        assert!(tracker.overlaps(&(9..12)));
        assert!(tracker.overlaps(&(6..8)));
        assert!(tracker.overlaps(&(0..20)));
        assert!(!tracker.overlaps(&(0..5)));
        assert!(!tracker.overlaps(&(10..15)));
    }

    #[test]
    fn test_register_merges() {
        let mut tracker = SpanTracker::new();
        tracker.register(10..12);
        tracker.register(0..2);
        tracker.register(5..7);
        assert_eq!(tracker.spans(), &[0..2, 5..7, 10..12]);

        tracker.register(6..11);
        assert_eq!(tracker.spans(), &[0..2, 5..12]);

        tracker.register(3..3);
        assert_eq!(tracker.spans(), &[0..2, 5..12]);
    }

    #[test]
    fn test_scan_plain_text() {
        assert!(SpanTracker::scan("nothing colored here").is_empty());
    }

    #[test]
    fn test_scan_complete_span() {
        let text = "ok \x1b[31mred\x1b[0m tail";
        let tracker = SpanTracker::scan(text);
        let end = text.find(" tail").unwrap();
        assert_eq!(tracker.spans(), &[3..end]);
    }

    #[test]
    fn test_scan_stray_and_unterminated() {
        // stray reset, then a color that is never closed
        let text = "a\x1b[0mb \x1b[32mgreen";
        let tracker = SpanTracker::scan(text);
        assert_eq!(tracker.spans(), &[1..5, 7..12]);
        assert!(!tracker.overlaps(&(12..17)));
    }
}
