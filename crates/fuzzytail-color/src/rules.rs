use regex::Regex;

use crate::color::Color;
use crate::error::ConfigError;

/// Whether a rule colors the whole line or each match
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleKind {
    Line,
    Word,
}

impl RuleKind {
    fn directive(&self) -> &'static str {
        match self {
            Self::Line => "line:",
            Self::Word => "word:",
        }
    }
}

/// A compiled pattern-to-color rule
#[derive(Clone, Debug)]
pub struct Rule {
    kind: RuleKind,
    pattern: Regex,
    color: Color,
}

impl Rule {
    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn color(&self) -> Color {
        self.color
    }
}

/// Ordered, validated set of coloring rules.
///
/// Rules keep their declaration order: the first matching line rule wins,
/// and earlier word rules claim text before later ones see it.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    base_color: Option<Color>,
    rules: Vec<Rule>,
}

enum Directive {
    Base(Color),
    Rule(Rule),
}

impl RuleSet {
    /// Compile a sequence of rule file lines.
    ///
    /// Blank lines and `#` comments are skipped. `base:` may appear several
    /// times; the last one wins.
    pub fn compile<'a, I>(directives: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut set = Self::default();

        for (idx, raw) in directives.into_iter().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match compile_directive(idx + 1, line)? {
                Directive::Base(color) => set.base_color = Some(color),
                Directive::Rule(rule) => set.rules.push(rule),
            }
        }

        Ok(set)
    }

    /// Compile the full text of a rule file
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Self::compile(contents.lines())
    }

    /// Replace the base color, e.g. with an override resolved at startup
    pub fn with_base_color(mut self, base_color: Option<Color>) -> Self {
        self.base_color = base_color;
        self
    }

    pub fn base_color(&self) -> Option<Color> {
        self.base_color
    }

    /// All rules in declaration order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Line rules in declaration order
    pub fn line_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.kind == RuleKind::Line)
    }

    /// Word rules in declaration order
    pub fn word_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.kind == RuleKind::Word)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn compile_directive(line_no: usize, line: &str) -> Result<Directive, ConfigError> {
    if let Some(value) = line.strip_prefix("base:") {
        let color = value
            .trim()
            .parse()
            .map_err(|source| ConfigError::InvalidColor {
                line: line_no,
                content: line.to_string(),
                source,
            })?;
        return Ok(Directive::Base(color));
    }

    for kind in [RuleKind::Line, RuleKind::Word] {
        if let Some(body) = line.strip_prefix(kind.directive()) {
            return compile_rule(line_no, line, kind, body).map(Directive::Rule);
        }
    }

    Err(ConfigError::UnknownDirective {
        line: line_no,
        content: line.to_string(),
    })
}

fn compile_rule(line_no: usize, line: &str, kind: RuleKind, body: &str) -> Result<Rule, ConfigError> {
    // Split at the last '=' so patterns may contain '='
    let Some(eq) = body.rfind('=') else {
        return Err(ConfigError::MissingColor {
            line: line_no,
            content: line.to_string(),
        });
    };

    let pattern_src = body[..eq].trim();
    let color = body[eq + 1..]
        .trim()
        .parse()
        .map_err(|source| ConfigError::InvalidColor {
            line: line_no,
            content: line.to_string(),
            source,
        })?;

    let pattern = Regex::new(pattern_src).map_err(|source| ConfigError::InvalidPattern {
        line: line_no,
        content: line.to_string(),
        source,
    })?;

    if pattern.is_match("") {
        return Err(ConfigError::EmptyMatch {
            line: line_no,
            content: line.to_string(),
        });
    }

    Ok(Rule {
        kind,
        pattern,
        color,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_preserves_order() {
        let set = RuleSet::parse(
            "# theme\n\
             word:ERROR=203\n\
             line:ALERT=196\n\
             \n\
             word:WARN=#ffaa00\n\
             line:PANIC=160\n",
        )
        .unwrap();

        let patterns: Vec<_> = set.rules().iter().map(|r| r.pattern().as_str()).collect();
        assert_eq!(patterns, ["ERROR", "ALERT", "WARN", "PANIC"]);

        let lines: Vec<_> = set.line_rules().map(|r| r.pattern().as_str()).collect();
        assert_eq!(lines, ["ALERT", "PANIC"]);

        let words: Vec<_> = set.word_rules().map(|r| r.pattern().as_str()).collect();
        assert_eq!(words, ["ERROR", "WARN"]);
        assert_eq!(set.base_color(), None);
    }

    #[test]
    fn test_last_base_wins() {
        let set = RuleSet::parse("base:250\nword:x=1\nbase: #102030\n").unwrap();
        assert_eq!(
            set.base_color(),
            Some(Color::TrueColor { r: 16, g: 32, b: 48 })
        );
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_pattern_may_contain_equals() {
        let set = RuleSet::parse("word:level=error=203").unwrap();
        let rule = &set.rules()[0];
        assert_eq!(rule.pattern().as_str(), "level=error");
        assert_eq!(rule.color(), Color::Xterm256(203));
        assert_eq!(rule.kind(), RuleKind::Word);
    }

    #[test]
    fn test_unknown_directive_reports_position() {
        let err = RuleSet::parse("word:a=1\n\n  colour:red  \n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDirective { .. }));
        assert_eq!(err.line(), 3);
        assert_eq!(err.content(), "colour:red");
    }

    #[test]
    fn test_invalid_regex() {
        let err = RuleSet::parse("line:([unclosed=196").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { line: 1, .. }));
    }

    #[test]
    fn test_invalid_color() {
        let err = RuleSet::parse("word:x=300").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidColor { line: 1, .. }));

        let err = RuleSet::parse("base:blue").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidColor { line: 1, .. }));
    }

    #[test]
    fn test_missing_color() {
        let err = RuleSet::parse("word:ERROR").unwrap_err();
        assert!(matches!(err, ConfigError::MissingColor { line: 1, .. }));
    }

    #[test]
    fn test_empty_matching_patterns_rejected() {
        for src in ["word:=1", "word:x*=1", "line:^=1", "word:(a|)=1"] {
            let err = RuleSet::parse(src).unwrap_err();
            assert!(matches!(err, ConfigError::EmptyMatch { .. }), "{src}");
        }
    }

    #[test]
    fn test_with_base_color_override() {
        let set = RuleSet::parse("base:250").unwrap().with_base_color(Some(Color::Xterm256(7)));
        assert_eq!(set.base_color(), Some(Color::Xterm256(7)));
    }
}
