use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use fuzzytail_types::{LogLevel, LogLine};

use crate::error::UnknownFormat;

/// How accepted lines are written
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// The line itself, colorized when coloring is on
    #[default]
    Text,
    /// One JSON object per line
    Json,
    /// Comma separated values with a header row
    Csv,
}

pub(crate) const CSV_HEADER: &str = "source,seq,level,received_at,raw\n";

#[derive(Serialize)]
struct JsonRecord<'a> {
    source: &'a str,
    seq: u64,
    level: Option<LogLevel>,
    received_at: &'a DateTime<Utc>,
    raw: &'a str,
}

impl OutputFormat {
    /// Whether lines are colorized before being written
    pub fn colorizes(&self) -> bool {
        matches!(self, Self::Text)
    }

    /// Whether `==> name <==` headers make sense for this format
    pub fn has_headers(&self) -> bool {
        matches!(self, Self::Text)
    }

    /// Append one encoded record (with its newline) to `out`.
    ///
    /// `rendered` is only used by `Text`; structured formats always carry
    /// the raw line.
    pub(crate) fn encode(
        &self,
        line: &LogLine,
        rendered: &str,
        out: &mut Vec<u8>,
    ) -> Result<(), serde_json::Error> {
        match self {
            Self::Text => out.extend_from_slice(rendered.as_bytes()),
            Self::Json => {
                let record = JsonRecord {
                    source: &line.source,
                    seq: line.seq,
                    level: line.level(),
                    received_at: &line.received_at,
                    raw: &line.raw,
                };
                serde_json::to_writer(&mut *out, &record)?;
            }
            Self::Csv => {
                let level = line.level().map(|l| l.as_str()).unwrap_or_default();
                let fields = [
                    csv_field(&line.source),
                    csv_field(&line.seq.to_string()),
                    csv_field(level),
                    csv_field(&line.received_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
                    csv_field(&line.raw),
                ];
                out.extend_from_slice(fields.join(",").as_bytes());
            }
        }
        out.push(b'\n');
        Ok(())
    }
}

/// Quote a field when it contains a delimiter, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl FromStr for OutputFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Csv => "csv",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn encode(format: OutputFormat, raw: &str, rendered: &str) -> String {
        let line = LogLine::new(Arc::from("app.log"), 7, raw.to_string());
        let mut out = Vec::new();
        format.encode(&line, rendered, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!(
            "yaml".parse::<OutputFormat>(),
            Err(UnknownFormat("yaml".to_string()))
        );
    }

    #[test]
    fn test_text_uses_rendered_line() {
        assert_eq!(
            encode(OutputFormat::Text, "ERROR x", "\x1b[31mERROR\x1b[0m x"),
            "\x1b[31mERROR\x1b[0m x\n"
        );
    }

    #[test]
    fn test_json_record() {
        let out = encode(OutputFormat::Json, "ERROR disk \"full\"", "ignored");
        let value: serde_json::Value = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(value["source"], "app.log");
        assert_eq!(value["seq"], 7);
        assert_eq!(value["level"], "ERROR");
        assert_eq!(value["raw"], "ERROR disk \"full\"");
        assert!(value["received_at"].is_string());
    }

    #[test]
    fn test_json_without_level() {
        let out = encode(OutputFormat::Json, "plain", "plain");
        let value: serde_json::Value = serde_json::from_str(out.trim_end()).unwrap();
        assert!(value["level"].is_null());
    }

    #[test]
    fn test_csv_quoting() {
        let out = encode(OutputFormat::Csv, "WARN a,b \"q\"", "ignored");
        assert!(out.starts_with("app.log,7,WARN,"));
        assert!(out.ends_with(",\"WARN a,b \"\"q\"\"\"\n"));
    }

    #[test]
    fn test_csv_field() {
        assert_eq!(csv_field("simple"), "simple");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
