//! System log handler.

use super::{Handler, HandlerError, Metrics, parse_blocking, read_input};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

// `2024-01-15 10:30:00 ERROR Connection refused`
static LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})\s+([A-Za-z]+)\s+(.*)$")
        .expect("log line regex should be valid")
});

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    fn parse(level: &str) -> Option<Self> {
        match level.to_ascii_uppercase().as_str() {
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" | "WARNING" => Some(LogLevel::Warn),
            "ERROR" => Some(LogLevel::Error),
            "FATAL" => Some(LogLevel::Fatal),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        };
        f.write_str(name)
    }
}

/// A line that did not match the expected log format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedLine {
    /// 1-based line number.
    pub line: usize,
    pub content: String,
}

/// Metrics for a log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMetrics {
    /// Non-blank lines, valid or not.
    pub total_lines: usize,
    /// Count of valid lines per level.
    pub levels: BTreeMap<LogLevel, usize>,
    /// Lines that could not be parsed.
    pub malformed: Vec<MalformedLine>,
}

impl LogMetrics {
    pub fn valid_lines(&self) -> usize {
        self.levels.values().sum()
    }
}

/// Handles `.log` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHandler;

#[async_trait]
impl Handler for LogHandler {
    async fn process(&self, path: &Path) -> Result<Metrics, HandlerError> {
        let content = read_input(path).await?;
        parse_blocking(content, |content| parse_log(content).map(Metrics::Log)).await
    }
}

fn parse_line(line: &str) -> Option<LogLevel> {
    let captures = LINE_REGEX.captures(line)?;
    NaiveDateTime::parse_from_str(&captures[1], TIMESTAMP_FORMAT).ok()?;
    LogLevel::parse(&captures[2])
}

/// Parse log content.
///
/// Malformed lines are collected rather than failing the file; a file whose
/// every non-blank line is malformed is a parse error.
pub fn parse_log(content: &str) -> Result<LogMetrics, HandlerError> {
    let mut metrics = LogMetrics { total_lines: 0, levels: BTreeMap::new(), malformed: Vec::new() };

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        metrics.total_lines += 1;

        match parse_line(line) {
            Some(level) => *metrics.levels.entry(level).or_insert(0) += 1,
            None => metrics
                .malformed
                .push(MalformedLine { line: index + 1, content: line.to_string() }),
        }
    }

    if metrics.total_lines > 0 && metrics.valid_lines() == 0 {
        return Err(HandlerError::Parse(format!(
            "none of {} lines match `YYYY-MM-DD HH:MM:SS LEVEL message`",
            metrics.total_lines
        )));
    }

    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_levels() {
        let content = "2024-01-15 10:30:00 INFO Service started\n\
                       2024-01-15 10:31:00 WARNING Disk at 80%\n\
                       2024-01-15 10:32:00 ERROR Connection refused\n\
                       2024-01-15 10:33:00 INFO Retrying\n";
        let metrics = parse_log(content).unwrap();
        assert_eq!(metrics.total_lines, 4);
        assert_eq!(metrics.levels[&LogLevel::Info], 2);
        assert_eq!(metrics.levels[&LogLevel::Warn], 1);
        assert_eq!(metrics.levels[&LogLevel::Error], 1);
        assert!(metrics.malformed.is_empty());
    }

    #[test]
    fn test_malformed_lines_are_collected() {
        let content = "2024-01-15 10:30:00 INFO ok\n\
                       \n\
                       garbage line\n\
                       2024-13-45 10:30:00 INFO bad date\n\
                       2024-01-15 10:30:00 TRACE unknown level\n\
                       2024-01-15 10:31:00 ERROR boom\n";
        let metrics = parse_log(content).unwrap();
        assert_eq!(metrics.total_lines, 5);
        assert_eq!(metrics.valid_lines(), 2);
        assert_eq!(metrics.malformed.len(), 3);
        assert_eq!(
            metrics.malformed[0],
            MalformedLine { line: 3, content: "garbage line".to_string() }
        );
    }

    #[test]
    fn test_all_malformed_is_parse_error() {
        let err = parse_log("not a log\nstill not\n").unwrap_err();
        assert!(matches!(err, HandlerError::Parse(_)));
    }

    #[test]
    fn test_empty_log_is_empty_metrics() {
        let metrics = parse_log("\n\n").unwrap();
        assert_eq!(metrics.total_lines, 0);
        assert!(metrics.levels.is_empty());
    }

    #[test]
    fn test_level_serializes_uppercase() {
        let metrics = parse_log("2024-01-15 10:30:00 fatal oh no\n").unwrap();
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["levels"]["FATAL"], 1);
    }
}
