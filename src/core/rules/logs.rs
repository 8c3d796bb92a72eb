// src/core/rules/logs.rs

//! Turns a raw container log tail into structured, bounded log attachments.

use crate::core::alert::{LogLine, LogSeverity};
use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;

/// Number of tail lines requested from the container.
pub const TAIL_LINES: i64 = 50;
/// Upper bound for the serialized JSON size of the attached log block.
pub const MAX_SERIALIZED_BYTES: usize = 24 * 1024;

lazy_static! {
    /// First severity token found wins. The scan is substring-based and
    /// case-insensitive; tokens inside URLs, paths or longer words will
    /// match too.
    static ref SEVERITY: Regex = Regex::new(
        r"(?i)(ERROR|ERR|FATAL|PANIC|SEVERE|CRITICAL|CRIT|EMERGENCY|EMERG|WARNING|WARN|WRN|DEBUG|TRACE|FINEST|FINER|FINE|INFO)"
    )
    .unwrap();

    static ref TS_RFC3339: Regex =
        Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})").unwrap();
    static ref TS_DATETIME: Regex =
        Regex::new(r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:[.,]\d{1,9})?").unwrap();
    static ref TS_EPOCH_MILLIS: Regex = Regex::new(r"\b\d{13}\b").unwrap();
    static ref TS_EPOCH_SECS: Regex = Regex::new(r"\b\d{10}\b").unwrap();
    static ref TS_US_DATETIME: Regex =
        Regex::new(r"\d{2}/\d{2}/\d{4} \d{2}:\d{2}:\d{2}").unwrap();
    static ref TS_SYSLOG: Regex =
        Regex::new(r"(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec) +\d{1,2} \d{2}:\d{2}:\d{2}").unwrap();
}

/// Parses the raw log tail into structured lines. Lines without a
/// recognizable timestamp get `now`; lines without a severity token are INFO.
pub fn parse_log_lines(raw: &str, now: DateTime<Utc>) -> Vec<LogLine> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| LogLine {
            timestamp: extract_timestamp(line, now).unwrap_or(now),
            level: detect_severity(line),
            body: line.to_string(),
        })
        .collect()
}

/// Truncates the log block so its serialized JSON stays within the size
/// budget; the first line that would exceed the bound is dropped along with
/// everything after it.
pub fn truncate_to_budget(lines: Vec<LogLine>) -> Vec<LogLine> {
    // Account for the enclosing brackets and inter-element commas.
    let mut size = 2usize;
    let mut kept = Vec::with_capacity(lines.len());
    for line in lines {
        let encoded = match serde_json::to_vec(&line) {
            Ok(bytes) => bytes.len(),
            Err(_) => continue,
        };
        let separator = if kept.is_empty() { 0 } else { 1 };
        if size + encoded + separator > MAX_SERIALIZED_BYTES {
            break;
        }
        size += encoded + separator;
        kept.push(line);
    }
    kept
}

fn detect_severity(line: &str) -> LogSeverity {
    let Some(token) = SEVERITY.find(line) else {
        return LogSeverity::Info;
    };
    match token.as_str().to_uppercase().as_str() {
        "ERROR" | "ERR" | "FATAL" | "PANIC" | "SEVERE" | "CRITICAL" | "CRIT" | "EMERGENCY"
        | "EMERG" => LogSeverity::Error,
        "WARN" | "WARNING" | "WRN" => LogSeverity::Warn,
        "DEBUG" | "TRACE" | "FINE" | "FINER" | "FINEST" => LogSeverity::Debug,
        _ => LogSeverity::Info,
    }
}

/// Tries each timestamp pattern in priority order.
fn extract_timestamp(line: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(m) = TS_RFC3339.find(line) {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(m.as_str()) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    if let Some(m) = TS_DATETIME.find(line) {
        let normalized = m.as_str().replace(',', ".");
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%.f") {
            return Some(naive.and_utc());
        }
    }

    if let Some(m) = TS_EPOCH_MILLIS.find(line) {
        if let Ok(millis) = m.as_str().parse::<i64>() {
            if let Some(parsed) = Utc.timestamp_millis_opt(millis).single() {
                return Some(parsed);
            }
        }
    }

    if let Some(m) = TS_EPOCH_SECS.find(line) {
        if let Ok(secs) = m.as_str().parse::<i64>() {
            if let Some(parsed) = Utc.timestamp_opt(secs, 0).single() {
                return Some(parsed);
            }
        }
    }

    if let Some(m) = TS_US_DATETIME.find(line) {
        if let Ok(naive) = NaiveDateTime::parse_from_str(m.as_str(), "%m/%d/%Y %H:%M:%S") {
            return Some(naive.and_utc());
        }
    }

    if let Some(m) = TS_SYSLOG.find(line) {
        // Syslog timestamps carry no year; assume the current one.
        let with_year = format!("{} {}", now.year(), m.as_str());
        if let Ok(naive) = NaiveDateTime::parse_from_str(&with_year, "%Y %b %e %H:%M:%S") {
            return Some(naive.and_utc());
        }
    }

    None
}
