use chrono::{TimeZone, Utc};
use kubalert::core::alert::LogSeverity;
use kubalert::core::rules::logs::{
    MAX_SERIALIZED_BYTES, TAIL_LINES, parse_log_lines, truncate_to_budget,
};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn level_of(line: &str) -> LogSeverity {
    parse_log_lines(line, now())[0].level
}

#[tokio::test]
async fn test_severity_mapping_follows_conventions() {
    assert_eq!(level_of("PANIC: stack overflow"), LogSeverity::Error);
    assert_eq!(level_of("err: connection refused"), LogSeverity::Error);
    assert_eq!(level_of("CRITICAL failure in shard 3"), LogSeverity::Error);
    assert_eq!(level_of("level=warning msg=x"), LogSeverity::Warn);
    assert_eq!(level_of("WRN disk almost full"), LogSeverity::Warn);
    assert_eq!(level_of("TRACE entering loop"), LogSeverity::Debug);
    assert_eq!(level_of("FINEST detail"), LogSeverity::Debug);
    assert_eq!(level_of("INFO started"), LogSeverity::Info);
    assert_eq!(level_of("plain line with nothing"), LogSeverity::Info);
}

#[tokio::test]
async fn test_severity_matches_inside_words_and_urls() {
    // Substring scanning is the documented behavior, false positives and all.
    assert_eq!(level_of("GET https://api/error/42 200"), LogSeverity::Error);
    assert_eq!(level_of("calling myERRhandler now"), LogSeverity::Error);
    assert_eq!(level_of("12 bytes transferred"), LogSeverity::Error);
    assert_eq!(level_of("warnings were suppressed"), LogSeverity::Warn);
}

#[tokio::test]
async fn test_rfc3339_timestamp_takes_priority() {
    let lines = parse_log_lines("2023-04-05T06:07:08Z 1680674828 mixed line", now());
    assert_eq!(lines[0].timestamp.to_rfc3339(), "2023-04-05T06:07:08+00:00");
}

#[tokio::test]
async fn test_datetime_with_comma_fraction() {
    let lines = parse_log_lines("2023-04-05 06:07:08,123 INFO ready", now());
    assert_eq!(lines[0].timestamp.timestamp_millis() % 1000, 123);
}

#[tokio::test]
async fn test_epoch_timestamps() {
    let secs = parse_log_lines("ts=1680674828 msg=x", now());
    assert_eq!(secs[0].timestamp.timestamp(), 1680674828);

    let millis = parse_log_lines("ts=1680674828123 msg=x", now());
    assert_eq!(millis[0].timestamp.timestamp_millis(), 1680674828123);
}

#[tokio::test]
async fn test_us_datetime_format() {
    let lines = parse_log_lines("04/05/2023 06:07:08 started", now());
    assert_eq!(
        lines[0].timestamp,
        Utc.with_ymd_and_hms(2023, 4, 5, 6, 7, 8).unwrap()
    );
}

#[tokio::test]
async fn test_syslog_format_assumes_current_year() {
    let lines = parse_log_lines("Apr  5 06:07:08 host daemon: ready", now());
    assert_eq!(
        lines[0].timestamp,
        Utc.with_ymd_and_hms(2024, 4, 5, 6, 7, 8).unwrap()
    );
}

#[tokio::test]
async fn test_unknown_lines_fall_back_to_now() {
    let lines = parse_log_lines("no timestamp here\n", now());
    assert_eq!(lines[0].timestamp, now());
}

#[tokio::test]
async fn test_blank_lines_are_dropped() {
    let lines = parse_log_lines("one\n\n   \ntwo\n", now());
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].body, "one");
    assert_eq!(lines[1].body, "two");
}

#[tokio::test]
async fn test_truncation_respects_serialized_budget() {
    let big_line = "x".repeat(1024);
    let raw = (0..TAIL_LINES)
        .map(|_| big_line.clone())
        .collect::<Vec<_>>()
        .join("\n");
    let lines = parse_log_lines(&raw, now());
    let kept = truncate_to_budget(lines);

    assert!(!kept.is_empty());
    assert!((kept.len() as i64) < TAIL_LINES);
    let total = serde_json::to_vec(&kept).unwrap().len();
    assert!(total <= MAX_SERIALIZED_BYTES);
}

#[tokio::test]
async fn test_small_blocks_are_untouched() {
    let lines = parse_log_lines("a\nb\nc\n", now());
    let kept = truncate_to_budget(lines.clone());
    assert_eq!(kept, lines);
}
