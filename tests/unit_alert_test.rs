use kubalert::core::alert::{AlertIntent, EventType, LogSeverity, Priority};

#[tokio::test]
async fn test_event_type_serializes_uppercase() {
    assert_eq!(
        serde_json::to_string(&EventType::Alert).unwrap(),
        "\"ALERT\""
    );
    assert_eq!(
        serde_json::to_string(&EventType::Resolve).unwrap(),
        "\"RESOLVE\""
    );
}

#[tokio::test]
async fn test_priority_parses_and_displays() {
    assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
    assert_eq!("LOW".parse::<Priority>().unwrap(), Priority::Low);
    assert_eq!(Priority::Low.to_string(), "LOW");
    assert!("medium".parse::<Priority>().is_err());
    assert!("high".parse::<Priority>().is_err());
}

#[tokio::test]
async fn test_log_severity_serializes_uppercase() {
    assert_eq!(
        serde_json::to_string(&LogSeverity::Error).unwrap(),
        "\"ERROR\""
    );
    assert_eq!(
        serde_json::to_string(&LogSeverity::Debug).unwrap(),
        "\"DEBUG\""
    );
}

#[tokio::test]
async fn test_intent_constructors_set_event_type() {
    let alert = AlertIntent::alert("ns/web", "down", Priority::High);
    assert_eq!(alert.event_type, EventType::Alert);
    assert_eq!(alert.priority, Priority::High);
    assert!(alert.logs.is_empty());

    let resolve = AlertIntent::resolve("ns/web", "up");
    assert_eq!(resolve.event_type, EventType::Resolve);
    assert_eq!(resolve.key, "ns/web");
}
