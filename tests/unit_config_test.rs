use kubalert::config::{Config, Flags, title_case};
use kubalert::core::alert::Priority;
use std::io::Write;
use std::time::Duration;

fn valid_config() -> Config {
    let mut config = Config::default();
    config.settings.api_key = "test-key".to_string();
    config
}

#[tokio::test]
async fn test_defaults_match_agent_conventions() {
    let config = Config::default();
    assert_eq!(config.settings.namespace, "kube-system");
    assert_eq!(config.settings.port, 9092);
    assert_eq!(config.settings.election_id, "kubalert");
    assert_eq!(config.settings.check_interval, Duration::from_secs(15));
    assert_eq!(config.settings.log.level, "info");
    assert!(!config.settings.log.json);

    assert!(config.alarms.cluster.enabled);
    assert_eq!(config.alarms.cluster.priority, Priority::High);
    assert_eq!(config.alarms.pods.terminate.priority, Priority::High);
    assert_eq!(config.alarms.pods.waiting.priority, Priority::Low);
    assert_eq!(config.alarms.pods.restarts.threshold, 10);
    assert_eq!(config.alarms.pods.resources.cpu.threshold, 90);
    assert_eq!(config.alarms.nodes.resources.memory.threshold, 90);
}

#[tokio::test]
async fn test_validate_requires_api_key() {
    let config = Config::default();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("API key"));
}

#[tokio::test]
async fn test_validate_requires_namespace_and_election_id() {
    let mut config = valid_config();
    config.settings.namespace = "  ".to_string();
    assert!(config.validate().is_err());

    let mut config = valid_config();
    config.settings.election_id = String::new();
    assert!(config.validate().is_err());
}

#[tokio::test]
async fn test_validate_rejects_bad_log_level() {
    let mut config = valid_config();
    config.settings.log.level = "verbose".to_string();
    assert!(config.validate().is_err());
}

#[tokio::test]
async fn test_validate_rejects_out_of_range_thresholds() {
    let mut config = valid_config();
    config.alarms.pods.resources.cpu.threshold = 0;
    assert!(config.validate().is_err());

    let mut config = valid_config();
    config.alarms.pods.resources.memory.threshold = 101;
    assert!(config.validate().is_err());

    let mut config = valid_config();
    config.alarms.pods.restarts.threshold = 0;
    assert!(config.validate().is_err());
}

#[tokio::test]
async fn test_api_keys_split_and_trim() {
    let mut config = valid_config();
    config.settings.api_key = "keyA, keyB,,  keyC ".to_string();
    assert_eq!(config.api_keys(), vec!["keyA", "keyB", "keyC"]);
}

#[tokio::test]
async fn test_cluster_key_format() {
    let mut config = valid_config();
    config.settings.namespace = "monitoring".to_string();
    config.settings.election_id = "agent".to_string();
    assert_eq!(config.cluster_key(), "monitoring/agent");
}

#[tokio::test]
async fn test_title_case_for_link_env_names() {
    assert_eq!(title_case("GRAFANA_BOARD"), "Grafana Board");
    assert_eq!(title_case("metrics"), "Metrics");
    assert_eq!(title_case("A__B"), "A B");
}

#[tokio::test]
async fn test_sanitized_masks_credentials() {
    let mut config = valid_config();
    config.settings.http_authorization_key = "secret".to_string();
    let sanitized = config.sanitized();
    assert_eq!(sanitized.settings.api_key, "********");
    assert_eq!(sanitized.settings.http_authorization_key, "********");
    // Empty credentials stay empty rather than pretending one is set.
    let empty = Config::default().sanitized();
    assert_eq!(empty.settings.api_key, "");
}

#[tokio::test]
async fn test_from_file_parses_toml() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    write!(
        file,
        r#"
[settings]
apiKey = "file-key"
namespace = "monitoring"
electionID = "agent"
checkInterval = "30s"

[alarms.pods.restarts]
threshold = 5
priority = "HIGH"
"#
    )
    .unwrap();

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.settings.api_key, "file-key");
    assert_eq!(config.settings.namespace, "monitoring");
    assert_eq!(config.settings.check_interval, Duration::from_secs(30));
    assert_eq!(config.alarms.pods.restarts.threshold, 5);
    assert_eq!(config.alarms.pods.restarts.priority, Priority::High);
    // Untouched sections keep their defaults.
    assert_eq!(config.alarms.pods.resources.cpu.threshold, 90);
}

#[tokio::test]
async fn test_flags_override_file_values() {
    let flags = Flags {
        settings_namespace: Some("flagged".to_string()),
        settings_api_key: Some("flag-key".to_string()),
        alarms_pods_restarts_threshold: Some(3),
        ..Flags::default()
    };
    let config = Config::load(&flags).unwrap();
    assert_eq!(config.settings.namespace, "flagged");
    assert_eq!(config.settings.api_key, "flag-key");
    assert_eq!(config.alarms.pods.restarts.threshold, 3);
}
