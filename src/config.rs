// src/config.rs

//! Manages agent configuration: loading, merging flag/env overrides, and validation.

use crate::core::alert::Priority;
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Command-line flags. Dotted long names mirror the hierarchical config keys,
/// so `--settings.apiKey` overrides `settings.api_key` from the config file.
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "kubalert", version, about = "Kubernetes observability agent")]
pub struct Flags {
    /// Path to an optional TOML (or JSON) config file.
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<String>,

    /// Run all checks once against the API server and exit.
    #[arg(long = "run-once")]
    pub run_once: bool,

    #[arg(long = "settings.kubeconfig", value_name = "FILE")]
    pub settings_kubeconfig: Option<String>,
    #[arg(long = "settings.master", value_name = "URL")]
    pub settings_master: Option<String>,
    #[arg(long = "settings.insecure", value_name = "BOOL")]
    pub settings_insecure: Option<bool>,
    #[arg(long = "settings.namespace", value_name = "NAMESPACE")]
    pub settings_namespace: Option<String>,
    #[arg(long = "settings.log.level", value_name = "LEVEL")]
    pub settings_log_level: Option<String>,
    #[arg(long = "settings.log.json", value_name = "BOOL")]
    pub settings_log_json: Option<bool>,
    #[arg(long = "settings.electionID", value_name = "ID")]
    pub settings_election_id: Option<String>,
    #[arg(long = "settings.port", value_name = "PORT")]
    pub settings_port: Option<u16>,
    #[arg(long = "settings.apiKey", value_name = "KEY")]
    pub settings_api_key: Option<String>,
    #[arg(long = "settings.checkInterval", value_name = "DURATION")]
    pub settings_check_interval: Option<humantime::Duration>,

    #[arg(long = "alarms.cluster.enabled", value_name = "BOOL")]
    pub alarms_cluster_enabled: Option<bool>,
    #[arg(long = "alarms.cluster.priority", value_name = "PRIORITY")]
    pub alarms_cluster_priority: Option<Priority>,

    #[arg(long = "alarms.pods.enabled", value_name = "BOOL")]
    pub alarms_pods_enabled: Option<bool>,
    #[arg(long = "alarms.pods.terminate.enabled", value_name = "BOOL")]
    pub alarms_pods_terminate_enabled: Option<bool>,
    #[arg(long = "alarms.pods.terminate.priority", value_name = "PRIORITY")]
    pub alarms_pods_terminate_priority: Option<Priority>,
    #[arg(long = "alarms.pods.waiting.enabled", value_name = "BOOL")]
    pub alarms_pods_waiting_enabled: Option<bool>,
    #[arg(long = "alarms.pods.waiting.priority", value_name = "PRIORITY")]
    pub alarms_pods_waiting_priority: Option<Priority>,
    #[arg(long = "alarms.pods.restarts.enabled", value_name = "BOOL")]
    pub alarms_pods_restarts_enabled: Option<bool>,
    #[arg(long = "alarms.pods.restarts.priority", value_name = "PRIORITY")]
    pub alarms_pods_restarts_priority: Option<Priority>,
    #[arg(long = "alarms.pods.restarts.threshold", value_name = "COUNT")]
    pub alarms_pods_restarts_threshold: Option<i32>,
    #[arg(long = "alarms.pods.resources.enabled", value_name = "BOOL")]
    pub alarms_pods_resources_enabled: Option<bool>,
    #[arg(long = "alarms.pods.resources.cpu.enabled", value_name = "BOOL")]
    pub alarms_pods_resources_cpu_enabled: Option<bool>,
    #[arg(long = "alarms.pods.resources.cpu.priority", value_name = "PRIORITY")]
    pub alarms_pods_resources_cpu_priority: Option<Priority>,
    #[arg(long = "alarms.pods.resources.cpu.threshold", value_name = "PERCENT")]
    pub alarms_pods_resources_cpu_threshold: Option<i32>,
    #[arg(long = "alarms.pods.resources.memory.enabled", value_name = "BOOL")]
    pub alarms_pods_resources_memory_enabled: Option<bool>,
    #[arg(long = "alarms.pods.resources.memory.priority", value_name = "PRIORITY")]
    pub alarms_pods_resources_memory_priority: Option<Priority>,
    #[arg(long = "alarms.pods.resources.memory.threshold", value_name = "PERCENT")]
    pub alarms_pods_resources_memory_threshold: Option<i32>,

    #[arg(long = "alarms.nodes.enabled", value_name = "BOOL")]
    pub alarms_nodes_enabled: Option<bool>,
    #[arg(long = "alarms.nodes.terminate.enabled", value_name = "BOOL")]
    pub alarms_nodes_terminate_enabled: Option<bool>,
    #[arg(long = "alarms.nodes.terminate.priority", value_name = "PRIORITY")]
    pub alarms_nodes_terminate_priority: Option<Priority>,
    #[arg(long = "alarms.nodes.resources.enabled", value_name = "BOOL")]
    pub alarms_nodes_resources_enabled: Option<bool>,
    #[arg(long = "alarms.nodes.resources.cpu.enabled", value_name = "BOOL")]
    pub alarms_nodes_resources_cpu_enabled: Option<bool>,
    #[arg(long = "alarms.nodes.resources.cpu.priority", value_name = "PRIORITY")]
    pub alarms_nodes_resources_cpu_priority: Option<Priority>,
    #[arg(long = "alarms.nodes.resources.cpu.threshold", value_name = "PERCENT")]
    pub alarms_nodes_resources_cpu_threshold: Option<i32>,
    #[arg(long = "alarms.nodes.resources.memory.enabled", value_name = "BOOL")]
    pub alarms_nodes_resources_memory_enabled: Option<bool>,
    #[arg(long = "alarms.nodes.resources.memory.priority", value_name = "PRIORITY")]
    pub alarms_nodes_resources_memory_priority: Option<Priority>,
    #[arg(long = "alarms.nodes.resources.memory.threshold", value_name = "PERCENT")]
    pub alarms_nodes_resources_memory_threshold: Option<i32>,
}

/// General agent settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Event-endpoint API key; a comma-separated list fans events out to every key.
    pub api_key: String,
    /// Bearer token protecting the command API. Empty disables the command routes.
    pub http_authorization_key: String,
    pub kubeconfig: String,
    pub master: String,
    pub insecure: bool,
    pub namespace: String,
    pub port: u16,
    pub log: LogSettings,
    #[serde(rename = "electionID")]
    pub election_id: String,
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
    /// Base URL of the event endpoint; the API key is appended as the last path segment.
    pub events_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            http_authorization_key: String::new(),
            kubeconfig: String::new(),
            master: String::new(),
            insecure: false,
            namespace: default_namespace(),
            port: default_port(),
            log: LogSettings::default(),
            election_id: default_election_id(),
            check_interval: default_check_interval(),
            events_base_url: default_events_base_url(),
        }
    }
}

fn default_namespace() -> String {
    "kube-system".to_string()
}
fn default_port() -> u16 {
    9092
}
fn default_election_id() -> String {
    "kubalert".to_string()
}
fn default_check_interval() -> Duration {
    Duration::from_secs(15)
}
fn default_events_base_url() -> String {
    "https://api.ilert.com/api/v1/events/kubernetes".to_string()
}

/// Logging settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// A single alarm rule: on/off switch plus the priority of the events it produces.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct AlarmSetting {
    pub enabled: bool,
    pub priority: Priority,
    /// Container state reasons that never produce an alert.
    pub excluded_reasons: Vec<String>,
}

impl Default for AlarmSetting {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: Priority::High,
            excluded_reasons: Vec::new(),
        }
    }
}

/// An alarm rule with a numeric trigger threshold.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct ThresholdAlarmSetting {
    pub enabled: bool,
    pub priority: Priority,
    pub threshold: i32,
}

impl Default for ThresholdAlarmSetting {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: Priority::Low,
            threshold: 90,
        }
    }
}

/// CPU and memory usage alarms for a resource kind.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceAlarmSettings {
    pub enabled: bool,
    pub cpu: ThresholdAlarmSetting,
    pub memory: ThresholdAlarmSetting,
}

impl Default for ResourceAlarmSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cpu: ThresholdAlarmSetting::default(),
            memory: ThresholdAlarmSetting::default(),
        }
    }
}

/// Pod alarm rules.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct PodAlarms {
    pub enabled: bool,
    pub terminate: AlarmSetting,
    pub waiting: AlarmSetting,
    pub restarts: ThresholdAlarmSetting,
    pub resources: ResourceAlarmSettings,
}

impl Default for PodAlarms {
    fn default() -> Self {
        Self {
            enabled: true,
            terminate: AlarmSetting {
                enabled: true,
                priority: Priority::High,
                excluded_reasons: Vec::new(),
            },
            waiting: AlarmSetting {
                enabled: true,
                priority: Priority::Low,
                excluded_reasons: Vec::new(),
            },
            restarts: ThresholdAlarmSetting {
                enabled: true,
                priority: Priority::Low,
                threshold: 10,
            },
            resources: ResourceAlarmSettings::default(),
        }
    }
}

/// Node alarm rules.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeAlarms {
    pub enabled: bool,
    pub terminate: AlarmSetting,
    pub resources: ResourceAlarmSettings,
}

impl Default for NodeAlarms {
    fn default() -> Self {
        Self {
            enabled: true,
            terminate: AlarmSetting::default(),
            resources: ResourceAlarmSettings::default(),
        }
    }
}

/// All alarm rules.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Alarms {
    pub cluster: AlarmSetting,
    pub pods: PodAlarms,
    pub nodes: NodeAlarms,
}

/// A link template attached to outgoing events. The href may contain
/// `{{pod_name}}`, `{{pod_namespace}}` and `{{node_name}}` placeholders.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LinkSetting {
    pub name: String,
    pub href: String,
}

/// Link templates per resource kind.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Links {
    pub pods: Vec<LinkSetting>,
    pub nodes: Vec<LinkSetting>,
}

/// Represents the final, validated agent configuration. Immutable once loaded.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub settings: Settings,
    pub alarms: Alarms,
    pub links: Links,
    /// Single-pass mode: evaluate everything once and exit. Set by `--run-once`.
    #[serde(skip)]
    pub run_once: bool,
}

impl Config {
    /// Builds the configuration from defaults, an optional config file, flags
    /// and environment variables, in that order of precedence (later wins).
    pub fn load(flags: &Flags) -> Result<Self> {
        let mut config = match &flags.config {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };

        config.apply_flags(flags);
        config.apply_env()?;
        config.run_once = flags.run_once;
        config.validate()?;
        Ok(config)
    }

    /// Creates a new `Config` instance by reading and parsing a TOML (or JSON) file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = if path.ends_with(".json") {
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON from '{path}'"))?
        } else {
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML from '{path}'"))?
        };
        Ok(config)
    }

    fn apply_flags(&mut self, flags: &Flags) {
        macro_rules! merge {
            ($target:expr, $flag:expr) => {
                if let Some(v) = &$flag {
                    $target = v.clone().into();
                }
            };
        }

        merge!(self.settings.kubeconfig, flags.settings_kubeconfig);
        merge!(self.settings.master, flags.settings_master);
        merge!(self.settings.insecure, flags.settings_insecure);
        merge!(self.settings.namespace, flags.settings_namespace);
        merge!(self.settings.log.level, flags.settings_log_level);
        merge!(self.settings.log.json, flags.settings_log_json);
        merge!(self.settings.election_id, flags.settings_election_id);
        merge!(self.settings.port, flags.settings_port);
        merge!(self.settings.api_key, flags.settings_api_key);
        if let Some(interval) = flags.settings_check_interval {
            self.settings.check_interval = interval.into();
        }

        merge!(self.alarms.cluster.enabled, flags.alarms_cluster_enabled);
        merge!(self.alarms.cluster.priority, flags.alarms_cluster_priority);

        merge!(self.alarms.pods.enabled, flags.alarms_pods_enabled);
        merge!(
            self.alarms.pods.terminate.enabled,
            flags.alarms_pods_terminate_enabled
        );
        merge!(
            self.alarms.pods.terminate.priority,
            flags.alarms_pods_terminate_priority
        );
        merge!(
            self.alarms.pods.waiting.enabled,
            flags.alarms_pods_waiting_enabled
        );
        merge!(
            self.alarms.pods.waiting.priority,
            flags.alarms_pods_waiting_priority
        );
        merge!(
            self.alarms.pods.restarts.enabled,
            flags.alarms_pods_restarts_enabled
        );
        merge!(
            self.alarms.pods.restarts.priority,
            flags.alarms_pods_restarts_priority
        );
        merge!(
            self.alarms.pods.restarts.threshold,
            flags.alarms_pods_restarts_threshold
        );
        merge!(
            self.alarms.pods.resources.enabled,
            flags.alarms_pods_resources_enabled
        );
        merge!(
            self.alarms.pods.resources.cpu.enabled,
            flags.alarms_pods_resources_cpu_enabled
        );
        merge!(
            self.alarms.pods.resources.cpu.priority,
            flags.alarms_pods_resources_cpu_priority
        );
        merge!(
            self.alarms.pods.resources.cpu.threshold,
            flags.alarms_pods_resources_cpu_threshold
        );
        merge!(
            self.alarms.pods.resources.memory.enabled,
            flags.alarms_pods_resources_memory_enabled
        );
        merge!(
            self.alarms.pods.resources.memory.priority,
            flags.alarms_pods_resources_memory_priority
        );
        merge!(
            self.alarms.pods.resources.memory.threshold,
            flags.alarms_pods_resources_memory_threshold
        );

        merge!(self.alarms.nodes.enabled, flags.alarms_nodes_enabled);
        merge!(
            self.alarms.nodes.terminate.enabled,
            flags.alarms_nodes_terminate_enabled
        );
        merge!(
            self.alarms.nodes.terminate.priority,
            flags.alarms_nodes_terminate_priority
        );
        merge!(
            self.alarms.nodes.resources.enabled,
            flags.alarms_nodes_resources_enabled
        );
        merge!(
            self.alarms.nodes.resources.cpu.enabled,
            flags.alarms_nodes_resources_cpu_enabled
        );
        merge!(
            self.alarms.nodes.resources.cpu.priority,
            flags.alarms_nodes_resources_cpu_priority
        );
        merge!(
            self.alarms.nodes.resources.cpu.threshold,
            flags.alarms_nodes_resources_cpu_threshold
        );
        merge!(
            self.alarms.nodes.resources.memory.enabled,
            flags.alarms_nodes_resources_memory_enabled
        );
        merge!(
            self.alarms.nodes.resources.memory.priority,
            flags.alarms_nodes_resources_memory_priority
        );
        merge!(
            self.alarms.nodes.resources.memory.threshold,
            flags.alarms_nodes_resources_memory_threshold
        );
    }

    /// Applies environment-variable overrides and the link enumeration envs.
    fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("ILERT_API_KEY") {
            if !v.is_empty() {
                self.settings.api_key = v;
            }
        }
        if let Ok(v) = std::env::var("NAMESPACE") {
            if !v.is_empty() {
                self.settings.namespace = v;
            }
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            if !v.is_empty() {
                self.settings.log.level = v;
            }
        }
        if let Ok(v) = std::env::var("HTTP_AUTHORIZATION_KEY") {
            if !v.is_empty() {
                self.settings.http_authorization_key = v;
            }
        }

        // ILERT_LINKS_PODS_<NAME> / ILERT_LINKS_NODES_<NAME> enumerate link
        // entries: the name is the title-cased underscore-split suffix, the
        // href is the value.
        for (key, value) in std::env::vars() {
            if let Some(suffix) = key.strip_prefix("ILERT_LINKS_PODS_") {
                self.links.pods.push(LinkSetting {
                    name: title_case(suffix),
                    href: value,
                });
            } else if let Some(suffix) = key.strip_prefix("ILERT_LINKS_NODES_") {
                self.links.nodes.push(LinkSetting {
                    name: title_case(suffix),
                    href: value,
                });
            }
        }

        // KUBECONFIG carries a base64-encoded kubeconfig; it is written to a
        // temp file and used as the kubeconfig path.
        if let Ok(encoded) = std::env::var("KUBECONFIG") {
            if !encoded.is_empty() {
                use base64::Engine;
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .context("Failed to decode kubeconfig from base64")?;
                let path: PathBuf = std::env::temp_dir().join("kubeconfig");
                fs::write(&path, decoded)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                self.settings.kubeconfig = path.to_string_lossy().to_string();
                debug!(path = %path.display(), "Wrote kubeconfig from KUBECONFIG env");
            }
        }

        Ok(())
    }

    /// Validates the resolved configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.settings.election_id.trim().is_empty() {
            return Err(anyhow!("Election ID is required"));
        }
        if self.settings.namespace.trim().is_empty() {
            return Err(anyhow!(
                "Namespace is required. Use --settings.namespace flag or NAMESPACE env var"
            ));
        }
        if self.settings.api_key.trim().is_empty() {
            return Err(anyhow!(
                "Event API key is required. Use --settings.apiKey flag or ILERT_API_KEY env var"
            ));
        }
        if self.settings.port == 0 {
            return Err(anyhow!("settings.port cannot be 0"));
        }
        if self.settings.check_interval < Duration::from_secs(1) {
            return Err(anyhow!("settings.checkInterval must be at least 1s"));
        }

        match self.settings.log.level.as_str() {
            "debug" | "info" | "warn" | "error" | "fatal" => {}
            other => {
                return Err(anyhow!("Invalid --settings.log.level value '{other}'"));
            }
        }

        check_threshold(
            self.alarms.pods.restarts.threshold,
            1,
            1_000_000,
            "--alarms.pods.restarts.threshold",
        )?;
        check_threshold(
            self.alarms.pods.resources.cpu.threshold,
            1,
            100,
            "--alarms.pods.resources.cpu.threshold",
        )?;
        check_threshold(
            self.alarms.pods.resources.memory.threshold,
            1,
            100,
            "--alarms.pods.resources.memory.threshold",
        )?;
        check_threshold(
            self.alarms.nodes.resources.cpu.threshold,
            1,
            100,
            "--alarms.nodes.resources.cpu.threshold",
        )?;
        check_threshold(
            self.alarms.nodes.resources.memory.threshold,
            1,
            100,
            "--alarms.nodes.resources.memory.threshold",
        )?;

        Ok(())
    }

    /// Splits the configured API key list on commas, dropping empty entries.
    pub fn api_keys(&self) -> Vec<String> {
        self.settings
            .api_key
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// The cluster key: `<namespace>/<electionID>`.
    pub fn cluster_key(&self) -> String {
        format!(
            "{}/{}",
            self.settings.namespace, self.settings.election_id
        )
    }

    /// Returns a copy with credentials masked, for startup logging.
    pub fn sanitized(&self) -> Config {
        let mut copy = self.clone();
        copy.settings.api_key = mask_if_not_empty(&copy.settings.api_key);
        copy.settings.http_authorization_key = mask_if_not_empty(&copy.settings.http_authorization_key);
        copy
    }
}

fn check_threshold(value: i32, min: i32, max: i32, flag: &str) -> Result<()> {
    if value < min || value > max {
        return Err(anyhow!("Invalid {flag} value (min={min} max={max})"));
    }
    Ok(())
}

fn mask_if_not_empty(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}

/// Title-cases an underscore-separated env suffix: `GRAFANA_BOARD` -> `Grafana Board`.
pub fn title_case(suffix: &str) -> String {
    suffix
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let lower = part.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
