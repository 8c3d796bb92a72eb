// src/core/alert/mod.rs

//! Alert event model and the dispatcher that delivers events to the
//! external incident-management endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub mod dispatcher;

pub use dispatcher::Dispatcher;

/// The kind of event an intent produces on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Alert,
    Resolve,
}

impl EventType {
    /// The lowercase form used inside rate-limit cache keys.
    pub fn as_key_part(&self) -> &'static str {
        match self {
            EventType::Alert => "alert",
            EventType::Resolve => "resolve",
        }
    }
}

/// Priority of an alert event.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    #[default]
    Low,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIGH" => Ok(Priority::High),
            "LOW" => Ok(Priority::Low),
            other => Err(format!("invalid priority '{other}' (expected HIGH or LOW)")),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "HIGH"),
            Priority::Low => write!(f, "LOW"),
        }
    }
}

/// A rendered link attached to an event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AlertLink {
    pub text: String,
    pub href: String,
}

/// Severity assigned to an attached log line.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogSeverity {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

/// A single log line attached to a pod-status event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: LogSeverity,
    pub body: String,
}

/// The value produced by the rule engine: one alertable (or resolvable)
/// condition, addressed by its dedup key.
#[derive(Debug, Clone, Serialize)]
pub struct AlertIntent {
    pub key: String,
    pub event_type: EventType,
    pub priority: Priority,
    pub summary: String,
    pub details: String,
    pub labels: BTreeMap<String, String>,
    pub links: Vec<AlertLink>,
    pub logs: Vec<LogLine>,
    pub custom_details: serde_json::Map<String, serde_json::Value>,
}

impl AlertIntent {
    /// Creates an alert intent with the given key, summary and priority.
    pub fn alert(key: impl Into<String>, summary: impl Into<String>, priority: Priority) -> Self {
        Self {
            key: key.into(),
            event_type: EventType::Alert,
            priority,
            summary: summary.into(),
            details: String::new(),
            labels: BTreeMap::new(),
            links: Vec::new(),
            logs: Vec::new(),
            custom_details: serde_json::Map::new(),
        }
    }

    /// Creates a resolve intent. Resolves carry no priority of their own;
    /// the endpoint matches them to the open alert by key.
    pub fn resolve(key: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            event_type: EventType::Resolve,
            priority: Priority::Low,
            summary: summary.into(),
            details: String::new(),
            labels: BTreeMap::new(),
            links: Vec::new(),
            logs: Vec::new(),
            custom_details: serde_json::Map::new(),
        }
    }
}
