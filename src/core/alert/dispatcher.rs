// src/core/alert/dispatcher.rs

//! Delivers alert intents to the external event endpoint with multi-key
//! fan-out and cache-backed deduplication.

use super::{AlertIntent, AlertLink, EventType, LogLine, Priority};
use crate::core::cache::EventCache;
use crate::core::errors::AgentError;
use crate::core::metrics;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One alert per key per destination within this window.
const ALERT_WINDOW: Duration = Duration::from_secs(60);
/// One resolve per key per destination within this window.
const RESOLVE_WINDOW: Duration = Duration::from_secs(30 * 60);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The JSON body POSTed to the event endpoint.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventBody<'a> {
    alert_key: &'a str,
    summary: &'a str,
    details: &'a str,
    event_type: EventType,
    api_key: &'a str,
    priority: Priority,
    links: &'a [AlertLink],
    labels: &'a BTreeMap<String, String>,
    logs: &'a [LogLine],
    custom_details: &'a serde_json::Map<String, serde_json::Value>,
}

/// Owns the outbound HTTP client and the per-destination rate windows.
///
/// Fan-out is best-effort per destination: one failing tenant must not
/// silence the others, so `emit` succeeds if at least one key accepted
/// the event.
pub struct Dispatcher {
    http: reqwest::Client,
    cache: Arc<EventCache>,
    api_keys: Vec<String>,
    events_base_url: String,
}

impl Dispatcher {
    pub fn new(
        api_keys: Vec<String>,
        events_base_url: String,
        cache: Arc<EventCache>,
    ) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("kubalert/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            cache,
            api_keys,
            events_base_url: events_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Emits one intent to every configured destination, subject to the
    /// per-(key, event type, destination) rate windows.
    pub async fn emit(&self, intent: &AlertIntent) -> Result<(), AgentError> {
        if self.api_keys.is_empty() {
            return Err(AgentError::Config(
                "no event API keys configured".to_string(),
            ));
        }

        let mut any_succeeded = false;
        let mut any_attempted = false;
        let mut last_error: Option<String> = None;

        for api_key in &self.api_keys {
            let limit_key = rate_limit_key(&intent.key, intent.event_type, api_key);

            if self.is_rate_limited(&limit_key).await {
                debug!(
                    alert_key = %intent.key,
                    event_type = ?intent.event_type,
                    "Event suppressed by rate window"
                );
                metrics::ALERTS_RATE_LIMITED_TOTAL
                    .with_label_values(&[intent.event_type.as_key_part()])
                    .inc();
                continue;
            }

            any_attempted = true;
            match self.post_event(intent, api_key).await {
                Ok(()) => {
                    any_succeeded = true;
                    self.record_emission(intent, api_key, &limit_key).await;
                }
                Err(e) => {
                    warn!(alert_key = %intent.key, error = %e, "Failed to deliver event");
                    last_error = Some(e.to_string());
                }
            }
        }

        // Every destination inside its rate window counts as delivered.
        if any_succeeded || !any_attempted {
            Ok(())
        } else {
            Err(AgentError::AllKeysFailed(
                last_error.unwrap_or_else(|| "unknown delivery error".to_string()),
            ))
        }
    }

    /// Reads the rate counter, failing open: a cache error never drops an alert.
    async fn is_rate_limited(&self, limit_key: &str) -> bool {
        match self.cache.get_counter(limit_key).await {
            Ok(count) => count >= 1,
            Err(e) => {
                warn!(key = %limit_key, error = %e, "Rate-limit lookup failed, failing open");
                false
            }
        }
    }

    async fn post_event(&self, intent: &AlertIntent, api_key: &str) -> Result<(), AgentError> {
        let body = EventBody {
            alert_key: &intent.key,
            summary: &intent.summary,
            details: &intent.details,
            event_type: intent.event_type,
            api_key,
            priority: intent.priority,
            links: &intent.links,
            labels: &intent.labels,
            logs: &intent.logs,
            custom_details: &intent.custom_details,
        };
        let url = format!("{}/{}", self.events_base_url, api_key);

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::HttpClient(format!(
                "event endpoint returned {status}: {text}"
            )));
        }

        info!(
            alert_key = %intent.key,
            event_type = ?intent.event_type,
            summary = %intent.summary,
            "Event delivered"
        );
        metrics::ALERTS_CREATED_TOTAL.inc();
        Ok(())
    }

    /// Opens the rate window after a successful delivery. An accepted alert
    /// also clears the resolve counter so a later recovery is not suppressed
    /// by a stale window.
    async fn record_emission(&self, intent: &AlertIntent, api_key: &str, limit_key: &str) {
        let result = match intent.event_type {
            EventType::Alert => {
                let resolve_key = rate_limit_key(&intent.key, EventType::Resolve, api_key);
                if let Err(e) = self
                    .cache
                    .set_counter(&resolve_key, 0, RESOLVE_WINDOW)
                    .await
                {
                    warn!(key = %resolve_key, error = %e, "Failed to reset resolve counter");
                }
                self.cache.increment_by(limit_key, 1, ALERT_WINDOW).await
            }
            EventType::Resolve => self.cache.increment_by(limit_key, 1, RESOLVE_WINDOW).await,
        };
        if let Err(e) = result {
            warn!(key = %limit_key, error = %e, "Failed to record rate window");
        }
    }
}

/// The dedup cache key: `<alertKey>:<eventType>:<apiKey>`.
fn rate_limit_key(alert_key: &str, event_type: EventType, api_key: &str) -> String {
    format!("{}:{}:{}", alert_key, event_type.as_key_part(), api_key)
}
