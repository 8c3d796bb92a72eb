// src/core/metrics.rs

//! Defines and registers Prometheus metrics for agent monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, TextEncoder, register_counter, register_counter_vec,
    register_gauge,
};

lazy_static! {
    // --- Event pipeline counters ---
    /// The total number of alert events accepted by the external endpoint.
    pub static ref ALERTS_CREATED_TOTAL: Counter =
        register_counter!("kubalert_alerts_created_total", "Total number of alert events accepted by the event endpoint.").unwrap();
    /// The total number of emissions suppressed by the dedup/rate-limit cache, labeled by event type.
    pub static ref ALERTS_RATE_LIMITED_TOTAL: CounterVec =
        register_counter_vec!("kubalert_alerts_rate_limited_total", "Total number of event emissions suppressed by the rate-limit cache.", &["event_type"]).unwrap();
    /// The total number of rule evaluation passes, labeled by resource kind.
    pub static ref EVALUATIONS_TOTAL: CounterVec =
        register_counter_vec!("kubalert_evaluations_total", "Total number of rule evaluation passes, labeled by resource kind.", &["kind"]).unwrap();
    /// The total number of poller ticks skipped because of memory pressure.
    pub static ref POLLS_SKIPPED_TOTAL: Counter =
        register_counter!("kubalert_polls_skipped_total", "Total number of poller ticks skipped under memory pressure.").unwrap();

    // --- Process gauges ---
    /// A boolean gauge indicating if this replica currently holds the leader lease.
    pub static ref IS_LEADER: Gauge =
        register_gauge!("kubalert_leader", "Indicates if this replica is the elected leader (1 for true, 0 for false).").unwrap();
    /// The memory guard's current pressure band (0=normal, 1=warning, 2=critical, 3=emergency).
    pub static ref MEMORY_PRESSURE_LEVEL: Gauge =
        register_gauge!("kubalert_memory_pressure_level", "Memory guard pressure band (0=normal, 1=warning, 2=critical, 3=emergency).").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
