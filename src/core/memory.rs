// src/core/memory.rs

//! Process-wide memory pressure monitor and panic-isolating task spawner.

use crate::core::cache::EventCache;
use crate::core::metrics;
use futures::FutureExt;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System, get_current_pid};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How often the guard samples process memory.
const CHECK_INTERVAL: Duration = Duration::from_secs(10);

const WARNING_THRESHOLD: f64 = 70.0;
const CRITICAL_THRESHOLD: f64 = 85.0;
const EMERGENCY_THRESHOLD: f64 = 95.0;

/// Number of forced reclaim cycles under emergency pressure.
const EMERGENCY_RECLAIM_CYCLES: usize = 3;
/// Entries dropped from the local cache per reclaim cycle.
const RECLAIM_BATCH: usize = 500;
const RECLAIM_SPACING: Duration = Duration::from_millis(100);

/// The guard's discrete pressure band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PressureLevel {
    Normal,
    Warning,
    Critical,
    Emergency,
}

impl PressureLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PressureLevel::Normal => "normal",
            PressureLevel::Warning => "warning",
            PressureLevel::Critical => "critical",
            PressureLevel::Emergency => "emergency",
        }
    }

    /// Maps a usage percentage onto a band; thresholds are inclusive.
    pub fn from_percent(usage_percent: f64) -> Self {
        if usage_percent >= EMERGENCY_THRESHOLD {
            PressureLevel::Emergency
        } else if usage_percent >= CRITICAL_THRESHOLD {
            PressureLevel::Critical
        } else if usage_percent >= WARNING_THRESHOLD {
            PressureLevel::Warning
        } else {
            PressureLevel::Normal
        }
    }
}

/// Samples the process's memory footprint against a discovered limit and
/// publishes a pressure band the pollers consult before each tick.
pub struct MemoryGuard {
    limit_bytes: Option<u64>,
    level: RwLock<PressureLevel>,
    cache: Arc<EventCache>,
}

impl MemoryGuard {
    pub fn new(cache: Arc<EventCache>) -> Self {
        let limit_bytes = discover_memory_limit();
        match limit_bytes {
            Some(limit) => info!(limit_mb = limit / 1024 / 1024, "Memory guard limit resolved"),
            None => info!("No memory limit found, falling back to 125% of current usage"),
        }
        Self {
            limit_bytes,
            level: RwLock::new(PressureLevel::Normal),
            cache,
        }
    }

    pub fn pressure_level(&self) -> PressureLevel {
        *self.level.read()
    }

    pub fn is_under_pressure(&self) -> bool {
        self.pressure_level() > PressureLevel::Normal
    }

    /// Pollers skip their tick entirely in these bands.
    pub fn should_skip_polling(&self) -> bool {
        self.pressure_level() >= PressureLevel::Critical
    }

    /// Runs the sampling loop until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Memory guard started");
        let mut interval = tokio::time::interval(CHECK_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check_memory().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Memory guard shutting down.");
                    return;
                }
            }
        }
    }

    async fn check_memory(&self) {
        let Some(used) = current_process_memory() else {
            debug!("Could not sample process memory");
            return;
        };

        // Without a hard limit the usage is compared against 125% of the
        // current footprint, which keeps the bands meaningful but lenient.
        let limit = self
            .limit_bytes
            .unwrap_or_else(|| used.saturating_mul(125) / 100)
            .max(1);
        let usage_percent = used as f64 / limit as f64 * 100.0;
        let new_level = PressureLevel::from_percent(usage_percent);

        let old_level = {
            let mut level = self.level.write();
            std::mem::replace(&mut *level, new_level)
        };
        metrics::MEMORY_PRESSURE_LEVEL.set(match new_level {
            PressureLevel::Normal => 0.0,
            PressureLevel::Warning => 1.0,
            PressureLevel::Critical => 2.0,
            PressureLevel::Emergency => 3.0,
        });

        if new_level != old_level {
            warn!(
                used_mb = used / 1024 / 1024,
                limit_mb = limit / 1024 / 1024,
                usage_percent = format!("{usage_percent:.1}"),
                pressure_level = new_level.as_str(),
                "Memory pressure level changed"
            );
        } else if new_level > PressureLevel::Normal {
            debug!(
                used_mb = used / 1024 / 1024,
                usage_percent = format!("{usage_percent:.1}"),
                pressure_level = new_level.as_str(),
                "Memory pressure ongoing"
            );
        }

        match new_level {
            PressureLevel::Emergency => self.emergency_reclaim().await,
            PressureLevel::Critical => {
                warn!("Critical memory pressure: pollers paused, consider reducing monitoring scope");
            }
            PressureLevel::Warning => {
                debug!("Warning memory pressure: relying on LRU auto-pruning");
            }
            PressureLevel::Normal => {}
        }
    }

    /// Forces a few spaced reclaim cycles against the local cache.
    async fn emergency_reclaim(&self) {
        error!("Emergency memory pressure, forcing reclaim cycles");
        let mut dropped = 0;
        for _ in 0..EMERGENCY_RECLAIM_CYCLES {
            dropped += self.cache.reclaim(RECLAIM_BATCH);
            tokio::time::sleep(RECLAIM_SPACING).await;
        }
        warn!(dropped, "Emergency reclaim completed");
    }
}

/// Spawns a worker with panic isolation: a panicking subsystem is logged
/// (with its payload and capture backtrace) instead of taking the process
/// down.
pub fn safe_spawn<F>(name: &'static str, future: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let result = std::panic::AssertUnwindSafe(future).catch_unwind().await;
        if let Err(panic) = result {
            let message = panic_message(panic.as_ref());
            let backtrace = std::backtrace::Backtrace::force_capture();
            error!(
                component = name,
                panic = %message,
                backtrace = %backtrace,
                "Recovered from panic; agent continues running"
            );
        }
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn current_process_memory() -> Option<u64> {
    let pid = get_current_pid().ok()?;
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid).map(|process| process.memory())
}

/// Discovers the memory limit: `MEMORY_LIMIT_MB` env var first, then cgroup
/// v2 `memory.max`, then cgroup v1 `memory.limit_in_bytes`.
fn discover_memory_limit() -> Option<u64> {
    if let Ok(value) = std::env::var("MEMORY_LIMIT_MB") {
        if let Ok(limit_mb) = value.trim().parse::<u64>() {
            info!(limit_mb, "Using memory limit from MEMORY_LIMIT_MB environment variable");
            return Some(limit_mb * 1024 * 1024);
        }
    }

    if let Ok(raw) = std::fs::read_to_string("/sys/fs/cgroup/memory.max") {
        let line = raw.trim();
        if line != "max" {
            if let Ok(limit) = line.parse::<u64>() {
                info!(limit_bytes = limit, "Using memory limit from cgroup v2");
                return Some(limit);
            }
        }
    }

    if let Ok(raw) = std::fs::read_to_string("/sys/fs/cgroup/memory/memory.limit_in_bytes") {
        if let Ok(limit) = raw.trim().parse::<u64>() {
            // Values in the exabyte range mean "no limit" under cgroup v1.
            if limit < u64::MAX / 2 {
                info!(limit_bytes = limit, "Using memory limit from cgroup v1");
                return Some(limit);
            }
        }
    }

    None
}
