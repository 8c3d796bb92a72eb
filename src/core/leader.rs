// src/core/leader.rs

//! Lease-based single-leader election over the coordination API.
//!
//! One `Lease` object (name = election ID) arbitrates which replica runs the
//! watch pipeline. The loop retries every `RETRY_PERIOD`; a leader that
//! cannot renew within `RENEW_DEADLINE` steps down before any other replica
//! can acquire the expired lease, and the lease is released on shutdown so
//! the next leader does not have to wait out the full duration.

use crate::core::errors::AgentError;
use crate::core::metrics;
use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::PostParams;
use kube::{Api, Client};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

const LEASE_DURATION: Duration = Duration::from_secs(15);
const RENEW_DEADLINE: Duration = Duration::from_secs(10);
const RETRY_PERIOD: Duration = Duration::from_secs(2);

/// The process-wide leadership snapshot, published over a watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderState {
    pub identity: String,
    pub is_leader: bool,
    pub lease_expiry: Option<DateTime<Utc>>,
}

/// Ownership of the lease as read from its spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    Unheld,
    HeldBySelf {
        expires_at: DateTime<Utc>,
    },
    HeldByOther {
        holder: String,
        expires_at: DateTime<Utc>,
    },
}

/// Runs the acquire/renew/release loop and publishes leadership changes.
pub struct Elector {
    api: Api<Lease>,
    name: String,
    identity: String,
    state_tx: watch::Sender<LeaderState>,
}

impl Elector {
    /// Creates the elector and the receiver the supervisor listens on.
    pub fn new(
        client: Client,
        namespace: &str,
        election_id: &str,
        identity: String,
    ) -> (Self, watch::Receiver<LeaderState>) {
        let initial = LeaderState {
            identity: identity.clone(),
            is_leader: false,
            lease_expiry: None,
        };
        let (state_tx, state_rx) = watch::channel(initial);
        let elector = Self {
            api: Api::namespaced(client, namespace),
            name: election_id.to_string(),
            identity,
            state_tx,
        };
        (elector, state_rx)
    }

    /// The election loop. Returns once shutdown is signalled and the lease
    /// (if held) has been released.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(identity = %self.identity, lease = %self.name, "Leader election started");
        let mut interval = tokio::time::interval(RETRY_PERIOD);
        let mut last_renew: Option<Instant> = None;
        let mut observed_leader: Option<String> = None;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.try_acquire_or_renew().await {
                        Ok(Ownership::HeldBySelf { expires_at }) => {
                            last_renew = Some(Instant::now());
                            self.publish(true, Some(expires_at), &mut observed_leader);
                        }
                        Ok(Ownership::HeldByOther { holder, expires_at }) => {
                            last_renew = None;
                            if observed_leader.as_deref() != Some(holder.as_str()) {
                                info!(identity = %holder, "New leader elected");
                            }
                            observed_leader = Some(holder);
                            self.publish_not_leader(Some(expires_at));
                        }
                        Ok(Ownership::Unheld) => {
                            last_renew = None;
                            self.publish_not_leader(None);
                        }
                        Err(e) => {
                            debug!(error = %e, "Lease acquire/renew attempt failed");
                            // A leader that has not renewed within the renew
                            // deadline must stand down before the lease can
                            // be taken over.
                            if self.state_tx.borrow().is_leader {
                                let stale = last_renew
                                    .map(|t| t.elapsed() >= RENEW_DEADLINE)
                                    .unwrap_or(true);
                                if stale {
                                    warn!(identity = %self.identity, "Renew deadline exceeded, giving up leadership");
                                    self.publish_not_leader(None);
                                    last_renew = None;
                                }
                            }
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        if self.state_tx.borrow().is_leader {
            if let Err(e) = self.release().await {
                warn!(error = %e, "Failed to release lease on shutdown");
            } else {
                info!(identity = %self.identity, "Released leader lease");
            }
            self.publish_not_leader(None);
        }
        info!("Leader election stopped");
    }

    /// One acquire-or-renew attempt against the lease object.
    async fn try_acquire_or_renew(&self) -> Result<Ownership, AgentError> {
        let now = Utc::now();
        let mut entry = self
            .api
            .entry(&self.name)
            .await?
            .or_insert(Lease::default);
        let spec = entry
            .get_mut()
            .spec
            .get_or_insert_with(LeaseSpec::default);
        let ownership = ownership(spec, &self.identity, now);

        if let Ownership::HeldByOther { holder, expires_at } = &ownership {
            if *expires_at > now {
                return Ok(Ownership::HeldByOther {
                    holder: holder.clone(),
                    expires_at: *expires_at,
                });
            }
        }

        if !matches!(ownership, Ownership::HeldBySelf { .. }) {
            spec.holder_identity = Some(self.identity.clone());
            spec.acquire_time = Some(MicroTime(now));
            *spec.lease_transitions.get_or_insert(0) += 1;
        }
        spec.renew_time = Some(MicroTime(now));
        spec.lease_duration_seconds = Some(LEASE_DURATION.as_secs() as i32);

        entry
            .commit(&PostParams::default())
            .await
            .map_err(|e| AgentError::Internal(format!("lease commit failed: {e}")))?;

        Ok(Ownership::HeldBySelf {
            expires_at: now
                + chrono::Duration::from_std(LEASE_DURATION)
                    .expect("lease duration fits in chrono range"),
        })
    }

    /// Clears the lease so the next candidate does not wait out the
    /// remaining duration.
    async fn release(&self) -> Result<(), AgentError> {
        let now = Utc::now();
        let mut entry = self
            .api
            .entry(&self.name)
            .await?
            .or_insert(Lease::default);
        let spec = entry
            .get_mut()
            .spec
            .get_or_insert_with(LeaseSpec::default);

        match ownership(spec, &self.identity, now) {
            Ownership::Unheld | Ownership::HeldByOther { .. } => Ok(()),
            Ownership::HeldBySelf { .. } => {
                spec.holder_identity = None;
                spec.acquire_time = None;
                spec.renew_time = None;
                spec.lease_duration_seconds = None;
                *spec.lease_transitions.get_or_insert(0) += 1;
                entry
                    .commit(&PostParams::default())
                    .await
                    .map_err(|e| AgentError::Internal(format!("lease release failed: {e}")))
            }
        }
    }

    fn publish(
        &self,
        is_leader: bool,
        lease_expiry: Option<DateTime<Utc>>,
        observed_leader: &mut Option<String>,
    ) {
        let was_leader = self.state_tx.borrow().is_leader;
        if is_leader && !was_leader {
            info!(identity = %self.identity, "I am the new leader");
            *observed_leader = Some(self.identity.clone());
        }
        metrics::IS_LEADER.set(if is_leader { 1.0 } else { 0.0 });
        self.state_tx.send_if_modified(|state| {
            let changed = state.is_leader != is_leader || state.lease_expiry != lease_expiry;
            state.is_leader = is_leader;
            state.lease_expiry = lease_expiry;
            changed
        });
    }

    fn publish_not_leader(&self, lease_expiry: Option<DateTime<Utc>>) {
        let was_leader = self.state_tx.borrow().is_leader;
        if was_leader {
            info!(identity = %self.identity, "I am not leader anymore");
        }
        metrics::IS_LEADER.set(0.0);
        self.state_tx.send_if_modified(|state| {
            let changed = state.is_leader || state.lease_expiry != lease_expiry;
            state.is_leader = false;
            state.lease_expiry = lease_expiry;
            changed
        });
    }
}

/// Classifies the lease spec relative to `identity` at time `now`.
pub fn ownership(spec: &LeaseSpec, identity: &str, _now: DateTime<Utc>) -> Ownership {
    let duration = chrono::Duration::seconds(spec.lease_duration_seconds.unwrap_or(0).into());
    let last_renewal = spec.renew_time.as_ref().map(|t| t.0);

    match &spec.holder_identity {
        None => Ownership::Unheld,
        Some(holder) if holder == identity => Ownership::HeldBySelf {
            expires_at: last_renewal.unwrap_or(DateTime::<Utc>::MIN_UTC) + duration,
        },
        Some(holder) => Ownership::HeldByOther {
            holder: holder.clone(),
            expires_at: last_renewal.unwrap_or(DateTime::<Utc>::MIN_UTC) + duration,
        },
    }
}
