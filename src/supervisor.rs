//! Connection supervisor for the backing store.
//!
//! Owns one store session, retries transient failures on a linear schedule
//! without blocking the caller, and reports health. Connection failures are
//! never fatal: once retries are exhausted the process keeps running without
//! a backing store and callers consult [`Supervisor::status`].
//!
//! ```text
//!   connect() ──▶ validate address ──(malformed)──▶ disconnected, no retry
//!        │
//!        ▼
//!   attempt ──ok──▶ connected, retry_count = 0
//!        │
//!      failed ──▶ retry_count += 1 ──(< max)──▶ sleep(base × retry_count) ──▶ attempt
//!                                   └─(= max)──▶ give up until next connect()
//! ```

use crate::config::DatabaseConfig;
use crate::metrics;
use crate::store::{Connector, Session, StoreError, redact_address, validate_address};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Snapshot of the supervisor's connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub connected: bool,
    /// Consecutive failed attempts since the last success.
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    /// A delayed retry is scheduled.
    pub retry_pending: bool,
    pub last_change: DateTime<Utc>,
}

impl ConnectionState {
    fn initial(max_retries: u32) -> Self {
        Self {
            connected: false,
            retry_count: 0,
            max_retries,
            last_error: None,
            retry_pending: false,
            last_change: Utc::now(),
        }
    }

    /// Retries are exhausted and no further attempt will be made on its own.
    pub fn gave_up(&self) -> bool {
        !self.connected && !self.retry_pending && self.retry_count >= self.max_retries
    }
}

/// Linear retry schedule: attempt `n` waits `base × n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay(),
        }
    }

    /// Delay before the retry that follows `retry_count` failures.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        self.base_delay.saturating_mul(retry_count)
    }
}

/// Result of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// The probe did not finish in time; the outcome is unknown.
    Unhandled,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    fn new(status: HealthStatus, error: Option<String>) -> Self {
        Self {
            status,
            timestamp: Utc::now(),
            error,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

struct Inner {
    connector: Arc<dyn Connector>,
    address: String,
    policy: RetryPolicy,
    connect_timeout: Duration,
    probe_timeout: Duration,
    state: watch::Sender<ConnectionState>,
    session: Mutex<Option<Arc<dyn Session>>>,
    retry_task: Mutex<Option<JoinHandle<()>>>,
    /// Serializes connection attempts between explicit calls and the retry task.
    attempt_lock: tokio::sync::Mutex<()>,
    /// Last malformed address reported, so it is only logged once.
    reported_address: Mutex<Option<String>>,
}

/// Supervises the backing store connection.
///
/// Cheap to clone; every clone refers to the same connection.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(connector: Arc<dyn Connector>, config: &DatabaseConfig) -> Self {
        Self::with_address(connector, config, config.address())
    }

    pub fn with_address(
        connector: Arc<dyn Connector>,
        config: &DatabaseConfig,
        address: impl Into<String>,
    ) -> Self {
        let policy = RetryPolicy::from_config(config);
        let (state, _) = watch::channel(ConnectionState::initial(policy.max_retries));
        Self {
            inner: Arc::new(Inner {
                connector,
                address: address.into(),
                policy,
                connect_timeout: config.connect_timeout(),
                probe_timeout: config.probe_timeout(),
                state,
                session: Mutex::new(None),
                retry_task: Mutex::new(None),
                attempt_lock: tokio::sync::Mutex::new(()),
                reported_address: Mutex::new(None),
            }),
        }
    }

    /// Attempt to connect.
    ///
    /// Never fails. A malformed address returns a disconnected state without
    /// consuming a retry. A transport failure schedules a delayed retry and
    /// returns immediately. Calling this while a retry is pending cancels the
    /// pending retry and attempts now; calling it after retries are exhausted
    /// starts a fresh retry budget.
    pub async fn connect(&self) -> ConnectionState {
        if let Err(e) = validate_address(&self.inner.address) {
            self.inner.report_bad_address(&e.to_string());
            return self.status();
        }

        if self.status().connected {
            debug!("Store already connected");
            return self.status();
        }

        self.inner.cancel_retry();
        self.inner.state.send_if_modified(|s| {
            if s.retry_count >= s.max_retries {
                s.retry_count = 0;
                true
            } else {
                false
            }
        });

        if self.inner.attempt().await.is_err() {
            self.inner.after_failure();
        }
        self.status()
    }

    /// Close the active session, if any, and cancel pending retries.
    ///
    /// A failure to close is returned as [`StoreError::Disconnect`]; the
    /// supervisor is disconnected either way.
    pub async fn disconnect(&self) -> Result<(), StoreError> {
        self.inner.cancel_retry();
        let session = self.inner.session.lock().take();
        self.inner.state.send_modify(|s| {
            s.connected = false;
            s.retry_pending = false;
            s.last_change = Utc::now();
        });
        metrics::set_store_connected(false);

        let Some(session) = session else {
            debug!("Disconnect requested with no active store session");
            return Ok(());
        };

        match session.close().await {
            Ok(()) => {
                info!(target = %session.info().target, "Disconnected from backing store");
                Ok(())
            }
            Err(e) => {
                let e = match e {
                    StoreError::Disconnect(msg) => StoreError::Disconnect(msg),
                    other => StoreError::Disconnect(other.to_string()),
                };
                error!(error = %e, "Error disconnecting from backing store");
                self.inner.state.send_modify(|s| s.last_error = Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Probe the live session. Never fails; problems are reported in the result.
    pub async fn health_check(&self) -> HealthReport {
        let Some(session) = self.session() else {
            let reason = self
                .status()
                .last_error
                .unwrap_or_else(|| StoreError::NotConnected.to_string());
            return HealthReport::new(HealthStatus::Unhealthy, Some(reason));
        };

        match tokio::time::timeout(self.inner.probe_timeout, session.ping()).await {
            Ok(Ok(())) => HealthReport::new(HealthStatus::Healthy, None),
            Ok(Err(e)) => {
                warn!(error = %e, "Store health probe failed");
                HealthReport::new(HealthStatus::Unhealthy, Some(e.to_string()))
            }
            Err(_) => {
                warn!(timeout = ?self.inner.probe_timeout, "Store health probe timed out");
                HealthReport::new(
                    HealthStatus::Unhandled,
                    Some(format!(
                        "health probe timed out after {:?}",
                        self.inner.probe_timeout
                    )),
                )
            }
        }
    }

    /// Synchronous snapshot of the connection state.
    pub fn status(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// The live session, if connected.
    pub fn session(&self) -> Option<Arc<dyn Session>> {
        self.inner.session.lock().clone()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.inner.policy
    }
}

impl Inner {
    /// One connection attempt. Updates state but never schedules retries.
    async fn attempt(&self) -> Result<(), StoreError> {
        let _guard = self.attempt_lock.lock().await;
        if self.state.borrow().connected {
            return Ok(());
        }

        let opened = match tokio::time::timeout(
            self.connect_timeout,
            self.connector.open(&self.address),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StoreError::ConnectTimeout(self.connect_timeout)),
        };

        match opened {
            Ok(session) => {
                let target = session.info().target;
                *self.session.lock() = Some(session);
                self.state.send_modify(|s| {
                    s.connected = true;
                    s.retry_count = 0;
                    s.last_error = None;
                    s.retry_pending = false;
                    s.last_change = Utc::now();
                });
                metrics::record_connect_attempt(true);
                metrics::set_store_connected(true);
                info!(target = %target, "Connected to backing store");
                Ok(())
            }
            Err(e) => {
                let mut retry_count = 0;
                self.state.send_modify(|s| {
                    s.connected = false;
                    s.retry_count = s.retry_count.saturating_add(1);
                    s.last_error = Some(e.to_string());
                    s.last_change = Utc::now();
                    retry_count = s.retry_count;
                });
                metrics::record_connect_attempt(false);
                metrics::set_store_connected(false);
                error!(
                    target = %redact_address(&self.address),
                    error = %e,
                    retry = retry_count,
                    max_retries = self.policy.max_retries,
                    "Backing store connection failed"
                );
                Err(e)
            }
        }
    }

    /// Schedule the next retry, or give up if the budget is spent.
    fn after_failure(self: &Arc<Self>) {
        let retry_count = self.state.borrow().retry_count;
        if retry_count < self.policy.max_retries {
            self.schedule_retries();
        } else {
            self.give_up();
        }
    }

    fn schedule_retries(self: &Arc<Self>) {
        self.state.send_modify(|s| s.retry_pending = true);
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move { inner.retry_loop().await });
        if let Some(previous) = self.retry_task.lock().replace(handle) {
            previous.abort();
        }
    }

    async fn retry_loop(&self) {
        loop {
            let retry_count = self.state.borrow().retry_count;
            if retry_count >= self.policy.max_retries {
                self.state.send_modify(|s| s.retry_pending = false);
                self.give_up();
                return;
            }

            let delay = self.policy.delay_for(retry_count);
            info!(
                retry = retry_count,
                max_retries = self.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                "Retrying backing store connection"
            );
            tokio::time::sleep(delay).await;

            if self.attempt().await.is_ok() {
                return;
            }
        }
    }

    fn give_up(&self) {
        metrics::record_retries_exhausted();
        warn!(
            max_retries = self.policy.max_retries,
            "Max retries reached. Running without backing store"
        );
    }

    fn cancel_retry(&self) {
        if let Some(handle) = self.retry_task.lock().take() {
            handle.abort();
            debug!("Pending store retry cancelled");
        }
        self.state.send_if_modified(|s| std::mem::replace(&mut s.retry_pending, false));
    }

    fn report_bad_address(&self, reason: &str) {
        let mut reported = self.reported_address.lock();
        if reported.as_deref() != Some(self.address.as_str()) {
            warn!(
                reason = %reason,
                "No valid backing store address provided. Running without backing store"
            );
            *reported = Some(self.address.clone());
        }
        drop(reported);
        self.state.send_if_modified(|s| {
            let next = Some(reason.to_string());
            if s.last_error != next {
                s.last_error = next;
                true
            } else {
                false
            }
        });
    }
}
