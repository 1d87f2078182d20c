use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ingop_store::ObjectStore;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ReconcileResult;

/// Body of a periodic driver: one reconcile pass.
#[async_trait]
pub trait Reconcile: Send + Sync {
    async fn reconcile(&self) -> ReconcileResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Waiting,
    /// Waiting for the store's read side to report ready.
    Gated,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverReport {
    /// Ticks whose body ran.
    pub ticks: u64,
    /// Ticks dropped because the cache-sync gate did not open in time.
    pub skipped: u64,
    /// Bodies that returned an error or panicked.
    pub failures: u64,
    /// Failures caused by bad input; these recur until the input changes.
    pub fatal: u64,
}

struct Gate {
    store: Arc<dyn ObjectStore>,
    deadline: Duration,
}

/// Runs a [`Reconcile`] body on a fixed cadence until cancelled.
///
/// The first tick runs immediately; each following tick starts one
/// `interval` after the previous body returned, so ticks never overlap.
/// Body failures are logged and left to the next tick. Cancellation is
/// observed while waiting; a running body is allowed to finish.
pub struct PeriodicDriver {
    name: String,
    interval: Duration,
    body: Arc<dyn Reconcile>,
    gate: Option<Gate>,
    state: watch::Sender<DriverState>,
}

impl PeriodicDriver {
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        body: Arc<dyn Reconcile>,
    ) -> Self {
        let (state, _) = watch::channel(DriverState::Idle);
        Self {
            name: name.into(),
            interval,
            body,
            gate: None,
            state,
        }
    }

    /// Skip ticks until `store` reports its read cache synced within
    /// `deadline`.
    pub fn gated_on(mut self, store: Arc<dyn ObjectStore>, deadline: Duration) -> Self {
        self.gate = Some(Gate { store, deadline });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    fn set(&self, s: DriverState) {
        self.state.send_replace(s);
    }

    pub async fn run(self, cancel: CancellationToken) -> DriverReport {
        let mut report = DriverReport::default();
        info!(driver = %self.name, interval = ?self.interval, "driver started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let ready = match &self.gate {
                None => true,
                Some(gate) => {
                    self.set(DriverState::Gated);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        synced = gate.store.wait_for_cache_sync(gate.deadline) => synced,
                    }
                }
            };

            if ready {
                self.set(DriverState::Running);
                report.ticks += 1;
                let body = self.body.clone();
                match tokio::spawn(async move { body.reconcile().await }).await {
                    Ok(Ok(())) => debug!(driver = %self.name, "tick complete"),
                    Ok(Err(e)) if e.is_fatal() => {
                        report.failures += 1;
                        report.fatal += 1;
                        error!(driver = %self.name, error = %e, "reconcile failed on invalid input");
                    }
                    Ok(Err(e)) => {
                        report.failures += 1;
                        warn!(driver = %self.name, error = %e, "reconcile failed; retrying next tick");
                    }
                    Err(e) => {
                        report.failures += 1;
                        error!(driver = %self.name, error = %e, "reconcile aborted");
                    }
                }
            } else {
                report.skipped += 1;
                warn!(driver = %self.name, "cache not synced; skipping tick");
            }

            self.set(DriverState::Waiting);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.set(DriverState::Stopped);
        info!(driver = %self.name, ?report, "driver stopped");
        report
    }
}
