use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use ingop_store::ObjectStore;
use tracing::{info, warn};
use tracing_subscriber::reload;

use crate::cluster::fetch_ingress_config;
use crate::driver::Reconcile;
use crate::error::ReconcileResult;

/// Declared operator verbosity (`Ingress/cluster` `spec.operatorLogLevel`).
/// Discriminants are the numeric verbosity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum OperatorLogLevel {
    #[default]
    Normal = 0,
    Debug = 1,
    Trace = 2,
    TraceAll = 3,
}

impl OperatorLogLevel {
    /// Unset and unknown values are `Normal`.
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("Debug") => Self::Debug,
            Some("Trace") => Self::Trace,
            Some("TraceAll") => Self::TraceAll,
            _ => Self::Normal,
        }
    }

    pub fn verbosity(self) -> u8 {
        self as u8
    }

    pub fn from_verbosity(v: u8) -> Self {
        match v {
            1 => Self::Debug,
            2 => Self::Trace,
            3 => Self::TraceAll,
            _ => Self::Normal,
        }
    }
}

impl fmt::Display for OperatorLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "Normal",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
            Self::TraceAll => "TraceAll",
        })
    }
}

/// Where a new threshold is installed, e.g. the tracing filter.
pub trait LevelSink: Send + Sync {
    fn apply(&self, level: OperatorLogLevel) -> Result<(), reload::Error>;
}

/// Process-wide log threshold. Starts at `Normal`; a single driver writes
/// it, any task may read it.
pub struct LogLevelRegulator {
    current: AtomicU8,
    sink: Arc<dyn LevelSink>,
}

impl LogLevelRegulator {
    pub fn new(sink: Arc<dyn LevelSink>) -> Self {
        Self {
            current: AtomicU8::new(OperatorLogLevel::Normal.verbosity()),
            sink,
        }
    }

    pub fn current(&self) -> OperatorLogLevel {
        OperatorLogLevel::from_verbosity(self.current.load(Ordering::Acquire))
    }

    /// Install `desired` if it differs from the current level. Returns
    /// whether anything changed. The recorded level only moves once the
    /// sink accepted it, so a failed install is retried on the next call.
    pub fn regulate(&self, desired: OperatorLogLevel) -> bool {
        let want = desired.verbosity();
        let previous = self.current.load(Ordering::Acquire);
        if previous == want {
            return false;
        }
        if let Err(e) = self.sink.apply(desired) {
            warn!(error = %e, level = %desired, "failed to install log level");
            return false;
        }
        self.current.store(want, Ordering::Release);
        info!(
            from = %OperatorLogLevel::from_verbosity(previous),
            to = %desired,
            "updated log level"
        );
        true
    }
}

/// Driver body: read the declared level from the cluster ingress config and
/// regulate.
pub struct LogLevelReconciler {
    store: Arc<dyn ObjectStore>,
    regulator: Arc<LogLevelRegulator>,
}

impl LogLevelReconciler {
    pub fn new(store: Arc<dyn ObjectStore>, regulator: Arc<LogLevelRegulator>) -> Self {
        Self { store, regulator }
    }
}

#[async_trait]
impl Reconcile for LogLevelReconciler {
    async fn reconcile(&self) -> ReconcileResult<()> {
        let config = fetch_ingress_config(self.store.as_ref()).await?;
        self.regulator.regulate(OperatorLogLevel::parse(
            config.spec.operator_log_level.as_deref(),
        ));
        Ok(())
    }
}
