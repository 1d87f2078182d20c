use std::sync::Arc;

use anyhow::Context as _;
use ingop_store::ObjectStore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cluster::{InfrastructureStatus, fetch_infrastructure};
use crate::config::OperatorConfig;
use crate::controllers::Context;
use crate::controllers::default_ingress::DefaultIngressReconciler;
use crate::controllers::subscription::ServiceMeshReconciler;
use crate::controllers::trusted_ca::TrustedCaReconciler;
use crate::driver::{DriverReport, PeriodicDriver};
use crate::events::EventSink;
use crate::loglevel::{LogLevelReconciler, LogLevelRegulator};
use crate::topology::TopologyGate;

pub const DEFAULT_INGRESS_DRIVER: &str = "default-ingress-controller";
pub const TRUSTED_CA_DRIVER: &str = "trusted-ca-configmap";
pub const SERVICE_MESH_DRIVER: &str = "service-mesh-subscription";
pub const LOG_LEVEL_DRIVER: &str = "log-level";

pub struct Operator {
    cfg: OperatorConfig,
    store: Arc<dyn ObjectStore>,
    events: Arc<dyn EventSink>,
    regulator: Arc<LogLevelRegulator>,
}

impl Operator {
    pub fn new(
        cfg: OperatorConfig,
        store: Arc<dyn ObjectStore>,
        events: Arc<dyn EventSink>,
        regulator: Arc<LogLevelRegulator>,
    ) -> Self {
        Self {
            cfg,
            store,
            events,
            regulator,
        }
    }

    fn context(&self) -> Context {
        Context::new(self.store.clone(), self.events.clone(), self.cfg.retry.backoff())
    }

    /// One driver per enabled resource family plus the log level driver.
    /// Family drivers wait for the read cache before each tick.
    pub fn drivers(&self, infra: &InfrastructureStatus) -> Vec<PeriodicDriver> {
        let interval = self.cfg.reconcile_interval();
        let gated = |d: PeriodicDriver| {
            d.gated_on(self.store.clone(), self.cfg.cache_sync_timeout())
        };
        let mut drivers = Vec::new();

        if infra.is_external_control_plane() {
            info!("skipping default ingress controller creation");
        } else {
            drivers.push(gated(PeriodicDriver::new(
                DEFAULT_INGRESS_DRIVER,
                interval,
                Arc::new(DefaultIngressReconciler::new(
                    self.context(),
                    self.cfg.namespace.clone(),
                    infra.clone(),
                )),
            )));
        }

        if self.cfg.features.trusted_ca {
            drivers.push(gated(PeriodicDriver::new(
                TRUSTED_CA_DRIVER,
                interval,
                Arc::new(TrustedCaReconciler::new(
                    self.context(),
                    self.cfg.namespace.clone(),
                )),
            )));
        }

        if self.cfg.gateway_api_enabled() {
            drivers.push(gated(PeriodicDriver::new(
                SERVICE_MESH_DRIVER,
                interval,
                Arc::new(ServiceMeshReconciler::new(self.context())),
            )));
        }

        drivers.push(PeriodicDriver::new(
            LOG_LEVEL_DRIVER,
            interval,
            Arc::new(LogLevelReconciler::new(
                self.store.clone(),
                self.regulator.clone(),
            )),
        ));

        drivers
    }

    /// Run until `cancel` fires, then wait for every driver to stop.
    /// Only a failure to read the infrastructure config is fatal.
    pub async fn start(
        &self,
        cancel: CancellationToken,
    ) -> anyhow::Result<Vec<(String, DriverReport)>> {
        let infra = fetch_infrastructure(self.store.as_ref())
            .await
            .context("failed fetching infrastructure config")?;

        let mut set = JoinSet::new();
        for driver in self.drivers(&infra) {
            let name = driver.name().to_string();
            let cancel = cancel.clone();
            set.spawn(async move { (name, driver.run(cancel).await) });
        }

        let gate = TopologyGate::new(self.store.clone(), self.cfg.retry.backoff());
        if let Err(e) = gate.run().await {
            error!(error = %e, "failed to backfill ingress config default placement");
        }

        let mut reports = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = %e, "driver task failed"),
            }
        }
        reports.sort_by(|a, b| a.0.cmp(&b.0));
        info!(drivers = reports.len(), "operator stopped");
        Ok(reports)
    }
}
