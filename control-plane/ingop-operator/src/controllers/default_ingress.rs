use async_trait::async_trait;
use ingop_store::{DesiredState, ResourceIdentity};
use serde_json::{Value, json};
use tracing::debug;

use super::Context;
use crate::cluster::{
    IngressConfig, InfrastructureStatus, SINGLE_REPLICA_TOPOLOGY,
    fetch_ingress_config,
};
use crate::convergence::{Converge, FieldOwnership};
use crate::driver::Reconcile;
use crate::error::ReconcileResult;
use crate::kinds;
use crate::topology::DefaultPlacement;

/// Replica count for a new default ingress controller: one on a
/// single-replica topology, two otherwise. The topology consulted is the one
/// of the nodes the placement puts ingress on.
pub fn determine_replicas(config: &IngressConfig, infra: &InfrastructureStatus) -> i32 {
    let topology = match DefaultPlacement::parse(&config.status.default_placement) {
        DefaultPlacement::ControlPlane => &infra.control_plane_topology,
        DefaultPlacement::Workers => &infra.infrastructure_topology,
    };
    if topology == SINGLE_REPLICA_TOPOLOGY { 1 } else { 2 }
}

fn aws_nlb_strategy() -> Value {
    json!({
        "type": "LoadBalancerService",
        "loadBalancer": {
            "scope": "External",
            "providerParameters": {
                "type": "AWS",
                "aws": { "type": "NLB" },
            },
        },
    })
}

/// The `default` IngressController. Created once and then left to the
/// cluster admin: the operator never updates it.
pub struct DefaultIngressController<'a> {
    pub namespace: &'a str,
    pub config: &'a IngressConfig,
    pub infra: &'a InfrastructureStatus,
}

impl Converge for DefaultIngressController<'_> {
    fn identity(&self) -> ResourceIdentity {
        kinds::default_ingress_controller(self.namespace)
    }

    fn desired(&self) -> ReconcileResult<Option<DesiredState>> {
        // Replicas is always set explicitly so the scale subresource works.
        let mut spec = json!({ "replicas": determine_replicas(self.config, self.infra) });
        if self.config.spec.wants_aws_nlb() {
            spec["endpointPublishingStrategy"] = aws_nlb_strategy();
        }
        Ok(Some(DesiredState::new(self.identity()).with_spec(spec)))
    }

    fn ownership(&self) -> FieldOwnership {
        FieldOwnership::create_only()
    }
}

/// Driver body. The infrastructure view is read once at start; the ingress
/// config is re-read every tick.
pub struct DefaultIngressReconciler {
    ctx: Context,
    namespace: String,
    infra: InfrastructureStatus,
}

impl DefaultIngressReconciler {
    pub fn new(ctx: Context, namespace: impl Into<String>, infra: InfrastructureStatus) -> Self {
        Self {
            ctx,
            namespace: namespace.into(),
            infra,
        }
    }
}

#[async_trait]
impl Reconcile for DefaultIngressReconciler {
    async fn reconcile(&self) -> ReconcileResult<()> {
        let config = fetch_ingress_config(self.ctx.store.as_ref()).await?;
        let out = self
            .ctx
            .ensure(&DefaultIngressController {
                namespace: &self.namespace,
                config: &config,
                infra: &self.infra,
            })
            .await?;
        debug!(action = %out.action, "ensured default ingress controller");
        Ok(())
    }
}
