//! One-time backfill of the ingress config `defaultPlacement` status for
//! clusters installed before the field existed.

use std::fmt;
use std::sync::Arc;

use ingop_store::{LabelSelector, ObjectStore};
use serde_json::json;
use tracing::{debug, info};

use crate::cluster::{
    IngressConfig, InfrastructureStatus, NONE_PLATFORM, SINGLE_REPLICA_TOPOLOGY,
    fetch_infrastructure,
};
use crate::error::{ReconcileError, ReconcileResult};
use crate::kinds;
use crate::retry::{Backoff, retry_on_conflict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefaultPlacement {
    ControlPlane,
    Workers,
}

impl DefaultPlacement {
    pub fn as_str(self) -> &'static str {
        match self {
            DefaultPlacement::ControlPlane => "ControlPlane",
            DefaultPlacement::Workers => "Workers",
        }
    }

    /// Unset or unknown reads as `Workers`.
    pub fn parse(s: &str) -> Self {
        match s {
            "ControlPlane" => DefaultPlacement::ControlPlane,
            _ => DefaultPlacement::Workers,
        }
    }
}

impl fmt::Display for DefaultPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lone node on a platform-less, single-replica cluster hosts ingress on
/// the control plane; everything else uses workers.
pub fn select_default_placement(
    node_count: usize,
    infra: &InfrastructureStatus,
) -> DefaultPlacement {
    if node_count == 1
        && infra.control_plane_topology == SINGLE_REPLICA_TOPOLOGY
        && infra.infrastructure_topology == SINGLE_REPLICA_TOPOLOGY
        && infra.platform_type() == NONE_PLATFORM
    {
        DefaultPlacement::ControlPlane
    } else {
        DefaultPlacement::Workers
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// The field was set before the gate looked; nothing was written.
    AlreadySet(String),
    Written(DefaultPlacement),
    /// Another writer set the field between the decision and the write.
    SetConcurrently(String),
}

pub struct TopologyGate {
    store: Arc<dyn ObjectStore>,
    backoff: Backoff,
}

impl TopologyGate {
    pub fn new(store: Arc<dyn ObjectStore>, backoff: Backoff) -> Self {
        Self { store, backoff }
    }

    /// Set `defaultPlacement` once. Safe to call on every start: a set
    /// field is never re-evaluated.
    pub async fn run(&self) -> ReconcileResult<GateOutcome> {
        let id = kinds::ingress_config();
        let current = IngressConfig::from_resource(&self.store.get(&id).await?)?;
        if !current.status.default_placement.is_empty() {
            debug!(placement = %current.status.default_placement, "default placement already set");
            return Ok(GateOutcome::AlreadySet(current.status.default_placement));
        }

        let infra = fetch_infrastructure(self.store.as_ref()).await?;
        let nodes = self
            .store
            .list(kinds::NODE, None, &LabelSelector::everything())
            .await?;
        let chosen = select_default_placement(nodes.len(), &infra);

        let outcome = retry_on_conflict(&self.backoff, || async {
            let mut obj = self.store.get(&id).await?;
            let placed = IngressConfig::from_resource(&obj)?.status.default_placement;
            if !placed.is_empty() {
                return Ok(GateOutcome::SetConcurrently(placed));
            }
            obj.status = json!({ "defaultPlacement": chosen.as_str() });
            self.store.patch_status(&obj).await?;
            Ok::<_, ReconcileError>(GateOutcome::Written(chosen))
        })
        .await?;

        match &outcome {
            GateOutcome::Written(p) => {
                info!(%id, placement = %p, nodes = nodes.len(), "patched ingress config default placement")
            }
            other => debug!(%id, ?other, "default placement set by another writer"),
        }
        Ok(outcome)
    }
}
