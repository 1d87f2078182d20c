use async_trait::async_trait;
use ingop_store::{DesiredState, LabelSelector, ManagedResource, ResourceIdentity};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::Context;
use crate::convergence::{Converge, ConvergeAction, FieldOwnership, diff};
use crate::driver::Reconcile;
use crate::error::{ReconcileError, ReconcileResult};
use crate::events::ConvergenceEvent;
use crate::kinds;
use crate::retry::retry_on_conflict;

pub const SERVICE_MESH_DESIRED_VERSION: &str = "servicemeshoperator.v2.5.0";

/// OLM subscription for the service mesh operator, pinned to a starting CSV
/// with manual install plan approval.
pub struct ServiceMeshSubscription;

impl Converge for ServiceMeshSubscription {
    fn identity(&self) -> ResourceIdentity {
        kinds::service_mesh_subscription()
    }

    fn desired(&self) -> ReconcileResult<Option<DesiredState>> {
        Ok(Some(DesiredState::new(self.identity()).with_spec(json!({
            "channel": "stable",
            "installPlanApproval": "Manual",
            "name": kinds::SERVICE_MESH_SUBSCRIPTION_NAME,
            "source": "redhat-operators",
            "sourceNamespace": "openshift-marketplace",
            "startingCSV": SERVICE_MESH_DESIRED_VERSION,
        }))))
    }

    fn ownership(&self) -> FieldOwnership {
        FieldOwnership::whole_spec()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallPlanSpec {
    #[serde(default)]
    cluster_service_version_names: Vec<String>,
    #[serde(default)]
    approved: bool,
}

fn plan_spec(obj: &ManagedResource) -> ReconcileResult<InstallPlanSpec> {
    obj.decode_spec()
        .map_err(|e| ReconcileError::decode(format!("{} spec", obj.identity), e))
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstallPlanOutcome {
    /// No install plan for the desired CSV exists yet.
    Absent,
    Approved(ManagedResource),
    AlreadyApproved(ManagedResource),
}

/// Approve the install plan that installs `csv`, if there is one. The
/// approval is an update of the plan, retried on conflict against a fresh
/// list.
pub async fn approve_install_plan(
    ctx: &Context,
    csv: &str,
) -> ReconcileResult<InstallPlanOutcome> {
    let (outcome, event) = retry_on_conflict(&ctx.backoff, || async {
        let plans = ctx
            .store
            .list(
                kinds::INSTALL_PLAN,
                Some(kinds::SERVICE_MESH_NAMESPACE),
                &LabelSelector::everything(),
            )
            .await?;

        let mut found = None;
        for plan in plans {
            let spec = plan_spec(&plan)?;
            if spec.cluster_service_version_names.iter().any(|n| n == csv) {
                found = Some((plan, spec));
                break;
            }
        }
        let Some((plan, spec)) = found else {
            debug!(csv, "no install plan for cluster service version yet");
            return Ok((InstallPlanOutcome::Absent, None));
        };
        if spec.approved {
            return Ok((InstallPlanOutcome::AlreadyApproved(plan), None));
        }

        let mut approved = plan.clone();
        match approved.spec.as_object_mut() {
            Some(m) => {
                m.insert("approved".into(), Value::Bool(true));
            }
            None => approved.spec = json!({ "approved": true }),
        }
        let change = diff(&plan, &approved);
        let updated = ctx.store.update(&approved).await?;
        let event =
            ConvergenceEvent::new(ConvergeAction::Updated, updated.identity.clone(), Some(change));
        Ok::<_, ReconcileError>((InstallPlanOutcome::Approved(updated), Some(event)))
    })
    .await?;

    if let Some(event) = event {
        ctx.events.record(&event).await;
    }
    Ok(outcome)
}

pub struct ServiceMeshReconciler {
    ctx: Context,
}

impl ServiceMeshReconciler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconcile for ServiceMeshReconciler {
    async fn reconcile(&self) -> ReconcileResult<()> {
        let sub = self.ctx.ensure(&ServiceMeshSubscription).await?;
        if sub.result.is_none() {
            // Not visible yet; the plan cannot exist before the subscription.
            return Ok(());
        }
        approve_install_plan(&self.ctx, SERVICE_MESH_DESIRED_VERSION).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LogSink;
    use crate::retry::Backoff;
    use ingop_store::memory::MemoryStore;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::instrument::WithSubscriber;
    use tracing_subscriber::Layer;
    use tracing_subscriber::layer::SubscriberExt;

    struct CountInfo(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for CountInfo {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() == tracing::Level::INFO {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn desired_subscription_pins_manual_approval() {
        let d = ServiceMeshSubscription.desired().unwrap().unwrap();
        assert_eq!(d.identity, kinds::service_mesh_subscription());
        assert_eq!(d.spec["installPlanApproval"], "Manual");
        assert_eq!(d.spec["startingCSV"], SERVICE_MESH_DESIRED_VERSION);
        assert_eq!(ServiceMeshSubscription.ownership(), FieldOwnership::whole_spec());
    }

    #[test]
    fn plan_spec_defaults_missing_fields() {
        let plan = ManagedResource::new(ResourceIdentity::namespaced(
            kinds::INSTALL_PLAN,
            kinds::SERVICE_MESH_NAMESPACE,
            "install-abc",
        ))
        .with_spec(json!({"clusterServiceVersionNames": ["a"]}));
        let spec = plan_spec(&plan).unwrap();
        assert_eq!(spec.cluster_service_version_names, vec!["a".to_string()]);
        assert!(!spec.approved);
    }

    #[tokio::test]
    async fn approval_is_logged_once() {
        let store = MemoryStore::new();
        store
            .seed(
                ManagedResource::new(ResourceIdentity::namespaced(
                    kinds::INSTALL_PLAN,
                    kinds::SERVICE_MESH_NAMESPACE,
                    "install-abc",
                ))
                .with_spec(json!({
                    "approved": false,
                    "clusterServiceVersionNames": [SERVICE_MESH_DESIRED_VERSION],
                })),
            )
            .await;
        let ctx = Context::new(Arc::new(store), Arc::new(LogSink), Backoff::default());

        let infos = Arc::new(AtomicUsize::new(0));
        let dispatch =
            tracing::Dispatch::new(tracing_subscriber::registry().with(CountInfo(infos.clone())));
        let out = approve_install_plan(&ctx, SERVICE_MESH_DESIRED_VERSION)
            .with_subscriber(dispatch)
            .await
            .unwrap();

        assert!(matches!(out, InstallPlanOutcome::Approved(_)));
        assert_eq!(infos.load(Ordering::SeqCst), 1);
    }
}
