use async_trait::async_trait;
use ingop_store::{DesiredState, ResourceIdentity};

use super::Context;
use crate::convergence::{Converge, FieldOwnership};
use crate::driver::Reconcile;
use crate::error::ReconcileResult;
use crate::kinds;

/// Asks the network operator to inject the cluster's trusted CA bundle.
pub const INJECT_TRUSTED_CA_LABEL: &str = "config.openshift.io/inject-trusted-cabundle";

/// Config map that receives the trusted CA bundle. Only the injection label
/// is ours; the bundle data belongs to the injector.
pub struct TrustedCaConfigMap {
    pub namespace: String,
}

impl Converge for TrustedCaConfigMap {
    fn identity(&self) -> ResourceIdentity {
        kinds::trusted_ca_config_map(&self.namespace)
    }

    fn desired(&self) -> ReconcileResult<Option<DesiredState>> {
        Ok(Some(
            DesiredState::new(self.identity())
                .with_label(INJECT_TRUSTED_CA_LABEL, "true")
                .with_annotation("description", "ConfigMap providing service CA bundle."),
        ))
    }

    fn ownership(&self) -> FieldOwnership {
        FieldOwnership::labels_only()
    }
}

pub struct TrustedCaReconciler {
    ctx: Context,
    target: TrustedCaConfigMap,
}

impl TrustedCaReconciler {
    pub fn new(ctx: Context, namespace: impl Into<String>) -> Self {
        Self {
            ctx,
            target: TrustedCaConfigMap {
                namespace: namespace.into(),
            },
        }
    }
}

#[async_trait]
impl Reconcile for TrustedCaReconciler {
    async fn reconcile(&self) -> ReconcileResult<()> {
        self.ctx.ensure(&self.target).await?;
        Ok(())
    }
}
