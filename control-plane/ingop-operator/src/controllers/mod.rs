//! Managed resource families. Each is a [`Converge`](crate::convergence::Converge)
//! target plus the driver body that ensures it every tick.

pub mod default_ingress;
pub mod subscription;
pub mod trusted_ca;

use std::sync::Arc;

use ingop_store::ObjectStore;

use crate::convergence::{Converge, ReconcileOutcome, ensure};
use crate::error::ReconcileResult;
use crate::events::EventSink;
use crate::retry::Backoff;

/// What every family needs to converge its objects.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn ObjectStore>,
    pub events: Arc<dyn EventSink>,
    pub backoff: Backoff,
}

impl Context {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        events: Arc<dyn EventSink>,
        backoff: Backoff,
    ) -> Self {
        Self {
            store,
            events,
            backoff,
        }
    }

    pub async fn ensure<T: Converge + ?Sized>(
        &self,
        target: &T,
    ) -> ReconcileResult<ReconcileOutcome> {
        ensure(
            self.store.as_ref(),
            self.events.as_ref(),
            &self.backoff,
            target,
        )
        .await
    }
}
