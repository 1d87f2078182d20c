use std::fmt;

use ingop_store::{
    DesiredState, ManagedResource, ObjectStore, ResourceIdentity, StoreError,
};
use tracing::{debug, trace};

use super::compare::{FieldOwnership, compare, diff};
use crate::error::{ReconcileError, ReconcileResult};
use crate::events::{ConvergenceEvent, EventSink};
use crate::retry::{Backoff, retry_on_conflict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvergeAction {
    NoOp,
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for ConvergeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConvergeAction::NoOp => "unchanged",
            ConvergeAction::Created => "created",
            ConvergeAction::Updated => "updated",
            ConvergeAction::Deleted => "deleted",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub action: ConvergeAction,
    /// The object as the store last returned it; `None` when it does not
    /// exist (or is not yet visible) afterwards.
    pub result: Option<ManagedResource>,
}

impl ReconcileOutcome {
    fn new(action: ConvergeAction, result: Option<ManagedResource>) -> Self {
        Self { action, result }
    }
}

/// One managed object: where it lives, what it should look like, and which
/// parts of it are ours.
pub trait Converge: Send + Sync {
    fn identity(&self) -> ResourceIdentity;

    /// `None` means the object should not exist.
    fn desired(&self) -> ReconcileResult<Option<DesiredState>>;

    fn ownership(&self) -> FieldOwnership;
}

/// Drive one object toward `target`'s desired state with a single minimal
/// action.
///
/// | want | have | action |
/// |---|---|---|
/// | no | no | no-op |
/// | no | yes | delete; already gone counts as done |
/// | yes | no | create; a lost create race re-fetches and counts as done |
/// | yes | yes | update the owned fields if they differ |
///
/// Each attempt re-fetches the current object, so a conflicted update is
/// retried against a fresh copy per `backoff`. Every state-changing action
/// is recorded on `events` exactly once. Other store errors are returned
/// as they are.
pub async fn ensure<T>(
    store: &dyn ObjectStore,
    events: &dyn EventSink,
    backoff: &Backoff,
    target: &T,
) -> ReconcileResult<ReconcileOutcome>
where
    T: Converge + ?Sized,
{
    let identity = target.identity();
    let desired = target.desired()?;
    if let Some(d) = &desired {
        if d.identity != identity {
            return Err(ReconcileError::invalid(
                &identity,
                format!("desired state is addressed to {}", d.identity),
            ));
        }
    }
    let ownership = target.ownership();

    let (outcome, event) = retry_on_conflict(backoff, || {
        converge_once(store, &identity, desired.as_ref(), &ownership)
    })
    .await?;

    if let Some(event) = event {
        events.record(&event).await;
    }
    Ok(outcome)
}

async fn converge_once(
    store: &dyn ObjectStore,
    identity: &ResourceIdentity,
    desired: Option<&DesiredState>,
    ownership: &FieldOwnership,
) -> ReconcileResult<(ReconcileOutcome, Option<ConvergenceEvent>)> {
    let current = store.get_opt(identity).await?;

    match (desired, current) {
        (None, None) => Ok((ReconcileOutcome::new(ConvergeAction::NoOp, None), None)),

        (None, Some(_)) => match store.delete(identity).await {
            Ok(()) => Ok((
                ReconcileOutcome::new(ConvergeAction::Deleted, None),
                Some(ConvergenceEvent::new(
                    ConvergeAction::Deleted,
                    identity.clone(),
                    None,
                )),
            )),
            Err(StoreError::NotFound(_)) => {
                debug!(%identity, "already deleted");
                Ok((ReconcileOutcome::new(ConvergeAction::NoOp, None), None))
            }
            Err(e) => Err(e.into()),
        },

        (Some(want), None) => {
            match store.create(&want.clone().into_resource()).await {
                Ok(created) => Ok((
                    ReconcileOutcome::new(ConvergeAction::Created, Some(created)),
                    Some(ConvergenceEvent::new(
                        ConvergeAction::Created,
                        identity.clone(),
                        None,
                    )),
                )),
                Err(StoreError::AlreadyExists(_)) => {
                    debug!(%identity, "created concurrently by another writer");
                    let now = store.get_opt(identity).await?;
                    Ok((ReconcileOutcome::new(ConvergeAction::NoOp, now), None))
                }
                Err(e) => Err(e.into()),
            }
        }

        (Some(want), Some(have)) => match compare(&have, want, ownership) {
            None => {
                trace!(%identity, "in sync");
                Ok((ReconcileOutcome::new(ConvergeAction::NoOp, Some(have)), None))
            }
            Some(merged) => {
                let change = diff(&have, &merged);
                let updated = store.update(&merged).await?;
                Ok((
                    ReconcileOutcome::new(ConvergeAction::Updated, Some(updated)),
                    Some(ConvergenceEvent::new(
                        ConvergeAction::Updated,
                        identity.clone(),
                        Some(change),
                    )),
                ))
            }
        },
    }
}
