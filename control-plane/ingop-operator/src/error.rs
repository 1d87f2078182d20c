use ingop_store::{ResourceIdentity, StoreError};

use crate::retry::RetryableError;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The desired-state computation produced something unusable.
    #[error("invalid desired state for {identity}: {reason}")]
    InvalidDesired {
        identity: ResourceIdentity,
        reason: String,
    },

    #[error("cannot decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: StoreError,
    },
}

impl ReconcileError {
    pub fn invalid(identity: &ResourceIdentity, reason: impl Into<String>) -> Self {
        ReconcileError::InvalidDesired {
            identity: identity.clone(),
            reason: reason.into(),
        }
    }

    pub fn decode(what: impl Into<String>, source: StoreError) -> Self {
        ReconcileError::Decode {
            what: what.into(),
            source,
        }
    }

    /// Fatal errors come from bad input and will recur on every tick
    /// until the input changes.
    pub fn is_fatal(&self) -> bool {
        match self {
            ReconcileError::Store(e) => e.is_fatal(),
            ReconcileError::InvalidDesired { .. } | ReconcileError::Decode { .. } => true,
        }
    }
}

impl RetryableError for ReconcileError {
    fn is_conflict(&self) -> bool {
        matches!(self, ReconcileError::Store(e) if e.is_conflict())
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_conflicts_are_retryable() {
        assert!(ReconcileError::from(StoreError::Conflict("x".into())).is_conflict());
        assert!(!ReconcileError::from(StoreError::Transient("x".into())).is_conflict());
        assert!(
            !ReconcileError::decode("spec", StoreError::Conflict("x".into()))
                .is_conflict()
        );
    }

    #[test]
    fn fatal_classification() {
        assert!(ReconcileError::from(StoreError::Invalid("x".into())).is_fatal());
        assert!(!ReconcileError::from(StoreError::NotFound("x".into())).is_fatal());
        assert!(
            ReconcileError::decode("status", StoreError::Serialization("x".into()))
                .is_fatal()
        );
    }
}
