use crate::error::StoreError;
use crate::resource::{
    LabelSelector, ManagedResource, ResourceIdentity, ResourceKind,
};
use async_trait::async_trait;
use std::time::Duration;

pub type StoreResult<T> = Result<T, StoreError>;

/// Capability set of the external object store.
///
/// Writes are guarded by the object's `resource_version`: a write carrying
/// a stale version fails with [`StoreError::Conflict`] and never overwrites.
/// Reads are not guaranteed to observe a write that just returned, so
/// callers must re-fetch before retrying a conflicted write.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, id: &ResourceIdentity) -> StoreResult<ManagedResource>;

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> StoreResult<Vec<ManagedResource>>;

    /// Fails with `AlreadyExists` when the identity is taken.
    async fn create(
        &self,
        obj: &ManagedResource,
    ) -> StoreResult<ManagedResource>;

    /// Replaces metadata and spec; the status subresource is left as is.
    async fn update(
        &self,
        obj: &ManagedResource,
    ) -> StoreResult<ManagedResource>;

    /// Merge-patches the status subresource, guarded by the object's
    /// resource version when one is present.
    async fn patch_status(
        &self,
        obj: &ManagedResource,
    ) -> StoreResult<ManagedResource>;

    async fn delete(&self, id: &ResourceIdentity) -> StoreResult<()>;

    /// Block until the read side has an initial consistent view, or the
    /// deadline passes. Returns whether the view is ready.
    async fn wait_for_cache_sync(&self, deadline: Duration) -> bool;

    /// `get` with absence folded into `None`.
    async fn get_opt(
        &self,
        id: &ResourceIdentity,
    ) -> StoreResult<Option<ManagedResource>> {
        match self.get(id).await {
            Ok(obj) => Ok(Some(obj)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
