use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::trace;

use crate::error::StoreError;
use crate::resource::{
    LabelSelector, ManagedResource, ResourceIdentity, ResourceKind,
};
use crate::traits::{ObjectStore, StoreResult};

/// Store operations, used to address injected faults and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    List,
    Create,
    Update,
    PatchStatus,
    Delete,
}

impl StoreOp {
    fn index(self) -> usize {
        match self {
            StoreOp::Get => 0,
            StoreOp::List => 1,
            StoreOp::Create => 2,
            StoreOp::Update => 3,
            StoreOp::PatchStatus => 4,
            StoreOp::Delete => 5,
        }
    }
}

/// Attempted calls per operation, including calls that failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpStats {
    pub gets: u64,
    pub lists: u64,
    pub creates: u64,
    pub updates: u64,
    pub status_patches: u64,
    pub deletes: u64,
}

impl OpStats {
    /// Calls that could have changed stored state.
    pub fn writes(&self) -> u64 {
        self.creates + self.updates + self.status_patches + self.deletes
    }
}

type Defaulter = Arc<dyn Fn(&mut ManagedResource) + Send + Sync>;

/// In-process object store with the same optimistic-concurrency contract as
/// the real one: every accepted write bumps a monotonic resource version and
/// writes carrying a stale version are rejected.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    objects: RwLock<BTreeMap<ResourceIdentity, ManagedResource>>,
    next_version: AtomicU64,
    synced: AtomicBool,
    faults: Mutex<HashMap<StoreOp, VecDeque<StoreError>>>,
    calls: [AtomicU64; 6],
    defaulter: Mutex<Option<Defaulter>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                objects: RwLock::new(BTreeMap::new()),
                next_version: AtomicU64::new(1),
                synced: AtomicBool::new(true),
                faults: Mutex::new(HashMap::new()),
                calls: Default::default(),
                defaulter: Mutex::new(None),
            }),
        }
    }

    /// Apply `f` to every object accepted by create or update, the way an
    /// API server fills defaults on write.
    pub fn with_write_defaulter<F>(self, f: F) -> Self
    where
        F: Fn(&mut ManagedResource) + Send + Sync + 'static,
    {
        *locked(&self.inner.defaulter) = Some(Arc::new(f));
        self
    }

    pub fn set_cache_synced(&self, synced: bool) {
        self.inner.synced.store(synced, Ordering::SeqCst);
    }

    /// Fail the next call of `op` with `err`. Faults queue up per operation.
    pub fn inject(&self, op: StoreOp, err: StoreError) {
        locked(&self.inner.faults)
            .entry(op)
            .or_default()
            .push_back(err);
    }

    pub fn inject_conflicts(&self, op: StoreOp, n: usize) {
        for i in 0..n {
            self.inject(op, StoreError::Conflict(format!("injected #{i}")));
        }
    }

    pub fn stats(&self) -> OpStats {
        let c = |op: StoreOp| self.inner.calls[op.index()].load(Ordering::SeqCst);
        OpStats {
            gets: c(StoreOp::Get),
            lists: c(StoreOp::List),
            creates: c(StoreOp::Create),
            updates: c(StoreOp::Update),
            status_patches: c(StoreOp::PatchStatus),
            deletes: c(StoreOp::Delete),
        }
    }

    /// Insert or overwrite an object directly, bypassing faults and
    /// counters. Assigns a fresh resource version.
    pub async fn seed(&self, mut obj: ManagedResource) -> ManagedResource {
        obj.resource_version = Some(self.next_version());
        self.inner
            .objects
            .write()
            .await
            .insert(obj.identity.clone(), obj.clone());
        obj
    }

    /// Read an object without counting the call.
    pub async fn peek(&self, id: &ResourceIdentity) -> Option<ManagedResource> {
        self.inner.objects.read().await.get(id).cloned()
    }

    /// Mutate a stored object as some other writer would, bumping its
    /// resource version.
    pub async fn touch<F>(
        &self,
        id: &ResourceIdentity,
        f: F,
    ) -> Option<ManagedResource>
    where
        F: FnOnce(&mut ManagedResource),
    {
        let mut objects = self.inner.objects.write().await;
        let obj = objects.get_mut(id)?;
        f(obj);
        obj.resource_version = Some(self.next_version());
        Some(obj.clone())
    }

    fn next_version(&self) -> String {
        self.inner
            .next_version
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
    }

    fn enter(&self, op: StoreOp) -> StoreResult<()> {
        self.inner.calls[op.index()].fetch_add(1, Ordering::SeqCst);
        match locked(&self.inner.faults)
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
        {
            Some(err) => {
                trace!(?op, %err, "memory store: injected fault");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn apply_defaults(&self, obj: &mut ManagedResource) {
        let defaulter = locked(&self.inner.defaulter).clone();
        if let Some(f) = defaulter {
            f(obj);
        }
    }
}

fn check_version(
    id: &ResourceIdentity,
    incoming: Option<&str>,
    stored: Option<&str>,
) -> StoreResult<()> {
    match incoming {
        Some(rv) if Some(rv) != stored => Err(StoreError::Conflict(format!(
            "{id}: resource version {rv} is stale"
        ))),
        _ => Ok(()),
    }
}

/// JSON merge patch (RFC 7386).
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(t) = target {
        for (k, v) in patch {
            if v.is_null() {
                t.remove(k);
            } else {
                merge_patch(t.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, id: &ResourceIdentity) -> StoreResult<ManagedResource> {
        self.enter(StoreOp::Get)?;
        self.inner
            .objects
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> StoreResult<Vec<ManagedResource>> {
        self.enter(StoreOp::List)?;
        let objects = self.inner.objects.read().await;
        let items = objects
            .values()
            .filter(|obj| {
                if obj.identity.kind != kind {
                    return false;
                }
                if let Some(ns) = namespace {
                    if obj.identity.namespace.as_deref() != Some(ns) {
                        return false;
                    }
                }
                selector.matches(&obj.metadata.labels)
            })
            .cloned()
            .collect();
        Ok(items)
    }

    async fn create(
        &self,
        obj: &ManagedResource,
    ) -> StoreResult<ManagedResource> {
        self.enter(StoreOp::Create)?;
        let mut objects = self.inner.objects.write().await;
        if objects.contains_key(&obj.identity) {
            return Err(StoreError::AlreadyExists(obj.identity.to_string()));
        }
        if obj.resource_version.is_some() {
            return Err(StoreError::Invalid(format!(
                "{}: resource version must not be set on create",
                obj.identity
            )));
        }
        let mut stored = obj.clone();
        self.apply_defaults(&mut stored);
        stored.resource_version = Some(self.next_version());
        objects.insert(stored.identity.clone(), stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        obj: &ManagedResource,
    ) -> StoreResult<ManagedResource> {
        self.enter(StoreOp::Update)?;
        let mut objects = self.inner.objects.write().await;
        let current = objects
            .get(&obj.identity)
            .ok_or_else(|| StoreError::NotFound(obj.identity.to_string()))?;
        let Some(rv) = obj.resource_version.as_deref() else {
            return Err(StoreError::Invalid(format!(
                "{}: update requires a resource version",
                obj.identity
            )));
        };
        check_version(
            &obj.identity,
            Some(rv),
            current.resource_version.as_deref(),
        )?;
        let mut stored = obj.clone();
        stored.status = current.status.clone();
        self.apply_defaults(&mut stored);
        stored.resource_version = Some(self.next_version());
        objects.insert(stored.identity.clone(), stored.clone());
        Ok(stored)
    }

    async fn patch_status(
        &self,
        obj: &ManagedResource,
    ) -> StoreResult<ManagedResource> {
        self.enter(StoreOp::PatchStatus)?;
        let mut objects = self.inner.objects.write().await;
        let current = objects
            .get_mut(&obj.identity)
            .ok_or_else(|| StoreError::NotFound(obj.identity.to_string()))?;
        check_version(
            &obj.identity,
            obj.resource_version.as_deref(),
            current.resource_version.as_deref(),
        )?;
        merge_patch(&mut current.status, &obj.status);
        current.resource_version = Some(self.next_version());
        Ok(current.clone())
    }

    async fn delete(&self, id: &ResourceIdentity) -> StoreResult<()> {
        self.enter(StoreOp::Delete)?;
        self.inner
            .objects
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn wait_for_cache_sync(&self, deadline: Duration) -> bool {
        if self.inner.synced.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(deadline).await;
        self.inner.synced.load(Ordering::SeqCst)
    }
}
