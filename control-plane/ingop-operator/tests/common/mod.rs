#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ingop_operator::cluster::{IngressConfig, InfrastructureStatus};
use ingop_operator::controllers::Context;
use ingop_operator::events::{BroadcastSink, ConvergenceEvent};
use ingop_operator::kinds;
use ingop_operator::retry::Backoff;
use ingop_store::memory::MemoryStore;
use ingop_store::{
    LabelSelector, ManagedResource, ObjectStore, ResourceIdentity, ResourceKind,
    StoreError, StoreResult,
};
use serde_json::{Value, json};
use tokio::sync::broadcast;

/// Backoff without jitter and with short delays.
pub fn quick_backoff() -> Backoff {
    Backoff {
        steps: 4,
        duration: Duration::from_millis(1),
        factor: 2.0,
        jitter: 0.0,
        cap: None,
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub sink: Arc<BroadcastSink>,
    pub rx: broadcast::Receiver<ConvergenceEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        let sink = Arc::new(BroadcastSink::new(64));
        let rx = sink.subscribe();
        Self { store, sink, rx }
    }

    pub fn ctx(&self) -> Context {
        self.ctx_over(Arc::new(self.store.clone()))
    }

    pub fn ctx_over(&self, store: Arc<dyn ObjectStore>) -> Context {
        Context::new(store, self.sink.clone(), quick_backoff())
    }

    /// Events recorded so far.
    pub fn drain(&mut self) -> Vec<ConvergenceEvent> {
        let mut out = Vec::new();
        while let Ok(e) = self.rx.try_recv() {
            out.push(e);
        }
        out
    }
}

pub fn infra_status(cp: &str, infra: &str, platform: &str) -> Value {
    json!({
        "controlPlaneTopology": cp,
        "infrastructureTopology": infra,
        "platformStatus": { "type": platform },
    })
}

pub fn infra_view(cp: &str, infra: &str, platform: &str) -> InfrastructureStatus {
    serde_json::from_value(infra_status(cp, infra, platform)).unwrap()
}

pub fn ingress_config_view(spec: Value, status: Value) -> IngressConfig {
    IngressConfig::from_resource(
        &ManagedResource::new(kinds::ingress_config())
            .with_spec(spec)
            .with_status(status),
    )
    .unwrap()
}

/// Seed `Infrastructure/cluster`, `Ingress/cluster` and `nodes` nodes.
pub async fn seed_cluster(
    store: &MemoryStore,
    infra: Value,
    ingress_spec: Value,
    ingress_status: Value,
    nodes: usize,
) {
    store
        .seed(ManagedResource::new(kinds::infrastructure()).with_status(infra))
        .await;
    store
        .seed(
            ManagedResource::new(kinds::ingress_config())
                .with_spec(ingress_spec)
                .with_status(ingress_status),
        )
        .await;
    for i in 0..nodes {
        store
            .seed(ManagedResource::new(ResourceIdentity::cluster(
                kinds::NODE,
                format!("node-{i}"),
            )))
            .await;
    }
}

/// Store whose first create loses a race: another writer creates the same
/// object (with `winner_spec`) just before ours lands.
pub struct RacingStore {
    pub inner: MemoryStore,
    winner_spec: Value,
    raced: AtomicBool,
}

impl RacingStore {
    pub fn new(inner: MemoryStore, winner_spec: Value) -> Self {
        Self {
            inner,
            winner_spec,
            raced: AtomicBool::new(false),
        }
    }
}

/// Store whose reads lag behind writes: objects that another writer
/// created are invisible until `catch_up` is called.
pub struct LaggingStore {
    pub inner: MemoryStore,
    hidden: AtomicBool,
}

impl LaggingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            hidden: AtomicBool::new(true),
        }
    }

    pub fn catch_up(&self) {
        self.hidden.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for RacingStore {
    async fn get(&self, id: &ResourceIdentity) -> StoreResult<ManagedResource> {
        self.inner.get(id).await
    }
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> StoreResult<Vec<ManagedResource>> {
        self.inner.list(kind, namespace, selector).await
    }
    async fn create(&self, obj: &ManagedResource) -> StoreResult<ManagedResource> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.inner
                .seed(
                    ManagedResource::new(obj.identity.clone())
                        .with_spec(self.winner_spec.clone()),
                )
                .await;
        }
        self.inner.create(obj).await
    }
    async fn update(&self, obj: &ManagedResource) -> StoreResult<ManagedResource> {
        self.inner.update(obj).await
    }
    async fn patch_status(&self, obj: &ManagedResource) -> StoreResult<ManagedResource> {
        self.inner.patch_status(obj).await
    }
    async fn delete(&self, id: &ResourceIdentity) -> StoreResult<()> {
        self.inner.delete(id).await
    }
    async fn wait_for_cache_sync(&self, deadline: Duration) -> bool {
        self.inner.wait_for_cache_sync(deadline).await
    }
}

#[async_trait]
impl ObjectStore for LaggingStore {
    async fn get(&self, id: &ResourceIdentity) -> StoreResult<ManagedResource> {
        let obj = self.inner.get(id).await?;
        if self.hidden.load(Ordering::SeqCst) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(obj)
    }
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> StoreResult<Vec<ManagedResource>> {
        self.inner.list(kind, namespace, selector).await
    }
    /// Someone else already created the object; our read side has not
    /// seen it yet.
    async fn create(&self, obj: &ManagedResource) -> StoreResult<ManagedResource> {
        if self.inner.peek(&obj.identity).await.is_none() {
            self.inner
                .seed(ManagedResource::new(obj.identity.clone()).with_spec(obj.spec.clone()))
                .await;
        }
        Err(StoreError::AlreadyExists(obj.identity.to_string()))
    }
    async fn update(&self, obj: &ManagedResource) -> StoreResult<ManagedResource> {
        self.inner.update(obj).await
    }
    async fn patch_status(&self, obj: &ManagedResource) -> StoreResult<ManagedResource> {
        self.inner.patch_status(obj).await
    }
    async fn delete(&self, id: &ResourceIdentity) -> StoreResult<()> {
        self.inner.delete(id).await
    }
    async fn wait_for_cache_sync(&self, deadline: Duration) -> bool {
        self.inner.wait_for_cache_sync(deadline).await
    }
}

/// Store where another writer sets `status` on the object right before our
/// first status patch lands, making that patch stale.
pub struct InterleavingStore {
    pub inner: MemoryStore,
    their_status: Value,
    done: AtomicBool,
}

impl InterleavingStore {
    pub fn new(inner: MemoryStore, their_status: Value) -> Self {
        Self {
            inner,
            their_status,
            done: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ObjectStore for InterleavingStore {
    async fn get(&self, id: &ResourceIdentity) -> StoreResult<ManagedResource> {
        self.inner.get(id).await
    }
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> StoreResult<Vec<ManagedResource>> {
        self.inner.list(kind, namespace, selector).await
    }
    async fn create(&self, obj: &ManagedResource) -> StoreResult<ManagedResource> {
        self.inner.create(obj).await
    }
    async fn update(&self, obj: &ManagedResource) -> StoreResult<ManagedResource> {
        self.inner.update(obj).await
    }
    async fn patch_status(&self, obj: &ManagedResource) -> StoreResult<ManagedResource> {
        if !self.done.swap(true, Ordering::SeqCst) {
            let theirs = self.their_status.clone();
            self.inner.touch(&obj.identity, |o| o.status = theirs).await;
        }
        self.inner.patch_status(obj).await
    }
    async fn delete(&self, id: &ResourceIdentity) -> StoreResult<()> {
        self.inner.delete(id).await
    }
    async fn wait_for_cache_sync(&self, deadline: Duration) -> bool {
        self.inner.wait_for_cache_sync(deadline).await
    }
}
