#![cfg(feature = "memory")]

use anyhow::Result;
use ingop_store::memory::{MemoryStore, StoreOp};
use ingop_store::{
    LabelSelector, ManagedResource, ObjectStore, ResourceIdentity,
    ResourceKind, StoreError,
};
use serde_json::json;
use std::time::Duration;

const WIDGET: ResourceKind = ResourceKind {
    group: "example.io",
    version: "v1",
    kind: "Widget",
    plural: "widgets",
    namespaced: true,
    spec_field: "spec",
};

const GADGET: ResourceKind = ResourceKind {
    group: "example.io",
    version: "v1",
    kind: "Gadget",
    plural: "gadgets",
    namespaced: true,
    spec_field: "spec",
};

fn widget(name: &str) -> ManagedResource {
    ManagedResource::new(ResourceIdentity::namespaced(WIDGET, "ns", name))
        .with_spec(json!({"size": 1}))
}

#[test_log::test(tokio::test)]
async fn create_assigns_version_and_rejects_duplicates() -> Result<()> {
    let store = MemoryStore::new();
    let created = store.create(&widget("a")).await?;
    assert!(created.resource_version.is_some());

    let err = store.create(&widget("a")).await.unwrap_err();
    assert!(err.is_already_exists());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn stale_update_is_rejected_without_overwrite() -> Result<()> {
    let store = MemoryStore::new();
    let first = store.create(&widget("a")).await?;

    let mut winner = first.clone();
    winner.spec = json!({"size": 2});
    store.update(&winner).await?;

    let mut loser = first.clone();
    loser.spec = json!({"size": 3});
    let err = store.update(&loser).await.unwrap_err();
    assert!(err.is_conflict());

    let stored = store.peek(&first.identity).await.unwrap();
    assert_eq!(stored.spec, json!({"size": 2}));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn update_without_version_is_invalid() -> Result<()> {
    let store = MemoryStore::new();
    store.create(&widget("a")).await?;
    let err = store.update(&widget("a")).await.unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn update_leaves_status_alone() -> Result<()> {
    let store = MemoryStore::new();
    let seeded = store
        .seed(widget("a").with_status(json!({"ready": true})))
        .await;
    let mut next = seeded.clone();
    next.spec = json!({"size": 9});
    next.status = json!({"ready": false});
    let updated = store.update(&next).await?;
    assert_eq!(updated.status, json!({"ready": true}));
    assert_eq!(updated.spec, json!({"size": 9}));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn status_patch_merges_and_checks_version() -> Result<()> {
    let store = MemoryStore::new();
    let seeded = store
        .seed(widget("a").with_status(json!({"observed": 1})))
        .await;

    let mut patch = seeded.clone();
    patch.status = json!({"defaultPlacement": "Workers"});
    let patched = store.patch_status(&patch).await?;
    assert_eq!(
        patched.status,
        json!({"observed": 1, "defaultPlacement": "Workers"})
    );
    assert_eq!(patched.spec, seeded.spec);

    // Same (now stale) version again.
    let err = store.patch_status(&patch).await.unwrap_err();
    assert!(err.is_conflict());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn delete_missing_is_not_found() -> Result<()> {
    let store = MemoryStore::new();
    let id = ResourceIdentity::namespaced(WIDGET, "ns", "ghost");
    assert!(store.delete(&id).await.unwrap_err().is_not_found());
    assert!(store.get_opt(&id).await?.is_none());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn list_filters_kind_namespace_and_labels() -> Result<()> {
    let store = MemoryStore::new();
    store.seed(widget("a").with_label("app", "router")).await;
    store.seed(widget("b")).await;
    store
        .seed(ManagedResource::new(ResourceIdentity::namespaced(
            WIDGET, "other", "c",
        )))
        .await;
    store
        .seed(ManagedResource::new(ResourceIdentity::namespaced(
            GADGET, "ns", "g",
        )))
        .await;

    let all = store
        .list(WIDGET, None, &LabelSelector::everything())
        .await?;
    assert_eq!(all.len(), 3);

    let in_ns = store
        .list(WIDGET, Some("ns"), &LabelSelector::everything())
        .await?;
    assert_eq!(in_ns.len(), 2);

    let routers = store
        .list(WIDGET, Some("ns"), &LabelSelector::everything().with("app", "router"))
        .await?;
    assert_eq!(routers.len(), 1);
    assert_eq!(routers[0].identity.name, "a");
    Ok(())
}

#[test_log::test(tokio::test)]
async fn injected_faults_fire_once_each_and_are_counted() -> Result<()> {
    let store = MemoryStore::new();
    store.seed(widget("a")).await;
    store.inject(StoreOp::Get, StoreError::Transient("down".into()));
    let id = ResourceIdentity::namespaced(WIDGET, "ns", "a");

    assert!(matches!(
        store.get(&id).await.unwrap_err(),
        StoreError::Transient(_)
    ));
    assert!(store.get(&id).await.is_ok());
    assert_eq!(store.stats().gets, 2);
    assert_eq!(store.stats().writes(), 0);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn defaulter_runs_on_write() -> Result<()> {
    let store = MemoryStore::new().with_write_defaulter(|obj| {
        if let Some(spec) = obj.spec.as_object_mut() {
            spec.entry("tuning").or_insert(json!({}));
        }
    });
    let created = store.create(&widget("a")).await?;
    assert_eq!(created.spec, json!({"size": 1, "tuning": {}}));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cache_sync_waits_out_deadline_when_unsynced() {
    let store = MemoryStore::new();
    assert!(store.wait_for_cache_sync(Duration::from_secs(5)).await);

    store.set_cache_synced(false);
    let started = tokio::time::Instant::now();
    assert!(!store.wait_for_cache_sync(Duration::from_secs(5)).await);
    assert!(started.elapsed() >= Duration::from_secs(5));
}

#[test_log::test(tokio::test)]
async fn touch_bumps_version() -> Result<()> {
    let store = MemoryStore::new();
    let seeded = store.seed(widget("a")).await;
    let touched = store
        .touch(&seeded.identity, |obj| {
            obj.metadata.labels.insert("x".into(), "y".into());
        })
        .await
        .unwrap();
    assert_ne!(touched.resource_version, seeded.resource_version);
    Ok(())
}
