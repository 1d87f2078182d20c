//! Kubernetes-backed [`ObjectStore`] over `Api<DynamicObject>`.
//!
//! Reads go straight to the API server: there is no informer cache, so a
//! read issued after a write observes at least that write.

use async_trait::async_trait;
use kube::api::{
    Api, DeleteParams, ListParams, Patch, PatchParams, PostParams,
};
use kube::core::{DynamicObject, GroupVersionKind, TypeMeta};
use kube::discovery::ApiResource;
use kube::Client;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::StoreError;
use crate::resource::{
    LabelSelector, ManagedResource, ObjectMetadata, ResourceIdentity,
    ResourceKind,
};
use crate::traits::{ObjectStore, StoreResult};

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: &ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = api_resource(kind);
        match namespace {
            Some(ns) if kind.namespaced => {
                Api::namespaced_with(self.client.clone(), ns, &ar)
            }
            _ => Api::all_with(self.client.clone(), &ar),
        }
    }

    fn api_for(&self, id: &ResourceIdentity) -> Api<DynamicObject> {
        self.api(&id.kind, id.namespace.as_deref())
    }
}

fn api_resource(kind: &ResourceKind) -> ApiResource {
    let gvk = GroupVersionKind::gvk(kind.group, kind.version, kind.kind);
    ApiResource::from_gvk_with_plural(&gvk, kind.plural)
}

/// Classify an API error. 409 means `AlreadyExists` on create and
/// `Conflict` on a version-guarded write; the status reason tells them apart.
fn classify(err: kube::Error, what: &str) -> StoreError {
    match err {
        kube::Error::Api(ae) => match ae.code {
            404 => StoreError::NotFound(what.to_string()),
            409 if ae.reason == "AlreadyExists" => {
                StoreError::AlreadyExists(what.to_string())
            }
            409 => StoreError::Conflict(format!("{what}: {}", ae.message)),
            400 | 422 => StoreError::Invalid(format!("{what}: {}", ae.message)),
            _ => StoreError::Transient(format!("{what}: {}", ae.message)),
        },
        kube::Error::SerdeError(e) => StoreError::Serialization(e.to_string()),
        other => StoreError::Transient(format!("{what}: {other}")),
    }
}

fn non_empty(map: &BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    if map.is_empty() { None } else { Some(map.clone()) }
}

fn from_dynamic(
    kind: ResourceKind,
    obj: DynamicObject,
) -> StoreResult<ManagedResource> {
    let body = obj.data.as_object();
    let spec = body
        .and_then(|b| b.get(kind.spec_field))
        .cloned()
        .unwrap_or(Value::Null);
    let status = body
        .and_then(|b| b.get("status"))
        .cloned()
        .unwrap_or(Value::Null);
    let identity = ResourceIdentity {
        kind,
        namespace: obj.metadata.namespace.clone(),
        name: obj.metadata.name.clone().unwrap_or_default(),
    };
    let metadata = ObjectMetadata {
        labels: obj.metadata.labels.clone().unwrap_or_default(),
        annotations: obj.metadata.annotations.clone().unwrap_or_default(),
    };
    let resource_version = obj.metadata.resource_version.clone();
    let passthrough = serde_json::to_value(&obj)?;
    Ok(ManagedResource {
        identity,
        metadata,
        spec,
        status,
        resource_version,
        passthrough,
    })
}

fn to_dynamic(res: &ManagedResource) -> StoreResult<DynamicObject> {
    let kind = &res.identity.kind;
    let ar = api_resource(kind);
    let mut obj = match &res.passthrough {
        Value::Object(_) => {
            serde_json::from_value::<DynamicObject>(res.passthrough.clone())?
        }
        _ => DynamicObject::new(&res.identity.name, &ar),
    };
    obj.types = Some(TypeMeta {
        api_version: ar.api_version.clone(),
        kind: ar.kind.clone(),
    });
    obj.metadata.name = Some(res.identity.name.clone());
    obj.metadata.namespace = res.identity.namespace.clone();
    obj.metadata.labels = non_empty(&res.metadata.labels);
    obj.metadata.annotations = non_empty(&res.metadata.annotations);
    obj.metadata.resource_version = res.resource_version.clone();
    if !obj.data.is_object() {
        obj.data = Value::Object(Map::new());
    }
    if let Value::Object(body) = &mut obj.data {
        for (field, value) in [(kind.spec_field, &res.spec), ("status", &res.status)] {
            if value.is_null() {
                body.remove(field);
            } else {
                body.insert(field.to_string(), value.clone());
            }
        }
    }
    Ok(obj)
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, id: &ResourceIdentity) -> StoreResult<ManagedResource> {
        trace!(%id, "kube store: get");
        let obj = self
            .api_for(id)
            .get(&id.name)
            .await
            .map_err(|e| classify(e, &id.to_string()))?;
        from_dynamic(id.kind, obj)
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> StoreResult<Vec<ManagedResource>> {
        let mut lp = ListParams::default();
        if !selector.is_empty() {
            lp = lp.labels(&selector.to_string());
        }
        let list = self
            .api(&kind, namespace)
            .list(&lp)
            .await
            .map_err(|e| classify(e, kind.plural))?;
        list.items
            .into_iter()
            .map(|obj| from_dynamic(kind, obj))
            .collect()
    }

    async fn create(
        &self,
        obj: &ManagedResource,
    ) -> StoreResult<ManagedResource> {
        let id = &obj.identity;
        let mut body = to_dynamic(obj)?;
        body.metadata.resource_version = None;
        let created = self
            .api_for(id)
            .create(&PostParams::default(), &body)
            .await
            .map_err(|e| classify(e, &id.to_string()))?;
        from_dynamic(id.kind, created)
    }

    async fn update(
        &self,
        obj: &ManagedResource,
    ) -> StoreResult<ManagedResource> {
        let id = &obj.identity;
        if obj.resource_version.is_none() {
            return Err(StoreError::Invalid(format!(
                "{id}: update requires a resource version"
            )));
        }
        let body = to_dynamic(obj)?;
        let updated = self
            .api_for(id)
            .replace(&id.name, &PostParams::default(), &body)
            .await
            .map_err(|e| classify(e, &id.to_string()))?;
        from_dynamic(id.kind, updated)
    }

    async fn patch_status(
        &self,
        obj: &ManagedResource,
    ) -> StoreResult<ManagedResource> {
        let id = &obj.identity;
        // A resourceVersion inside a merge patch makes the API server
        // reject the patch with 409 when the object has moved on.
        let patch = match &obj.resource_version {
            Some(rv) => json!({
                "metadata": { "resourceVersion": rv },
                "status": obj.status,
            }),
            None => json!({ "status": obj.status }),
        };
        let patched = self
            .api_for(id)
            .patch_status(&id.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| classify(e, &id.to_string()))?;
        from_dynamic(id.kind, patched)
    }

    async fn delete(&self, id: &ResourceIdentity) -> StoreResult<()> {
        self.api_for(id)
            .delete(&id.name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| classify(e, &id.to_string()))
    }

    async fn wait_for_cache_sync(&self, deadline: Duration) -> bool {
        // Nothing is cached; readiness means the API server answers.
        match tokio::time::timeout(deadline, self.client.apiserver_version()).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(error = %e, "kube store: api server not ready");
                false
            }
            Err(_) => false,
        }
    }
}
