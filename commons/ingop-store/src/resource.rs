use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::StoreError;

/// Static descriptor of a resource family served by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKind {
    /// API group; empty for the core group.
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
    pub plural: &'static str,
    pub namespaced: bool,
    /// Top-level body field holding desired intent (`spec`, or `data` for
    /// config maps).
    pub spec_field: &'static str,
}

impl ResourceKind {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.to_string()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// Stable key of a managed object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceIdentity {
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceIdentity {
    pub fn cluster(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.into(),
        }
    }

    pub fn namespaced(
        kind: ResourceKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind.kind, self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectMetadata {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

/// An object as persisted by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedResource {
    pub identity: ResourceIdentity,
    pub metadata: ObjectMetadata,
    pub spec: Value,
    pub status: Value,
    /// Opaque concurrency token assigned by the store; required for updates.
    pub resource_version: Option<String>,
    /// Store-owned fields this model does not interpret (owner references,
    /// finalizers, other body fields). Carried through writes unchanged.
    pub passthrough: Value,
}

impl ManagedResource {
    pub fn new(identity: ResourceIdentity) -> Self {
        Self {
            identity,
            metadata: ObjectMetadata::default(),
            spec: Value::Null,
            status: Value::Null,
            resource_version: None,
            passthrough: Value::Null,
        }
    }

    pub fn with_spec(mut self, spec: Value) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_status(mut self, status: Value) -> Self {
        self.status = status;
        self
    }

    pub fn with_label(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata.annotations.insert(key.into(), value.into());
        self
    }

    /// Decode the spec body into a typed view; an unset spec decodes to the
    /// view's default.
    pub fn decode_spec<T: DeserializeOwned + Default>(
        &self,
    ) -> Result<T, StoreError> {
        decode_or_default(&self.spec)
    }

    pub fn decode_status<T: DeserializeOwned + Default>(
        &self,
    ) -> Result<T, StoreError> {
        decode_or_default(&self.status)
    }
}

fn decode_or_default<T: DeserializeOwned + Default>(
    v: &Value,
) -> Result<T, StoreError> {
    if v.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(v.clone())?)
}

/// Desired shape of an object, recomputed on every reconcile. Carries no
/// concurrency token and no status.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredState {
    pub identity: ResourceIdentity,
    pub metadata: ObjectMetadata,
    pub spec: Value,
}

impl DesiredState {
    pub fn new(identity: ResourceIdentity) -> Self {
        Self {
            identity,
            metadata: ObjectMetadata::default(),
            spec: Value::Null,
        }
    }

    pub fn with_spec(mut self, spec: Value) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_label(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata.annotations.insert(key.into(), value.into());
        self
    }

    pub fn into_resource(self) -> ManagedResource {
        ManagedResource {
            identity: self.identity,
            metadata: self.metadata,
            spec: self.spec,
            status: Value::Null,
            resource_version: None,
            passthrough: Value::Null,
        }
    }
}

/// Equality-based label selector (`k1=v1,k2=v2`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelSelector(BTreeMap<String, String>);

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|(k, v)| labels.get(k) == Some(v))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> =
            self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}", parts.join(","))
    }
}
