//! Resource families the operator reads or drives, and their well-known
//! object names.

use ingop_store::{ResourceIdentity, ResourceKind};

pub const INGRESS_CONTROLLER: ResourceKind = ResourceKind {
    group: "operator.openshift.io",
    version: "v1",
    kind: "IngressController",
    plural: "ingresscontrollers",
    namespaced: true,
    spec_field: "spec",
};

/// Cluster-scoped ingress configuration (`Ingress/cluster`).
pub const INGRESS_CONFIG: ResourceKind = ResourceKind {
    group: "config.openshift.io",
    version: "v1",
    kind: "Ingress",
    plural: "ingresses",
    namespaced: false,
    spec_field: "spec",
};

pub const INFRASTRUCTURE: ResourceKind = ResourceKind {
    group: "config.openshift.io",
    version: "v1",
    kind: "Infrastructure",
    plural: "infrastructures",
    namespaced: false,
    spec_field: "spec",
};

pub const NODE: ResourceKind = ResourceKind {
    group: "",
    version: "v1",
    kind: "Node",
    plural: "nodes",
    namespaced: false,
    spec_field: "spec",
};

pub const CONFIG_MAP: ResourceKind = ResourceKind {
    group: "",
    version: "v1",
    kind: "ConfigMap",
    plural: "configmaps",
    namespaced: true,
    spec_field: "data",
};

pub const SUBSCRIPTION: ResourceKind = ResourceKind {
    group: "operators.coreos.com",
    version: "v1alpha1",
    kind: "Subscription",
    plural: "subscriptions",
    namespaced: true,
    spec_field: "spec",
};

pub const INSTALL_PLAN: ResourceKind = ResourceKind {
    group: "operators.coreos.com",
    version: "v1alpha1",
    kind: "InstallPlan",
    plural: "installplans",
    namespaced: true,
    spec_field: "spec",
};

pub const CLUSTER_CONFIG_NAME: &str = "cluster";
pub const DEFAULT_INGRESS_CONTROLLER_NAME: &str = "default";
pub const TRUSTED_CA_CONFIG_MAP_NAME: &str = "trusted-ca";
pub const SERVICE_MESH_NAMESPACE: &str = "openshift-operators";
pub const SERVICE_MESH_SUBSCRIPTION_NAME: &str = "servicemeshoperator";

pub fn ingress_config() -> ResourceIdentity {
    ResourceIdentity::cluster(INGRESS_CONFIG, CLUSTER_CONFIG_NAME)
}

pub fn infrastructure() -> ResourceIdentity {
    ResourceIdentity::cluster(INFRASTRUCTURE, CLUSTER_CONFIG_NAME)
}

pub fn default_ingress_controller(namespace: &str) -> ResourceIdentity {
    ResourceIdentity::namespaced(
        INGRESS_CONTROLLER,
        namespace,
        DEFAULT_INGRESS_CONTROLLER_NAME,
    )
}

pub fn trusted_ca_config_map(namespace: &str) -> ResourceIdentity {
    ResourceIdentity::namespaced(CONFIG_MAP, namespace, TRUSTED_CA_CONFIG_MAP_NAME)
}

pub fn service_mesh_subscription() -> ResourceIdentity {
    ResourceIdentity::namespaced(
        SUBSCRIPTION,
        SERVICE_MESH_NAMESPACE,
        SERVICE_MESH_SUBSCRIPTION_NAME,
    )
}
