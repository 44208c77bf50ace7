//! Desired resources and the fixed table of kinds converged as typed objects.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{ClusterRole, PolicyRule};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;

use crate::cluster::{from_dynamic, to_dynamic};
use crate::discovery::{GroupKind, ResourceMapping};
use crate::error::ReconcileErr;

/// ClusterRoles whose name contains this marker get the policy-engine rules.
pub const SYNCER_ROLE_MARKER: &str = "kcp-syncer-";

/// Kinds that are created when absent but never replaced once present.
const CREATE_ONLY_KINDS: &[(&str, &str)] = &[
    ("", "Namespace"),
    ("operators.coreos.com", "OperatorGroup"),
    ("operators.coreos.com", "Subscription"),
];

pub fn is_create_only(gk: &GroupKind) -> bool {
    CREATE_ONLY_KINDS
        .iter()
        .any(|(g, k)| *g == gk.group && *k == gk.kind)
}

/// Built-in kinds that synced manifests are converted to before upsert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypedKind {
    ConfigMap,
    Secret,
    Service,
    ClusterRole,
    ServiceAccount,
    CustomResourceDefinition,
}

/// Resource plural -> typed kind.
const TYPED_DISPATCH: &[(&str, TypedKind)] = &[
    ("configmaps", TypedKind::ConfigMap),
    ("secrets", TypedKind::Secret),
    ("services", TypedKind::Service),
    ("clusterroles", TypedKind::ClusterRole),
    ("serviceaccounts", TypedKind::ServiceAccount),
    ("customresourcedefinitions", TypedKind::CustomResourceDefinition),
];

impl TypedKind {
    pub fn for_plural(plural: &str) -> Option<Self> {
        TYPED_DISPATCH
            .iter()
            .find(|(p, _)| *p == plural)
            .map(|(_, k)| *k)
    }

    pub fn convert(
        self,
        obj: &DynamicObject,
    ) -> Result<TypedResource, ReconcileErr> {
        fn conv<K: serde::de::DeserializeOwned>(
            obj: &DynamicObject,
            kind: &str,
        ) -> Result<K, ReconcileErr> {
            from_dynamic(obj).map_err(|e| {
                ReconcileErr::Parse(format!(
                    "failed to convert {} to {kind}: {e}",
                    obj.metadata.name.as_deref().unwrap_or("<unnamed>")
                ))
            })
        }
        Ok(match self {
            TypedKind::ConfigMap => {
                TypedResource::ConfigMap(conv(obj, "ConfigMap")?)
            }
            TypedKind::Secret => TypedResource::Secret(conv(obj, "Secret")?),
            TypedKind::Service => {
                TypedResource::Service(conv(obj, "Service")?)
            }
            TypedKind::ClusterRole => {
                let mut role: ClusterRole = conv(obj, "ClusterRole")?;
                augment_syncer_role(&mut role);
                TypedResource::ClusterRole(role)
            }
            TypedKind::ServiceAccount => {
                TypedResource::ServiceAccount(conv(obj, "ServiceAccount")?)
            }
            TypedKind::CustomResourceDefinition => {
                TypedResource::CustomResourceDefinition(conv(
                    obj,
                    "CustomResourceDefinition",
                )?)
            }
        })
    }
}

/// Grants the sync agent full access to the policy engine's two kinds.
/// Roles not matching [`SYNCER_ROLE_MARKER`] are left untouched.
pub fn augment_syncer_role(role: &mut ClusterRole) {
    let matches = role
        .metadata
        .name
        .as_deref()
        .map(|n| n.contains(SYNCER_ROLE_MARKER))
        .unwrap_or(false);
    if !matches {
        return;
    }
    let rules = role.rules.get_or_insert_with(Vec::new);
    rules.push(PolicyRule {
        verbs: vec!["*".into()],
        resources: Some(vec!["policies".into()]),
        api_groups: Some(vec!["kyverno.io".into()]),
        ..Default::default()
    });
    rules.push(PolicyRule {
        verbs: vec!["*".into()],
        resources: Some(vec!["kyvernoes".into()]),
        api_groups: Some(vec!["operator.kyverno.io".into()]),
        ..Default::default()
    });
}

#[derive(Clone, Debug)]
pub enum TypedResource {
    Namespace(Namespace),
    ConfigMap(ConfigMap),
    Secret(Secret),
    Service(Service),
    ServiceAccount(ServiceAccount),
    ClusterRole(ClusterRole),
    CustomResourceDefinition(CustomResourceDefinition),
    Deployment(Deployment),
    Ingress(Ingress),
}

macro_rules! each_typed {
    ($value:expr, $r:ident => $body:expr) => {
        match $value {
            TypedResource::Namespace($r) => $body,
            TypedResource::ConfigMap($r) => $body,
            TypedResource::Secret($r) => $body,
            TypedResource::Service($r) => $body,
            TypedResource::ServiceAccount($r) => $body,
            TypedResource::ClusterRole($r) => $body,
            TypedResource::CustomResourceDefinition($r) => $body,
            TypedResource::Deployment($r) => $body,
            TypedResource::Ingress($r) => $body,
        }
    };
}

impl TypedResource {
    pub fn mapping(&self) -> ResourceMapping {
        match self {
            TypedResource::Namespace(_) => ResourceMapping::cluster::<Namespace>(),
            TypedResource::ConfigMap(_) => {
                ResourceMapping::namespaced::<ConfigMap>()
            }
            TypedResource::Secret(_) => ResourceMapping::namespaced::<Secret>(),
            TypedResource::Service(_) => {
                ResourceMapping::namespaced::<Service>()
            }
            TypedResource::ServiceAccount(_) => {
                ResourceMapping::namespaced::<ServiceAccount>()
            }
            TypedResource::ClusterRole(_) => {
                ResourceMapping::cluster::<ClusterRole>()
            }
            TypedResource::CustomResourceDefinition(_) => {
                ResourceMapping::cluster::<CustomResourceDefinition>()
            }
            TypedResource::Deployment(_) => {
                ResourceMapping::namespaced::<Deployment>()
            }
            TypedResource::Ingress(_) => {
                ResourceMapping::namespaced::<Ingress>()
            }
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        each_typed!(self, r => &r.metadata)
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        each_typed!(self, r => &mut r.metadata)
    }

    fn to_dynamic(&self) -> Result<DynamicObject, serde_json::Error> {
        each_typed!(self, r => to_dynamic(r))
    }
}

/// A resource only known through discovery.
#[derive(Clone, Debug)]
pub struct GenericResource {
    pub mapping: ResourceMapping,
    pub object: DynamicObject,
}

/// One unit of state to converge.
#[derive(Clone, Debug)]
pub enum DesiredResource {
    Typed(TypedResource),
    Generic(GenericResource),
}

impl DesiredResource {
    pub fn generic(mapping: ResourceMapping, object: DynamicObject) -> Self {
        DesiredResource::Generic(GenericResource { mapping, object })
    }

    /// Dispatch a discovered object through the typed-kind table, falling
    /// back to the generic representation.
    pub fn from_discovered(
        mapping: ResourceMapping,
        object: DynamicObject,
    ) -> Result<Self, ReconcileErr> {
        match TypedKind::for_plural(&mapping.resource.plural) {
            Some(kind) if is_builtin_group(&mapping.resource.group) => {
                Ok(DesiredResource::Typed(kind.convert(&object)?))
            }
            _ => Ok(Self::generic(mapping, object)),
        }
    }

    pub fn mapping(&self) -> ResourceMapping {
        match self {
            DesiredResource::Typed(t) => t.mapping(),
            DesiredResource::Generic(g) => g.mapping.clone(),
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            DesiredResource::Typed(t) => t.metadata(),
            DesiredResource::Generic(g) => &g.object.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            DesiredResource::Typed(t) => t.metadata_mut(),
            DesiredResource::Generic(g) => &mut g.object.metadata,
        }
    }

    pub fn kind(&self) -> String {
        self.mapping().resource.kind
    }

    pub fn name(&self) -> String {
        self.metadata().name.clone().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<String> {
        self.metadata().namespace.clone()
    }

    pub fn into_dynamic(self) -> Result<DynamicObject, ReconcileErr> {
        match self {
            DesiredResource::Typed(t) => t.to_dynamic().map_err(|e| {
                ReconcileErr::Parse(format!(
                    "failed to serialize {} {}: {e}",
                    t.mapping().resource.kind,
                    t.metadata().name.as_deref().unwrap_or_default()
                ))
            }),
            DesiredResource::Generic(g) => Ok(g.object),
        }
    }
}

impl From<TypedResource> for DesiredResource {
    fn from(t: TypedResource) -> Self {
        DesiredResource::Typed(t)
    }
}

/// The typed table only covers the core, RBAC and apiextensions groups.
fn is_builtin_group(group: &str) -> bool {
    matches!(group, "" | "rbac.authorization.k8s.io" | "apiextensions.k8s.io")
}
