use std::fmt;

use kube::Resource;
use kube::core::{DynamicObject, GroupVersionKind};
use kube::discovery::{ApiResource, Discovery, Scope};
use tracing::{debug, warn};

use crate::error::ReconcileErr;

/// API group + kind, version-agnostic.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Group/kind from an object's `apiVersion`/`kind`.
    pub fn of(obj: &DynamicObject) -> Result<Self, ReconcileErr> {
        let types = obj.types.as_ref().ok_or_else(|| {
            ReconcileErr::Parse(format!(
                "object {} has no apiVersion/kind",
                obj.metadata.name.as_deref().unwrap_or("<unnamed>")
            ))
        })?;
        if types.kind.is_empty() {
            return Err(ReconcileErr::Parse("object has an empty kind".into()));
        }
        let (group, _) = split_api_version(&types.api_version);
        Ok(Self {
            group,
            kind: types.kind.clone(),
        })
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// "apps/v1" -> ("apps", "v1"), "v1" -> ("", "v1").
pub fn split_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceScope {
    Namespaced,
    Cluster,
}

impl From<&Scope> for ResourceScope {
    fn from(s: &Scope) -> Self {
        match s {
            Scope::Cluster => ResourceScope::Cluster,
            Scope::Namespaced => ResourceScope::Namespaced,
        }
    }
}

/// Concrete addressable resource type at one endpoint.
#[derive(Clone, Debug)]
pub struct ResourceMapping {
    pub resource: ApiResource,
    pub scope: ResourceScope,
}

impl ResourceMapping {
    pub fn namespaced<K: Resource<DynamicType = ()>>() -> Self {
        Self {
            resource: ApiResource::erase::<K>(&()),
            scope: ResourceScope::Namespaced,
        }
    }

    pub fn cluster<K: Resource<DynamicType = ()>>() -> Self {
        Self {
            resource: ApiResource::erase::<K>(&()),
            scope: ResourceScope::Cluster,
        }
    }

    pub fn from_gvk(gvk: &GroupVersionKind, scope: ResourceScope) -> Self {
        Self {
            resource: ApiResource::from_gvk(gvk),
            scope,
        }
    }

    pub fn is_namespaced(&self) -> bool {
        self.scope == ResourceScope::Namespaced
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(&self.resource.group, &self.resource.kind)
    }
}

/// Maps an abstract group/kind to the resource served by one endpoint.
pub trait KindMapper: Send + Sync {
    fn map_kind(&self, gk: &GroupKind) -> Result<ResourceMapping, ReconcileErr>;
}

/// Kind mapping backed by one run of API discovery.
pub struct DiscoveryMapper {
    discovery: Discovery,
}

impl DiscoveryMapper {
    pub fn new(discovery: Discovery) -> Self {
        Self { discovery }
    }

    pub async fn run(client: kube::Client) -> Result<Self, ReconcileErr> {
        let discovery = Discovery::new(client)
            .run()
            .await
            .map_err(|e| {
                ReconcileErr::Discovery(format!("API discovery failed: {e}"))
            })?;
        debug!(groups = discovery.groups().count(), "discovery complete");
        Ok(Self::new(discovery))
    }
}

impl KindMapper for DiscoveryMapper {
    fn map_kind(&self, gk: &GroupKind) -> Result<ResourceMapping, ReconcileErr> {
        for group in self.discovery.groups() {
            if group.name() != gk.group {
                continue;
            }
            // highest stability version for each kind
            for (ar, caps) in group.resources_by_stability() {
                if ar.kind == gk.kind {
                    return Ok(ResourceMapping {
                        resource: ar,
                        scope: ResourceScope::from(&caps.scope),
                    });
                }
            }
        }
        warn!(%gk, "kind not found in API discovery");
        Err(ReconcileErr::Discovery(format!("no resource mapping for {gk}")))
    }
}
