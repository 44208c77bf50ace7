use std::sync::Arc;

use async_trait::async_trait;
use kube::Client;
use kube::api::{Api, PostParams};
use kube::core::DynamicObject;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::discovery::{KindMapper, ResourceMapping, ResourceScope};
use crate::error::{ReconcileErr, is_not_found};

/// The get/create/replace verbs the engine needs from a cluster endpoint.
///
/// Objects are exchanged as [`DynamicObject`]s addressed by a
/// [`ResourceMapping`]; typed resources are converted at the edges.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// `Ok(None)` when the object does not exist.
    async fn get(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, kube::Error>;

    async fn create(
        &self,
        mapping: &ResourceMapping,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error>;

    /// Wholesale replace. A `resourceVersion` on `obj` makes the call
    /// conditional on it.
    async fn replace(
        &self,
        mapping: &ResourceMapping,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error>;
}

/// One addressable endpoint for one pass: the verbs plus its kind mapping.
#[derive(Clone)]
pub struct ClusterContext {
    pub api: Arc<dyn ClusterApi>,
    pub mapper: Arc<dyn KindMapper>,
}

impl ClusterContext {
    pub fn new(api: Arc<dyn ClusterApi>, mapper: Arc<dyn KindMapper>) -> Self {
        Self { api, mapper }
    }
}

#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
    ) -> Api<DynamicObject> {
        match (mapping.scope, namespace) {
            (ResourceScope::Cluster, _) => {
                Api::all_with(self.client.clone(), &mapping.resource)
            }
            (ResourceScope::Namespaced, Some(ns)) => {
                Api::namespaced_with(self.client.clone(), ns, &mapping.resource)
            }
            (ResourceScope::Namespaced, None) => {
                Api::default_namespaced_with(
                    self.client.clone(),
                    &mapping.resource,
                )
            }
        }
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, kube::Error> {
        self.api(mapping, namespace).get_opt(name).await
    }

    async fn create(
        &self,
        mapping: &ResourceMapping,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error> {
        self.api(mapping, obj.metadata.namespace.as_deref())
            .create(&PostParams::default(), obj)
            .await
    }

    async fn replace(
        &self,
        mapping: &ResourceMapping,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        self.api(mapping, obj.metadata.namespace.as_deref())
            .replace(&name, &PostParams::default(), obj)
            .await
    }
}

pub fn to_dynamic<K: Serialize>(
    obj: &K,
) -> Result<DynamicObject, serde_json::Error> {
    serde_json::from_value(serde_json::to_value(obj)?)
}

pub fn from_dynamic<K: DeserializeOwned>(
    obj: &DynamicObject,
) -> Result<K, serde_json::Error> {
    serde_json::from_value(serde_json::to_value(obj)?)
}

/// Read a typed object, `Ok(None)` when absent.
pub async fn get_typed<K>(
    api: &dyn ClusterApi,
    mapping: &ResourceMapping,
    namespace: Option<&str>,
    name: &str,
) -> Result<Option<K>, ReconcileErr>
where
    K: DeserializeOwned,
{
    let found = match api.get(mapping, namespace, name).await {
        Ok(found) => found,
        Err(e) if is_not_found(&e) => None,
        Err(source) => {
            return Err(ReconcileErr::Read {
                kind: mapping.resource.kind.clone(),
                name: name.to_string(),
                source,
            });
        }
    };
    found
        .map(|obj| {
            from_dynamic::<K>(&obj).map_err(|e| {
                ReconcileErr::Parse(format!(
                    "{} {name} does not match its schema: {e}",
                    mapping.resource.kind
                ))
            })
        })
        .transpose()
}
