#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::{DynamicObject, ErrorResponse, GroupVersionKind};
use serde::Serialize;
use serde::de::DeserializeOwned;

use pco_operator::bridge::CommandBridge;
use pco_operator::cluster::{ClusterApi, ClusterContext, from_dynamic, to_dynamic};
use pco_operator::config::PcoConfig;
use pco_operator::context::ContextResolver;
use pco_operator::credential::CredentialFile;
use pco_operator::crd::{PolicyControl, PolicyControlSpec};
use pco_operator::discovery::{GroupKind, KindMapper, ResourceMapping, ResourceScope};
use pco_operator::error::ReconcileErr;

pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message: format!("fake {reason}"),
        reason: reason.into(),
        code,
    })
}

// ---------------------------------------------------------------------------
// In-memory cluster
// ---------------------------------------------------------------------------

/// group, plural, namespace, name
type Key = (String, String, String, String);

fn key(mapping: &ResourceMapping, namespace: Option<&str>, name: &str) -> Key {
    let ns = if mapping.is_namespaced() {
        namespace.unwrap_or("default").to_string()
    } else {
        String::new()
    };
    (
        mapping.resource.group.clone(),
        mapping.resource.plural.clone(),
        ns,
        name.to_string(),
    )
}

#[derive(Default)]
pub struct Store {
    objects: BTreeMap<Key, DynamicObject>,
    next_rv: u64,
    pub creates: usize,
    pub replaces: usize,
}

impl Store {
    fn bump(&mut self) -> String {
        self.next_rv += 1;
        self.next_rv.to_string()
    }

    /// Change a stored object the way another writer would.
    pub fn mutate<K>(
        &mut self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        name: &str,
        f: impl FnOnce(&mut K),
    ) where
        K: Serialize + DeserializeOwned,
    {
        let k = key(mapping, namespace, name);
        let rv = self.bump();
        let obj = self.objects.get_mut(&k).expect("object to mutate");
        let mut typed: K = from_dynamic(obj).expect("typed object");
        f(&mut typed);
        let mut updated = to_dynamic(&typed).expect("dynamic object");
        updated.metadata.resource_version = Some(rv);
        *obj = updated;
    }
}

pub type Interference = Box<dyn FnOnce(&mut Store) + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Get,
    Create,
    Replace,
}

/// Cluster API double with optimistic concurrency: a replace carrying a
/// stale resourceVersion gets a 409, one carrying none always wins.
#[derive(Default)]
pub struct FakeCluster {
    store: Mutex<Store>,
    before_replace: Mutex<VecDeque<Interference>>,
    failures: Mutex<Vec<(Verb, String, u16)>>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Run `f` against the store right before the next replace call.
    pub fn interfere_before_replace(&self, f: impl FnOnce(&mut Store) + Send + 'static) {
        self.before_replace.lock().unwrap().push_back(Box::new(f));
    }

    /// Make every `verb` call on `kind` fail with `code`.
    pub fn fail(&self, verb: Verb, kind: &str, code: u16) {
        self.failures
            .lock()
            .unwrap()
            .push((verb, kind.to_string(), code));
    }

    fn injected(&self, verb: Verb, mapping: &ResourceMapping) -> Option<kube::Error> {
        self.failures
            .lock()
            .unwrap()
            .iter()
            .find(|(v, k, _)| *v == verb && *k == mapping.resource.kind)
            .map(|(_, _, code)| api_error(*code, "Injected"))
    }

    pub fn seed<K: Serialize>(&self, mapping: &ResourceMapping, obj: &K) {
        let mut store = self.store.lock().unwrap();
        let mut dynamic = to_dynamic(obj).expect("dynamic object");
        let k = key(
            mapping,
            dynamic.metadata.namespace.as_deref(),
            dynamic.metadata.name.as_deref().unwrap_or_default(),
        );
        dynamic.metadata.resource_version = Some(store.bump());
        store.objects.insert(k, dynamic);
    }

    pub fn with_store<R>(&self, f: impl FnOnce(&mut Store) -> R) -> R {
        f(&mut *self.store.lock().unwrap())
    }

    pub fn creates(&self) -> usize {
        self.store.lock().unwrap().creates
    }

    pub fn replaces(&self) -> usize {
        self.store.lock().unwrap().replaces
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap().objects.len()
    }

    pub fn get_as<K: DeserializeOwned>(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<K> {
        let store = self.store.lock().unwrap();
        store
            .objects
            .get(&key(mapping, namespace, name))
            .map(|o| from_dynamic(o).expect("typed object"))
    }

    pub fn get_dynamic(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<DynamicObject> {
        self.store
            .lock()
            .unwrap()
            .objects
            .get(&key(mapping, namespace, name))
            .cloned()
    }

    /// Names of every stored object of `kind`.
    pub fn names_of(&self, kind: &str) -> Vec<String> {
        self.store
            .lock()
            .unwrap()
            .objects
            .values()
            .filter(|o| o.types.as_ref().is_some_and(|t| t.kind == kind))
            .filter_map(|o| o.metadata.name.clone())
            .collect()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, kube::Error> {
        if let Some(e) = self.injected(Verb::Get, mapping) {
            return Err(e);
        }
        Ok(self.get_dynamic(mapping, namespace, name))
    }

    async fn create(
        &self,
        mapping: &ResourceMapping,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error> {
        if let Some(e) = self.injected(Verb::Create, mapping) {
            return Err(e);
        }
        let mut store = self.store.lock().unwrap();
        let name = obj.metadata.name.clone().unwrap_or_default();
        let k = key(mapping, obj.metadata.namespace.as_deref(), &name);
        if store.objects.contains_key(&k) {
            return Err(api_error(409, "AlreadyExists"));
        }
        let mut stored = obj.clone();
        stored.metadata.resource_version = Some(store.bump());
        stored.metadata.uid = Some(format!("uid-{}", store.next_rv));
        store.objects.insert(k, stored.clone());
        store.creates += 1;
        Ok(stored)
    }

    async fn replace(
        &self,
        mapping: &ResourceMapping,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error> {
        if let Some(e) = self.injected(Verb::Replace, mapping) {
            return Err(e);
        }
        let interference = self.before_replace.lock().unwrap().pop_front();
        let mut store = self.store.lock().unwrap();
        if let Some(f) = interference {
            f(&mut *store);
        }
        let name = obj.metadata.name.clone().unwrap_or_default();
        let k = key(mapping, obj.metadata.namespace.as_deref(), &name);
        let current_rv = match store.objects.get(&k) {
            Some(current) => current.metadata.resource_version.clone(),
            None => return Err(api_error(404, "NotFound")),
        };
        if obj.metadata.resource_version.is_some()
            && obj.metadata.resource_version != current_rv
        {
            return Err(api_error(409, "Conflict"));
        }
        let mut stored = obj.clone();
        stored.metadata.resource_version = Some(store.bump());
        store.objects.insert(k, stored.clone());
        store.replaces += 1;
        Ok(stored)
    }
}

// ---------------------------------------------------------------------------
// Kind mapping
// ---------------------------------------------------------------------------

pub struct StaticMapper {
    mappings: HashMap<GroupKind, ResourceMapping>,
}

impl StaticMapper {
    pub fn empty() -> Self {
        Self {
            mappings: HashMap::new(),
        }
    }

    /// Built-in kinds plus the OLM, policy-engine and workspace kinds the
    /// pipeline touches.
    pub fn with_defaults() -> Self {
        let mut m = Self::empty();
        m.insert(ResourceMapping::cluster::<Namespace>());
        m.insert(ResourceMapping::namespaced::<Secret>());
        m.insert(ResourceMapping::namespaced::<ConfigMap>());
        m.insert(ResourceMapping::namespaced::<Service>());
        m.insert(ResourceMapping::namespaced::<ServiceAccount>());
        m.insert(ResourceMapping::namespaced::<Deployment>());
        m.insert(ResourceMapping::namespaced::<Ingress>());
        m.insert(ResourceMapping::cluster::<ClusterRole>());
        m.insert(ResourceMapping::cluster::<ClusterRoleBinding>());
        m.insert(ResourceMapping::cluster::<CustomResourceDefinition>());
        for (g, v, k, scope) in [
            ("operators.coreos.com", "v1", "OperatorGroup", ResourceScope::Namespaced),
            ("operators.coreos.com", "v1alpha1", "Subscription", ResourceScope::Namespaced),
            ("operator.kyverno.io", "v1alpha1", "Kyverno", ResourceScope::Namespaced),
            ("apis.kcp.io", "v1alpha1", "APIBinding", ResourceScope::Cluster),
        ] {
            m.insert(ResourceMapping::from_gvk(&GroupVersionKind::gvk(g, v, k), scope));
        }
        m
    }

    pub fn insert(&mut self, mapping: ResourceMapping) {
        self.mappings.insert(mapping.group_kind(), mapping);
    }
}

impl KindMapper for StaticMapper {
    fn map_kind(&self, gk: &GroupKind) -> Result<ResourceMapping, ReconcileErr> {
        self.mappings
            .get(gk)
            .cloned()
            .ok_or_else(|| ReconcileErr::Discovery(format!("no resource mapping for {gk}")))
    }
}

// ---------------------------------------------------------------------------
// Bridge and resolver
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeBridge {
    pub sync_blob: String,
    pub kubeconfig: String,
    pub fail_switch: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeBridge {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandBridge for FakeBridge {
    async fn switch_workspace(
        &self,
        _cred: &CredentialFile,
        workspace: &str,
    ) -> Result<(), ReconcileErr> {
        self.calls.lock().unwrap().push(format!("switch {workspace}"));
        if self.fail_switch {
            return Err(ReconcileErr::Bridge("switch failed".into()));
        }
        Ok(())
    }

    async fn sync_resources(
        &self,
        cred: &CredentialFile,
        workspace: &str,
        target: &str,
        syncer_image: &str,
    ) -> Result<String, ReconcileErr> {
        assert!(cred.path().exists(), "credential must outlive the sync call");
        self.calls
            .lock()
            .unwrap()
            .push(format!("sync {workspace} {target} {syncer_image}"));
        Ok(self.sync_blob.clone())
    }

    async fn fetch_kubeconfig(
        &self,
        cred: &CredentialFile,
        workspace: &str,
    ) -> Result<String, ReconcileErr> {
        assert!(cred.path().exists(), "credential must outlive the fetch call");
        self.calls.lock().unwrap().push(format!("kubeconfig {workspace}"));
        Ok(self.kubeconfig.clone())
    }
}

pub struct FakeResolver {
    pub local: ClusterContext,
    pub remote: ClusterContext,
    pub credentials_seen: Mutex<Vec<Vec<u8>>>,
}

impl FakeResolver {
    pub fn new(local: Arc<FakeCluster>, remote: Arc<FakeCluster>) -> Self {
        Self {
            local: ClusterContext::new(local, Arc::new(StaticMapper::with_defaults())),
            remote: ClusterContext::new(remote, Arc::new(StaticMapper::with_defaults())),
            credentials_seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ContextResolver for FakeResolver {
    async fn resolve_local(&self) -> Result<ClusterContext, ReconcileErr> {
        Ok(self.local.clone())
    }

    async fn resolve_remote(
        &self,
        cred: &CredentialFile,
        _workspace: &str,
    ) -> Result<ClusterContext, ReconcileErr> {
        let bytes = std::fs::read(cred.path())
            .map_err(|e| ReconcileErr::Credential(e.to_string()))?;
        self.credentials_seen.lock().unwrap().push(bytes);
        Ok(self.remote.clone())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub const NS: &str = "pco";
pub const HOST: &str = "pco.example.com";
pub const ADMIN_KUBECONFIG: &str = "apiVersion: v1\nkind: Config\n# kcp admin\n";
pub const WORKSPACE_KUBECONFIG: &str = "apiVersion: v1\nkind: Config\n# ws1\n";

pub fn policy_control(workspace: &str) -> PolicyControl {
    let mut spec = PolicyControlSpec {
        workspace: workspace.to_string(),
        ..Default::default()
    };
    spec.cluster.namespace = NS.into();
    spec.cluster.ingress_name = "cluster1".into();
    spec.cluster.ingress_host = HOST.into();
    spec.cluster.ingress_port = 443;
    spec.cluster.ingress_tls_secret.name = "pco-tls".into();
    spec.cluster.ingress_tls_secret.key_for_cert = "tls.crt".into();
    spec.cluster.ingress_tls_secret.key_for_priv_key = "tls.key".into();
    spec.cluster.ingress_tls_secret.key_for_ca_cert = "ca.crt".into();
    spec.cluster.kubeconfig_secret.name = "kcp-admin".into();
    spec.cluster.kubeconfig_secret.key = "admin.kubeconfig".into();
    spec.workspace_config.api_namespace = "kyverno".into();
    spec.workspace_config.image = "ghcr.io/kyverno/kyverno:latest".into();
    spec.install.install_namespace = "pco-kyverno".into();
    spec.install.operator_group.name = "kyverno-og".into();
    spec.install.subscription.name = "kyverno-sub".into();
    spec.install.subscription.olm_namespace = "olm".into();
    spec.install.kyverno_cr.name = "kyverno".into();

    let mut pc = PolicyControl::new(&format!("pc-{workspace}"), spec);
    pc.metadata.namespace = Some(NS.into());
    pc.metadata.uid = Some(format!("uid-pc-{workspace}"));
    pc.metadata.generation = Some(1);
    pc
}

fn secret(name: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(NS.into()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

/// Credential and TLS secrets the control object references.
pub fn seed_referenced_secrets(local: &FakeCluster) {
    let mapping = ResourceMapping::namespaced::<Secret>();
    local.seed(
        &mapping,
        &secret("kcp-admin", &[("admin.kubeconfig", ADMIN_KUBECONFIG)]),
    );
    local.seed(
        &mapping,
        &secret(
            "pco-tls",
            &[("tls.crt", "CERT"), ("tls.key", "KEY"), ("ca.crt", "CA")],
        ),
    );
}

pub const SYNC_BLOB: &str = "\
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: kcp-syncer-cluster1
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: kcp-syncer-cluster1
rules:
- apiGroups: [\"\"]
  resources: [\"configmaps\"]
  verbs: [\"get\", \"list\", \"watch\"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: kcp-syncer-cluster1
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: kcp-syncer-cluster1
subjects:
- kind: ServiceAccount
  name: kcp-syncer-cluster1
  namespace: pco
---

---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: kcp-syncer-cluster1
  namespace: kcp-syncer
spec:
  selector:
    matchLabels:
      app: kcp-syncer
  template:
    metadata:
      labels:
        app: kcp-syncer
    spec:
      containers:
      - name: syncer
        image: ghcr.io/kcp-dev/kcp/syncer:554c247
";

pub const MALFORMED_DOC: &str = "---\napiVersion: v1\nkind: [broken\n";

/// Workspace manifest directory plus API-bindings manifest.
pub fn write_workspace_manifests(dir: &Path) -> PcoConfig {
    let manifests = dir.join("workspace-kyverno");
    std::fs::create_dir_all(&manifests).unwrap();
    std::fs::write(
        manifests.join("10-configmap.yaml"),
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: kyverno\n  namespace: kyverno\ndata:\n  webhooks: '[]'\n",
    )
    .unwrap();
    std::fs::write(
        manifests.join("20-serviceaccount.yaml"),
        "apiVersion: v1\nkind: ServiceAccount\nmetadata:\n  name: kyverno\n  namespace: kyverno\n",
    )
    .unwrap();
    std::fs::write(manifests.join("README.md"), "not a manifest").unwrap();
    let bindings = dir.join("apibindings.yaml");
    std::fs::write(
        &bindings,
        "apiVersion: apis.kcp.io/v1alpha1\nkind: APIBinding\nmetadata:\n  name: kubernetes\nspec:\n  reference:\n    export:\n      path: root:compute\n      name: kubernetes\n",
    )
    .unwrap();

    PcoConfig {
        manifests_dir: manifests,
        apibindings_manifest: bindings,
        syncer_image: "ghcr.io/kcp-dev/kcp/syncer:554c247".into(),
        kubectl_bin: "kubectl".into(),
        http_port: 8081,
        error_requeue_secs: 30,
        resync_secs: 300,
    }
}
