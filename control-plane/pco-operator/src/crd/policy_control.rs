use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(
    CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default,
)]
#[kube(
    group = "ibm.github.com",
    version = "v1alpha1",
    kind = "PolicyControl",
    plural = "policycontrols",
    namespaced,
    status = "PolicyControlStatus"
)]
pub struct PolicyControlSpec {
    /// Identifier of the remote workspace to converge (e.g. "root:org:ws1").
    #[serde(default)]
    pub workspace: String,
    /// Where the credential/TLS secrets live and where the ingress, workload
    /// and service for this tenant are deployed.
    #[serde(rename = "policy_control_cluster", default)]
    pub cluster: ClusterConfig,
    #[serde(rename = "kyverno_in_workspace", default)]
    pub workspace_config: WorkspaceConfig,
    #[serde(rename = "kyverno_in_cluster", default)]
    pub install: InstallConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct ClusterConfig {
    #[serde(default)]
    pub namespace: String,
    /// Also used as the sync target name handed to the command bridge.
    #[serde(rename = "ingressName", default)]
    pub ingress_name: String,
    #[serde(rename = "ingressHost", default)]
    pub ingress_host: String,
    #[serde(rename = "ingressPort", default)]
    pub ingress_port: i32,
    #[serde(rename = "ingressTLSSecret", default)]
    pub ingress_tls_secret: TlsSecretRef,
    #[serde(rename = "kcpKubeConfigSecret", default)]
    pub kubeconfig_secret: SecretKeyRef,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct SecretKeyRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct TlsSecretRef {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "keyForCert", default)]
    pub key_for_cert: String,
    #[serde(rename = "keyForPrivKey", default)]
    pub key_for_priv_key: String,
    #[serde(rename = "keyForCacert", default)]
    pub key_for_ca_cert: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct WorkspaceConfig {
    /// Namespace inside the workspace that receives the API prerequisites
    /// (manifests, API bindings, TLS material) of the standalone engine.
    #[serde(rename = "namespaceForAPIResources", default)]
    pub api_namespace: String,
    #[serde(rename = "kyvernoImage", default)]
    pub image: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct InstallConfig {
    #[serde(rename = "installNamespace", default)]
    pub install_namespace: String,
    #[serde(rename = "operatorGroup", default)]
    pub operator_group: NamedRef,
    #[serde(default)]
    pub subscription: SubscriptionRef,
    #[serde(rename = "kyvernoCR", default)]
    pub kyverno_cr: NamedRef,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct NamedRef {
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct SubscriptionRef {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "olmNamespace", default)]
    pub olm_namespace: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub struct PolicyControlStatus {
    #[serde(
        rename = "observedGeneration",
        skip_serializing_if = "Option::is_none"
    )]
    pub observed_generation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(
        rename = "lastTransitionTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_transition_time: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionType {
    Available,
    Degraded,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}
