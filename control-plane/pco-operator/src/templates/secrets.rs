use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

pub const KUBECONFIG_KEY: &str = "target-kubeconfig.yaml";
pub const INGRESS_TLS_SECRET: &str = "kyverno-ingress";
pub const ENGINE_TLS_PAIR_SECRET: &str =
    "kyverno-svc-remote.kyverno.svc.kyverno-tls-pair";
pub const ENGINE_TLS_CA_SECRET: &str =
    "kyverno-svc-remote.kyverno.svc.kyverno-tls-ca";

/// Cert, key and CA read from the control object's TLS secret.
#[derive(Clone, Debug)]
pub struct TlsMaterial {
    pub cert: String,
    pub key: String,
    pub ca_cert: String,
}

fn string_secret(
    name: &str,
    namespace: &str,
    type_: &str,
    data: BTreeMap<String, String>,
) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        type_: Some(type_.to_string()),
        string_data: Some(data),
        ..Default::default()
    }
}

fn tls_pair(tls: &TlsMaterial) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("tls.key".to_string(), tls.key.clone()),
        ("tls.crt".to_string(), tls.cert.clone()),
    ])
}

/// Workspace kubeconfig mounted by the tenant's engine.
pub fn kubeconfig_secret(namespace: &str, token: &str, kubeconfig: &str) -> Secret {
    string_secret(
        token,
        namespace,
        "Opaque",
        BTreeMap::from([(KUBECONFIG_KEY.to_string(), kubeconfig.to_string())]),
    )
}

pub fn ingress_tls_secret(namespace: &str, tls: &TlsMaterial) -> Secret {
    string_secret(
        INGRESS_TLS_SECRET,
        namespace,
        "kubernetes.io/tls",
        tls_pair(tls),
    )
}

pub fn engine_tls_pair_secret(api_namespace: &str, tls: &TlsMaterial) -> Secret {
    string_secret(
        ENGINE_TLS_PAIR_SECRET,
        api_namespace,
        "kubernetes.io/tls",
        tls_pair(tls),
    )
}

pub fn engine_tls_ca_secret(api_namespace: &str, tls: &TlsMaterial) -> Secret {
    string_secret(
        ENGINE_TLS_CA_SECRET,
        api_namespace,
        "Opaque",
        BTreeMap::from([("rootCA.crt".to_string(), tls.ca_cert.clone())]),
    )
}
