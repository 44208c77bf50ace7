//! Desired-state producers. Pure functions of the control object and the
//! tenant token; nothing here talks to a cluster.

pub mod ingress;
pub mod olm;
pub mod secrets;
pub mod workload;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

pub use ingress::{shared_ingress, tenant_route};
pub use olm::{kyverno_cr, operator_group, subscription};
pub use secrets::*;
pub use workload::{deployment, service};

pub const APP_LABEL: &str = "kyverno-controller";

/// Selector labels shared by a tenant's workload and service.
pub fn tenant_labels(token: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), APP_LABEL.to_string()),
        ("workspace".to_string(), token.to_string()),
    ])
}

pub fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}
