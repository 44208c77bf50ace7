use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressRuleValue, Ingress, IngressRule, IngressSpec, IngressTLS,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::secrets::INGRESS_TLS_SECRET;
use crate::crd::PolicyControl;
use crate::normalize::route_path;
use crate::routing::{RouteTarget, SHARED_INGRESS_NAME};

pub fn tenant_route(pc: &PolicyControl, token: &str) -> RouteTarget {
    RouteTarget {
        host: pc.spec.cluster.ingress_host.clone(),
        path: route_path(token),
        service: token.to_string(),
        port: pc.spec.cluster.ingress_port,
    }
}

/// The shared ingress as first created, carrying only `route`.
pub fn shared_ingress(namespace: &str, route: &RouteTarget) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some(SHARED_INGRESS_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: Some(BTreeMap::from([
                (
                    "nginx.ingress.kubernetes.io/backend-protocol".to_string(),
                    "HTTPS".to_string(),
                ),
                (
                    "nginx.ingress.kubernetes.io/rewrite-target".to_string(),
                    "/$2".to_string(),
                ),
            ])),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: Some("nginx".to_string()),
            tls: Some(vec![IngressTLS {
                hosts: Some(vec![route.host.clone()]),
                secret_name: Some(INGRESS_TLS_SECRET.to_string()),
            }]),
            rules: Some(vec![IngressRule {
                host: Some(route.host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![route.http_path()],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
