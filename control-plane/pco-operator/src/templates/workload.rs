use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec,
    SecretVolumeSource, Service, ServicePort, ServiceSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, ObjectMeta,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::tenant_labels;
use crate::crd::PolicyControl;

pub const ENGINE_PORT: i32 = 9443;
pub const ENGINE_SERVICE_ENV: &str = "kyverno-svc-remote";

const CREDENTIALS_VOLUME: &str = "kyverno-runtime-credentials";
const CREDENTIALS_MOUNT: &str = "/tmp/kyverno-runtime-credentials";

/// Standalone policy engine for one tenant, reading the workspace through the
/// kubeconfig secret named after `token`.
pub fn deployment(pc: &PolicyControl, token: &str) -> Deployment {
    let cluster = &pc.spec.cluster;
    let labels = Some(tenant_labels(token));
    let advertised = format!(
        "{}:{}/{}",
        cluster.ingress_host, cluster.ingress_port, token
    );

    let container = Container {
        name: "kyverno".to_string(),
        image: Some(pc.spec.workspace_config.image.clone()),
        args: Some(vec![
            "-v=4".to_string(),
            format!(
                "--kubeconfig={CREDENTIALS_MOUNT}/{}",
                super::secrets::KUBECONFIG_KEY
            ),
            format!("--serverIP={advertised}"),
        ]),
        env: Some(vec![EnvVar {
            name: "KYVERNO_SVC".to_string(),
            value: Some(ENGINE_SERVICE_ENV.to_string()),
            ..Default::default()
        }]),
        ports: Some(vec![ContainerPort {
            name: Some("http".to_string()),
            protocol: Some("TCP".to_string()),
            container_port: ENGINE_PORT,
            ..Default::default()
        }]),
        volume_mounts: Some(vec![VolumeMount {
            name: CREDENTIALS_VOLUME.to_string(),
            mount_path: CREDENTIALS_MOUNT.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(token.to_string()),
            namespace: Some(cluster.namespace.clone()),
            labels: labels.clone(),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: labels.clone(),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels,
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![Volume {
                        name: CREDENTIALS_VOLUME.to_string(),
                        secret: Some(SecretVolumeSource {
                            secret_name: Some(token.to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn service(pc: &PolicyControl, token: &str) -> Service {
    let cluster = &pc.spec.cluster;
    Service {
        metadata: ObjectMeta {
            name: Some(token.to_string()),
            namespace: Some(cluster.namespace.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(tenant_labels(token)),
            ports: Some(vec![ServicePort {
                protocol: Some("TCP".to_string()),
                port: cluster.ingress_port,
                target_port: Some(IntOrString::Int(ENGINE_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
