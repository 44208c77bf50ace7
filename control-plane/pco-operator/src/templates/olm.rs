//! Operator Lifecycle Manager objects installing the policy engine in the
//! workspace. These kinds are not part of k8s-openapi and are built as
//! dynamic objects; the pipeline resolves their mapping through discovery.

use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use serde_json::json;

use crate::crd::PolicyControl;

fn gvk(group: &str, version: &str, kind: &str) -> GroupVersionKind {
    GroupVersionKind::gvk(group, version, kind)
}

fn object(gvk: GroupVersionKind, name: &str, namespace: &str, data: serde_json::Value) -> DynamicObject {
    DynamicObject::new(name, &ApiResource::from_gvk(&gvk))
        .within(namespace)
        .data(data)
}

pub fn operator_group(pc: &PolicyControl) -> DynamicObject {
    let install = &pc.spec.install;
    object(
        gvk("operators.coreos.com", "v1", "OperatorGroup"),
        &install.operator_group.name,
        &install.install_namespace,
        json!({
            "spec": {"targetNamespaces": [install.install_namespace]}
        }),
    )
}

pub fn subscription(pc: &PolicyControl) -> DynamicObject {
    let install = &pc.spec.install;
    object(
        gvk("operators.coreos.com", "v1alpha1", "Subscription"),
        &install.subscription.name,
        &install.install_namespace,
        json!({
            "spec": {
                "name": "kyverno-operator",
                "channel": "alpha",
                "installPlanApproval": "Automatic",
                "source": "kyverno-operator",
                "sourceNamespace": install.subscription.olm_namespace,
            }
        }),
    )
}

/// The engine instance reconciled by the installed operator.
pub fn kyverno_cr(pc: &PolicyControl) -> DynamicObject {
    let install = &pc.spec.install;
    object(
        gvk("operator.kyverno.io", "v1alpha1", "Kyverno"),
        &install.kyverno_cr.name,
        &install.install_namespace,
        json!({"spec": {}}),
    )
}
