use std::io::Write;
use std::path::Path;

use k8s_openapi::api::core::v1::Secret;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::cluster::{ClusterApi, get_typed};
use crate::discovery::ResourceMapping;
use crate::error::ReconcileErr;

/// A kubeconfig written to an owner-only temporary file. The file is
/// removed when the value is dropped.
#[derive(Debug)]
pub struct CredentialFile {
    file: NamedTempFile,
}

impl CredentialFile {
    pub fn materialize(bytes: &[u8]) -> Result<Self, ReconcileErr> {
        let mut file = tempfile::Builder::new()
            .prefix("pco-kubeconfig-")
            .suffix(".yaml")
            .tempfile()
            .map_err(|e| {
                ReconcileErr::Credential(format!("failed to create temp file: {e}"))
            })?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|e| {
                ReconcileErr::Credential(format!("failed to write credential: {e}"))
            })?;
        debug!(path = %file.path().display(), "credential materialized");
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Bytes stored under `key` in secret `namespace/name`.
pub async fn read_secret_key(
    api: &dyn ClusterApi,
    namespace: &str,
    name: &str,
    key: &str,
) -> Result<Vec<u8>, ReconcileErr> {
    let secret: Secret = get_typed(
        api,
        &ResourceMapping::namespaced::<Secret>(),
        Some(namespace),
        name,
    )
    .await?
    .ok_or_else(|| {
        ReconcileErr::Credential(format!("secret {namespace}/{name} not found"))
    })?;
    secret_value(&secret, key).ok_or_else(|| {
        ReconcileErr::Credential(format!(
            "secret {namespace}/{name} has no key {key}"
        ))
    })
}

/// Looks in `data` first, then in `stringData`.
pub fn secret_value(secret: &Secret, key: &str) -> Option<Vec<u8>> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .map(|b| b.0.clone())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|d| d.get(key))
                .map(|s| s.as_bytes().to_vec())
        })
}
