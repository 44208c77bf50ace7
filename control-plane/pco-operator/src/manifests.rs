//! Multi-document YAML handling for synced and on-disk manifests.

use std::path::{Path, PathBuf};

use kube::core::DynamicObject;
use tokio::fs;

use crate::error::ReconcileErr;

/// Split a `---` delimited stream into documents, dropping blank ones.
pub fn split_documents(blob: &str) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current = String::new();
    for line in blob.lines() {
        if is_separator(line) {
            push_doc(&mut docs, std::mem::take(&mut current));
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    push_doc(&mut docs, current);
    docs
}

fn is_separator(line: &str) -> bool {
    let line = line.trim_end();
    line == "---" || line.starts_with("--- ")
}

fn push_doc(docs: &mut Vec<String>, doc: String) {
    let blank = doc
        .lines()
        .all(|l| l.trim().is_empty() || l.trim_start().starts_with('#'));
    if !blank {
        docs.push(doc);
    }
}

/// Parse one document. `Ok(None)` for a document that is only `null`.
pub fn parse_manifest(doc: &str) -> Result<Option<DynamicObject>, ReconcileErr> {
    let value: serde_json::Value = serde_yaml::from_str(doc)
        .map_err(|e| ReconcileErr::Parse(format!("invalid YAML: {e}")))?;
    if value.is_null() {
        return Ok(None);
    }
    let obj: DynamicObject = serde_json::from_value(value)
        .map_err(|e| ReconcileErr::Parse(format!("not a Kubernetes object: {e}")))?;
    if obj.types.is_none() {
        return Err(ReconcileErr::Parse(format!(
            "object {} has no apiVersion/kind",
            obj.metadata.name.as_deref().unwrap_or("<unnamed>")
        )));
    }
    Ok(Some(obj))
}

/// `*.yaml` files directly inside `dir`, sorted by file name.
pub async fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>, ReconcileErr> {
    let manifest_err = |source| ReconcileErr::Manifest {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = fs::read_dir(dir).await.map_err(manifest_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(manifest_err)? {
        let path = entry.path();
        if !path.extension().is_some_and(|e| e == "yaml") {
            continue;
        }
        // follows symlinks, unlike `DirEntry::file_type`
        let is_file = fs::metadata(&path).await.is_ok_and(|m| m.is_file());
        if is_file {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read and parse every object in one manifest file. Any failure is an error.
pub async fn read_manifest_file(path: &Path) -> Result<Vec<DynamicObject>, ReconcileErr> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|source| ReconcileErr::Manifest {
            path: path.to_path_buf(),
            source,
        })?;
    let mut objects = Vec::new();
    for doc in split_documents(&raw) {
        let parsed = parse_manifest(&doc).map_err(|e| {
            ReconcileErr::Parse(format!("{}: {e}", path.display()))
        })?;
        objects.extend(parsed);
    }
    Ok(objects)
}
