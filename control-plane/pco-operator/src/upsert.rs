use kube::Resource;
use tracing::{debug, info, instrument, warn};

use crate::cluster::ClusterApi;
use crate::crd::PolicyControl;
use crate::error::{ReconcileErr, is_not_found};
use crate::kinds::{DesiredResource, is_create_only};

#[derive(Clone, Copy, Debug, Default)]
pub struct UpsertOptions {
    /// Link the object to the control object so it is garbage collected
    /// with it.
    pub set_owner: bool,
    /// Report any failed replace as [`Applied::UpdateSkipped`] instead of
    /// failing. For objects that may legitimately already differ.
    pub ignore_update_error: bool,
}

impl UpsertOptions {
    pub fn owned() -> Self {
        Self {
            set_owner: true,
            ..Default::default()
        }
    }

    pub fn unowned() -> Self {
        Self::default()
    }

    pub fn tolerate_update_errors(mut self) -> Self {
        self.ignore_update_error = true;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Created,
    Updated,
    /// Present and of a create-only kind.
    Unchanged,
    /// Replace failed and update errors were tolerated.
    UpdateSkipped,
}

/// Create the object when absent, otherwise replace it wholesale with the
/// observed resourceVersion. Create-only kinds are never replaced.
#[instrument(skip_all, fields(kind = %desired.kind(), name = %desired.name()))]
pub async fn upsert(
    api: &dyn ClusterApi,
    owner: &PolicyControl,
    mut desired: DesiredResource,
    opts: UpsertOptions,
) -> Result<Applied, ReconcileErr> {
    let mapping = desired.mapping();
    let kind = mapping.resource.kind.clone();
    let name = desired.name();
    if name.is_empty() {
        return Err(ReconcileErr::Parse(format!("{kind} without a name")));
    }

    if opts.set_owner {
        let oref = owner.controller_owner_ref(&()).ok_or_else(|| {
            ReconcileErr::Ownership(format!(
                "control object {} has no uid",
                owner.meta().name.as_deref().unwrap_or_default()
            ))
        })?;
        let meta = desired.metadata_mut();
        let refs = meta.owner_references.get_or_insert_with(Vec::new);
        refs.retain(|r| r.uid != oref.uid);
        refs.push(oref);
    }

    let namespace = desired.namespace();
    let observed = match api.get(&mapping, namespace.as_deref(), &name).await {
        Ok(found) => found,
        Err(e) if is_not_found(&e) => None,
        Err(source) => return Err(ReconcileErr::Read { kind, name, source }),
    };

    let Some(observed) = observed else {
        let obj = desired.into_dynamic()?;
        api.create(&mapping, &obj)
            .await
            .map_err(|source| ReconcileErr::CreateFailed {
                kind: kind.clone(),
                name: name.clone(),
                source,
            })?;
        info!("created");
        return Ok(Applied::Created);
    };

    if is_create_only(&mapping.group_kind()) {
        debug!("already present, not replacing");
        return Ok(Applied::Unchanged);
    }

    let mut obj = desired.into_dynamic()?;
    obj.metadata.resource_version = observed.metadata.resource_version;
    match api.replace(&mapping, &obj).await {
        Ok(_) => {
            debug!("updated");
            Ok(Applied::Updated)
        }
        Err(e) if opts.ignore_update_error => {
            warn!(error = %e, "update failure ignored");
            Ok(Applied::UpdateSkipped)
        }
        Err(source) => Err(ReconcileErr::UpdateFailed { kind, name, source }),
    }
}
