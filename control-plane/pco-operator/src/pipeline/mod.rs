//! One reconciliation pass for a `PolicyControl`.
//!
//! Stages run strictly in order. A failing stage aborts the pass and leaves
//! whatever earlier stages applied in place; the next pass converges.

mod edge;
mod hub;
mod sync;

use std::fmt;
use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, info, instrument};

use crate::bridge::CommandBridge;
use crate::cluster::{ClusterApi, ClusterContext};
use crate::config::PcoConfig;
use crate::context::ContextResolver;
use crate::credential::{CredentialFile, read_secret_key};
use crate::crd::PolicyControl;
use crate::error::ReconcileErr;
use crate::kinds::DesiredResource;
use crate::normalize::normalize_workspace;
use crate::upsert::{Applied, UpsertOptions, upsert};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Sync,
    Edge,
    Hub,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Sync => "sync",
            Stage::Edge => "edge",
            Stage::Hub => "hub",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceOutcome {
    pub stage: Stage,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    pub applied: Applied,
}

/// A synced manifest document that was dropped.
#[derive(Clone, Debug)]
pub struct SkippedSegment {
    pub index: usize,
    pub reason: String,
}

#[derive(Clone, Debug, Default)]
pub struct PassReport {
    pub outcomes: Vec<ResourceOutcome>,
    pub skipped: Vec<SkippedSegment>,
}

impl PassReport {
    pub fn count(&self, applied: Applied) -> usize {
        self.outcomes.iter().filter(|o| o.applied == applied).count()
    }

    pub fn find(&self, kind: &str, name: &str) -> Option<&ResourceOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.kind == kind && o.name == name)
    }
}

/// Everything a stage needs for one pass.
pub(crate) struct PassContext<'a> {
    pub pc: &'a PolicyControl,
    pub token: String,
    pub cred: &'a CredentialFile,
    pub local: &'a ClusterContext,
    pub remote: &'a ClusterContext,
    pub bridge: &'a dyn CommandBridge,
    pub cfg: &'a PcoConfig,
    pub report: &'a mut PassReport,
}

impl PassContext<'_> {
    pub fn workspace(&self) -> &str {
        &self.pc.spec.workspace
    }

    /// Namespace of the control object, falling back to the cluster
    /// namespace it manages.
    pub fn owner_namespace(&self) -> String {
        self.pc
            .namespace()
            .unwrap_or_else(|| self.pc.spec.cluster.namespace.clone())
    }

    /// Owner links only hold within the control object's namespace.
    pub fn local_options(&self, target_namespace: &str) -> UpsertOptions {
        if self.pc.namespace().as_deref() == Some(target_namespace) {
            UpsertOptions::owned()
        } else {
            UpsertOptions::unowned()
        }
    }

    pub async fn apply(
        &mut self,
        stage: Stage,
        api: &dyn ClusterApi,
        desired: DesiredResource,
        opts: UpsertOptions,
    ) -> Result<Applied, ReconcileErr> {
        let kind = desired.kind();
        let namespace = desired.namespace();
        let name = desired.name();
        let applied = upsert(api, self.pc, desired, opts).await?;
        debug!(stage = %stage, kind = %kind, name = %name, ?applied, "resource applied");
        self.report.outcomes.push(ResourceOutcome {
            stage,
            kind,
            namespace,
            name,
            applied,
        });
        Ok(applied)
    }
}

pub struct Pipeline {
    resolver: Arc<dyn ContextResolver>,
    bridge: Arc<dyn CommandBridge>,
    cfg: PcoConfig,
}

impl Pipeline {
    pub fn new(
        resolver: Arc<dyn ContextResolver>,
        bridge: Arc<dyn CommandBridge>,
        cfg: PcoConfig,
    ) -> Self {
        Self {
            resolver,
            bridge,
            cfg,
        }
    }

    pub fn config(&self) -> &PcoConfig {
        &self.cfg
    }

    #[instrument(skip_all, fields(ns = ?pc.namespace(), name = %pc.name_any(), workspace = %pc.spec.workspace))]
    pub async fn run(&self, pc: &PolicyControl) -> Result<PassReport, ReconcileErr> {
        let cluster = &pc.spec.cluster;
        let local = self.resolver.resolve_local().await?;
        let credential = read_secret_key(
            local.api.as_ref(),
            &cluster.namespace,
            &cluster.kubeconfig_secret.name,
            &cluster.kubeconfig_secret.key,
        )
        .await?;
        let cred = CredentialFile::materialize(&credential)?;
        let remote = self.resolver.resolve_remote(&cred, &pc.spec.workspace).await?;

        let mut report = PassReport::default();
        let mut ctx = PassContext {
            pc,
            token: normalize_workspace(&pc.spec.workspace),
            cred: &cred,
            local: &local,
            remote: &remote,
            bridge: self.bridge.as_ref(),
            cfg: &self.cfg,
            report: &mut report,
        };

        sync::run(&mut ctx).await?;
        edge::run(&mut ctx).await?;
        hub::run(&mut ctx).await?;

        info!(
            created = report.count(Applied::Created),
            updated = report.count(Applied::Updated),
            skipped = report.skipped.len(),
            "pass complete"
        );
        Ok(report)
    }
}
