use std::sync::Arc;

use async_trait::async_trait;
use kube::Client;
use kube::config::{KubeConfigOptions, Kubeconfig};
use tracing::{debug, instrument};

use crate::bridge::{CommandBridge, switch_or_warn};
use crate::cluster::{ClusterContext, KubeClusterApi};
use crate::credential::CredentialFile;
use crate::discovery::DiscoveryMapper;
use crate::error::ReconcileErr;

/// Builds the per-pass cluster contexts. Contexts are never cached across
/// passes.
#[async_trait]
pub trait ContextResolver: Send + Sync {
    /// The cluster the operator runs in.
    async fn resolve_local(&self) -> Result<ClusterContext, ReconcileErr>;

    /// The workspace reachable through `cred`, after switching it to
    /// `workspace`.
    async fn resolve_remote(
        &self,
        cred: &CredentialFile,
        workspace: &str,
    ) -> Result<ClusterContext, ReconcileErr>;
}

pub struct KubeContextResolver {
    local: Client,
    bridge: Arc<dyn CommandBridge>,
}

impl KubeContextResolver {
    pub fn new(local: Client, bridge: Arc<dyn CommandBridge>) -> Self {
        Self { local, bridge }
    }
}

#[async_trait]
impl ContextResolver for KubeContextResolver {
    async fn resolve_local(&self) -> Result<ClusterContext, ReconcileErr> {
        let mapper = DiscoveryMapper::run(self.local.clone()).await?;
        Ok(ClusterContext::new(
            Arc::new(KubeClusterApi::new(self.local.clone())),
            Arc::new(mapper),
        ))
    }

    #[instrument(skip_all, fields(workspace = %workspace))]
    async fn resolve_remote(
        &self,
        cred: &CredentialFile,
        workspace: &str,
    ) -> Result<ClusterContext, ReconcileErr> {
        switch_or_warn(self.bridge.as_ref(), cred, workspace).await;
        let client = client_from_kubeconfig(cred).await?;
        let mapper = DiscoveryMapper::run(client.clone()).await?;
        debug!("remote context ready");
        Ok(ClusterContext::new(
            Arc::new(KubeClusterApi::new(client)),
            Arc::new(mapper),
        ))
    }
}

pub async fn client_from_kubeconfig(
    cred: &CredentialFile,
) -> Result<Client, ReconcileErr> {
    let kubeconfig = Kubeconfig::read_from(cred.path()).map_err(|e| {
        ReconcileErr::Credential(format!("failed to read kubeconfig: {e}"))
    })?;
    let config =
        kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| {
                ReconcileErr::Credential(format!("failed to load kubeconfig: {e}"))
            })?;
    Client::try_from(config).map_err(|e| {
        ReconcileErr::Credential(format!("failed to create client: {e}"))
    })
}
