use std::path::PathBuf;
use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct PcoConfig {
    /// Directory whose `*.yaml` files install the engine's API prerequisites
    /// in the workspace.
    /// Env: WORKSPACE_KYVERNO_INSTALL_MANIFESTS_DIR
    #[envconfig(
        from = "WORKSPACE_KYVERNO_INSTALL_MANIFESTS_DIR",
        default = "/etc/pco/workspace-kyverno"
    )]
    pub manifests_dir: PathBuf,

    #[envconfig(
        from = "WORKSPACE_APIBINDINGS_MANIFEST",
        default = "/etc/pco/apibindings.yaml"
    )]
    pub apibindings_manifest: PathBuf,

    #[envconfig(
        from = "SYNCER_IMAGE",
        default = "ghcr.io/kcp-dev/kcp/syncer:554c247"
    )]
    pub syncer_image: String,

    /// kubectl binary with the kcp plugin installed.
    #[envconfig(from = "PCO_KUBECTL_BIN", default = "kubectl")]
    pub kubectl_bin: String,

    #[envconfig(from = "HTTP_PORT", default = "8081")]
    pub http_port: u16,

    #[envconfig(from = "PCO_ERROR_REQUEUE_SECS", default = "30")]
    pub error_requeue_secs: u64,

    /// Periodic resync after a successful pass.
    #[envconfig(from = "PCO_RESYNC_SECS", default = "300")]
    pub resync_secs: u64,
}

impl PcoConfig {
    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }

    pub fn resync(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }
}
