use std::ffi::OsStr;
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::credential::CredentialFile;
use crate::error::ReconcileErr;

/// Workspace operations only available through the external CLI.
///
/// Each call runs against the kubeconfig in `cred` and switches it to
/// `workspace` first.
#[async_trait]
pub trait CommandBridge: Send + Sync {
    /// Point the credential's current context at `workspace`.
    async fn switch_workspace(
        &self,
        cred: &CredentialFile,
        workspace: &str,
    ) -> Result<(), ReconcileErr>;

    /// Multi-document manifest set that installs the sync agent for
    /// `target` on the physical cluster.
    async fn sync_resources(
        &self,
        cred: &CredentialFile,
        workspace: &str,
        target: &str,
        syncer_image: &str,
    ) -> Result<String, ReconcileErr>;

    /// Self-contained kubeconfig for `workspace`.
    async fn fetch_kubeconfig(
        &self,
        cred: &CredentialFile,
        workspace: &str,
    ) -> Result<String, ReconcileErr>;
}

/// Runs `kubectl` with the kcp plugin.
#[derive(Clone, Debug)]
pub struct KubectlKcpBridge {
    kubectl: String,
}

impl KubectlKcpBridge {
    pub fn new(kubectl: impl Into<String>) -> Self {
        Self {
            kubectl: kubectl.into(),
        }
    }

    async fn run<I, S>(&self, kubeconfig: &Path, args: I) -> Result<String, ReconcileErr>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args
            .into_iter()
            .map(|a| a.as_ref().to_os_string())
            .collect();
        debug!(bin = %self.kubectl, ?args, "running command");
        let output = Command::new(&self.kubectl)
            .args(&args)
            .env("KUBECONFIG", kubeconfig)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ReconcileErr::Bridge(format!("failed to spawn {}: {e}", self.kubectl))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReconcileErr::Bridge(format!(
                "{} {:?} exited with {}: {}",
                self.kubectl,
                args,
                output.status,
                stderr.trim()
            )));
        }
        String::from_utf8(output.stdout).map_err(|e| {
            ReconcileErr::Bridge(format!("command output is not UTF-8: {e}"))
        })
    }
}

impl Default for KubectlKcpBridge {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

#[async_trait]
impl CommandBridge for KubectlKcpBridge {
    #[instrument(skip_all, fields(workspace = %workspace))]
    async fn switch_workspace(
        &self,
        cred: &CredentialFile,
        workspace: &str,
    ) -> Result<(), ReconcileErr> {
        let out = self.run(cred.path(), ["kcp", "ws", "use", workspace]).await?;
        debug!(output = %out.trim(), "workspace switched");
        Ok(())
    }

    #[instrument(skip_all, fields(workspace = %workspace, target = %target))]
    async fn sync_resources(
        &self,
        cred: &CredentialFile,
        workspace: &str,
        target: &str,
        syncer_image: &str,
    ) -> Result<String, ReconcileErr> {
        switch_or_warn(self, cred, workspace).await;
        self.run(
            cred.path(),
            [
                "kcp",
                "workload",
                "sync",
                target,
                "--syncer-image",
                syncer_image,
                "-o",
                "-",
                "--resources=kyvernoes,policies",
            ],
        )
        .await
    }

    #[instrument(skip_all, fields(workspace = %workspace))]
    async fn fetch_kubeconfig(
        &self,
        cred: &CredentialFile,
        workspace: &str,
    ) -> Result<String, ReconcileErr> {
        switch_or_warn(self, cred, workspace).await;
        self.run(cred.path(), ["config", "view", "--minify", "--raw"])
            .await
    }
}

/// A failed switch leaves the credential on its current workspace; callers
/// carry on.
pub async fn switch_or_warn(
    bridge: &dyn CommandBridge,
    cred: &CredentialFile,
    workspace: &str,
) {
    if let Err(e) = bridge.switch_workspace(cred, workspace).await {
        warn!(workspace, error = %e, "workspace switch failed, continuing");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    /// A kubectl stand-in that logs its args, rejects `kcp ws` and echoes
    /// everything else.
    fn kubectl_without_workspaces(dir: &Path) -> PathBuf {
        let path = dir.join("kubectl");
        std::fs::write(
            &path,
            "#!/bin/sh\n\
             echo \"$*\" >> \"$(dirname \"$0\")/calls.log\"\n\
             if [ \"$2\" = ws ]; then echo 'workspace not found' >&2; exit 1; fi\n\
             echo \"$*\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_bridge_error() {
        let cred = CredentialFile::materialize(b"").unwrap();
        let bridge = KubectlKcpBridge::new("false");
        let err = bridge.fetch_kubeconfig(&cred, "ws1").await.unwrap_err();
        assert!(matches!(err, ReconcileErr::Bridge(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_a_bridge_error() {
        let cred = CredentialFile::materialize(b"").unwrap();
        let bridge = KubectlKcpBridge::new("/nonexistent/kubectl");
        let err = bridge.switch_workspace(&cred, "ws1").await.unwrap_err();
        assert!(matches!(err, ReconcileErr::Bridge(_)));
    }

    #[tokio::test]
    async fn stdout_is_returned() {
        let cred = CredentialFile::materialize(b"").unwrap();
        // `echo` stands in for kubectl: every subcommand prints its args
        let bridge = KubectlKcpBridge::new("echo");
        let out = bridge.fetch_kubeconfig(&cred, "ws1").await.unwrap();
        assert_eq!(out.trim(), "config view --minify --raw");
    }

    #[tokio::test]
    async fn failed_switch_still_runs_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let kubectl = kubectl_without_workspaces(dir.path());
        let bridge = KubectlKcpBridge::new(kubectl.to_string_lossy());
        let cred = CredentialFile::materialize(b"").unwrap();

        assert!(bridge.switch_workspace(&cred, "ws1").await.is_err());
        let out = bridge.fetch_kubeconfig(&cred, "ws1").await.unwrap();
        assert_eq!(out.trim(), "config view --minify --raw");
        let out = bridge
            .sync_resources(&cred, "ws1", "c1", "syncer:latest")
            .await
            .unwrap();
        assert!(out.starts_with("kcp workload sync c1 --syncer-image syncer:latest"));

        let calls = std::fs::read_to_string(dir.path().join("calls.log")).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(
            calls,
            [
                "kcp ws use ws1",
                "kcp ws use ws1",
                "config view --minify --raw",
                "kcp ws use ws1",
                "kcp workload sync c1 --syncer-image syncer:latest -o - --resources=kyvernoes,policies",
            ]
        );
    }
}
