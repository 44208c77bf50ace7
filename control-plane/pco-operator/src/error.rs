use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error("credential error: {0}")]
    Credential(String),

    #[error("discovery error: {0}")]
    Discovery(String),

    #[error("ownership error: {0}")]
    Ownership(String),

    #[error("failed to read {kind} {name}: {source}")]
    Read {
        kind: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("failed to create {kind} {name}: {source}")]
    CreateFailed {
        kind: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("failed to update {kind} {name}: {source}")]
    UpdateFailed {
        kind: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("ingress doesn't contain a route for host {host}")]
    NoRouteTarget { host: String },

    #[error("invalid manifest: {0}")]
    Parse(String),

    #[error("failed to read manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("command bridge failed: {0}")]
    Bridge(String),
}

impl ReconcileErr {
    /// Short machine-readable reason, used for status conditions.
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileErr::Credential(_) => "CredentialError",
            ReconcileErr::Discovery(_) => "DiscoveryError",
            ReconcileErr::Ownership(_) => "OwnershipError",
            ReconcileErr::Read { .. } => "ReadFailed",
            ReconcileErr::CreateFailed { .. } => "CreateFailed",
            ReconcileErr::UpdateFailed { .. } => "UpdateFailed",
            ReconcileErr::NoRouteTarget { .. } => "NoRouteTarget",
            ReconcileErr::Parse(_) => "ParseError",
            ReconcileErr::Manifest { .. } => "ManifestError",
            ReconcileErr::Bridge(_) => "BridgeError",
        }
    }
}

pub fn is_not_found(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(ae) if ae.code == 404)
}

pub fn is_conflict(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(ae) if ae.code == 409)
}
