use std::path::PathBuf;

use k8s_openapi::api::core::v1::Secret;
use tracing::{debug, instrument};

use super::{PassContext, ResourceOutcome, Stage};
use crate::cluster::get_typed;
use crate::credential::secret_value;
use crate::discovery::{GroupKind, ResourceMapping};
use crate::error::ReconcileErr;
use crate::kinds::{DesiredResource, TypedResource};
use crate::manifests::{manifest_files, read_manifest_file};
use crate::routing::{MergeOutcome, SHARED_INGRESS_NAME, converge_shared_ingress};
use crate::templates::{self, TlsMaterial};
use crate::upsert::{Applied, UpsertOptions};

/// Stand up the tenant's standalone engine: its API prerequisites and TLS
/// material in the workspace, and its route, credentials, service and
/// workload on the local cluster.
#[instrument(skip_all, fields(token = %ctx.token))]
pub(super) async fn run(ctx: &mut PassContext<'_>) -> Result<(), ReconcileErr> {
    let tls = install_workspace_prerequisites(ctx).await?;
    deploy_local_engine(ctx, &tls).await
}

async fn install_workspace_prerequisites(
    ctx: &mut PassContext<'_>,
) -> Result<TlsMaterial, ReconcileErr> {
    let remote = ctx.remote;
    let api_ns = ctx.pc.spec.workspace_config.api_namespace.clone();
    ctx.apply(
        Stage::Hub,
        remote.api.as_ref(),
        TypedResource::Namespace(templates::namespace(&api_ns)).into(),
        UpsertOptions::unowned(),
    )
    .await?;

    let mut files = manifest_files(&ctx.cfg.manifests_dir).await?;
    files.push(ctx.cfg.apibindings_manifest.clone());
    for path in files {
        apply_manifest_file(ctx, path).await?;
    }

    let tls = read_tls_material(ctx).await?;
    for secret in [
        templates::engine_tls_pair_secret(&api_ns, &tls),
        templates::engine_tls_ca_secret(&api_ns, &tls),
    ] {
        ctx.apply(
            Stage::Hub,
            remote.api.as_ref(),
            TypedResource::Secret(secret).into(),
            UpsertOptions::unowned(),
        )
        .await?;
    }
    Ok(tls)
}

async fn apply_manifest_file(
    ctx: &mut PassContext<'_>,
    path: PathBuf,
) -> Result<(), ReconcileErr> {
    let remote = ctx.remote;
    debug!(path = %path.display(), "applying workspace manifest");
    for obj in read_manifest_file(&path).await? {
        let mapping = remote.mapper.map_kind(&GroupKind::of(&obj)?)?;
        ctx.apply(
            Stage::Hub,
            remote.api.as_ref(),
            DesiredResource::generic(mapping, obj),
            UpsertOptions::unowned().tolerate_update_errors(),
        )
        .await?;
    }
    Ok(())
}

async fn deploy_local_engine(
    ctx: &mut PassContext<'_>,
    tls: &TlsMaterial,
) -> Result<(), ReconcileErr> {
    let local = ctx.local;
    let ns = ctx.pc.spec.cluster.namespace.clone();

    ctx.apply(
        Stage::Hub,
        local.api.as_ref(),
        TypedResource::Secret(templates::ingress_tls_secret(&ns, tls)).into(),
        UpsertOptions::unowned(),
    )
    .await?;

    let route = templates::tenant_route(ctx.pc, &ctx.token);
    let seed = templates::shared_ingress(&ns, &route);
    let merged = converge_shared_ingress(local.api.as_ref(), &seed, &route).await?;
    debug!(?merged, "shared ingress converged");
    ctx.report.outcomes.push(ResourceOutcome {
        stage: Stage::Hub,
        kind: "Ingress".to_string(),
        namespace: Some(ns.clone()),
        name: SHARED_INGRESS_NAME.to_string(),
        applied: match merged {
            MergeOutcome::Created => Applied::Created,
            MergeOutcome::Appended => Applied::Updated,
            MergeOutcome::AlreadyPresent => Applied::Unchanged,
        },
    });

    let kubeconfig = ctx
        .bridge
        .fetch_kubeconfig(ctx.cred, ctx.workspace())
        .await?;
    let owned = ctx.local_options(&ns);
    let tenant: [DesiredResource; 3] = [
        TypedResource::Secret(templates::kubeconfig_secret(&ns, &ctx.token, &kubeconfig))
            .into(),
        TypedResource::Service(templates::service(ctx.pc, &ctx.token)).into(),
        TypedResource::Deployment(templates::deployment(ctx.pc, &ctx.token)).into(),
    ];
    for desired in tenant {
        ctx.apply(Stage::Hub, local.api.as_ref(), desired, owned).await?;
    }
    Ok(())
}

async fn read_tls_material(ctx: &PassContext<'_>) -> Result<TlsMaterial, ReconcileErr> {
    let cluster = &ctx.pc.spec.cluster;
    let tls_ref = &cluster.ingress_tls_secret;
    let secret: Secret = get_typed(
        ctx.local.api.as_ref(),
        &ResourceMapping::namespaced::<Secret>(),
        Some(&cluster.namespace),
        &tls_ref.name,
    )
    .await?
    .ok_or_else(|| {
        ReconcileErr::Credential(format!(
            "TLS secret {}/{} not found",
            cluster.namespace, tls_ref.name
        ))
    })?;
    let field = |key: &str| {
        secret_value(&secret, key)
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .ok_or_else(|| {
                ReconcileErr::Credential(format!(
                    "TLS secret {}/{} has no key {key}",
                    cluster.namespace, tls_ref.name
                ))
            })
    };
    Ok(TlsMaterial {
        cert: field(&tls_ref.key_for_cert)?,
        key: field(&tls_ref.key_for_priv_key)?,
        ca_cert: field(&tls_ref.key_for_ca_cert)?,
    })
}
