use tracing::{debug, instrument, warn};

use super::{PassContext, SkippedSegment, Stage};
use crate::discovery::GroupKind;
use crate::error::ReconcileErr;
use crate::kinds::DesiredResource;
use crate::manifests::{parse_manifest, split_documents};
use crate::upsert::UpsertOptions;

/// Install the sync agent for the workspace on the local cluster.
///
/// Malformed documents are logged and skipped; everything else aborts.
#[instrument(skip_all, fields(target = %ctx.pc.spec.cluster.ingress_name))]
pub(super) async fn run(ctx: &mut PassContext<'_>) -> Result<(), ReconcileErr> {
    let blob = ctx
        .bridge
        .sync_resources(
            ctx.cred,
            ctx.workspace(),
            &ctx.pc.spec.cluster.ingress_name,
            &ctx.cfg.syncer_image,
        )
        .await?;

    let local = ctx.local;
    let default_ns = ctx.owner_namespace();
    for (index, doc) in split_documents(&blob).into_iter().enumerate() {
        let desired = match to_desired(ctx, &doc, &default_ns) {
            Ok(Some(desired)) => desired,
            Ok(None) => continue,
            Err(ReconcileErr::Parse(reason)) => {
                warn!(index, %reason, "skipping synced document");
                ctx.report.skipped.push(SkippedSegment { index, reason });
                continue;
            }
            Err(e) => return Err(e),
        };
        debug!(index, kind = %desired.kind(), name = %desired.name(), "applying synced resource");
        ctx.apply(
            Stage::Sync,
            local.api.as_ref(),
            desired,
            UpsertOptions::unowned().tolerate_update_errors(),
        )
        .await?;
    }
    Ok(())
}

fn to_desired(
    ctx: &PassContext<'_>,
    doc: &str,
    default_ns: &str,
) -> Result<Option<DesiredResource>, ReconcileErr> {
    let Some(mut obj) = parse_manifest(doc)? else {
        return Ok(None);
    };
    let mapping = ctx.local.mapper.map_kind(&GroupKind::of(&obj)?)?;
    if mapping.is_namespaced()
        && obj.metadata.namespace.as_deref().unwrap_or_default().is_empty()
    {
        obj.metadata.namespace = Some(default_ns.to_string());
    }
    DesiredResource::from_discovered(mapping, obj).map(Some)
}
