use kube::core::DynamicObject;
use tracing::instrument;

use super::{PassContext, Stage};
use crate::discovery::GroupKind;
use crate::error::ReconcileErr;
use crate::kinds::{DesiredResource, TypedResource};
use crate::templates;
use crate::upsert::UpsertOptions;

/// Install the policy-engine operator in the workspace through OLM.
///
/// Each object depends on the previous one being accepted, so they are
/// applied one after another.
#[instrument(skip_all, fields(ns = %ctx.pc.spec.install.install_namespace))]
pub(super) async fn run(ctx: &mut PassContext<'_>) -> Result<(), ReconcileErr> {
    let remote = ctx.remote;
    let ns = templates::namespace(&ctx.pc.spec.install.install_namespace);
    ctx.apply(
        Stage::Edge,
        remote.api.as_ref(),
        TypedResource::Namespace(ns).into(),
        UpsertOptions::unowned(),
    )
    .await?;

    // The engine CR is filled in by its operator once installed.
    for (obj, opts) in [
        (templates::operator_group(ctx.pc), UpsertOptions::unowned()),
        (templates::subscription(ctx.pc), UpsertOptions::unowned()),
        (
            templates::kyverno_cr(ctx.pc),
            UpsertOptions::unowned().tolerate_update_errors(),
        ),
    ] {
        let desired = discovered(ctx, obj)?;
        ctx.apply(Stage::Edge, remote.api.as_ref(), desired, opts).await?;
    }
    Ok(())
}

fn discovered(
    ctx: &PassContext<'_>,
    obj: DynamicObject,
) -> Result<DesiredResource, ReconcileErr> {
    let mapping = ctx.remote.mapper.map_kind(&GroupKind::of(&obj)?)?;
    Ok(DesiredResource::generic(mapping, obj))
}
