pub mod status;

use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use kube::{
    Client, Resource, ResourceExt,
    api::{Api, Patch, PatchParams},
    runtime::{Controller, controller::Action, watcher::Config},
};
use serde_json::json;
use tracing::{error, info, instrument, trace, warn};

use crate::crd::{PolicyControl, PolicyControlStatus};
use crate::error::ReconcileErr;
use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct ControllerContext {
    pub client: Client,
    pub pipeline: Arc<Pipeline>,
}

pub async fn run_controller(
    client: Client,
    pipeline: Arc<Pipeline>,
) -> anyhow::Result<()> {
    let api: Api<PolicyControl> = Api::all(client.clone());
    let ctx = Arc::new(ControllerContext { client, pipeline });

    Controller::new(api, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    info!(name = %obj_ref.name, "reconciled: requeue={:?}", action)
                }
                Err(e) => error!(error = ?e, "reconcile error"),
            }
        })
        .await;

    Ok(())
}

#[instrument(skip_all, fields(ns = ?obj.namespace(), name = %obj.name_any()))]
async fn reconcile(
    obj: Arc<PolicyControl>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    let cfg = ctx.pipeline.config();
    let now = Utc::now().to_rfc3339();
    let generation = obj.meta().generation;

    match ctx.pipeline.run(&obj).await {
        Ok(report) => {
            info!(
                resources = report.outcomes.len(),
                skipped = report.skipped.len(),
                "pass succeeded"
            );
            let desired = status::available(obj.status.as_ref(), generation, &now);
            patch_status(&ctx.client, &obj, desired).await?;
            Ok(Action::requeue(cfg.resync()))
        }
        Err(e) => {
            let desired =
                status::degraded(obj.status.as_ref(), generation, &e, &now);
            if let Err(pe) = patch_status(&ctx.client, &obj, desired).await {
                warn!(error = %pe, "failed to record degraded status");
            }
            Err(e)
        }
    }
}

async fn patch_status(
    client: &Client,
    obj: &PolicyControl,
    desired: PolicyControlStatus,
) -> Result<(), ReconcileErr> {
    if !status::should_patch_status(obj.status.as_ref(), &desired) {
        trace!("status unchanged; skipping patch");
        return Ok(());
    }
    let name = obj.name_any();
    let api: Api<PolicyControl> = match obj.namespace() {
        Some(ns) => Api::namespaced(client.clone(), &ns),
        None => Api::default_namespaced(client.clone()),
    };
    let body = json!({ "status": desired });
    api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&body))
        .await
        .map_err(|source| ReconcileErr::UpdateFailed {
            kind: "PolicyControl".into(),
            name,
            source,
        })?;
    Ok(())
}

fn error_policy(
    obj: Arc<PolicyControl>,
    error: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    warn!(name = %obj.name_any(), reason = error.reason(), error = %error, "pass failed, requeueing");
    Action::requeue(ctx.pipeline.config().error_requeue())
}
