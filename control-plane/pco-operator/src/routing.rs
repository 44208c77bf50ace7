//! Convergence of the ingress shared by every tenant on one host.
//!
//! Tenants only ever append their own path. Entries belonging to other
//! tenants are left in place and in order.

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend,
    IngressServiceBackend, ServiceBackendPort,
};
use tracing::{debug, info, instrument, warn};

use crate::cluster::{ClusterApi, get_typed, to_dynamic};
use crate::discovery::ResourceMapping;
use crate::error::{ReconcileErr, is_conflict};

pub const SHARED_INGRESS_NAME: &str = "kyverno-ingress";

/// Attempts of the read-merge-write cycle before giving up on conflicts.
pub const MERGE_CONFLICT_RETRIES: usize = 5;

/// One tenant's entry in the shared ingress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteTarget {
    pub host: String,
    pub path: String,
    pub service: String,
    pub port: i32,
}

impl RouteTarget {
    pub fn http_path(&self) -> HTTPIngressPath {
        HTTPIngressPath {
            path: Some(self.path.clone()),
            path_type: "Prefix".into(),
            backend: IngressBackend {
                service: Some(IngressServiceBackend {
                    name: self.service.clone(),
                    port: Some(ServiceBackendPort {
                        number: Some(self.port),
                        name: None,
                    }),
                }),
                resource: None,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteState {
    NoHostEntry,
    HostEntryNoMatchingPath,
    HostEntryMatchingPath,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The ingress did not exist and was created with this route only.
    Created,
    Appended,
    AlreadyPresent,
}

/// Where `route` stands in `ingress`. Host then path, both exact.
pub fn route_state(ingress: &Ingress, route: &RouteTarget) -> RouteState {
    let mut host_seen = false;
    let rules = ingress
        .spec
        .iter()
        .flat_map(|s| s.rules.iter().flatten())
        .filter(|r| r.host.as_deref() == Some(route.host.as_str()));
    for rule in rules {
        host_seen = true;
        let matched = rule
            .http
            .iter()
            .flat_map(|h| h.paths.iter())
            .any(|p| p.path.as_deref() == Some(route.path.as_str()));
        if matched {
            return RouteState::HostEntryMatchingPath;
        }
    }
    if host_seen {
        RouteState::HostEntryNoMatchingPath
    } else {
        RouteState::NoHostEntry
    }
}

/// Merge `route` into `ingress` in memory.
///
/// Appends to the first rule for the host. Never creates a host entry.
pub fn merge_route(
    ingress: &mut Ingress,
    route: &RouteTarget,
) -> Result<MergeOutcome, ReconcileErr> {
    match route_state(ingress, route) {
        RouteState::NoHostEntry => Err(ReconcileErr::NoRouteTarget {
            host: route.host.clone(),
        }),
        RouteState::HostEntryMatchingPath => Ok(MergeOutcome::AlreadyPresent),
        RouteState::HostEntryNoMatchingPath => {
            let rule = ingress
                .spec
                .as_mut()
                .and_then(|s| s.rules.as_mut())
                .and_then(|rules| {
                    rules
                        .iter_mut()
                        .find(|r| r.host.as_deref() == Some(route.host.as_str()))
                })
                .ok_or_else(|| ReconcileErr::NoRouteTarget {
                    host: route.host.clone(),
                })?;
            rule.http
                .get_or_insert_with(HTTPIngressRuleValue::default)
                .paths
                .push(route.http_path());
            Ok(MergeOutcome::Appended)
        }
    }
}

/// Ensure `route` is served by the shared ingress.
///
/// A missing ingress is created from `seed`; losing that create to another
/// tenant falls through to a merge. An existing one is merged and written
/// back with the resourceVersion it was read at; a conflicting writer
/// triggers a fresh read and merge, up to [`MERGE_CONFLICT_RETRIES`]
/// attempts.
#[instrument(skip_all, fields(host = %route.host, path = %route.path))]
pub async fn converge_shared_ingress(
    api: &dyn ClusterApi,
    seed: &Ingress,
    route: &RouteTarget,
) -> Result<MergeOutcome, ReconcileErr> {
    let mapping = ResourceMapping::namespaced::<Ingress>();
    let name = seed.metadata.name.clone().unwrap_or_default();
    let namespace = seed.metadata.namespace.clone();
    let seed_obj = to_dynamic(seed).map_err(|e| {
        ReconcileErr::Parse(format!("failed to serialize ingress {name}: {e}"))
    })?;
    let mut last_conflict = None;

    for attempt in 1..=MERGE_CONFLICT_RETRIES {
        let observed: Option<Ingress> =
            get_typed(api, &mapping, namespace.as_deref(), &name).await?;

        let Some(mut ingress) = observed else {
            match api.create(&mapping, &seed_obj).await {
                Ok(_) => {
                    info!("shared ingress created");
                    return Ok(MergeOutcome::Created);
                }
                Err(e) if is_conflict(&e) => {
                    debug!(attempt, "ingress created concurrently, re-reading");
                    last_conflict = Some(e);
                    continue;
                }
                Err(source) => {
                    return Err(ReconcileErr::CreateFailed {
                        kind: "Ingress".into(),
                        name,
                        source,
                    });
                }
            }
        };

        match merge_route(&mut ingress, route)? {
            MergeOutcome::Appended => {}
            outcome => {
                debug!("route already present");
                return Ok(outcome);
            }
        }

        let obj = to_dynamic(&ingress).map_err(|e| {
            ReconcileErr::Parse(format!("failed to serialize ingress {name}: {e}"))
        })?;
        match api.replace(&mapping, &obj).await {
            Ok(_) => {
                info!("route appended to shared ingress");
                return Ok(MergeOutcome::Appended);
            }
            Err(e) if is_conflict(&e) => {
                warn!(attempt, "shared ingress changed underneath us, retrying");
                last_conflict = Some(e);
            }
            Err(source) => {
                return Err(ReconcileErr::UpdateFailed {
                    kind: "Ingress".into(),
                    name,
                    source,
                });
            }
        }
    }

    Err(ReconcileErr::UpdateFailed {
        kind: "Ingress".into(),
        name,
        source: last_conflict.unwrap_or_else(|| {
            kube::Error::Service("merge retries exhausted".into())
        }),
    })
}
