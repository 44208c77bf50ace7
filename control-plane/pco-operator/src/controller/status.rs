use serde_json::{Value as JsonValue, json};
use tracing::{debug, trace};

use crate::crd::{
    Condition, ConditionStatus, ConditionType, PolicyControlStatus,
};
use crate::error::ReconcileErr;

fn condition(
    prev: Option<&PolicyControlStatus>,
    type_: ConditionType,
    status: ConditionStatus,
    reason: &str,
    message: Option<String>,
    now: &str,
) -> Condition {
    // keep the transition time while the status holds
    let last_transition_time = prev
        .and_then(|s| s.conditions.as_ref())
        .and_then(|cs| cs.iter().find(|c| c.type_ == type_))
        .filter(|c| c.status == status)
        .and_then(|c| c.last_transition_time.clone())
        .or_else(|| Some(now.to_string()));
    Condition {
        type_,
        status,
        reason: Some(reason.to_string()),
        message,
        last_transition_time,
    }
}

pub fn available(
    prev: Option<&PolicyControlStatus>,
    generation: Option<i64>,
    now: &str,
) -> PolicyControlStatus {
    PolicyControlStatus {
        observed_generation: generation,
        conditions: Some(vec![
            condition(
                prev,
                ConditionType::Available,
                ConditionStatus::True,
                "ReconcileSucceeded",
                Some("All stages applied".into()),
                now,
            ),
            condition(
                prev,
                ConditionType::Degraded,
                ConditionStatus::False,
                "ReconcileSucceeded",
                None,
                now,
            ),
        ]),
    }
}

pub fn degraded(
    prev: Option<&PolicyControlStatus>,
    generation: Option<i64>,
    err: &ReconcileErr,
    now: &str,
) -> PolicyControlStatus {
    PolicyControlStatus {
        observed_generation: generation,
        conditions: Some(vec![
            condition(
                prev,
                ConditionType::Available,
                ConditionStatus::False,
                err.reason(),
                None,
                now,
            ),
            condition(
                prev,
                ConditionType::Degraded,
                ConditionStatus::True,
                err.reason(),
                Some(err.to_string()),
                now,
            ),
        ]),
    }
}

/// Compare two statuses ignoring transition timestamps.
pub fn should_patch_status(
    current: Option<&PolicyControlStatus>,
    desired: &PolicyControlStatus,
) -> bool {
    match current {
        None => {
            debug!("should_patch_status: no current status, patching");
            true
        }
        Some(cur) => {
            let differs = normalize_status(cur) != normalize_status(desired);
            if !differs {
                trace!("should_patch_status: status identical, skipping patch");
            }
            differs
        }
    }
}

fn normalize_status(s: &PolicyControlStatus) -> JsonValue {
    let mut v = serde_json::to_value(s).unwrap_or_else(|_| json!({}));
    if let Some(JsonValue::Array(conds)) =
        v.as_object_mut().and_then(|m| m.get_mut("conditions"))
    {
        for c in conds.iter_mut() {
            if let Some(obj) = c.as_object_mut() {
                obj.remove("lastTransitionTime");
            }
        }
    }
    v
}
