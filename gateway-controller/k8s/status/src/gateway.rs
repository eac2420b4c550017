use crate::conditions::{merge, replace};
use chrono::{DateTime, Utc};
use gateway_controller_core::{
    conditions::{self, reasons, types},
    ResolvedListener,
};
use gateway_controller_k8s_api::{
    gateway::{GatewayClassStatus, GatewayStatus, GatewayStatusAddress, ListenerStatus},
    Condition,
};
use gateway_controller_k8s_index::GatewayResolution;
use std::net::IpAddr;

/// Returns the status of a GatewayClass handled by this controller. The
/// Accepted condition is the only condition it carries.
pub(crate) fn class_status(
    observed: Option<&GatewayClassStatus>,
    generation: Option<i64>,
    now: DateTime<Utc>,
) -> GatewayClassStatus {
    let prior = observed
        .map(|s| {
            s.conditions
                .iter()
                .filter(|c| c.type_ == types::ACCEPTED)
                .cloned()
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let accepted = conditions::new(
        types::ACCEPTED,
        true,
        reasons::HANDLED,
        "Handled by this controller",
        generation,
        now,
    );
    GatewayClassStatus {
        conditions: merge(&prior, [accepted]),
    }
}

pub(crate) fn gateway_status(
    resolution: &GatewayResolution,
    observed: Option<&GatewayStatus>,
    addresses: &[GatewayStatusAddress],
    now: DateTime<Utc>,
) -> GatewayStatus {
    let generation = resolution.generation;
    let valid = resolution.listeners.iter().all(|l| l.conditions.is_empty());

    let listeners = resolution
        .listeners
        .iter()
        .map(|listener| {
            let prior = observed
                .and_then(|s| s.listeners.iter().find(|l| l.name == listener.name))
                .map(|l| l.conditions.as_slice())
                .unwrap_or_default();
            ListenerStatus {
                name: listener.name.clone(),
                supported_kinds: listener.allowed_route_kinds.clone(),
                attached_routes: listener.attached_routes,
                conditions: replace(prior, listener_conditions(listener, now)),
            }
        })
        .collect::<Vec<_>>();

    let cond = |type_, status, reason, message: String| {
        conditions::new(type_, status, reason, message, generation, now)
    };
    let gateway_conditions = if valid {
        vec![
            cond(types::ACCEPTED, true, reasons::ACCEPTED, "Gateway accepted".into()),
            cond(types::PROGRAMMED, true, reasons::PROGRAMMED, "Gateway programmed".into()),
        ]
    } else {
        let invalid = resolution
            .listeners
            .iter()
            .filter(|l| !l.conditions.is_empty())
            .map(|l| l.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        vec![
            cond(
                types::ACCEPTED,
                false,
                reasons::LISTENERS_NOT_VALID,
                format!("Invalid listeners: {invalid}"),
            ),
            cond(types::PROGRAMMED, false, reasons::INVALID, "Invalid listeners".into()),
        ]
    };

    let prior = observed.map(|s| s.conditions.as_slice()).unwrap_or_default();
    GatewayStatus {
        addresses: addresses.to_vec(),
        conditions: merge(prior, gateway_conditions),
        listeners,
    }
}

/// A valid listener gets the full set of positive conditions. An invalid
/// one reports its failures and is never left looking programmed.
fn listener_conditions(listener: &ResolvedListener, now: DateTime<Utc>) -> Vec<Condition> {
    let cond = |type_, status, reason, message: &str| {
        conditions::new(type_, status, reason, message, listener.generation, now)
    };
    if listener.conditions.is_empty() {
        return vec![
            cond(types::ACCEPTED, true, reasons::ACCEPTED, "No errors found"),
            cond(types::CONFLICTED, false, reasons::NO_CONFLICTS, "No conflicts found"),
            cond(types::RESOLVED_REFS, true, reasons::RESOLVED_REFS, "No errors found"),
            cond(types::PROGRAMMED, true, reasons::PROGRAMMED, "Listener programmed"),
        ];
    }

    let mut conds = listener.conditions.clone();
    if conditions::find(&conds, types::PROGRAMMED).is_none() {
        conds.push(cond(types::PROGRAMMED, false, reasons::INVALID, "Listener is invalid"));
    }
    conds
}

/// Builds the address reported in `Gateway.status.addresses`.
pub(crate) fn status_address(value: &str) -> GatewayStatusAddress {
    let type_ = if value.parse::<IpAddr>().is_ok() {
        "IPAddress"
    } else {
        "Hostname"
    };
    GatewayStatusAddress {
        type_: Some(type_.to_string()),
        value: value.to_string(),
    }
}
