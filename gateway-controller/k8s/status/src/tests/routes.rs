use super::*;
use crate::ResourceKind;
use gateway_controller_core::conditions::{reasons, types};
use gateway_controller_k8s_api::gateway::{
    HttpRoute, HttpRouteSpec, ParentReference, RouteParentStatus, RouteStatus,
};
use gateway_controller_k8s_index::{RouteId, RouteParentResolution, RouteResolution};
use pretty_assertions::assert_eq;

fn mk_parent(name: &str) -> ParentReference {
    ParentReference {
        namespace: Some("infra".to_string()),
        name: name.to_string(),
        ..Default::default()
    }
}

fn mk_route(status: Option<RouteStatus>) -> HttpRoute {
    HttpRoute {
        metadata: mk_meta(Some("apps"), "web"),
        spec: HttpRouteSpec {
            parent_refs: Some(vec![mk_parent("gw"), mk_parent("other")]),
            hostnames: None,
            rules: None,
        },
        status,
    }
}

fn mk_route_resolution(accepted: bool, secs: i64) -> Resolution {
    let reason = if accepted {
        reasons::ACCEPTED
    } else {
        reasons::NO_MATCHING_PARENT
    };
    let id = RouteId {
        kind: "HTTPRoute",
        namespace: "apps".to_string(),
        name: "web".to_string(),
    };
    let resolution = RouteResolution {
        generation: Some(1),
        parents: vec![RouteParentResolution {
            parent_ref: mk_parent("gw"),
            conditions: vec![
                conditions::new(types::ACCEPTED, accepted, reason, "", Some(1), at(secs)),
                conditions::new(
                    types::RESOLVED_REFS,
                    true,
                    reasons::RESOLVED_REFS,
                    "",
                    Some(1),
                    at(secs),
                ),
            ],
        }],
    };
    Resolution {
        routes: [(id, resolution)].into_iter().collect(),
        ..Default::default()
    }
}

fn route_id() -> ResourceId {
    ResourceId::new(ResourceKind::HttpRoute, "apps".to_string(), "web".to_string())
}

#[test]
fn route_patch_targets_route_kind() {
    let mut test = TestConfig::new();
    test.store.apply(mk_route(None));

    test.reconcile(&mk_route_resolution(true, 1), 1);
    let updates = test.drain();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].id, route_id());

    let Patch::Merge(value) = &updates[0].patch else {
        panic!("expected a merge patch");
    };
    assert_eq!(value["apiVersion"], "gateway.networking.k8s.io/v1");
    assert_eq!(value["kind"], "HTTPRoute");

    let status = status_of::<RouteStatus>(&updates[0]);
    assert_eq!(status.parents.len(), 1);
    assert_eq!(status.parents[0].parent_ref, mk_parent("gw"));
    assert_eq!(status.parents[0].controller_name, CONTROLLER);
    assert_condition(&status.parents[0].conditions, types::ACCEPTED, true, reasons::ACCEPTED);
}

#[test]
fn foreign_parents_are_preserved() {
    let mut test = TestConfig::new();
    let foreign = RouteParentStatus {
        parent_ref: mk_parent("other"),
        controller_name: "example.org/other-controller".to_string(),
        conditions: vec![conditions::new(
            types::ACCEPTED,
            true,
            reasons::ACCEPTED,
            "",
            Some(1),
            at(0),
        )],
    };
    let stale = RouteParentStatus {
        parent_ref: mk_parent("removed"),
        controller_name: CONTROLLER.to_string(),
        conditions: vec![],
    };
    test.store.apply(mk_route(Some(RouteStatus {
        parents: vec![stale, foreign.clone()],
    })));

    test.reconcile(&mk_route_resolution(true, 1), 1);
    let updates = test.drain();
    let status = status_of::<RouteStatus>(&updates[0]);
    assert_eq!(
        status
            .parents
            .iter()
            .map(|p| (p.parent_ref.name.as_str(), p.controller_name.as_str()))
            .collect::<Vec<_>>(),
        vec![
            ("other", "example.org/other-controller"),
            ("gw", CONTROLLER),
        ]
    );
    assert_eq!(status.parents[0], foreign);
}

#[test]
fn parent_conditions_keep_transition_times() {
    let mut test = TestConfig::new();
    test.store.apply(mk_route(None));

    test.reconcile(&mk_route_resolution(false, 1), 1);
    let updates = test.drain();
    test.store.apply(mk_route(Some(status_of(&updates[0]))));

    // Acceptance flips; resolved refs does not.
    test.reconcile(&mk_route_resolution(true, 10), 10);
    let updates = test.drain();
    let status = status_of::<RouteStatus>(&updates[0]);
    let conds = &status.parents[0].conditions;
    let accepted = conditions::find(conds, types::ACCEPTED).unwrap();
    let resolved = conditions::find(conds, types::RESOLVED_REFS).unwrap();
    assert_eq!(accepted.last_transition_time.0, at(10));
    assert_eq!(resolved.last_transition_time.0, at(1));
}

#[test]
fn unchanged_route_is_not_patched() {
    let mut test = TestConfig::new();
    test.store.apply(mk_route(None));

    test.reconcile(&mk_route_resolution(true, 1), 1);
    let updates = test.drain();
    test.store.apply(mk_route(Some(status_of(&updates[0]))));

    test.reconcile(&mk_route_resolution(true, 5), 5);
    assert_eq!(test.drain(), vec![]);
}
