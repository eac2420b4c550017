//! Attaches routes to listeners and derives their configuration.

mod filters;
mod grpc;
mod http;
mod l4;
mod tcp;
mod tls;
mod udp;

use crate::{
    resolver::{Context, GatewayResolution, RouteId, RouteParentResolution, RouteResolution},
    store::Stored,
};
use gateway_controller_core::{
    conditions::{self, reasons, types},
    hostname,
    rule::RouterKey,
    Configuration, ObjectRef, ResolvedListener,
};
use gateway_controller_k8s_api::{
    gateway::{ParentReference, GROUP, KIND_GATEWAY},
    Condition,
};
use std::collections::{BTreeMap, BTreeSet};

/// A route kind handled by the resolver.
pub(crate) trait Route: Stored {
    const KIND: &'static str;

    fn parent_refs(&self) -> &[ParentReference];

    fn hostnames(&self) -> &[String] {
        &[]
    }

    /// Builds the route's configuration for a listener into `out`. Returns
    /// the first reference that could not be resolved.
    fn build(
        &self,
        ctx: &Context<'_>,
        target: &Target<'_>,
        out: &mut Configuration,
    ) -> Option<Failure>;
}

/// The listener a route is being built for.
pub(crate) struct Target<'a> {
    pub listener: &'a ResolvedListener,
    pub entry_point: &'a str,
    /// The intersection of the route's and the listener's hostnames.
    pub hostnames: &'a [String],
    pub key: RouterKey<'a>,
}

/// A reference that could not be resolved, reported through the parent's
/// `ResolvedRefs` condition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Failure {
    pub reason: &'static str,
    pub message: String,
}

/// Shared state of a resolution pass over routes.
pub(crate) struct Pass<'a, 'c> {
    pub ctx: &'a Context<'c>,
    pub gateways: &'a mut Vec<GatewayResolution>,
    /// Gateways whose class is handled by another controller.
    pub foreign: &'a BTreeSet<ObjectRef>,
    pub configuration: &'a mut Configuration,
    pub statuses: &'a mut BTreeMap<RouteId, RouteResolution>,
}

// === impl Pass ===

impl Pass<'_, '_> {
    pub(crate) fn resolve<R: Route>(&mut self) {
        let store = self.ctx.store;
        for (id, route) in store.iter::<R>() {
            let handled = route.parent_refs().iter().any(|parent| {
                is_gateway(parent)
                    && self.gateways.iter().any(|gw| {
                        gw.gateway.name == parent.name
                            && gw.gateway.namespace == parent.namespace_or(&id.namespace)
                    })
            });
            if !handled {
                continue;
            }

            let generation = route.meta().generation;
            let mut parents = Vec::new();
            for parent in route.parent_refs() {
                // Another controller reports status for its own Gateways.
                if self.is_foreign(parent, &id.namespace) {
                    continue;
                }
                parents.push(self.resolve_parent(route, id, generation, parent));
            }

            self.statuses.insert(
                RouteId {
                    kind: R::KIND,
                    namespace: id.namespace.clone(),
                    name: id.name.clone(),
                },
                RouteResolution {
                    generation,
                    parents,
                },
            );
        }
    }

    fn is_foreign(&self, parent: &ParentReference, route_namespace: &str) -> bool {
        is_gateway(parent)
            && self.foreign.contains(&ObjectRef::new(
                parent.namespace_or(route_namespace),
                parent.name.clone(),
            ))
    }

    fn resolve_parent<R: Route>(
        &mut self,
        route: &R,
        id: &ObjectRef,
        generation: Option<i64>,
        parent: &ParentReference,
    ) -> RouteParentResolution {
        let ctx = self.ctx;
        let mut accepted = ctx.condition(
            types::ACCEPTED,
            false,
            reasons::NO_MATCHING_PARENT,
            "No listener matches the parent reference",
            generation,
        );
        let mut resolved_refs = ctx.condition(
            types::RESOLVED_REFS,
            true,
            reasons::RESOLVED_REFS,
            "All references are resolved",
            generation,
        );

        for gateway in self.gateways.iter_mut() {
            let matching = gateway
                .listeners
                .iter_mut()
                .filter(|l| matches_parent(l, &id.namespace, parent));
            for listener in matching {
                let hostnames =
                    hostname::matching_hostnames(listener.hostname.as_deref(), route.hostnames());
                let admitted = if !listener.allows_kind(GROUP, R::KIND)
                    || !listener.allowed_namespaces.allows(&id.namespace)
                {
                    set_reason(
                        &mut accepted,
                        reasons::NOT_ALLOWED_BY_LISTENERS,
                        format!("Listener {} does not allow this route", listener.name),
                    );
                    false
                } else if hostnames.is_none() {
                    set_reason(
                        &mut accepted,
                        reasons::NO_MATCHING_LISTENER_HOSTNAME,
                        format!("No hostname matches listener {}", listener.name),
                    );
                    false
                } else {
                    listener.attached_routes += 1;
                    true
                };

                // References are checked against every selected listener so
                // that ResolvedRefs holds even when nothing is served.
                let serving = admitted && listener.attached && listener.entry_point.is_some();
                if serving {
                    set_reason(&mut accepted, reasons::ACCEPTED, "Route is accepted".to_string());
                }
                let hostnames = hostnames.unwrap_or_else(|| route.hostnames().to_vec());
                let entry_point = listener.entry_point.as_deref().unwrap_or(&listener.name);
                let target = Target {
                    listener,
                    entry_point,
                    hostnames: &hostnames,
                    key: RouterKey {
                        route_kind: R::KIND,
                        route_namespace: &id.namespace,
                        route_name: &id.name,
                        gateway_namespace: &gateway.gateway.namespace,
                        gateway_name: &gateway.gateway.name,
                        entry_point,
                    },
                };
                let mut out = Configuration::default();
                if let Some(failure) = route.build(ctx, &target, &mut out) {
                    if conditions::is_true(&resolved_refs) {
                        resolved_refs.status = "False".to_string();
                        resolved_refs.reason = failure.reason.to_string();
                        resolved_refs.message = failure.message;
                    }
                }
                if serving {
                    self.configuration.merge(out);
                }
            }
        }

        RouteParentResolution {
            parent_ref: parent.clone(),
            conditions: vec![accepted, resolved_refs],
        }
    }
}

fn is_gateway(parent: &ParentReference) -> bool {
    parent.group() == GROUP && parent.kind() == KIND_GATEWAY
}

/// Returns true if `listener` is selected by a parent reference.
fn matches_parent(
    listener: &ResolvedListener,
    route_namespace: &str,
    parent: &ParentReference,
) -> bool {
    is_gateway(parent)
        && listener.gateway.name == parent.name
        && listener.gateway.namespace == parent.namespace_or(route_namespace)
        && parent
            .section_name
            .as_ref()
            .map_or(true, |name| *name == listener.name)
        && parent.port.map_or(true, |port| port == listener.port)
}

/// Updates the reason of an `Accepted` condition. Once the route is accepted
/// by one listener, rejections by others are not reported.
fn set_reason(accepted: &mut Condition, reason: &str, message: String) {
    if conditions::is_true(accepted) {
        return;
    }
    if reason == reasons::ACCEPTED {
        accepted.status = "True".to_string();
    }
    accepted.reason = reason.to_string();
    accepted.message = message;
}

// === impl Failure ===

impl Failure {
    pub(crate) fn new(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Keeps the first failure.
fn note(first: &mut Option<Failure>, failure: Failure) {
    tracing::debug!(
        reason = failure.reason,
        message = %failure.message,
        "Unresolved route reference"
    );
    first.get_or_insert(failure);
}

/// Names the synthetic member that stands in for a backend that could not
/// be resolved.
fn invalid_backend(kind: &str) -> String {
    format!("invalid-{}-backend", kind.to_lowercase())
}
