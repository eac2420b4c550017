use crate::{conditions::merge, resource_id::ResourceKind};
use gateway_controller_k8s_api::gateway::{
    GrpcRoute, HttpRoute, RouteParentStatus, RouteStatus, TcpRoute, TlsRoute, UdpRoute,
};
use gateway_controller_k8s_index::{RouteResolution, Store};

/// Builds a route's status from its resolution.
///
/// Parent entries written by other controllers are kept as observed. This
/// controller's entries are replaced by one entry per resolved parent
/// reference, carrying over transition times from the matching observed
/// entry.
pub(crate) fn route_status(
    controller_name: &str,
    resolution: &RouteResolution,
    observed: Option<&RouteStatus>,
) -> RouteStatus {
    let observed = observed.map(|s| s.parents.as_slice()).unwrap_or_default();

    let mut parents = observed
        .iter()
        .filter(|p| p.controller_name != controller_name)
        .cloned()
        .collect::<Vec<_>>();

    for parent in &resolution.parents {
        let prior = observed
            .iter()
            .find(|p| p.controller_name == controller_name && p.parent_ref == parent.parent_ref)
            .map(|p| p.conditions.as_slice())
            .unwrap_or_default();
        parents.push(RouteParentStatus {
            parent_ref: parent.parent_ref.clone(),
            controller_name: controller_name.to_string(),
            conditions: merge(prior, parent.conditions.iter().cloned()),
        });
    }

    RouteStatus { parents }
}

/// Returns the status the store last observed for a route.
pub(crate) fn observed<'s>(
    store: &'s Store,
    kind: ResourceKind,
    namespace: &str,
    name: &str,
) -> Option<&'s RouteStatus> {
    match kind {
        ResourceKind::HttpRoute => store.get::<HttpRoute>(namespace, name)?.status.as_ref(),
        ResourceKind::GrpcRoute => store.get::<GrpcRoute>(namespace, name)?.status.as_ref(),
        ResourceKind::TcpRoute => store.get::<TcpRoute>(namespace, name)?.status.as_ref(),
        ResourceKind::TlsRoute => store.get::<TlsRoute>(namespace, name)?.status.as_ref(),
        ResourceKind::UdpRoute => store.get::<UdpRoute>(namespace, name)?.status.as_ref(),
        ResourceKind::GatewayClass | ResourceKind::Gateway => None,
    }
}
