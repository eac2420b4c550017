use super::{invalid_backend, note, Failure};
use crate::{
    backend::{self, L4Backend},
    resolver::Context,
};
use gateway_controller_core::config::{
    TcpServer, TcpServersLoadBalancer, TcpService, TcpWeightedRoundRobin, TcpWeightedService,
    UdpServer, UdpServersLoadBalancer, UdpService, UdpWeightedRoundRobin, UdpWeightedService,
};
use gateway_controller_k8s_api::gateway::BackendRef;
use std::collections::BTreeMap;

/// A TCP or UDP service definition.
pub(super) trait L4Service: Sized {
    fn load_balancer(addresses: Vec<String>) -> Self;

    fn weighted(members: Vec<(String, u32)>) -> Self;
}

/// Builds the weighted group of a TCP, TLS or UDP rule, adding the services
/// of resolved backends to `services`. Backends that cannot be resolved are
/// replaced by a member without servers.
pub(super) fn weighted<S: L4Service>(
    ctx: &Context<'_>,
    route_kind: &str,
    route_namespace: &str,
    backend_refs: &[BackendRef],
    failure: &mut Option<Failure>,
    services: &mut BTreeMap<String, S>,
) -> S {
    let mut invalid = backend_refs.is_empty();
    let mut members = Vec::with_capacity(backend_refs.len());
    for backend_ref in backend_refs {
        let weight = backend_ref.weight();
        match backend::l4(ctx, route_kind, route_namespace, backend_ref) {
            Ok(L4Backend::Named(name)) => members.push((name, weight)),
            Ok(L4Backend::Service(svc)) => {
                services
                    .entry(svc.name.clone())
                    .or_insert_with(|| S::load_balancer(svc.addresses));
                members.push((svc.name, weight));
            }
            Err(error) => {
                note(failure, Failure::new(error.reason(), error.to_string()));
                invalid = true;
                members.push((invalid_backend(route_kind), weight));
            }
        }
    }

    if invalid {
        services
            .entry(invalid_backend(route_kind))
            .or_insert_with(|| S::load_balancer(vec![]));
        if members.is_empty() {
            members.push((invalid_backend(route_kind), 1));
        }
    }

    S::weighted(members)
}

// === impl TcpService ===

impl L4Service for TcpService {
    fn load_balancer(addresses: Vec<String>) -> Self {
        let servers = addresses
            .into_iter()
            .map(|address| TcpServer { address })
            .collect();
        Self::LoadBalancer(TcpServersLoadBalancer { servers })
    }

    fn weighted(members: Vec<(String, u32)>) -> Self {
        let services = members
            .into_iter()
            .map(|(name, weight)| TcpWeightedService { name, weight })
            .collect();
        Self::Weighted(TcpWeightedRoundRobin { services })
    }
}

// === impl UdpService ===

impl L4Service for UdpService {
    fn load_balancer(addresses: Vec<String>) -> Self {
        let servers = addresses
            .into_iter()
            .map(|address| UdpServer { address })
            .collect();
        Self::LoadBalancer(UdpServersLoadBalancer { servers })
    }

    fn weighted(members: Vec<(String, u32)>) -> Self {
        let services = members
            .into_iter()
            .map(|(name, weight)| UdpWeightedService { name, weight })
            .collect();
        Self::Weighted(UdpWeightedRoundRobin { services })
    }
}
