use crate::{
    reference_grant::{is_reference_granted, RefNotPermitted, Reference},
    resolver::Context,
    NATIVE_LB_ANNOTATION,
};
use gateway_controller_core::{
    conditions::reasons,
    config::{Server, ServersLoadBalancer, Service},
    rule::normalize,
};
use gateway_controller_k8s_api::{
    self as k8s,
    gateway::{BackendRef, GROUP},
    ResourceExt,
};
use std::collections::BTreeSet;

/// Separates a service name from the provider that defines it.
const PROVIDER_QUALIFIER: char = '@';

const APP_PROTOCOL_H2C: &str = "kubernetes.io/h2c";
const APP_PROTOCOL_WS: &str = "kubernetes.io/ws";
const APP_PROTOCOL_WSS: &str = "kubernetes.io/wss";

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    RefNotPermitted(#[from] RefNotPermitted),

    #[error("unsupported backend kind {kind} in group {group}")]
    InvalidKind { group: String, kind: String },

    #[error("{0}")]
    UnsupportedProtocol(String),

    #[error("failed to build {kind} backend {name}: {error}")]
    Extension {
        kind: String,
        name: String,
        #[source]
        error: anyhow::Error,
    },
}

/// A Service port resolved to the addresses traffic is sent to.
#[derive(Debug)]
pub(crate) struct ResolvedService<'s> {
    /// `namespace-name-port`, normalized.
    pub name: String,
    pub port: &'s k8s::ServicePort,
    /// `host:port` pairs, deduplicated and sorted.
    pub addresses: Vec<String>,
}

// === impl BackendError ===

impl BackendError {
    /// The reason reported in a route's `ResolvedRefs` condition.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound(_) | Self::Extension { .. } => reasons::BACKEND_NOT_FOUND,
            Self::RefNotPermitted(_) => reasons::REF_NOT_PERMITTED,
            Self::InvalidKind { .. } => reasons::INVALID_KIND,
            Self::UnsupportedProtocol(_) => reasons::UNSUPPORTED_PROTOCOL,
        }
    }
}

/// Resolves an HTTP or gRPC route's backend reference to the name of the
/// service to forward to and, if it must be added to the configuration, the
/// service definition.
pub(crate) fn http(
    ctx: &Context<'_>,
    route_kind: &str,
    route_namespace: &str,
    backend: &BackendRef,
    grpc: bool,
) -> Result<(String, Option<Service>), BackendError> {
    if backend.name.contains(PROVIDER_QUALIFIER) {
        return Ok((backend.name.clone(), None));
    }

    let namespace = backend.namespace_or(route_namespace);
    authorize(ctx, route_kind, route_namespace, backend)?;

    if !backend.is_core_service() {
        let builder = ctx
            .registry
            .backend(backend.group(), backend.kind())
            .ok_or_else(|| invalid_kind(backend))?;
        return builder(&backend.name, namespace).map_err(|error| BackendError::Extension {
            kind: backend.kind().to_string(),
            name: format!("{namespace}/{}", backend.name),
            error,
        });
    }

    let svc = service(ctx, namespace, &backend.name, backend.port)?;
    let scheme = if grpc {
        grpc_scheme(svc.port)?
    } else {
        scheme(svc.port)?
    };

    let servers = svc
        .addresses
        .iter()
        .map(|addr| Server {
            url: format!("{scheme}://{addr}"),
            weight: 1,
        })
        .collect();
    let lb = Service::LoadBalancer(ServersLoadBalancer {
        servers,
        pass_host_header: true,
    });
    Ok((svc.name, Some(lb)))
}

/// Resolves a TCP, TLS or UDP route's backend reference. Returns either a
/// service defined by another provider, or the resolved Service.
pub(crate) fn l4<'c>(
    ctx: &Context<'c>,
    route_kind: &str,
    route_namespace: &str,
    backend: &BackendRef,
) -> Result<L4Backend<'c>, BackendError> {
    if backend.name.contains(PROVIDER_QUALIFIER) {
        return Ok(L4Backend::Named(backend.name.clone()));
    }

    authorize(ctx, route_kind, route_namespace, backend)?;
    if !backend.is_core_service() {
        return Err(invalid_kind(backend));
    }

    let namespace = backend.namespace_or(route_namespace);
    service(ctx, namespace, &backend.name, backend.port).map(L4Backend::Service)
}

#[derive(Debug)]
pub(crate) enum L4Backend<'s> {
    Named(String),
    Service(ResolvedService<'s>),
}

fn authorize(
    ctx: &Context<'_>,
    route_kind: &str,
    route_namespace: &str,
    backend: &BackendRef,
) -> Result<(), RefNotPermitted> {
    is_reference_granted(
        ctx.store,
        Reference {
            group: GROUP,
            kind: route_kind,
            namespace: route_namespace,
        },
        Reference {
            group: backend.group(),
            kind: backend.kind(),
            namespace: backend.namespace_or(route_namespace),
        },
        &backend.name,
    )
}

fn invalid_kind(backend: &BackendRef) -> BackendError {
    BackendError::InvalidKind {
        group: backend.group().to_string(),
        kind: backend.kind().to_string(),
    }
}

/// Resolves a Service port to its addresses.
///
/// With native load balancing the Service's cluster IP is the only address.
/// Otherwise the ready addresses of the Service's Endpoints are used,
/// matching the endpoint port by the Service port's name.
fn service<'c>(
    ctx: &Context<'c>,
    namespace: &str,
    name: &str,
    port: Option<u16>,
) -> Result<ResolvedService<'c>, BackendError> {
    let port = port.ok_or_else(|| {
        BackendError::NotFound(format!("backend {namespace}/{name} must specify a port"))
    })?;

    let svc = ctx
        .store
        .get::<k8s::Service>(namespace, name)
        .ok_or_else(|| BackendError::NotFound(format!("service {namespace}/{name} not found")))?;
    let spec = svc.spec.as_ref().ok_or_else(|| {
        BackendError::NotFound(format!("service {namespace}/{name} has no spec"))
    })?;
    let svc_port = spec
        .ports
        .iter()
        .flatten()
        .find(|p| p.port == i32::from(port))
        .ok_or_else(|| {
            BackendError::NotFound(format!("service {namespace}/{name} has no port {port}"))
        })?;

    let lb_name = normalize(&format!("{namespace}-{name}-{port}"));

    if spec.type_.as_deref() == Some("ExternalName") {
        if !ctx.config.allow_external_name_services {
            return Err(BackendError::NotFound(format!(
                "service {namespace}/{name} is an ExternalName service, which is not allowed"
            )));
        }
        let host = spec.external_name.as_deref().unwrap_or_default();
        return Ok(ResolvedService {
            name: lb_name,
            port: svc_port,
            addresses: vec![join_host_port(host, port)],
        });
    }

    if native_lb(svc, ctx.config.native_lb_by_default) {
        let ip = spec
            .cluster_ip
            .as_deref()
            .filter(|ip| !ip.is_empty() && *ip != "None")
            .ok_or_else(|| {
                BackendError::NotFound(format!("service {namespace}/{name} has no cluster IP"))
            })?;
        return Ok(ResolvedService {
            name: lb_name,
            port: svc_port,
            addresses: vec![join_host_port(ip, port)],
        });
    }

    let endpoints = ctx
        .store
        .get::<k8s::Endpoints>(namespace, name)
        .ok_or_else(|| BackendError::NotFound(format!("endpoints {namespace}/{name} not found")))?;

    let mut addresses = BTreeSet::new();
    for subset in endpoints.subsets.iter().flatten() {
        let Some(ep_port) = subset
            .ports
            .iter()
            .flatten()
            .find(|p| p.name == svc_port.name)
        else {
            continue;
        };
        let Ok(ep_port) = u16::try_from(ep_port.port) else {
            continue;
        };
        // Not-ready addresses are listed separately and never used.
        for addr in subset.addresses.iter().flatten() {
            addresses.insert(join_host_port(&addr.ip, ep_port));
        }
    }

    Ok(ResolvedService {
        name: lb_name,
        port: svc_port,
        addresses: addresses.into_iter().collect(),
    })
}

fn native_lb(svc: &k8s::Service, default: bool) -> bool {
    svc.annotations()
        .get(NATIVE_LB_ANNOTATION)
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(default)
}

/// Infers the scheme used to reach a Service port.
///
/// An explicit `appProtocol` wins; otherwise port 443 or a port name starting
/// with `https` selects HTTPS.
pub(crate) fn scheme(port: &k8s::ServicePort) -> Result<&'static str, BackendError> {
    let protocol = port.protocol.as_deref().unwrap_or("TCP");
    if protocol != "TCP" {
        return Err(BackendError::UnsupportedProtocol(format!(
            "service port {} uses protocol {protocol}; only TCP is supported",
            port.port
        )));
    }

    let Some(app_protocol) = port.app_protocol.as_deref() else {
        let https =
            port.port == 443 || port.name.as_deref().is_some_and(|n| n.starts_with("https"));
        return Ok(if https { "https" } else { "http" });
    };

    match app_protocol.to_ascii_lowercase().as_str() {
        APP_PROTOCOL_H2C => Ok("h2c"),
        "http" | APP_PROTOCOL_WS => Ok("http"),
        "https" | APP_PROTOCOL_WSS => Ok("https"),
        other => Err(BackendError::UnsupportedProtocol(format!(
            "service port {} uses unsupported application protocol {other}",
            port.port
        ))),
    }
}

/// Infers the scheme used to reach a gRPC Service port.
///
/// Without an `appProtocol`, gRPC is spoken over cleartext HTTP/2 unless the
/// port is conventionally HTTPS. An explicit `appProtocol` must select h2c or
/// HTTPS.
pub(crate) fn grpc_scheme(port: &k8s::ServicePort) -> Result<&'static str, BackendError> {
    match scheme(port)? {
        "https" => Ok("https"),
        _ if port.app_protocol.is_none() => Ok("h2c"),
        "h2c" => Ok("h2c"),
        other => Err(BackendError::UnsupportedProtocol(format!(
            "service port {} uses protocol {other}; gRPC requires h2c or https",
            port.port
        ))),
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        return format!("[{host}]:{port}");
    }
    format!("{host}:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn port(number: i32, name: Option<&str>, app_protocol: Option<&str>) -> k8s::ServicePort {
        k8s::ServicePort {
            port: number,
            name: name.map(ToString::to_string),
            app_protocol: app_protocol.map(ToString::to_string),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(port(80, None, None), Some("http"))]
    #[case(port(443, None, None), Some("https"))]
    #[case(port(8443, Some("https-web"), None), Some("https"))]
    #[case(port(443, None, Some("http")), Some("http"))]
    #[case(port(80, None, Some("kubernetes.io/h2c")), Some("h2c"))]
    #[case(port(80, None, Some("kubernetes.io/wss")), Some("https"))]
    #[case(port(80, None, Some("grpc")), None)]
    fn infers_scheme(#[case] port: k8s::ServicePort, #[case] expected: Option<&str>) {
        assert_eq!(scheme(&port).ok(), expected);
    }

    #[rstest]
    #[case(port(80, Some("grpc"), None), Some("h2c"))]
    #[case(port(8080, None, None), Some("h2c"))]
    #[case(port(443, None, None), Some("https"))]
    #[case(port(80, None, Some("kubernetes.io/h2c")), Some("h2c"))]
    #[case(port(80, None, Some("https")), Some("https"))]
    #[case(port(80, None, Some("http")), None)]
    #[case(port(80, None, Some("kubernetes.io/ws")), None)]
    fn infers_grpc_scheme(#[case] port: k8s::ServicePort, #[case] expected: Option<&str>) {
        assert_eq!(grpc_scheme(&port).ok(), expected);
    }

    #[test]
    fn rejects_udp_ports() {
        let mut p = port(53, None, None);
        p.protocol = Some("UDP".to_string());
        assert!(matches!(
            scheme(&p),
            Err(BackendError::UnsupportedProtocol(_))
        ));
    }

    #[test]
    fn formats_ipv6() {
        assert_eq!(join_host_port("10.0.0.1", 80), "10.0.0.1:80");
        assert_eq!(join_host_port("fd00::1", 80), "[fd00::1]:80");
    }
}
