mod grpc_routes;
mod listeners;

use crate::{ControllerConfig, EntryPoint, Registry, Resolution, Resolver, RouteId, Store};
use gateway_controller_core::{conditions, ResolvedListener};
use gateway_controller_k8s_api::{
    self as k8s,
    gateway::{
        httproute::{HttpPathMatch, HttpRouteMatch, HttpRouteRule, PathMatchType},
        AllowedRoutes, BackendRef, FromNamespaces, Gateway, GatewayClass, GatewayClassSpec,
        GatewaySpec, GatewayTlsConfig, HttpRoute, HttpRouteSpec, Listener, ParentReference,
        RouteNamespaces, SecretObjectReference, TlsMode,
    },
    Condition, ObjectMeta,
};
use std::sync::Arc;

const CONTROLLER: &str = "example.com/gateway-controller";
const CLASS: &str = "example";

struct TestConfig {
    store: Store,
    resolver: Resolver,
    _tracing: tracing::subscriber::DefaultGuard,
}

impl TestConfig {
    fn new(experimental: bool) -> Self {
        Self::with_registry(experimental, Registry::default())
    }

    fn with_registry(experimental: bool, registry: Registry) -> Self {
        Self::configured(experimental, registry, |_| {})
    }

    fn configured(
        experimental: bool,
        registry: Registry,
        configure: impl FnOnce(&mut ControllerConfig),
    ) -> Self {
        let _tracing = Self::init_tracing();
        let entry_points = ["web=80", "websecure=443/tls", "tcp=9000", "tls=8443", "dns=5353/udp"]
            .into_iter()
            .map(|ep| ep.parse::<EntryPoint>().unwrap())
            .collect();
        let mut config = ControllerConfig::new(CONTROLLER, entry_points);
        config.experimental_channel = experimental;
        configure(&mut config);

        let mut store = Store::default();
        store.apply(mk_gateway_class(CLASS, CONTROLLER));

        Self {
            store,
            resolver: Resolver::new(Arc::new(config), registry),
            _tracing,
        }
    }

    fn resolve(&self) -> Resolution {
        self.resolver
            .resolve(&self.store, chrono::DateTime::UNIX_EPOCH)
    }

    fn init_tracing() -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing::Level::TRACE)
                .finish(),
        )
    }
}

fn listeners<'r>(resolution: &'r Resolution, ns: &str, name: &str) -> &'r [ResolvedListener] {
    &resolution
        .gateways
        .iter()
        .find(|gw| gw.gateway.namespace == ns && gw.gateway.name == name)
        .expect("gateway must be resolved")
        .listeners
}

/// Returns the conditions of a route's `idx`th handled parent reference.
fn route_conditions<'r>(
    resolution: &'r Resolution,
    kind: &'static str,
    ns: &str,
    name: &str,
    idx: usize,
) -> &'r [Condition] {
    let id = RouteId {
        kind,
        namespace: ns.to_string(),
        name: name.to_string(),
    };
    &resolution.routes.get(&id).expect("route must have a status").parents[idx].conditions
}

#[track_caller]
fn assert_condition(conds: &[Condition], type_: &str, status: bool, reason: &str) {
    let cond = conditions::find(conds, type_)
        .unwrap_or_else(|| panic!("missing {type_} condition in {conds:?}"));
    assert_eq!(
        (conditions::is_true(cond), cond.reason.as_str()),
        (status, reason),
        "{type_} condition: {cond:?}"
    );
}

fn mk_meta(ns: Option<&str>, name: &str) -> ObjectMeta {
    ObjectMeta {
        namespace: ns.map(ToString::to_string),
        name: Some(name.to_string()),
        generation: Some(1),
        ..Default::default()
    }
}

fn mk_gateway_class(name: &str, controller: &str) -> GatewayClass {
    GatewayClass {
        metadata: mk_meta(None, name),
        spec: GatewayClassSpec {
            controller_name: controller.to_string(),
            description: None,
        },
        status: None,
    }
}

fn mk_gateway(ns: &str, name: &str, listeners: impl IntoIterator<Item = Listener>) -> Gateway {
    Gateway {
        metadata: mk_meta(Some(ns), name),
        spec: GatewaySpec {
            gateway_class_name: CLASS.to_string(),
            listeners: listeners.into_iter().collect(),
        },
        status: None,
    }
}

fn mk_listener(name: &str, protocol: &str, port: u16) -> Listener {
    Listener {
        name: name.to_string(),
        protocol: protocol.to_string(),
        port,
        ..Default::default()
    }
}

fn from_all(listener: Listener) -> Listener {
    Listener {
        allowed_routes: Some(AllowedRoutes {
            namespaces: Some(RouteNamespaces {
                from: Some(FromNamespaces::All),
                selector: None,
            }),
            kinds: None,
        }),
        ..listener
    }
}

fn with_tls(listener: Listener, mode: TlsMode, secrets: &[&str]) -> Listener {
    Listener {
        tls: Some(GatewayTlsConfig {
            mode: Some(mode),
            certificate_refs: Some(
                secrets
                    .iter()
                    .map(|name| SecretObjectReference {
                        name: name.to_string(),
                        ..Default::default()
                    })
                    .collect(),
            ),
        }),
        ..listener
    }
}

fn mk_parent(ns: &str, name: &str) -> ParentReference {
    ParentReference {
        namespace: Some(ns.to_string()),
        name: name.to_string(),
        ..Default::default()
    }
}

fn mk_backend(name: &str, port: u16) -> BackendRef {
    BackendRef {
        name: name.to_string(),
        port: Some(port),
        ..Default::default()
    }
}

fn mk_prefix_rule(path: &str, backends: impl IntoIterator<Item = BackendRef>) -> HttpRouteRule {
    mk_path_rule(PathMatchType::PathPrefix, path, backends)
}

fn mk_path_rule(
    type_: PathMatchType,
    path: &str,
    backends: impl IntoIterator<Item = BackendRef>,
) -> HttpRouteRule {
    HttpRouteRule {
        matches: Some(vec![HttpRouteMatch {
            path: Some(HttpPathMatch {
                type_: Some(type_),
                value: Some(path.to_string()),
            }),
            ..Default::default()
        }]),
        filters: None,
        backend_refs: Some(backends.into_iter().collect()),
    }
}

fn mk_http_route(
    ns: &str,
    name: &str,
    parents: impl IntoIterator<Item = ParentReference>,
    hostnames: &[&str],
    rules: impl IntoIterator<Item = HttpRouteRule>,
) -> HttpRoute {
    HttpRoute {
        metadata: mk_meta(Some(ns), name),
        spec: HttpRouteSpec {
            parent_refs: Some(parents.into_iter().collect()),
            hostnames: Some(hostnames.iter().map(ToString::to_string).collect()),
            rules: Some(rules.into_iter().collect()),
        },
        status: None,
    }
}

fn mk_service(ns: &str, name: &str, ports: &[(&str, i32)]) -> k8s::Service {
    k8s::Service {
        metadata: mk_meta(Some(ns), name),
        spec: Some(k8s::ServiceSpec {
            cluster_ip: Some("10.96.0.10".to_string()),
            ports: Some(
                ports
                    .iter()
                    .map(|(name, port)| k8s::ServicePort {
                        name: Some(name.to_string()),
                        port: *port,
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        status: None,
    }
}

fn mk_endpoints(
    ns: &str,
    name: &str,
    port: (&str, i32),
    ready: &[&str],
    not_ready: &[&str],
) -> k8s::Endpoints {
    let addresses = |ips: &[&str]| {
        Some(
            ips.iter()
                .map(|ip| k8s::EndpointAddress {
                    ip: ip.to_string(),
                    ..Default::default()
                })
                .collect(),
        )
    };
    k8s::Endpoints {
        metadata: mk_meta(Some(ns), name),
        subsets: Some(vec![k8s::EndpointSubset {
            addresses: addresses(ready),
            not_ready_addresses: addresses(not_ready),
            ports: Some(vec![k8s::EndpointPort {
                name: Some(port.0.to_string()),
                port: port.1,
                ..Default::default()
            }]),
        }]),
    }
}

fn mk_secret(ns: &str, name: &str, cert: &str, key: &str) -> k8s::Secret {
    k8s::Secret {
        metadata: mk_meta(Some(ns), name),
        type_: Some("kubernetes.io/tls".to_string()),
        data: Some(
            [("tls.crt", cert), ("tls.key", key)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), k8s::ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}
