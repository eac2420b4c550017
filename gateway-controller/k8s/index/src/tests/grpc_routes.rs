use super::*;
use gateway_controller_core::{
    conditions::{reasons, types},
    config::{Server, ServersLoadBalancer, Service, WeightedRoundRobin, WeightedService},
};
use gateway_controller_k8s_api::gateway::{
    grpcroute::{GrpcMethodMatch, GrpcRouteMatch, GrpcRouteRule},
    httproute::{filter_type, HttpRequestRedirectFilter, HttpRouteFilter},
    GrpcRoute, GrpcRouteSpec,
};
use pretty_assertions::assert_eq;

/// A Gateway with one HTTP listener and a gRPC Service with a single ready
/// endpoint. The Service port declares no application protocol.
fn grpc_test() -> TestConfig {
    let mut test = TestConfig::new(false);
    test.store
        .apply(mk_gateway("default", "gw", [mk_listener("web", "HTTP", 80)]));
    test.store
        .apply(mk_service("default", "greeter", &[("grpc", 80)]));
    test.store.apply(mk_endpoints(
        "default",
        "greeter",
        ("grpc", 50051),
        &["10.0.0.1"],
        &[],
    ));
    test
}

fn mk_grpc_route(name: &str, rule: GrpcRouteRule) -> GrpcRoute {
    GrpcRoute {
        metadata: mk_meta(Some("default"), name),
        spec: GrpcRouteSpec {
            parent_refs: Some(vec![mk_parent("default", "gw")]),
            hostnames: Some(vec!["grpc.example.com".to_string()]),
            rules: Some(vec![rule]),
        },
        status: None,
    }
}

fn mk_method_rule(service: &str, method: &str) -> GrpcRouteRule {
    GrpcRouteRule {
        matches: Some(vec![GrpcRouteMatch {
            method: Some(GrpcMethodMatch {
                type_: None,
                service: Some(service.to_string()),
                method: Some(method.to_string()),
            }),
            headers: None,
        }]),
        filters: None,
        backend_refs: Some(vec![mk_backend("greeter", 80)]),
    }
}

#[test]
fn routes_methods_to_h2c_backends() {
    let mut test = grpc_test();
    test.store.apply(mk_grpc_route(
        "greeter",
        mk_method_rule("helloworld.Greeter", "SayHello"),
    ));

    let resolution = test.resolve();
    let http = &resolution.configuration.http;
    assert_eq!(http.routers.len(), 1);
    let (name, router) = http.routers.iter().next().unwrap();
    assert!(name.starts_with("grpcroute-default-greeter-gw-default-gw-ep-web-0-"), "{name}");
    assert_eq!(
        router.rule,
        r#"Host("grpc.example.com") && Path("/helloworld.Greeter/SayHello")"#
    );
    assert_eq!(router.entry_points, vec!["web".to_string()]);
    assert_eq!(
        http.services.get(&router.service),
        Some(&Service::Weighted(WeightedRoundRobin {
            services: vec![WeightedService {
                name: "default-greeter-80".to_string(),
                weight: 1,
                status: None,
            }],
        }))
    );
    assert_eq!(
        http.services.get("default-greeter-80"),
        Some(&Service::LoadBalancer(ServersLoadBalancer {
            servers: vec![Server {
                url: "h2c://10.0.0.1:50051".to_string(),
                weight: 1,
            }],
            pass_host_header: true,
        }))
    );

    let conds = route_conditions(&resolution, "GRPCRoute", "default", "greeter", 0);
    assert_condition(conds, types::ACCEPTED, true, reasons::ACCEPTED);
    assert_condition(conds, types::RESOLVED_REFS, true, reasons::RESOLVED_REFS);
    assert_eq!(listeners(&resolution, "default", "gw")[0].attached_routes, 1);
}

#[test]
fn http_backend_is_unsupported() {
    let mut test = grpc_test();
    let mut svc = mk_service("default", "greeter", &[("grpc", 80)]);
    if let Some(port) = svc
        .spec
        .as_mut()
        .and_then(|spec| spec.ports.as_mut())
        .and_then(|ports| ports.first_mut())
    {
        port.app_protocol = Some("http".to_string());
    }
    test.store.apply(svc);
    test.store.apply(mk_grpc_route(
        "greeter",
        mk_method_rule("helloworld.Greeter", "SayHello"),
    ));

    let resolution = test.resolve();
    let http = &resolution.configuration.http;
    let router = http.routers.values().next().unwrap();
    assert_eq!(
        http.services.get(&router.service),
        Some(&Service::Weighted(WeightedRoundRobin {
            services: vec![WeightedService {
                name: "invalid-grpcroute-backend".to_string(),
                weight: 1,
                status: Some(500),
            }],
        }))
    );
    assert!(!http.services.contains_key("default-greeter-80"));

    let conds = route_conditions(&resolution, "GRPCRoute", "default", "greeter", 0);
    assert_condition(conds, types::ACCEPTED, true, reasons::ACCEPTED);
    assert_condition(conds, types::RESOLVED_REFS, false, reasons::UNSUPPORTED_PROTOCOL);
}

#[test]
fn redirects_are_rejected() {
    let mut test = grpc_test();
    let mut rule = mk_method_rule("helloworld.Greeter", "SayHello");
    rule.filters = Some(vec![HttpRouteFilter {
        type_: filter_type::REQUEST_REDIRECT.to_string(),
        request_redirect: Some(HttpRequestRedirectFilter {
            scheme: Some("https".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }]);
    test.store.apply(mk_grpc_route("greeter", rule));

    let resolution = test.resolve();
    let http = &resolution.configuration.http;
    assert_eq!(http.routers.len(), 1);
    let (name, router) = http.routers.iter().next().unwrap();
    assert_eq!(router.service, format!("{name}-err-wrr"));
    assert!(router.middlewares.is_empty());
    assert!(http.middlewares.is_empty());

    let conds = route_conditions(&resolution, "GRPCRoute", "default", "greeter", 0);
    assert_condition(conds, types::RESOLVED_REFS, false, reasons::UNSUPPORTED_VALUE);
}

#[test]
fn invalid_method_match_routes_to_error_service() {
    let mut test = grpc_test();
    test.store.apply(mk_grpc_route(
        "greeter",
        mk_method_rule("helloworld/Greeter", "SayHello"),
    ));

    let resolution = test.resolve();
    let http = &resolution.configuration.http;
    assert_eq!(http.routers.len(), 1);
    let (name, router) = http.routers.iter().next().unwrap();
    assert_eq!(
        router.rule,
        r#"Host("grpc.example.com") && Path("/helloworld/Greeter/SayHello")"#
    );
    assert_eq!(router.service, format!("{name}-err-wrr"));

    let conds = route_conditions(&resolution, "GRPCRoute", "default", "greeter", 0);
    assert_condition(conds, types::RESOLVED_REFS, false, reasons::UNSUPPORTED_VALUE);
}
