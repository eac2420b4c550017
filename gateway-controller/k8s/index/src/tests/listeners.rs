use super::*;
use gateway_controller_core::{
    conditions::{reasons, types},
    config::Certificate,
    AllowedNamespaces,
};
use gateway_controller_k8s_api::{
    gateway::{
        reference_grant::{ReferenceGrantFrom, ReferenceGrantTo},
        ReferenceGrant, ReferenceGrantSpec, RouteGroupKind,
    },
    LabelSelector, Namespace,
};
use maplit::btreemap;
use pretty_assertions::assert_eq;

#[test]
fn listener_order_matches_spec() {
    let mut test = TestConfig::new(false);
    test.store.apply(mk_gateway(
        "infra",
        "gw",
        [
            mk_listener("unbound", "HTTP", 8080),
            mk_listener("web", "HTTP", 80),
            mk_listener("bogus", "SCTP", 80),
        ],
    ));

    let resolution = test.resolve();
    let listeners = listeners(&resolution, "infra", "gw");
    assert_eq!(
        listeners.iter().map(|l| l.name.as_str()).collect::<Vec<_>>(),
        vec!["unbound", "web", "bogus"]
    );

    assert!(!listeners[0].attached);
    assert_condition(&listeners[0].conditions, types::ACCEPTED, false, reasons::PORT_UNAVAILABLE);

    assert!(listeners[1].attached);
    assert_eq!(listeners[1].entry_point.as_deref(), Some("web"));
    assert!(listeners[1].conditions.is_empty());

    assert!(!listeners[2].attached);
    assert_condition(
        &listeners[2].conditions,
        types::CONFLICTED,
        true,
        reasons::UNSUPPORTED_PROTOCOL,
    );
}

#[test]
fn http_listeners_skip_tls_entry_points() {
    let mut test = TestConfig::new(false);
    test.store
        .apply(mk_gateway("infra", "gw", [mk_listener("web", "HTTP", 443)]));

    let resolution = test.resolve();
    let listener = &listeners(&resolution, "infra", "gw")[0];
    assert!(!listener.attached);
    assert_condition(&listener.conditions, types::ACCEPTED, false, reasons::PORT_UNAVAILABLE);
}

#[test]
fn duplicate_listeners_conflict() {
    let mut test = TestConfig::new(false);
    let with_host = |mut l: Listener, host: &str| {
        l.hostname = Some(host.to_string());
        l
    };
    test.store.apply(mk_gateway(
        "infra",
        "gw",
        [
            with_host(mk_listener("a", "HTTP", 80), "foo.com"),
            with_host(mk_listener("b", "HTTP", 80), "foo.com"),
            with_host(mk_listener("c", "HTTP", 80), "bar.com"),
        ],
    ));

    let resolution = test.resolve();
    let listeners = listeners(&resolution, "infra", "gw");
    assert!(listeners[0].attached);
    assert!(!listeners[1].attached);
    assert_condition(&listeners[1].conditions, types::CONFLICTED, true, reasons::HOSTNAME_CONFLICT);
    assert!(listeners[2].attached);
}

#[test]
fn tls_on_plain_listeners_is_invalid() {
    let mut test = TestConfig::new(false);
    test.store.apply(mk_gateway(
        "infra",
        "gw",
        [with_tls(mk_listener("web", "HTTP", 80), TlsMode::Terminate, &["cert"])],
    ));

    let resolution = test.resolve();
    let listener = &listeners(&resolution, "infra", "gw")[0];
    assert!(!listener.attached);
    assert_condition(
        &listener.conditions,
        types::ACCEPTED,
        false,
        reasons::INVALID_TLS_CONFIGURATION,
    );
}

#[test]
fn https_requires_termination() {
    let mut test = TestConfig::new(false);
    let mut passthrough =
        with_tls(mk_listener("passthrough", "HTTPS", 443), TlsMode::Passthrough, &[]);
    passthrough.hostname = Some("foo.com".to_string());
    test.store.apply(mk_gateway(
        "infra",
        "gw",
        [mk_listener("no-tls", "HTTPS", 443), passthrough],
    ));

    let resolution = test.resolve();
    let listeners = listeners(&resolution, "infra", "gw");
    for listener in listeners {
        assert!(!listener.attached, "{} must not attach", listener.name);
        assert_condition(
            &listener.conditions,
            types::ACCEPTED,
            false,
            reasons::INVALID_TLS_CONFIGURATION,
        );
    }
}

#[test]
fn terminate_without_certificate_refs() {
    let mut test = TestConfig::new(false);
    test.store.apply(mk_gateway(
        "infra",
        "gw",
        [with_tls(mk_listener("websecure", "HTTPS", 443), TlsMode::Terminate, &[])],
    ));
    test.store.apply(mk_http_route(
        "infra",
        "route",
        [mk_parent("infra", "gw")],
        &["foo.com"],
        [mk_prefix_rule("/", [mk_backend("web", 80)])],
    ));

    let resolution = test.resolve();
    let listener = &listeners(&resolution, "infra", "gw")[0];
    assert!(!listener.attached);
    assert_condition(
        &listener.conditions,
        types::RESOLVED_REFS,
        false,
        reasons::INVALID_CERTIFICATE_REF,
    );
    assert_condition(&listener.conditions, types::PROGRAMMED, false, reasons::INVALID);

    // The route selects the listener but nothing is derived from it.
    assert_eq!(listener.attached_routes, 1);
    assert!(resolution.configuration.http.routers.is_empty());
    assert!(resolution.configuration.http.services.is_empty());
    let conds = route_conditions(&resolution, "HTTPRoute", "infra", "route", 0);
    assert_condition(conds, types::ACCEPTED, false, reasons::NO_MATCHING_PARENT);
    // The missing Service is still reported.
    assert_condition(conds, types::RESOLVED_REFS, false, reasons::BACKEND_NOT_FOUND);
}

#[test]
fn terminate_loads_certificate() {
    let mut test = TestConfig::new(false);
    test.store.apply(mk_gateway(
        "infra",
        "gw",
        [with_tls(mk_listener("websecure", "HTTPS", 443), TlsMode::Terminate, &["cert"])],
    ));
    test.store.apply(mk_secret("infra", "cert", "CERT", "KEY"));

    let resolution = test.resolve();
    let listener = &listeners(&resolution, "infra", "gw")[0];
    assert!(listener.attached, "{:?}", listener.conditions);
    assert_eq!(listener.entry_point.as_deref(), Some("websecure"));
    assert_eq!(
        resolution.configuration.tls.certificates,
        vec![Certificate {
            cert_file: "CERT".to_string(),
            key_file: "KEY".to_string(),
        }]
    );
}

#[test]
fn cross_namespace_certificate_requires_grant() {
    let mut test = TestConfig::new(false);
    let mut listener = with_tls(
        mk_listener("websecure", "HTTPS", 443),
        TlsMode::Terminate,
        &["cert"],
    );
    if let Some(tls) = listener.tls.as_mut() {
        for cert in tls.certificate_refs.iter_mut().flatten() {
            cert.namespace = Some("certs".to_string());
        }
    }
    test.store.apply(mk_gateway("infra", "gw", [listener]));
    test.store.apply(mk_secret("certs", "cert", "CERT", "KEY"));

    let resolution = test.resolve();
    let listener = &listeners(&resolution, "infra", "gw")[0];
    assert_condition(&listener.conditions, types::RESOLVED_REFS, false, reasons::REF_NOT_PERMITTED);

    test.store.apply(ReferenceGrant {
        metadata: mk_meta(Some("certs"), "allow-gateways"),
        spec: ReferenceGrantSpec {
            from: vec![ReferenceGrantFrom {
                group: "gateway.networking.k8s.io".to_string(),
                kind: "Gateway".to_string(),
                namespace: "infra".to_string(),
            }],
            to: vec![ReferenceGrantTo {
                group: "".to_string(),
                kind: "Secret".to_string(),
                name: None,
            }],
        },
    });
    let resolution = test.resolve();
    assert!(listeners(&resolution, "infra", "gw")[0].attached);
}

#[test]
fn empty_secret_is_invalid() {
    let mut test = TestConfig::new(false);
    test.store.apply(mk_gateway(
        "infra",
        "gw",
        [with_tls(mk_listener("websecure", "HTTPS", 443), TlsMode::Terminate, &["cert"])],
    ));
    test.store.apply(mk_secret("infra", "cert", "CERT", ""));

    let resolution = test.resolve();
    let listener = &listeners(&resolution, "infra", "gw")[0];
    assert_condition(
        &listener.conditions,
        types::RESOLVED_REFS,
        false,
        reasons::INVALID_CERTIFICATE_REF,
    );
    assert!(resolution.configuration.tls.certificates.is_empty());
}

#[test]
fn l4_listeners_require_experimental_channel() {
    for experimental in [false, true] {
        let mut test = TestConfig::new(experimental);
        test.store
            .apply(mk_gateway("infra", "gw", [mk_listener("tcp", "TCP", 9000)]));
        let resolution = test.resolve();
        let listener = &listeners(&resolution, "infra", "gw")[0];
        assert_eq!(listener.attached, experimental);
    }
}

#[test]
fn explicit_kinds_are_intersected() {
    let mut test = TestConfig::new(false);
    let mut listener = mk_listener("web", "HTTP", 80);
    listener.allowed_routes = Some(AllowedRoutes {
        namespaces: None,
        kinds: Some(vec![
            RouteGroupKind::gateway("GRPCRoute"),
            RouteGroupKind::gateway("GRPCRoute"),
            RouteGroupKind::gateway("TCPRoute"),
        ]),
    });
    test.store.apply(mk_gateway("infra", "gw", [listener]));

    let resolution = test.resolve();
    let listener = &listeners(&resolution, "infra", "gw")[0];
    // Unsupported kinds are reported without detaching the listener.
    assert!(listener.attached);
    assert_eq!(
        listener.allowed_route_kinds,
        vec![RouteGroupKind::gateway("GRPCRoute")]
    );
    assert_condition(
        &listener.conditions,
        types::RESOLVED_REFS,
        false,
        reasons::INVALID_ROUTE_KINDS,
    );
}

#[test]
fn namespace_selector() {
    let mut test = TestConfig::new(false);
    let mut listener = mk_listener("web", "HTTP", 80);
    listener.allowed_routes = Some(AllowedRoutes {
        namespaces: Some(RouteNamespaces {
            from: Some(FromNamespaces::Selector),
            selector: Some(LabelSelector {
                match_labels: Some(btreemap! { "expose".to_string() => "true".to_string() }),
                ..Default::default()
            }),
        }),
        kinds: None,
    });
    test.store.apply(mk_gateway("infra", "gw", [listener]));
    for (name, expose) in [("apps", "true"), ("internal", "false")] {
        test.store.apply(Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(btreemap! { "expose".to_string() => expose.to_string() }),
                ..Default::default()
            },
            ..Default::default()
        });
    }

    let resolution = test.resolve();
    assert_eq!(
        listeners(&resolution, "infra", "gw")[0].allowed_namespaces,
        AllowedNamespaces::Only(["apps".to_string()].into_iter().collect())
    );
}

#[test]
fn selector_is_required() {
    let mut test = TestConfig::new(false);
    let mut listener = mk_listener("web", "HTTP", 80);
    listener.allowed_routes = Some(AllowedRoutes {
        namespaces: Some(RouteNamespaces {
            from: Some(FromNamespaces::Selector),
            selector: None,
        }),
        kinds: None,
    });
    test.store.apply(mk_gateway("infra", "gw", [listener]));

    let resolution = test.resolve();
    let listener = &listeners(&resolution, "infra", "gw")[0];
    assert!(!listener.attached);
    assert_condition(&listener.conditions, types::RESOLVED_REFS, false, reasons::INVALID);
}

#[test]
fn gateways_of_other_classes_are_ignored() {
    let mut test = TestConfig::new(false);
    test.store
        .apply(mk_gateway_class("other", "example.com/other-controller"));
    let mut gw = mk_gateway("infra", "other", [mk_listener("web", "HTTP", 80)]);
    gw.spec.gateway_class_name = "other".to_string();
    test.store.apply(gw);
    test.store
        .apply(mk_gateway("infra", "gw", [mk_listener("web", "HTTP", 80)]));

    let resolution = test.resolve();
    assert_eq!(resolution.gateway_classes, vec![(CLASS.to_string(), Some(1))]);
    assert_eq!(resolution.gateways.len(), 1);
    assert_eq!(resolution.gateways[0].gateway.name, "gw");
}
