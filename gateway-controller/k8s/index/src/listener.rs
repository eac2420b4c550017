use crate::{
    reference_grant::{is_reference_granted, Reference},
    resolver::Context,
    EntryPoint, EntryPointProtocol,
};
use ahash::AHashSet as HashSet;
use gateway_controller_core::{
    conditions::{reasons, types},
    config::Certificate,
    AllowedNamespaces, ListenerProtocol, ObjectRef, ResolvedListener,
};
use gateway_controller_k8s_api::{
    gateway::{
        FromNamespaces, Gateway, GatewayTlsConfig, Listener, RouteGroupKind, TlsMode, GROUP,
        KIND_GATEWAY, KIND_SECRET,
    },
    Labels, Namespace, ResourceExt, Secret, Selector, CORE_GROUP,
};
use std::collections::BTreeSet;

const KIND_HTTP_ROUTE: &str = "HTTPRoute";
const KIND_GRPC_ROUTE: &str = "GRPCRoute";
const KIND_TCP_ROUTE: &str = "TCPRoute";
const KIND_TLS_ROUTE: &str = "TLSRoute";
const KIND_UDP_ROUTE: &str = "UDPRoute";

/// Resolves every listener of a Gateway, in declaration order, along with
/// the certificates its TLS listeners terminate with.
pub(crate) fn resolve(
    ctx: &Context<'_>,
    id: &ObjectRef,
    gateway: &Gateway,
) -> (Vec<ResolvedListener>, Vec<Certificate>) {
    let generation = gateway.metadata.generation;
    let mut allocated = HashSet::new();
    let mut certificates = Vec::new();

    let listeners = gateway
        .spec
        .listeners
        .iter()
        .map(|listener| {
            let mut resolved = ResolvedListener::new(
                id.clone(),
                generation,
                listener.name.clone(),
                listener.port,
            );
            resolved.protocol = ListenerProtocol::parse(&listener.protocol);
            resolved.hostname = listener.hostname.clone().filter(|h| !h.is_empty());
            resolved.tls_mode = listener
                .tls
                .as_ref()
                .map(|tls| tls.mode.unwrap_or_default());

            if let Some(cert) = resolve_listener(ctx, listener, &mut resolved, &mut allocated) {
                certificates.push(cert);
            }
            if !resolved.conditions.is_empty() {
                tracing::debug!(
                    gateway = %id,
                    listener = %listener.name,
                    conditions = ?resolved.conditions,
                    "Listener not valid"
                );
            }
            resolved
        })
        .collect();

    (listeners, certificates)
}

/// Runs the listener checks in order, stopping at the first fatal failure.
/// Returns the listener's certificate when it terminates TLS.
fn resolve_listener(
    ctx: &Context<'_>,
    listener: &Listener,
    resolved: &mut ResolvedListener,
    allocated: &mut HashSet<(String, String, u16)>,
) -> Option<Certificate> {
    let generation = resolved.generation;
    let gateway = resolved.gateway.clone();
    let fail = |resolved: &mut ResolvedListener,
                type_: &str,
                status: bool,
                reason: &str,
                message: String| {
        resolved
            .conditions
            .push(ctx.condition(type_, status, reason, message, generation));
    };

    match entry_point(&ctx.config.entry_points, listener.port, &resolved.protocol) {
        Some(ep) => resolved.entry_point = Some(ep.name.clone()),
        None => {
            fail(
                resolved,
                types::ACCEPTED,
                false,
                reasons::PORT_UNAVAILABLE,
                format!(
                    "no entry point matches port {} and protocol {}",
                    listener.port, resolved.protocol
                ),
            );
            return None;
        }
    }

    match allowed_namespaces(ctx, &gateway.namespace, listener) {
        Ok(namespaces) => resolved.allowed_namespaces = namespaces,
        Err(error) => {
            fail(
                resolved,
                types::RESOLVED_REFS,
                false,
                reasons::INVALID,
                format!("invalid allowed routes namespace selector: {error}"),
            );
            return None;
        }
    }

    let supported = match supported_kinds(&resolved.protocol, ctx.config.experimental_channel) {
        Ok(kinds) => kinds,
        Err(message) => {
            fail(
                resolved,
                types::CONFLICTED,
                true,
                reasons::UNSUPPORTED_PROTOCOL,
                message,
            );
            return None;
        }
    };

    let (kinds, invalid) = allowed_kinds(listener, &supported);
    resolved.allowed_route_kinds = kinds;
    if !invalid.is_empty() {
        fail(
            resolved,
            types::RESOLVED_REFS,
            false,
            reasons::INVALID_ROUTE_KINDS,
            format!("unsupported route kinds: {}", invalid.join(", ")),
        );
    }

    let key = (
        resolved.protocol.to_string(),
        resolved.hostname.clone().unwrap_or_default(),
        listener.port,
    );
    if !allocated.insert(key) {
        fail(
            resolved,
            types::CONFLICTED,
            true,
            reasons::HOSTNAME_CONFLICT,
            "another listener has the same protocol, hostname and port".to_string(),
        );
        return None;
    }

    let certificate = match resolved.protocol {
        ListenerProtocol::Http | ListenerProtocol::Tcp | ListenerProtocol::Udp => {
            if listener.tls.is_some() {
                fail(
                    resolved,
                    types::ACCEPTED,
                    false,
                    reasons::INVALID_TLS_CONFIGURATION,
                    format!("{} listeners must not have a TLS configuration", resolved.protocol),
                );
                return None;
            }
            None
        }

        ListenerProtocol::Https | ListenerProtocol::Tls => {
            let Some(tls) = listener.tls.as_ref() else {
                fail(
                    resolved,
                    types::ACCEPTED,
                    false,
                    reasons::INVALID_TLS_CONFIGURATION,
                    format!("{} listeners must have a TLS configuration", resolved.protocol),
                );
                return None;
            };

            match tls.mode.unwrap_or_default() {
                TlsMode::Passthrough if resolved.protocol == ListenerProtocol::Https => {
                    fail(
                        resolved,
                        types::ACCEPTED,
                        false,
                        reasons::INVALID_TLS_CONFIGURATION,
                        "HTTPS listeners must terminate TLS".to_string(),
                    );
                    return None;
                }
                TlsMode::Passthrough => None,
                TlsMode::Terminate => match certificate(ctx, &gateway.namespace, tls) {
                    Ok(cert) => Some(cert),
                    Err((reason, message)) => {
                        fail(resolved, types::RESOLVED_REFS, false, reason, message.clone());
                        fail(resolved, types::PROGRAMMED, false, reasons::INVALID, message);
                        return None;
                    }
                },
            }
        }

        // Rejected with the supported kinds.
        ListenerProtocol::Other(_) => return None,
    };

    resolved.attached = true;
    certificate
}

/// Finds the entry point bound to a listener's port. Entry points are
/// searched in name order.
fn entry_point<'e>(
    entry_points: &'e [EntryPoint],
    port: u16,
    protocol: &ListenerProtocol,
) -> Option<&'e EntryPoint> {
    entry_points.iter().find(|ep| {
        ep.port == port
            && match protocol {
                ListenerProtocol::Http => ep.protocol == EntryPointProtocol::Tcp,
                ListenerProtocol::Udp => ep.protocol == EntryPointProtocol::Udp,
                _ => ep.protocol != EntryPointProtocol::Udp,
            }
    })
}

fn allowed_namespaces(
    ctx: &Context<'_>,
    gateway_namespace: &str,
    listener: &Listener,
) -> anyhow::Result<AllowedNamespaces> {
    let namespaces = listener
        .allowed_routes
        .as_ref()
        .and_then(|ar| ar.namespaces.as_ref());

    match namespaces.and_then(|ns| ns.from).unwrap_or_default() {
        FromNamespaces::All => Ok(AllowedNamespaces::All),
        FromNamespaces::Same => Ok(AllowedNamespaces::Only(BTreeSet::from([
            gateway_namespace.to_string(),
        ]))),
        FromNamespaces::Selector => {
            let selector = namespaces
                .and_then(|ns| ns.selector.as_ref())
                .ok_or_else(|| anyhow::anyhow!("a selector is required when from is Selector"))?;
            let selector = Selector::try_from(selector)?;
            let names = ctx
                .store
                .iter::<Namespace>()
                .filter(|(_, ns)| selector.matches(&Labels::from(ns.metadata.labels.clone())))
                .map(|(_, ns)| ns.name_any())
                .collect::<BTreeSet<_>>();
            Ok(AllowedNamespaces::Only(names))
        }
    }
}

fn supported_kinds(
    protocol: &ListenerProtocol,
    experimental: bool,
) -> Result<Vec<RouteGroupKind>, String> {
    let kinds: &[&str] = match protocol {
        ListenerProtocol::Http | ListenerProtocol::Https => &[KIND_HTTP_ROUTE, KIND_GRPC_ROUTE],
        ListenerProtocol::Tcp if experimental => &[KIND_TCP_ROUTE],
        ListenerProtocol::Tls if experimental => &[KIND_TLS_ROUTE, KIND_TCP_ROUTE],
        ListenerProtocol::Udp if experimental => &[KIND_UDP_ROUTE],
        ListenerProtocol::Tcp | ListenerProtocol::Tls | ListenerProtocol::Udp => {
            return Err(format!(
                "{protocol} listeners require the experimental channel to be enabled"
            ))
        }
        ListenerProtocol::Other(p) => return Err(format!("unsupported listener protocol {p}")),
    };
    Ok(kinds.iter().map(|k| RouteGroupKind::gateway(k)).collect())
}

/// Intersects the listener's explicit allowed kinds with the kinds its
/// protocol supports. Returns the allowed kinds and the unsupported ones.
fn allowed_kinds(
    listener: &Listener,
    supported: &[RouteGroupKind],
) -> (Vec<RouteGroupKind>, Vec<String>) {
    let explicit = listener
        .allowed_routes
        .as_ref()
        .and_then(|ar| ar.kinds.as_deref())
        .unwrap_or_default();
    if explicit.is_empty() {
        return (supported.to_vec(), vec![]);
    }

    let mut kinds = Vec::new();
    let mut invalid = Vec::new();
    for kind in explicit {
        let found = supported
            .iter()
            .find(|s| s.group() == kind.group() && s.kind == kind.kind);
        match found {
            Some(s) if !kinds.contains(s) => kinds.push(s.clone()),
            Some(_) => {}
            None => invalid.push(format!("{}/{}", kind.group(), kind.kind)),
        }
    }
    (kinds, invalid)
}

/// Loads the single certificate a terminating listener references.
fn certificate(
    ctx: &Context<'_>,
    gateway_namespace: &str,
    tls: &GatewayTlsConfig,
) -> Result<Certificate, (&'static str, String)> {
    let refs = tls.certificate_refs.as_deref().unwrap_or_default();
    let [cert_ref] = refs else {
        return Err((
            reasons::INVALID_CERTIFICATE_REF,
            format!("expected exactly one certificate reference, found {}", refs.len()),
        ));
    };

    if cert_ref.group() != CORE_GROUP || cert_ref.kind() != KIND_SECRET {
        return Err((
            reasons::INVALID_CERTIFICATE_REF,
            format!(
                "unsupported certificate reference {}/{}",
                cert_ref.group(),
                cert_ref.kind()
            ),
        ));
    }

    let namespace = cert_ref.namespace.as_deref().unwrap_or(gateway_namespace);
    is_reference_granted(
        ctx.store,
        Reference {
            group: GROUP,
            kind: KIND_GATEWAY,
            namespace: gateway_namespace,
        },
        Reference {
            group: CORE_GROUP,
            kind: KIND_SECRET,
            namespace,
        },
        &cert_ref.name,
    )
    .map_err(|error| (reasons::REF_NOT_PERMITTED, error.to_string()))?;

    let secret = ctx
        .store
        .get::<Secret>(namespace, &cert_ref.name)
        .ok_or_else(|| {
            (
                reasons::INVALID_CERTIFICATE_REF,
                format!("secret {namespace}/{} not found", cert_ref.name),
            )
        })?;

    let field = |key: &str| {
        secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .filter(|v| !v.0.is_empty())
            .and_then(|v| String::from_utf8(v.0.clone()).ok())
            .ok_or_else(|| {
                (
                    reasons::INVALID_CERTIFICATE_REF,
                    format!("secret {namespace}/{} has no valid {key}", cert_ref.name),
                )
            })
    };

    Ok(Certificate {
        cert_file: field("tls.crt")?,
        key_file: field("tls.key")?,
    })
}
