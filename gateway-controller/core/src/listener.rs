use crate::ObjectRef;
use gateway_controller_k8s_api::{
    gateway::{RouteGroupKind, TlsMode},
    Condition,
};
use std::collections::BTreeSet;

/// A Gateway listener after validation, rebuilt on every pass.
///
/// A listener with `attached` unset still reports status (and counts the
/// routes that select it), but no configuration is derived from it.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedListener {
    pub gateway: ObjectRef,
    pub generation: Option<i64>,

    pub name: String,
    pub port: u16,
    pub protocol: ListenerProtocol,
    pub hostname: Option<String>,
    pub tls_mode: Option<TlsMode>,

    pub attached: bool,
    pub entry_point: Option<String>,
    pub allowed_namespaces: AllowedNamespaces,
    /// Deduplicated, in declaration order. Reported as `supportedKinds`.
    pub allowed_route_kinds: Vec<RouteGroupKind>,

    /// Failures found while resolving the listener. Empty when the listener
    /// is valid.
    pub conditions: Vec<Condition>,
    pub attached_routes: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ListenerProtocol {
    Http,
    Https,
    Tcp,
    Tls,
    Udp,
    Other(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AllowedNamespaces {
    All,
    Only(BTreeSet<String>),
    #[default]
    None,
}

// === impl ResolvedListener ===

impl ResolvedListener {
    pub fn new(gateway: ObjectRef, generation: Option<i64>, name: String, port: u16) -> Self {
        Self {
            gateway,
            generation,
            name,
            port,
            protocol: ListenerProtocol::Http,
            hostname: None,
            tls_mode: None,
            attached: false,
            entry_point: None,
            allowed_namespaces: AllowedNamespaces::None,
            allowed_route_kinds: Vec::new(),
            conditions: Vec::new(),
            attached_routes: 0,
        }
    }

    pub fn allows_kind(&self, group: &str, kind: &str) -> bool {
        self.allowed_route_kinds
            .iter()
            .any(|k| k.group() == group && k.kind == kind)
    }

    /// Returns true if the listener terminates TLS for the routes it serves.
    pub fn terminates_tls(&self) -> bool {
        match self.protocol {
            ListenerProtocol::Https => true,
            ListenerProtocol::Tls => self.tls_mode == Some(TlsMode::Terminate),
            _ => false,
        }
    }
}

// === impl ListenerProtocol ===

impl ListenerProtocol {
    pub fn parse(protocol: &str) -> Self {
        match protocol {
            "HTTP" => Self::Http,
            "HTTPS" => Self::Https,
            "TCP" => Self::Tcp,
            "TLS" => Self::Tls,
            "UDP" => Self::Udp,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
            Self::Tcp => "TCP",
            Self::Tls => "TLS",
            Self::Udp => "UDP",
            Self::Other(other) => other,
        }
    }
}

impl std::fmt::Display for ListenerProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

// === impl AllowedNamespaces ===

impl AllowedNamespaces {
    pub fn allows(&self, namespace: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(namespaces) => namespaces.contains(namespace),
            Self::None => false,
        }
    }
}
