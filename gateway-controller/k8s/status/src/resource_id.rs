use gateway_controller_k8s_api::{
    gateway::{Gateway, GatewayClass, GrpcRoute, HttpRoute, TcpRoute, TlsRoute, UdpRoute},
    Resource,
};
use std::borrow::Cow;

/// Identifies an object whose status is written by this controller.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct ResourceId {
    pub kind: ResourceKind,
    /// Empty for cluster-scoped kinds.
    pub namespace: String,
    pub name: String,
}

#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum ResourceKind {
    GatewayClass,
    Gateway,
    HttpRoute,
    GrpcRoute,
    TcpRoute,
    TlsRoute,
    UdpRoute,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, namespace: String, name: String) -> Self {
        Self {
            kind,
            namespace,
            name,
        }
    }

    pub fn gateway_class(name: String) -> Self {
        Self::new(ResourceKind::GatewayClass, String::new(), name)
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}

// === impl ResourceKind ===

impl ResourceKind {
    /// Maps a route kind name to its status target.
    pub fn route(kind: &str) -> Option<Self> {
        match kind {
            "HTTPRoute" => Some(Self::HttpRoute),
            "GRPCRoute" => Some(Self::GrpcRoute),
            "TCPRoute" => Some(Self::TcpRoute),
            "TLSRoute" => Some(Self::TlsRoute),
            "UDPRoute" => Some(Self::UdpRoute),
            _ => None,
        }
    }

    pub fn api_version(&self) -> Cow<'static, str> {
        match self {
            Self::GatewayClass => GatewayClass::api_version(&()),
            Self::Gateway => Gateway::api_version(&()),
            Self::HttpRoute => HttpRoute::api_version(&()),
            Self::GrpcRoute => GrpcRoute::api_version(&()),
            Self::TcpRoute => TcpRoute::api_version(&()),
            Self::TlsRoute => TlsRoute::api_version(&()),
            Self::UdpRoute => UdpRoute::api_version(&()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GatewayClass => "GatewayClass",
            Self::Gateway => "Gateway",
            Self::HttpRoute => "HTTPRoute",
            Self::GrpcRoute => "GRPCRoute",
            Self::TcpRoute => "TCPRoute",
            Self::TlsRoute => "TLSRoute",
            Self::UdpRoute => "UDPRoute",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}
