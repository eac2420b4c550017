pub mod gateway_class;
pub mod gateways;
pub mod grpcroute;
pub mod httproute;
pub mod reference_grant;
pub mod tcproute;
pub mod tlsroute;
pub mod udproute;

pub use self::{
    gateway_class::{GatewayClass, GatewayClassSpec, GatewayClassStatus},
    gateways::{
        AllowedRoutes, FromNamespaces, Gateway, GatewaySpec, GatewayStatus, GatewayStatusAddress,
        GatewayTlsConfig, Listener, ListenerStatus, RouteGroupKind, RouteNamespaces,
        SecretObjectReference, TlsMode,
    },
    grpcroute::{GrpcRoute, GrpcRouteSpec},
    httproute::{HttpRoute, HttpRouteSpec},
    reference_grant::{ReferenceGrant, ReferenceGrantSpec},
    tcproute::{TcpRoute, TcpRouteSpec},
    tlsroute::{TlsRoute, TlsRouteSpec},
    udproute::{UdpRoute, UdpRouteSpec},
};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const GROUP: &str = "gateway.networking.k8s.io";

pub const KIND_GATEWAY: &str = "Gateway";
pub const KIND_SERVICE: &str = "Service";
pub const KIND_SECRET: &str = "Secret";

/// ParentReference identifies an API object (usually a Gateway) that can be
/// considered a parent of this resource (usually a route).
///
/// The parent namespace defaults to the namespace of the route when omitted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    pub name: String,

    /// SectionName is the name of a section within the target resource. For
    /// Gateways this is the listener name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,

    /// Port is the network port this route targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// BackendRef defines how a route should forward a request to a Kubernetes
/// resource.
///
/// When the group and kind are omitted the reference targets a core
/// `Service`, and `port` is then required.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackendRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Weight specifies the proportion of requests forwarded to the
    /// referenced backend. Defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

/// RouteStatus defines the observed state shared by all route kinds.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatus {
    #[serde(default)]
    pub parents: Vec<RouteParentStatus>,
}

/// RouteParentStatus describes the status of a route with respect to an
/// associated parent.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteParentStatus {
    pub parent_ref: ParentReference,

    /// ControllerName is a domain/path string that indicates the name of the
    /// controller that wrote this status.
    pub controller_name: String,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

// === impl BackendRef ===

impl BackendRef {
    pub fn group(&self) -> &str {
        crate::group_or_core(self.group.as_deref())
    }

    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(KIND_SERVICE)
    }

    pub fn is_core_service(&self) -> bool {
        self.group() == crate::CORE_GROUP && self.kind() == KIND_SERVICE
    }

    pub fn namespace_or<'a>(&'a self, default: &'a str) -> &'a str {
        match self.namespace.as_deref() {
            None | Some("") => default,
            Some(ns) => ns,
        }
    }

    pub fn weight(&self) -> u32 {
        self.weight.unwrap_or(1)
    }
}

// === impl ParentReference ===

impl ParentReference {
    pub fn group(&self) -> &str {
        self.group.as_deref().unwrap_or(GROUP)
    }

    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(KIND_GATEWAY)
    }

    pub fn namespace_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default)
    }
}
