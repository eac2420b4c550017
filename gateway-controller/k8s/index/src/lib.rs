//! Gateway resource resolution.
//!
//! Every pass reads a snapshot of the watched resources from the [`Store`]
//! and rebuilds the proxy configuration from scratch:
//!
//! - `GatewayClass`es naming this controller are accepted, and each `Gateway`
//!   of an accepted class has its listeners resolved to entry points.
//! - Routes select listeners through their parent references. An accepted
//!   route on an attached listener contributes routers, middlewares and
//!   services; every parent reference gets a status entry either way.
//! - Backend references resolve to Service endpoints, or through the
//!   extension [`Registry`] for other kinds.
//!
//! ```text
//! [ GatewayClass ] <- [ Gateway ] <- [ *Route ] -> [ Service ] -> [ Endpoints ]
//!                        |               |
//!                        v               v
//!                   [ Secret ]    [ ReferenceGrant ]
//! ```
//!
//! Resolution never fails as a whole: a listener, route or backend that
//! cannot be resolved is reported in status and degrades its own part of
//! the configuration.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod backend;
mod listener;
mod reference_grant;
pub mod registry;
mod resolver;
mod routes;
pub mod store;

#[cfg(test)]
mod tests;

pub use self::{
    backend::BackendError,
    reference_grant::{is_reference_granted, RefNotPermitted, Reference},
    registry::Registry,
    resolver::{
        GatewayResolution, Resolution, Resolver, RouteId, RouteParentResolution, RouteResolution,
    },
    store::{SharedStore, Store, Stored},
};

/// Annotation that enables native load balancing for a Service: traffic is
/// sent to the cluster IP instead of the individual endpoints.
pub const NATIVE_LB_ANNOTATION: &str = "gateway-controller.io/service.nativelb";

/// Holds the provider-wide settings used by every resolution pass.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Value of `GatewayClass.spec.controllerName` handled by this instance.
    pub controller_name: String,

    /// The data plane's listening sockets, sorted by name.
    pub entry_points: Vec<EntryPoint>,

    /// Enables TCP, TLS and UDP listeners and their routes.
    pub experimental_channel: bool,

    pub native_lb_by_default: bool,
    pub allow_external_name_services: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryPoint {
    pub name: String,
    pub port: u16,
    pub protocol: EntryPointProtocol,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EntryPointProtocol {
    Tcp,
    /// A TCP entry point that terminates HTTP TLS itself. Plain HTTP
    /// listeners cannot use it.
    HttpTls,
    Udp,
}

// === impl ControllerConfig ===

impl ControllerConfig {
    pub fn new(controller_name: impl Into<String>, mut entry_points: Vec<EntryPoint>) -> Self {
        entry_points.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            controller_name: controller_name.into(),
            entry_points,
            experimental_channel: false,
            native_lb_by_default: false,
            allow_external_name_services: false,
        }
    }
}

// === impl EntryPoint ===

impl std::str::FromStr for EntryPoint {
    type Err = anyhow::Error;

    /// Parses `name=port`, optionally suffixed with `/tls` or `/udp`.
    fn from_str(s: &str) -> anyhow::Result<Self> {
        let (name, addr) = s
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("entry point {s:?} must be formatted as name=port"))?;
        if name.is_empty() {
            anyhow::bail!("entry point {s:?} has no name");
        }
        let (port, protocol) = match addr.split_once('/') {
            None => (addr, EntryPointProtocol::Tcp),
            Some((port, "tls")) => (port, EntryPointProtocol::HttpTls),
            Some((port, "udp")) => (port, EntryPointProtocol::Udp),
            Some((_, proto)) => {
                anyhow::bail!("entry point {name:?} has unknown protocol {proto:?}")
            }
        };
        Ok(Self {
            name: name.to_string(),
            port: port.parse()?,
            protocol,
        })
    }
}
