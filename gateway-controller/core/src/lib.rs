#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod conditions;
pub mod config;
pub mod hostname;
pub mod http_route;
pub mod listener;
pub mod priority;
pub mod rule;

pub use self::{
    config::{ConfigHash, Configuration},
    listener::{AllowedNamespaces, ListenerProtocol, ResolvedListener},
};

pub const DEFAULT_CONTROLLER_NAME: &str = "gateway-controller.io/gateway-controller";

/// Identifies a namespaced object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
