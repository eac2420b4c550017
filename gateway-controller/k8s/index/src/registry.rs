//! Extension points for backend and filter kinds the resolver does not know.
//!
//! A host registers builders keyed by API group and kind. The registry is
//! owned by the [`crate::Resolver`], so independent resolvers (for instance
//! in tests) never share registrations.

use ahash::AHashMap as HashMap;
use gateway_controller_core::config::{Middleware, Service};

/// Resolves a backend reference of a registered kind.
///
/// Receives the referenced object's name and namespace. Returns the name of
/// the service routers should forward to and, when the service is not
/// defined elsewhere, its definition.
pub type BackendBuilder =
    Box<dyn Fn(&str, &str) -> anyhow::Result<(String, Option<Service>)> + Send + Sync>;

/// Resolves an `ExtensionRef` filter of a registered kind.
///
/// Receives the referenced object's name and namespace. Returns the name of
/// the middleware to apply and, when the middleware is not defined
/// elsewhere, its definition.
pub type FilterBuilder =
    Box<dyn Fn(&str, &str) -> anyhow::Result<(String, Option<Middleware>)> + Send + Sync>;

#[derive(Default)]
pub struct Registry {
    backends: HashMap<GroupKind, BackendBuilder>,
    filters: HashMap<GroupKind, FilterBuilder>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct GroupKind {
    group: String,
    kind: String,
}

// === impl Registry ===

impl Registry {
    /// Registers a backend builder. Registering the same kind twice replaces
    /// the previous builder.
    pub fn register_backend<F>(&mut self, group: &str, kind: &str, builder: F)
    where
        F: Fn(&str, &str) -> anyhow::Result<(String, Option<Service>)> + Send + Sync + 'static,
    {
        self.backends
            .insert(GroupKind::new(group, kind), Box::new(builder));
    }

    /// Registers a filter builder. Registering the same kind twice replaces
    /// the previous builder.
    pub fn register_filter<F>(&mut self, group: &str, kind: &str, builder: F)
    where
        F: Fn(&str, &str) -> anyhow::Result<(String, Option<Middleware>)> + Send + Sync + 'static,
    {
        self.filters
            .insert(GroupKind::new(group, kind), Box::new(builder));
    }

    pub fn backend(&self, group: &str, kind: &str) -> Option<&BackendBuilder> {
        self.backends.get(&GroupKind::new(group, kind))
    }

    pub fn filter(&self, group: &str, kind: &str) -> Option<&FilterBuilder> {
        self.filters.get(&GroupKind::new(group, kind))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl GroupKind {
    fn new(group: &str, kind: &str) -> Self {
        Self {
            group: gateway_controller_k8s_api::group_or_core(Some(group)).to_string(),
            kind: kind.to_string(),
        }
    }
}
