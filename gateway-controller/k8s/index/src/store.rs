//! A snapshot of the watched cluster state.
//!
//! Watches apply their events to the store; every reconciliation pass reads
//! the whole snapshot. Objects are kept in ordered maps so that iterating
//! the store is deterministic.

use gateway_controller_core::ObjectRef;
use gateway_controller_k8s_api::{
    gateway::{
        Gateway, GatewayClass, GrpcRoute, HttpRoute, ReferenceGrant, TcpRoute, TlsRoute, UdpRoute,
    },
    Endpoints, Namespace, Resource, ResourceExt, Secret, Service,
};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

pub type SharedStore = Arc<RwLock<Store>>;

pub type Objects<T> = BTreeMap<ObjectRef, T>;

#[derive(Debug, Default)]
pub struct Store {
    gateway_classes: Objects<GatewayClass>,
    gateways: Objects<Gateway>,
    http_routes: Objects<HttpRoute>,
    grpc_routes: Objects<GrpcRoute>,
    tcp_routes: Objects<TcpRoute>,
    tls_routes: Objects<TlsRoute>,
    udp_routes: Objects<UdpRoute>,
    reference_grants: Objects<ReferenceGrant>,
    services: Objects<Service>,
    endpoints: Objects<Endpoints>,
    secrets: Objects<Secret>,
    namespaces: Objects<Namespace>,

    /// Watches that must deliver their initial list before the store is
    /// considered synced, keyed by kind and watched namespace.
    pending: BTreeSet<WatchScope>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct WatchScope {
    kind: String,
    namespace: Option<String>,
}

/// A resource kind held by the [`Store`].
pub trait Stored: Resource<DynamicType = ()> + Clone + Sized {
    fn objects(store: &Store) -> &Objects<Self>;
    fn objects_mut(store: &mut Store) -> &mut Objects<Self>;
}

// === impl Store ===

impl Store {
    pub fn shared() -> SharedStore {
        Arc::new(RwLock::new(Self::default()))
    }

    /// Registers a watch whose initial list must be observed before
    /// [`Store::is_synced`] returns true. `namespace` is `None` for a
    /// cluster-wide watch.
    pub fn expect_sync<T: Stored>(&mut self, namespace: Option<&str>) {
        self.pending.insert(WatchScope::of::<T>(namespace));
    }

    pub fn is_synced(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn apply<T: Stored>(&mut self, obj: T) {
        let key = key(&obj);
        T::objects_mut(self).insert(key, obj);
    }

    pub fn delete<T: Stored>(&mut self, namespace: Option<&str>, name: &str) {
        let key = ObjectRef::new(namespace.unwrap_or_default(), name);
        T::objects_mut(self).remove(&key);
    }

    /// Replaces every object of a kind within the watched namespace (or the
    /// whole cluster) with the given list, and marks that watch as synced.
    pub fn reset<T: Stored>(&mut self, namespace: Option<&str>, objs: Vec<T>) {
        let objects = T::objects_mut(self);
        match namespace {
            None => objects.clear(),
            Some(ns) => objects.retain(|k, _| k.namespace != ns),
        }
        for obj in objs {
            objects.insert(key(&obj), obj);
        }
        self.pending.remove(&WatchScope::of::<T>(namespace));
    }

    pub fn get<T: Stored>(&self, namespace: &str, name: &str) -> Option<&T> {
        T::objects(self).get(&ObjectRef::new(namespace, name))
    }

    pub fn get_cluster<T: Stored>(&self, name: &str) -> Option<&T> {
        self.get("", name)
    }

    /// Iterates over all objects of a kind, ordered by namespace and name.
    pub fn iter<'a, T: Stored + 'a>(&'a self) -> impl Iterator<Item = (&'a ObjectRef, &'a T)> {
        T::objects(self).iter()
    }

    /// Iterates over the objects of a kind in a single namespace.
    pub fn in_namespace<'s, T: Stored + 's>(
        &'s self,
        namespace: &'s str,
    ) -> impl Iterator<Item = &'s T> {
        T::objects(self)
            .range(ObjectRef::new(namespace, "")..)
            .take_while(move |(k, _)| k.namespace == namespace)
            .map(|(_, v)| v)
    }
}

fn key<T: Resource>(obj: &T) -> ObjectRef {
    ObjectRef::new(obj.namespace().unwrap_or_default(), obj.name_any())
}

impl WatchScope {
    fn of<T: Stored>(namespace: Option<&str>) -> Self {
        Self {
            kind: T::kind(&()).into_owned(),
            namespace: namespace.map(ToString::to_string),
        }
    }
}

macro_rules! stored {
    ($($ty:ty => $field:ident),+ $(,)?) => {
        $(
            impl Stored for $ty {
                fn objects(store: &Store) -> &Objects<Self> {
                    &store.$field
                }

                fn objects_mut(store: &mut Store) -> &mut Objects<Self> {
                    &mut store.$field
                }
            }
        )+
    };
}

stored! {
    GatewayClass => gateway_classes,
    Gateway => gateways,
    HttpRoute => http_routes,
    GrpcRoute => grpc_routes,
    TcpRoute => tcp_routes,
    TlsRoute => tls_routes,
    UdpRoute => udp_routes,
    ReferenceGrant => reference_grants,
    Service => services,
    Endpoints => endpoints,
    Secret => secrets,
    Namespace => namespaces,
}
