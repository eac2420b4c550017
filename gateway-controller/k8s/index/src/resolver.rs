use crate::{listener, registry::Registry, routes, store::Store, ControllerConfig};
use chrono::{DateTime, Utc};
use gateway_controller_core::{conditions, Configuration, ObjectRef, ResolvedListener};
use gateway_controller_k8s_api::{
    gateway::{
        Gateway, GatewayClass, GrpcRoute, HttpRoute, ParentReference, TcpRoute, TlsRoute,
        UdpRoute,
    },
    Condition,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

/// Turns a store snapshot into a proxy configuration and the status of
/// every object the controller is responsible for.
#[derive(Debug)]
pub struct Resolver {
    config: Arc<ControllerConfig>,
    registry: Registry,
}

/// The outcome of a single resolution pass.
#[derive(Debug, Default)]
pub struct Resolution {
    pub configuration: Configuration,

    /// GatewayClasses naming this controller, with their generations.
    pub gateway_classes: Vec<(String, Option<i64>)>,

    /// Gateways of handled classes, ordered by namespace and name.
    pub gateways: Vec<GatewayResolution>,

    /// Routes with at least one parent reference to a handled Gateway.
    pub routes: BTreeMap<RouteId, RouteResolution>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GatewayResolution {
    pub gateway: ObjectRef,
    pub generation: Option<i64>,
    pub listeners: Vec<ResolvedListener>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouteId {
    pub kind: &'static str,
    pub namespace: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteResolution {
    pub generation: Option<i64>,
    /// One entry per parent reference handled by this controller, in
    /// declaration order.
    pub parents: Vec<RouteParentResolution>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteParentResolution {
    pub parent_ref: ParentReference,
    pub conditions: Vec<Condition>,
}

/// Everything a resolution pass reads.
pub(crate) struct Context<'a> {
    pub store: &'a Store,
    pub config: &'a ControllerConfig,
    pub registry: &'a Registry,
    pub now: DateTime<Utc>,
}

// === impl Resolver ===

impl Resolver {
    pub fn new(config: Arc<ControllerConfig>, registry: Registry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Resolves the store snapshot. Conditions are stamped with `now`.
    pub fn resolve(&self, store: &Store, now: DateTime<Utc>) -> Resolution {
        let ctx = Context {
            store,
            config: &self.config,
            registry: &self.registry,
            now,
        };

        let gateway_classes = store
            .iter::<GatewayClass>()
            .filter(|(_, class)| class.spec.controller_name == self.config.controller_name)
            .map(|(id, class)| (id.name.clone(), class.metadata.generation))
            .collect::<Vec<_>>();
        let handled = gateway_classes
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<BTreeSet<_>>();

        let mut configuration = Configuration::default();
        let mut gateways = Vec::new();
        let mut foreign = BTreeSet::new();
        for (id, gateway) in store.iter::<Gateway>() {
            if !handled.contains(gateway.spec.gateway_class_name.as_str()) {
                foreign.insert(id.clone());
                continue;
            }

            let (listeners, certificates) = listener::resolve(&ctx, id, gateway);
            for cert in certificates {
                configuration.tls.add_certificate(cert);
            }
            gateways.push(GatewayResolution {
                gateway: id.clone(),
                generation: gateway.metadata.generation,
                listeners,
            });
        }

        let mut routes = BTreeMap::new();
        let mut pass = routes::Pass {
            ctx: &ctx,
            gateways: &mut gateways,
            foreign: &foreign,
            configuration: &mut configuration,
            statuses: &mut routes,
        };
        pass.resolve::<HttpRoute>();
        pass.resolve::<GrpcRoute>();
        if self.config.experimental_channel {
            pass.resolve::<TcpRoute>();
            pass.resolve::<TlsRoute>();
            pass.resolve::<UdpRoute>();
        }

        tracing::debug!(
            gateways = gateways.len(),
            routes = routes.len(),
            http_routers = configuration.http.routers.len(),
            tcp_routers = configuration.tcp.routers.len(),
            udp_routers = configuration.udp.routers.len(),
            "Resolved"
        );

        Resolution {
            configuration,
            gateway_classes,
            gateways,
            routes,
        }
    }
}

// === impl Context ===

impl Context<'_> {
    pub(crate) fn condition(
        &self,
        type_: &str,
        status: bool,
        reason: &str,
        message: impl Into<String>,
        generation: Option<i64>,
    ) -> Condition {
        conditions::new(type_, status, reason, message, generation, self.now)
    }
}
