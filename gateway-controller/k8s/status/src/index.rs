use crate::{
    gateway,
    resource_id::{ResourceId, ResourceKind},
    routes,
};
use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use gateway_controller_k8s_api::{
    self as k8s,
    gateway::{
        Gateway, GatewayClass, GatewayClassStatus, GatewayStatus, GatewayStatusAddress, GrpcRoute,
        HttpRoute, RouteStatus, TcpRoute, TlsRoute, UdpRoute,
    },
    NamespaceResourceScope, Resource,
};
use gateway_controller_k8s_index::{Resolution, Store};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt, sync::Arc, time::Duration};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub const STATUS_FIELD_MANAGER: &str = "gateway-controller";

pub type SharedIndex = Arc<RwLock<Index>>;

/// Applies queued status patches.
pub struct Controller {
    client: k8s::Client,
    index: SharedIndex,
    updates: UnboundedReceiver<Update>,
    patch_timeout: Duration,
}

/// Tracks the statuses this controller has written but not yet observed.
pub struct Index {
    controller_name: String,
    addresses: Vec<GatewayStatusAddress>,
    updates: UnboundedSender<Update>,

    gateway_classes: HashMap<ResourceId, GatewayClassStatus>,
    gateways: HashMap<ResourceId, GatewayStatus>,
    routes: HashMap<ResourceId, RouteStatus>,
}

#[derive(Debug, PartialEq)]
pub struct Update {
    pub id: ResourceId,
    pub patch: k8s::Patch<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
enum PatchError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Api(#[from] k8s::Error),
}

// === impl Controller ===

impl Controller {
    pub fn new(
        client: k8s::Client,
        index: SharedIndex,
        updates: UnboundedReceiver<Update>,
        patch_timeout: Duration,
    ) -> Self {
        Self {
            client,
            index,
            updates,
            patch_timeout,
        }
    }

    /// Runs until every [`Index`] holding the update sender is dropped.
    ///
    /// A failed write is not retried here: the index forgets it, so the next
    /// reconciliation that still finds the status out of date queues it
    /// again.
    pub async fn process_updates(mut self) {
        let params = k8s::PatchParams::apply(STATUS_FIELD_MANAGER);

        while let Some(Update { id, patch }) = self.updates.recv().await {
            let patched =
                tokio::time::timeout(self.patch_timeout, self.patch(&id, &params, &patch));
            let error = match patched.await {
                Ok(Ok(())) => {
                    tracing::debug!(%id, "Patched status");
                    continue;
                }
                Ok(Err(error)) => PatchError::Api(error),
                Err(_) => PatchError::Timeout(self.patch_timeout),
            };
            tracing::error!(%id, %error, "Failed to patch status");
            self.index.write().forget(&id);
        }
        tracing::debug!("Status updates closed");
    }

    async fn patch(
        &self,
        id: &ResourceId,
        params: &k8s::PatchParams,
        patch: &k8s::Patch<serde_json::Value>,
    ) -> Result<(), k8s::Error> {
        let client = self.client.clone();
        match id.kind {
            ResourceKind::GatewayClass => {
                k8s::Api::<GatewayClass>::all(client)
                    .patch_status(&id.name, params, patch)
                    .await?;
                Ok(())
            }
            ResourceKind::Gateway => patch_namespaced::<Gateway>(client, id, params, patch).await,
            ResourceKind::HttpRoute => {
                patch_namespaced::<HttpRoute>(client, id, params, patch).await
            }
            ResourceKind::GrpcRoute => {
                patch_namespaced::<GrpcRoute>(client, id, params, patch).await
            }
            ResourceKind::TcpRoute => patch_namespaced::<TcpRoute>(client, id, params, patch).await,
            ResourceKind::TlsRoute => patch_namespaced::<TlsRoute>(client, id, params, patch).await,
            ResourceKind::UdpRoute => patch_namespaced::<UdpRoute>(client, id, params, patch).await,
        }
    }
}

async fn patch_namespaced<T>(
    client: k8s::Client,
    id: &ResourceId,
    params: &k8s::PatchParams,
    patch: &k8s::Patch<serde_json::Value>,
) -> Result<(), k8s::Error>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + fmt::Debug,
{
    k8s::Api::<T>::namespaced(client, &id.namespace)
        .patch_status(&id.name, params, patch)
        .await?;
    Ok(())
}

// === impl Index ===

impl Index {
    pub fn shared(
        controller_name: impl ToString,
        status_address: Option<&str>,
        updates: UnboundedSender<Update>,
    ) -> SharedIndex {
        Arc::new(RwLock::new(Self {
            controller_name: controller_name.to_string(),
            addresses: status_address
                .map(gateway::status_address)
                .into_iter()
                .collect(),
            updates,
            gateway_classes: HashMap::new(),
            gateways: HashMap::new(),
            routes: HashMap::new(),
        }))
    }

    /// Queues a patch for every status that differs from the one observed in
    /// the store.
    pub fn reconcile(&mut self, resolution: &Resolution, store: &Store, now: DateTime<Utc>) {
        for (name, generation) in &resolution.gateway_classes {
            let id = ResourceId::gateway_class(name.clone());
            let observed = store
                .get_cluster::<GatewayClass>(name)
                .and_then(|c| c.status.as_ref());
            let prior = self.gateway_classes.get(&id).or(observed);
            let desired = gateway::class_status(prior, *generation, now);
            update(&mut self.gateway_classes, &self.updates, id, desired, observed);
        }

        for resolved in &resolution.gateways {
            let gw = &resolved.gateway;
            let id = ResourceId::new(ResourceKind::Gateway, gw.namespace.clone(), gw.name.clone());
            let observed = store
                .get::<Gateway>(&gw.namespace, &gw.name)
                .and_then(|g| g.status.as_ref());
            let prior = self.gateways.get(&id).or(observed);
            let desired = gateway::gateway_status(resolved, prior, &self.addresses, now);
            update(&mut self.gateways, &self.updates, id, desired, observed);
        }

        for (route, resolved) in &resolution.routes {
            let Some(kind) = ResourceKind::route(route.kind) else {
                tracing::debug!(kind = route.kind, "Skipping status of unknown route kind");
                continue;
            };
            let id = ResourceId::new(kind, route.namespace.clone(), route.name.clone());
            let observed = routes::observed(store, kind, &route.namespace, &route.name);
            let prior = self.routes.get(&id).or(observed);
            let desired = routes::route_status(&self.controller_name, resolved, prior);
            update(&mut self.routes, &self.updates, id, desired, observed);
        }
    }

    /// Drops a pending write so that the next pass compares against the
    /// observed status again.
    pub fn forget(&mut self, id: &ResourceId) {
        match id.kind {
            ResourceKind::GatewayClass => {
                self.gateway_classes.remove(id);
            }
            ResourceKind::Gateway => {
                self.gateways.remove(id);
            }
            _ => {
                self.routes.remove(id);
            }
        }
    }
}

/// Queues a patch unless `desired` has already been observed or is already
/// queued.
fn update<S>(
    pending: &mut HashMap<ResourceId, S>,
    updates: &UnboundedSender<Update>,
    id: ResourceId,
    desired: S,
    observed: Option<&S>,
) where
    S: Clone + PartialEq + Serialize,
{
    if observed == Some(&desired) {
        pending.remove(&id);
        return;
    }
    if pending.get(&id) == Some(&desired) {
        return;
    }

    let patch = make_patch(&id, &desired);
    pending.insert(id.clone(), desired);
    if let Err(error) = updates.send(Update {
        id: id.clone(),
        patch,
    }) {
        tracing::error!(%id, %error, "Failed to send status patch");
        pending.remove(&id);
    }
}

pub(crate) fn make_patch(id: &ResourceId, status: impl Serialize) -> k8s::Patch<serde_json::Value> {
    let value = serde_json::json!({
        "apiVersion": id.kind.api_version(),
        "kind": id.kind.as_str(),
        "status": status,
    });
    k8s::Patch::Merge(value)
}
