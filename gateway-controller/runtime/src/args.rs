use crate::{
    core::{Configuration, DEFAULT_CONTROLLER_NAME},
    index::{ControllerConfig, EntryPoint, Registry, Resolver, Store, Stored},
    k8s::{
        gateway::{
            Gateway, GatewayClass, GrpcRoute, HttpRoute, ReferenceGrant, TcpRoute, TlsRoute,
            UdpRoute,
        },
        watcher, Client, Endpoints, Namespace, NamespaceResourceScope, Resource, Secret, Service,
    },
    status, Driver, Watches,
};
use anyhow::{bail, Result};
use clap::Parser;
use serde::de::DeserializeOwned;
use std::{fmt, sync::Arc};
use tokio::{
    sync::{mpsc, watch},
    time::Duration,
};
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "gateway", about = "A Gateway API resource controller")]
pub struct Args {
    #[clap(
        long,
        default_value = "gateway_controller=info,warn",
        env = "GATEWAY_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The `controllerName` of the GatewayClasses handled by this controller.
    #[clap(long, default_value = DEFAULT_CONTROLLER_NAME)]
    controller_name: String,

    /// The proxy's entry points, as `name=port`. A `/tls` suffix marks an
    /// entry point that terminates HTTP TLS and `/udp` a UDP entry point.
    #[clap(long, value_delimiter = ',', default_value = "web=80,websecure=443/tls")]
    entry_points: Vec<EntryPoint>,

    /// Enables TCP, TLS and UDP listeners and routes.
    #[clap(long)]
    experimental_channel: bool,

    /// Namespaces to watch. All namespaces are watched when empty.
    #[clap(long, value_delimiter = ',')]
    namespaces: Vec<String>,

    /// Restricts the watched GatewayClasses.
    #[clap(long)]
    label_selector: Option<String>,

    /// Sends traffic to Services' cluster IPs rather than their endpoints
    /// unless a Service opts out.
    #[clap(long)]
    native_lb_by_default: bool,

    #[clap(long)]
    allow_external_name_services: bool,

    /// IP address or hostname reported in Gateway statuses.
    #[clap(long)]
    status_address: Option<String>,

    /// Minimum interval between reconciliations. Changes that arrive within
    /// the interval are handled by a single reconciliation.
    #[clap(long, default_value = "0")]
    throttle_ms: u64,

    #[clap(long, default_value = "5000")]
    patch_timeout_ms: u64,

    #[clap(long, default_value = "1024")]
    event_queue_size: usize,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            controller_name,
            entry_points,
            experimental_channel,
            namespaces,
            label_selector,
            native_lb_by_default,
            allow_external_name_services,
            status_address,
            throttle_ms,
            patch_timeout_ms,
            event_queue_size,
        } = self;

        if entry_points.is_empty() {
            bail!("at least one entry point must be configured");
        }
        if event_queue_size == 0 {
            bail!("--event-queue-size must be positive");
        }

        let mut config = ControllerConfig::new(controller_name.clone(), entry_points);
        config.experimental_channel = experimental_channel;
        config.native_lb_by_default = native_lb_by_default;
        config.allow_external_name_services = allow_external_name_services;
        info!(
            controller = %config.controller_name,
            entry_points = ?config.entry_points.iter().map(|ep| &ep.name).collect::<Vec<_>>(),
            experimental = config.experimental_channel,
            "Starting"
        );

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder())
            .with_client(client)
            .build()
            .await?;

        let store = Store::shared();
        let (changes_tx, changes_rx) = mpsc::channel(event_queue_size);
        let watches = Watches::new(store.clone(), changes_tx);

        // Cluster-scoped kinds are always watched cluster-wide.
        let classes = match label_selector.as_deref() {
            Some(selector) => watcher::Config::default().labels(selector),
            None => watcher::Config::default(),
        };
        watch_cluster::<GatewayClass>(&mut runtime, &watches, classes);
        watch_cluster::<Namespace>(&mut runtime, &watches, watcher::Config::default());

        let client = runtime.client();
        watch::<Gateway>(&mut runtime, &watches, &namespaces);
        watch::<Service>(&mut runtime, &watches, &namespaces);
        watch::<Endpoints>(&mut runtime, &watches, &namespaces);
        watch::<Secret>(&mut runtime, &watches, &namespaces);

        if api_resource_exists::<HttpRoute>(&client).await {
            watch::<HttpRoute>(&mut runtime, &watches, &namespaces);
        }
        if api_resource_exists::<GrpcRoute>(&client).await {
            watch::<GrpcRoute>(&mut runtime, &watches, &namespaces);
        }
        if api_resource_exists::<ReferenceGrant>(&client).await {
            watch::<ReferenceGrant>(&mut runtime, &watches, &namespaces);
        }
        if experimental_channel {
            if api_resource_exists::<TcpRoute>(&client).await {
                watch::<TcpRoute>(&mut runtime, &watches, &namespaces);
            }
            if api_resource_exists::<TlsRoute>(&client).await {
                watch::<TlsRoute>(&mut runtime, &watches, &namespaces);
            }
            if api_resource_exists::<UdpRoute>(&client).await {
                watch::<UdpRoute>(&mut runtime, &watches, &namespaces);
            }
        }
        drop(watches);

        // Status patches are applied by a single controller task.
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let status_index =
            status::Index::shared(&controller_name, status_address.as_deref(), updates_tx);
        let status_controller = status::Controller::new(
            client,
            status_index.clone(),
            updates_rx,
            Duration::from_millis(patch_timeout_ms),
        );
        tokio::spawn(
            status_controller
                .process_updates()
                .instrument(info_span!("status_controller")),
        );

        let resolver = Resolver::new(Arc::new(config), Registry::default());
        let (driver, configs) = Driver::new(
            store,
            resolver,
            status_index,
            Duration::from_millis(throttle_ms),
        );
        tokio::spawn(
            driver
                .run(changes_rx, runtime.shutdown_handle())
                .instrument(info_span!("driver")),
        );
        tokio::spawn(log_configurations(configs).instrument(info_span!("configuration")));

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

/// Spawns a watch per configured namespace, or a single cluster-wide watch.
fn watch<T>(runtime: &mut kubert::Runtime, watches: &Watches, namespaces: &[String])
where
    T: Stored
        + Resource<Scope = NamespaceResourceScope>
        + DeserializeOwned
        + fmt::Debug
        + Send
        + Sync
        + 'static,
{
    let kind = T::kind(&());
    if namespaces.is_empty() {
        watches.expect::<T>(None);
        let events = runtime.watch_all::<T>(watcher::Config::default());
        tokio::spawn(
            watches
                .clone()
                .run(None, events)
                .instrument(info_span!("watch", %kind)),
        );
        return;
    }

    for ns in namespaces {
        watches.expect::<T>(Some(ns));
        let events = runtime.watch_namespaced::<T>(ns.clone(), watcher::Config::default());
        tokio::spawn(
            watches
                .clone()
                .run(Some(ns.clone()), events)
                .instrument(info_span!("watch", %kind, namespace = %ns)),
        );
    }
}

fn watch_cluster<T>(runtime: &mut kubert::Runtime, watches: &Watches, config: watcher::Config)
where
    T: Stored + DeserializeOwned + fmt::Debug + Send + Sync + 'static,
{
    let kind = T::kind(&());
    watches.expect::<T>(None);
    let events = runtime.watch_all::<T>(config);
    tokio::spawn(
        watches
            .clone()
            .run(None, events)
            .instrument(info_span!("watch", %kind)),
    );
}

async fn log_configurations(mut configs: watch::Receiver<Arc<Configuration>>) {
    while configs.changed().await.is_ok() {
        let config = configs.borrow_and_update().clone();
        info!(
            http.routers = config.http.routers.len(),
            http.services = config.http.services.len(),
            tcp.routers = config.tcp.routers.len(),
            udp.routers = config.udp.routers.len(),
            certificates = config.tls.certificates.len(),
            "Configuration updated"
        );
    }
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    let exists = client
        .list_api_group_resources(&T::api_version(&dt))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt));
    if !exists {
        tracing::warn!(kind = %T::kind(&dt), "Resource kind not found, skipping watches");
    }
    exists
}
