// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use axum::{
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use beacon::{
    association::controller::reconcile_dashboard_association,
    config::{IpFamily, OperatorConfig},
    constants::{
        DEFAULT_CONTAINER_REGISTRY, DEFAULT_METRICS_BIND_ADDRESS, DEFAULT_REQUEUE_AFTER_SECS,
        ERROR_REQUEUE_DURATION_SECS, TOKIO_THREAD_NAME, TOKIO_WORKER_THREADS,
    },
    context::Context,
    crd::{Beat, Dashboard},
    metrics::gather_metrics,
    names::NamespacedName,
    platform::client::{KubeEventSink, KubePlatform},
    reconcilers::{self, reconcile_beat, reconcile_dashboard, Results},
    watches::{DynamicWatches, WatchRegistry},
};
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment},
    core::v1::{Secret, Service, ServiceAccount},
};
use kube::{
    runtime::{
        controller::Action,
        reflector::ObjectRef,
        watcher::{self, Config},
        Controller, WatchStreamExt,
    },
    Api, Client, Resource, ResourceExt,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

type KubeContext = Arc<Context<KubePlatform>>;

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

/// Beacon operator: reconciles Beats and Dashboards.
#[derive(Debug, Parser)]
#[command(name = "beacon", version, about)]
struct Args {
    /// IP family of the cluster network
    #[arg(long, value_enum, default_value_t = IpFamily::Ipv4)]
    ip_family: IpFamily,

    /// Create a service account and cluster role binding for Beats without one
    #[arg(long)]
    manage_autodiscover_rbac: bool,

    /// Seconds between periodic reconciles of a healthy resource
    #[arg(long, default_value_t = DEFAULT_REQUEUE_AFTER_SECS)]
    requeue_after: u64,

    /// Registry default images are pulled from
    #[arg(long, default_value = DEFAULT_CONTAINER_REGISTRY)]
    container_registry: String,

    /// Address the metrics and health endpoints listen on
    #[arg(long, default_value = DEFAULT_METRICS_BIND_ADDRESS)]
    metrics_bind_address: String,
}

impl Args {
    fn operator_config(&self) -> OperatorConfig {
        OperatorConfig {
            ip_family: self.ip_family,
            manage_autodiscover_rbac: self.manage_autodiscover_rbac,
            requeue_after: Duration::from_secs(self.requeue_after),
            container_registry: self.container_registry.trim_end_matches('/').to_string(),
            metrics_bind_address: self.metrics_bind_address.clone(),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name(TOKIO_THREAD_NAME)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args.operator_config()))
}

/// Initialize logging.
///
/// Respects `RUST_LOG` (default `info`) and `RUST_LOG_FORMAT` (`json` or `text`).
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(config: OperatorConfig) -> Result<()> {
    init_tracing();

    info!("Starting Beacon operator");
    debug!(?config, "Operator configuration");

    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized");

    // One registry shared by every controller: the Beat controller registers dashboard
    // targets that the association controller maps back.
    let watches = Arc::new(DynamicWatches::new());
    let context = |client: &Client| {
        Arc::new(Context::new(
            KubePlatform::new(client.clone()),
            watches.clone(),
            Arc::new(KubeEventSink::new(client.clone())),
            config.clone(),
        ))
    };
    let beat_ctx = context(&client);
    let dashboard_ctx = context(&client);
    let association_ctx = context(&client);

    info!("Starting all controllers");

    tokio::select! {
        result = run_beat_controller(client.clone(), beat_ctx.clone()) => {
            error!("CRITICAL: Beat controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Beat controller exited unexpectedly without error")
        }
        result = run_dashboard_controller(client.clone(), dashboard_ctx.clone()) => {
            error!("CRITICAL: Dashboard controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Dashboard controller exited unexpectedly without error")
        }
        result = run_dashboard_association_controller(client.clone(), association_ctx) => {
            error!("CRITICAL: Dashboard association controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Dashboard association controller exited unexpectedly without error")
        }
        result = run_beat_deletion_watcher(client.clone(), beat_ctx) => {
            error!("CRITICAL: Beat deletion watcher exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Beat deletion watcher exited unexpectedly without error")
        }
        result = run_dashboard_deletion_watcher(client.clone(), dashboard_ctx) => {
            error!("CRITICAL: Dashboard deletion watcher exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Dashboard deletion watcher exited unexpectedly without error")
        }
        result = run_metrics_server(config.metrics_bind_address.clone()) => {
            error!("CRITICAL: Metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Metrics server exited unexpectedly without error")
        }
        result = shutdown_signal() => {
            result?;
            info!("Shutdown signal received, stopping controllers");
            Ok(())
        }
    }
}

/// Resolves when SIGTERM or SIGINT is received.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = terminate.recv() => {}
            result = tokio::signal::ctrl_c() => result?,
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}

/// Maps a changed object to the resources of kind `K` that registered a watch on it.
fn watched_owners<K>(registry: &WatchRegistry, namespace: &str, name: &str) -> Vec<ObjectRef<K>>
where
    K: Resource<DynamicType = ()>,
{
    registry
        .owners_of(&K::kind(&()), &NamespacedName::new(namespace, name))
        .into_iter()
        .map(|owner| ObjectRef::new(&owner.name).within(&owner.namespace))
        .collect()
}

fn nsn_of<K: ResourceExt>(object: &K) -> NamespacedName {
    NamespacedName::new(object.namespace().unwrap_or_default(), object.name_any())
}

/// Run the `Beat` controller
async fn run_beat_controller(client: Client, ctx: KubeContext) -> Result<()> {
    info!("Starting Beat controller");

    let watches = ctx.watches.clone();
    Controller::new(Api::<Beat>::all(client.clone()), Config::default())
        .owns(Api::<DaemonSet>::all(client.clone()), Config::default())
        .owns(Api::<Deployment>::all(client.clone()), Config::default())
        .owns(Api::<ServiceAccount>::all(client.clone()), Config::default())
        .owns(Api::<Secret>::all(client.clone()), Config::default())
        .watches(Api::<Secret>::all(client), Config::default(), move |secret| {
            watched_owners::<Beat>(
                &watches.secrets,
                &secret.namespace().unwrap_or_default(),
                &secret.name_any(),
            )
        })
        .run(reconcile_beat_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Run the `Dashboard` controller
async fn run_dashboard_controller(client: Client, ctx: KubeContext) -> Result<()> {
    info!("Starting Dashboard controller");

    let watches = ctx.watches.clone();
    Controller::new(Api::<Dashboard>::all(client.clone()), Config::default())
        .owns(Api::<Deployment>::all(client.clone()), Config::default())
        .owns(Api::<Service>::all(client.clone()), Config::default())
        .owns(Api::<Secret>::all(client.clone()), Config::default())
        .watches(Api::<Secret>::all(client), Config::default(), move |secret| {
            watched_owners::<Dashboard>(
                &watches.secrets,
                &secret.namespace().unwrap_or_default(),
                &secret.name_any(),
            )
        })
        .run(reconcile_dashboard_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Run the controller writing the `dashboard-conf` annotation of Beats
async fn run_dashboard_association_controller(client: Client, ctx: KubeContext) -> Result<()> {
    info!("Starting Dashboard association controller");

    let watches = ctx.watches.clone();
    Controller::new(Api::<Beat>::all(client.clone()), Config::default())
        .watches(
            Api::<Dashboard>::all(client),
            Config::default(),
            move |dashboard| {
                watched_owners::<Beat>(
                    &watches.dashboards,
                    &dashboard.namespace().unwrap_or_default(),
                    &dashboard.name_any(),
                )
            },
        )
        .run(reconcile_dashboard_association_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Cleans up after deleted Beats.
///
/// The controller never sees an object once it is gone, so deletions are observed on a
/// plain watch.
async fn run_beat_deletion_watcher(client: Client, ctx: KubeContext) -> Result<()> {
    info!("Starting Beat deletion watcher");

    let mut events = watcher::watcher(Api::<Beat>::all(client), Config::default())
        .default_backoff()
        .boxed();
    while let Some(event) = events.next().await {
        match event {
            Ok(watcher::Event::Delete(beat)) => {
                let nsn = nsn_of(&beat);
                info!("Beat {nsn} deleted, cleaning up");
                if let Err(e) =
                    reconcilers::beat::on_delete(ctx.as_ref(), &nsn, Some(beat.spec.r#type.as_str())).await
                {
                    warn!("Failed to clean up deleted Beat {nsn}: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Beat watch error: {e}"),
        }
    }

    Ok(())
}

/// Cleans up after deleted Dashboards.
async fn run_dashboard_deletion_watcher(client: Client, ctx: KubeContext) -> Result<()> {
    info!("Starting Dashboard deletion watcher");

    let mut events = watcher::watcher(Api::<Dashboard>::all(client), Config::default())
        .default_backoff()
        .boxed();
    while let Some(event) = events.next().await {
        match event {
            Ok(watcher::Event::Delete(dashboard)) => {
                let nsn = nsn_of(&dashboard);
                info!("Dashboard {nsn} deleted, cleaning up");
                if let Err(e) = reconcilers::dashboard::on_delete(ctx.as_ref(), &nsn).await {
                    warn!("Failed to clean up deleted Dashboard {nsn}: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Dashboard watch error: {e}"),
        }
    }

    Ok(())
}

/// Serve `/metrics` and `/healthz`
async fn run_metrics_server(bind_address: String) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { (StatusCode::OK, "ok") }));

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Serving metrics on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(CONTENT_TYPE, "text/plain")],
            e.to_string(),
        ),
    }
}

/// Turns the outcome of a reconcile into the next requeue.
fn action_for(results: &Results) -> Action {
    results
        .requeue_after()
        .map_or_else(Action::await_change, Action::requeue)
}

async fn reconcile_beat_wrapper(beat: Arc<Beat>, ctx: KubeContext) -> Result<Action, ReconcileError> {
    let nsn = nsn_of(beat.as_ref());
    match reconcile_beat(ctx.as_ref(), &nsn).await {
        Ok(results) => {
            debug!("Reconciled Beat {nsn}");
            Ok(action_for(&results))
        }
        Err(e) => {
            error!("Failed to reconcile Beat {nsn}: {e}");
            Err(anyhow::Error::from(e).into())
        }
    }
}

async fn reconcile_dashboard_wrapper(
    dashboard: Arc<Dashboard>,
    ctx: KubeContext,
) -> Result<Action, ReconcileError> {
    let nsn = nsn_of(dashboard.as_ref());
    match reconcile_dashboard(ctx.as_ref(), &nsn).await {
        Ok(results) => {
            debug!("Reconciled Dashboard {nsn}");
            Ok(action_for(&results))
        }
        Err(e) => {
            error!("Failed to reconcile Dashboard {nsn}: {e}");
            Err(anyhow::Error::from(e).into())
        }
    }
}

async fn reconcile_dashboard_association_wrapper(
    beat: Arc<Beat>,
    ctx: KubeContext,
) -> Result<Action, ReconcileError> {
    match reconcile_dashboard_association(ctx.as_ref(), &beat).await {
        Ok(outcome) => {
            debug!(?outcome, "Reconciled dashboard association of Beat {}", nsn_of(beat.as_ref()));
            Ok(Action::await_change())
        }
        Err(e) => {
            error!(
                "Failed to reconcile dashboard association of Beat {}: {e}",
                nsn_of(beat.as_ref())
            );
            Err(anyhow::Error::from(e).into())
        }
    }
}

/// Requeue delay of a failed reconcile.
///
/// Conflicts requeue immediately, transient failures after a delay. Errors only the
/// user can fix wait for the next change of the resource or a watched object.
fn requeue_for(err: &ReconcileError) -> Action {
    match err.0.downcast_ref::<beacon::errors::Error>() {
        Some(e) => e
            .requeue_after()
            .map_or_else(Action::await_change, Action::requeue),
        None => Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS)),
    }
}

/// Error policy for controller
fn error_policy<K>(_resource: Arc<K>, err: &ReconcileError, _ctx: KubeContext) -> Action {
    requeue_for(err)
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod main_tests;
