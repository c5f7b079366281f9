//! controller-pause
//!
//! Runs a single pause or resume pass for the controllers declared by a
//! ResourceSet manifest. Invoked by the backup/restore pipeline right before
//! cluster state is captured and right after it has been restored.
//!
//! Usage: controller-pause <pause|resume> <resourceset.yaml>

use std::sync::Arc;

use anyhow::{bail, Context};
use kube::Client;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use controller_pause::{
    client::KubeResolver,
    config::Config,
    crd::ResourceSet,
    metrics,
    snapshot::ConfigMapReplicaStore,
    Coordinator, ReferenceError, Settings, WorkloadRef,
};

#[derive(Clone, Copy, Debug)]
enum Mode {
    Pause,
    Resume,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let (mode, manifest) = match (args.next().as_deref(), args.next()) {
        (Some("pause"), Some(path)) => (Mode::Pause, path),
        (Some("resume"), Some(path)) => (Mode::Resume, path),
        _ => bail!("usage: controller-pause <pause|resume> <resourceset.yaml>"),
    };

    let config = Config::load().context("loading configuration")?;
    info!(?mode, manifest = %manifest, snapshot = %format!("{}/{}", config.snapshot_namespace, config.snapshot_name), "Starting controller-pause");

    let raw = tokio::fs::read_to_string(&manifest)
        .await
        .with_context(|| format!("reading {}", manifest))?;
    let mut resource_set: ResourceSet =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", manifest))?;
    let references: Vec<WorkloadRef> = resource_set
        .spec
        .controller_references
        .iter()
        .map(WorkloadRef::from)
        .collect();

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let shutdown = CancellationToken::new();
    if let Some(port) = config.metrics_port {
        tokio::spawn(metrics::serve(port, shutdown.clone()));
    }
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let coordinator = Coordinator::new(
        Arc::new(KubeResolver::new(client.clone())),
        Arc::new(ConfigMapReplicaStore::new(
            client,
            config.snapshot_name.clone(),
            config.snapshot_namespace.clone(),
        )),
        Settings::from(&config),
    )
    .with_cancellation(shutdown.child_token());

    let errors = match mode {
        Mode::Pause => {
            // Pause always captures fresh counts from the live objects.
            let references = references
                .into_iter()
                .map(|mut r| {
                    r.captured_replicas = None;
                    r
                })
                .collect();
            let outcome = coordinator.pause_references(references).await;
            resource_set.spec.record_captured(&outcome.paused);
            print!("{}", serde_yaml::to_string(&resource_set)?);
            outcome.errors
        }
        Mode::Resume => coordinator.resume(references).await.errors,
    };

    shutdown.cancel();
    report(&errors);

    if !errors.is_empty() {
        bail!("{} controller(s) failed", errors.len());
    }
    Ok(())
}

fn report(errors: &[ReferenceError]) {
    for e in errors {
        error!(identity = %e.identity, kind = e.error.kind(), error = %e.error, "Controller needs attention");
    }
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();
}

/// Stop starting new controllers on SIGTERM or SIGINT
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received CTRL+C signal, finishing in-flight controllers"),
        _ = terminate => info!("Received SIGTERM signal, finishing in-flight controllers"),
        _ = token.cancelled() => return,
    }
    token.cancel();
}
