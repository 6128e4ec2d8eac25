//! AppMetadata controller - validates and tracks ApplicationMetadata resources

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};

use appmetadata::config::{ControllerConfig, DEFAULT_CONFIG_PATH};
use appmetadata::controller::{error_policy, reconcile, Context};
use appmetadata::crd::ApplicationMetadata;
use appmetadata::engine::{EngineConfig, ReconcileEngine};
use appmetadata::metrics::AppMetrics;
use appmetadata::probe::{AlwaysHealthy, HttpRepositoryProbe};
use appmetadata::telemetry::{init_telemetry, TelemetryConfig};

/// Server-side watch timeout; must stay below the client read timeout
const WATCH_TIMEOUT_SECS: u32 = 25;

/// AppMetadata controller - keeps ApplicationMetadata status in sync with reality
#[derive(Parser, Debug)]
#[command(name = "appmetadata-controller", version, about, long_about = None)]
struct Cli {
    /// Print the CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Path to the controller config file
    #[arg(long, env = "CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Only watch this namespace (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&ApplicationMetadata::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let config = ControllerConfig::load(&cli.config)?;
    init_telemetry(TelemetryConfig::from(&config))?;

    run_controller(config, cli.namespace).await
}

async fn run_controller(config: ControllerConfig, namespace: Option<String>) -> anyhow::Result<()> {
    tracing::info!(
        reconcile_interval = config.reconcile_interval,
        probe_timeout = config.probe_timeout,
        "AppMetadata controller starting..."
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let engine = Arc::new(ReconcileEngine::new(
        EngineConfig::from(&config),
        Arc::new(HttpRepositoryProbe::new(config.probe_timeout())?),
        Arc::new(AlwaysHealthy),
        Arc::new(AppMetrics::new()),
    ));
    let ctx = Arc::new(Context::new(client.clone(), engine, &config));

    let apps: Api<ApplicationMetadata> = match &namespace {
        Some(ns) => {
            tracing::info!(namespace = %ns, "Watching a single namespace");
            Api::namespaced(client, ns)
        }
        None => Api::all(client),
    };

    Controller::new(apps, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("ApplicationMetadata"))
        .await;

    tracing::info!("AppMetadata controller shutting down");
    Ok(())
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
