//! ApplicationMetadata controller
//!
//! Binds the [`ReconcileEngine`] to `kube::runtime::Controller`. This module
//! decides which engine entry point a watch event maps to, persists the
//! composed status and manages the metrics finalizer. All Kubernetes access
//! goes through the [`KubeClient`] trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::config::ControllerConfig;
use crate::crd::{ApplicationMetadata, ApplicationMetadataStatus, ConditionType};
use crate::engine::{ReconcileEngine, ResourceKey, Trigger};
use crate::status::reasons;
use crate::{Error, FIELD_MANAGER, METRICS_FINALIZER};

/// Requeue delay after a retryable error
pub const RETRY_DELAY: Duration = Duration::from_secs(30);

/// Trait abstracting Kubernetes client operations for ApplicationMetadata
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Replace the status of an ApplicationMetadata
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ApplicationMetadataStatus,
    ) -> Result<(), Error>;

    /// Add a finalizer if it is not already present
    async fn add_finalizer(&self, namespace: &str, name: &str, finalizer: &str)
        -> Result<(), Error>;

    /// Remove a finalizer if present
    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<ApplicationMetadata> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ApplicationMetadataStatus,
    ) -> Result<(), Error> {
        let status = serde_json::to_value(status)
            .map_err(|e| Error::serialization(format!("status of {}/{}: {}", namespace, name, e)))?;
        let status_patch = serde_json::json!({
            "status": status
        });

        self.api(namespace)
            .patch_status(
                name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&status_patch),
            )
            .await?;

        Ok(())
    }

    async fn add_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api = self.api(namespace);

        let app = api.get(name).await?;
        let mut finalizers = app.metadata.finalizers.unwrap_or_default();
        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;

        Ok(())
    }

    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api = self.api(namespace);

        let app = match api.get(name).await {
            Ok(app) => app,
            Err(kube::Error::Api(ae)) if ae.code == 404 => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let finalizers: Vec<String> = app
            .metadata
            .finalizers
            .as_ref()
            .map(|f| f.iter().filter(|s| *s != finalizer).cloned().collect())
            .unwrap_or_default();

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;

        Ok(())
    }
}

/// Controller context shared across reconciliations
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Engine computing statuses
    pub engine: Arc<ReconcileEngine>,
    /// Interval between timer-driven passes
    pub reconcile_interval: Duration,
    /// Whether composed statuses are written back
    pub auto_status_updates: bool,
}

impl Context {
    /// Create a new controller context with the given Kubernetes client
    pub fn new(client: Client, engine: Arc<ReconcileEngine>, config: &ControllerConfig) -> Self {
        Self::for_testing(Arc::new(KubeClientImpl::new(client)), engine, config)
    }

    /// Create a context with a custom KubeClient
    ///
    /// Primarily for unit tests, where a mock client stands in for the
    /// API server.
    pub fn for_testing(
        kube: Arc<dyn KubeClient>,
        engine: Arc<ReconcileEngine>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            kube,
            engine,
            reconcile_interval: config.reconcile_interval(),
            auto_status_updates: config.validation.auto_status_updates,
        }
    }
}

/// How a watch event maps onto the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Run a full pass with the given trigger
    Run(Trigger),
    /// The last pass is recent; wait out the remainder of the interval
    NotDue(Duration),
}

/// Classify a watch event
///
/// - no status yet, or only the initializing status of a create that never
///   finished: create
/// - status observed an older generation: update
/// - otherwise: timer, once the interval since the last pass has elapsed
///
/// Writing the status itself produces a watch event. Those events land in
/// the last case before the interval is up and are not run.
pub fn classify(app: &ApplicationMetadata, interval: Duration) -> Dispatch {
    let Some(status) = &app.status else {
        return Dispatch::Run(Trigger::Create);
    };
    if status.observed_generation != app.metadata.generation {
        return Dispatch::Run(Trigger::Update);
    }
    let initializing = status
        .get_condition(ConditionType::Ready)
        .is_some_and(|c| c.reason() == reasons::INITIALIZING);
    if initializing {
        return Dispatch::Run(Trigger::Create);
    }

    let elapsed = status
        .last_updated
        .and_then(|at| (Utc::now() - at).to_std().ok())
        .unwrap_or(interval);
    if elapsed >= interval {
        Dispatch::Run(Trigger::Timer)
    } else {
        Dispatch::NotDue(interval - elapsed)
    }
}

fn has_finalizer(app: &ApplicationMetadata) -> bool {
    app.finalizers().iter().any(|f| f == METRICS_FINALIZER)
}

async fn ensure_finalizer(
    app: &ApplicationMetadata,
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> Result<(), Error> {
    if has_finalizer(app) {
        return Ok(());
    }
    debug!("adding metrics finalizer");
    ctx.kube
        .add_finalizer(namespace, name, METRICS_FINALIZER)
        .await
}

/// Reconcile an ApplicationMetadata
#[instrument(skip_all, fields(app = %app.name_any()))]
pub async fn reconcile(app: Arc<ApplicationMetadata>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = app.name_any();
    let namespace = app.namespace().ok_or_else(|| {
        Error::internal_with_context("controller", "ApplicationMetadata has no namespace")
    })?;
    let key = ResourceKey::new(&namespace, &name);

    if app.metadata.deletion_timestamp.is_some() {
        ctx.engine.on_delete(&key);
        if has_finalizer(&app) {
            ctx.kube
                .remove_finalizer(&namespace, &name, METRICS_FINALIZER)
                .await?;
        }
        return Ok(Action::await_change());
    }

    let generation = app.metadata.generation;
    let status = match classify(&app, ctx.reconcile_interval) {
        Dispatch::NotDue(remaining) => {
            debug!(?remaining, "last pass is recent, skipping");
            return Ok(Action::requeue(remaining));
        }
        Dispatch::Run(Trigger::Create) => {
            info!("new application");
            // An invalid resource gets no finalizer, so its rejection is
            // counted once rather than again for the finalizer's watch event
            let initial = ctx.engine.initial_status(&key, &app.spec, generation)?;
            ensure_finalizer(&app, &ctx, &namespace, &name).await?;
            if ctx.auto_status_updates {
                ctx.kube.patch_status(&namespace, &name, &initial).await?;
            }
            ctx.engine.on_create(&key, &app.spec, generation).await?
        }
        Dispatch::Run(Trigger::Update) => {
            info!("application spec changed");
            ensure_finalizer(&app, &ctx, &namespace, &name).await?;
            ctx.engine.on_update(&key, &app.spec, generation).await?
        }
        Dispatch::Run(Trigger::Timer) => {
            ensure_finalizer(&app, &ctx, &namespace, &name).await?;
            ctx.engine.on_timer(&key, &app.spec, generation).await?
        }
    };

    if ctx.auto_status_updates {
        ctx.kube.patch_status(&namespace, &name, &status).await?;
    }

    Ok(Action::requeue(ctx.reconcile_interval))
}

/// Error policy for the controller
///
/// Validation failures wait for the author to change the spec. Everything
/// else is retried after [`RETRY_DELAY`].
pub fn error_policy(app: Arc<ApplicationMetadata>, error: &Error, _ctx: Arc<Context>) -> Action {
    if error.is_retryable() {
        warn!(
            error = %error,
            kind = error.kind(),
            app = %app.name_any(),
            "reconciliation failed, retrying"
        );
        Action::requeue(RETRY_DELAY)
    } else {
        error!(
            error = %error,
            kind = error.kind(),
            app = %app.name_any(),
            "reconciliation failed permanently for this generation"
        );
        Action::await_change()
    }
}
