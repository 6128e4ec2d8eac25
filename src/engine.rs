//! Reconcile engine
//!
//! One reconciliation pass for one resource: validate, check dependencies,
//! probe the repository and components concurrently under a shared
//! deadline, compose the status and report it to metrics. The engine knows
//! nothing about the controller runtime that calls it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

use crate::config::ControllerConfig;
use crate::crd::{ApplicationMetadataSpec, ApplicationMetadataStatus};
use crate::dependencies::check_dependency_graph;
use crate::metrics::{MetricsEmitter, ReconcileResult};
use crate::probe::{ComponentHealth, ComponentHealthProbe, Reachability, RepositoryProbe};
use crate::status::{self, Observations, RepositoryObservation};
use crate::validation::{self, ValidatedSpec};
use crate::{Error, DEFAULT_PROBE_TIMEOUT_SECS};

/// Identity of a resource: namespace and name
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    /// Resource namespace
    pub namespace: String,
    /// Resource name
    pub name: String,
}

impl ResourceKey {
    /// Create a key
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// What caused a reconciliation pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// The resource was just created
    Create,
    /// The spec changed
    Update,
    /// The periodic resync fired
    Timer,
}

impl Trigger {
    /// Metric label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Timer => "timer",
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check settings for the engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Report missing dependencies as a blocked status
    pub strict_dependency_checks: bool,
    /// Also report dependency cycles
    pub reject_dependency_cycles: bool,
    /// Probe the tracked repository
    pub verify_git_repos: bool,
    /// Shared deadline for all probes of one pass
    pub probe_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_dependency_checks: true,
            reject_dependency_cycles: false,
            verify_git_repos: true,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
        }
    }
}

impl From<&ControllerConfig> for EngineConfig {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            strict_dependency_checks: config.validation.strict_dependency_checks,
            reject_dependency_cycles: config.validation.reject_dependency_cycles,
            verify_git_repos: config.validation.verify_git_repos,
            probe_timeout: config.probe_timeout(),
        }
    }
}

/// Computes the status of ApplicationMetadata resources
///
/// Holds no per-resource state; passes for different resources may run
/// concurrently on the same engine.
pub struct ReconcileEngine {
    config: EngineConfig,
    repository_probe: Arc<dyn RepositoryProbe>,
    health_probe: Arc<dyn ComponentHealthProbe>,
    metrics: Arc<dyn MetricsEmitter>,
}

impl ReconcileEngine {
    /// Create an engine from its collaborators
    pub fn new(
        config: EngineConfig,
        repository_probe: Arc<dyn RepositoryProbe>,
        health_probe: Arc<dyn ComponentHealthProbe>,
        metrics: Arc<dyn MetricsEmitter>,
    ) -> Self {
        Self {
            config,
            repository_probe,
            health_probe,
            metrics,
        }
    }

    /// Status to persist as soon as a resource is first seen
    ///
    /// The spec must be valid; no probes run.
    pub fn initial_status(
        &self,
        key: &ResourceKey,
        spec: &ApplicationMetadataSpec,
        generation: Option<i64>,
    ) -> Result<ApplicationMetadataStatus, Error> {
        let validated = self.validate(key, spec)?;
        Ok(status::initial_status(
            &key.name,
            &validated.version,
            generation,
            Utc::now(),
        ))
    }

    /// Full pass for a newly created resource
    pub async fn on_create(
        &self,
        key: &ResourceKey,
        spec: &ApplicationMetadataSpec,
        generation: Option<i64>,
    ) -> Result<ApplicationMetadataStatus, Error> {
        self.reconcile(Trigger::Create, key, spec, generation).await
    }

    /// Full pass after a spec change
    pub async fn on_update(
        &self,
        key: &ResourceKey,
        spec: &ApplicationMetadataSpec,
        generation: Option<i64>,
    ) -> Result<ApplicationMetadataStatus, Error> {
        self.reconcile(Trigger::Update, key, spec, generation).await
    }

    /// Full pass on the periodic resync
    pub async fn on_timer(
        &self,
        key: &ResourceKey,
        spec: &ApplicationMetadataSpec,
        generation: Option<i64>,
    ) -> Result<ApplicationMetadataStatus, Error> {
        self.reconcile(Trigger::Timer, key, spec, generation).await
    }

    /// Forget a deleted resource; no status is composed
    #[instrument(skip_all, fields(app = %key))]
    pub fn on_delete(&self, key: &ResourceKey) {
        info!("application deleted, removing from metrics");
        self.metrics.remove(key);
    }

    #[instrument(skip_all, fields(app = %key, trigger = %trigger))]
    async fn reconcile(
        &self,
        trigger: Trigger,
        key: &ResourceKey,
        spec: &ApplicationMetadataSpec,
        generation: Option<i64>,
    ) -> Result<ApplicationMetadataStatus, Error> {
        let start = Instant::now();
        let result = self.run_pass(key, spec, generation).await;

        let outcome = match &result {
            Ok(status) => {
                info!(phase = %status.phase, "reconciled");
                ReconcileResult::Success
            }
            Err(e) => {
                warn!(error = %e, "reconciliation abandoned");
                ReconcileResult::Error
            }
        };
        self.metrics
            .record_reconcile_duration(trigger, outcome, start.elapsed());
        result
    }

    async fn run_pass(
        &self,
        key: &ResourceKey,
        spec: &ApplicationMetadataSpec,
        generation: Option<i64>,
    ) -> Result<ApplicationMetadataStatus, Error> {
        let validated = self.validate(key, spec)?;

        let dependency_errors = if self.config.strict_dependency_checks {
            check_dependency_graph(
                &validated.components,
                self.config.reject_dependency_cycles,
            )
            .err()
            .unwrap_or_default()
        } else {
            Vec::new()
        };

        let observations = if dependency_errors.is_empty() {
            self.observe(&validated).await?
        } else {
            debug!(violations = dependency_errors.len(), "dependency check failed, skipping probes");
            Observations {
                dependency_errors,
                ..Default::default()
            }
        };

        let status = status::compose(&validated, generation, &observations, Utc::now());
        self.metrics.record_status(key, &validated, status.phase);
        Ok(status)
    }

    fn validate(
        &self,
        key: &ResourceKey,
        spec: &ApplicationMetadataSpec,
    ) -> Result<ValidatedSpec, Error> {
        validation::validate(spec).map_err(|e| {
            for violation in e.violations() {
                self.metrics
                    .record_validation_error(violation.rule.category());
            }
            warn!(app = %key, error = %e, "spec validation failed");
            Error::Validation(e)
        })
    }

    /// Run the repository probe and every component health probe concurrently
    ///
    /// A probe still running at the deadline is abandoned and counted as a
    /// negative result.
    async fn observe(&self, spec: &ValidatedSpec) -> Result<Observations, Error> {
        let budget = self.config.probe_timeout;
        let deadline = Instant::now() + budget;

        let repository = async {
            if !self.config.verify_git_repos {
                return Ok::<_, Error>(None);
            }
            let url = &spec.tracking.repository;
            let reachability = match timeout_at(deadline, self.repository_probe.probe(url)).await
            {
                Ok(result) => result?,
                Err(_) => Reachability::unreachable(format!("timed out after {:?}", budget)),
            };
            Ok::<_, Error>(Some(RepositoryObservation {
                url: url.clone(),
                reachability,
            }))
        };

        let health = join_all(spec.components.iter().map(|component| async move {
            let health = match timeout_at(deadline, self.health_probe.check_health(component)).await
            {
                Ok(result) => result?,
                Err(_) => ComponentHealth::unhealthy(format!(
                    "health check timed out after {:?}",
                    budget
                )),
            };
            Ok::<_, Error>((component.name.clone(), health))
        }));

        let (repository, health) = tokio::join!(repository, health);

        Ok(Observations {
            dependency_errors: Vec::new(),
            repository: repository?,
            component_health: health.into_iter().collect::<Result<Vec<_>, _>>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Component, ConditionType, Phase, TeamInfo, Tracking};
    use crate::metrics::{AppMetrics, MockMetricsEmitter};
    use crate::probe::{AlwaysHealthy, MockComponentHealthProbe, MockRepositoryProbe};
    use mockall::predicate::*;

    fn spec() -> ApplicationMetadataSpec {
        ApplicationMetadataSpec {
            id: "orders-01".to_string(),
            name: "orders".to_string(),
            business_unit: "commerce".to_string(),
            environment: "production".to_string(),
            version: "3.1.0".to_string(),
            description: None,
            team: TeamInfo {
                owner: "orders-team".to_string(),
                email: "orders@example.com".to_string(),
                slack: "#orders".to_string(),
            },
            composition: vec![
                Component {
                    name: "api".to_string(),
                    type_: "service".to_string(),
                    version: "3.1.0".to_string(),
                    repository: None,
                    dependencies: Some(vec!["db".to_string()]),
                },
                Component {
                    name: "db".to_string(),
                    type_: "database".to_string(),
                    version: "15".to_string(),
                    repository: None,
                    dependencies: None,
                },
            ],
            tracking: Tracking {
                jira: None,
                repository: "https://git.example.com/orders".to_string(),
                pipeline: "ci/orders".to_string(),
                documentation: "https://docs.example.com/orders".to_string(),
            },
            tags: None,
        }
    }

    fn key() -> ResourceKey {
        ResourceKey::new("shop", "orders")
    }

    fn reachable_repo() -> MockRepositoryProbe {
        let mut repo = MockRepositoryProbe::new();
        repo.expect_probe()
            .returning(|_| Ok(Reachability::reachable("HTTP 200 OK")));
        repo
    }

    fn engine_with(
        config: EngineConfig,
        repo: MockRepositoryProbe,
        health: Arc<dyn ComponentHealthProbe>,
        metrics: Arc<dyn MetricsEmitter>,
    ) -> ReconcileEngine {
        ReconcileEngine::new(config, Arc::new(repo), health, metrics)
    }

    mod passes {
        use super::*;

        /// Story: A healthy application becomes Active and is tracked
        #[tokio::test]
        async fn story_healthy_application_is_active() {
            let metrics = Arc::new(AppMetrics::new());
            let engine = engine_with(
                EngineConfig::default(),
                reachable_repo(),
                Arc::new(AlwaysHealthy),
                metrics.clone(),
            );

            let status = engine.on_create(&key(), &spec(), Some(1)).await.unwrap();

            assert_eq!(status.phase, Phase::Active);
            assert_eq!(status.conditions.len(), 2);
            assert_eq!(status.observed_generation, Some(1));
            assert_eq!(status.observed_version.as_deref(), Some("3.1.0"));
            assert_eq!(metrics.tracked_phase(&key()), Some(Phase::Active));
        }

        /// Story: Missing dependencies short-circuit the probes
        #[tokio::test]
        async fn story_dependency_failure_skips_probes() {
            let mut repo = MockRepositoryProbe::new();
            repo.expect_probe().never();
            let mut health = MockComponentHealthProbe::new();
            health.expect_check_health().never();

            let engine = engine_with(
                EngineConfig::default(),
                repo,
                Arc::new(health),
                Arc::new(AppMetrics::new()),
            );

            let mut s = spec();
            s.composition.remove(1);
            let status = engine.on_update(&key(), &s, Some(2)).await.unwrap();

            assert_eq!(status.phase, Phase::Error);
            assert_eq!(
                status.conditions[0].message(),
                "Component 'api' depends on 'db' which does not exist"
            );
        }

        #[tokio::test]
        async fn test_lenient_dependencies_ignore_missing_components() {
            let engine = engine_with(
                EngineConfig {
                    strict_dependency_checks: false,
                    ..Default::default()
                },
                reachable_repo(),
                Arc::new(AlwaysHealthy),
                Arc::new(AppMetrics::new()),
            );

            let mut s = spec();
            s.composition.remove(1);
            let status = engine.on_timer(&key(), &s, Some(2)).await.unwrap();
            assert_eq!(status.phase, Phase::Active);
        }

        #[tokio::test]
        async fn test_cycle_rejection_blocks_when_enabled() {
            let engine = engine_with(
                EngineConfig {
                    reject_dependency_cycles: true,
                    ..Default::default()
                },
                MockRepositoryProbe::new(),
                Arc::new(AlwaysHealthy),
                Arc::new(AppMetrics::new()),
            );

            let mut s = spec();
            s.composition[1].dependencies = Some(vec!["api".to_string()]);
            let status = engine.on_update(&key(), &s, Some(3)).await.unwrap();

            assert_eq!(status.phase, Phase::Error);
            assert_eq!(
                status.conditions[0].message(),
                "Dependency cycle detected: api -> db -> api"
            );
        }

        #[tokio::test]
        async fn test_repository_verification_can_be_disabled() {
            let mut repo = MockRepositoryProbe::new();
            repo.expect_probe().never();

            let engine = engine_with(
                EngineConfig {
                    verify_git_repos: false,
                    ..Default::default()
                },
                repo,
                Arc::new(AlwaysHealthy),
                Arc::new(AppMetrics::new()),
            );

            let status = engine.on_timer(&key(), &spec(), Some(1)).await.unwrap();
            assert_eq!(status.phase, Phase::Active);
        }

        /// Story: An unhealthy component keeps the application Pending
        #[tokio::test]
        async fn story_unhealthy_component_is_pending() {
            let mut health = MockComponentHealthProbe::new();
            health.expect_check_health().returning(|c| {
                if c.name == "db" {
                    Ok(ComponentHealth::unhealthy("no ready replicas"))
                } else {
                    Ok(ComponentHealth::healthy("ok"))
                }
            });

            let engine = engine_with(
                EngineConfig::default(),
                reachable_repo(),
                Arc::new(health),
                Arc::new(AppMetrics::new()),
            );

            let status = engine.on_timer(&key(), &spec(), Some(1)).await.unwrap();
            assert_eq!(status.phase, Phase::Pending);
            assert_eq!(
                status
                    .get_condition(ConditionType::Healthy)
                    .map(|c| c.message()),
                Some("Unhealthy components: db")
            );
        }

        /// Story: An unexpected probe failure abandons the pass as retryable
        #[tokio::test]
        async fn story_probe_error_abandons_pass() {
            let mut repo = MockRepositoryProbe::new();
            repo.expect_probe()
                .returning(|url| Err(Error::probe(url.as_str(), "resolver unavailable")));

            let metrics = Arc::new(AppMetrics::new());
            let engine = engine_with(
                EngineConfig::default(),
                repo,
                Arc::new(AlwaysHealthy),
                metrics.clone(),
            );

            let err = engine.on_timer(&key(), &spec(), Some(1)).await.unwrap_err();
            assert!(err.is_retryable());
            assert_eq!(metrics.tracked_phase(&key()), None);
        }
    }

    mod deadlines {
        use super::*;
        use crate::validation::ValidatedComponent;
        use async_trait::async_trait;
        use url::Url;

        struct HangingRepository;

        #[async_trait]
        impl RepositoryProbe for HangingRepository {
            async fn probe(&self, _url: &Url) -> Result<Reachability, Error> {
                std::future::pending().await
            }
        }

        struct HangingHealth;

        #[async_trait]
        impl ComponentHealthProbe for HangingHealth {
            async fn check_health(
                &self,
                _component: &ValidatedComponent,
            ) -> Result<ComponentHealth, Error> {
                std::future::pending().await
            }
        }

        /// Story: A hung repository is unreachable once the deadline passes
        #[tokio::test(start_paused = true)]
        async fn story_hung_repository_times_out() {
            let engine = ReconcileEngine::new(
                EngineConfig::default(),
                Arc::new(HangingRepository),
                Arc::new(AlwaysHealthy),
                Arc::new(AppMetrics::new()),
            );

            let status = engine.on_timer(&key(), &spec(), Some(1)).await.unwrap();
            assert_eq!(status.phase, Phase::Error);
            assert_eq!(status.conditions[0].reason(), "RepositoryNotAccessible");
            assert!(status.conditions[0].message().contains("timed out"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_hung_health_check_is_unhealthy() {
            let engine = ReconcileEngine::new(
                EngineConfig::default(),
                Arc::new(reachable_repo()),
                Arc::new(HangingHealth),
                Arc::new(AppMetrics::new()),
            );

            let status = engine.on_timer(&key(), &spec(), Some(1)).await.unwrap();
            assert_eq!(status.phase, Phase::Pending);
            assert_eq!(
                status
                    .get_condition(ConditionType::Healthy)
                    .map(|c| c.message()),
                Some("Unhealthy components: api, db")
            );
        }

        /// Story: When every probe hangs, the pass still ends after one probe timeout
        #[tokio::test(start_paused = true)]
        async fn story_all_probes_share_one_deadline() {
            let config = EngineConfig {
                probe_timeout: Duration::from_secs(3),
                ..EngineConfig::default()
            };
            let engine = ReconcileEngine::new(
                config,
                Arc::new(HangingRepository),
                Arc::new(HangingHealth),
                Arc::new(AppMetrics::new()),
            );

            let start = Instant::now();
            let status = engine.on_timer(&key(), &spec(), Some(1)).await.unwrap();

            assert_eq!(Instant::now() - start, Duration::from_secs(3));
            assert_eq!(status.phase, Phase::Error);
            assert_eq!(status.conditions[0].reason(), "RepositoryNotAccessible");
        }
    }

    mod bookkeeping {
        use super::*;

        /// Story: An invalid spec counts each violation and never composes
        #[tokio::test]
        async fn story_validation_failure_is_counted() {
            let mut metrics = MockMetricsEmitter::new();
            metrics
                .expect_record_validation_error()
                .with(eq("pattern"))
                .times(1)
                .return_const(());
            metrics.expect_record_status().never();
            metrics
                .expect_record_reconcile_duration()
                .withf(|trigger, result, _| {
                    *trigger == Trigger::Update && *result == ReconcileResult::Error
                })
                .times(1)
                .return_const(());

            let engine = engine_with(
                EngineConfig::default(),
                MockRepositoryProbe::new(),
                Arc::new(AlwaysHealthy),
                Arc::new(metrics),
            );

            let mut s = spec();
            s.team.email = "not-an-email".to_string();
            let err = engine.on_update(&key(), &s, Some(2)).await.unwrap_err();

            assert!(matches!(err, Error::Validation(_)));
            assert!(!err.is_retryable());
        }

        #[tokio::test]
        async fn test_successful_pass_records_duration() {
            let mut metrics = MockMetricsEmitter::new();
            metrics.expect_record_status().times(1).return_const(());
            metrics
                .expect_record_reconcile_duration()
                .withf(|trigger, result, _| {
                    *trigger == Trigger::Create && *result == ReconcileResult::Success
                })
                .times(1)
                .return_const(());

            let engine = engine_with(
                EngineConfig::default(),
                reachable_repo(),
                Arc::new(AlwaysHealthy),
                Arc::new(metrics),
            );

            engine.on_create(&key(), &spec(), Some(1)).await.unwrap();
        }

        /// Story: Deletion only removes the tracked entry
        #[test]
        fn story_delete_removes_tracking() {
            let mut metrics = MockMetricsEmitter::new();
            metrics
                .expect_remove()
                .with(eq(key()))
                .times(1)
                .return_const(());
            metrics.expect_record_status().never();

            let engine = engine_with(
                EngineConfig::default(),
                MockRepositoryProbe::new(),
                Arc::new(AlwaysHealthy),
                Arc::new(metrics),
            );

            engine.on_delete(&key());
        }

        #[test]
        fn test_initial_status_requires_valid_spec() {
            let engine = engine_with(
                EngineConfig::default(),
                MockRepositoryProbe::new(),
                Arc::new(AlwaysHealthy),
                Arc::new(AppMetrics::new()),
            );

            let status = engine.initial_status(&key(), &spec(), Some(1)).unwrap();
            assert_eq!(status.phase, Phase::Pending);
            assert_eq!(
                status.conditions[0].message(),
                "Initializing application orders"
            );

            let mut s = spec();
            s.environment = "prod".to_string();
            assert!(engine.initial_status(&key(), &s, Some(1)).is_err());
        }
    }

    #[test]
    fn test_engine_config_from_controller_config() {
        let mut config = ControllerConfig::default();
        config.validation.verify_git_repos = false;
        config.probe_timeout = 9;

        let engine_config = EngineConfig::from(&config);
        assert!(!engine_config.verify_git_repos);
        assert!(engine_config.strict_dependency_checks);
        assert_eq!(engine_config.probe_timeout, Duration::from_secs(9));
    }

    #[test]
    fn test_resource_key_display() {
        assert_eq!(key().to_string(), "shop/orders");
    }
}
