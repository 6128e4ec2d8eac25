//! Status composition
//!
//! Pure functions that turn a validated spec and the results of one pass of
//! checks into a complete [`ApplicationMetadataStatus`]. Nothing here performs
//! I/O or reads the clock; callers pass `now` in.
//!
//! Rules are evaluated in priority order and the first match decides the
//! phase:
//!
//! 1. dependency violations block the application (`Error`,
//!    `Ready=False/DependencyValidationFailed`)
//! 2. an unreachable repository blocks the application (`Error`,
//!    `Ready=False/RepositoryNotAccessible`)
//! 3. otherwise component health decides between `Active` and `Pending`,
//!    with `Healthy` appended before `Ready`

use chrono::{DateTime, Utc};
use url::Url;

use crate::crd::{ApplicationMetadataStatus, Condition, ConditionStatus, ConditionType, Phase};
use crate::probe::{ComponentHealth, Reachability};
use crate::validation::ValidatedSpec;

/// Generation reported when the resource metadata carries none
pub const DEFAULT_GENERATION: i64 = 1;

/// Condition reasons written by the composer
pub mod reasons {
    /// Status was just created and no checks have run
    pub const INITIALIZING: &str = "Initializing";
    /// The spec passed every check it was subjected to
    pub const VALIDATION_PASSED: &str = "ValidationPassed";
    /// A component depends on something the composition does not declare
    pub const DEPENDENCY_VALIDATION_FAILED: &str = "DependencyValidationFailed";
    /// The tracked repository did not answer `200 OK`
    pub const REPOSITORY_NOT_ACCESSIBLE: &str = "RepositoryNotAccessible";
    /// Every component reported healthy
    pub const ALL_COMPONENTS_HEALTHY: &str = "AllComponentsHealthy";
    /// At least one component reported unhealthy
    pub const UNHEALTHY_COMPONENTS: &str = "UnhealthyComponents";
}

/// Outcome of the repository probe for one pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepositoryObservation {
    /// Probed URL
    pub url: Url,
    /// Probe result
    pub reachability: Reachability,
}

/// Everything the checks observed during one pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Observations {
    /// Dependency violations; empty when the check passed or was skipped
    pub dependency_errors: Vec<String>,
    /// Repository probe result; `None` when verification is disabled
    pub repository: Option<RepositoryObservation>,
    /// Health of each component, in composition order
    pub component_health: Vec<(String, ComponentHealth)>,
}

/// Status written when a resource is first seen
pub fn initial_status(
    name: &str,
    version: &str,
    generation: Option<i64>,
    now: DateTime<Utc>,
) -> ApplicationMetadataStatus {
    let status = ApplicationMetadataStatus::with_phase(Phase::Pending).condition(
        Condition::new(
            ConditionType::Ready,
            ConditionStatus::Unknown,
            reasons::INITIALIZING,
            format!("Initializing application {}", name),
        )
        .stamped(now),
    );
    observed(status, version, generation, now)
}

/// Compose the status for one pass
pub fn compose(
    spec: &ValidatedSpec,
    generation: Option<i64>,
    observations: &Observations,
    now: DateTime<Utc>,
) -> ApplicationMetadataStatus {
    let condition = |type_, status, reason: &str, message: String| {
        Condition::new(type_, status, reason, message).stamped(now)
    };

    let status = if !observations.dependency_errors.is_empty() {
        ApplicationMetadataStatus::with_phase(Phase::Error).condition(condition(
            ConditionType::Ready,
            ConditionStatus::False,
            reasons::DEPENDENCY_VALIDATION_FAILED,
            observations.dependency_errors.join("; "),
        ))
    } else if let Some(repo) = observations
        .repository
        .as_ref()
        .filter(|r| !r.reachability.reachable)
    {
        ApplicationMetadataStatus::with_phase(Phase::Error).condition(condition(
            ConditionType::Ready,
            ConditionStatus::False,
            reasons::REPOSITORY_NOT_ACCESSIBLE,
            format!(
                "Repository {} is not accessible: {}",
                repo.url, repo.reachability.detail
            ),
        ))
    } else {
        let unhealthy: Vec<&str> = observations
            .component_health
            .iter()
            .filter(|(_, health)| !health.healthy)
            .map(|(name, _)| name.as_str())
            .collect();

        let healthy = if unhealthy.is_empty() {
            ApplicationMetadataStatus::with_phase(Phase::Active).condition(condition(
                ConditionType::Healthy,
                ConditionStatus::True,
                reasons::ALL_COMPONENTS_HEALTHY,
                "All components are healthy".to_string(),
            ))
        } else {
            ApplicationMetadataStatus::with_phase(Phase::Pending).condition(condition(
                ConditionType::Healthy,
                ConditionStatus::False,
                reasons::UNHEALTHY_COMPONENTS,
                format!("Unhealthy components: {}", unhealthy.join(", ")),
            ))
        };

        // Ready reflects validation only; Healthy carries the component verdict
        healthy.condition(condition(
            ConditionType::Ready,
            ConditionStatus::True,
            reasons::VALIDATION_PASSED,
            "Application validated successfully".to_string(),
        ))
    };

    observed(status, &spec.version, generation, now)
}

fn observed(
    mut status: ApplicationMetadataStatus,
    version: &str,
    generation: Option<i64>,
    now: DateTime<Utc>,
) -> ApplicationMetadataStatus {
    status.last_updated = Some(now);
    status.observed_version = Some(version.to_string());
    status.observed_generation = Some(generation.unwrap_or(DEFAULT_GENERATION));
    status
}
