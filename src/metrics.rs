//! Metrics for ApplicationMetadata reconciliation
//!
//! Provides OpenTelemetry metrics for:
//! - Application counts (by phase, environment and business unit)
//! - Component counts by type
//! - Phase transitions
//! - Reconciliation duration
//! - Validation errors
//!
//! Gauges are last-value instruments, so [`AppMetrics`] keeps the counts
//! itself and re-records the absolute value of every label it touches.

use std::collections::HashMap;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use parking_lot::Mutex;

use crate::crd::{ComponentType, Environment, Phase};
use crate::engine::{ResourceKey, Trigger};
use crate::validation::ValidatedSpec;

/// Global meter for AppMetadata metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("appmetadata"));

// ============================================================================
// Application Metrics
// ============================================================================

/// Gauge tracking applications by phase
///
/// Labels:
/// - `phase`: Pending, Active, Deprecated, Retired, Error
pub static APPLICATIONS_TOTAL: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("appmetadata_applications_total")
        .with_description("Total number of applications by phase")
        .with_unit("{applications}")
        .build()
});

/// Gauge tracking applications by environment
///
/// Labels:
/// - `environment`: development, staging, production, dr, test, qa
pub static APPLICATIONS_BY_ENVIRONMENT: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("appmetadata_applications_by_environment")
        .with_description("Number of applications by environment")
        .with_unit("{applications}")
        .build()
});

/// Gauge tracking applications by business unit
///
/// Labels:
/// - `business_unit`: owning business unit
pub static APPLICATIONS_BY_BUSINESS_UNIT: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("appmetadata_applications_by_business_unit")
        .with_description("Number of applications by business unit")
        .with_unit("{applications}")
        .build()
});

/// Gauge tracking components by type
///
/// Labels:
/// - `type`: service, database, cache, queue, frontend, backend, middleware, storage
pub static COMPONENTS_TOTAL: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("appmetadata_components_total")
        .with_description("Total number of components by type")
        .with_unit("{components}")
        .build()
});

/// Counter of phase transitions
///
/// Labels:
/// - `from_phase`: previous phase
/// - `to_phase`: new phase
pub static STATUS_CHANGES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("appmetadata_status_changes_total")
        .with_description("Number of application status changes")
        .with_unit("{changes}")
        .build()
});

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Histogram of reconciliation duration
///
/// Labels:
/// - `trigger`: create, update, timer
/// - `result`: success, error
pub static RECONCILIATION_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("appmetadata_reconciliation_duration_seconds")
        .with_description("Time spent reconciling applications")
        .with_unit("s")
        .build()
});

/// Counter of validation errors
///
/// Labels:
/// - `error_type`: pattern, length, enum, url
pub static VALIDATION_ERRORS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("appmetadata_validation_errors_total")
        .with_description("Number of validation errors by type")
        .with_unit("{errors}")
        .build()
});

/// Result label for the reconciliation duration histogram
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileResult {
    /// A status was composed
    Success,
    /// The pass was abandoned
    Error,
}

impl ReconcileResult {
    /// Metric label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Receives the bookkeeping events of the reconcile engine
#[cfg_attr(test, automock)]
pub trait MetricsEmitter: Send + Sync {
    /// Record the phase composed for a resource
    fn record_status(&self, key: &ResourceKey, spec: &ValidatedSpec, phase: Phase);

    /// Forget a deleted resource
    fn remove(&self, key: &ResourceKey);

    /// Count one validation error of the given category
    fn record_validation_error(&self, error_type: &str);

    /// Record how long a pass took
    fn record_reconcile_duration(&self, trigger: Trigger, result: ReconcileResult, elapsed: Duration);
}

#[derive(Clone, Debug, PartialEq)]
struct TrackedApp {
    phase: Phase,
    environment: Environment,
    business_unit: String,
    component_types: Vec<ComponentType>,
}

impl TrackedApp {
    fn from_spec(spec: &ValidatedSpec, phase: Phase) -> Self {
        Self {
            phase,
            environment: spec.environment,
            business_unit: spec.business_unit.clone(),
            component_types: spec.components.iter().map(|c| c.component_type).collect(),
        }
    }
}

#[derive(Default)]
struct MetricsState {
    apps: HashMap<ResourceKey, TrackedApp>,
    by_phase: HashMap<Phase, i64>,
    by_environment: HashMap<Environment, i64>,
    by_business_unit: HashMap<String, i64>,
    components: HashMap<ComponentType, i64>,
    transitions: HashMap<(Phase, Phase), u64>,
    validation_errors: HashMap<String, u64>,
}

impl MetricsState {
    /// Apply `delta` to every count the app contributes to and re-record
    /// the affected gauges
    fn apply(&mut self, app: &TrackedApp, delta: i64) {
        let phase = bump(&mut self.by_phase, app.phase, delta);
        APPLICATIONS_TOTAL.record(phase, &[KeyValue::new("phase", app.phase.as_str())]);

        let env = bump(&mut self.by_environment, app.environment, delta);
        APPLICATIONS_BY_ENVIRONMENT.record(
            env,
            &[KeyValue::new("environment", app.environment.as_str())],
        );

        let bu = bump(&mut self.by_business_unit, app.business_unit.clone(), delta);
        APPLICATIONS_BY_BUSINESS_UNIT.record(
            bu,
            &[KeyValue::new("business_unit", app.business_unit.clone())],
        );

        for ty in &app.component_types {
            let count = bump(&mut self.components, *ty, delta);
            COMPONENTS_TOTAL.record(count, &[KeyValue::new("type", ty.as_str())]);
        }
    }
}

fn bump<K: std::hash::Hash + Eq>(counts: &mut HashMap<K, i64>, key: K, delta: i64) -> i64 {
    let count = counts.entry(key).or_insert(0);
    *count = (*count + delta).max(0);
    *count
}

/// Phase tracker backing the OpenTelemetry instruments
///
/// Keyed by resource identity. Safe to share across concurrent
/// reconciliations of different resources.
#[derive(Default)]
pub struct AppMetrics {
    state: Mutex<MetricsState>,
}

impl AppMetrics {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked applications in a phase
    pub fn phase_count(&self, phase: Phase) -> i64 {
        self.state.lock().by_phase.get(&phase).copied().unwrap_or(0)
    }

    /// Last phase recorded for a resource
    pub fn tracked_phase(&self, key: &ResourceKey) -> Option<Phase> {
        self.state.lock().apps.get(key).map(|a| a.phase)
    }

    /// Number of recorded transitions between two phases
    pub fn transition_count(&self, from: Phase, to: Phase) -> u64 {
        self.state
            .lock()
            .transitions
            .get(&(from, to))
            .copied()
            .unwrap_or(0)
    }

    /// Number of validation errors recorded for a category
    pub fn validation_error_count(&self, error_type: &str) -> u64 {
        self.state
            .lock()
            .validation_errors
            .get(error_type)
            .copied()
            .unwrap_or(0)
    }

    /// Number of tracked applications in an environment
    pub fn environment_count(&self, environment: Environment) -> i64 {
        self.state
            .lock()
            .by_environment
            .get(&environment)
            .copied()
            .unwrap_or(0)
    }

    /// Number of tracked applications owned by a business unit
    pub fn business_unit_count(&self, business_unit: &str) -> i64 {
        self.state
            .lock()
            .by_business_unit
            .get(business_unit)
            .copied()
            .unwrap_or(0)
    }

    /// Number of tracked components of a type
    pub fn component_count(&self, component_type: ComponentType) -> i64 {
        self.state
            .lock()
            .components
            .get(&component_type)
            .copied()
            .unwrap_or(0)
    }
}

impl MetricsEmitter for AppMetrics {
    fn record_status(&self, key: &ResourceKey, spec: &ValidatedSpec, phase: Phase) {
        let app = TrackedApp::from_spec(spec, phase);
        let mut state = self.state.lock();

        if let Some(previous) = state.apps.insert(key.clone(), app.clone()) {
            state.apply(&previous, -1);
            if previous.phase != phase {
                *state.transitions.entry((previous.phase, phase)).or_insert(0) += 1;
                STATUS_CHANGES.add(
                    1,
                    &[
                        KeyValue::new("from_phase", previous.phase.as_str()),
                        KeyValue::new("to_phase", phase.as_str()),
                    ],
                );
            }
        }
        state.apply(&app, 1);
    }

    fn remove(&self, key: &ResourceKey) {
        let mut state = self.state.lock();
        if let Some(previous) = state.apps.remove(key) {
            state.apply(&previous, -1);
        }
    }

    fn record_validation_error(&self, error_type: &str) {
        *self
            .state
            .lock()
            .validation_errors
            .entry(error_type.to_string())
            .or_insert(0) += 1;
        VALIDATION_ERRORS.add(1, &[KeyValue::new("error_type", error_type.to_string())]);
    }

    fn record_reconcile_duration(&self, trigger: Trigger, result: ReconcileResult, elapsed: Duration) {
        RECONCILIATION_DURATION.record(
            elapsed.as_secs_f64(),
            &[
                KeyValue::new("trigger", trigger.as_str()),
                KeyValue::new("result", result.as_str()),
            ],
        );
    }
}
