//! AppMetadata - Kubernetes controller for ApplicationMetadata resources
//!
//! An `ApplicationMetadata` resource catalogs who owns an application, which
//! components it is made of, and where its source, pipeline and docs live.
//! The controller converges the resource's status toward a value derived from
//! the declared spec and from external reachability and health signals.
//!
//! # Modules
//!
//! - [`crd`] - The ApplicationMetadata CRD and status vocabulary
//! - [`validation`] - Spec validation producing a typed spec
//! - [`dependencies`] - Component dependency graph checks
//! - [`probe`] - Repository reachability and component health probes
//! - [`status`] - Phase/condition state machine
//! - [`metrics`] - Phase tracking and OpenTelemetry instruments
//! - [`engine`] - One reconciliation pass, independent of the controller runtime
//! - [`controller`] - kube-rs adapter that drives the engine
//! - [`config`] - Controller configuration
//! - [`telemetry`] - Logging and metrics export setup
//! - [`error`] - Error types for the controller

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod dependencies;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod status;
pub mod telemetry;
pub mod validation;

pub use error::Error;

/// API group of the ApplicationMetadata CRD
pub const API_GROUP: &str = "apps.company.io";

/// Field manager used for status and metadata patches
pub const FIELD_MANAGER: &str = "appmetadata-controller";

/// Finalizer that lets the controller observe deletions for metrics cleanup
pub const METRICS_FINALIZER: &str = "apps.company.io/metrics-cleanup";

/// Default interval between timer-driven reconciliations
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Default shared deadline for all probes of one reconciliation pass
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
