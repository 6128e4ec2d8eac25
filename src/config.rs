//! Controller configuration
//!
//! Loaded once by the binary from a YAML file and passed explicitly into
//! the engine and controller context. Every key is optional. Unknown keys
//! are ignored so older config files keep loading.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_RECONCILE_INTERVAL_SECS};

/// Default location of the config file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/appmetadata/config.yaml";

/// Logging settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Metrics export settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether metrics are exported at all
    pub enabled: bool,
    /// OTLP gRPC endpoint; falls back to `OTEL_EXPORTER_OTLP_ENDPOINT`
    pub otlp_endpoint: Option<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            otlp_endpoint: None,
        }
    }
}

/// Which checks a reconciliation pass performs
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Block applications whose components depend on undeclared components
    pub strict_dependency_checks: bool,
    /// Probe the tracked repository for reachability
    pub verify_git_repos: bool,
    /// Also block applications with dependency cycles
    pub reject_dependency_cycles: bool,
    /// Write the composed status back to the resource
    pub auto_status_updates: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict_dependency_checks: true,
            verify_git_repos: true,
            reject_dependency_cycles: false,
            auto_status_updates: true,
        }
    }
}

/// Top-level controller configuration
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Controller name, used as the OpenTelemetry service name
    pub name: String,
    /// Namespace the controller runs in
    pub namespace: String,
    /// Seconds between timer-driven reconciliations
    pub reconcile_interval: u64,
    /// Seconds all probes of one pass may take together
    pub probe_timeout: u64,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Metrics settings
    pub metrics: MetricsConfig,
    /// Check settings
    pub validation: ValidationConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: "appmetadata-controller".to_string(),
            namespace: "appmetadata-system".to_string(),
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL_SECS,
            probe_timeout: DEFAULT_PROBE_TIMEOUT_SECS,
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a YAML file
    ///
    /// A missing file yields the defaults. An empty file does too.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(Error::config(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        Self::from_yaml(&contents)
            .map_err(|e| Error::config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Option<Self> = serde_yaml::from_str(yaml)?;
        Ok(config.unwrap_or_default())
    }

    /// Interval between timer-driven reconciliations
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval)
    }

    /// Shared deadline for the probes of one pass
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }

    /// OTLP endpoint from the file or the standard environment variable
    pub fn otlp_endpoint(&self) -> Option<String> {
        self.metrics
            .otlp_endpoint
            .clone()
            .or_else(|| std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok())
            .filter(|e| !e.is_empty())
    }
}
