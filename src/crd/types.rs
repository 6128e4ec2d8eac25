//! Shared types for the ApplicationMetadata CRD
//!
//! Phases, condition vocabulary and the enumerations the spec validator
//! resolves string fields into.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Application lifecycle phase
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Spec is valid but the application is not fully healthy yet
    #[default]
    Pending,
    /// Spec is valid, repository reachable and all components healthy
    Active,
    /// Application is deprecated
    Deprecated,
    /// Application is retired
    Retired,
    /// Reconciliation is blocked by a dependency or repository problem
    Error,
}

impl Phase {
    /// Wire and metric label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Active => "Active",
            Self::Deprecated => "Deprecated",
            Self::Retired => "Retired",
            Self::Error => "Error",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition types reported on ApplicationMetadata
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum ConditionType {
    /// The spec has been validated
    Ready,
    /// The application is available
    Available,
    /// All components report healthy
    Healthy,
    /// The observed version matches the declared one
    UpToDate,
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "Ready"),
            Self::Available => write!(f, "Available"),
            Self::Healthy => write!(f, "Healthy"),
            Self::UpToDate => write!(f, "UpToDate"),
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: ConditionType,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Last time the condition transitioned
    pub last_transition_time: DateTime<Utc>,

    /// Machine-readable reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_,
            status,
            last_transition_time: Utc::now(),
            reason: Some(reason.into()),
            message: Some(message.into()),
        }
    }

    /// Override the transition timestamp
    pub fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.last_transition_time = at;
        self
    }

    /// Reason, or an empty string when unset
    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or_default()
    }

    /// Message, or an empty string when unset
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

/// Deployment environment of an application
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Environment {
    /// Development
    Development,
    /// Staging
    Staging,
    /// Production
    Production,
    /// Disaster recovery
    Dr,
    /// Test
    Test,
    /// Quality assurance
    Qa,
}

impl Environment {
    /// Accepted wire values
    pub const VALUES: &'static [&'static str] =
        &["development", "staging", "production", "dr", "test", "qa"];

    /// Wire and metric label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
            Self::Dr => "dr",
            Self::Test => "test",
            Self::Qa => "qa",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            "dr" => Ok(Self::Dr),
            "test" => Ok(Self::Test),
            "qa" => Ok(Self::Qa),
            _ => Err(format!("invalid environment: {}", s)),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of application component
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentType {
    /// Generic service
    Service,
    /// Database
    Database,
    /// Cache
    Cache,
    /// Message queue
    Queue,
    /// Frontend
    Frontend,
    /// Backend
    Backend,
    /// Middleware
    Middleware,
    /// Storage
    Storage,
}

impl ComponentType {
    /// Accepted wire values
    pub const VALUES: &'static [&'static str] = &[
        "service",
        "database",
        "cache",
        "queue",
        "frontend",
        "backend",
        "middleware",
        "storage",
    ];

    /// Wire and metric label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Database => "database",
            Self::Cache => "cache",
            Self::Queue => "queue",
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Middleware => "middleware",
            Self::Storage => "storage",
        }
    }
}

impl std::str::FromStr for ComponentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "service" => Ok(Self::Service),
            "database" => Ok(Self::Database),
            "cache" => Ok(Self::Cache),
            "queue" => Ok(Self::Queue),
            "frontend" => Ok(Self::Frontend),
            "backend" => Ok(Self::Backend),
            "middleware" => Ok(Self::Middleware),
            "storage" => Ok(Self::Storage),
            _ => Err(format!("invalid component type: {}", s)),
        }
    }
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
