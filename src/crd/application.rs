//! ApplicationMetadata Custom Resource Definition
//!
//! An ApplicationMetadata resource catalogs an application's ownership,
//! composition and tracking metadata. Every wire field is a plain string so
//! that a malformed value reaches the validator and is reported with its
//! field path instead of failing deserialization in the watcher.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::{ArrayValidation, InstanceType, Schema, SchemaObject, StringValidation};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ComponentType, Condition, ConditionType, Environment, Phase};

const SEMVER_PATTERN: &str = r"^v?(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)(?:-((?:0|[1-9][0-9]*|[0-9]*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9][0-9]*|[0-9]*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$";

const TAG_PATTERN: &str = r"^[a-zA-Z0-9][-a-zA-Z0-9_]*[a-zA-Z0-9]$";

fn string_schema(enum_values: Option<&[&str]>, pattern: Option<&str>) -> SchemaObject {
    SchemaObject {
        instance_type: Some(InstanceType::String.into()),
        enum_values: enum_values.map(|values| values.iter().map(|v| (*v).into()).collect()),
        string: pattern.map(|p| {
            Box::new(StringValidation {
                pattern: Some(p.to_string()),
                ..Default::default()
            })
        }),
        ..Default::default()
    }
}

fn environment_schema(_gen: &mut SchemaGenerator) -> Schema {
    Schema::Object(string_schema(Some(Environment::VALUES), None))
}

fn component_type_schema(_gen: &mut SchemaGenerator) -> Schema {
    Schema::Object(string_schema(Some(ComponentType::VALUES), None))
}

fn semver_schema(_gen: &mut SchemaGenerator) -> Schema {
    Schema::Object(string_schema(None, Some(SEMVER_PATTERN)))
}

fn tags_schema(_gen: &mut SchemaGenerator) -> Schema {
    Schema::Object(SchemaObject {
        instance_type: Some(InstanceType::Array.into()),
        array: Some(Box::new(ArrayValidation {
            items: Some(Schema::Object(string_schema(None, Some(TAG_PATTERN))).into()),
            ..Default::default()
        })),
        ..Default::default()
    })
}

/// Team that owns the application
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct TeamInfo {
    /// Owning team handle
    #[schemars(regex(pattern = r"^[a-zA-Z][-a-zA-Z0-9.]*[a-zA-Z0-9]$"))]
    pub owner: String,

    /// Team contact email
    #[schemars(regex(pattern = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$"))]
    pub email: String,

    /// Slack channel, including the leading `#`
    #[schemars(regex(pattern = r"^#[a-zA-Z0-9_-]+$"))]
    pub slack: String,
}

/// One deployable part of the application
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Component {
    /// Component name, unique within the composition
    #[schemars(regex(pattern = r"^[a-zA-Z][-a-zA-Z0-9]*[a-zA-Z0-9]$"))]
    pub name: String,

    /// Component kind (service, database, cache, ...)
    #[serde(rename = "type")]
    #[schemars(schema_with = "component_type_schema")]
    pub type_: String,

    /// Component version
    #[schemars(schema_with = "semver_schema")]
    pub version: String,

    /// Source repository of this component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Names of other components in the same composition this one needs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
}

impl Component {
    /// Declared dependency names, empty when none are listed
    pub fn dependency_names(&self) -> &[String] {
        self.dependencies.as_deref().unwrap_or_default()
    }
}

/// Where the application's work is tracked
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Tracking {
    /// Jira project key and number, e.g. `PAY-123`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(regex(pattern = r"^[A-Z]+-[0-9]+$"))]
    pub jira: Option<String>,

    /// Source repository URL, probed for reachability
    pub repository: String,

    /// CI pipeline path
    #[schemars(regex(pattern = r"^[a-zA-Z][-a-zA-Z0-9/]*[a-zA-Z0-9]$"))]
    pub pipeline: String,

    /// Documentation URL
    pub documentation: String,
}

/// Specification for an ApplicationMetadata resource
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "apps.company.io",
    version = "v1",
    kind = "ApplicationMetadata",
    plural = "applicationmetadata",
    shortname = "appmeta",
    status = "ApplicationMetadataStatus",
    namespaced,
    printcolumn = r#"{"name":"Environment","type":"string","jsonPath":".spec.environment"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationMetadataSpec {
    /// Stable application identifier
    #[schemars(
        regex(pattern = r"^[a-zA-Z0-9][-a-zA-Z0-9]*[a-zA-Z0-9]$"),
        length(min = 3, max = 63)
    )]
    pub id: String,

    /// Human-facing application name
    #[schemars(
        regex(pattern = r"^[a-zA-Z][-a-zA-Z0-9]*[a-zA-Z0-9]$"),
        length(min = 2, max = 253)
    )]
    pub name: String,

    /// Owning business unit
    #[schemars(
        regex(pattern = r"^[a-zA-Z][-a-zA-Z0-9]*[a-zA-Z0-9]$"),
        length(min = 2, max = 63)
    )]
    pub business_unit: String,

    /// Deployment environment
    #[schemars(schema_with = "environment_schema")]
    pub environment: String,

    /// Semantic version of the application
    #[schemars(schema_with = "semver_schema")]
    pub version: String,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(length(max = 1024))]
    pub description: Option<String>,

    /// Owning team
    pub team: TeamInfo,

    /// Components the application is made of, in declaration order
    #[serde(default)]
    pub composition: Vec<Component>,

    /// Tracking links
    pub tracking: Tracking,

    /// Free-form tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "tags_schema")]
    pub tags: Option<Vec<String>>,
}

/// Status for an ApplicationMetadata resource
///
/// The whole value is recomputed on every reconciliation pass and replaces
/// whatever was stored before.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationMetadataStatus {
    /// Current phase
    #[serde(default)]
    pub phase: Phase,

    /// Conditions, in the order they were composed
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// When this status was computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    /// Spec version this status reflects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_version: Option<String>,

    /// Resource generation this status reflects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl ApplicationMetadataStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: Phase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Append a condition and return self for chaining
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Look up the first condition of the given type
    pub fn get_condition(&self, type_: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}
