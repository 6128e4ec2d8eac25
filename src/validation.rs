//! Spec validation
//!
//! Turns the string-typed wire spec into a [`ValidatedSpec`] with resolved
//! enums and parsed URLs. Every rule is checked and every violation is
//! collected, so a single failed pass reports all problems at once. A spec
//! is accepted only when no rule is violated.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::crd::{ApplicationMetadataSpec, Component, ComponentType, Environment, TeamInfo};

/// Longest URL accepted in any URL field
pub const MAX_URL_LENGTH: usize = 2083;

/// Longest description accepted
pub const MAX_DESCRIPTION_LENGTH: usize = 1024;

static ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][-a-zA-Z0-9]*[a-zA-Z0-9]$").expect("hardcoded regex pattern is valid")
});

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z][-a-zA-Z0-9]*[a-zA-Z0-9]$").expect("hardcoded regex pattern is valid")
});

static SEMVER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^v?(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)(?:-((?:0|[1-9][0-9]*|[0-9]*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9][0-9]*|[0-9]*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$",
    )
    .expect("hardcoded regex pattern is valid")
});

static OWNER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z][-a-zA-Z0-9.]*[a-zA-Z0-9]$").expect("hardcoded regex pattern is valid")
});

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("hardcoded regex pattern is valid")
});

static SLACK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[a-zA-Z0-9_-]+$").expect("hardcoded regex pattern is valid"));

static JIRA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]+-[0-9]+$").expect("hardcoded regex pattern is valid"));

static PIPELINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z][-a-zA-Z0-9/]*[a-zA-Z0-9]$").expect("hardcoded regex pattern is valid")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][-a-zA-Z0-9_]*[a-zA-Z0-9]$").expect("hardcoded regex pattern is valid")
});

/// The constraint a field violated
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rule {
    /// Value does not match the named pattern
    Pattern(&'static str),
    /// Value length (in characters) is outside the bounds
    Length {
        /// Minimum length, inclusive
        min: usize,
        /// Maximum length, inclusive
        max: usize,
    },
    /// Value is not one of the allowed values
    OneOf(&'static [&'static str]),
    /// Value is not an absolute http(s) URL
    HttpUrl,
}

impl Rule {
    /// Category used as the `error_type` label of the validation error counter
    pub fn category(&self) -> &'static str {
        match self {
            Rule::Pattern(_) => "pattern",
            Rule::Length { .. } => "length",
            Rule::OneOf(_) => "enum",
            Rule::HttpUrl => "url",
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rule::Pattern(name) => write!(f, "pattern({})", name),
            Rule::Length { min, max } => write!(f, "length({}..={})", min, max),
            Rule::OneOf(values) => write!(f, "one_of({})", values.join("|")),
            Rule::HttpUrl => write!(f, "http_url"),
        }
    }
}

/// A single violated constraint, addressed by field path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldViolation {
    /// Path of the offending field, e.g. `team.email` or `composition[1].type`
    pub field: String,
    /// Constraint that was violated
    pub rule: Rule,
    /// Human-readable explanation
    pub message: String,
}

impl FieldViolation {
    /// Create a new violation
    pub fn new(field: impl Into<String>, rule: Rule, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rule,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every violation found in one spec
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{}", join_violations(.violations))]
pub struct ValidationError {
    violations: Vec<FieldViolation>,
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// Wrap a list of violations
    pub fn new(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }

    /// All violations, in the order fields were checked
    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    /// Returns true if any violation is on the given field path
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

/// A component that passed validation
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedComponent {
    /// Component name
    pub name: String,
    /// Resolved component kind
    pub component_type: ComponentType,
    /// Component version
    pub version: String,
    /// Parsed component repository URL
    pub repository: Option<Url>,
    /// Dependency names, possibly empty
    pub dependencies: Vec<String>,
}

/// Tracking links that passed validation
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedTracking {
    /// Jira key
    pub jira: Option<String>,
    /// Source repository, the target of the reachability probe
    pub repository: Url,
    /// CI pipeline path
    pub pipeline: String,
    /// Documentation URL
    pub documentation: Url,
}

/// A spec that satisfies every field constraint
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedSpec {
    /// Application identifier
    pub id: String,
    /// Application name
    pub name: String,
    /// Owning business unit
    pub business_unit: String,
    /// Deployment environment
    pub environment: Environment,
    /// Semantic version
    pub version: String,
    /// Description
    pub description: Option<String>,
    /// Owning team
    pub team: TeamInfo,
    /// Components, in declaration order
    pub components: Vec<ValidatedComponent>,
    /// Tracking links
    pub tracking: ValidatedTracking,
    /// Tags
    pub tags: Vec<String>,
}

#[derive(Default)]
struct Checker {
    violations: Vec<FieldViolation>,
}

impl Checker {
    fn fail(&mut self, field: impl Into<String>, rule: Rule, message: impl Into<String>) {
        self.violations.push(FieldViolation::new(field, rule, message));
    }

    fn length(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.chars().count();
        if len < min || len > max {
            self.fail(
                field,
                Rule::Length { min, max },
                format!("must be between {} and {} characters, got {}", min, max, len),
            );
        }
    }

    fn pattern(&mut self, field: &str, value: &str, name: &'static str, re: &Regex, hint: &str) {
        if !re.is_match(value) {
            self.fail(field, Rule::Pattern(name), format!("'{}' {}", value, hint));
        }
    }

    fn one_of<T: std::str::FromStr>(
        &mut self,
        field: &str,
        value: &str,
        allowed: &'static [&'static str],
    ) -> Option<T> {
        match value.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                self.fail(
                    field,
                    Rule::OneOf(allowed),
                    format!("'{}' must be one of: {}", value, allowed.join(", ")),
                );
                None
            }
        }
    }

    fn http_url(&mut self, field: &str, value: &str) -> Option<Url> {
        match parse_http_url(value) {
            Ok(url) => Some(url),
            Err(reason) => {
                self.fail(field, Rule::HttpUrl, reason);
                None
            }
        }
    }

    fn finish(self) -> ValidationError {
        ValidationError::new(self.violations)
    }
}

fn parse_http_url(value: &str) -> Result<Url, String> {
    if value.len() > MAX_URL_LENGTH {
        return Err(format!("URL must be at most {} characters", MAX_URL_LENGTH));
    }
    let url = Url::parse(value).map_err(|e| format!("'{}' is not a valid URL: {}", value, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("'{}' must use the http or https scheme", value));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(format!("'{}' must include a host", value));
    }
    Ok(url)
}

/// Validate a raw spec
///
/// Pure and synchronous. Returns every violation found, or the typed spec
/// when there are none.
pub fn validate(spec: &ApplicationMetadataSpec) -> Result<ValidatedSpec, ValidationError> {
    let mut c = Checker::default();

    c.length("id", &spec.id, 3, 63);
    c.pattern(
        "id",
        &spec.id,
        "id",
        &ID_RE,
        "must be alphanumeric or '-' and start and end with an alphanumeric character",
    );

    c.length("name", &spec.name, 2, 253);
    c.pattern(
        "name",
        &spec.name,
        "name",
        &NAME_RE,
        "must start with a letter, contain only alphanumerics or '-', and end alphanumeric",
    );

    c.length("businessUnit", &spec.business_unit, 2, 63);
    c.pattern(
        "businessUnit",
        &spec.business_unit,
        "name",
        &NAME_RE,
        "must start with a letter, contain only alphanumerics or '-', and end alphanumeric",
    );

    let environment: Option<Environment> =
        c.one_of("environment", &spec.environment, Environment::VALUES);

    c.pattern(
        "version",
        &spec.version,
        "semver",
        &SEMVER_RE,
        "is not a semantic version",
    );

    if let Some(description) = &spec.description {
        c.length("description", description, 0, MAX_DESCRIPTION_LENGTH);
    }

    check_team(&mut c, &spec.team);

    let components: Vec<Option<ValidatedComponent>> = spec
        .composition
        .iter()
        .enumerate()
        .map(|(i, component)| check_component(&mut c, i, component))
        .collect();

    if let Some(jira) = &spec.tracking.jira {
        c.pattern(
            "tracking.jira",
            jira,
            "jira",
            &JIRA_RE,
            "must look like PROJECT-123",
        );
    }
    let repository = c.http_url("tracking.repository", &spec.tracking.repository);
    c.pattern(
        "tracking.pipeline",
        &spec.tracking.pipeline,
        "pipeline",
        &PIPELINE_RE,
        "must start with a letter and contain only alphanumerics, '-' or '/'",
    );
    let documentation = c.http_url("tracking.documentation", &spec.tracking.documentation);

    let tags = spec.tags.clone().unwrap_or_default();
    for (i, tag) in tags.iter().enumerate() {
        c.pattern(
            &format!("tags[{}]", i),
            tag,
            "tag",
            &TAG_RE,
            "must be alphanumeric, '-' or '_' and start and end alphanumeric",
        );
    }

    if !c.violations.is_empty() {
        return Err(c.finish());
    }

    let (Some(environment), Some(repository), Some(documentation), Some(components)) = (
        environment,
        repository,
        documentation,
        components.into_iter().collect::<Option<Vec<_>>>(),
    ) else {
        return Err(c.finish());
    };

    Ok(ValidatedSpec {
        id: spec.id.clone(),
        name: spec.name.clone(),
        business_unit: spec.business_unit.clone(),
        environment,
        version: spec.version.clone(),
        description: spec.description.clone(),
        team: spec.team.clone(),
        components,
        tracking: ValidatedTracking {
            jira: spec.tracking.jira.clone(),
            repository,
            pipeline: spec.tracking.pipeline.clone(),
            documentation,
        },
        tags,
    })
}

fn check_team(c: &mut Checker, team: &TeamInfo) {
    c.pattern(
        "team.owner",
        &team.owner,
        "owner",
        &OWNER_RE,
        "must start with a letter and contain only alphanumerics, '-' or '.'",
    );
    c.pattern(
        "team.email",
        &team.email,
        "email",
        &EMAIL_RE,
        "must be a valid email address",
    );
    c.pattern(
        "team.slack",
        &team.slack,
        "slack",
        &SLACK_RE,
        "must be a slack channel starting with '#'",
    );
}

fn check_component(
    c: &mut Checker,
    index: usize,
    component: &Component,
) -> Option<ValidatedComponent> {
    let path = format!("composition[{}]", index);

    c.pattern(
        &format!("{}.name", path),
        &component.name,
        "name",
        &NAME_RE,
        "must start with a letter, contain only alphanumerics or '-', and end alphanumeric",
    );
    let component_type: Option<ComponentType> = c.one_of(
        &format!("{}.type", path),
        &component.type_,
        ComponentType::VALUES,
    );
    let repository = match &component.repository {
        Some(raw) => Some(c.http_url(&format!("{}.repository", path), raw)?),
        None => None,
    };

    Some(ValidatedComponent {
        name: component.name.clone(),
        component_type: component_type?,
        version: component.version.clone(),
        repository,
        dependencies: component.dependency_names().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::Tracking;
    use rstest::rstest;

    fn valid_spec() -> ApplicationMetadataSpec {
        ApplicationMetadataSpec {
            id: "payments-001".to_string(),
            name: "payments".to_string(),
            business_unit: "fintech".to_string(),
            environment: "production".to_string(),
            version: "v1.4.2".to_string(),
            description: Some("Payment processing".to_string()),
            team: TeamInfo {
                owner: "payments-team".to_string(),
                email: "payments@example.com".to_string(),
                slack: "#payments".to_string(),
            },
            composition: vec![
                Component {
                    name: "api".to_string(),
                    type_: "service".to_string(),
                    version: "1.4.2".to_string(),
                    repository: Some("https://git.example.com/payments/api".to_string()),
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
                jira: Some("PAY-42".to_string()),
                repository: "https://git.example.com/payments".to_string(),
                pipeline: "ci/payments".to_string(),
                documentation: "https://docs.example.com/payments".to_string(),
            },
            tags: Some(vec!["tier-1".to_string(), "pci_scope".to_string()]),
        }
    }

    mod accepted {
        use super::*;

        /// Story: A well-formed spec becomes a typed spec
        ///
        /// Enum strings are resolved and URLs are parsed so later stages
        /// never deal with raw strings.
        #[test]
        fn story_valid_spec_is_typed() {
            let validated = validate(&valid_spec()).unwrap();

            assert_eq!(validated.environment, Environment::Production);
            assert_eq!(validated.components.len(), 2);
            assert_eq!(
                validated.components[0].component_type,
                ComponentType::Service
            );
            assert_eq!(validated.components[0].dependencies, vec!["db"]);
            assert!(validated.components[1].dependencies.is_empty());
            assert_eq!(
                validated.tracking.repository.as_str(),
                "https://git.example.com/payments"
            );
            assert_eq!(validated.tags, vec!["tier-1", "pci_scope"]);
        }

        #[rstest]
        #[case::plain("1.0.0")]
        #[case::leading_v("v2.10.3")]
        #[case::prerelease("1.0.0-alpha.1")]
        #[case::build_metadata("1.0.0+build.5")]
        #[case::both("v1.0.0-rc.1+sha.abc123")]
        fn semver_versions_accepted(#[case] version: &str) {
            let mut spec = valid_spec();
            spec.version = version.to_string();
            assert!(validate(&spec).is_ok(), "{} should be accepted", version);
        }

        #[test]
        fn test_optional_fields_may_be_absent() {
            let mut spec = valid_spec();
            spec.description = None;
            spec.tags = None;
            spec.tracking.jira = None;
            spec.composition.clear();

            let validated = validate(&spec).unwrap();
            assert!(validated.tags.is_empty());
            assert!(validated.components.is_empty());
        }
    }

    mod rejected {
        use super::*;

        /// Story: A malformed email is reported on its field path
        #[test]
        fn story_bad_email_names_team_email() {
            let mut spec = valid_spec();
            spec.team.email = "not-an-email".to_string();

            let err = validate(&spec).unwrap_err();
            assert_eq!(err.violations().len(), 1);
            assert_eq!(err.violations()[0].field, "team.email");
            assert_eq!(err.violations()[0].rule, Rule::Pattern("email"));
            assert!(err.to_string().contains("team.email"));
        }

        /// Story: All violations are reported in one pass
        #[test]
        fn story_every_violation_collected() {
            let mut spec = valid_spec();
            spec.environment = "moon".to_string();
            spec.team.slack = "payments".to_string();
            spec.composition[1].type_ = "lambda".to_string();
            spec.tracking.documentation = "ftp://docs.example.com".to_string();

            let err = validate(&spec).unwrap_err();
            assert!(err.has_field("environment"));
            assert!(err.has_field("team.slack"));
            assert!(err.has_field("composition[1].type"));
            assert!(err.has_field("tracking.documentation"));
            assert_eq!(err.violations().len(), 4);
        }

        #[rstest]
        #[case::id_too_short("id", "ab", "length")]
        #[case::id_leading_hyphen("id", "-abc", "pattern")]
        #[case::name_leading_digit("name", "1payments", "pattern")]
        #[case::business_unit_trailing_hyphen("businessUnit", "fin-", "pattern")]
        #[case::environment_capitalized("environment", "Production", "enum")]
        #[case::version_not_semver("version", "1.0", "pattern")]
        #[case::version_leading_zero("version", "01.0.0", "pattern")]
        fn top_level_field_rejected(
            #[case] field: &str,
            #[case] value: &str,
            #[case] category: &str,
        ) {
            let mut spec = valid_spec();
            match field {
                "id" => spec.id = value.to_string(),
                "name" => spec.name = value.to_string(),
                "businessUnit" => spec.business_unit = value.to_string(),
                "environment" => spec.environment = value.to_string(),
                "version" => spec.version = value.to_string(),
                other => panic!("unknown field {}", other),
            }

            let err = validate(&spec).unwrap_err();
            let violation = err
                .violations()
                .iter()
                .find(|v| v.field == field)
                .unwrap();
            assert_eq!(violation.rule.category(), category);
        }

        #[test]
        fn test_description_too_long() {
            let mut spec = valid_spec();
            spec.description = Some("x".repeat(MAX_DESCRIPTION_LENGTH + 1));

            let err = validate(&spec).unwrap_err();
            assert!(err.has_field("description"));
        }

        #[test]
        fn test_bad_jira_key() {
            let mut spec = valid_spec();
            spec.tracking.jira = Some("pay-42".to_string());

            let err = validate(&spec).unwrap_err();
            assert_eq!(err.violations()[0].rule, Rule::Pattern("jira"));
        }

        #[test]
        fn test_bad_tag_reports_index() {
            let mut spec = valid_spec();
            spec.tags = Some(vec!["ok".to_string(), "-bad".to_string()]);

            let err = validate(&spec).unwrap_err();
            assert!(err.has_field("tags[1]"));
        }

        #[rstest]
        #[case::relative("payments/api")]
        #[case::wrong_scheme("ssh://git.example.com/payments")]
        #[case::no_host("https://")]
        fn bad_component_repository(#[case] url: &str) {
            let mut spec = valid_spec();
            spec.composition[0].repository = Some(url.to_string());

            let err = validate(&spec).unwrap_err();
            assert!(err.has_field("composition[0].repository"));
            assert_eq!(err.violations()[0].rule, Rule::HttpUrl);
        }

        #[test]
        fn test_overlong_url_rejected() {
            let mut spec = valid_spec();
            spec.tracking.repository =
                format!("https://git.example.com/{}", "a".repeat(MAX_URL_LENGTH));

            let err = validate(&spec).unwrap_err();
            assert!(err.has_field("tracking.repository"));
        }
    }

    #[test]
    fn test_rule_categories() {
        assert_eq!(Rule::Pattern("email").category(), "pattern");
        assert_eq!(Rule::Length { min: 1, max: 2 }.category(), "length");
        assert_eq!(Rule::OneOf(Environment::VALUES).category(), "enum");
        assert_eq!(Rule::HttpUrl.category(), "url");
    }
}
