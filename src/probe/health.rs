//! Component health probe

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::validation::ValidatedComponent;
use crate::Error;

/// Result of a component health check
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentHealth {
    /// Whether the component is healthy
    pub healthy: bool,
    /// Explanation of the result
    pub detail: String,
}

impl ComponentHealth {
    /// A healthy result
    pub fn healthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: true,
            detail: detail.into(),
        }
    }

    /// An unhealthy result
    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: detail.into(),
        }
    }
}

/// Evaluates the liveness of one component
///
/// Implementations that inspect backing workloads can be swapped in without
/// touching the engine.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ComponentHealthProbe: Send + Sync {
    /// Check one component
    async fn check_health(&self, component: &ValidatedComponent) -> Result<ComponentHealth, Error>;
}

/// Default probe that reports every component healthy
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysHealthy;

#[async_trait]
impl ComponentHealthProbe for AlwaysHealthy {
    async fn check_health(&self, component: &ValidatedComponent) -> Result<ComponentHealth, Error> {
        Ok(ComponentHealth::healthy(format!(
            "Component '{}' is healthy",
            component.name
        )))
    }
}
