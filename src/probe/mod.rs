//! External probes
//!
//! The engine depends only on the [`RepositoryProbe`] and
//! [`ComponentHealthProbe`] traits. A probe reports a negative result as a
//! value; `Err` is reserved for failures that are not an answer at all.

mod health;
mod repository;

pub use health::{AlwaysHealthy, ComponentHealth, ComponentHealthProbe};
pub use repository::{HttpRepositoryProbe, Reachability, RepositoryProbe};

#[cfg(test)]
pub use health::MockComponentHealthProbe;
#[cfg(test)]
pub use repository::MockRepositoryProbe;
