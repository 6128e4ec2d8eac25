//! Custom Resource Definitions for the AppMetadata controller
//!
//! This module contains the ApplicationMetadata CRD and the status
//! vocabulary shared by the validator, composer and metrics.

mod application;
mod types;

pub use application::{
    ApplicationMetadata, ApplicationMetadataSpec, ApplicationMetadataStatus, Component, TeamInfo,
    Tracking,
};
pub use types::{Condition, ConditionStatus, ConditionType, ComponentType, Environment, Phase};
