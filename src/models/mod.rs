//! # Data Models
//!
//! This module contains the data models used throughout the connector registry.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod connector;
pub mod patch;

pub use connector::Entity as Connector;
pub use connector::RunStatus;
pub use patch::Patch;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "connector-registry".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
