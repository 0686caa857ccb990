//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM operations
//! for the connector registry.

pub mod connector;

pub use connector::{ConnectorPatch, ConnectorRepository, CreateConnector, next_timestamp};
