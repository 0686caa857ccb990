//! # Connector Registry Library
//!
//! This library provides the core functionality for the connector registry
//! service: the connector store, sync admission control, HTTP handlers and
//! server configuration.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod server;
pub mod sync_admission;
pub mod telemetry;
pub use migration;
