//! Connector entity model
//!
//! This module contains the SeaORM entity model for the connectors table. A
//! connector pairs a source extractor with a target loader and an opaque JSON
//! configuration, and tracks the status of its most recent sync run.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

/// Status of the most recent sync run of a connector.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No run has ever been admitted
    #[sea_orm(string_value = "not_run_yet")]
    NotRunYet,
    /// A run has been admitted and has not reported completion
    #[sea_orm(string_value = "running")]
    Running,
    /// The last run completed successfully
    #[sea_orm(string_value = "success")]
    Success,
    /// The last run failed
    #[sea_orm(string_value = "failure")]
    Failure,
}

impl RunStatus {
    /// Whether a new sync run may be admitted from this status.
    pub fn admits_trigger(self) -> bool {
        match self {
            RunStatus::Running => false,
            RunStatus::NotRunYet | RunStatus::Success | RunStatus::Failure => true,
        }
    }

    /// Wire/database representation of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::NotRunYet => "not_run_yet",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connector entity
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "connectors")]
pub struct Model {
    /// Store-assigned identity (primary key, never reused)
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Unique, case-sensitive connector name
    #[sea_orm(unique)]
    pub name: String,

    /// Identifier of the extraction source (e.g. "tap-github")
    pub source: String,

    /// Identifier of the load destination (e.g. "target-postgres")
    pub target: String,

    /// Opaque configuration object, stored verbatim
    #[sea_orm(column_type = "Json")]
    pub configuration: JsonValue,

    /// Status of the most recent sync run
    pub run_status: RunStatus,

    /// When the most recent run was admitted; `None` if never run
    pub last_run_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    /// Strictly increasing across mutations of the same row
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
