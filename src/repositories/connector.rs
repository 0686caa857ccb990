//! # Connector Repository
//!
//! Durable record set for connectors. Enforces name uniqueness, default values
//! and the field-level partial update merge. Every mutation advances
//! `updated_at`, and updates are applied as a compare-and-swap on the previous
//! `updated_at` so concurrent writers cannot silently overwrite each other.
//!
//! Each write is a single statement. Name uniqueness is left to the unique
//! index on `name`, whose violations surface as validation errors.

use chrono::{Duration, SubsecRound, Utc};
use metrics::counter;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde_json::{Value as JsonValue, json};
use tracing::{debug, info, instrument};

use crate::error::{RepositoryError, is_unique_violation};
use crate::models::connector::{self, ActiveModel as ConnectorActiveModel, Model as ConnectorModel};
use crate::models::{Connector, Patch, RunStatus};

/// Upper bound on compare-and-swap attempts before giving up with a conflict.
pub const MAX_WRITE_ATTEMPTS: usize = 5;

/// Input for creating a connector
#[derive(Debug, Clone)]
pub struct CreateConnector {
    pub name: String,
    pub source: String,
    pub target: String,
    /// Defaults to an empty object
    pub configuration: Option<JsonValue>,
}

/// Field-level partial update of a connector.
///
/// `Patch::Unset` leaves the stored value untouched; `Patch::Set` overwrites it.
/// For `last_run_at`, `Patch::Set(None)` clears the timestamp.
#[derive(Debug, Clone, Default)]
pub struct ConnectorPatch {
    pub name: Patch<String>,
    pub source: Patch<String>,
    pub target: Patch<String>,
    pub configuration: Patch<JsonValue>,
    pub run_status: Patch<RunStatus>,
    pub last_run_at: Patch<Option<DateTimeWithTimeZone>>,
}

impl ConnectorPatch {
    /// Check supplied values and the merged record invariants against `current`.
    fn validate(&self, current: &ConnectorModel) -> Result<(), RepositoryError> {
        if let Some(name) = self.name.as_set() {
            require_non_blank("name", name)?;
        }
        if let Some(source) = self.source.as_set() {
            require_non_blank("source", source)?;
        }
        if let Some(target) = self.target.as_set() {
            require_non_blank("target", target)?;
        }
        if let Some(configuration) = self.configuration.as_set() {
            require_object(configuration)?;
        }

        let run_status = self.run_status.clone().merged(current.run_status);
        let last_run_at = self.last_run_at.clone().merged(current.last_run_at);
        if run_status == RunStatus::Running && last_run_at.is_none() {
            return Err(RepositoryError::validation_error(
                "last_run_at",
                "a running connector must have a last_run_at timestamp",
            ));
        }

        Ok(())
    }

    /// The record as stored once this patch has been written over `current`.
    fn apply(self, current: ConnectorModel, updated_at: DateTimeWithTimeZone) -> ConnectorModel {
        ConnectorModel {
            name: self.name.merged(current.name),
            source: self.source.merged(current.source),
            target: self.target.merged(current.target),
            configuration: self.configuration.merged(current.configuration),
            run_status: self.run_status.merged(current.run_status),
            last_run_at: self.last_run_at.merged(current.last_run_at),
            updated_at,
            ..current
        }
    }

    fn into_active_model(self, updated_at: DateTimeWithTimeZone) -> ConnectorActiveModel {
        ConnectorActiveModel {
            id: ActiveValue::NotSet,
            name: self.name.into_active_value(),
            source: self.source.into_active_value(),
            target: self.target.into_active_value(),
            configuration: self.configuration.into_active_value(),
            run_status: self.run_status.into_active_value(),
            last_run_at: self.last_run_at.into_active_value(),
            created_at: ActiveValue::NotSet,
            updated_at: Set(updated_at),
        }
    }
}

/// Wall-clock time rounded up to whole microseconds, the resolution Postgres
/// stores. Never earlier than the instant of the call.
fn now_micros() -> DateTimeWithTimeZone {
    let now = Utc::now();
    let truncated = now.trunc_subsecs(6);
    if truncated < now {
        (truncated + Duration::microseconds(1)).into()
    } else {
        truncated.into()
    }
}

/// Next `updated_at` for a row last written at `previous`: the current time,
/// but never less than one microsecond after `previous`.
pub fn next_timestamp(previous: DateTimeWithTimeZone) -> DateTimeWithTimeZone {
    now_micros().max(previous + Duration::microseconds(1))
}

fn require_non_blank(field: &'static str, value: &str) -> Result<(), RepositoryError> {
    if value.trim().is_empty() {
        return Err(RepositoryError::validation_error(
            field,
            format!("{field} must not be empty"),
        ));
    }
    Ok(())
}

fn require_object(configuration: &JsonValue) -> Result<(), RepositoryError> {
    if !configuration.is_object() {
        return Err(RepositoryError::validation_error(
            "configuration",
            "configuration must be a JSON object",
        ));
    }
    Ok(())
}

fn duplicate_name(name: &str) -> RepositoryError {
    RepositoryError::validation_error("name", format!("connector name '{name}' already exists"))
}

/// Translate a write failure, surfacing unique index hits on `name` as validation errors.
fn map_write_error(error: DbErr, name: &str) -> RepositoryError {
    if is_unique_violation(&error) {
        duplicate_name(name)
    } else {
        RepositoryError::database_error(error)
    }
}

/// Repository for connector database operations
pub struct ConnectorRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> ConnectorRepository<'a> {
    /// Create a new ConnectorRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a connector in the `not_run_yet` state
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: CreateConnector) -> Result<ConnectorModel, RepositoryError> {
        require_non_blank("name", &input.name)?;
        require_non_blank("source", &input.source)?;
        require_non_blank("target", &input.target)?;
        let configuration = input.configuration.unwrap_or_else(|| json!({}));
        require_object(&configuration)?;

        let now = now_micros();
        let connector = ConnectorActiveModel {
            id: ActiveValue::NotSet,
            name: Set(input.name.clone()),
            source: Set(input.source.clone()),
            target: Set(input.target.clone()),
            configuration: Set(configuration.clone()),
            run_status: Set(RunStatus::NotRunYet),
            last_run_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = Connector::insert(connector)
            .exec(self.db)
            .await
            .map_err(|err| map_write_error(err, &input.name))?;

        let created = ConnectorModel {
            id: inserted.last_insert_id,
            name: input.name,
            source: input.source,
            target: input.target,
            configuration,
            run_status: RunStatus::NotRunYet,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        };

        counter!("connector_mutations_total", "operation" => "create").increment(1);
        info!(connector_id = created.id, "Connector created");

        Ok(created)
    }

    /// Get a connector by id; `None` if it does not exist
    pub async fn get(&self, id: i32) -> Result<Option<ConnectorModel>, RepositoryError> {
        let connector = Connector::find_by_id(id).one(self.db).await?;
        Ok(connector)
    }

    /// List all connectors in id order
    pub async fn list(&self) -> Result<Vec<ConnectorModel>, RepositoryError> {
        let connectors = Connector::find()
            .order_by_asc(connector::Column::Id)
            .all(self.db)
            .await?;
        Ok(connectors)
    }

    /// Apply a partial update and return the fully merged record.
    ///
    /// Fails with [`RepositoryError::NotFound`] for an unknown id and with
    /// [`RepositoryError::Conflict`] if the row kept changing underneath
    /// [`MAX_WRITE_ATTEMPTS`] consecutive attempts.
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        id: i32,
        patch: ConnectorPatch,
    ) -> Result<ConnectorModel, RepositoryError> {
        let requested_name = patch.name.as_set().map(String::as_str).unwrap_or_default();

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let current = Connector::find_by_id(id)
                .one(self.db)
                .await?
                .ok_or(RepositoryError::NotFound(id))?;

            patch.validate(&current)?;

            let updated_at = next_timestamp(current.updated_at);
            let result = Connector::update_many()
                .set(patch.clone().into_active_model(updated_at))
                .filter(connector::Column::Id.eq(id))
                .filter(connector::Column::UpdatedAt.eq(current.updated_at))
                .exec(self.db)
                .await
                .map_err(|err| map_write_error(err, requested_name))?;

            if result.rows_affected == 0 {
                // Changed or deleted since the read; the next read tells which
                debug!(attempt, "Connector changed concurrently, retrying update");
                continue;
            }

            // The guard pinned the row to `current`, so the merge is exactly what was stored
            let updated = patch.clone().apply(current, updated_at);

            counter!("connector_mutations_total", "operation" => "update").increment(1);
            info!(
                connector_id = id,
                run_status = %updated.run_status,
                "Connector updated"
            );

            return Ok(updated);
        }

        Err(RepositoryError::Conflict(id))
    }

    /// Delete a connector; returns whether a record existed and was removed
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<bool, RepositoryError> {
        let result = Connector::delete_by_id(id).exec(self.db).await?;
        let deleted = result.rows_affected > 0;

        if deleted {
            counter!("connector_mutations_total", "operation" => "delete").increment(1);
            info!(connector_id = id, "Connector deleted");
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn model(run_status: RunStatus, last_run_at: Option<DateTimeWithTimeZone>) -> ConnectorModel {
        let now: DateTimeWithTimeZone = Utc::now().into();
        ConnectorModel {
            id: 1,
            name: "gh-to-pg".to_string(),
            source: "tap-github".to_string(),
            target: "target-postgres".to_string(),
            configuration: json!({}),
            run_status,
            last_run_at,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn next_timestamp_is_strictly_after_previous() {
        let future: DateTimeWithTimeZone = Utc
            .with_ymd_and_hms(2999, 1, 1, 0, 0, 0)
            .unwrap()
            .into();
        assert_eq!(next_timestamp(future), future + Duration::microseconds(1));

        let past: DateTimeWithTimeZone = Utc
            .with_ymd_and_hms(2000, 1, 1, 0, 0, 0)
            .unwrap()
            .into();
        let next = next_timestamp(past);
        assert!(next > past);
        assert_eq!(next.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn now_is_never_before_the_call() {
        for _ in 0..1_000 {
            let started = Utc::now();
            let now = now_micros();
            assert!(now >= DateTimeWithTimeZone::from(started));
            assert_eq!(now.timestamp_subsec_nanos() % 1_000, 0);
        }
    }

    #[test]
    fn apply_merges_supplied_fields_over_current() {
        let current = model(RunStatus::Success, Some(Utc::now().into()));
        let updated_at = next_timestamp(current.updated_at);
        let patch = ConnectorPatch {
            target: Patch::Set("target-bigquery".to_string()),
            last_run_at: Patch::Set(None),
            ..Default::default()
        };

        let merged = patch.apply(current.clone(), updated_at);

        assert_eq!(merged.target, "target-bigquery");
        assert_eq!(merged.last_run_at, None);
        assert_eq!(merged.name, current.name);
        assert_eq!(merged.source, current.source);
        assert_eq!(merged.run_status, RunStatus::Success);
        assert_eq!(merged.created_at, current.created_at);
        assert_eq!(merged.updated_at, updated_at);
    }

    #[test]
    fn blank_strings_are_rejected() {
        assert!(require_non_blank("name", "").is_err());
        assert!(require_non_blank("name", "  \t").is_err());
        assert!(require_non_blank("name", " padded ").is_ok());
    }

    #[test]
    fn configuration_must_be_an_object() {
        assert!(require_object(&json!({})).is_ok());
        assert!(require_object(&json!({"a": [1, 2]})).is_ok());
        assert!(require_object(&json!([])).is_err());
        assert!(require_object(&json!("x")).is_err());
        assert!(require_object(&JsonValue::Null).is_err());
    }

    #[test]
    fn running_without_last_run_at_is_rejected() {
        let patch = ConnectorPatch {
            run_status: Patch::Set(RunStatus::Running),
            ..Default::default()
        };
        let err = patch.validate(&model(RunStatus::Success, None)).unwrap_err();
        assert!(matches!(err, RepositoryError::Validation { field: "last_run_at", .. }));

        // Clearing the timestamp of a running connector breaks the same invariant
        let patch = ConnectorPatch {
            last_run_at: Patch::Set(None),
            ..Default::default()
        };
        let running = model(RunStatus::Running, Some(Utc::now().into()));
        assert!(patch.validate(&running).is_err());
    }

    #[test]
    fn running_with_existing_last_run_at_is_accepted() {
        let patch = ConnectorPatch {
            run_status: Patch::Set(RunStatus::Running),
            ..Default::default()
        };
        let current = model(RunStatus::Failure, Some(Utc::now().into()));
        assert!(patch.validate(&current).is_ok());
    }

    #[test]
    fn empty_patch_only_touches_updated_at() {
        let patch = ConnectorPatch::default();
        let now: DateTimeWithTimeZone = Utc::now().into();
        let active = patch.into_active_model(now);
        assert!(matches!(active.name, ActiveValue::NotSet));
        assert!(matches!(active.last_run_at, ActiveValue::NotSet));
        assert!(matches!(active.created_at, ActiveValue::NotSet));
        assert!(matches!(active.updated_at, ActiveValue::Set(ts) if ts == now));
    }
}
