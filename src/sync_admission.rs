//! Sync admission control.
//!
//! Decides whether a new sync run may start for a connector and, if so,
//! performs the single transition into `running`. The read-check-write is a
//! compare-and-swap on the stored row (`run_status <> running` and an
//! unchanged `updated_at`), so concurrent triggers against the same connector,
//! from this process or any other instance sharing the database, admit at most
//! one run.

use metrics::counter;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

use crate::error::RepositoryError;
use crate::models::connector::{self, ActiveModel as ConnectorActiveModel, Model as ConnectorModel};
use crate::models::{Connector, RunStatus};
use crate::repositories::connector::{MAX_WRITE_ATTEMPTS, next_timestamp};

/// Result of a trigger request. Rejections are outcomes, not faults.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionOutcome {
    /// The run was admitted; carries the connector in its `running` state
    Admitted(ConnectorModel),
    /// A run is already in flight; nothing changed
    AlreadyRunning,
    /// No connector with the requested id
    NotFound,
}

impl AdmissionOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self, AdmissionOutcome::Admitted(_))
    }

    pub fn reason(&self) -> &'static str {
        match self {
            AdmissionOutcome::Admitted(_) => "sync triggered",
            AdmissionOutcome::AlreadyRunning => "already running",
            AdmissionOutcome::NotFound => "connector not found",
        }
    }

    fn metric_label(&self) -> &'static str {
        match self {
            AdmissionOutcome::Admitted(_) => "admitted",
            AdmissionOutcome::AlreadyRunning => "already_running",
            AdmissionOutcome::NotFound => "not_found",
        }
    }
}

/// Response body for a trigger request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SyncTriggerResponse {
    /// Whether a new run was admitted
    pub accepted: bool,
    /// Human-readable explanation of the decision
    #[schema(example = "already running")]
    pub reason: String,
}

impl From<&AdmissionOutcome> for SyncTriggerResponse {
    fn from(outcome: &AdmissionOutcome) -> Self {
        Self {
            accepted: outcome.accepted(),
            reason: outcome.reason().to_string(),
        }
    }
}

/// Admission controller for connector sync runs
pub struct SyncAdmission<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> SyncAdmission<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Try to start a sync run for `id`.
    ///
    /// Allowed from `not_run_yet`, `success` and `failure`; sets `run_status`
    /// to `running` and `last_run_at`/`updated_at` to the same fresh timestamp.
    #[instrument(skip(self))]
    pub async fn trigger(&self, id: i32) -> Result<AdmissionOutcome, RepositoryError> {
        let outcome = self.try_admit(id).await?;

        counter!("connector_sync_triggers_total", "outcome" => outcome.metric_label())
            .increment(1);
        match &outcome {
            AdmissionOutcome::Admitted(connector) => {
                info!(connector_id = id, last_run_at = %connector.updated_at, "Sync run admitted")
            }
            rejected => info!(connector_id = id, reason = rejected.reason(), "Sync trigger rejected"),
        }

        Ok(outcome)
    }

    async fn try_admit(&self, id: i32) -> Result<AdmissionOutcome, RepositoryError> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let Some(current) = Connector::find_by_id(id).one(self.db).await? else {
                return Ok(AdmissionOutcome::NotFound);
            };

            if !current.run_status.admits_trigger() {
                return Ok(AdmissionOutcome::AlreadyRunning);
            }

            let started_at = next_timestamp(current.updated_at);
            let result = Connector::update_many()
                .set(running_since(started_at))
                .filter(connector::Column::Id.eq(id))
                .filter(connector::Column::RunStatus.ne(RunStatus::Running))
                .filter(connector::Column::UpdatedAt.eq(current.updated_at))
                .exec(self.db)
                .await?;

            if result.rows_affected == 1 {
                return Ok(AdmissionOutcome::Admitted(ConnectorModel {
                    run_status: RunStatus::Running,
                    last_run_at: Some(started_at),
                    updated_at: started_at,
                    ..current
                }));
            }

            // Lost the race; the next read decides between running, gone or retry
            debug!(attempt, "Connector changed during admission, re-reading");
        }

        Err(RepositoryError::Conflict(id))
    }
}

fn running_since(started_at: DateTimeWithTimeZone) -> ConnectorActiveModel {
    ConnectorActiveModel {
        id: ActiveValue::NotSet,
        name: ActiveValue::NotSet,
        source: ActiveValue::NotSet,
        target: ActiveValue::NotSet,
        configuration: ActiveValue::NotSet,
        run_status: Set(RunStatus::Running),
        last_run_at: Set(Some(started_at)),
        created_at: ActiveValue::NotSet,
        updated_at: Set(started_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn connector() -> ConnectorModel {
        let now: DateTimeWithTimeZone = Utc::now().into();
        ConnectorModel {
            id: 9,
            name: "gh-to-pg".to_string(),
            source: "tap-github".to_string(),
            target: "target-postgres".to_string(),
            configuration: json!({}),
            run_status: RunStatus::Running,
            last_run_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn outcome_reasons() {
        let admitted = AdmissionOutcome::Admitted(connector());
        assert!(admitted.accepted());
        assert_eq!(admitted.reason(), "sync triggered");

        assert!(!AdmissionOutcome::AlreadyRunning.accepted());
        assert_eq!(AdmissionOutcome::AlreadyRunning.reason(), "already running");

        assert!(!AdmissionOutcome::NotFound.accepted());
        assert_eq!(AdmissionOutcome::NotFound.reason(), "connector not found");
    }

    #[test]
    fn rejection_serializes_as_trigger_response() {
        let response = SyncTriggerResponse::from(&AdmissionOutcome::AlreadyRunning);
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({ "accepted": false, "reason": "already running" })
        );
    }

    #[test]
    fn running_transition_only_touches_status_columns() {
        let started_at: DateTimeWithTimeZone = Utc::now().into();
        let active = running_since(started_at);
        assert!(matches!(active.name, ActiveValue::NotSet));
        assert!(matches!(active.configuration, ActiveValue::NotSet));
        assert!(matches!(active.run_status, ActiveValue::Set(RunStatus::Running)));
        assert!(matches!(active.last_run_at, ActiveValue::Set(Some(ts)) if ts == started_at));
    }
}
