//! # Connectors API Handlers
//!
//! CRUD endpoints for connector definitions plus the sync trigger endpoint.

use axum::{
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, header},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use utoipa::ToSchema;

use crate::error::{ApiError, connector_not_found, validation_error};
use crate::models::connector::Model as ConnectorModel;
use crate::models::{Patch, RunStatus};
use crate::repositories::{ConnectorPatch, ConnectorRepository, CreateConnector};
use crate::server::AppState;
use crate::sync_admission::{SyncAdmission, SyncTriggerResponse};

/// Request payload for creating a connector
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateConnectorRequest {
    /// Unique connector name
    #[schema(example = "gh-to-pg")]
    pub name: String,
    /// Extraction source identifier
    #[schema(example = "tap-github")]
    pub source: String,
    /// Load destination identifier
    #[schema(example = "target-postgres")]
    pub target: String,
    /// Arbitrary JSON object; defaults to `{}`
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub configuration: Option<JsonValue>,
}

/// Partial update payload. Omitted fields are left untouched; `last_run_at: null` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateConnectorRequest {
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schema(value_type = Option<String>)]
    pub name: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schema(value_type = Option<String>)]
    pub source: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schema(value_type = Option<String>)]
    pub target: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schema(value_type = Option<Object>)]
    pub configuration: Patch<JsonValue>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schema(value_type = Option<RunStatus>)]
    pub run_status: Patch<RunStatus>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub last_run_at: Patch<Option<DateTime<Utc>>>,
}

impl From<UpdateConnectorRequest> for ConnectorPatch {
    fn from(request: UpdateConnectorRequest) -> Self {
        Self {
            name: request.name,
            source: request.source,
            target: request.target,
            configuration: request.configuration,
            run_status: request.run_status,
            last_run_at: request
                .last_run_at
                .map(|last_run_at| last_run_at.map(Into::into)),
        }
    }
}

/// Connector representation returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConnectorResponse {
    #[schema(example = 1)]
    pub id: i32,
    #[schema(example = "gh-to-pg")]
    pub name: String,
    #[schema(example = "tap-github")]
    pub source: String,
    #[schema(example = "target-postgres")]
    pub target: String,
    #[schema(value_type = Object)]
    pub configuration: JsonValue,
    pub run_status: RunStatus,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ConnectorModel> for ConnectorResponse {
    fn from(model: ConnectorModel) -> Self {
        Self {
            id: model.id,
            name: model.name,
            source: model.source,
            target: model.target,
            configuration: model.configuration,
            run_status: model.run_status,
            last_run_at: model.last_run_at.map(|ts| ts.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

/// Result of a delete request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeleteConnectorResponse {
    /// Whether a connector existed and was removed
    pub deleted: bool,
}

fn connector_id(path: Result<Path<i32>, PathRejection>) -> Result<i32, ApiError> {
    match path {
        Ok(Path(id)) => Ok(id),
        Err(rejection) => Err(validation_error(
            "Invalid connector id",
            json!({ "field": "id", "message": rejection.body_text() }),
        )),
    }
}

/// List all connectors in id order
#[utoipa::path(
    get,
    path = "/connectors",
    responses(
        (status = 200, description = "All connectors", body = Vec<ConnectorResponse>),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "connectors"
)]
pub async fn list_connectors(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConnectorResponse>>, ApiError> {
    let connectors = ConnectorRepository::new(&state.db).list().await?;

    Ok(Json(
        connectors.into_iter().map(ConnectorResponse::from).collect(),
    ))
}

/// Get a connector by id
#[utoipa::path(
    get,
    path = "/connectors/{id}",
    params(("id" = i32, Path, description = "Connector id")),
    responses(
        (status = 200, description = "Connector found", body = ConnectorResponse),
        (status = 404, description = "Connector not found", body = ApiError)
    ),
    tag = "connectors"
)]
pub async fn get_connector(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
) -> Result<Json<ConnectorResponse>, ApiError> {
    let id = connector_id(path)?;

    ConnectorRepository::new(&state.db)
        .get(id)
        .await?
        .map(|connector| Json(connector.into()))
        .ok_or_else(|| connector_not_found(id))
}

/// Create a connector
#[utoipa::path(
    post,
    path = "/connectors",
    request_body = CreateConnectorRequest,
    responses(
        (status = 201, description = "Connector created", body = ConnectorResponse, headers(
            ("Location", description = "URL of the created connector"),
            ("X-Trace-Id", description = "Trace identifier for request correlation")
        )),
        (status = 400, description = "Validation failed or name already taken", body = ApiError)
    ),
    tag = "connectors"
)]
pub async fn create_connector(
    State(state): State<AppState>,
    payload: Result<Json<CreateConnectorRequest>, JsonRejection>,
) -> Result<
    (
        StatusCode,
        [(header::HeaderName, String); 1],
        Json<ConnectorResponse>,
    ),
    ApiError,
> {
    let Json(request) = payload?;

    let connector = ConnectorRepository::new(&state.db)
        .create(CreateConnector {
            name: request.name,
            source: request.source,
            target: request.target,
            configuration: request.configuration,
        })
        .await?;

    let location = format!("/connectors/{}", connector.id);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(connector.into()),
    ))
}

/// Partially update a connector
#[utoipa::path(
    patch,
    path = "/connectors/{id}",
    params(("id" = i32, Path, description = "Connector id")),
    request_body = UpdateConnectorRequest,
    responses(
        (status = 200, description = "Connector updated", body = ConnectorResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 404, description = "Connector not found", body = ApiError),
        (status = 409, description = "Concurrent modification, retry", body = ApiError)
    ),
    tag = "connectors"
)]
pub async fn update_connector(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
    payload: Result<Json<UpdateConnectorRequest>, JsonRejection>,
) -> Result<Json<ConnectorResponse>, ApiError> {
    let id = connector_id(path)?;
    let Json(request) = payload?;

    let connector = ConnectorRepository::new(&state.db)
        .update(id, request.into())
        .await?;

    Ok(Json(connector.into()))
}

/// Delete a connector
#[utoipa::path(
    delete,
    path = "/connectors/{id}",
    params(("id" = i32, Path, description = "Connector id")),
    responses(
        (status = 200, description = "Whether a connector was removed", body = DeleteConnectorResponse)
    ),
    tag = "connectors"
)]
pub async fn delete_connector(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
) -> Result<Json<DeleteConnectorResponse>, ApiError> {
    let id = connector_id(path)?;
    let deleted = ConnectorRepository::new(&state.db).delete(id).await?;

    Ok(Json(DeleteConnectorResponse { deleted }))
}

/// Trigger a sync run
///
/// Rejections (already running, unknown connector) are reported in the body
/// with `accepted: false`, not as HTTP errors.
#[utoipa::path(
    post,
    path = "/connectors/{id}/sync",
    params(("id" = i32, Path, description = "Connector id")),
    responses(
        (status = 200, description = "Admission decision", body = SyncTriggerResponse),
        (status = 409, description = "Concurrent modification, retry", body = ApiError)
    ),
    tag = "connectors"
)]
pub async fn trigger_sync(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
) -> Result<Json<SyncTriggerResponse>, ApiError> {
    let id = connector_id(path)?;
    let outcome = SyncAdmission::new(&state.db).trigger(id).await?;

    Ok(Json(SyncTriggerResponse::from(&outcome)))
}
