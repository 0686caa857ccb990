//! # Server Configuration
//!
//! This module contains the server setup and configuration for the connector registry.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::handlers::{self, connectors};
use crate::telemetry;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.cors_allowed_origins);

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/connectors",
            get(connectors::list_connectors).post(connectors::create_connector),
        )
        .route(
            "/connectors/{id}",
            get(connectors::get_connector)
                .patch(connectors::update_connector)
                .delete(connectors::delete_connector),
        )
        .route("/connectors/{id}/sync", post(connectors::trigger_sync))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(axum::middleware::from_fn(telemetry::trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Any origin when `origins` is empty, otherwise only the listed origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        AllowOrigin::list(allowed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            axum::http::header::LOCATION,
            axum::http::HeaderName::from_static(telemetry::TRACE_ID_HEADER),
        ])
        .max_age(Duration::from_secs(3600))
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let addr = config.bind_addr()?;
    let state = AppState {
        config: Arc::new(config),
        db,
    };
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::connectors::list_connectors,
        crate::handlers::connectors::get_connector,
        crate::handlers::connectors::create_connector,
        crate::handlers::connectors::update_connector,
        crate::handlers::connectors::delete_connector,
        crate::handlers::connectors::trigger_sync,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::RunStatus,
            crate::handlers::HealthResponse,
            crate::handlers::connectors::CreateConnectorRequest,
            crate::handlers::connectors::UpdateConnectorRequest,
            crate::handlers::connectors::ConnectorResponse,
            crate::handlers::connectors::DeleteConnectorResponse,
            crate::sync_admission::SyncTriggerResponse,
            crate::error::ApiError,
        )
    ),
    tags(
        (name = "root", description = "Service metadata and health"),
        (name = "connectors", description = "Connector definitions and sync admission")
    ),
    info(
        title = "Connector Registry API",
        description = "Registry of data-pipeline connector definitions with sync admission control",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
