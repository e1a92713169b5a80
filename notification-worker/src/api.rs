use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use notification_common::message::Channel;
use notification_common::response::ApiResponse;
use notification_common::status::StatusRecord;
use notification_common::store::StatusStore;

use crate::clients::health::HealthChecker;
use crate::models::health::HealthStatus;

pub struct AppState {
    pub channel: Channel,
    pub store: Arc<dyn StatusStore>,
    pub health_checker: HealthChecker,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status/{request_id}", get(read_status))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(state: Arc<AppState>, port: u16) -> Result<(), anyhow::Error> {
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Status API server started");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn read_status(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> impl IntoResponse {
    let key = state.channel.idempotency_key(&request_id);

    match state.store.get(&key).await {
        Ok(Some(record)) => (
            StatusCode::OK,
            Json(ApiResponse::success(record, "status_found")),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<StatusRecord>::error(
                format!("No status for request {}", request_id),
                "not_found",
            )),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<StatusRecord>::error(
                e.to_string(),
                "internal_error",
            )),
        ),
    }
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(ApiResponse::success(health, "health")))
}
