use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use notification_common::bus::{BusPublisher, USER_CREATED_ROUTING_KEY};
use notification_common::message::{Channel, EnqueuedMessage};
use notification_common::response::ApiResponse;
use notification_common::status::{admission_key, callback_key, StatusRecord};
use notification_common::store::StatusStore;

use crate::config::Config;
use crate::error::ApiError;
use crate::models::{NotificationPayload, StatusCallbackPayload, UserCreatedEvent, UserPayload};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn StatusStore>,
    pub publisher: Arc<dyn BusPublisher>,
}

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/notifications/", post(submit_notification))
        .route("/notifications/{request_id}/", get(read_submission_status))
        .route("/users/", post(create_user))
        .route("/{channel}/status/", post(ingest_status))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .nest("/api/v1", v1)
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(state: AppState) -> Result<(), anyhow::Error> {
    let addr = format!("0.0.0.0:{}", state.config.port);
    let app = router(state);

    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Gateway server started");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Shared-secret authentication for the `/api/v1` subtree.
async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided.is_empty() || provided != state.config.api_key {
        warn!(path = %req.uri().path(), "Rejected request with missing or invalid api key");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(req).await)
}

/// Notification submission: idempotent admission, then publish to the
/// channel routing key. The admission record is written atomically; losing
/// the race is the same as observing a duplicate.
async fn submit_notification(
    State(state): State<AppState>,
    payload: Result<Json<NotificationPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    payload.validate()?;

    let request = payload.into_request();
    let channel = request.notification_type;
    let request_id = request.request_id.clone();
    let key = admission_key(&request_id);
    let ttl = state.config.idempotency_ttl_seconds;

    if let Some(existing) = state.store.get(&key).await? {
        return Ok(duplicate_response(existing));
    }

    let admitted = state
        .store
        .put_if_absent(&key, &StatusRecord::pending(), ttl)
        .await?;

    if !admitted {
        let existing = state
            .store
            .get(&key)
            .await?
            .unwrap_or_else(StatusRecord::pending);
        return Ok(duplicate_response(existing));
    }

    let message = EnqueuedMessage::new(request);
    let bytes = serde_json::to_vec(&message)
        .map_err(|e| ApiError::Infrastructure(e.to_string()))?;

    match state
        .publisher
        .publish(channel.as_str(), &bytes, message.request.priority)
        .await
    {
        Ok(()) => {
            info!(request_id = %request_id, channel = %channel, "Notification accepted");

            let body = ApiResponse::success(
                serde_json::json!({ "request_id": request_id }),
                "accepted",
            );
            Ok((StatusCode::ACCEPTED, Json(body)).into_response())
        }
        Err(e) => {
            error!(request_id = %request_id, error = %e, "Publish failed");

            let failed = StatusRecord::failed(None, e.to_string());
            if let Err(we) = state.store.put(&key, &failed, ttl).await {
                error!(request_id = %request_id, error = %we, "Failed to record publish failure");
            }

            Err(ApiError::Infrastructure(format!(
                "Failed to enqueue notification: {}",
                e
            )))
        }
    }
}

fn duplicate_response(existing: StatusRecord) -> Response {
    (
        StatusCode::OK,
        Json(ApiResponse::success(existing, "duplicate_request")),
    )
        .into_response()
}

/// Supplementary read of the admission record.
async fn read_submission_status(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Response, ApiError> {
    let record = state
        .store
        .get(&admission_key(&request_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No submission for request {}", request_id)))?;

    Ok((StatusCode::OK, Json(ApiResponse::success(record, "status_found"))).into_response())
}

/// Out-of-band producer path; no idempotency guard.
async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<UserPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(user) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    user.validate()?;

    let event = UserCreatedEvent {
        user,
        created_at: Utc::now(),
    };
    let bytes =
        serde_json::to_vec(&event).map_err(|e| ApiError::Infrastructure(e.to_string()))?;

    state
        .publisher
        .publish(USER_CREATED_ROUTING_KEY, &bytes, 0)
        .await
        .map_err(|e| ApiError::Infrastructure(format!("Failed to publish user event: {}", e)))?;

    info!(email = %event.user.email, "User event published");

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(event.user, "accepted")),
    )
        .into_response())
}

/// External delivery-status ingestion, keyed by notification id.
async fn ingest_status(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    payload: Result<Json<StatusCallbackPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let channel = Channel::parse(&channel)
        .ok_or_else(|| ApiError::Validation(format!("Unknown channel: {}", channel)))?;

    let Json(callback) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;

    if callback.notification_id.trim().is_empty() {
        return Err(ApiError::Validation("notification_id must not be empty".into()));
    }

    let key = callback_key(&callback.notification_id);
    let record = callback.into_record();

    state
        .store
        .put(&key, &record, state.config.status_ttl_seconds)
        .await?;

    info!(key = %key, channel = %channel, status = %record.status, "Status callback recorded");

    Ok((StatusCode::OK, Json(ApiResponse::success(record, "status_recorded"))).into_response())
}

async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::success(
        serde_json::json!({ "status": "alive" }),
        "health",
    ))
}
