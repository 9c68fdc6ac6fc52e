use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::application::registration_service::{
    RawSelection, RegistrationService, ServiceError, SubmitPayload, ValidationResult,
};
use crate::application::status::StatusService;
use crate::domain::registration::{ContactInfo, RegistrationId};
use crate::domain::storage::{Bucket, ObjectKey, ObjectStore, StorageError};
use crate::infrastructure::storage::UrlSigner;

pub struct AppState {
    pub registrations: Arc<RegistrationService>,
    pub status: Arc<StatusService>,
    pub store: Arc<dyn ObjectStore>,
    pub signer: UrlSigner,
    pub operator_token: String,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/registrations", post(submit_registration))
        .route("/registrations/{id}/status", get(registration_status))
        .route("/registrations/{id}/reprocess", post(reprocess_registration))
        .route("/artifacts/{bucket}/{*key}", get(serve_artifact))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub contact: ContactInfo,
    pub events: Vec<RawSelection>,
    /// Base64-encoded portrait of the primary contact.
    #[serde(default)]
    pub photo_base64: Option<String>,
}

async fn submit_registration(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitRequest>,
) -> impl IntoResponse {
    let photo = match &request.photo_base64 {
        Some(encoded) => match BASE64.decode(encoded.as_bytes()) {
            Ok(bytes) => Some(bytes),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "photo_base64 is not valid base64" })),
                );
            }
        },
        None => None,
    };

    let payload = SubmitPayload {
        contact: request.contact,
        selections: request.events,
        photo,
    };

    match state.registrations.submit(payload).await {
        Ok(receipt) => (
            StatusCode::CREATED,
            Json(json!({
                "validation": ValidationResult::accepted(),
                "registration_id": receipt.registration_id,
                "registration_code": receipt.registration_code,
                "job": receipt.job,
            })),
        ),
        Err(ServiceError::Admission(e)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "validation": ValidationResult::rejected(&e) })),
        ),
        Err(e) => {
            tracing::error!("Submit failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
        }
    }
}

async fn registration_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(id) = parse_registration_id(&id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid registration id" })),
        );
    };

    match state.status.view(id).await {
        Ok(Some(view)) => (StatusCode::OK, Json(json!(view))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "registration not found" })),
        ),
        Err(e) => {
            tracing::error!("Status view failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
        }
    }
}

async fn reprocess_registration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !operator_authorized(&headers, &state.operator_token) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "operator token required" })),
        );
    }

    let Some(id) = parse_registration_id(&id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid registration id" })),
        );
    };

    match state.registrations.reprocess(id).await {
        Ok(handle) => (StatusCode::ACCEPTED, Json(json!({ "job": handle }))),
        Err(ServiceError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "registration not found" })),
        ),
        Err(ServiceError::InvalidState { status }) => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": format!("reprocess not permitted from status '{status}'"),
            })),
        ),
        Err(e) => {
            tracing::error!("Reprocess failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
        }
    }
}

#[derive(Deserialize)]
struct ArtifactQuery {
    expires: i64,
    sig: String,
}

/// Serve an artifact addressed by a signed, time-limited URL.
async fn serve_artifact(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ArtifactQuery>,
) -> axum::response::Response {
    let Ok(bucket) = bucket.parse::<Bucket>() else {
        return (StatusCode::NOT_FOUND, "unknown bucket").into_response();
    };
    let object = ObjectKey::new(bucket, key);

    if !state.signer.verify(&object, query.expires, &query.sig) {
        return (StatusCode::FORBIDDEN, "link expired or invalid").into_response();
    }

    match state.store.get(&object).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(StorageError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, "artifact not found").into_response()
        }
        Err(e) => {
            tracing::error!("Artifact read failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}

fn parse_registration_id(raw: &str) -> Option<RegistrationId> {
    Uuid::parse_str(raw).ok().map(RegistrationId)
}

fn operator_authorized(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|presented| presented == token)
}
