mod broadcasts;
mod channels;
mod webhooks;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use foghorn_core::{ProviderError, StoreError};
use foghorn_sync::SyncError;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/webhooks/newsletter", post(webhooks::handle_webhook))
        .route("/broadcasts", post(broadcasts::create_broadcast))
        .route(
            "/broadcasts/:id",
            get(broadcasts::get_broadcast)
                .patch(broadcasts::update_broadcast)
                .delete(broadcasts::delete_broadcast),
        )
        .route("/broadcasts/:id/send", post(broadcasts::send_broadcast))
        .route(
            "/broadcasts/:id/schedule",
            post(broadcasts::schedule_broadcast),
        )
        .route("/broadcasts/:id/test", post(broadcasts::send_test))
        .route("/broadcasts/:id/preview", get(broadcasts::preview_broadcast))
        .route(
            "/channels",
            get(channels::list_channels).post(channels::create_channel),
        )
        .route(
            "/channels/:id",
            axum::routing::patch(channels::update_channel).delete(channels::delete_channel),
        )
        .route("/internal/reconcile", post(broadcasts::run_reconcile))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    NotFound(&'static str),
    BadRequest(String),
    Provider(ProviderError),
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    success: bool,
    error: String,
    code: &'static str,
}

impl ApiErrorBody {
    fn new(error: String, code: &'static str) -> Json<Self> {
        Json(Self {
            success: false,
            error,
            code,
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ApiErrorBody::new("unauthorized".into(), "unauthorized"),
            )
                .into_response(),
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ApiErrorBody::new(format!("{what} not found"), "not_found"),
            )
                .into_response(),
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody::new(message, "bad_request"),
            )
                .into_response(),
            ApiError::Provider(err) => {
                let status = match &err {
                    ProviderError::NotSupported { .. } => StatusCode::NOT_IMPLEMENTED,
                    ProviderError::Validation { .. } => StatusCode::BAD_REQUEST,
                    ProviderError::NotFound { .. } => StatusCode::NOT_FOUND,
                    ProviderError::InvalidStatus { .. } => StatusCode::CONFLICT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, ApiErrorBody::new(err.to_string(), err.code())).into_response()
            }
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody::new(message, "internal_error"),
            )
                .into_response(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Provider(err) => ApiError::Provider(err),
            SyncError::Store(err) => ApiError::Internal(err.to_string()),
            SyncError::Render(err) => ApiError::BadRequest(err.to_string()),
            SyncError::BroadcastNotFound(_) => ApiError::NotFound("broadcast"),
            SyncError::MissingChannel(_) => {
                ApiError::BadRequest("broadcast has no sendable channel".into())
            }
            SyncError::NotCreated(_) => {
                ApiError::BadRequest("broadcast has not been created in the provider".into())
            }
        }
    }
}

/// Bearer check for the admin surface. An unset token leaves the surface
/// open, which is only meant for local development.
pub fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Ok(());
    };
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if provided == Some(expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::{self, Body};
    use axum::http::Request;
    use chrono::Utc;
    use foghorn_core::{
        Broadcast, BroadcastApiCredentials, BroadcastStatus, ContentDocument, MemoryStore,
        NewsletterSettings, NewsletterStore, ProviderKind, ResendCredentials,
    };
    use foghorn_sync::compute_signature;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::util::ServiceExt;
    use uuid::Uuid;

    const ADMIN: &str = "Bearer test-admin";
    const SECRET: &str = "whsec_test";

    fn test_state(store: Arc<MemoryStore>) -> AppState {
        let config = ServerConfig {
            admin_token: Some("test-admin".into()),
            ..Default::default()
        };
        AppState::new(store, &config)
    }

    fn configured_settings(provider: ProviderKind) -> NewsletterSettings {
        let mut settings = NewsletterSettings::new(provider);
        settings.broadcast_api = Some(BroadcastApiCredentials {
            base_url: "http://localhost:3000".into(),
            production_token: Some("prod".into()),
            development_token: Some("dev".into()),
        });
        settings.resend = Some(ResendCredentials {
            production_key: Some("re_prod".into()),
            development_key: Some("re_dev".into()),
            default_audience_id: None,
        });
        settings.webhook_secret = Some(SECRET.into());
        settings
    }

    async fn read_json(response: Response) -> Value {
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn signed_webhook(body: &Value, secret: &str, age_secs: i64) -> Request<Body> {
        let raw = body.to_string();
        let ts = Utc::now().timestamp() - age_secs;
        let signature = compute_signature(secret, ts, raw.as_bytes());
        Request::builder()
            .method("POST")
            .uri("/webhooks/newsletter")
            .header("content-type", "application/json")
            .header("x-webhook-signature", signature)
            .header("x-webhook-timestamp", ts.to_string())
            .body(Body::from(raw))
            .unwrap()
    }

    #[tokio::test]
    async fn health_check_responds() {
        let app = build_router(test_state(MemoryStore::new()));
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn webhook_without_configured_secret_is_rejected() {
        let store = MemoryStore::new();
        store
            .save_settings(NewsletterSettings::new(ProviderKind::BroadcastApi))
            .await
            .unwrap();
        let app = build_router(test_state(store));

        let event = json!({ "type": "broadcast.sent", "occurred_at": Utc::now(), "data": {} });
        let response = app
            .oneshot(signed_webhook(&event, SECRET, 0))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = read_json(response).await;
        assert_eq!(body["error"], "Webhook not configured");
    }

    #[tokio::test]
    async fn webhook_applies_signed_broadcast_event() {
        let store = MemoryStore::new();
        store
            .save_settings(configured_settings(ProviderKind::BroadcastApi))
            .await
            .unwrap();

        let mut broadcast = Broadcast::new("weekly");
        broadcast.external_id = Some("42".into());
        broadcast.provider_id = Some("42".into());
        broadcast.send_status = BroadcastStatus::Sending;
        let id = broadcast.id;
        store.insert_broadcast(broadcast).await.unwrap();

        let app = build_router(test_state(store.clone()));
        let event = json!({
            "type": "broadcast.sent",
            "occurred_at": Utc::now(),
            "data": { "broadcast_id": 42, "sent_count": 10, "total_count": 10 }
        });
        let response = app
            .oneshot(signed_webhook(&event, SECRET, 0))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["success"], true);

        let stored = store.get_broadcast(id).await.unwrap().unwrap();
        assert_eq!(stored.send_status, BroadcastStatus::Sent);

        let settings = store.load_settings().await.unwrap().unwrap();
        assert_eq!(settings.last_webhook_verified, Some(true));
        assert!(settings.last_webhook_at.is_some());
    }

    #[tokio::test]
    async fn webhook_rejects_bad_signature_and_replays() {
        let store = MemoryStore::new();
        store
            .save_settings(configured_settings(ProviderKind::BroadcastApi))
            .await
            .unwrap();
        let app = build_router(test_state(store.clone()));
        let event = json!({ "type": "broadcast.sent", "occurred_at": Utc::now(), "data": {} });

        let response = app
            .clone()
            .oneshot(signed_webhook(&event, "wrong_secret", 0))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Correctly signed but outside the replay window.
        let response = app
            .oneshot(signed_webhook(&event, SECRET, 400))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let settings = store.load_settings().await.unwrap().unwrap();
        assert_eq!(settings.last_webhook_verified, Some(false));
    }

    #[tokio::test]
    async fn webhook_processing_failure_still_acknowledges() {
        let store = MemoryStore::new();
        store
            .save_settings(configured_settings(ProviderKind::BroadcastApi))
            .await
            .unwrap();
        let app = build_router(test_state(store));

        // Verified but unroutable: broadcast event without an id.
        let event = json!({ "type": "broadcast.sent", "occurred_at": Utc::now(), "data": {} });
        let response = app
            .oneshot(signed_webhook(&event, SECRET, 0))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn admin_surface_requires_bearer_token() {
        let app = build_router(test_state(MemoryStore::new()));
        let uri = format!("/broadcasts/{}/send", Uuid::new_v4());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(&uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(&uri)
                    .header("authorization", "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn send_for_unknown_broadcast_is_404() {
        let store = MemoryStore::new();
        store
            .save_settings(configured_settings(ProviderKind::BroadcastApi))
            .await
            .unwrap();
        let app = build_router(test_state(store));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/broadcasts/{}/send", Uuid::new_v4()))
                    .header("authorization", ADMIN)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(read_json(response).await["code"], "not_found");
    }

    #[tokio::test]
    async fn unsupported_provider_operation_maps_to_501() {
        let store = MemoryStore::new();
        store
            .save_settings(configured_settings(ProviderKind::Resend))
            .await
            .unwrap();

        let mut broadcast = Broadcast::new("weekly");
        broadcast.provider_id = Some("bc_1".into());
        broadcast.external_id = Some("bc_1".into());
        let id = broadcast.id;
        store.insert_broadcast(broadcast).await.unwrap();

        let app = build_router(test_state(store));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/broadcasts/{id}/test"))
                    .header("authorization", ADMIN)
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({ "recipients": ["qa@example.com"] }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        let body = read_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "not_supported");
    }

    #[tokio::test]
    async fn reconcile_returns_structured_summary() {
        let store = MemoryStore::new();
        store
            .save_settings(configured_settings(ProviderKind::BroadcastApi))
            .await
            .unwrap();
        let app = build_router(test_state(store));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/internal/reconcile")
                    .header("authorization", ADMIN)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let summary = read_json(response).await;
        assert_eq!(summary["checked"], 0);
        assert_eq!(summary["updated"], 0);
    }

    #[tokio::test]
    async fn crud_flow_survives_provider_outage() {
        let store = MemoryStore::new();
        // No credentials configured: every sync attempt fails and must be
        // absorbed without failing the local write.
        store
            .save_settings(NewsletterSettings::new(ProviderKind::BroadcastApi))
            .await
            .unwrap();
        let app = build_router(test_state(store));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/broadcasts")
                    .header("authorization", ADMIN)
                    .header("content-type", "application/json")
                    .body(Body::from(json!({ "name": "weekly" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = read_json(response).await;
        let id = created["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri(format!("/broadcasts/{id}"))
                    .header("authorization", ADMIN)
                    .header("content-type", "application/json")
                    .body(Body::from(json!({ "subject": "Hello" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["subject"], "Hello");

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/broadcasts/{id}"))
                    .header("authorization", ADMIN)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["success"], true);
    }

    #[tokio::test]
    async fn preview_renders_broadcast_content() {
        let store = MemoryStore::new();
        let mut broadcast = Broadcast::new("weekly");
        broadcast.content = ContentDocument::paragraph("hello world");
        let id = broadcast.id;
        store.insert_broadcast(broadcast).await.unwrap();
        let app = build_router(test_state(store));

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/broadcasts/{id}/preview"))
                    .header("authorization", ADMIN)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("<p>hello world</p>"));
    }
}
