//! Inbound provider webhook endpoint.
//!
//! Status codes are part of the provider contract: verification failures
//! return 401 so the provider knows the delivery was rejected, while
//! post-verification processing failures return 200 with
//! `{"success": false}` so the provider does not retry events we already
//! consumed.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::{error, warn};

use foghorn_core::NewsletterSettings;
use foghorn_sync::{verify_signature, WebhookEvent};

use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-webhook-signature";
const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";

pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let settings = match state.store.load_settings().await {
        Ok(stored) => stored.unwrap_or_else(NewsletterSettings::from_env),
        Err(err) => {
            error!(error = %err, "settings load failed during webhook handling");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "settings unavailable" })),
            )
                .into_response();
        }
    };

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let timestamp = headers.get(TIMESTAMP_HEADER).and_then(|v| v.to_str().ok());

    if let Err(err) = verify_signature(
        settings.webhook_secret.as_deref(),
        signature,
        timestamp,
        &body,
        Utc::now(),
    ) {
        warn!(error = %err, "webhook verification failed");
        stamp_webhook(&state, settings, false).await;
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response();
    }
    stamp_webhook(&state, settings, true).await;

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "webhook body is not a valid event");
            return (
                StatusCode::OK,
                Json(json!({ "success": false, "error": err.to_string() })),
            )
                .into_response();
        }
    };

    match state.webhooks.route(&event).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(err) => {
            error!(event_type = %event.event_type, error = %err, "webhook routing failed");
            (
                StatusCode::OK,
                Json(json!({ "success": false, "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

/// Observability stamp; failures here must not affect the response.
async fn stamp_webhook(state: &AppState, mut settings: NewsletterSettings, verified: bool) {
    settings.last_webhook_at = Some(Utc::now());
    settings.last_webhook_verified = Some(verified);
    if let Err(err) = state.store.save_settings(settings).await {
        error!(error = %err, "failed to persist webhook observability fields");
    }
}
