//! Broadcast CRUD hooks and admin actions.
//!
//! The CRUD endpoints mirror the CMS lifecycle hooks: persist locally
//! first, then run best-effort provider sync. A provider outage never
//! fails a local write. Admin actions go the other way and surface
//! provider errors to the caller.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Html;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use foghorn_core::{Broadcast, ContentDocument};
use foghorn_sync::{run_sweep, SweepSummary};

use crate::routes::{require_admin, ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBroadcastRequest {
    pub name: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub preheader: Option<String>,
    #[serde(default)]
    pub content: Option<ContentDocument>,
    #[serde(default)]
    pub channel_id: Option<Uuid>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub segment_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBroadcastRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub preheader: Option<String>,
    #[serde(default)]
    pub content: Option<ContentDocument>,
    #[serde(default)]
    pub channel_id: Option<Uuid>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub track_opens: Option<bool>,
    #[serde(default)]
    pub track_clicks: Option<bool>,
    #[serde(default)]
    pub segment_ids: Option<Vec<String>>,
    #[serde(default)]
    pub published: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct TestSendRequest {
    pub recipients: Vec<String>,
}

pub async fn create_broadcast(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateBroadcastRequest>,
) -> Result<(StatusCode, Json<Broadcast>), ApiError> {
    require_admin(&state, &headers)?;

    let mut broadcast = Broadcast::new(req.name);
    if let Some(subject) = req.subject {
        broadcast.subject = subject;
    }
    broadcast.preheader = req.preheader;
    if let Some(content) = req.content {
        broadcast.content = content;
    }
    broadcast.channel_id = req.channel_id;
    broadcast.reply_to = req.reply_to;
    if let Some(segments) = req.segment_ids {
        broadcast.segment_ids = segments;
    }

    state.store.insert_broadcast(broadcast.clone()).await?;
    state.engine.sync_after_save(None, &broadcast).await;

    let stored = state
        .store
        .get_broadcast(broadcast.id)
        .await?
        .ok_or(ApiError::NotFound("broadcast"))?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn get_broadcast(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Broadcast> {
    require_admin(&state, &headers)?;
    let broadcast = state
        .store
        .get_broadcast(id)
        .await?
        .ok_or(ApiError::NotFound("broadcast"))?;
    Ok(Json(broadcast))
}

pub async fn update_broadcast(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateBroadcastRequest>,
) -> ApiResult<Broadcast> {
    require_admin(&state, &headers)?;
    let previous = state
        .store
        .get_broadcast(id)
        .await?
        .ok_or(ApiError::NotFound("broadcast"))?;

    let mut current = previous.clone();
    if let Some(name) = req.name {
        current.name = name;
    }
    if let Some(subject) = req.subject {
        current.subject = subject;
    }
    if let Some(preheader) = req.preheader {
        current.preheader = Some(preheader);
    }
    if let Some(content) = req.content {
        current.content = content;
    }
    if let Some(channel_id) = req.channel_id {
        current.channel_id = Some(channel_id);
    }
    if let Some(reply_to) = req.reply_to {
        current.reply_to = Some(reply_to);
    }
    if let Some(flag) = req.track_opens {
        current.track_opens = flag;
    }
    if let Some(flag) = req.track_clicks {
        current.track_clicks = flag;
    }
    if let Some(segments) = req.segment_ids {
        current.segment_ids = segments;
    }
    if let Some(published) = req.published {
        current.published = published;
    }

    state.store.replace_broadcast(current.clone()).await?;
    state.engine.sync_after_save(Some(&previous), &current).await;

    let stored = state
        .store
        .get_broadcast(id)
        .await?
        .ok_or(ApiError::NotFound("broadcast"))?;
    Ok(Json(stored))
}

pub async fn delete_broadcast(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    require_admin(&state, &headers)?;
    let broadcast = state
        .store
        .get_broadcast(id)
        .await?
        .ok_or(ApiError::NotFound("broadcast"))?;
    state.engine.sync_delete(&broadcast).await;
    state.store.delete_broadcast(id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn send_broadcast(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Broadcast> {
    require_admin(&state, &headers)?;
    let broadcast = state.engine.send_now(id).await?;
    Ok(Json(broadcast))
}

pub async fn schedule_broadcast(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<ScheduleRequest>,
) -> ApiResult<Broadcast> {
    require_admin(&state, &headers)?;
    let broadcast = state.engine.schedule(id, req.scheduled_at).await?;
    Ok(Json(broadcast))
}

pub async fn send_test(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<TestSendRequest>,
) -> ApiResult<Value> {
    require_admin(&state, &headers)?;
    if req.recipients.is_empty() {
        return Err(ApiError::BadRequest("recipients must not be empty".into()));
    }
    state.engine.send_test(id, &req.recipients).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn preview_broadcast(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Html<String>, ApiError> {
    require_admin(&state, &headers)?;
    let html = state.engine.preview(id).await?;
    Ok(Html(html))
}

/// Externally scheduled reconciliation trigger.
pub async fn run_reconcile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<SweepSummary> {
    require_admin(&state, &headers)?;
    let summary = run_sweep(&state.store, &state.providers, &state.reconcile).await?;
    Ok(Json(summary))
}
