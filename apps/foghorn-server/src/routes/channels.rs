//! Channel CRUD hooks. Same local-first policy as broadcasts: the store
//! write succeeds regardless of whether the provider mirror does.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use foghorn_core::{Channel, ChannelPatch, NewsletterSettings};

use crate::routes::{require_admin, ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub from_name: String,
    pub from_email: String,
    #[serde(default)]
    pub reply_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChannelRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub from_email: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

pub async fn list_channels(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<Channel>> {
    require_admin(&state, &headers)?;
    Ok(Json(state.store.list_channels().await?))
}

pub async fn create_channel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateChannelRequest>,
) -> Result<(StatusCode, Json<Channel>), ApiError> {
    require_admin(&state, &headers)?;
    let provider = state
        .store
        .load_settings()
        .await?
        .unwrap_or_else(NewsletterSettings::from_env)
        .provider;

    let mut channel = Channel::new(req.name, req.from_name, req.from_email, provider);
    channel.description = req.description;
    channel.reply_to = req.reply_to;

    state.store.insert_channel(channel.clone()).await?;
    state.engine.sync_channel_create(&channel).await;

    let stored = state
        .store
        .get_channel(channel.id)
        .await?
        .ok_or(ApiError::NotFound("channel"))?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn update_channel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateChannelRequest>,
) -> ApiResult<Channel> {
    require_admin(&state, &headers)?;
    let patch = ChannelPatch {
        name: req.name,
        description: req.description,
        from_name: req.from_name,
        from_email: req.from_email,
        reply_to: req.reply_to,
        active: req.active,
        ..Default::default()
    };
    let updated = state
        .store
        .update_channel(id, patch)
        .await?
        .ok_or(ApiError::NotFound("channel"))?;
    state.engine.sync_channel_update(&updated).await;
    Ok(Json(updated))
}

pub async fn delete_channel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    require_admin(&state, &headers)?;
    let channel = state
        .store
        .get_channel(id)
        .await?
        .ok_or(ApiError::NotFound("channel"))?;
    state.engine.sync_channel_delete(&channel).await;
    state.store.delete_channel(id).await?;
    Ok(Json(json!({ "success": true })))
}
