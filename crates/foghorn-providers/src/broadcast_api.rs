//! Adapter for the self-hosted Broadcast API.
//!
//! REST surface under `/api/v1/{broadcasts,channels}` with numeric ids and
//! bearer-token auth. Creation returns only an id; the adapter performs
//! the follow-up fetch so callers always get a fully-populated entity.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use foghorn_core::{
    BroadcastAnalytics, BroadcastApiCredentials, BroadcastStatus, ProviderError, RuntimeEnv,
};

use crate::credentials::{normalize_base_url, select_token};
use crate::{
    validate_create, BroadcastProvider, CreateBroadcast, CreateChannel, ProviderCapabilities,
    RemoteBroadcast, RemoteChannel, UpdateBroadcast, UpdateChannel,
};

const PROVIDER: &str = "broadcast_api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

static CAPABILITIES: ProviderCapabilities = ProviderCapabilities {
    supports_scheduling: true,
    supports_segmentation: true,
    supports_analytics: true,
    supports_ab_testing: false,
    supports_templates: false,
    supports_personalization: true,
    supports_multiple_channels: true,
    supports_channel_segmentation: true,
    editable_statuses: &[
        BroadcastStatus::Draft,
        BroadcastStatus::Scheduled,
        BroadcastStatus::Paused,
        BroadcastStatus::Failed,
    ],
    supported_content_types: &["text/html"],
};

#[derive(Debug)]
pub struct BroadcastApiProvider {
    http: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ApiBroadcast {
    id: i64,
    status: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiChannel {
    id: i64,
    name: String,
    #[serde(default)]
    from_name: Option<String>,
    #[serde(default)]
    from_email: Option<String>,
    #[serde(default)]
    reply_to: Option<String>,
    #[serde(default)]
    subscriber_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiCreated {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiStats {
    #[serde(default)]
    recipients: u64,
    #[serde(default)]
    sent: u64,
    #[serde(default)]
    delivered: u64,
    #[serde(default)]
    opened: u64,
    #[serde(default)]
    clicked: u64,
    #[serde(default)]
    bounced: u64,
    #[serde(default)]
    complained: u64,
    #[serde(default)]
    unsubscribed: u64,
}

impl BroadcastApiProvider {
    pub fn new(
        credentials: &BroadcastApiCredentials,
        env: RuntimeEnv,
    ) -> Result<Self, ProviderError> {
        let token = select_token(
            PROVIDER,
            env,
            credentials.production_token.as_deref(),
            credentials.development_token.as_deref(),
        )?;
        let base_url = normalize_base_url(&credentials.base_url);
        if base_url.is_empty() {
            return Err(ProviderError::Configuration {
                provider: PROVIDER,
                message: "base URL is not configured".to_string(),
            });
        }
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| ProviderError::Configuration {
                provider: PROVIDER,
                message: format!("http client build failed: {err}"),
            })?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method, &url).bearer_auth(&self.token);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let res = req.send().await.map_err(|err| ProviderError::Remote {
            provider: PROVIDER,
            status: None,
            body: err.to_string(),
        })?;
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound {
                provider: PROVIDER,
                entity: path.to_string(),
            });
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ProviderError::Remote {
                provider: PROVIDER,
                status: Some(status.as_u16()),
                body,
            });
        }
        res.json::<T>().await.map_err(|err| ProviderError::Remote {
            provider: PROVIDER,
            status: Some(status.as_u16()),
            body: format!("response decode failed: {err}"),
        })
    }

    async fn request_ack(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(), ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method, &url).bearer_auth(&self.token);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let res = req.send().await.map_err(|err| ProviderError::Remote {
            provider: PROVIDER,
            status: None,
            body: err.to_string(),
        })?;
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound {
                provider: PROVIDER,
                entity: path.to_string(),
            });
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ProviderError::Remote {
                provider: PROVIDER,
                status: Some(status.as_u16()),
                body,
            });
        }
        Ok(())
    }

    /// Refuses edits outside the editable-status set, per the contract.
    async fn ensure_editable(&self, id: &str) -> Result<(), ProviderError> {
        let current = self.get_broadcast(id).await?;
        if !CAPABILITIES.can_edit(current.status) {
            return Err(ProviderError::InvalidStatus {
                provider: PROVIDER,
                status: current.status,
            });
        }
        Ok(())
    }

    fn remote_from(&self, api: ApiBroadcast) -> RemoteBroadcast {
        let id = api.id.to_string();
        RemoteBroadcast {
            external_id: id.clone(),
            id,
            status: self.map_native_status(&api.status),
            native_status: api.status,
            subject: api.subject,
            scheduled_at: api.scheduled_at,
            sent_at: api.sent_at,
        }
    }

    fn channel_from(api: ApiChannel) -> RemoteChannel {
        RemoteChannel {
            id: api.id.to_string(),
            name: api.name,
            from_name: api.from_name,
            from_email: api.from_email,
            reply_to: api.reply_to,
            subscriber_count: api.subscriber_count,
        }
    }

    fn create_body(req: &CreateBroadcast) -> Result<serde_json::Value, ProviderError> {
        // The API keys broadcasts to numeric channel ids.
        let channel_id: i64 =
            req.channel_id
                .parse()
                .map_err(|_| ProviderError::Validation {
                    provider: PROVIDER,
                    message: format!("channel id {:?} is not numeric", req.channel_id),
                })?;
        let mut body = json!({
            "channel_id": channel_id,
            "name": req.name,
            "subject": req.subject,
            "body": req.html,
        });
        let obj = body.as_object_mut().unwrap();
        if let Some(preheader) = &req.preheader {
            obj.insert("preheader".into(), json!(preheader));
        }
        if let Some(reply_to) = &req.reply_to {
            obj.insert("reply_to".into(), json!(reply_to));
        }
        if let Some(track) = req.track_opens {
            obj.insert("track_opens".into(), json!(track));
        }
        if let Some(track) = req.track_clicks {
            obj.insert("track_clicks".into(), json!(track));
        }
        if !req.segment_ids.is_empty() {
            obj.insert("segment_ids".into(), json!(req.segment_ids));
        }
        if let Some(at) = req.scheduled_at {
            obj.insert("scheduled_at".into(), json!(at));
        }
        Ok(body)
    }

    fn update_body(req: &UpdateBroadcast) -> serde_json::Value {
        let mut body = json!({});
        let obj = body.as_object_mut().unwrap();
        if let Some(name) = &req.name {
            obj.insert("name".into(), json!(name));
        }
        if let Some(subject) = &req.subject {
            obj.insert("subject".into(), json!(subject));
        }
        if let Some(preheader) = &req.preheader {
            obj.insert("preheader".into(), json!(preheader));
        }
        if let Some(html) = &req.html {
            obj.insert("body".into(), json!(html));
        }
        if let Some(reply_to) = &req.reply_to {
            obj.insert("reply_to".into(), json!(reply_to));
        }
        if let Some(track) = req.track_opens {
            obj.insert("track_opens".into(), json!(track));
        }
        if let Some(track) = req.track_clicks {
            obj.insert("track_clicks".into(), json!(track));
        }
        if let Some(segments) = &req.segment_ids {
            obj.insert("segment_ids".into(), json!(segments));
        }
        body
    }
}

#[async_trait]
impl BroadcastProvider for BroadcastApiProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &CAPABILITIES
    }

    async fn validate_configuration(&self) -> Result<(), ProviderError> {
        self.request::<Vec<ApiChannel>>(Method::GET, "/api/v1/channels", None)
            .await
            .map(|_| ())
    }

    async fn list_channels(&self) -> Result<Vec<RemoteChannel>, ProviderError> {
        let channels = self
            .request::<Vec<ApiChannel>>(Method::GET, "/api/v1/channels", None)
            .await?;
        Ok(channels.into_iter().map(Self::channel_from).collect())
    }

    async fn get_channel(&self, id: &str) -> Result<RemoteChannel, ProviderError> {
        let channel = self
            .request::<ApiChannel>(Method::GET, &format!("/api/v1/channels/{id}"), None)
            .await?;
        Ok(Self::channel_from(channel))
    }

    async fn create_channel(&self, req: &CreateChannel) -> Result<RemoteChannel, ProviderError> {
        let body = json!({
            "name": req.name,
            "description": req.description,
            "from_name": req.from_name,
            "from_email": req.from_email,
            "reply_to": req.reply_to,
        });
        let created = self
            .request::<ApiCreated>(Method::POST, "/api/v1/channels", Some(body))
            .await?;
        self.get_channel(&created.id.to_string()).await
    }

    async fn update_channel(
        &self,
        id: &str,
        req: &UpdateChannel,
    ) -> Result<RemoteChannel, ProviderError> {
        let mut body = json!({});
        let obj = body.as_object_mut().unwrap();
        if let Some(name) = &req.name {
            obj.insert("name".into(), json!(name));
        }
        if let Some(description) = &req.description {
            obj.insert("description".into(), json!(description));
        }
        if let Some(from_name) = &req.from_name {
            obj.insert("from_name".into(), json!(from_name));
        }
        if let Some(from_email) = &req.from_email {
            obj.insert("from_email".into(), json!(from_email));
        }
        if let Some(reply_to) = &req.reply_to {
            obj.insert("reply_to".into(), json!(reply_to));
        }
        let channel = self
            .request::<ApiChannel>(Method::PATCH, &format!("/api/v1/channels/{id}"), Some(body))
            .await?;
        Ok(Self::channel_from(channel))
    }

    async fn delete_channel(&self, id: &str) -> Result<(), ProviderError> {
        self.request_ack(Method::DELETE, &format!("/api/v1/channels/{id}"), None)
            .await
    }

    async fn list_broadcasts(&self) -> Result<Vec<RemoteBroadcast>, ProviderError> {
        let broadcasts = self
            .request::<Vec<ApiBroadcast>>(Method::GET, "/api/v1/broadcasts", None)
            .await?;
        Ok(broadcasts
            .into_iter()
            .map(|b| self.remote_from(b))
            .collect())
    }

    async fn get_broadcast(&self, id: &str) -> Result<RemoteBroadcast, ProviderError> {
        let broadcast = self
            .request::<ApiBroadcast>(Method::GET, &format!("/api/v1/broadcasts/{id}"), None)
            .await?;
        Ok(self.remote_from(broadcast))
    }

    async fn create_broadcast(
        &self,
        req: &CreateBroadcast,
    ) -> Result<RemoteBroadcast, ProviderError> {
        validate_create(PROVIDER, req)?;
        let body = Self::create_body(req)?;
        let created = self
            .request::<ApiCreated>(Method::POST, "/api/v1/broadcasts", Some(body))
            .await?;
        // The API returns only an id on create.
        self.get_broadcast(&created.id.to_string()).await
    }

    async fn update_broadcast(
        &self,
        id: &str,
        req: &UpdateBroadcast,
    ) -> Result<RemoteBroadcast, ProviderError> {
        self.ensure_editable(id).await?;
        let broadcast = self
            .request::<ApiBroadcast>(
                Method::PATCH,
                &format!("/api/v1/broadcasts/{id}"),
                Some(Self::update_body(req)),
            )
            .await?;
        Ok(self.remote_from(broadcast))
    }

    async fn delete_broadcast(&self, id: &str) -> Result<(), ProviderError> {
        self.ensure_editable(id).await?;
        self.request_ack(Method::DELETE, &format!("/api/v1/broadcasts/{id}"), None)
            .await
    }

    async fn send(&self, id: &str) -> Result<(), ProviderError> {
        self.request_ack(Method::POST, &format!("/api/v1/broadcasts/{id}/send"), None)
            .await
    }

    async fn schedule(&self, id: &str, at: DateTime<Utc>) -> Result<(), ProviderError> {
        self.request_ack(
            Method::POST,
            &format!("/api/v1/broadcasts/{id}/schedule"),
            Some(json!({ "scheduled_at": at })),
        )
        .await
    }

    async fn cancel_schedule(&self, id: &str) -> Result<(), ProviderError> {
        self.request_ack(
            Method::DELETE,
            &format!("/api/v1/broadcasts/{id}/schedule"),
            None,
        )
        .await
    }

    async fn send_test(&self, id: &str, recipients: &[String]) -> Result<(), ProviderError> {
        if recipients.is_empty() {
            return Err(ProviderError::Validation {
                provider: PROVIDER,
                message: "test send requires at least one recipient".to_string(),
            });
        }
        self.request_ack(
            Method::POST,
            &format!("/api/v1/broadcasts/{id}/test"),
            Some(json!({ "emails": recipients })),
        )
        .await
    }

    async fn get_analytics(&self, id: &str) -> Result<BroadcastAnalytics, ProviderError> {
        let stats = self
            .request::<ApiStats>(Method::GET, &format!("/api/v1/broadcasts/{id}/stats"), None)
            .await?;
        Ok(BroadcastAnalytics {
            recipient_count: stats.recipients,
            sent: stats.sent,
            delivered: stats.delivered,
            opened: stats.opened,
            clicked: stats.clicked,
            bounced: stats.bounced,
            complained: stats.complained,
            unsubscribed: stats.unsubscribed,
            fetched_at: Some(Utc::now()),
        })
    }

    fn map_native_status(&self, native: &str) -> BroadcastStatus {
        match native {
            "draft" => BroadcastStatus::Draft,
            "scheduled" => BroadcastStatus::Scheduled,
            "queueing" | "sending" => BroadcastStatus::Sending,
            "sent" => BroadcastStatus::Sent,
            "failed" => BroadcastStatus::Failed,
            "paused" => BroadcastStatus::Paused,
            "aborted" | "canceled" => BroadcastStatus::Canceled,
            other => {
                warn!(provider = PROVIDER, status = other, "unmapped provider status, defaulting to draft");
                BroadcastStatus::Draft
            }
        }
    }

    fn native_status(&self, status: BroadcastStatus) -> &'static str {
        match status {
            BroadcastStatus::Draft => "draft",
            BroadcastStatus::Scheduled => "scheduled",
            BroadcastStatus::Sending => "sending",
            BroadcastStatus::Sent => "sent",
            BroadcastStatus::Failed => "failed",
            BroadcastStatus::Paused => "paused",
            BroadcastStatus::Canceled => "aborted",
        }
    }
}
