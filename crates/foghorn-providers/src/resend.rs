//! Adapter for the hosted Resend email API.
//!
//! String ids throughout; channels map onto Resend audiences. Several
//! operations have no documented API (audience update, schedule
//! cancellation, per-broadcast analytics, test sends) and fail fast with
//! typed `NotSupported` errors instead of guessed requests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use foghorn_core::{
    BroadcastAnalytics, BroadcastStatus, ProviderError, ResendCredentials, RuntimeEnv,
};

use crate::credentials::select_token;
use crate::{
    validate_create, BroadcastProvider, CreateBroadcast, CreateChannel, ProviderCapabilities,
    RemoteBroadcast, RemoteChannel, UpdateBroadcast, UpdateChannel,
};

const PROVIDER: &str = "resend";
const BASE_URL: &str = "https://api.resend.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

static CAPABILITIES: ProviderCapabilities = ProviderCapabilities {
    supports_scheduling: true,
    supports_segmentation: false,
    supports_analytics: false,
    supports_ab_testing: false,
    supports_templates: false,
    supports_personalization: false,
    supports_multiple_channels: true,
    supports_channel_segmentation: false,
    editable_statuses: &[BroadcastStatus::Draft, BroadcastStatus::Scheduled],
    supported_content_types: &["text/html"],
};

#[derive(Debug)]
pub struct ResendProvider {
    http: Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ResendBroadcast {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ResendAudience {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResendCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ResendList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

impl ResendProvider {
    pub fn new(credentials: &ResendCredentials, env: RuntimeEnv) -> Result<Self, ProviderError> {
        let api_key = select_token(
            PROVIDER,
            env,
            credentials.production_key.as_deref(),
            credentials.development_key.as_deref(),
        )?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| ProviderError::Configuration {
                provider: PROVIDER,
                message: format!("http client build failed: {err}"),
            })?;
        Ok(Self { http, api_key })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ProviderError> {
        let url = format!("{BASE_URL}{path}");
        let mut req = self.http.request(method, &url).bearer_auth(&self.api_key);
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

    fn remote_from(&self, api: ResendBroadcast) -> RemoteBroadcast {
        let native = api.status.unwrap_or_else(|| "draft".to_string());
        RemoteBroadcast {
            external_id: api.id.clone(),
            id: api.id,
            status: self.map_native_status(&native),
            native_status: native,
            subject: api.subject,
            scheduled_at: api.scheduled_at,
            sent_at: api.sent_at,
        }
    }

    fn from_header(req: &CreateBroadcast) -> Option<String> {
        let email = req.from_email.as_deref()?;
        Some(match req.from_name.as_deref() {
            Some(name) => format!("{name} <{email}>"),
            None => email.to_string(),
        })
    }
}

#[async_trait]
impl BroadcastProvider for ResendProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &CAPABILITIES
    }

    async fn validate_configuration(&self) -> Result<(), ProviderError> {
        self.request::<ResendList<ResendAudience>>(Method::GET, "/audiences", None)
            .await
            .map(|_| ())
    }

    async fn list_channels(&self) -> Result<Vec<RemoteChannel>, ProviderError> {
        let audiences = self
            .request::<ResendList<ResendAudience>>(Method::GET, "/audiences", None)
            .await?;
        Ok(audiences
            .data
            .into_iter()
            .map(|a| RemoteChannel {
                id: a.id,
                name: a.name,
                from_name: None,
                from_email: None,
                reply_to: None,
                subscriber_count: None,
            })
            .collect())
    }

    async fn get_channel(&self, id: &str) -> Result<RemoteChannel, ProviderError> {
        let audience = self
            .request::<ResendAudience>(Method::GET, &format!("/audiences/{id}"), None)
            .await?;
        Ok(RemoteChannel {
            id: audience.id,
            name: audience.name,
            from_name: None,
            from_email: None,
            reply_to: None,
            subscriber_count: None,
        })
    }

    async fn create_channel(&self, req: &CreateChannel) -> Result<RemoteChannel, ProviderError> {
        let created = self
            .request::<ResendCreated>(
                Method::POST,
                "/audiences",
                Some(json!({ "name": req.name })),
            )
            .await?;
        self.get_channel(&created.id).await
    }

    async fn update_channel(
        &self,
        _id: &str,
        _req: &UpdateChannel,
    ) -> Result<RemoteChannel, ProviderError> {
        // Audiences expose no update API.
        Err(ProviderError::NotSupported {
            provider: PROVIDER,
            operation: "update_channel",
        })
    }

    async fn delete_channel(&self, id: &str) -> Result<(), ProviderError> {
        self.request::<serde_json::Value>(Method::DELETE, &format!("/audiences/{id}"), None)
            .await
            .map(|_| ())
    }

    async fn list_broadcasts(&self) -> Result<Vec<RemoteBroadcast>, ProviderError> {
        let broadcasts = self
            .request::<ResendList<ResendBroadcast>>(Method::GET, "/broadcasts", None)
            .await?;
        Ok(broadcasts
            .data
            .into_iter()
            .map(|b| self.remote_from(b))
            .collect())
    }

    async fn get_broadcast(&self, id: &str) -> Result<RemoteBroadcast, ProviderError> {
        let broadcast = self
            .request::<ResendBroadcast>(Method::GET, &format!("/broadcasts/{id}"), None)
            .await?;
        Ok(self.remote_from(broadcast))
    }

    async fn create_broadcast(
        &self,
        req: &CreateBroadcast,
    ) -> Result<RemoteBroadcast, ProviderError> {
        validate_create(PROVIDER, req)?;
        let from = Self::from_header(req).ok_or_else(|| ProviderError::Validation {
            provider: PROVIDER,
            message: "a from address is required".to_string(),
        })?;
        let mut body = json!({
            "audience_id": req.channel_id,
            "name": req.name,
            "subject": req.subject,
            "from": from,
            "html": req.html,
        });
        let obj = body.as_object_mut().unwrap();
        if let Some(preheader) = &req.preheader {
            obj.insert("preview_text".into(), json!(preheader));
        }
        if let Some(reply_to) = &req.reply_to {
            obj.insert("reply_to".into(), json!(reply_to));
        }
        let created = self
            .request::<ResendCreated>(Method::POST, "/broadcasts", Some(body))
            .await?;
        // Creation returns only the id; fetch the populated record.
        self.get_broadcast(&created.id).await
    }

    async fn update_broadcast(
        &self,
        id: &str,
        req: &UpdateBroadcast,
    ) -> Result<RemoteBroadcast, ProviderError> {
        self.ensure_editable(id).await?;
        let mut body = json!({});
        let obj = body.as_object_mut().unwrap();
        if let Some(name) = &req.name {
            obj.insert("name".into(), json!(name));
        }
        if let Some(subject) = &req.subject {
            obj.insert("subject".into(), json!(subject));
        }
        if let Some(preheader) = &req.preheader {
            obj.insert("preview_text".into(), json!(preheader));
        }
        if let Some(html) = &req.html {
            obj.insert("html".into(), json!(html));
        }
        if let Some(reply_to) = &req.reply_to {
            obj.insert("reply_to".into(), json!(reply_to));
        }
        self.request::<ResendCreated>(Method::PATCH, &format!("/broadcasts/{id}"), Some(body))
            .await?;
        self.get_broadcast(id).await
    }

    async fn delete_broadcast(&self, id: &str) -> Result<(), ProviderError> {
        self.ensure_editable(id).await?;
        self.request::<serde_json::Value>(Method::DELETE, &format!("/broadcasts/{id}"), None)
            .await
            .map(|_| ())
    }

    async fn send(&self, id: &str) -> Result<(), ProviderError> {
        self.request::<ResendCreated>(
            Method::POST,
            &format!("/broadcasts/{id}/send"),
            Some(json!({})),
        )
        .await
        .map(|_| ())
    }

    async fn schedule(&self, id: &str, at: DateTime<Utc>) -> Result<(), ProviderError> {
        self.request::<ResendCreated>(
            Method::POST,
            &format!("/broadcasts/{id}/send"),
            Some(json!({ "scheduled_at": at.to_rfc3339() })),
        )
        .await
        .map(|_| ())
    }

    async fn cancel_schedule(&self, _id: &str) -> Result<(), ProviderError> {
        Err(ProviderError::NotSupported {
            provider: PROVIDER,
            operation: "cancel_schedule",
        })
    }

    async fn send_test(&self, _id: &str, _recipients: &[String]) -> Result<(), ProviderError> {
        Err(ProviderError::NotSupported {
            provider: PROVIDER,
            operation: "send_test",
        })
    }

    async fn get_analytics(&self, _id: &str) -> Result<BroadcastAnalytics, ProviderError> {
        Err(ProviderError::NotSupported {
            provider: PROVIDER,
            operation: "get_analytics",
        })
    }

    fn map_native_status(&self, native: &str) -> BroadcastStatus {
        match native {
            "draft" => BroadcastStatus::Draft,
            "scheduled" => BroadcastStatus::Scheduled,
            "queued" | "sending" => BroadcastStatus::Sending,
            "sent" | "delivered" => BroadcastStatus::Sent,
            "failed" => BroadcastStatus::Failed,
            "paused" => BroadcastStatus::Paused,
            "canceled" | "cancelled" => BroadcastStatus::Canceled,
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
            BroadcastStatus::Canceled => "canceled",
        }
    }
}
