//! Provider capability contract and the adapters implementing it.
//!
//! Every delivery backend exposes the same [`BroadcastProvider`] surface.
//! Adapters translate canonical payloads into provider wire formats, map
//! native status vocabularies onto [`BroadcastStatus`], and report
//! capability gaps as typed `NotSupported` errors instead of guessing at
//! undocumented APIs.

pub mod broadcast_api;
pub mod credentials;
pub mod registry;
pub mod resend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use foghorn_core::{BroadcastAnalytics, BroadcastStatus, ProviderError};

pub use broadcast_api::BroadcastApiProvider;
pub use registry::{FixedProvider, ProviderRegistry, ProviderSource};
pub use resend::ResendProvider;

/// Fixed capability descriptor, one per adapter instance. Callers query
/// this instead of hard-coding per-provider knowledge.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderCapabilities {
    pub supports_scheduling: bool,
    pub supports_segmentation: bool,
    pub supports_analytics: bool,
    pub supports_ab_testing: bool,
    pub supports_templates: bool,
    pub supports_personalization: bool,
    pub supports_multiple_channels: bool,
    pub supports_channel_segmentation: bool,
    /// Statuses in which the provider allows editing or deleting a broadcast.
    pub editable_statuses: &'static [BroadcastStatus],
    pub supported_content_types: &'static [&'static str],
}

impl ProviderCapabilities {
    pub fn can_edit(&self, status: BroadcastStatus) -> bool {
        self.editable_statuses.contains(&status)
    }
}

/// Canonical create payload. Content arrives already rendered to HTML.
#[derive(Debug, Clone)]
pub struct CreateBroadcast {
    pub channel_id: String,
    pub name: String,
    pub subject: String,
    pub preheader: Option<String>,
    pub html: String,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub reply_to: Option<String>,
    pub track_opens: Option<bool>,
    pub track_clicks: Option<bool>,
    pub segment_ids: Vec<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Partial update; only changed fields are present so provider-side-only
/// fields are never clobbered.
#[derive(Debug, Clone, Default)]
pub struct UpdateBroadcast {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub preheader: Option<String>,
    pub html: Option<String>,
    pub reply_to: Option<String>,
    pub track_opens: Option<bool>,
    pub track_clicks: Option<bool>,
    pub segment_ids: Option<Vec<String>>,
}

impl UpdateBroadcast {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.subject.is_none()
            && self.preheader.is_none()
            && self.html.is_none()
            && self.reply_to.is_none()
            && self.track_opens.is_none()
            && self.track_clicks.is_none()
            && self.segment_ids.is_none()
    }
}

/// Provider-side view of a broadcast, fully populated (adapters perform
/// any create-then-fetch round trip internally).
#[derive(Debug, Clone)]
pub struct RemoteBroadcast {
    /// CRUD-facing id.
    pub id: String,
    /// Webhook correlation id; may differ from `id` in representation.
    pub external_id: String,
    pub status: BroadcastStatus,
    pub native_status: String,
    pub subject: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct RemoteChannel {
    pub id: String,
    pub name: String,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub reply_to: Option<String>,
    pub subscriber_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateChannel {
    pub name: String,
    pub description: Option<String>,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateChannel {
    pub name: Option<String>,
    pub description: Option<String>,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub reply_to: Option<String>,
}

/// Uniform contract over heterogeneous broadcast providers.
#[async_trait]
pub trait BroadcastProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;
    fn capabilities(&self) -> &ProviderCapabilities;

    /// Cheap remote check that the configured credentials work.
    async fn validate_configuration(&self) -> Result<(), ProviderError>;

    async fn list_channels(&self) -> Result<Vec<RemoteChannel>, ProviderError>;
    async fn get_channel(&self, id: &str) -> Result<RemoteChannel, ProviderError>;
    async fn create_channel(&self, req: &CreateChannel) -> Result<RemoteChannel, ProviderError>;
    async fn update_channel(
        &self,
        id: &str,
        req: &UpdateChannel,
    ) -> Result<RemoteChannel, ProviderError>;
    async fn delete_channel(&self, id: &str) -> Result<(), ProviderError>;

    async fn list_broadcasts(&self) -> Result<Vec<RemoteBroadcast>, ProviderError>;
    async fn get_broadcast(&self, id: &str) -> Result<RemoteBroadcast, ProviderError>;
    async fn create_broadcast(
        &self,
        req: &CreateBroadcast,
    ) -> Result<RemoteBroadcast, ProviderError>;
    async fn update_broadcast(
        &self,
        id: &str,
        req: &UpdateBroadcast,
    ) -> Result<RemoteBroadcast, ProviderError>;
    async fn delete_broadcast(&self, id: &str) -> Result<(), ProviderError>;

    async fn send(&self, id: &str) -> Result<(), ProviderError>;
    async fn schedule(&self, id: &str, at: DateTime<Utc>) -> Result<(), ProviderError>;
    async fn cancel_schedule(&self, id: &str) -> Result<(), ProviderError>;
    /// Sends a test rendition to explicit recipients without touching the
    /// broadcast lifecycle.
    async fn send_test(&self, id: &str, recipients: &[String]) -> Result<(), ProviderError>;

    async fn get_analytics(&self, id: &str) -> Result<BroadcastAnalytics, ProviderError>;

    /// Maps a provider-native status string to the canonical enum. Total:
    /// unmapped values fall back to `draft` (lossy but safe) with a logged
    /// warning.
    fn map_native_status(&self, native: &str) -> BroadcastStatus;
    /// Inverse of [`Self::map_native_status`] over the canonical enum.
    fn native_status(&self, status: BroadcastStatus) -> &'static str;
}

/// Shared pre-network validation for create payloads: channel, name,
/// subject, and content are mandatory.
pub fn validate_create(
    provider: &'static str,
    req: &CreateBroadcast,
) -> Result<(), ProviderError> {
    let missing = [
        ("channel_id", req.channel_id.trim().is_empty()),
        ("name", req.name.trim().is_empty()),
        ("subject", req.subject.trim().is_empty()),
        ("content", req.html.trim().is_empty()),
    ]
    .iter()
    .filter(|(_, absent)| *absent)
    .map(|(field, _)| *field)
    .collect::<Vec<_>>();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ProviderError::Validation {
            provider,
            message: format!("missing required fields: {}", missing.join(", ")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_req() -> CreateBroadcast {
        CreateBroadcast {
            channel_id: "1".into(),
            name: "Weekly".into(),
            subject: "Hello".into(),
            preheader: None,
            html: "<p>hi</p>".into(),
            from_name: None,
            from_email: None,
            reply_to: None,
            track_opens: None,
            track_clicks: None,
            segment_ids: Vec::new(),
            scheduled_at: None,
        }
    }

    #[test]
    fn validate_create_accepts_complete_payload() {
        assert!(validate_create("test", &create_req()).is_ok());
    }

    #[test]
    fn validate_create_names_every_missing_field() {
        let mut req = create_req();
        req.subject.clear();
        req.html.clear();
        let err = validate_create("test", &req).unwrap_err();
        match err {
            ProviderError::Validation { message, .. } => {
                assert!(message.contains("subject"));
                assert!(message.contains("content"));
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn empty_update_is_detectable() {
        assert!(UpdateBroadcast::default().is_empty());
        let update = UpdateBroadcast {
            preheader: Some("p".into()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
