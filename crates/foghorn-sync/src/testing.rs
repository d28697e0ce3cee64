//! Shared test doubles for the sync layer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use foghorn_core::{
    BroadcastAnalytics, BroadcastStatus, Channel, ProviderError, ProviderKind,
};
use foghorn_providers::{
    BroadcastProvider, CreateBroadcast, CreateChannel, ProviderCapabilities, RemoteBroadcast,
    RemoteChannel, UpdateBroadcast, UpdateChannel,
};

pub fn test_channel(provider: ProviderKind) -> Channel {
    Channel::new("Main list", "Foghorn", "news@example.com", provider)
}

static MOCK_CAPABILITIES: ProviderCapabilities = ProviderCapabilities {
    supports_scheduling: true,
    supports_segmentation: true,
    supports_analytics: true,
    supports_ab_testing: false,
    supports_templates: false,
    supports_personalization: true,
    supports_multiple_channels: true,
    supports_channel_segmentation: false,
    editable_statuses: &[
        BroadcastStatus::Draft,
        BroadcastStatus::Scheduled,
        BroadcastStatus::Paused,
        BroadcastStatus::Failed,
    ],
    supported_content_types: &["text/html"],
};

/// Records every provider call; remote behavior is configurable per test.
#[derive(Debug)]
pub struct MockProvider {
    calls: Mutex<Vec<String>>,
    updates: Mutex<Vec<UpdateBroadcast>>,
    sends: AtomicU64,
    fail_sends: AtomicBool,
    next_id: AtomicU64,
    remote_status: Mutex<BroadcastStatus>,
    fail_get_id: Mutex<Option<String>>,
}

impl MockProvider {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            sends: AtomicU64::new(0),
            fail_sends: AtomicBool::new(false),
            next_id: AtomicU64::new(100),
            remote_status: Mutex::new(BroadcastStatus::Draft),
            fail_get_id: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<UpdateBroadcast> {
        self.updates.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> u64 {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn set_remote_status(&self, status: BroadcastStatus) {
        *self.remote_status.lock().unwrap() = status;
    }

    /// Makes `get_broadcast` fail for one specific remote id.
    pub fn fail_get_for(&self, id: &str) {
        *self.fail_get_id.lock().unwrap() = Some(id.to_string());
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn remote(&self, id: String) -> RemoteBroadcast {
        let status = *self.remote_status.lock().unwrap();
        RemoteBroadcast {
            external_id: id.clone(),
            id,
            status,
            native_status: status.as_str().to_string(),
            subject: None,
            scheduled_at: None,
            sent_at: None,
        }
    }
}

#[async_trait]
impl BroadcastProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &MOCK_CAPABILITIES
    }

    async fn validate_configuration(&self) -> Result<(), ProviderError> {
        self.record("validate_configuration");
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<RemoteChannel>, ProviderError> {
        self.record("list_channels");
        Ok(Vec::new())
    }

    async fn get_channel(&self, id: &str) -> Result<RemoteChannel, ProviderError> {
        self.record("get_channel");
        Ok(RemoteChannel {
            id: id.to_string(),
            name: "Main list".into(),
            from_name: None,
            from_email: None,
            reply_to: None,
            subscriber_count: Some(0),
        })
    }

    async fn create_channel(&self, req: &CreateChannel) -> Result<RemoteChannel, ProviderError> {
        self.record("create_channel");
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(RemoteChannel {
            id: id.to_string(),
            name: req.name.clone(),
            from_name: req.from_name.clone(),
            from_email: req.from_email.clone(),
            reply_to: req.reply_to.clone(),
            subscriber_count: Some(0),
        })
    }

    async fn update_channel(
        &self,
        id: &str,
        req: &UpdateChannel,
    ) -> Result<RemoteChannel, ProviderError> {
        self.record("update_channel");
        Ok(RemoteChannel {
            id: id.to_string(),
            name: req.name.clone().unwrap_or_default(),
            from_name: req.from_name.clone(),
            from_email: req.from_email.clone(),
            reply_to: req.reply_to.clone(),
            subscriber_count: None,
        })
    }

    async fn delete_channel(&self, _id: &str) -> Result<(), ProviderError> {
        self.record("delete_channel");
        Ok(())
    }

    async fn list_broadcasts(&self) -> Result<Vec<RemoteBroadcast>, ProviderError> {
        self.record("list_broadcasts");
        Ok(Vec::new())
    }

    async fn get_broadcast(&self, id: &str) -> Result<RemoteBroadcast, ProviderError> {
        self.record("get_broadcast");
        if self.fail_get_id.lock().unwrap().as_deref() == Some(id) {
            return Err(ProviderError::Remote {
                provider: "mock",
                status: Some(500),
                body: "lookup failed".into(),
            });
        }
        Ok(self.remote(id.to_string()))
    }

    async fn create_broadcast(
        &self,
        _req: &CreateBroadcast,
    ) -> Result<RemoteBroadcast, ProviderError> {
        self.record("create_broadcast");
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(self.remote(id.to_string()))
    }

    async fn update_broadcast(
        &self,
        id: &str,
        req: &UpdateBroadcast,
    ) -> Result<RemoteBroadcast, ProviderError> {
        self.record("update_broadcast");
        self.updates.lock().unwrap().push(req.clone());
        Ok(self.remote(id.to_string()))
    }

    async fn delete_broadcast(&self, _id: &str) -> Result<(), ProviderError> {
        self.record("delete_broadcast");
        Ok(())
    }

    async fn send(&self, _id: &str) -> Result<(), ProviderError> {
        self.record("send");
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ProviderError::Remote {
                provider: "mock",
                status: Some(503),
                body: "delivery backend unavailable".into(),
            });
        }
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn schedule(&self, _id: &str, _at: DateTime<Utc>) -> Result<(), ProviderError> {
        self.record("schedule");
        Ok(())
    }

    async fn cancel_schedule(&self, _id: &str) -> Result<(), ProviderError> {
        self.record("cancel_schedule");
        Ok(())
    }

    async fn send_test(&self, _id: &str, _recipients: &[String]) -> Result<(), ProviderError> {
        self.record("send_test");
        Ok(())
    }

    async fn get_analytics(&self, _id: &str) -> Result<BroadcastAnalytics, ProviderError> {
        self.record("get_analytics");
        Ok(BroadcastAnalytics::default())
    }

    fn map_native_status(&self, native: &str) -> BroadcastStatus {
        BroadcastStatus::ALL
            .iter()
            .copied()
            .find(|s| s.as_str() == native)
            .unwrap_or(BroadcastStatus::Draft)
    }

    fn native_status(&self, status: BroadcastStatus) -> &'static str {
        status.as_str()
    }
}
