//! Broadcast synchronization engine.
//!
//! Driven by local entity lifecycle events (save/delete), never by a
//! scheduler. Local writes are the system of record: every remote
//! synchronization failure is absorbed and logged, so the CMS stays usable
//! when the provider is down. Admin-triggered actions (`send_now`,
//! `schedule`, `send_test`) surface provider errors instead, since the
//! caller explicitly asked for them.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use foghorn_core::{
    Broadcast, BroadcastPatch, BroadcastStatus, Channel, ChannelPatch, ContentRenderer,
    NewsletterSettings, NewsletterStore, ProviderError, RenderError, StoreError, TrailUpdate,
};
use foghorn_providers::{
    BroadcastProvider, CreateBroadcast, CreateChannel, ProviderSource, RemoteBroadcast,
    UpdateBroadcast, UpdateChannel,
};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("broadcast {0} not found")]
    BroadcastNotFound(Uuid),
    #[error("broadcast {0} has no provider-side channel to send through")]
    MissingChannel(Uuid),
    #[error("broadcast {0} has not been created in the provider")]
    NotCreated(Uuid),
}

pub struct SyncEngine {
    store: Arc<dyn NewsletterStore>,
    providers: Arc<dyn ProviderSource>,
    renderer: Arc<dyn ContentRenderer>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn NewsletterStore>,
        providers: Arc<dyn ProviderSource>,
        renderer: Arc<dyn ContentRenderer>,
    ) -> Self {
        Self {
            store,
            providers,
            renderer,
        }
    }

    /// Best-effort synchronization after a local save. Never fails the
    /// enclosing local write; failures are logged with full context.
    pub async fn sync_after_save(&self, previous: Option<&Broadcast>, current: &Broadcast) {
        if let Err(err) = self.sync_inner(previous, current).await {
            error!(
                broadcast_id = %current.id,
                subject = %current.subject,
                has_content = !current.content.is_empty(),
                error = %err,
                "broadcast sync failed; local state kept"
            );
        }
    }

    async fn sync_inner(
        &self,
        previous: Option<&Broadcast>,
        current: &Broadcast,
    ) -> Result<(), SyncError> {
        let provider = self.providers.current().await?;
        let mut current = current.clone();

        if current.provider_id.is_none() {
            // Creation waits for first content: both subject and content
            // must be present.
            if !current.ready_for_create() {
                return Ok(());
            }
            let remote = self.create_remote(provider.as_ref(), &current).await?;
            self.store
                .update_broadcast(
                    current.id,
                    BroadcastPatch {
                        provider_id: Some(remote.id.clone()),
                        external_id: Some(remote.external_id.clone()),
                        ..Default::default()
                    },
                )
                .await?;
            info!(
                broadcast_id = %current.id,
                provider = provider.name(),
                provider_id = %remote.id,
                "broadcast created in provider"
            );
            current.provider_id = Some(remote.id);
            current.external_id = Some(remote.external_id);
        } else if let Some(previous) = previous {
            self.propagate_changes(provider.as_ref(), previous, &current)
                .await?;
        }

        // Unpublished -> published transition triggers the send.
        let was_published = previous.map(|p| p.published).unwrap_or(false);
        if current.published && !was_published {
            self.dispatch_send(provider.as_ref(), &current).await;
        }
        Ok(())
    }

    /// Diff-based patch propagation. Skipped entirely (no network call)
    /// when the local status is outside the provider's editable set.
    async fn propagate_changes(
        &self,
        provider: &dyn BroadcastProvider,
        previous: &Broadcast,
        current: &Broadcast,
    ) -> Result<(), SyncError> {
        if !provider.capabilities().can_edit(current.send_status) {
            debug!(
                broadcast_id = %current.id,
                status = current.send_status.as_str(),
                "status not editable for provider, skipping patch"
            );
            return Ok(());
        }
        let update = self.diff(previous, current)?;
        if update.is_empty() {
            return Ok(());
        }
        let provider_id = current
            .provider_id
            .as_deref()
            .ok_or(SyncError::NotCreated(current.id))?;
        match provider.update_broadcast(provider_id, &update).await {
            Ok(_) => Ok(()),
            // Status may have advanced remotely between saves; treat the
            // refusal as a skip, not a failure.
            Err(ProviderError::InvalidStatus { status, .. }) => {
                info!(
                    broadcast_id = %current.id,
                    remote_status = status.as_str(),
                    "remote status no longer editable, patch skipped"
                );
                Ok(())
            }
            Err(err) if err.is_not_supported() => {
                debug!(broadcast_id = %current.id, error = %err, "patch not supported by provider");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Only changed fields make it into the patch; content is rendered to
    /// HTML immediately before transmission, and only when it changed.
    fn diff(&self, previous: &Broadcast, current: &Broadcast) -> Result<UpdateBroadcast, SyncError> {
        let mut update = UpdateBroadcast::default();
        if previous.name != current.name {
            update.name = Some(current.name.clone());
        }
        if previous.subject != current.subject {
            update.subject = Some(current.subject.clone());
        }
        if previous.preheader != current.preheader {
            update.preheader = Some(current.preheader.clone().unwrap_or_default());
        }
        if previous.content.fingerprint() != current.content.fingerprint() {
            update.html = Some(self.renderer.render(&current.content)?);
        }
        if previous.reply_to != current.reply_to {
            update.reply_to = Some(current.reply_to.clone().unwrap_or_default());
        }
        if previous.track_opens != current.track_opens {
            update.track_opens = Some(current.track_opens);
        }
        if previous.track_clicks != current.track_clicks {
            update.track_clicks = Some(current.track_clicks);
        }
        if previous.segment_ids != current.segment_ids {
            update.segment_ids = Some(current.segment_ids.clone());
        }
        Ok(update)
    }

    async fn create_remote(
        &self,
        provider: &dyn BroadcastProvider,
        broadcast: &Broadcast,
    ) -> Result<RemoteBroadcast, SyncError> {
        let settings = self
            .store
            .load_settings()
            .await?
            .unwrap_or_else(NewsletterSettings::from_env);

        let channel = match broadcast.channel_id {
            Some(id) => self.store.get_channel(id).await?,
            None => None,
        };
        let channel_provider_id = channel
            .as_ref()
            .and_then(|c| c.provider_id.clone())
            .or_else(|| {
                settings
                    .resend
                    .as_ref()
                    .and_then(|r| r.default_audience_id.clone())
                    .filter(|_| provider.name() == "resend")
            })
            .ok_or(SyncError::MissingChannel(broadcast.id))?;

        let html = self.renderer.render(&broadcast.content)?;
        let request = CreateBroadcast {
            channel_id: channel_provider_id,
            name: broadcast.name.clone(),
            subject: broadcast.subject.clone(),
            preheader: broadcast.preheader.clone(),
            html,
            from_name: channel
                .as_ref()
                .map(|c| c.from_name.clone())
                .or_else(|| settings.from_name.clone()),
            from_email: channel
                .as_ref()
                .map(|c| c.from_email.clone())
                .or_else(|| settings.from_email.clone()),
            reply_to: broadcast
                .reply_to
                .clone()
                .or_else(|| channel.as_ref().and_then(|c| c.reply_to.clone()))
                .or_else(|| settings.reply_to.clone()),
            track_opens: Some(broadcast.track_opens),
            track_clicks: Some(broadcast.track_clicks),
            segment_ids: broadcast.segment_ids.clone(),
            scheduled_at: broadcast.scheduled_at,
        };
        Ok(provider.create_broadcast(&request).await?)
    }

    /// Publish-triggered send. Guarded against duplicate dispatch and
    /// single-attempt on the follow-up status write: the write itself must
    /// not throw even if it fails.
    async fn dispatch_send(&self, provider: &dyn BroadcastProvider, broadcast: &Broadcast) {
        if matches!(
            broadcast.send_status,
            BroadcastStatus::Sent | BroadcastStatus::Sending
        ) {
            debug!(
                broadcast_id = %broadcast.id,
                status = broadcast.send_status.as_str(),
                "send skipped, already dispatched"
            );
            return;
        }
        let Some(provider_id) = broadcast.provider_id.as_deref() else {
            warn!(broadcast_id = %broadcast.id, "publish with no provider id, send skipped");
            return;
        };

        match provider.send(provider_id).await {
            Ok(()) => {
                let patch = BroadcastPatch {
                    send_status: Some(BroadcastStatus::Sending),
                    sent_at: Some(Utc::now()),
                    ..Default::default()
                };
                if let Err(err) = self.store.update_broadcast(broadcast.id, patch).await {
                    error!(broadcast_id = %broadcast.id, error = %err, "status write after send failed");
                }
                info!(broadcast_id = %broadcast.id, provider = provider.name(), "broadcast send dispatched");
            }
            Err(err) => {
                error!(broadcast_id = %broadcast.id, error = %err, "broadcast send failed");
                let mut trail = TrailUpdate::new("sync.send_failed", Utc::now());
                trail.failure_reason = Some(err.to_string());
                trail.failed_at = Some(Utc::now());
                let patch = BroadcastPatch {
                    send_status: Some(BroadcastStatus::Failed),
                    trail: Some(trail),
                    ..Default::default()
                };
                if let Err(err) = self.store.update_broadcast(broadcast.id, patch).await {
                    error!(broadcast_id = %broadcast.id, error = %err, "failure-status write failed");
                }
            }
        }
    }

    /// Remote delete on local delete, only while the remote object is
    /// still editable. Sent broadcasts are never retracted.
    pub async fn sync_delete(&self, broadcast: &Broadcast) {
        let Some(provider_id) = broadcast.provider_id.as_deref() else {
            return;
        };
        let provider = match self.providers.current().await {
            Ok(p) => p,
            Err(err) => {
                warn!(broadcast_id = %broadcast.id, error = %err, "provider unavailable, remote delete skipped");
                return;
            }
        };
        if !provider.capabilities().can_edit(broadcast.send_status) {
            info!(
                broadcast_id = %broadcast.id,
                status = broadcast.send_status.as_str(),
                "remote broadcast left as-is on local delete"
            );
            return;
        }
        match provider.delete_broadcast(provider_id).await {
            Ok(()) => {
                info!(broadcast_id = %broadcast.id, provider = provider.name(), "remote broadcast deleted");
            }
            Err(err) if err.is_not_supported() => {
                debug!(broadcast_id = %broadcast.id, error = %err, "remote delete not supported");
            }
            Err(err) => {
                warn!(broadcast_id = %broadcast.id, error = %err, "remote delete failed");
            }
        }
    }

    /// Admin "send now". Surfaces provider errors to the caller and still
    /// records a failed status locally.
    pub async fn send_now(&self, id: Uuid) -> Result<Broadcast, SyncError> {
        let broadcast = self
            .store
            .get_broadcast(id)
            .await?
            .ok_or(SyncError::BroadcastNotFound(id))?;
        if matches!(
            broadcast.send_status,
            BroadcastStatus::Sent | BroadcastStatus::Sending
        ) {
            return Ok(broadcast);
        }
        let provider = self.providers.current().await?;
        let broadcast = self.ensure_created(provider.as_ref(), broadcast).await?;
        let provider_id = broadcast
            .provider_id
            .as_deref()
            .ok_or(SyncError::NotCreated(id))?;

        if let Err(err) = provider.send(provider_id).await {
            let mut trail = TrailUpdate::new("sync.send_failed", Utc::now());
            trail.failure_reason = Some(err.to_string());
            trail.failed_at = Some(Utc::now());
            let _ = self
                .store
                .update_broadcast(
                    id,
                    BroadcastPatch {
                        send_status: Some(BroadcastStatus::Failed),
                        trail: Some(trail),
                        ..Default::default()
                    },
                )
                .await;
            return Err(err.into());
        }

        let updated = self
            .store
            .update_broadcast(
                id,
                BroadcastPatch {
                    send_status: Some(BroadcastStatus::Sending),
                    sent_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?
            .ok_or(SyncError::BroadcastNotFound(id))?;
        Ok(updated)
    }

    /// Admin "schedule for later".
    pub async fn schedule(
        &self,
        id: Uuid,
        at: chrono::DateTime<Utc>,
    ) -> Result<Broadcast, SyncError> {
        let broadcast = self
            .store
            .get_broadcast(id)
            .await?
            .ok_or(SyncError::BroadcastNotFound(id))?;
        let provider = self.providers.current().await?;
        let broadcast = self.ensure_created(provider.as_ref(), broadcast).await?;
        let provider_id = broadcast
            .provider_id
            .as_deref()
            .ok_or(SyncError::NotCreated(id))?;
        provider.schedule(provider_id, at).await?;
        let updated = self
            .store
            .update_broadcast(
                id,
                BroadcastPatch {
                    send_status: Some(BroadcastStatus::Scheduled),
                    scheduled_at: Some(at),
                    ..Default::default()
                },
            )
            .await?
            .ok_or(SyncError::BroadcastNotFound(id))?;
        Ok(updated)
    }

    /// Admin test send to explicit recipients; no lifecycle change.
    pub async fn send_test(&self, id: Uuid, recipients: &[String]) -> Result<(), SyncError> {
        let broadcast = self
            .store
            .get_broadcast(id)
            .await?
            .ok_or(SyncError::BroadcastNotFound(id))?;
        let provider = self.providers.current().await?;
        let broadcast = self.ensure_created(provider.as_ref(), broadcast).await?;
        let provider_id = broadcast
            .provider_id
            .as_deref()
            .ok_or(SyncError::NotCreated(id))?;
        provider.send_test(provider_id, recipients).await?;
        Ok(())
    }

    /// Renders the broadcast's content for previewing.
    pub async fn preview(&self, id: Uuid) -> Result<String, SyncError> {
        let broadcast = self
            .store
            .get_broadcast(id)
            .await?
            .ok_or(SyncError::BroadcastNotFound(id))?;
        Ok(self.renderer.render(&broadcast.content)?)
    }

    async fn ensure_created(
        &self,
        provider: &dyn BroadcastProvider,
        broadcast: Broadcast,
    ) -> Result<Broadcast, SyncError> {
        if broadcast.provider_id.is_some() {
            return Ok(broadcast);
        }
        if !broadcast.ready_for_create() {
            return Err(SyncError::NotCreated(broadcast.id));
        }
        let remote = self.create_remote(provider, &broadcast).await?;
        let updated = self
            .store
            .update_broadcast(
                broadcast.id,
                BroadcastPatch {
                    provider_id: Some(remote.id),
                    external_id: Some(remote.external_id),
                    ..Default::default()
                },
            )
            .await?
            .ok_or(SyncError::BroadcastNotFound(broadcast.id))?;
        Ok(updated)
    }

    // Channel lifecycle: best-effort, capability-guarded.

    pub async fn sync_channel_create(&self, channel: &Channel) {
        let provider = match self.providers.current().await {
            Ok(p) => p,
            Err(err) => {
                warn!(channel_id = %channel.id, error = %err, "provider unavailable, channel not mirrored");
                return;
            }
        };
        let request = CreateChannel {
            name: channel.name.clone(),
            description: channel.description.clone(),
            from_name: Some(channel.from_name.clone()),
            from_email: Some(channel.from_email.clone()),
            reply_to: channel.reply_to.clone(),
        };
        match provider.create_channel(&request).await {
            Ok(remote) => {
                let patch = ChannelPatch {
                    provider_id: Some(remote.id),
                    subscriber_count: remote.subscriber_count,
                    ..Default::default()
                };
                if let Err(err) = self.store.update_channel(channel.id, patch).await {
                    error!(channel_id = %channel.id, error = %err, "channel provider id write failed");
                }
            }
            Err(err) if err.is_not_supported() => {
                debug!(channel_id = %channel.id, error = %err, "channel creation not supported");
            }
            Err(err) => {
                warn!(channel_id = %channel.id, error = %err, "channel creation in provider failed");
            }
        }
    }

    pub async fn sync_channel_update(&self, channel: &Channel) {
        let Some(provider_id) = channel.provider_id.as_deref() else {
            return;
        };
        let provider = match self.providers.current().await {
            Ok(p) => p,
            Err(err) => {
                warn!(channel_id = %channel.id, error = %err, "provider unavailable, channel update skipped");
                return;
            }
        };
        let request = UpdateChannel {
            name: Some(channel.name.clone()),
            description: channel.description.clone(),
            from_name: Some(channel.from_name.clone()),
            from_email: Some(channel.from_email.clone()),
            reply_to: channel.reply_to.clone(),
        };
        match provider.update_channel(provider_id, &request).await {
            Ok(_) => {}
            Err(err) if err.is_not_supported() => {
                debug!(channel_id = %channel.id, error = %err, "channel update not supported");
            }
            Err(err) => {
                warn!(channel_id = %channel.id, error = %err, "channel update in provider failed");
            }
        }
    }

    pub async fn sync_channel_delete(&self, channel: &Channel) {
        let Some(provider_id) = channel.provider_id.as_deref() else {
            return;
        };
        let provider = match self.providers.current().await {
            Ok(p) => p,
            Err(err) => {
                warn!(channel_id = %channel.id, error = %err, "provider unavailable, channel delete skipped");
                return;
            }
        };
        match provider.delete_channel(provider_id).await {
            Ok(()) => {}
            Err(err) if err.is_not_supported() => {
                debug!(channel_id = %channel.id, error = %err, "channel delete not supported");
            }
            Err(err) => {
                warn!(channel_id = %channel.id, error = %err, "channel delete in provider failed");
            }
        }
    }
}
