//! Persistent-store seam.
//!
//! The store is the single source of truth; webhook handlers, the sync
//! engine, and the polling sweep all coordinate through it with
//! field-level merge patches rather than full overwrites. The in-memory
//! backend is used for tests and single-node deployments; database
//! backends implement the same trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::broadcast::{Broadcast, BroadcastPatch, BroadcastStatus};
use crate::channel::{Channel, ChannelPatch};
use crate::settings::NewsletterSettings;
use crate::subscriber::Subscriber;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait NewsletterStore: Send + Sync {
    // Broadcasts
    async fn insert_broadcast(&self, broadcast: Broadcast) -> Result<(), StoreError>;
    async fn get_broadcast(&self, id: Uuid) -> Result<Option<Broadcast>, StoreError>;
    /// Lookup by the provider's webhook-correlation id, which may differ
    /// from the CRUD-facing provider id.
    async fn find_broadcast_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Broadcast>, StoreError>;
    /// Applies a field-level merge patch. A patch whose trail update is
    /// stale (older than the stored last event) only appends to the event
    /// log; every other field of the patch is dropped. Returns the updated
    /// broadcast, or `None` when the id is unknown.
    async fn update_broadcast(
        &self,
        id: Uuid,
        patch: BroadcastPatch,
    ) -> Result<Option<Broadcast>, StoreError>;
    /// Replaces locally-authored fields wholesale. Used by the CMS-facing
    /// CRUD path, which owns those fields; fields owned by the webhook and
    /// sync paths (trail, analytics, status, delivery timestamps, provider
    /// ids) are carried over from the stored record so a stale caller copy
    /// cannot clobber a transition that landed in between.
    async fn replace_broadcast(&self, broadcast: Broadcast) -> Result<(), StoreError>;
    async fn delete_broadcast(&self, id: Uuid) -> Result<bool, StoreError>;
    /// Broadcasts stuck in `sending` whose last update is older than
    /// `stale_before`, oldest first, capped at `limit`.
    async fn stuck_broadcasts(
        &self,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Broadcast>, StoreError>;

    // Channels
    async fn insert_channel(&self, channel: Channel) -> Result<(), StoreError>;
    async fn get_channel(&self, id: Uuid) -> Result<Option<Channel>, StoreError>;
    async fn list_channels(&self) -> Result<Vec<Channel>, StoreError>;
    async fn update_channel(
        &self,
        id: Uuid,
        patch: ChannelPatch,
    ) -> Result<Option<Channel>, StoreError>;
    async fn delete_channel(&self, id: Uuid) -> Result<bool, StoreError>;

    // Subscribers
    async fn find_subscriber_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Subscriber>, StoreError>;
    async fn upsert_subscriber(&self, subscriber: Subscriber) -> Result<(), StoreError>;

    // Settings
    async fn load_settings(&self) -> Result<Option<NewsletterSettings>, StoreError>;
    async fn save_settings(&self, settings: NewsletterSettings) -> Result<(), StoreError>;
}

/// In-memory backend for tests and single-node wiring.
#[derive(Default)]
pub struct MemoryStore {
    broadcasts: RwLock<HashMap<Uuid, Broadcast>>,
    channels: RwLock<HashMap<Uuid, Channel>>,
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
    settings: RwLock<Option<NewsletterSettings>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl NewsletterStore for MemoryStore {
    async fn insert_broadcast(&self, broadcast: Broadcast) -> Result<(), StoreError> {
        self.broadcasts
            .write()
            .await
            .insert(broadcast.id, broadcast);
        Ok(())
    }

    async fn get_broadcast(&self, id: Uuid) -> Result<Option<Broadcast>, StoreError> {
        Ok(self.broadcasts.read().await.get(&id).cloned())
    }

    async fn find_broadcast_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Broadcast>, StoreError> {
        Ok(self
            .broadcasts
            .read()
            .await
            .values()
            .find(|b| b.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn update_broadcast(
        &self,
        id: Uuid,
        mut patch: BroadcastPatch,
    ) -> Result<Option<Broadcast>, StoreError> {
        let mut guard = self.broadcasts.write().await;
        let Some(broadcast) = guard.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(update) = patch.trail.take() {
            let fresh = broadcast.webhook_trail.apply(update);
            if !fresh {
                // Stale event: logged above, the rest of the patch is dropped.
                return Ok(Some(broadcast.clone()));
            }
        }

        if let Some(status) = patch.send_status {
            broadcast.send_status = status;
        }
        if let Some(provider_id) = patch.provider_id {
            // Set exactly once; later patches target the same identity.
            if broadcast.provider_id.is_none() {
                broadcast.provider_id = Some(provider_id);
            }
        }
        if let Some(external_id) = patch.external_id {
            if broadcast.external_id.is_none() {
                broadcast.external_id = Some(external_id);
            }
        }
        if let Some(at) = patch.scheduled_at {
            broadcast.scheduled_at = Some(at);
        }
        if let Some(at) = patch.sent_at {
            broadcast.sent_at = Some(at);
        }
        if let Some(analytics) = patch.analytics {
            broadcast.analytics = analytics;
        }
        broadcast.updated_at = Utc::now();
        Ok(Some(broadcast.clone()))
    }

    async fn replace_broadcast(&self, mut broadcast: Broadcast) -> Result<(), StoreError> {
        let mut guard = self.broadcasts.write().await;
        if let Some(existing) = guard.get(&broadcast.id) {
            // Webhook- and sync-owned fields stay with the stored record.
            broadcast.webhook_trail = existing.webhook_trail.clone();
            broadcast.analytics = existing.analytics.clone();
            broadcast.send_status = existing.send_status;
            broadcast.sent_at = existing.sent_at;
            broadcast.scheduled_at = existing.scheduled_at;
            if broadcast.provider_id.is_none() {
                broadcast.provider_id = existing.provider_id.clone();
            }
            if broadcast.external_id.is_none() {
                broadcast.external_id = existing.external_id.clone();
            }
        }
        broadcast.updated_at = Utc::now();
        guard.insert(broadcast.id, broadcast);
        Ok(())
    }

    async fn delete_broadcast(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.broadcasts.write().await.remove(&id).is_some())
    }

    async fn stuck_broadcasts(
        &self,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Broadcast>, StoreError> {
        let guard = self.broadcasts.read().await;
        let mut stuck: Vec<Broadcast> = guard
            .values()
            .filter(|b| b.send_status == BroadcastStatus::Sending && b.updated_at < stale_before)
            .cloned()
            .collect();
        stuck.sort_by_key(|b| b.updated_at);
        stuck.truncate(limit);
        Ok(stuck)
    }

    async fn insert_channel(&self, channel: Channel) -> Result<(), StoreError> {
        self.channels.write().await.insert(channel.id, channel);
        Ok(())
    }

    async fn get_channel(&self, id: Uuid) -> Result<Option<Channel>, StoreError> {
        Ok(self.channels.read().await.get(&id).cloned())
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, StoreError> {
        let mut channels: Vec<Channel> = self.channels.read().await.values().cloned().collect();
        channels.sort_by_key(|c| c.created_at);
        Ok(channels)
    }

    async fn update_channel(
        &self,
        id: Uuid,
        patch: ChannelPatch,
    ) -> Result<Option<Channel>, StoreError> {
        let mut guard = self.channels.write().await;
        let Some(channel) = guard.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            channel.name = name;
        }
        if let Some(description) = patch.description {
            channel.description = Some(description);
        }
        if let Some(from_name) = patch.from_name {
            channel.from_name = from_name;
        }
        if let Some(from_email) = patch.from_email {
            channel.from_email = from_email;
        }
        if let Some(reply_to) = patch.reply_to {
            channel.reply_to = Some(reply_to);
        }
        if let Some(provider_id) = patch.provider_id {
            if channel.provider_id.is_none() {
                channel.provider_id = Some(provider_id);
            }
        }
        if let Some(count) = patch.subscriber_count {
            channel.subscriber_count = count;
        }
        if let Some(active) = patch.active {
            channel.active = active;
        }
        channel.updated_at = Utc::now();
        Ok(Some(channel.clone()))
    }

    async fn delete_channel(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.channels.write().await.remove(&id).is_some())
    }

    async fn find_subscriber_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Subscriber>, StoreError> {
        Ok(self
            .subscribers
            .read()
            .await
            .values()
            .find(|s| s.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn upsert_subscriber(&self, subscriber: Subscriber) -> Result<(), StoreError> {
        self.subscribers
            .write()
            .await
            .insert(subscriber.id, subscriber);
        Ok(())
    }

    async fn load_settings(&self) -> Result<Option<NewsletterSettings>, StoreError> {
        Ok(self.settings.read().await.clone())
    }

    async fn save_settings(&self, settings: NewsletterSettings) -> Result<(), StoreError> {
        *self.settings.write().await = Some(settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::TrailUpdate;
    use chrono::Duration;

    #[tokio::test]
    async fn patch_merges_fields_without_clobbering() {
        let store = MemoryStore::new();
        let broadcast = Broadcast::new("weekly");
        let id = broadcast.id;
        store.insert_broadcast(broadcast).await.unwrap();

        let updated = store
            .update_broadcast(
                id,
                BroadcastPatch {
                    provider_id: Some("42".into()),
                    external_id: Some("42".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.provider_id.as_deref(), Some("42"));

        // provider_id is immutable once set
        let updated = store
            .update_broadcast(
                id,
                BroadcastPatch {
                    provider_id: Some("43".into()),
                    send_status: Some(BroadcastStatus::Sending),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.provider_id.as_deref(), Some("42"));
        assert_eq!(updated.send_status, BroadcastStatus::Sending);
    }

    #[tokio::test]
    async fn stale_trail_patch_drops_status_change() {
        let store = MemoryStore::new();
        let broadcast = Broadcast::new("weekly");
        let id = broadcast.id;
        store.insert_broadcast(broadcast).await.unwrap();

        let now = Utc::now();
        store
            .update_broadcast(
                id,
                BroadcastPatch {
                    send_status: Some(BroadcastStatus::Sent),
                    trail: Some(TrailUpdate::new("broadcast.sent", now)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // A delayed `sending` event arrives after `sent`; it must not regress.
        let updated = store
            .update_broadcast(
                id,
                BroadcastPatch {
                    send_status: Some(BroadcastStatus::Sending),
                    trail: Some(TrailUpdate::new(
                        "broadcast.sending",
                        now - Duration::seconds(60),
                    )),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.send_status, BroadcastStatus::Sent);
        assert_eq!(updated.webhook_trail.recent_events.len(), 2);
    }

    #[tokio::test]
    async fn stuck_broadcasts_filters_and_orders_oldest_first() {
        let store = MemoryStore::new();
        let cutoff = Utc::now() - Duration::minutes(10);

        let mut fresh = Broadcast::new("fresh");
        fresh.send_status = BroadcastStatus::Sending;
        let mut old = Broadcast::new("old");
        old.send_status = BroadcastStatus::Sending;
        old.updated_at = Utc::now() - Duration::minutes(15);
        let mut older = Broadcast::new("older");
        older.send_status = BroadcastStatus::Sending;
        older.updated_at = Utc::now() - Duration::minutes(30);
        let mut sent = Broadcast::new("done");
        sent.send_status = BroadcastStatus::Sent;
        sent.updated_at = Utc::now() - Duration::minutes(30);

        let older_id = older.id;
        for b in [fresh, old, older, sent] {
            store.insert_broadcast(b).await.unwrap();
        }

        let stuck = store.stuck_broadcasts(cutoff, 20).await.unwrap();
        assert_eq!(stuck.len(), 2);
        assert_eq!(stuck[0].id, older_id);

        let limited = store.stuck_broadcasts(cutoff, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, older_id);
    }

    #[tokio::test]
    async fn replace_preserves_webhook_owned_fields() {
        let store = MemoryStore::new();
        let broadcast = Broadcast::new("weekly");
        let id = broadcast.id;
        store.insert_broadcast(broadcast.clone()).await.unwrap();
        store
            .update_broadcast(
                id,
                BroadcastPatch {
                    provider_id: Some("7".into()),
                    trail: Some(TrailUpdate::new("broadcast.sending", Utc::now())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let mut edited = broadcast;
        edited.subject = "New subject".into();
        store.replace_broadcast(edited).await.unwrap();

        let stored = store.get_broadcast(id).await.unwrap().unwrap();
        assert_eq!(stored.subject, "New subject");
        assert_eq!(stored.provider_id.as_deref(), Some("7"));
        assert_eq!(stored.webhook_trail.recent_events.len(), 1);
    }

    #[tokio::test]
    async fn replace_with_stale_copy_keeps_delivery_transition() {
        let store = MemoryStore::new();
        let mut broadcast = Broadcast::new("weekly");
        broadcast.send_status = BroadcastStatus::Sending;
        let id = broadcast.id;
        store.insert_broadcast(broadcast.clone()).await.unwrap();

        // An editor holds this copy while the terminal webhook lands.
        let stale_copy = broadcast;
        let sent_at = Utc::now();
        store
            .update_broadcast(
                id,
                BroadcastPatch {
                    send_status: Some(BroadcastStatus::Sent),
                    sent_at: Some(sent_at),
                    trail: Some(TrailUpdate::new("broadcast.sent", sent_at)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let mut edited = stale_copy;
        edited.subject = "Edited while sending".into();
        store.replace_broadcast(edited).await.unwrap();

        let stored = store.get_broadcast(id).await.unwrap().unwrap();
        assert_eq!(stored.subject, "Edited while sending");
        assert_eq!(stored.send_status, BroadcastStatus::Sent);
        assert_eq!(stored.sent_at, Some(sent_at));
    }
}
