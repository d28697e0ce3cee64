//! Routes verified webhook events to store mutations.
//!
//! Routing runs after signature verification; the HTTP layer acknowledges
//! every verified delivery so providers do not retry forever, and any
//! failure here is reported in the response body rather than the status
//! code. Handlers are idempotent because providers deliver at-least-once.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use foghorn_core::{
    BroadcastPatch, NewsletterStore, StoreError, Subscriber, SubscriberStatus, TrailUpdate,
};

use crate::events::{
    BroadcastEventData, BroadcastEventKind, EventKind, SubscriberEventData, WebhookEvent,
};

#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("malformed event payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Outcome of routing one event, reported in the acknowledgement body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    /// Recognized but matched no local record, or an unrecognized type.
    Ignored,
}

pub struct WebhookRouter {
    store: Arc<dyn NewsletterStore>,
}

impl WebhookRouter {
    pub fn new(store: Arc<dyn NewsletterStore>) -> Self {
        Self { store }
    }

    pub async fn route(&self, event: &WebhookEvent) -> Result<Disposition, RouterError> {
        match EventKind::parse(&event.event_type) {
            EventKind::SubscriberSubscribed => {
                let data: SubscriberEventData = serde_json::from_value(event.data.clone())?;
                self.handle_subscribed(&data).await
            }
            EventKind::SubscriberUnsubscribed => {
                let data: SubscriberEventData = serde_json::from_value(event.data.clone())?;
                self.handle_unsubscribed(&data).await
            }
            EventKind::Broadcast(kind) => {
                let data: BroadcastEventData = serde_json::from_value(event.data.clone())?;
                self.handle_broadcast(event, kind, &data).await
            }
            EventKind::Unknown => {
                // Forward-compatible: providers add event types without notice.
                info!(event_type = %event.event_type, "unhandled webhook event type, dropped");
                Ok(Disposition::Ignored)
            }
        }
    }

    /// Upsert keyed on email. Re-delivery of the same event converges on
    /// the same record.
    async fn handle_subscribed(
        &self,
        data: &SubscriberEventData,
    ) -> Result<Disposition, RouterError> {
        let mut subscriber = self
            .store
            .find_subscriber_by_email(&data.email)
            .await?
            .unwrap_or_else(|| Subscriber::new(&data.email));
        subscriber.status = SubscriberStatus::Active;
        if subscriber.subscribed_at.is_none() {
            subscriber.subscribed_at = Some(Utc::now());
        }
        if subscriber.provider_subscriber_id.is_none() {
            subscriber.provider_subscriber_id = data.id.clone();
        }
        self.store.upsert_subscriber(subscriber).await?;
        Ok(Disposition::Applied)
    }

    async fn handle_unsubscribed(
        &self,
        data: &SubscriberEventData,
    ) -> Result<Disposition, RouterError> {
        let Some(mut subscriber) = self.store.find_subscriber_by_email(&data.email).await? else {
            warn!(email = %data.email, "unsubscribe for unknown subscriber, dropped");
            return Ok(Disposition::Ignored);
        };
        subscriber.status = SubscriberStatus::Unsubscribed;
        if subscriber.unsubscribed_at.is_none() {
            subscriber.unsubscribed_at = Some(Utc::now());
        }
        if let Some(reason) = &data.reason {
            subscriber.unsubscribe_reason = Some(reason.clone());
        }
        self.store.upsert_subscriber(subscriber).await?;
        Ok(Disposition::Applied)
    }

    /// Correlates on the webhook-facing external id and applies a merge
    /// patch. Out-of-order deliveries are caught by the store's stale-trail
    /// guard, which records the event but refuses the status change.
    async fn handle_broadcast(
        &self,
        event: &WebhookEvent,
        kind: BroadcastEventKind,
        data: &BroadcastEventData,
    ) -> Result<Disposition, RouterError> {
        let Some(broadcast) = self
            .store
            .find_broadcast_by_external_id(&data.broadcast_id)
            .await?
        else {
            warn!(
                external_id = %data.broadcast_id,
                event_type = %event.event_type,
                "webhook for unknown broadcast, dropped"
            );
            return Ok(Disposition::Ignored);
        };

        let mut trail = TrailUpdate::new(event.event_type.clone(), event.occurred_at);
        trail.sent_count = data.sent_count;
        trail.total_count = data.total_count;
        trail.failed_count = data.failed_count;
        trail.remaining_count = data.remaining_count;

        let mut patch = BroadcastPatch {
            send_status: Some(kind.canonical_status()),
            ..Default::default()
        };
        match kind {
            BroadcastEventKind::Scheduled => {
                patch.scheduled_at = data.scheduled_at;
            }
            BroadcastEventKind::Queueing | BroadcastEventKind::Sending => {
                trail.sending_started_at = Some(event.occurred_at);
            }
            BroadcastEventKind::Sent => {
                // Terminal events carry the send start too, in case the
                // intermediate `sending` delivery never arrived.
                trail.sending_started_at = data.sending_started_at;
                patch.sent_at = Some(event.occurred_at);
            }
            BroadcastEventKind::PartialFailure => {
                // Completed with failures: terminal status is still `sent`,
                // flagged for the admin UI.
                trail.sending_started_at = data.sending_started_at;
                trail.has_warnings = Some(true);
                trail.failure_reason = data.reason.clone();
                patch.sent_at = Some(event.occurred_at);
            }
            BroadcastEventKind::Failed => {
                trail.failed_at = Some(event.occurred_at);
                trail.failure_reason = data.reason.clone();
            }
            BroadcastEventKind::Aborted => {
                trail.aborted_at = Some(event.occurred_at);
                trail.abort_reason = data.reason.clone();
            }
            BroadcastEventKind::Paused => {
                trail.paused_at = Some(event.occurred_at);
            }
        }
        patch.trail = Some(trail);

        self.store.update_broadcast(broadcast.id, patch).await?;
        info!(
            broadcast_id = %broadcast.id,
            event_type = %event.event_type,
            status = kind.canonical_status().as_str(),
            "webhook event applied"
        );
        Ok(Disposition::Applied)
    }
}
