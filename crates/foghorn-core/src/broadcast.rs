//! Broadcast entity: a single email campaign mirrored into a delivery provider.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::ContentDocument;

/// Canonical broadcast lifecycle status, independent of any provider's
/// native vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastStatus {
    Draft,
    Scheduled,
    Sending,
    Sent,
    Failed,
    Paused,
    Canceled,
}

impl BroadcastStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastStatus::Draft => "draft",
            BroadcastStatus::Scheduled => "scheduled",
            BroadcastStatus::Sending => "sending",
            BroadcastStatus::Sent => "sent",
            BroadcastStatus::Failed => "failed",
            BroadcastStatus::Paused => "paused",
            BroadcastStatus::Canceled => "canceled",
        }
    }

    /// Terminal from the synchronization engine's perspective: further
    /// transitions come only from verified webhooks or polling.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BroadcastStatus::Sent | BroadcastStatus::Failed | BroadcastStatus::Canceled
        )
    }

    pub const ALL: [BroadcastStatus; 7] = [
        BroadcastStatus::Draft,
        BroadcastStatus::Scheduled,
        BroadcastStatus::Sending,
        BroadcastStatus::Sent,
        BroadcastStatus::Failed,
        BroadcastStatus::Paused,
        BroadcastStatus::Canceled,
    ];
}

/// Provider-sourced delivery analytics. Eventually consistent; refreshed
/// on demand from the provider, never computed locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastAnalytics {
    pub recipient_count: u64,
    pub sent: u64,
    pub delivered: u64,
    pub opened: u64,
    pub clicked: u64,
    pub bounced: u64,
    pub complained: u64,
    pub unsubscribed: u64,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// One entry in the bounded recent-event log of a [`WebhookTrail`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailEntry {
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

/// Webhook audit trail carried on each broadcast. Fields are merged, never
/// overwritten wholesale, because webhook and sync paths both write to the
/// same record (see [`WebhookTrail::apply`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookTrail {
    pub last_event_type: Option<String>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub has_warnings: bool,
    pub failure_reason: Option<String>,
    pub sent_count: Option<u64>,
    pub total_count: Option<u64>,
    pub failed_count: Option<u64>,
    pub remaining_count: Option<u64>,
    pub sending_started_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub aborted_at: Option<DateTime<Utc>>,
    pub abort_reason: Option<String>,
    pub paused_at: Option<DateTime<Utc>>,
    pub recent_events: VecDeque<TrailEntry>,
}

/// Auxiliary fields to merge into a [`WebhookTrail`] for a single event.
/// `None` fields are left untouched on the trail.
#[derive(Debug, Clone, Default)]
pub struct TrailUpdate {
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub has_warnings: Option<bool>,
    pub failure_reason: Option<String>,
    pub sent_count: Option<u64>,
    pub total_count: Option<u64>,
    pub failed_count: Option<u64>,
    pub remaining_count: Option<u64>,
    pub sending_started_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub aborted_at: Option<DateTime<Utc>>,
    pub abort_reason: Option<String>,
    pub paused_at: Option<DateTime<Utc>>,
}

impl TrailUpdate {
    pub fn new(event_type: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_type: event_type.into(),
            occurred_at,
            ..Self::default()
        }
    }
}

impl WebhookTrail {
    /// Cap on the recent-event log. Providers retry at-least-once; the log
    /// is observability, not a ledger.
    pub const RECENT_EVENT_CAP: usize = 20;

    /// Merges one event's auxiliary fields into the trail.
    ///
    /// Returns `false` when the event is stale (strictly older than the
    /// stored `last_event_at`). Stale events are still appended to the
    /// recent-event log but must not regress status or counters; callers
    /// drop the rest of their patch in that case.
    pub fn apply(&mut self, update: TrailUpdate) -> bool {
        let stale = self
            .last_event_at
            .map(|last| update.occurred_at < last)
            .unwrap_or(false);

        self.push_recent(TrailEntry {
            event_type: update.event_type.clone(),
            occurred_at: update.occurred_at,
            recorded_at: Utc::now(),
        });

        if stale {
            return false;
        }

        self.last_event_type = Some(update.event_type);
        self.last_event_at = Some(update.occurred_at);
        if let Some(flag) = update.has_warnings {
            self.has_warnings = flag;
        }
        if let Some(reason) = update.failure_reason {
            self.failure_reason = Some(reason);
        }
        if let Some(count) = update.sent_count {
            self.sent_count = Some(count);
        }
        if let Some(count) = update.total_count {
            self.total_count = Some(count);
        }
        if let Some(count) = update.failed_count {
            self.failed_count = Some(count);
        }
        if let Some(count) = update.remaining_count {
            self.remaining_count = Some(count);
        }
        if let Some(at) = update.sending_started_at {
            self.sending_started_at = Some(at);
        }
        if let Some(at) = update.failed_at {
            self.failed_at = Some(at);
        }
        if let Some(at) = update.aborted_at {
            self.aborted_at = Some(at);
        }
        if let Some(reason) = update.abort_reason {
            self.abort_reason = Some(reason);
        }
        if let Some(at) = update.paused_at {
            self.paused_at = Some(at);
        }
        true
    }

    fn push_recent(&mut self, entry: TrailEntry) {
        if self.recent_events.len() >= Self::RECENT_EVENT_CAP {
            self.recent_events.pop_front();
        }
        self.recent_events.push_back(entry);
    }
}

/// A single email campaign. Locally authored, mirrored to the active
/// provider once subject and content are both present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broadcast {
    pub id: Uuid,
    pub name: String,
    pub subject: String,
    pub preheader: Option<String>,
    pub content: ContentDocument,
    pub send_status: BroadcastStatus,
    /// Identifier inside the provider's CRUD API. Set exactly once after
    /// the first successful remote creation; immutable afterwards.
    pub provider_id: Option<String>,
    /// Correlation id used in provider webhook payloads. May differ from
    /// `provider_id` in representation; tracked separately.
    pub external_id: Option<String>,
    /// Local channel this broadcast sends through.
    pub channel_id: Option<Uuid>,
    /// Local publish flag; the unpublished -> published transition triggers
    /// the provider send.
    pub published: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub track_opens: bool,
    pub track_clicks: bool,
    pub reply_to: Option<String>,
    pub segment_ids: Vec<String>,
    pub analytics: BroadcastAnalytics,
    pub webhook_trail: WebhookTrail,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Broadcast {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            subject: String::new(),
            preheader: None,
            content: ContentDocument::default(),
            send_status: BroadcastStatus::Draft,
            provider_id: None,
            external_id: None,
            channel_id: None,
            published: false,
            scheduled_at: None,
            sent_at: None,
            track_opens: true,
            track_clicks: true,
            reply_to: None,
            segment_ids: Vec::new(),
            analytics: BroadcastAnalytics::default(),
            webhook_trail: WebhookTrail::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Ready for provider-side creation: both subject and content present.
    pub fn ready_for_create(&self) -> bool {
        !self.subject.trim().is_empty() && !self.content.is_empty()
    }
}

/// Field-level merge patch for a broadcast. `None` fields are untouched;
/// the trail update is merged via [`WebhookTrail::apply`]. When the trail
/// update turns out to be stale the store drops the remainder of the patch
/// (stale webhook events must not regress state).
#[derive(Debug, Clone, Default)]
pub struct BroadcastPatch {
    pub send_status: Option<BroadcastStatus>,
    pub provider_id: Option<String>,
    pub external_id: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub analytics: Option<BroadcastAnalytics>,
    pub trail: Option<TrailUpdate>,
}
