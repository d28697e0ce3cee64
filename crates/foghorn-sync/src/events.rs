//! Webhook event taxonomy and payload parsing.
//!
//! Event types are dot-namespaced strings (`subscriber.*`, `broadcast.*`).
//! Unrecognized types parse to [`EventKind::Unknown`] so the router can
//! log and drop them, staying forward-compatible with provider additions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use foghorn_core::BroadcastStatus;

/// Inbound provider notification, deserialized after verification.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SubscriberSubscribed,
    SubscriberUnsubscribed,
    Broadcast(BroadcastEventKind),
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastEventKind {
    Scheduled,
    Queueing,
    Sending,
    Sent,
    Failed,
    PartialFailure,
    Aborted,
    Paused,
}

impl EventKind {
    pub fn parse(event_type: &str) -> EventKind {
        match event_type {
            "subscriber.subscribed" => EventKind::SubscriberSubscribed,
            "subscriber.unsubscribed" => EventKind::SubscriberUnsubscribed,
            "broadcast.scheduled" => EventKind::Broadcast(BroadcastEventKind::Scheduled),
            "broadcast.queueing" => EventKind::Broadcast(BroadcastEventKind::Queueing),
            "broadcast.sending" => EventKind::Broadcast(BroadcastEventKind::Sending),
            "broadcast.sent" => EventKind::Broadcast(BroadcastEventKind::Sent),
            "broadcast.failed" => EventKind::Broadcast(BroadcastEventKind::Failed),
            "broadcast.partial_failure" => {
                EventKind::Broadcast(BroadcastEventKind::PartialFailure)
            }
            "broadcast.aborted" => EventKind::Broadcast(BroadcastEventKind::Aborted),
            "broadcast.paused" => EventKind::Broadcast(BroadcastEventKind::Paused),
            _ => EventKind::Unknown,
        }
    }
}

impl BroadcastEventKind {
    /// Canonical status this event maps to. `partial_failure` maps to
    /// `sent` (with a warning flag merged separately); preserved observed
    /// behavior.
    pub fn canonical_status(&self) -> BroadcastStatus {
        match self {
            BroadcastEventKind::Scheduled => BroadcastStatus::Scheduled,
            BroadcastEventKind::Queueing | BroadcastEventKind::Sending => {
                BroadcastStatus::Sending
            }
            BroadcastEventKind::Sent | BroadcastEventKind::PartialFailure => {
                BroadcastStatus::Sent
            }
            BroadcastEventKind::Failed => BroadcastStatus::Failed,
            BroadcastEventKind::Aborted => BroadcastStatus::Canceled,
            BroadcastEventKind::Paused => BroadcastStatus::Paused,
        }
    }
}

/// Payload of `subscriber.*` events.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberEventData {
    pub email: String,
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Payload of `broadcast.*` events. Providers disagree on whether ids are
/// numbers or strings; both are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastEventData {
    #[serde(deserialize_with = "lenient_required_id", alias = "id")]
    pub broadcast_id: String,
    #[serde(default)]
    pub sent_count: Option<u64>,
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub failed_count: Option<u64>,
    #[serde(default)]
    pub remaining_count: Option<u64>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sending_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(i64),
}

impl StringOrNumber {
    fn into_string(self) -> String {
        match self {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        }
    }
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<StringOrNumber>::deserialize(deserializer)?;
    Ok(value.map(StringOrNumber::into_string))
}

fn lenient_required_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    StringOrNumber::deserialize(deserializer).map(StringOrNumber::into_string)
}
