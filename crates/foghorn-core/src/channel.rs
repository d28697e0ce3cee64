//! Channel entity: a named sending identity mapped to a provider-side
//! audience or list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::settings::ProviderKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub from_name: String,
    pub from_email: String,
    pub reply_to: Option<String>,
    pub provider: ProviderKind,
    /// Provider-side audience/list id. Set exactly once after the first
    /// successful remote creation; subsequent updates target the same id.
    pub provider_id: Option<String>,
    /// Cached provider-sourced count; eventually consistent.
    pub subscriber_count: u64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    pub fn new(
        name: impl Into<String>,
        from_name: impl Into<String>,
        from_email: impl Into<String>,
        provider: ProviderKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            from_name: from_name.into(),
            from_email: from_email.into(),
            reply_to: None,
            provider,
            provider_id: None,
            subscriber_count: 0,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// "Name <address>" sender string used by providers that take a single
    /// from field.
    pub fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }
}

/// Field-level merge patch for a channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub reply_to: Option<String>,
    pub provider_id: Option<String>,
    pub subscriber_count: Option<u64>,
    pub active: Option<bool>,
}
