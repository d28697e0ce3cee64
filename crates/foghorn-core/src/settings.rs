//! Persisted newsletter settings, with environment-variable fallback when
//! no settings record exists yet.
//!
//! Settings are read-mostly but may change under an admin's feet; callers
//! re-read them per operation rather than caching indefinitely. The
//! `revision` counter is bumped on every admin save and keys the provider
//! registry's hot reload.

use std::env;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of supported providers, resolved once into a concrete
/// adapter at configuration load. No runtime string class lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    BroadcastApi,
    Resend,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::BroadcastApi => "broadcast_api",
            ProviderKind::Resend => "resend",
        }
    }
}

/// Deployment tier; development tokens are preferred outside production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeEnv {
    Development,
    Production,
}

impl RuntimeEnv {
    /// Reads `FOGHORN_ENV`; anything other than "production" is development.
    pub fn from_env() -> Self {
        match env::var("FOGHORN_ENV") {
            Ok(value) if value.eq_ignore_ascii_case("production") => RuntimeEnv::Production,
            _ => RuntimeEnv::Development,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastApiCredentials {
    pub base_url: String,
    pub production_token: Option<String>,
    pub development_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResendCredentials {
    pub production_key: Option<String>,
    pub development_key: Option<String>,
    /// Audience used when a broadcast's channel has no provider id yet.
    pub default_audience_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsletterSettings {
    pub provider: ProviderKind,
    pub broadcast_api: Option<BroadcastApiCredentials>,
    pub resend: Option<ResendCredentials>,
    pub webhook_secret: Option<String>,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub reply_to: Option<String>,
    /// Observability: stamped after each successfully processed webhook.
    pub last_webhook_at: Option<DateTime<Utc>>,
    pub last_webhook_verified: Option<bool>,
    /// Bumped on admin saves; keys provider hot-reload.
    pub revision: u64,
}

impl NewsletterSettings {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            broadcast_api: None,
            resend: None,
            webhook_secret: None,
            from_name: None,
            from_email: None,
            reply_to: None,
            last_webhook_at: None,
            last_webhook_verified: None,
            revision: 0,
        }
    }

    /// Fallback when no settings record has been persisted yet.
    pub fn from_env() -> Self {
        let provider = match env::var("FOGHORN_PROVIDER") {
            Ok(value) if value.eq_ignore_ascii_case("resend") => ProviderKind::Resend,
            _ => ProviderKind::BroadcastApi,
        };
        Self {
            provider,
            broadcast_api: Some(BroadcastApiCredentials {
                base_url: env::var("BROADCAST_API_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
                production_token: env::var("BROADCAST_API_TOKEN").ok(),
                development_token: env::var("BROADCAST_API_DEV_TOKEN").ok(),
            }),
            resend: Some(ResendCredentials {
                production_key: env::var("RESEND_API_KEY").ok(),
                development_key: env::var("RESEND_DEV_API_KEY").ok(),
                default_audience_id: env::var("RESEND_AUDIENCE_ID").ok(),
            }),
            webhook_secret: env::var("NEWSLETTER_WEBHOOK_SECRET").ok(),
            from_name: env::var("NEWSLETTER_FROM_NAME").ok(),
            from_email: env::var("NEWSLETTER_FROM_EMAIL").ok(),
            reply_to: env::var("NEWSLETTER_REPLY_TO").ok(),
            last_webhook_at: None,
            last_webhook_verified: None,
            revision: 0,
        }
    }
}
