use std::env;

use chrono::Duration;
use foghorn_core::RuntimeEnv;
use foghorn_sync::ReconcileConfig;
use url::Url;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Bearer token for the admin surface. Unset means open access, which
    /// is only acceptable for local development.
    pub admin_token: Option<String>,
    pub env: RuntimeEnv,
    pub reconcile_stale_minutes: i64,
    pub reconcile_batch: usize,
    /// Base URL for resolving relative media references during rendering.
    pub media_base_url: Option<Url>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("FOGHORN_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            admin_token: env::var("FOGHORN_ADMIN_TOKEN").ok(),
            env: RuntimeEnv::from_env(),
            reconcile_stale_minutes: env::var("FOGHORN_RECONCILE_STALE_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            reconcile_batch: env::var("FOGHORN_RECONCILE_BATCH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            media_base_url: env::var("FOGHORN_MEDIA_BASE_URL")
                .ok()
                .and_then(|v| Url::parse(&v).ok()),
        }
    }

    pub fn reconcile(&self) -> ReconcileConfig {
        ReconcileConfig {
            stale_after: Duration::minutes(self.reconcile_stale_minutes),
            batch_limit: self.reconcile_batch,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            admin_token: None,
            env: RuntimeEnv::Development,
            reconcile_stale_minutes: 10,
            reconcile_batch: 20,
            media_base_url: None,
        }
    }
}
