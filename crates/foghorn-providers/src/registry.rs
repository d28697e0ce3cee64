//! Settings-driven adapter resolution with hot reload.
//!
//! The active provider is resolved once from persisted settings into a
//! concrete adapter instance and cached. Settings carry a revision counter
//! bumped on admin saves; when the registry sees a newer revision it
//! rebuilds the adapter, so credential changes take effect without a
//! restart and without any ambient global state.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use foghorn_core::{NewsletterSettings, NewsletterStore, ProviderError, ProviderKind, RuntimeEnv};

use crate::{BroadcastApiProvider, BroadcastProvider, ResendProvider};

/// Seam over "give me the currently configured provider". The registry is
/// the production implementation; [`FixedProvider`] pins one instance for
/// tests and static wiring.
#[async_trait]
pub trait ProviderSource: Send + Sync {
    async fn current(&self) -> Result<Arc<dyn BroadcastProvider>, ProviderError>;
}

pub struct ProviderRegistry {
    store: Arc<dyn NewsletterStore>,
    env: RuntimeEnv,
    cached: RwLock<Option<CachedProvider>>,
}

struct CachedProvider {
    revision: u64,
    kind: ProviderKind,
    provider: Arc<dyn BroadcastProvider>,
}

impl ProviderRegistry {
    pub fn new(store: Arc<dyn NewsletterStore>, env: RuntimeEnv) -> Self {
        Self {
            store,
            env,
            cached: RwLock::new(None),
        }
    }

    /// Builds the concrete adapter for a settings record. Closed dispatch
    /// over [`ProviderKind`]; no runtime string lookup.
    pub fn build(
        settings: &NewsletterSettings,
        env: RuntimeEnv,
    ) -> Result<Arc<dyn BroadcastProvider>, ProviderError> {
        match settings.provider {
            ProviderKind::BroadcastApi => {
                let credentials =
                    settings
                        .broadcast_api
                        .as_ref()
                        .ok_or(ProviderError::Configuration {
                            provider: "broadcast_api",
                            message: "broadcast_api credentials are not configured".to_string(),
                        })?;
                Ok(Arc::new(BroadcastApiProvider::new(credentials, env)?))
            }
            ProviderKind::Resend => {
                let credentials = settings.resend.as_ref().ok_or(ProviderError::Configuration {
                    provider: "resend",
                    message: "resend credentials are not configured".to_string(),
                })?;
                Ok(Arc::new(ResendProvider::new(credentials, env)?))
            }
        }
    }

    async fn load_settings(&self) -> Result<NewsletterSettings, ProviderError> {
        let stored = self
            .store
            .load_settings()
            .await
            .map_err(|err| ProviderError::Configuration {
                provider: "registry",
                message: format!("settings load failed: {err}"),
            })?;
        Ok(stored.unwrap_or_else(NewsletterSettings::from_env))
    }
}

#[async_trait]
impl ProviderSource for ProviderRegistry {
    async fn current(&self) -> Result<Arc<dyn BroadcastProvider>, ProviderError> {
        // Settings are re-read per operation; admins may rotate credentials
        // at any time.
        let settings = self.load_settings().await?;

        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref() {
                if entry.revision == settings.revision && entry.kind == settings.provider {
                    return Ok(entry.provider.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;
        // Double-check after the write lock; another task may have rebuilt.
        if let Some(entry) = cached.as_ref() {
            if entry.revision == settings.revision && entry.kind == settings.provider {
                return Ok(entry.provider.clone());
            }
        }
        let provider = Self::build(&settings, self.env)?;
        info!(
            provider = provider.name(),
            revision = settings.revision,
            "provider adapter (re)initialized"
        );
        *cached = Some(CachedProvider {
            revision: settings.revision,
            kind: settings.provider,
            provider: provider.clone(),
        });
        Ok(provider)
    }
}

/// Pins a single provider instance. Used by tests and one-shot tooling.
pub struct FixedProvider(pub Arc<dyn BroadcastProvider>);

#[async_trait]
impl ProviderSource for FixedProvider {
    async fn current(&self) -> Result<Arc<dyn BroadcastProvider>, ProviderError> {
        Ok(self.0.clone())
    }
}
