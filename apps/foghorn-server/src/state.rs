//! Dependency wiring for the service. Everything is passed explicitly; no
//! ambient globals, so tests can swap the store or pin a provider.

use std::sync::Arc;

use foghorn_core::{ContentRenderer, HtmlRenderer, NewsletterStore};
use foghorn_providers::{ProviderRegistry, ProviderSource};
use foghorn_sync::{ReconcileConfig, SyncEngine, WebhookRouter};

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn NewsletterStore>,
    pub providers: Arc<dyn ProviderSource>,
    pub engine: Arc<SyncEngine>,
    pub webhooks: Arc<WebhookRouter>,
    pub reconcile: ReconcileConfig,
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(store: Arc<dyn NewsletterStore>, config: &ServerConfig) -> Self {
        let providers: Arc<dyn ProviderSource> =
            Arc::new(ProviderRegistry::new(store.clone(), config.env));
        let renderer: Arc<dyn ContentRenderer> =
            Arc::new(HtmlRenderer::new(config.media_base_url.clone()));
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            providers.clone(),
            renderer,
        ));
        let webhooks = Arc::new(WebhookRouter::new(store.clone()));
        Self {
            store,
            providers,
            engine,
            webhooks,
            reconcile: config.reconcile(),
            admin_token: config.admin_token.clone(),
        }
    }
}
