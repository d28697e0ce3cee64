//! Foghorn core: domain model for the newsletter broadcast service.
//!
//! Responsibilities:
//! - canonical broadcast/channel/subscriber entities and lifecycle enums
//! - the provider error taxonomy shared by every adapter
//! - the persistent-store seam (trait + in-memory backend)
//! - persisted newsletter settings with environment fallback
//! - the content-render boundary used before any provider transmission

pub mod broadcast;
pub mod channel;
pub mod content;
pub mod error;
pub mod settings;
pub mod store;
pub mod subscriber;

pub use broadcast::{
    Broadcast, BroadcastAnalytics, BroadcastPatch, BroadcastStatus, TrailEntry, TrailUpdate,
    WebhookTrail,
};
pub use channel::{Channel, ChannelPatch};
pub use content::{ContentBlock, ContentDocument, ContentRenderer, HtmlRenderer, RenderError};
pub use error::ProviderError;
pub use settings::{
    BroadcastApiCredentials, NewsletterSettings, ProviderKind, ResendCredentials, RuntimeEnv,
};
pub use store::{MemoryStore, NewsletterStore, StoreError};
pub use subscriber::{Subscriber, SubscriberStatus};
