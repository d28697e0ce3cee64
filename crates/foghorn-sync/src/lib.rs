//! Synchronization and reconciliation layer.
//!
//! Three write paths converge on the broadcast store:
//! - the [`engine::SyncEngine`], driven by local entity lifecycle events
//! - the [`router::WebhookRouter`], driven by verified provider webhooks
//! - the [`reconcile`] sweep, a polling safety net for missed webhooks
//!
//! All three apply field-level merge patches so none clobbers state only
//! another path knows about.

pub mod engine;
pub mod events;
#[cfg(test)]
pub(crate) mod testing;
pub mod reconcile;
pub mod router;
pub mod webhook;

pub use engine::{SyncEngine, SyncError};
pub use events::{BroadcastEventKind, EventKind, WebhookEvent};
pub use reconcile::{run_sweep, ReconcileConfig, SweepItem, SweepOutcome, SweepSummary};
pub use router::{Disposition, RouterError, WebhookRouter};
pub use webhook::{compute_signature, verify_signature, WebhookError, REPLAY_WINDOW_SECS};
