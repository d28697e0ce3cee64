//! Polling reconciliation: the safety net for missed webhooks.
//!
//! Webhook delivery is best-effort. A broadcast that entered `sending` and
//! never heard its terminal event would otherwise stay stuck forever, so a
//! periodic sweep polls the provider for broadcasts that have been in
//! `sending` with no update for longer than the staleness threshold and
//! reconciles their status. Synthetic trail events are tagged
//! `polling.sync.*` so the audit log distinguishes polled transitions from
//! webhook-driven ones.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use foghorn_core::{BroadcastPatch, BroadcastStatus, NewsletterStore, TrailUpdate};
use foghorn_providers::ProviderSource;

use crate::engine::SyncError;

#[derive(Debug, Clone, Copy)]
pub struct ReconcileConfig {
    /// How long a `sending` broadcast may go without an update before it
    /// is considered stuck.
    pub stale_after: Duration,
    /// Per-sweep cap; stragglers are picked up by the next run.
    pub batch_limit: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::minutes(10),
            batch_limit: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub checked: usize,
    pub updated: usize,
    pub errors: usize,
    pub items: Vec<SweepItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepItem {
    pub broadcast_id: Uuid,
    pub outcome: SweepOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SweepOutcome {
    Updated {
        from: BroadcastStatus,
        to: BroadcastStatus,
    },
    /// Provider still reports `sending`; nothing to reconcile.
    StillSending,
    Failed {
        error: String,
    },
}

/// Runs one reconciliation pass. Per-item failures are recorded and do not
/// abort the sweep; only a store or provider-resolution failure does.
pub async fn run_sweep(
    store: &Arc<dyn NewsletterStore>,
    providers: &Arc<dyn ProviderSource>,
    config: &ReconcileConfig,
) -> Result<SweepSummary, SyncError> {
    let provider = providers.current().await?;
    let stale_before = Utc::now() - config.stale_after;
    let stuck = store
        .stuck_broadcasts(stale_before, config.batch_limit)
        .await?;

    let mut summary = SweepSummary {
        checked: stuck.len(),
        updated: 0,
        errors: 0,
        items: Vec::with_capacity(stuck.len()),
    };

    for broadcast in stuck {
        let Some(provider_id) = broadcast.provider_id.as_deref() else {
            // Sending without a provider id should not happen; surface it.
            warn!(broadcast_id = %broadcast.id, "stuck broadcast has no provider id");
            summary.errors += 1;
            summary.items.push(SweepItem {
                broadcast_id: broadcast.id,
                outcome: SweepOutcome::Failed {
                    error: "missing provider id".to_string(),
                },
            });
            continue;
        };

        let remote = match provider.get_broadcast(provider_id).await {
            Ok(remote) => remote,
            Err(err) => {
                warn!(broadcast_id = %broadcast.id, error = %err, "poll lookup failed");
                summary.errors += 1;
                summary.items.push(SweepItem {
                    broadcast_id: broadcast.id,
                    outcome: SweepOutcome::Failed {
                        error: err.to_string(),
                    },
                });
                continue;
            }
        };

        if remote.status == BroadcastStatus::Sending {
            summary.items.push(SweepItem {
                broadcast_id: broadcast.id,
                outcome: SweepOutcome::StillSending,
            });
            continue;
        }

        let now = Utc::now();
        let mut patch = BroadcastPatch {
            send_status: Some(remote.status),
            trail: Some(TrailUpdate::new(
                format!("polling.sync.{}", remote.status.as_str()),
                now,
            )),
            ..Default::default()
        };
        if remote.status == BroadcastStatus::Sent {
            patch.sent_at = remote.sent_at.or(Some(now));
        }

        match store.update_broadcast(broadcast.id, patch).await {
            Ok(_) => {
                info!(
                    broadcast_id = %broadcast.id,
                    from = broadcast.send_status.as_str(),
                    to = remote.status.as_str(),
                    "stuck broadcast reconciled by polling"
                );
                summary.updated += 1;
                summary.items.push(SweepItem {
                    broadcast_id: broadcast.id,
                    outcome: SweepOutcome::Updated {
                        from: broadcast.send_status,
                        to: remote.status,
                    },
                });
            }
            Err(err) => {
                warn!(broadcast_id = %broadcast.id, error = %err, "reconcile write failed");
                summary.errors += 1;
                summary.items.push(SweepItem {
                    broadcast_id: broadcast.id,
                    outcome: SweepOutcome::Failed {
                        error: err.to_string(),
                    },
                });
            }
        }
    }

    info!(
        scanned = summary.checked,
        updated = summary.updated,
        failed = summary.errors,
        "reconcile sweep finished"
    );
    Ok(summary)
}
