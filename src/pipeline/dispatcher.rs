use std::sync::Arc;

use anyhow::Result;
use futures_util::{stream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration as TokioDuration};
use tracing::{debug, info, warn};

use crate::config;
use crate::observability::DeliveryMetrics;

use super::client::{BillingClient, DeliveryOutcome};
use super::models::{QueueEntry, QueueStatus};
use super::queue::QueueStore;

/// Knobs for one dispatcher cycle. Read from the environment at spawn time
/// and passed by value so tests can drive cycles with their own settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_retries: i32,
    pub retry_delay_secs: u64,
    pub batch_size: i64,
    pub worker_concurrency: usize,
}

impl DispatcherConfig {
    pub fn from_env() -> Self {
        Self {
            max_retries: *config::MAX_RETRIES,
            retry_delay_secs: *config::RETRY_DELAY_SECS,
            batch_size: *config::BATCH_SIZE,
            worker_concurrency: *config::WORKER_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

// key: delivery-dispatcher -> periodic retry sweep
pub fn spawn(
    store: QueueStore,
    client: Arc<BillingClient>,
    metrics: Arc<DeliveryMetrics>,
) -> DispatcherHandle {
    let cfg = DispatcherConfig::from_env();
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = time::interval(TokioDuration::from_secs(cfg.retry_delay_secs.max(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.changed() => break,
            }
            if let Err(err) = run_cycle(&store, &client, &cfg, &metrics).await {
                warn!(?err, "delivery dispatcher cycle failed");
            }
            if *shutdown_rx.borrow() {
                break;
            }
        }
        info!("delivery dispatcher stopped");
    });

    DispatcherHandle { shutdown_tx, task }
}

/// Handle for graceful shutdown: the current cycle (and its in-flight
/// delivery attempts) finishes before the loop exits.
pub struct DispatcherHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

// key: dispatcher-cycle -> claim,deliver,record
/// One sweep: claim due entries oldest-first, drive each through the billing
/// client with bounded concurrency, record the transition. A failure on one
/// entry never aborts the batch.
pub async fn run_cycle(
    store: &QueueStore,
    client: &BillingClient,
    cfg: &DispatcherConfig,
    metrics: &DeliveryMetrics,
) -> Result<CycleStats> {
    let entries = store
        .select_due(cfg.batch_size, cfg.max_retries, cfg.retry_delay_secs)
        .await?;
    metrics.record_cycle();

    if entries.is_empty() {
        debug!("no due queue entries");
        return Ok(CycleStats::default());
    }

    let processed = entries.len();
    let results: Vec<bool> = stream::iter(entries)
        .map(|entry| async move {
            let entry_id = entry.id;
            match deliver_entry(store, client, &entry, cfg.max_retries, metrics).await {
                Ok(delivered) => delivered,
                Err(err) => {
                    warn!(?err, %entry_id, "queue entry delivery attempt errored");
                    false
                }
            }
        })
        .buffer_unordered(cfg.worker_concurrency)
        .collect()
        .await;

    let succeeded = results.iter().filter(|delivered| **delivered).count();
    let stats = CycleStats {
        processed,
        succeeded,
        failed: processed - succeeded,
    };
    info!(
        processed = stats.processed,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "delivery cycle complete"
    );
    Ok(stats)
}

// key: delivery-attempt -> the single authoritative success/failure path
/// Shared by the ingress inline attempt and the dispatcher sweep, so both
/// actors drive identical status transitions.
pub async fn deliver_entry(
    store: &QueueStore,
    client: &BillingClient,
    entry: &QueueEntry,
    max_retries: i32,
    metrics: &DeliveryMetrics,
) -> Result<bool> {
    let event = match entry.billing_event() {
        Ok(event) => event,
        Err(err) => {
            let message = format!("unreadable queue payload: {err}");
            record_failure(store, entry, &message, max_retries, metrics).await?;
            return Ok(false);
        }
    };

    match client.deliver(&event).await {
        DeliveryOutcome::Delivered => {
            store.mark_completed(entry.id).await?;
            metrics.record_delivered();
            info!(
                entry_id = %entry.id,
                idempotency_key = %entry.idempotency_key,
                "billing event delivered"
            );
            Ok(true)
        }
        DeliveryOutcome::Failed(message) => {
            record_failure(store, entry, &message, max_retries, metrics).await?;
            Ok(false)
        }
    }
}

async fn record_failure(
    store: &QueueStore,
    entry: &QueueEntry,
    message: &str,
    max_retries: i32,
    metrics: &DeliveryMetrics,
) -> Result<()> {
    metrics.record_delivery_failed();
    let updated = store.mark_failed(entry.id, message, max_retries).await?;
    match updated {
        Some(updated) if updated.status == QueueStatus::Dead => {
            metrics.record_dead_lettered();
            tracing::error!(
                entry_id = %entry.id,
                idempotency_key = %entry.idempotency_key,
                retry_count = updated.retry_count,
                %message,
                "queue entry exhausted its retry budget"
            );
        }
        Some(updated) => {
            warn!(
                entry_id = %entry.id,
                retry_count = updated.retry_count,
                %message,
                "billing event delivery failed, will retry"
            );
        }
        None => {
            // Raced with a completing actor; the terminal row wins.
            debug!(entry_id = %entry.id, "failure recorded against terminal entry, ignored");
        }
    }
    Ok(())
}
