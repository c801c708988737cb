//! Dispatch worker: the long-running loop that sends due messages.
//!
//! One pass: read the whole queue, take every queued item whose slot has
//! passed (snapshot order), and deliver them one at a time with a random
//! jitter pause after each attempt. When nothing is due, sleep the idle
//! interval and poll again.
//!
//! A failed attempt keeps the item's `send_at`, so it stays due and is
//! retried on the next pass. The second failure is terminal.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use mailcadence_core::config::WorkerConfig;
use mailcadence_core::error::{MailCadenceError, Result};
use mailcadence_core::traits::{Delivery, OutgoingMail, Transport};
use mailcadence_core::types::{QueueItem, QueueItemPatch, QueueStatus, now_ms};
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::store::{QueueStore, earliest_queued};

/// Failed attempts allowed before an item becomes `error`.
pub const RETRY_CEILING: u32 = 2;

/// Retry count and status after one more failed attempt.
pub fn after_failure(retries: u32) -> (u32, QueueStatus) {
    let retries = retries.saturating_add(1);
    let status = if retries >= RETRY_CEILING {
        QueueStatus::Error
    } else {
        QueueStatus::Queued
    };
    (retries, status)
}

/// Pacing of the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    pub idle: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

impl WorkerSettings {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            jitter_min: Duration::from_secs(config.jitter_min_secs),
            jitter_max: Duration::from_secs(config.jitter_max_secs.max(config.jitter_min_secs)),
            idle: Duration::from_secs(config.idle_secs),
        }
    }

    /// Uniform pause in `[jitter_min, jitter_max]`, millisecond resolution.
    pub fn jitter(&self) -> Duration {
        let lo = self.jitter_min.as_millis() as u64;
        let hi = (self.jitter_max.as_millis() as u64).max(lo);
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }
}

/// What happened to one due item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Sent,
    Simulated,
    /// Failed, still queued for another try.
    Retried,
    /// Failed and hit the retry ceiling.
    Failed,
}

/// Result of one pass over the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub due: usize,
    pub sent: usize,
    pub simulated: usize,
    pub retried: usize,
    pub failed: usize,
    /// Earliest upcoming queued slot, only filled on idle passes.
    pub next_send_at: Option<i64>,
    /// The pass stopped early because shutdown was requested.
    pub cancelled: bool,
}

impl PassReport {
    pub fn is_idle(&self) -> bool {
        self.due == 0
    }

    pub fn attempts(&self) -> usize {
        self.sent + self.simulated + self.retried + self.failed
    }

    fn record(&mut self, outcome: AttemptOutcome) {
        match outcome {
            AttemptOutcome::Sent => self.sent += 1,
            AttemptOutcome::Simulated => self.simulated += 1,
            AttemptOutcome::Retried => self.retried += 1,
            AttemptOutcome::Failed => self.failed += 1,
        }
    }
}

/// The dispatch worker. Exactly one delivery is in flight at any time.
pub struct DispatchWorker {
    store: Arc<QueueStore>,
    transport: Arc<dyn Transport>,
    settings: WorkerSettings,
}

impl DispatchWorker {
    pub fn new(
        store: Arc<QueueStore>,
        transport: Arc<dyn Transport>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            store,
            transport,
            settings,
        }
    }

    /// One pass over the queue.
    ///
    /// Delivery failures become state transitions; only store errors are
    /// returned.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> Result<PassReport> {
        let items = self.store.read_all()?;
        let now = now_ms();
        let due: Vec<&QueueItem> = items.iter().filter(|i| i.is_due(now)).collect();
        let mut report = PassReport {
            due: due.len(),
            ..Default::default()
        };

        if due.is_empty() {
            match earliest_queued(&items) {
                Some(next) => {
                    report.next_send_at = Some(next.send_at);
                    tracing::info!(
                        "💤 Idle. Next scheduled message: {} at {}",
                        next.recipient,
                        format_local(next.send_at)
                    );
                }
                None => tracing::info!("💤 Idle. No messages in queue."),
            }
            return Ok(report);
        }

        tracing::info!("📬 Found {} due messages, processing...", due.len());
        for item in due {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let outcome = self.attempt(item).await?;
            report.record(outcome);

            let pause = self.settings.jitter();
            tracing::info!(
                "⏳ Jitter: waiting {}s before next action",
                pause.as_secs()
            );
            if !pause_or_cancel(pause, cancel).await {
                report.cancelled = true;
                break;
            }
        }
        Ok(report)
    }

    /// Deliver one item and persist the resulting state.
    async fn attempt(&self, item: &QueueItem) -> Result<AttemptOutcome> {
        tracing::info!("📤 Sending to {} via {}", item.recipient, self.transport.name());
        let mail = OutgoingMail::new(&item.recipient, &item.subject, &item.body);

        let (patch, outcome) = match self.transport.send(&mail).await {
            Ok(Delivery::Sent) => {
                tracing::info!("✅ Sent to {}", item.recipient);
                (QueueItemPatch::sent(now_ms()), AttemptOutcome::Sent)
            }
            Ok(Delivery::Simulated) => {
                tracing::info!("🧪 Dry run for {}", item.recipient);
                (QueueItemPatch::dry_run(), AttemptOutcome::Simulated)
            }
            Err(e) => {
                let (retries, status) = after_failure(item.retries);
                tracing::warn!(
                    "⚠️ Failed to send to {}: {e} (status '{status}' after {retries} failures)",
                    item.recipient
                );
                let outcome = if status == QueueStatus::Error {
                    AttemptOutcome::Failed
                } else {
                    AttemptOutcome::Retried
                };
                (QueueItemPatch::failed(retries, status, &e.to_string()), outcome)
            }
        };

        self.store.update(&item.id, &patch)?;
        Ok(outcome)
    }

    /// Run until `cancel` fires. Returns `CriticalLoopFailure` when a pass
    /// fails; the loop is never restarted from here.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        tracing::info!(
            "🚀 Dispatch worker started (transport: {}, queue: {})",
            self.transport.name(),
            self.store.describe()
        );

        while !cancel.is_cancelled() {
            let report = self.poll_once(&cancel).await.map_err(|e| {
                tracing::error!("❌ Critical worker error: {e}");
                MailCadenceError::CriticalLoopFailure(e.to_string())
            })?;
            if report.cancelled {
                break;
            }
            if report.is_idle() && !pause_or_cancel(self.settings.idle, &cancel).await {
                break;
            }
        }

        tracing::info!("🛑 Dispatch worker stopped");
        Ok(())
    }
}

/// Spawn the worker loop as a background tokio task.
pub fn spawn_worker(worker: DispatchWorker, cancel: CancellationToken) -> JoinHandle<Result<()>> {
    tokio::spawn(async move { worker.run(cancel).await })
}

/// Sleep for `d`; `false` when cancelled first.
async fn pause_or_cancel(d: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(d) => true,
    }
}

fn format_local(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|d| d.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ms.to_string())
}
