//! Enqueue orchestrator: one schedule call per batch, one composition per
//! recipient, one snapshot write at the end.

use std::time::Duration;

use chrono::{DateTime, TimeZone};
use mailcadence_core::error::Result;
use mailcadence_core::traits::{ComposeRequest, Composer, Recipient};
use mailcadence_core::types::{QueueItem, now_ms};

use crate::slots::{ScheduleParams, schedule};
use crate::store::QueueStore;

/// Outcome of one batch.
#[derive(Debug, Clone, Default)]
pub struct EnqueueReport {
    /// Drafts written to the queue, in input order.
    pub items: Vec<QueueItem>,
    /// Rows dropped before scheduling (no recipient address).
    pub skipped: usize,
    /// Rows whose composition failed, with the reason.
    pub failed: Vec<(String, String)>,
}

impl EnqueueReport {
    pub fn enqueued(&self) -> usize {
        self.items.len()
    }
}

/// Compose and append a batch of drafts.
///
/// Slots are assigned positionally to the rows that have an address. A row
/// whose composition fails is skipped and its slot stays unused. Nothing is
/// written when every row fails. `delay` paces consecutive composer calls.
pub async fn enqueue_batch<Tz: TimeZone>(
    store: &QueueStore,
    composer: &dyn Composer,
    rows: &[Recipient],
    params: &ScheduleParams,
    request: &ComposeRequest,
    now: &DateTime<Tz>,
    delay: Duration,
) -> Result<EnqueueReport> {
    let valid: Vec<&Recipient> = rows.iter().filter(|r| r.address().is_some()).collect();
    let mut report = EnqueueReport {
        skipped: rows.len() - valid.len(),
        ..Default::default()
    };
    if report.skipped > 0 {
        tracing::warn!("⚠️ Skipping {} rows without a recipient", report.skipped);
    }

    let slots = schedule(valid.len(), params, now)?;
    tracing::info!(
        "📝 Composing {} drafts with {}",
        valid.len(),
        composer.name()
    );

    for (i, (row, send_at)) in valid.iter().zip(slots).enumerate() {
        let address = row.address().unwrap_or_default();
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match composer.compose(row, request).await {
            Ok(content) => {
                tracing::info!("✍️ Draft for {address}: {}", content.subject);
                report.items.push(QueueItem::draft(
                    address,
                    row.name.as_deref().unwrap_or_default(),
                    row.company.as_deref(),
                    &content.subject,
                    &content.body,
                    send_at,
                    now_ms(),
                ));
            }
            Err(e) => {
                tracing::warn!("⚠️ Compose failed for {address}: {e}");
                report.failed.push((address.to_string(), e.to_string()));
            }
        }
    }

    if report.items.is_empty() {
        tracing::info!("📭 No drafts to enqueue");
        return Ok(report);
    }

    // re-read right before appending so concurrent edits are not clobbered
    let mut queue = store.read_all()?;
    queue.extend(report.items.iter().cloned());
    store.write_all(&queue)?;
    tracing::info!(
        "📦 Enqueued {} drafts ({} skipped, {} failed)",
        report.enqueued(),
        report.skipped,
        report.failed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use mailcadence_core::error::MailCadenceError;
    use mailcadence_core::traits::DraftContent;
    use mailcadence_core::types::QueueStatus;

    /// Composer that fails for any address listed in `fail_for`.
    struct StubComposer {
        fail_for: Vec<&'static str>,
    }

    #[async_trait]
    impl Composer for StubComposer {
        fn name(&self) -> &str {
            "stub"
        }

        async fn compose(&self, recipient: &Recipient, _request: &ComposeRequest) -> Result<DraftContent> {
            if self.fail_for.contains(&recipient.recipient.as_str()) {
                return Err(MailCadenceError::Compose("quota exceeded".into()));
            }
            Ok(DraftContent {
                subject: format!("Hi {}", recipient.recipient),
                body: "<p>Body</p>".into(),
            })
        }
    }

    fn monday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 7, 0, 0).unwrap()
    }

    fn params() -> ScheduleParams {
        ScheduleParams {
            daily_limit: 3,
            ..Default::default()
        }
    }

    fn rows(addresses: &[&str]) -> Vec<Recipient> {
        addresses.iter().map(|a| Recipient::new(a)).collect()
    }

    fn store() -> (tempfile::TempDir, QueueStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::json(&dir.path().join("queue.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_batch_becomes_drafts_with_slots() {
        let (_dir, store) = store();
        let composer = StubComposer { fail_for: vec![] };
        let now = monday_morning();
        let report = enqueue_batch(
            &store,
            &composer,
            &rows(&["a@x.com", "b@x.com", "c@x.com", "d@x.com"]),
            &params(),
            &ComposeRequest::default(),
            &now,
            Duration::ZERO,
        )
        .await
        .unwrap();

        assert_eq!(report.enqueued(), 4);
        let expected = schedule(4, &params(), &now).unwrap();
        let stored = store.read_all().unwrap();
        assert_eq!(stored.len(), 4);
        assert!(stored.iter().all(|i| i.status == QueueStatus::Draft && i.retries == 0));
        assert_eq!(stored.iter().map(|i| i.send_at).collect::<Vec<_>>(), expected);
        assert_eq!(stored[3].subject, "Hi d@x.com");
    }

    #[tokio::test]
    async fn test_blank_rows_skipped_and_failed_slot_unused() {
        let (_dir, store) = store();
        let composer = StubComposer { fail_for: vec!["b@x.com"] };
        let now = monday_morning();
        let report = enqueue_batch(
            &store,
            &composer,
            &rows(&["a@x.com", "  ", "b@x.com", "c@x.com"]),
            &params(),
            &ComposeRequest::default(),
            &now,
            Duration::ZERO,
        )
        .await
        .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "b@x.com");

        let slots = schedule(3, &params(), &now).unwrap();
        let stored = store.read_all().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].send_at, slots[0]);
        // c keeps the third slot; b's slot is left empty
        assert_eq!(stored[1].recipient, "c@x.com");
        assert_eq!(stored[1].send_at, slots[2]);
    }

    #[tokio::test]
    async fn test_appends_to_existing_queue() {
        let (_dir, store) = store();
        let existing = QueueItem::draft("old@x.com", "", None, "s", "b", 1, 1);
        store.write_all(&[existing.clone()]).unwrap();

        let composer = StubComposer { fail_for: vec![] };
        enqueue_batch(
            &store,
            &composer,
            &rows(&["new@x.com"]),
            &params(),
            &ComposeRequest::default(),
            &monday_morning(),
            Duration::ZERO,
        )
        .await
        .unwrap();

        let stored = store.read_all().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0], existing);
        assert_eq!(stored[1].recipient, "new@x.com");
    }

    #[tokio::test]
    async fn test_invalid_params_write_nothing() {
        let (_dir, store) = store();
        let composer = StubComposer { fail_for: vec![] };
        let bad = ScheduleParams {
            daily_limit: 0,
            ..Default::default()
        };
        let err = enqueue_batch(
            &store,
            &composer,
            &rows(&["a@x.com"]),
            &bad,
            &ComposeRequest::default(),
            &monday_morning(),
            Duration::ZERO,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MailCadenceError::InvalidScheduleParameters(_)));
        assert!(store.read_all().unwrap().is_empty());
    }
}
