//! Durable queue store: the whole queue is one snapshot.
//!
//! Every operation reads the full snapshot and, when it changes anything,
//! writes the full snapshot back. There is no in-memory copy between calls,
//! so edits made by another command (approve, edit) are visible to the
//! worker on its next poll.
//!
//! Precondition: at most one process writes the queue at a time. Two writers
//! racing on read-modify-write silently lose one of the updates.

use std::collections::HashSet;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use mailcadence_core::config::{QueueBackendKind, QueueConfig};
use mailcadence_core::error::{MailCadenceError, Result};
use mailcadence_core::types::{QueueItem, QueueItemPatch, QueueStatus};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::persistence::SqliteBackend;

/// Snapshot backend: loads and replaces the entire queue.
pub trait QueueBackend: Send + Sync {
    /// Human-readable location for logs.
    fn describe(&self) -> String;

    /// `Ok(None)` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<Vec<QueueItem>>>;

    /// Replace the persisted snapshot. Readers never observe a partial write.
    fn save(&self, items: &[QueueItem]) -> Result<()>;
}

/// JSON file backend, human-readable, one pretty-printed array.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn parent_dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }
}

impl QueueBackend for JsonFileBackend {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Option<Vec<QueueItem>>> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MailCadenceError::StoreUnavailable(format!(
                    "read {}: {e}",
                    self.path.display()
                )));
            }
        };
        let items = serde_json::from_str(&json).map_err(|e| {
            MailCadenceError::StoreCorrupt(format!("parse {}: {e}", self.path.display()))
        })?;
        Ok(Some(items))
    }

    fn save(&self, items: &[QueueItem]) -> Result<()> {
        let parent = self.parent_dir();
        std::fs::create_dir_all(parent).map_err(|e| {
            MailCadenceError::StoreUnavailable(format!("create {}: {e}", parent.display()))
        })?;
        let json = serde_json::to_string_pretty(items)
            .map_err(|e| MailCadenceError::StoreUnavailable(format!("serialize queue: {e}")))?;

        // unique temp file per write, then rename over the snapshot
        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| {
            MailCadenceError::StoreUnavailable(format!("temp file in {}: {e}", parent.display()))
        })?;
        tmp.write_all(json.as_bytes()).map_err(|e| {
            MailCadenceError::StoreUnavailable(format!("write {}: {e}", tmp.path().display()))
        })?;
        tmp.persist(&self.path).map_err(|e| {
            MailCadenceError::StoreUnavailable(format!("replace {}: {e}", self.path.display()))
        })?;
        tracing::debug!("💾 Saved {} queue items to {}", items.len(), self.path.display());
        Ok(())
    }
}

/// Per-status counts plus the next item waiting for its slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSummary {
    pub total: usize,
    pub draft: usize,
    pub queued: usize,
    pub sent: usize,
    pub error: usize,
    pub dry_run: usize,
    /// Queued items whose slot has already passed.
    pub due: usize,
    pub next: Option<QueueItem>,
}

impl QueueSummary {
    pub fn from_items(items: &[QueueItem], now_ms: i64) -> Self {
        let mut summary = Self {
            total: items.len(),
            next: earliest_queued(items).cloned(),
            ..Default::default()
        };
        for item in items {
            match item.status {
                QueueStatus::Draft => summary.draft += 1,
                QueueStatus::Queued => summary.queued += 1,
                QueueStatus::Sent => summary.sent += 1,
                QueueStatus::Error => summary.error += 1,
                QueueStatus::DryRun => summary.dry_run += 1,
            }
            if item.is_due(now_ms) {
                summary.due += 1;
            }
        }
        summary
    }
}

/// Queued item with the smallest `send_at`; first one wins on ties.
pub fn earliest_queued(items: &[QueueItem]) -> Option<&QueueItem> {
    items
        .iter()
        .filter(|i| i.status == QueueStatus::Queued)
        .fold(None, |best: Option<&QueueItem>, item| match best {
            Some(b) if b.send_at <= item.send_at => Some(b),
            _ => Some(item),
        })
}

/// The queue store. Cheap to share behind an `Arc`.
pub struct QueueStore {
    backend: Box<dyn QueueBackend>,
}

impl QueueStore {
    pub fn new<B: QueueBackend + 'static>(backend: B) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// JSON file store at `path`.
    pub fn json(path: &Path) -> Self {
        Self::new(JsonFileBackend::new(path))
    }

    /// SQLite store at `path` (created and migrated on open).
    pub fn sqlite(path: &Path) -> Result<Self> {
        Ok(Self::new(SqliteBackend::open(path)?))
    }

    /// Open the backend selected in config.
    pub fn open(config: &QueueConfig) -> Result<Self> {
        let path = config.resolved_path();
        let store = match config.backend {
            QueueBackendKind::Json => Self::json(&path),
            QueueBackendKind::Sqlite => Self::sqlite(&path)?,
        };
        tracing::info!("📦 Queue store: {} ({:?})", store.describe(), config.backend);
        Ok(store)
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    /// Full snapshot. Empty when nothing was ever written.
    pub fn read_all(&self) -> Result<Vec<QueueItem>> {
        match self.backend.load()? {
            Some(items) => Ok(items),
            None => {
                tracing::debug!("Queue store {} does not exist yet", self.describe());
                Ok(Vec::new())
            }
        }
    }

    /// Replace the whole snapshot. Rejects duplicate ids without writing.
    pub fn write_all(&self, items: &[QueueItem]) -> Result<()> {
        let mut seen = HashSet::with_capacity(items.len());
        if let Some(dup) = items.iter().find(|i| !seen.insert(i.id.as_str())) {
            return Err(MailCadenceError::InvalidState(format!(
                "duplicate queue item id {}",
                dup.id
            )));
        }
        self.backend.save(items)
    }

    /// Merge `patch` into the item with `id`. Returns `false` (and writes
    /// nothing) when no such item exists.
    pub fn update(&self, id: &str, patch: &QueueItemPatch) -> Result<bool> {
        let mut items = self.read_all()?;
        let Some(item) = items.iter_mut().find(|i| i.id == id) else {
            tracing::debug!("Queue update skipped, no item {id}");
            return Ok(false);
        };
        item.apply(patch);
        self.backend.save(&items)?;
        Ok(true)
    }

    /// Flip every draft to queued. Returns how many changed.
    pub fn approve_drafts(&self) -> Result<usize> {
        let mut items = self.read_all()?;
        let mut count = 0;
        for item in items.iter_mut().filter(|i| i.status == QueueStatus::Draft) {
            item.status = QueueStatus::Queued;
            count += 1;
        }
        if count > 0 {
            self.backend.save(&items)?;
            tracing::info!("✅ Approved {count} drafts");
        }
        Ok(count)
    }

    /// Change subject and/or body of a draft.
    pub fn edit_draft(
        &self,
        id: &str,
        subject: Option<&str>,
        body: Option<&str>,
    ) -> Result<QueueItem> {
        let mut items = self.read_all()?;
        let item = items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| MailCadenceError::NotFound(format!("queue item {id}")))?;
        if item.status != QueueStatus::Draft {
            return Err(MailCadenceError::InvalidState(format!(
                "queue item {id} is {}, only drafts can be edited",
                item.status
            )));
        }
        item.apply(&QueueItemPatch {
            subject: subject.map(str::to_string),
            body: body.map(str::to_string),
            ..Default::default()
        });
        let edited = item.clone();
        self.backend.save(&items)?;
        Ok(edited)
    }

    pub fn summary(&self, now_ms: i64) -> Result<QueueSummary> {
        Ok(QueueSummary::from_items(&self.read_all()?, now_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(recipient: &str, send_at: i64) -> QueueItem {
        QueueItem::draft(recipient, "", None, "Subject", "<p>Body</p>", send_at, 0)
    }

    fn store_in(dir: &tempfile::TempDir) -> QueueStore {
        QueueStore::json(&dir.path().join("queue.json"))
    }

    #[test]
    fn test_missing_store_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.read_all().unwrap().is_empty());
        assert_eq!(store.approve_drafts().unwrap(), 0);
        // nothing was written
        assert!(!dir.path().join("queue.json").exists());
    }

    #[test]
    fn test_malformed_store_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("queue.json"), "{ not json").unwrap();
        let store = store_in(&dir);
        let err = store.read_all().unwrap_err();
        assert!(matches!(err, MailCadenceError::StoreCorrupt(_)));
        assert!(store.update("x", &QueueItemPatch::dry_run()).is_err());
    }

    #[test]
    fn test_round_trip_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut a = item("a@example.com", 10);
        a.company = Some("Acme".into());
        let items = vec![a, item("b@example.com", 20)];
        store.write_all(&items).unwrap();

        let first = store.read_all().unwrap();
        assert_eq!(first, items);
        store.write_all(&first).unwrap();
        assert_eq!(store.read_all().unwrap(), first);
        assert!(!dir.path().join("queue.json.tmp").exists());
    }

    #[test]
    fn test_write_all_rejects_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let a = item("a@example.com", 10);
        let mut b = item("b@example.com", 20);
        b.id = a.id.clone();
        let err = store.write_all(&[a, b]).unwrap_err();
        assert!(matches!(err, MailCadenceError::InvalidState(_)));
        assert!(store.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_update_missing_id_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let items = vec![item("a@example.com", 10)];
        store.write_all(&items).unwrap();

        let found = store.update("missing-id", &QueueItemPatch::sent(99)).unwrap();
        assert!(!found);
        assert_eq!(store.read_all().unwrap(), items);
    }

    #[test]
    fn test_update_merges_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let a = item("a@example.com", 10);
        let b = item("b@example.com", 20);
        store.write_all(&[a.clone(), b.clone()]).unwrap();

        assert!(store.update(&b.id, &QueueItemPatch::sent(1234)).unwrap());
        let items = store.read_all().unwrap();
        assert_eq!(items[0], a);
        assert_eq!(items[1].status, QueueStatus::Sent);
        assert_eq!(items[1].sent_at, Some(1234));
        assert_eq!(items[1].send_at, 20);
    }

    #[test]
    fn test_approve_drafts_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut sent = item("c@example.com", 5);
        sent.status = QueueStatus::Sent;
        sent.sent_at = Some(6);
        store
            .write_all(&[item("a@example.com", 10), item("b@example.com", 20), sent])
            .unwrap();

        assert_eq!(store.approve_drafts().unwrap(), 2);
        assert_eq!(store.approve_drafts().unwrap(), 0);
        let statuses: Vec<QueueStatus> = store.read_all().unwrap().iter().map(|i| i.status).collect();
        assert_eq!(statuses, vec![QueueStatus::Queued, QueueStatus::Queued, QueueStatus::Sent]);
    }

    #[test]
    fn test_edit_draft() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let a = item("a@example.com", 10);
        store.write_all(&[a.clone()]).unwrap();

        let edited = store.edit_draft(&a.id, Some("New subject"), None).unwrap();
        assert_eq!(edited.subject, "New subject");
        assert_eq!(edited.body, a.body);
        assert_eq!(store.read_all().unwrap()[0].subject, "New subject");

        assert!(matches!(
            store.edit_draft("nope", Some("x"), None),
            Err(MailCadenceError::NotFound(_))
        ));

        store.approve_drafts().unwrap();
        assert!(matches!(
            store.edit_draft(&a.id, None, Some("late")),
            Err(MailCadenceError::InvalidState(_))
        ));
    }

    #[test]
    fn test_summary_and_earliest() {
        let mut items = vec![item("a@example.com", 300), item("b@example.com", 100), item("c@example.com", 100)];
        for i in &mut items {
            i.status = QueueStatus::Queued;
        }
        items.push(item("d@example.com", 50));
        let summary = QueueSummary::from_items(&items, 150);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.queued, 3);
        assert_eq!(summary.draft, 1);
        assert_eq!(summary.due, 2);
        assert_eq!(summary.next.unwrap().recipient, "b@example.com");
        assert!(earliest_queued(&[]).is_none());
    }

    #[test]
    fn test_open_creates_parent_dirs_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let config = QueueConfig {
            path: dir.path().join("nested/deeper/queue.json").display().to_string(),
            backend: QueueBackendKind::Json,
        };
        let store = QueueStore::open(&config).unwrap();
        store.write_all(&[item("a@example.com", 1)]).unwrap();
        assert_eq!(store.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_writers_never_corrupt_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        let handles: Vec<_> = (0..4)
            .map(|w| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let store = QueueStore::json(&path);
                    for n in 0..25 {
                        let items: Vec<QueueItem> = (0..=(w + n) % 7)
                            .map(|i| item(&format!("w{w}-{i}@example.com"), i as i64))
                            .collect();
                        store.write_all(&items).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        // last writer wins, but the snapshot always parses
        let items = QueueStore::json(&path).read_all().unwrap();
        assert!(!items.is_empty());
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_location_is_not_an_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let store = QueueStore::json(&blocker.join("queue.json"));
        assert!(matches!(
            store.read_all(),
            Err(MailCadenceError::StoreUnavailable(_))
        ));
        assert!(store.approve_drafts().is_err());
    }
}
