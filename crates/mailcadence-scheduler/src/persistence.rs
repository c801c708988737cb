//! SQLite-backed queue snapshot.
//! Same full-snapshot semantics as the JSON file, replaced inside a single
//! transaction so a crash mid-write leaves the previous snapshot.

use std::path::Path;
use std::sync::Mutex;

use mailcadence_core::error::{MailCadenceError, Result};
use mailcadence_core::types::{QueueItem, QueueStatus};

use crate::store::QueueBackend;

/// SQLite queue backend.
pub struct SqliteBackend {
    conn: Mutex<rusqlite::Connection>,
    label: String,
}

impl SqliteBackend {
    /// Open or create the queue database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                MailCadenceError::StoreUnavailable(format!("create {}: {e}", parent.display()))
            })?;
        }
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| MailCadenceError::StoreUnavailable(format!("DB open: {e}")))?;
        Self::with_connection(conn, path.display().to_string())
    }

    /// In-memory database, for tests and previews.
    pub fn in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| MailCadenceError::StoreUnavailable(format!("DB open: {e}")))?;
        Self::with_connection(conn, ":memory:".into())
    }

    fn with_connection(conn: rusqlite::Connection, label: String) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
            label,
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| MailCadenceError::StoreUnavailable("queue DB lock poisoned".into()))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            -- one row per queue item; position keeps snapshot order
            CREATE TABLE IF NOT EXISTS queue_items (
                position INTEGER PRIMARY KEY,
                id TEXT NOT NULL UNIQUE,
                recipient TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                company TEXT,
                subject TEXT NOT NULL,
                body TEXT NOT NULL,
                send_at INTEGER NOT NULL,
                status TEXT NOT NULL,           -- draft, queued, sent, error, dry-run
                retries INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                sent_at INTEGER,
                last_error TEXT
            );
         ",
            )
            .map_err(|e| MailCadenceError::StoreUnavailable(format!("Migration: {e}")))
    }
}

impl QueueBackend for SqliteBackend {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.label)
    }

    fn load(&self) -> Result<Option<Vec<QueueItem>>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, recipient, name, company, subject, body, send_at, status, retries,
                        created_at, sent_at, last_error
                 FROM queue_items ORDER BY position",
            )
            .map_err(|e| MailCadenceError::StoreUnavailable(format!("Load queue: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    QueueItem {
                        id: row.get(0)?,
                        recipient: row.get(1)?,
                        name: row.get(2)?,
                        company: row.get(3)?,
                        subject: row.get(4)?,
                        body: row.get(5)?,
                        send_at: row.get(6)?,
                        status: QueueStatus::Draft,
                        retries: row.get(8)?,
                        created_at: row.get(9)?,
                        sent_at: row.get(10)?,
                        last_error: row.get(11)?,
                    },
                    row.get::<_, String>(7)?,
                ))
            })
            .map_err(|e| MailCadenceError::StoreUnavailable(format!("Load queue: {e}")))?;

        let mut items = Vec::new();
        for row in rows {
            let (mut item, status) =
                row.map_err(|e| MailCadenceError::StoreCorrupt(format!("queue row: {e}")))?;
            item.status = QueueStatus::parse(&status).ok_or_else(|| {
                MailCadenceError::StoreCorrupt(format!("item {}: unknown status '{status}'", item.id))
            })?;
            items.push(item);
        }
        Ok(Some(items))
    }

    fn save(&self, items: &[QueueItem]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| MailCadenceError::StoreUnavailable(format!("Begin: {e}")))?;
        tx.execute("DELETE FROM queue_items", [])
            .map_err(|e| MailCadenceError::StoreUnavailable(format!("Clear queue: {e}")))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO queue_items
                     (position, id, recipient, name, company, subject, body, send_at, status,
                      retries, created_at, sent_at, last_error)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                )
                .map_err(|e| MailCadenceError::StoreUnavailable(format!("Save queue: {e}")))?;
            for (position, item) in items.iter().enumerate() {
                stmt.execute(rusqlite::params![
                    position as i64,
                    item.id,
                    item.recipient,
                    item.name,
                    item.company,
                    item.subject,
                    item.body,
                    item.send_at,
                    item.status.as_str(),
                    item.retries,
                    item.created_at,
                    item.sent_at,
                    item.last_error,
                ])
                .map_err(|e| MailCadenceError::StoreUnavailable(format!("Save item {}: {e}", item.id)))?;
            }
        }
        tx.commit()
            .map_err(|e| MailCadenceError::StoreUnavailable(format!("Commit: {e}")))?;
        tracing::debug!("💾 Saved {} queue items to {}", items.len(), self.label);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::QueueStore;
    use mailcadence_core::types::QueueItemPatch;

    fn item(recipient: &str, send_at: i64) -> QueueItem {
        QueueItem::draft(recipient, "Ann", Some("Acme"), "Subject", "<p>Body</p>", send_at, 7)
    }

    #[test]
    fn test_open_and_migrate() {
        let dir = tempfile::tempdir().unwrap();
        let db = SqliteBackend::open(&dir.path().join("queue.db")).unwrap();
        assert_eq!(db.load().unwrap(), Some(vec![]));
        // reopening an existing DB keeps the schema
        drop(db);
        assert!(SqliteBackend::open(&dir.path().join("queue.db")).is_ok());
    }

    #[test]
    fn test_snapshot_replaces_rows_in_order() {
        let db = SqliteBackend::in_memory().unwrap();
        let mut items = vec![item("b@example.com", 20), item("a@example.com", 10)];
        items[0].status = QueueStatus::DryRun;
        items[1].last_error = Some("timeout".into());
        db.save(&items).unwrap();
        assert_eq!(db.load().unwrap().unwrap(), items);

        let shorter = vec![items[1].clone()];
        db.save(&shorter).unwrap();
        assert_eq!(db.load().unwrap().unwrap(), shorter);
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let db = SqliteBackend::in_memory().unwrap();
        db.save(&[item("a@example.com", 10)]).unwrap();
        db.conn()
            .unwrap()
            .execute("UPDATE queue_items SET status = 'paused'", [])
            .unwrap();
        assert!(matches!(db.load(), Err(MailCadenceError::StoreCorrupt(_))));
    }

    #[test]
    fn test_store_operations_over_sqlite() {
        let store = QueueStore::new(SqliteBackend::in_memory().unwrap());
        let a = item("a@example.com", 10);
        store.write_all(&[a.clone()]).unwrap();
        assert_eq!(store.approve_drafts().unwrap(), 1);
        assert!(store.update(&a.id, &QueueItemPatch::sent(42)).unwrap());
        let loaded = store.read_all().unwrap();
        assert_eq!(loaded[0].status, QueueStatus::Sent);
        assert_eq!(loaded[0].sent_at, Some(42));
        assert!(!store.update("missing-id", &QueueItemPatch::sent(1)).unwrap());
    }
}
