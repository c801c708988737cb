//! # MailCadence Scheduler
//!
//! Quota-aware slot scheduling, the durable queue, and the dispatch worker.
//!
//! ## Architecture
//! ```text
//! enqueue_batch
//!   ├── schedule(count, params, now) → send times (Mon–Thu, N per day)
//!   ├── Composer → subject + HTML body per recipient
//!   └── QueueStore::write_all → items in `draft`
//!
//! approve_drafts: draft → queued
//!
//! DispatchWorker (tokio, one delivery in flight)
//!   ├── poll: queued && sendAt <= now, snapshot order
//!   ├── Transport::send → sent | dry-run | queued (retry) | error
//!   ├── jitter 30–50s after every attempt
//!   └── idle 30s when nothing is due
//!
//! QueueStore (full-snapshot read/write)
//!   ├── JsonFileBackend (queue.json, atomic rename)
//!   └── SqliteBackend (single transaction)
//! ```

pub mod enqueue;
pub mod persistence;
pub mod slots;
pub mod store;
pub mod worker;

pub use enqueue::{EnqueueReport, enqueue_batch};
pub use slots::{ScheduleParams, schedule};
pub use store::{QueueStore, QueueSummary};
pub use worker::{DispatchWorker, PassReport, WorkerSettings, spawn_worker};
