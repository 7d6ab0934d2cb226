//! `archive-tasks` (C7) — the task runtime, plus the periodic ticker used
//! for scheduled plugin syncs (C6).
//!
//! # Overview
//!
//! Two distinct concerns share this crate because they share a shape
//! (durable background work with retry) but not a queueing model:
//!
//! - [`queue`] — the at-least-once task queue described in spec §4.7: two
//!   named queues (`default`, `heavy`) with bounded worker concurrency,
//!   exponential backoff on transient failures, and dead-letter logging on
//!   exhaustion.
//! - [`engine::SchedulerEngine`] — a SQLite-persisted cron-like ticker used
//!   to fire `ScheduledSync()` on enabled plugins (spec §4.6 step 4). Jobs
//!   are persisted to a `jobs` table; the engine polls every second and
//!   executes any job whose `next_run` has arrived.
//!
//! ## Schedule variants
//!
//! | Variant    | Behaviour                                          |
//! |------------|----------------------------------------------------|
//! | `Once`     | Single fire at an absolute UTC instant             |
//! | `Interval` | Repeat every N seconds                             |
//! | `Daily`    | Fire at HH:MM UTC every day                        |
//! | `Weekly`   | Fire at HH:MM UTC on a specific weekday            |
//! | `Cron`     | Cron expression (parsing planned for a future phase) |

pub mod db;
pub mod engine;
pub mod error;
pub mod queue;
pub mod schedule;
pub mod types;

pub use engine::{SchedulerEngine, SchedulerHandle};
pub use error::{Result, SchedulerError};
pub use queue::{QueueName, TaskEnvelope, TaskError, TaskOutcome, TaskQueue, TaskStatus};
pub use types::{Job, JobStatus, Schedule};
