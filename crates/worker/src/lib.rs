//! Analysis worker pool.
//!
//! Pulls jobs from the durable queue, revalidates asset state, calls the
//! analysis service, persists results, and emits completion events. The
//! pool has a fixed width and shuts down via `CancellationToken`; a
//! companion reclaimer task redispatches stalled jobs.
//!
//! The worker owns no retry loop: failed attempts are handed back to the
//! queue with a disposition computed by `soledex_core::retry`.

pub mod pool;
pub mod processor;
pub mod reclaim;
pub mod store;

pub use pool::WorkerPool;
pub use processor::{process_job, ProcessOutcome, SkipReason, WorkerContext};
pub use reclaim::StalledJobReclaimer;
pub use store::{AssetSnapshot, AssetStore, JobStore, PgAssetStore, PgJobStore, StoreError};
