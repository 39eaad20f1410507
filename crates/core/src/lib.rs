//! `soledex-core` -- shared types, error taxonomy, and pure pipeline logic.
//!
//! This crate holds everything the other workspace members agree on:
//! database id/timestamp aliases, the [`CoreError`](error::CoreError)
//! taxonomy, the asset status state machine, and the queue's retry/backoff
//! math. It has no I/O and no internal dependencies.

pub mod error;
pub mod retry;
pub mod status;
pub mod types;
