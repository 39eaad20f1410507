//! Soledex real-time event infrastructure.
//!
//! - [`EventBus`] -- in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`AssetEvent`] -- the push-event envelope multicast to an owner's
//!   room when analysis finishes.
//!
//! Delivery is fire-and-forget by design: events are never persisted,
//! never acknowledged, and silently dropped for owners with zero live
//! connections.

pub mod bus;

pub use bus::{AssetEvent, EventBus};
