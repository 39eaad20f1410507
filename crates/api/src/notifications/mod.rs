//! Real-time push: event bus to WebSocket room forwarding.

mod forwarder;

pub use forwarder::EventForwarder;
