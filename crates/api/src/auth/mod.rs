//! Token validation for HTTP requests and WebSocket handshakes.

pub mod jwt;
