//! Consumer-side library for the Soledex platform.
//!
//! Used by the desktop and mobile shells. Three layers:
//!
//! - [`session`] / [`http`] -- a resilient API client that attaches the
//!   current access token to every call, detects session expiry, and
//!   serializes refresh through a single-flight gate.
//! - [`sync`] -- a state synchronizer that applies push events to the
//!   local asset cache idempotently and raises classified notifications.
//! - [`subscribe`] -- the live WebSocket feed driving [`sync`].
//!
//! Raw transport errors never reach the UI: [`messages`] maps HTTP
//! status codes to stable user-facing text plus a recoverability flag.

pub mod http;
pub mod messages;
pub mod session;
pub mod subscribe;
pub mod sync;

pub use http::{ApiClient, ClientError};
pub use session::{Session, SessionStore};
pub use sync::{AssetCache, CachedAsset, NotificationKind, StateSynchronizer, UserNotification};
