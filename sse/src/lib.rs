//! Server-Sent Events (SSE) infrastructure for live counter updates.
//!
//! This crate holds the subscriber side of the dual-mode broadcast design:
//! connections the server itself keeps open. Delegated connections (held by
//! the fan-out provider) never appear here.
//!
//! # Architecture
//!
//! - **Single subscriber per channel**: Each channel id maps to at most one
//!   live connection. A second subscribe on the same channel replaces the
//!   prior one; replacement drops the old sender, which ends the orphaned
//!   response stream instead of leaking it.
//! - **Identity-checked cleanup**: Unregister removes an entry only if the
//!   stored connection id still matches, so a disconnecting connection never
//!   evicts the newer subscriber that replaced it.
//! - **Best-effort delivery**: A delivery to a channel with no subscriber is
//!   dropped, not queued. Send failures are logged and swallowed.
//!
//! # Modules
//!
//! - `connection`: ChannelRegistry with entry-atomic register/deliver/unregister
//! - `manager`: High-level delivery facade plus the drop-guard that unregisters
//!   a subscriber when its response stream is dropped

pub mod connection;
pub mod manager;

pub use connection::{ChannelRegistry, ConnectionId, DeliveryResult};
pub use manager::{Manager, SubscriberGuard};
