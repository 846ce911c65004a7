use crate::connection::{ChannelId, ChannelRegistry, ConnectionId, DeliveryResult};
use axum::response::sse::Event;
use log::*;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// High-level facade over the channel registry.
///
/// Cloning is cheap; all clones share the same registry.
#[derive(Clone)]
pub struct Manager {
    registry: Arc<ChannelRegistry>,
}

impl Manager {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ChannelRegistry::new()),
        }
    }

    /// Register a subscriber for a channel and return a guard that
    /// unregisters it when dropped.
    ///
    /// The guard is meant to be moved into the response stream, so cleanup
    /// fires on both graceful and abrupt disconnect, and also when the
    /// subscriber is replaced and its orphaned stream completes. Cleanup is
    /// identity-checked, so a guard dropped after replacement is a no-op.
    pub fn subscribe(
        &self,
        channel_id: ChannelId,
        sender: UnboundedSender<Result<Event, Infallible>>,
    ) -> SubscriberGuard {
        let connection_id = self.registry.register(channel_id.clone(), sender);
        info!("Registered SSE subscriber on channel {channel_id}");

        SubscriberGuard {
            manager: self.clone(),
            channel_id,
            connection_id,
        }
    }

    /// Serialize a payload and deliver it to the channel's subscriber.
    pub fn deliver<T: Serialize>(&self, channel_id: &str, payload: &T) -> DeliveryResult {
        let event_data = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize SSE event: {e}");
                return DeliveryResult::Failed;
            }
        };

        self.registry
            .deliver(channel_id, Event::default().data(event_data))
    }

    fn unsubscribe(&self, channel_id: &str, connection_id: &ConnectionId) {
        info!("Unregistering SSE subscriber on channel {channel_id}");
        self.registry.unregister(channel_id, connection_id);
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

/// Unregisters its subscription exactly once, when dropped.
pub struct SubscriberGuard {
    manager: Manager,
    channel_id: ChannelId,
    connection_id: ConnectionId,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.manager
            .unsubscribe(&self.channel_id, &self.connection_id);
    }
}
