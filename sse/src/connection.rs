use axum::response::sse::Event;
use dashmap::DashMap;
use log::*;
use std::convert::Infallible;
use tokio::sync::mpsc::UnboundedSender;

// Type alias for channel ids (opaque, client-supplied path segment)
pub type ChannelId = String;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered,
    /// No live subscriber for the channel. Expected, not an error.
    NoSubscriber,
    /// The stored sink rejected the write (connection already closed).
    Failed,
}

/// The live subscriber for one channel.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub connection_id: ConnectionId,
    pub sender: UnboundedSender<Result<Event, Infallible>>,
}

/// Channel registry holding at most one live subscriber per channel id.
pub struct ChannelRegistry {
    /// channel_id -> current subscription; last register wins - O(1)
    channels: DashMap<ChannelId, Subscription>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Register a subscriber for a channel, replacing any existing entry - O(1).
    ///
    /// Replacement drops the previous sender, so the orphaned response stream
    /// observes channel closure and completes.
    pub fn register(
        &self,
        channel_id: ChannelId,
        sender: UnboundedSender<Result<Event, Infallible>>,
    ) -> ConnectionId {
        let connection_id = ConnectionId::new();

        if let Some(previous) = self.channels.insert(
            channel_id.clone(),
            Subscription {
                connection_id: connection_id.clone(),
                sender,
            },
        ) {
            debug!(
                "Replaced subscriber {} on channel {channel_id}",
                previous.connection_id.as_str()
            );
        }

        connection_id
    }

    /// Unregister a connection - O(1).
    ///
    /// Removes the entry only if the stored connection id still matches, so a
    /// stale disconnect never evicts a newer subscriber on the same channel.
    pub fn unregister(&self, channel_id: &str, connection_id: &ConnectionId) {
        self.channels.remove_if(channel_id, |_, subscription| {
            subscription.connection_id == *connection_id
        });
    }

    /// Deliver an event to the channel's subscriber, if any - O(1).
    pub fn deliver(&self, channel_id: &str, event: Event) -> DeliveryResult {
        match self.channels.get(channel_id) {
            Some(subscription) => {
                if let Err(e) = subscription.sender.send(Ok(event)) {
                    warn!(
                        "Failed to send event to connection {} on channel {channel_id}: {e}. \
                         Connection will be cleaned up.",
                        subscription.connection_id.as_str()
                    );
                    DeliveryResult::Failed
                } else {
                    DeliveryResult::Delivered
                }
            }
            None => DeliveryResult::NoSubscriber,
        }
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_event() -> Event {
        Event::default().data(r#"{"value":1}"#)
    }

    #[test]
    fn deliver_to_unregistered_channel_returns_no_subscriber() {
        let registry = ChannelRegistry::new();

        assert_eq!(
            registry.deliver("missing", test_event()),
            DeliveryResult::NoSubscriber
        );
    }

    #[test]
    fn second_register_replaces_prior_subscriber() {
        let registry = ChannelRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        registry.register("1".to_string(), tx1);
        registry.register("1".to_string(), tx2);

        assert_eq!(
            registry.deliver("1", test_event()),
            DeliveryResult::Delivered
        );

        // Only the second sink is reachable; the first sender was dropped on
        // replacement, so its receiver observes disconnection.
        assert!(rx2.try_recv().is_ok());
        assert!(matches!(
            rx1.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn unregister_removes_current_subscriber() {
        let registry = ChannelRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let connection_id = registry.register("1".to_string(), tx);
        registry.unregister("1", &connection_id);

        assert_eq!(
            registry.deliver("1", test_event()),
            DeliveryResult::NoSubscriber
        );
    }

    #[test]
    fn stale_unregister_does_not_evict_newer_subscriber() {
        let registry = ChannelRegistry::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        let stale_id = registry.register("1".to_string(), tx1);
        registry.register("1".to_string(), tx2);

        // The replaced connection disconnects late; its cleanup must not
        // remove the subscriber that replaced it.
        registry.unregister("1", &stale_id);

        assert_eq!(
            registry.deliver("1", test_event()),
            DeliveryResult::Delivered
        );
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn deliver_to_closed_sink_fails_soft() {
        let registry = ChannelRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();

        registry.register("1".to_string(), tx);
        drop(rx);

        assert_eq!(registry.deliver("1", test_event()), DeliveryResult::Failed);
    }
}
