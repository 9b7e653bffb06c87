use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::trace;

use reunite_core::Publisher;
use reunite_types::events::{ChannelId, GatewayEvent};

/// Events are serialized once at publish time and fanned out as text frames.
const CHANNEL_CAPACITY: usize = 256;

/// In-process pub/sub registry: one broadcast channel per logical channel
/// name (user channel, the staff broadcast channel, room channels).
/// Subscribing and unsubscribing never block publishers on other channels,
/// and a publish to a channel with no subscribers is a no-op; the persisted
/// row, not the push, is the durable record.
///
/// The same `ChannelId` names work as keys for an external broker; this
/// registry is the single-process implementation of that abstraction.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to a logical channel, creating it on first use.
    pub fn subscribe(&self, channel: &ChannelId) -> broadcast::Receiver<String> {
        self.sender(&channel.name()).subscribe()
    }

    /// Send pre-serialized text to every current subscriber of a channel.
    /// Returns how many subscribers there were.
    pub fn publish_text(&self, channel: &ChannelId, text: String) -> usize {
        let name = channel.name();
        let sender = {
            let channels = self.inner.channels.read().expect("channel map poisoned");
            channels.get(&name).cloned()
        };
        let Some(sender) = sender else {
            trace!("publish to {name} with no channel");
            return 0;
        };
        match sender.send(text) {
            Ok(n) => n,
            Err(_) => {
                // Last receiver is gone; drop the idle channel entry.
                let mut channels = self.inner.channels.write().expect("channel map poisoned");
                if channels
                    .get(&name)
                    .map(|s| s.receiver_count() == 0)
                    .unwrap_or(false)
                {
                    channels.remove(&name);
                }
                0
            }
        }
    }

    fn sender(&self, name: &str) -> broadcast::Sender<String> {
        if let Some(sender) = self
            .inner
            .channels
            .read()
            .expect("channel map poisoned")
            .get(name)
        {
            return sender.clone();
        }
        let mut channels = self.inner.channels.write().expect("channel map poisoned");
        channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for Dispatcher {
    fn publish(&self, channel: &ChannelId, event: &GatewayEvent) -> anyhow::Result<()> {
        let text = serde_json::to_string(event)?;
        let delivered = self.publish_text(channel, text);
        trace!("published to {} ({} subscribers)", channel.name(), delivered);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let dispatcher = Dispatcher::new();
        let channel = ChannelId::User(Uuid::new_v4());
        let mut rx = dispatcher.subscribe(&channel);

        let event = GatewayEvent::Error {
            message: "ping".into(),
        };
        dispatcher.publish(&channel, &event).unwrap();

        let text = rx.recv().await.unwrap();
        assert!(text.contains("\"error\""));
        assert!(text.contains("ping"));
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let dispatcher = Dispatcher::new();
        let a = ChannelId::Room(Uuid::new_v4());
        let b = ChannelId::Room(Uuid::new_v4());
        let mut rx_a = dispatcher.subscribe(&a);
        let mut rx_b = dispatcher.subscribe(&b);

        dispatcher.publish_text(&a, "only-a".into());
        assert_eq!(rx_a.recv().await.unwrap(), "only-a");
        assert!(matches!(
            rx_b.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let dispatcher = Dispatcher::new();
        let channel = ChannelId::Staff;
        assert_eq!(dispatcher.publish_text(&channel, "into the void".into()), 0);

        // Dropping the last receiver prunes the channel on the next publish.
        let rx = dispatcher.subscribe(&channel);
        drop(rx);
        assert_eq!(dispatcher.publish_text(&channel, "gone".into()), 0);
        assert!(
            dispatcher
                .inner
                .channels
                .read()
                .unwrap()
                .get(&channel.name())
                .is_none()
        );
    }

    #[tokio::test]
    async fn staff_channel_is_shared() {
        let dispatcher = Dispatcher::new();
        let mut rx1 = dispatcher.subscribe(&ChannelId::Staff);
        let mut rx2 = dispatcher.subscribe(&ChannelId::Staff);

        assert_eq!(dispatcher.publish_text(&ChannelId::Staff, "broadcast".into()), 2);
        assert_eq!(rx1.recv().await.unwrap(), "broadcast");
        assert_eq!(rx2.recv().await.unwrap(), "broadcast");
    }
}
