use reunite_types::events::{ChannelId, GatewayEvent};

/// Outbound seam to the real-time transport. Implemented by the gateway
/// dispatcher in-process and by any external pub/sub broker adapter.
///
/// Publishing is fire-and-forget: callers log a failed publish and move on.
/// The persisted row, not the push, is the durability guarantee.
pub trait Publisher: Send + Sync {
    fn publish(&self, channel: &ChannelId, event: &GatewayEvent) -> anyhow::Result<()>;
}

/// Publisher that drops everything. Useful for maintenance entry points and
/// tests that do not care about push.
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    fn publish(&self, _channel: &ChannelId, _event: &GatewayEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
