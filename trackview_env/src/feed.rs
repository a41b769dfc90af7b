//! Transport abstraction for telemetry delivery.

use crate::error::EnvError;
use crate::types::TelemetryMessage;
use async_trait::async_trait;

/// Abstraction over the publish/subscribe transport that carries telemetry.
///
/// # Implementations
///
/// - **Production**: wraps the broker client subscribed to the vehicle topics
/// - **Tests / simulation**: [`crate::ChannelFeed`], backed by tokio channels
///
/// # Message Flow
///
/// ```text
/// Vehicle host              Transport                TrackingAgent
///   |                           |                          |
///   |-- publish(telemetry) ---->|                          |
///   |                           |-- recv() --------------->|
///   |                           |<-- publish(command) -----|
///   |<-- command ---------------|                          |
/// ```
#[async_trait]
pub trait TelemetryFeed: Send + Sync + 'static {
    /// Receives the next inbound message.
    ///
    /// # Returns
    /// * `Some(message)` - A message was received
    /// * `None` - The feed was closed (shutdown)
    async fn recv(&self) -> Option<TelemetryMessage>;

    /// Publishes an outbound message (vehicle commands).
    ///
    /// # Returns
    /// * `Ok(())` - Message queued for delivery
    /// * `Err(EnvError::FeedClosed)` - Nobody is listening anymore
    async fn publish(&self, message: TelemetryMessage) -> Result<(), EnvError>;
}
