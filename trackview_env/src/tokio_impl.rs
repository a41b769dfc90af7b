//! Channel-backed [`TelemetryFeed`] on tokio.

use crate::error::EnvError;
use crate::feed::TelemetryFeed;
use crate::types::TelemetryMessage;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

/// A telemetry feed backed by a pair of bounded tokio channels.
///
/// The feed side is handed to the tracking agent; the [`FeedHandle`] side
/// plays the host, injecting telemetry and collecting commands.
pub struct ChannelFeed {
    inbound: Mutex<mpsc::Receiver<TelemetryMessage>>,
    outbound: mpsc::Sender<TelemetryMessage>,
}

/// The host end of a [`ChannelFeed`].
///
/// Dropping the handle closes the feed.
pub struct FeedHandle {
    inbound: mpsc::Sender<TelemetryMessage>,
    outbound: mpsc::Receiver<TelemetryMessage>,
}

impl ChannelFeed {
    /// Creates a connected feed/handle pair with the given buffer capacity.
    pub fn pair(capacity: usize) -> (Self, FeedHandle) {
        let capacity = capacity.max(1);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        (
            Self {
                inbound: Mutex::new(in_rx),
                outbound: out_tx,
            },
            FeedHandle {
                inbound: in_tx,
                outbound: out_rx,
            },
        )
    }
}

#[async_trait]
impl TelemetryFeed for ChannelFeed {
    async fn recv(&self) -> Option<TelemetryMessage> {
        self.inbound.lock().await.recv().await
    }

    async fn publish(&self, message: TelemetryMessage) -> Result<(), EnvError> {
        self.outbound.send(message).await.map_err(|e| {
            tracing::debug!("command for {} dropped, feed closed", e.0.topic);
            EnvError::FeedClosed
        })
    }
}

impl FeedHandle {
    /// Injects a message as if the host had published it.
    pub async fn inject(&self, message: TelemetryMessage) -> Result<(), EnvError> {
        self.inbound
            .send(message)
            .await
            .map_err(|e| EnvError::send(e.to_string()))
    }

    /// Waits for the next command published by the agent.
    pub async fn next_command(&mut self) -> Option<TelemetryMessage> {
        self.outbound.recv().await
    }

    /// Returns a published command if one is already waiting.
    pub fn try_next_command(&mut self) -> Option<TelemetryMessage> {
        self.outbound.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_feed_delivers_in_order() {
        let (feed, handle) = ChannelFeed::pair(8);
        handle.inject(TelemetryMessage::new("a", "1")).await.unwrap();
        handle.inject(TelemetryMessage::new("b", "2")).await.unwrap();

        assert_eq!(feed.recv().await.unwrap().topic, "a");
        assert_eq!(feed.recv().await.unwrap().topic, "b");
    }

    #[tokio::test]
    async fn test_channel_feed_closes_with_handle() {
        let (feed, handle) = ChannelFeed::pair(1);
        drop(handle);
        assert!(feed.recv().await.is_none());
        assert_eq!(
            feed.publish(TelemetryMessage::new("x", "{}")).await,
            Err(EnvError::FeedClosed)
        );
    }

    #[tokio::test]
    async fn test_channel_feed_publishes_commands() {
        let (feed, mut handle) = ChannelFeed::pair(4);
        assert!(handle.try_next_command().is_none());

        feed.publish(TelemetryMessage::new("Anki/Car/Skull/I", r#"{"lane":10}"#))
            .await
            .unwrap();
        let cmd = handle.next_command().await.unwrap();
        assert_eq!(cmd.topic, "Anki/Car/Skull/I");
    }
}
