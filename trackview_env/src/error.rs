//! Error types for the telemetry boundary.

use thiserror::Error;

/// Errors raised while decoding, encoding or moving telemetry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    /// Topic does not belong to any known channel
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// Payload could not be parsed or holds an out-of-range value
    #[error("Malformed payload on {topic}: {reason}")]
    MalformedPayload { topic: String, reason: String },

    /// Sending into the feed failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The feed was closed by the other side
    #[error("Telemetry feed closed")]
    FeedClosed,
}

impl EnvError {
    /// Creates a malformed-payload error.
    pub fn malformed(topic: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::MalformedPayload {
            topic: topic.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an unknown-topic error.
    pub fn unknown_topic(topic: impl Into<String>) -> Self {
        Self::UnknownTopic(topic.into())
    }

    /// Creates a send error.
    pub fn send(msg: impl Into<String>) -> Self {
        Self::SendFailed(msg.into())
    }
}
