//! Common identifiers and the raw transport envelope.

use serde::{Deserialize, Serialize};

/// Name of a physical vehicle as announced by the host (e.g. `"Skull"`).
///
/// Vehicles are keyed by name everywhere; the name is taken verbatim from
/// the telemetry topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub String);

impl VehicleId {
    /// Creates a vehicle id from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the vehicle name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VehicleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VehicleId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identity of a placed track piece.
///
/// Piece ids are encoded in seven bits on the physical track, so only
/// `1..=127` are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PieceId(u8);

impl PieceId {
    /// Smallest valid piece id.
    pub const MIN: u8 = 1;

    /// Largest valid piece id (7-bit encoding).
    pub const MAX: u8 = 127;

    /// Creates a piece id, rejecting values outside `1..=127`.
    pub fn new(raw: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&raw).then_some(Self(raw))
    }

    /// Creates a piece id from a wider integer (as decoded from JSON).
    pub fn from_i64(raw: i64) -> Option<Self> {
        u8::try_from(raw).ok().and_then(Self::new)
    }

    /// Returns the raw numeric id.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for PieceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A raw sub-location id reported by a vehicle's track reader.
///
/// Which lane a location id belongs to is a property of the drawn geometry
/// and is answered by the lane atlas, not by this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationId(pub u32);

impl std::fmt::Display for LocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Envelope for a message delivered by (or handed to) the transport.
///
/// The payload is kept as text; decoding into typed events happens in
/// [`crate::telemetry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    /// Publish/subscribe topic the message was delivered on
    pub topic: String,

    /// JSON payload
    pub payload: String,

    /// Whether the broker replayed this as a retained message
    pub retained: bool,
}

impl TelemetryMessage {
    /// Creates a live (non-retained) message.
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retained: false,
        }
    }

    /// Marks the message as retained.
    pub fn retained(mut self) -> Self {
        self.retained = true;
        self
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_id_bounds() {
        assert!(PieceId::new(0).is_none());
        assert_eq!(PieceId::new(1).map(PieceId::get), Some(1));
        assert_eq!(PieceId::new(127).map(PieceId::get), Some(127));
        assert!(PieceId::new(128).is_none());
        assert!(PieceId::from_i64(-3).is_none());
        assert!(PieceId::from_i64(1_000).is_none());
    }

    #[test]
    fn test_vehicle_id_display() {
        let id = VehicleId::from("Skull");
        assert_eq!(id.to_string(), "Skull");
        assert_eq!(id.as_str(), "Skull");
    }

    #[test]
    fn test_message_retained_flag() {
        let msg = TelemetryMessage::new("Anki/Host/host/S/Cars", "[]");
        assert!(!msg.retained);
        assert!(msg.retained().retained);
    }
}
