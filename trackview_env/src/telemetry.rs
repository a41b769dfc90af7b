//! Typed telemetry events and outbound vehicle commands.
//!
//! The host publishes one topic per vehicle and channel:
//!
//! ```text
//! Anki/Car/<vehicle>/E/track_piece_id        {"value": 17}
//! Anki/Car/<vehicle>/E/track_location_id     {"value": 23}
//! Anki/Car/<vehicle>/E/speed                 {"value": 600}
//! Anki/Car/<vehicle>/E/Messages/ANKI_VEHICLE_MSG_V2C_LOCALIZATION_TRANSITION_UPDATE
//!                                            {"offset": -23.5}
//! Anki/Host/host/S/Cars                      ["Skull", "Thermo"]
//! ```
//!
//! Commands go the other way on `Anki/Car/<vehicle>/I`.

use crate::error::EnvError;
use crate::types::{LocationId, PieceId, TelemetryMessage, VehicleId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix of every per-vehicle topic.
pub const CAR_TOPIC_PREFIX: &str = "Anki/Car/";

/// Topic on which the host announces connected vehicles.
pub const ROSTER_TOPIC: &str = "Anki/Host/host/S/Cars";

const PIECE_CHANNEL: &str = "track_piece_id";
const LOCATION_CHANNEL: &str = "track_location_id";
const SPEED_CHANNEL: &str = "speed";
const TRANSITION_CHANNEL: &str = "ANKI_VEHICLE_MSG_V2C_LOCALIZATION_TRANSITION_UPDATE";

// ============================================================================
// EVENTS (Input)
// ============================================================================

/// A single telemetry observation for one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    /// The vehicle read a new piece id
    PieceChanged { vehicle: VehicleId, piece: PieceId },

    /// The vehicle read a sub-location id on its current piece
    SubLocationChanged { vehicle: VehicleId, location: LocationId },

    /// The vehicle reported its speed (units per second)
    SpeedChanged { vehicle: VehicleId, speed: u32 },

    /// The vehicle crossed a piece boundary; triggers a resolve cycle
    TransitionTick { vehicle: VehicleId, lateral_offset: f64 },
}

impl TelemetryEvent {
    /// Returns the vehicle this event belongs to.
    pub fn vehicle(&self) -> &VehicleId {
        match self {
            Self::PieceChanged { vehicle, .. }
            | Self::SubLocationChanged { vehicle, .. }
            | Self::SpeedChanged { vehicle, .. }
            | Self::TransitionTick { vehicle, .. } => vehicle,
        }
    }

    /// Encodes the event as the host would publish it.
    pub fn to_message(&self) -> TelemetryMessage {
        let base = format!("{}{}/E/", CAR_TOPIC_PREFIX, self.vehicle());
        match self {
            Self::PieceChanged { piece, .. } => TelemetryMessage::new(
                format!("{base}{PIECE_CHANNEL}"),
                serde_json::json!({ "value": piece.get() }).to_string(),
            ),
            Self::SubLocationChanged { location, .. } => TelemetryMessage::new(
                format!("{base}{LOCATION_CHANNEL}"),
                serde_json::json!({ "value": location.0 }).to_string(),
            ),
            Self::SpeedChanged { speed, .. } => TelemetryMessage::new(
                format!("{base}{SPEED_CHANNEL}"),
                serde_json::json!({ "value": speed }).to_string(),
            ),
            Self::TransitionTick { lateral_offset, .. } => TelemetryMessage::new(
                format!("{base}Messages/{TRANSITION_CHANNEL}"),
                serde_json::json!({ "offset": lateral_offset }).to_string(),
            ),
        }
    }
}

/// Everything the engine can receive from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A per-vehicle telemetry event
    Telemetry(TelemetryEvent),

    /// The host's list of connected vehicles
    Roster(Vec<VehicleId>),

    /// A retained roster replay or other message that is safe to skip
    Ignored,
}

/// Decodes a raw transport message.
///
/// Returns an error for unknown topics and malformed payloads; callers are
/// expected to drop those messages and keep going.
pub fn decode(message: &TelemetryMessage) -> Result<Inbound, EnvError> {
    let topic = message.topic.as_str();

    if topic == ROSTER_TOPIC {
        if message.retained {
            return Ok(Inbound::Ignored);
        }
        let names: Vec<String> = serde_json::from_str(&message.payload)
            .map_err(|e| EnvError::malformed(topic, e))?;
        return Ok(Inbound::Roster(names.into_iter().map(VehicleId::new).collect()));
    }

    let rest = topic
        .strip_prefix(CAR_TOPIC_PREFIX)
        .ok_or_else(|| EnvError::unknown_topic(topic))?;
    let vehicle = match rest.split('/').next() {
        Some(name) if !name.is_empty() => VehicleId::new(name),
        _ => return Err(EnvError::unknown_topic(topic)),
    };
    let channel = topic.rsplit('/').next().unwrap_or_default();

    let payload: Value =
        serde_json::from_str(&message.payload).map_err(|e| EnvError::malformed(topic, e))?;

    let event = match channel {
        PIECE_CHANNEL => {
            let raw = required_value(&payload, topic)?;
            let piece = PieceId::from_i64(raw)
                .ok_or_else(|| EnvError::malformed(topic, format!("piece id {raw} out of range")))?;
            TelemetryEvent::PieceChanged { vehicle, piece }
        }
        LOCATION_CHANNEL => {
            let raw = required_value(&payload, topic)?;
            let location = u32::try_from(raw).map_err(|_| {
                EnvError::malformed(topic, format!("location id {raw} out of range"))
            })?;
            TelemetryEvent::SubLocationChanged { vehicle, location: LocationId(location) }
        }
        SPEED_CHANNEL => {
            let raw = required_value(&payload, topic)?;
            let speed = u32::try_from(raw)
                .map_err(|_| EnvError::malformed(topic, format!("speed {raw} out of range")))?;
            TelemetryEvent::SpeedChanged { vehicle, speed }
        }
        TRANSITION_CHANNEL => {
            let offset = float_field(&payload, "offset")
                .ok_or_else(|| EnvError::malformed(topic, "missing offset"))?;
            TelemetryEvent::TransitionTick { vehicle, lateral_offset: offset }
        }
        _ => return Err(EnvError::unknown_topic(topic)),
    };

    Ok(Inbound::Telemetry(event))
}

/// The integer `value` field every scalar channel carries.
fn required_value(payload: &Value, topic: &str) -> Result<i64, EnvError> {
    integer_field(payload, "value")
        .ok_or_else(|| EnvError::malformed(topic, "missing integer value"))
}

/// Reads an integer the way the host produces them: plain numbers, floats
/// (truncated) or numeric strings.
fn integer_field(payload: &Value, key: &str) -> Option<i64> {
    match payload.get(key)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float_field(payload: &Value, key: &str) -> Option<f64> {
    let value = match payload.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    value.filter(|f| f.is_finite())
}

// ============================================================================
// COMMANDS (Output)
// ============================================================================

/// A command sent to a physical vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VehicleCommand {
    /// Change speed with the given acceleration
    SetSpeed { speed: u32, acceleration: u32 },

    /// Move to the given lateral offset
    ChangeLane { offset: f64 },
}

impl VehicleCommand {
    /// Encodes the command for the given vehicle.
    pub fn to_message(&self, vehicle: &VehicleId) -> TelemetryMessage {
        let topic = format!("{}{}/I", CAR_TOPIC_PREFIX, vehicle);
        let payload = match self {
            Self::SetSpeed { speed, acceleration } => {
                serde_json::json!({ "speed": speed, "acceleration": acceleration })
            }
            Self::ChangeLane { offset } => serde_json::json!({ "lane": offset }),
        };
        TelemetryMessage::new(topic, payload.to_string())
    }
}
