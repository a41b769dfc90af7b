//! Per-vehicle tracking record.
//!
//! One [`VehicleState`] exists per vehicle name, owned by the
//! `TrackingEngine`. It accumulates raw telemetry between transition ticks
//! and holds the last resolved [`Position`] once the vehicle is located.

use crate::track_topology::Direction;
use serde::{Deserialize, Serialize};
use trackview_env::{LocationId, PieceId, TelemetryEvent, VehicleId};

// ============================================================================
// LOCATOR WINDOW
// ============================================================================

/// How the last two sub-location readings moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    /// Ids grew: the vehicle travels along the canonical direction
    Increasing,
    /// Ids shrank: the vehicle travels against the canonical direction
    Decreasing,
    /// Same id twice (or a single reading)
    Steady,
}

/// Rolling buffer of the two most recent sub-location readings since the
/// last transition tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorWindow {
    previous: Option<LocationId>,
    latest: Option<LocationId>,
}

impl LocatorWindow {
    /// Shifts the window by one reading.
    pub fn push(&mut self, location: LocationId) {
        if self.latest.is_some() {
            self.previous = self.latest;
        }
        self.latest = Some(location);
    }

    /// Most recent reading, if any arrived since the last tick.
    pub fn latest(&self) -> Option<LocationId> {
        self.latest
    }

    pub fn previous(&self) -> Option<LocationId> {
        self.previous
    }

    /// Direction of motion implied by the window.
    ///
    /// `None` when no reading arrived; a single reading counts as steady.
    pub fn trend(&self) -> Option<Trend> {
        let latest = self.latest?;
        let trend = match self.previous {
            Some(previous) if previous > latest => Trend::Decreasing,
            Some(previous) if previous < latest => Trend::Increasing,
            _ => Trend::Steady,
        };
        Some(trend)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// POSITION
// ============================================================================

/// A resolved position on the current layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Piece the vehicle is on
    pub piece: PieceId,

    /// Piece it came from, when known
    pub previous: Option<PieceId>,

    /// Side of `piece` through which it entered, when known
    pub arrival: Option<Direction>,

    /// Lane being animated on `piece`
    pub lane: u32,

    /// Lane normalized back into the entry arm's numbering, handed to the
    /// next cycle as its incoming lane
    pub carried_lane: u32,

    /// Incoming lane of the cycle that produced this position; decides the
    /// branch when leaving a junction
    pub lane_before_junction: Option<u32>,
}

/// Tracking phase of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// No resolved piece yet (or reset by a layout change)
    Unlocated,
    /// Has a resolved piece on the current layout
    Located,
}

// ============================================================================
// VEHICLE STATE
// ============================================================================

/// Everything the engine knows about one vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleState {
    pub id: VehicleId,

    /// Last piece id reported by telemetry (or inferred by correction)
    pub reported_piece: Option<PieceId>,

    /// Sub-location readings since the last tick
    pub locator: LocatorWindow,

    /// Last reported speed; `None` until the vehicle reports one
    pub speed: Option<u32>,

    /// Last lateral offset from a transition tick
    pub lateral_offset: f64,

    /// Last sub-location seen, kept across ticks for display
    pub last_location: Option<LocationId>,

    position: Option<Position>,
}

impl VehicleState {
    /// Creates an unlocated record.
    pub fn new(id: VehicleId) -> Self {
        Self {
            id,
            reported_piece: None,
            locator: LocatorWindow::default(),
            speed: None,
            lateral_offset: 0.0,
            last_location: None,
            position: None,
        }
    }

    /// Folds a non-tick event into the record.
    ///
    /// Returns `true` if the event was a [`TelemetryEvent::TransitionTick`]
    /// (whose offset is stored here) and a resolve cycle should follow.
    pub fn observe(&mut self, event: &TelemetryEvent) -> bool {
        match event {
            TelemetryEvent::PieceChanged { piece, .. } => {
                self.reported_piece = Some(*piece);
                false
            }
            TelemetryEvent::SubLocationChanged { location, .. } => {
                self.locator.push(*location);
                self.last_location = Some(*location);
                false
            }
            TelemetryEvent::SpeedChanged { speed, .. } => {
                self.speed = Some(*speed);
                false
            }
            TelemetryEvent::TransitionTick { lateral_offset, .. } => {
                self.lateral_offset = *lateral_offset;
                true
            }
        }
    }

    pub fn phase(&self) -> Phase {
        if self.position.is_some() {
            Phase::Located
        } else {
            Phase::Unlocated
        }
    }

    pub fn is_located(&self) -> bool {
        self.position.is_some()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn current_piece(&self) -> Option<PieceId> {
        self.position.map(|p| p.piece)
    }

    pub fn lane(&self) -> Option<u32> {
        self.position.map(|p| p.lane)
    }

    /// Commits a newly resolved position.
    pub(crate) fn locate(&mut self, position: Position) {
        self.reported_piece = Some(position.piece);
        self.position = Some(position);
    }

    /// Drops the fix and any piece/locator readings tied to the old layout.
    pub fn unlocate(&mut self) {
        self.position = None;
        self.reported_piece = None;
        self.locator.clear();
    }

    /// Snapshot for display.
    pub fn status(&self) -> VehicleStatus {
        VehicleStatus {
            vehicle: self.id.clone(),
            phase: self.phase(),
            piece: self.current_piece(),
            lane: self.lane(),
            location: self.last_location,
            speed: self.speed,
            lateral_offset: self.lateral_offset,
        }
    }
}

/// Display-oriented summary of a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleStatus {
    pub vehicle: VehicleId,
    pub phase: Phase,
    pub piece: Option<PieceId>,
    pub lane: Option<u32>,
    pub location: Option<LocationId>,
    pub speed: Option<u32>,
    pub lateral_offset: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skull() -> VehicleId {
        VehicleId::from("Skull")
    }

    #[test]
    fn test_locator_window_trend() {
        let mut window = LocatorWindow::default();
        assert_eq!(window.trend(), None);

        window.push(LocationId(5));
        assert_eq!(window.trend(), Some(Trend::Steady));

        window.push(LocationId(7));
        assert_eq!(window.trend(), Some(Trend::Increasing));

        window.push(LocationId(3));
        assert_eq!(window.previous(), Some(LocationId(7)));
        assert_eq!(window.trend(), Some(Trend::Decreasing));

        window.push(LocationId(3));
        assert_eq!(window.trend(), Some(Trend::Steady));

        window.clear();
        assert_eq!(window.latest(), None);
    }

    #[test]
    fn test_observe_folds_events() {
        let mut state = VehicleState::new(skull());
        let piece = PieceId::new(4).unwrap();

        assert!(!state.observe(&TelemetryEvent::PieceChanged { vehicle: skull(), piece }));
        assert!(!state.observe(&TelemetryEvent::SpeedChanged { vehicle: skull(), speed: 500 }));
        assert!(!state.observe(&TelemetryEvent::SubLocationChanged {
            vehicle: skull(),
            location: LocationId(9),
        }));
        assert!(state.observe(&TelemetryEvent::TransitionTick {
            vehicle: skull(),
            lateral_offset: 12.5,
        }));

        assert_eq!(state.reported_piece, Some(piece));
        assert_eq!(state.speed, Some(500));
        assert_eq!(state.locator.latest(), Some(LocationId(9)));
        assert_eq!(state.lateral_offset, 12.5);
        assert_eq!(state.phase(), Phase::Unlocated);
    }

    #[test]
    fn test_locate_and_unlocate() {
        let mut state = VehicleState::new(skull());
        let piece = PieceId::new(2).unwrap();
        state.locator.push(LocationId(1));
        state.locate(Position {
            piece,
            previous: None,
            arrival: Some(Direction::Left),
            lane: 1,
            carried_lane: 1,
            lane_before_junction: None,
        });

        assert!(state.is_located());
        assert_eq!(state.status().piece, Some(piece));
        assert_eq!(state.status().lane, Some(1));

        state.unlocate();
        assert_eq!(state.phase(), Phase::Unlocated);
        assert_eq!(state.reported_piece, None);
        assert_eq!(state.locator.latest(), None);
    }
}
