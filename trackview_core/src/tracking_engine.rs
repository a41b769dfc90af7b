//! The "TRACKING" Engine - Vehicle Records, Telemetry Intake and Outputs
//!
//! Owns everything that changes while vehicles drive:
//! - The current [`TopologyGraph`] and the layout id stamped on outputs
//! - One [`VehicleState`] per vehicle, keyed by name
//! - The [`PositionResolver`] and [`AnimationEmitter`] each tick runs through
//!
//! Telemetry is folded into the vehicle records as it arrives; only a
//! transition tick triggers a resolve cycle. Every failure is recovered
//! here and reported as a [`TrackingOutput::Stopped`] signal.

use crate::animation::{AnimationEmitter, AnimationSegment, Emission};
use crate::lane_atlas::{LaneAtlas, SchematicAtlas};
use crate::position_resolver::{PositionResolver, Resolution, ResolveError};
use crate::track_topology::{GridSnapshot, TopologyGraph};
use crate::vehicle::{VehicleState, VehicleStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use trackview_env::{
    decode, EnvError, Inbound, PieceId, TelemetryEvent, TelemetryMessage, VehicleCommand, VehicleId,
};
use uuid::Uuid;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the [`TrackingEngine`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Lateral offset change per lane nudge (default: 10.0)
    pub lane_nudge_step: f64,

    /// Acceleration sent with every speed command (default: 1000)
    pub acceleration: u32,

    /// Slowest speed a moving vehicle can be commanded to (default: 200)
    pub min_speed: u32,

    /// Fastest commandable speed (default: 1250)
    pub max_speed: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            lane_nudge_step: 10.0,
            acceleration: 1000,
            min_speed: 200,
            max_speed: 1250,
        }
    }
}

// ============================================================================
// OUTPUTS
// ============================================================================

/// Why a vehicle is not being animated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StopReason {
    /// Speed is zero or was never reported
    ZeroSpeed,
    /// The resolve cycle failed; tracking stalls until fresh telemetry
    Lost(ResolveError),
}

/// What a single ingested event produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackingOutput {
    /// Draw this segment
    Animate(AnimationSegment),

    /// First fix established; nothing to draw yet
    Primed {
        vehicle: VehicleId,
        piece: PieceId,
        lane: u32,
    },

    /// Stop animating the vehicle
    Stopped {
        vehicle: VehicleId,
        reason: StopReason,
    },
}

/// Direction of a manual lane change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaneNudge {
    Left,
    Right,
}

/// Counters for monitoring the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingStats {
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub ticks: u64,
    pub segments: u64,
    pub primings: u64,
    pub corrections: u64,
    pub lost_cycles: u64,
    pub stopped_cycles: u64,
    pub layout_resets: u64,
}

// ============================================================================
// TRACKING ENGINE
// ============================================================================

/// Owner of all vehicle records for one layout at a time.
pub struct TrackingEngine {
    config: TrackingConfig,
    graph: TopologyGraph,
    layout_id: Uuid,
    atlas: Box<dyn LaneAtlas>,
    resolver: PositionResolver,
    emitter: AnimationEmitter,
    vehicles: HashMap<VehicleId, VehicleState>,
    stats: TrackingStats,
}

impl TrackingEngine {
    /// Creates an engine with an empty layout.
    pub fn new(config: TrackingConfig, atlas: Box<dyn LaneAtlas>) -> Self {
        Self {
            config,
            graph: TopologyGraph::default(),
            layout_id: Uuid::new_v4(),
            atlas,
            resolver: PositionResolver::new(),
            emitter: AnimationEmitter::new(),
            vehicles: HashMap::new(),
            stats: TrackingStats::default(),
        }
    }

    /// Creates an engine with default config and the schematic atlas.
    pub fn with_defaults() -> Self {
        Self::new(TrackingConfig::default(), Box::new(SchematicAtlas::default()))
    }

    /// Replaces the layout.
    ///
    /// Every vehicle becomes UNLOCATED: positions resolved against the old
    /// graph mean nothing on the new one.
    pub fn load_layout(&mut self, snapshot: &GridSnapshot) -> Uuid {
        self.graph = TopologyGraph::from_snapshot(snapshot);
        self.layout_id = Uuid::new_v4();
        for state in self.vehicles.values_mut() {
            state.unlocate();
        }
        self.stats.layout_resets += 1;
        tracing::info!(
            "Loaded layout {} ({} pieces); {} vehicles reset",
            self.layout_id,
            self.graph.len(),
            self.vehicles.len()
        );
        self.layout_id
    }

    // ========================================================================
    // INTAKE
    // ========================================================================

    /// Decodes and ingests a raw transport message.
    ///
    /// Malformed or unknown messages are dropped.
    pub fn ingest_message(&mut self, message: &TelemetryMessage) -> Option<TrackingOutput> {
        self.stats.messages_received += 1;
        match decode(message) {
            Ok(Inbound::Telemetry(event)) => self.ingest(event),
            Ok(Inbound::Roster(vehicles)) => {
                for vehicle in vehicles {
                    self.add_vehicle(vehicle);
                }
                None
            }
            Ok(Inbound::Ignored) => None,
            Err(e) => {
                self.stats.messages_dropped += 1;
                tracing::warn!("Dropping message: {}", e);
                None
            }
        }
    }

    /// Ingests one telemetry event.
    ///
    /// Returns an output only for transition ticks that changed something.
    pub fn ingest(&mut self, event: TelemetryEvent) -> Option<TrackingOutput> {
        let vehicle = event.vehicle().clone();
        let state = self.vehicles.entry(vehicle.clone()).or_insert_with(|| {
            tracing::info!("New vehicle sighted: {}", vehicle);
            VehicleState::new(vehicle.clone())
        });

        if !state.observe(&event) {
            return None;
        }

        self.stats.ticks += 1;
        let outcome = self.resolver.resolve(state, &self.graph, self.atlas.as_ref());
        // Readings belong to the piece just left, whatever the outcome.
        state.locator.clear();

        match outcome {
            Ok(Resolution::Waiting) => None,
            Ok(Resolution::Primed(position)) => {
                self.stats.primings += 1;
                Some(TrackingOutput::Primed {
                    vehicle,
                    piece: position.piece,
                    lane: position.lane,
                })
            }
            Ok(Resolution::Moved { position, corrected }) => {
                if corrected {
                    self.stats.corrections += 1;
                }
                let piece = self.graph.piece(position.piece)?;
                let emitted = self.emitter.emit(
                    &vehicle,
                    self.layout_id,
                    piece,
                    &position,
                    state.speed,
                    self.atlas.as_ref(),
                );
                match emitted {
                    Ok(Emission::Segment(segment)) => {
                        self.stats.segments += 1;
                        Some(TrackingOutput::Animate(segment))
                    }
                    Ok(Emission::Stopped) => {
                        self.stats.stopped_cycles += 1;
                        Some(TrackingOutput::Stopped {
                            vehicle,
                            reason: StopReason::ZeroSpeed,
                        })
                    }
                    Err(e) => Some(self.lost(vehicle, e)),
                }
            }
            Err(e) => {
                if let ResolveError::UnknownPieceId(_) = e {
                    state.unlocate();
                }
                Some(self.lost(vehicle, e))
            }
        }
    }

    fn lost(&mut self, vehicle: VehicleId, error: ResolveError) -> TrackingOutput {
        self.stats.lost_cycles += 1;
        tracing::warn!("{}: tracking lost this cycle: {}", vehicle, error);
        TrackingOutput::Stopped {
            vehicle,
            reason: StopReason::Lost(error),
        }
    }

    // ========================================================================
    // VEHICLE LIFECYCLE
    // ========================================================================

    /// Registers a vehicle. Returns `false` if it was already known.
    pub fn add_vehicle(&mut self, vehicle: VehicleId) -> bool {
        if self.vehicles.contains_key(&vehicle) {
            return false;
        }
        tracing::info!("Vehicle announced: {}", vehicle);
        self.vehicles.insert(vehicle.clone(), VehicleState::new(vehicle));
        true
    }

    /// Forgets a vehicle and returns its last record.
    pub fn remove_vehicle(&mut self, vehicle: &VehicleId) -> Option<VehicleState> {
        let removed = self.vehicles.remove(vehicle);
        if removed.is_some() {
            tracing::info!("Vehicle removed: {}", vehicle);
        }
        removed
    }

    // ========================================================================
    // COMMANDS
    // ========================================================================

    /// Builds a speed command. Zero stops the vehicle; other speeds are
    /// clamped into the configured range.
    pub fn set_speed(
        &self,
        vehicle: &VehicleId,
        speed: u32,
    ) -> Result<VehicleCommand, TrackingError> {
        self.require(vehicle)?;
        let speed = if speed == 0 {
            0
        } else {
            speed.clamp(self.config.min_speed, self.config.max_speed)
        };
        Ok(VehicleCommand::SetSpeed {
            speed,
            acceleration: self.config.acceleration,
        })
    }

    /// Builds a lane change one step left or right of the last reported
    /// lateral offset.
    pub fn nudge_lane(
        &self,
        vehicle: &VehicleId,
        nudge: LaneNudge,
    ) -> Result<VehicleCommand, TrackingError> {
        let state = self.require(vehicle)?;
        let step = match nudge {
            LaneNudge::Left => -self.config.lane_nudge_step,
            LaneNudge::Right => self.config.lane_nudge_step,
        };
        Ok(VehicleCommand::ChangeLane {
            offset: state.lateral_offset + step,
        })
    }

    fn require(&self, vehicle: &VehicleId) -> Result<&VehicleState, TrackingError> {
        self.vehicles
            .get(vehicle)
            .ok_or_else(|| TrackingError::UnknownVehicle(vehicle.clone()))
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    /// Returns true if the vehicle has a resolved piece on the current layout.
    pub fn is_located(&self, vehicle: &VehicleId) -> bool {
        self.vehicles.get(vehicle).is_some_and(VehicleState::is_located)
    }

    /// Current piece and lane of a located vehicle.
    pub fn position(&self, vehicle: &VehicleId) -> Option<(PieceId, u32)> {
        self.vehicles
            .get(vehicle)
            .and_then(|s| s.position())
            .map(|p| (p.piece, p.lane))
    }

    pub fn vehicle(&self, vehicle: &VehicleId) -> Option<&VehicleState> {
        self.vehicles.get(vehicle)
    }

    pub fn vehicles(&self) -> impl Iterator<Item = &VehicleState> {
        self.vehicles.values()
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Display snapshots of all vehicles, sorted by name.
    pub fn statuses(&self) -> Vec<VehicleStatus> {
        let mut statuses: Vec<VehicleStatus> =
            self.vehicles.values().map(VehicleState::status).collect();
        statuses.sort_by(|a, b| a.vehicle.cmp(&b.vehicle));
        statuses
    }

    pub fn graph(&self) -> &TopologyGraph {
        &self.graph
    }

    pub fn layout_id(&self) -> Uuid {
        self.layout_id
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn stats(&self) -> &TrackingStats {
        &self.stats
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors surfaced to callers of the engine's command API.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackingError {
    #[error("Unknown vehicle: {0}")]
    UnknownVehicle(VehicleId),

    #[error(transparent)]
    Env(#[from] EnvError),
}
