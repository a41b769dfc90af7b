//! TrackView Core - Track Topology & Vehicle Position Tracking
//!
//! Follows toy vehicles over a reconfigurable grid of track pieces and
//! turns a lossy telemetry stream into smooth, correctly oriented motion:
//! 1. **Topology**: grid adjacency between placed pieces
//! 2. **Junction lanes**: lane correspondence across junction arms
//! 3. **Resolver**: per-tick piece/lane inference with error correction for
//!    unreported piece changes
//! 4. **Animation**: renderable segments with direction and duration

pub mod agent_runtime;
pub mod animation;
pub mod junction_lanes;
pub mod lane_atlas;
pub mod position_resolver;
pub mod track_topology;
pub mod tracking_engine;
pub mod vehicle;

// Re-export key types for convenience
pub use animation::{AnimationEmitter, AnimationSegment, CarTransform};
pub use junction_lanes::{revert_lane, JunctionLaneMap};
pub use lane_atlas::{AtlasConfig, LaneAtlas, SchematicAtlas};
pub use position_resolver::{PositionResolver, Resolution, ResolveError};
pub use track_topology::{
    Direction, GridSnapshot, PiecePlacement, Rotation, TopologyGraph, TrackPiece, TrackType,
};
pub use tracking_engine::{
    LaneNudge, StopReason, TrackingConfig, TrackingEngine, TrackingError, TrackingOutput,
    TrackingStats,
};
pub use vehicle::{Phase, Position, VehicleState, VehicleStatus};
