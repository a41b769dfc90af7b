//! The "ANIMATION" Stage - Resolved Position → Renderable Segment
//!
//! Every successful resolve cycle becomes one [`AnimationSegment`]: which
//! lane path to follow, for how long, and how to orient the vehicle sprite.
//! Orientation depends on the piece type, rotation, arrival side and, for
//! junctions, whether the occupied lane is an arc or a straight.

use crate::lane_atlas::LaneAtlas;
use crate::position_resolver::ResolveError;
use crate::track_topology::{Direction, Rotation, TrackPiece, TrackType};
use crate::vehicle::Position;
use serde::{Deserialize, Serialize};
use trackview_env::{PieceId, VehicleId};
use uuid::Uuid;

// ============================================================================
// ORIENTATION
// ============================================================================

/// Sprite transform applied while following a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarTransform {
    /// No transform attribute at all
    None,
    /// `scale(1,1)`
    Identity,
    /// `scale(1,-1)`
    FlipVertical,
    /// `scale(-1,1)`
    FlipHorizontal,
}

impl CarTransform {
    /// Scale factors `(x, y)` for the renderer.
    pub fn scale(self) -> (i8, i8) {
        match self {
            Self::None | Self::Identity => (1, 1),
            Self::FlipVertical => (1, -1),
            Self::FlipHorizontal => (-1, 1),
        }
    }

    pub fn is_mirrored(self) -> bool {
        self.scale() != (1, 1)
    }
}

/// How a vehicle traverses a lane path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orientation {
    /// Path is followed from its end to its start
    pub reversed: bool,
    pub transform: CarTransform,
}

impl Orientation {
    const FORWARD: Self = Self { reversed: false, transform: CarTransform::None };

    fn reversed(transform: CarTransform) -> Self {
        Self { reversed: true, transform }
    }

    fn forward(transform: CarTransform) -> Self {
        Self { reversed: false, transform }
    }
}

/// Orientation for a vehicle on `piece`, `lane`, having entered through
/// `arrival`.
pub fn orientation(piece: &TrackPiece, arrival: Direction, lane: u32) -> Orientation {
    use CarTransform::{FlipHorizontal, FlipVertical, Identity};
    use Direction::{Left, Right, Under, Upper};
    use Rotation::{R0, R1, R2, R3};

    match piece.track_type {
        TrackType::Straight | TrackType::ToTheMiddle => match arrival {
            Right => Orientation::reversed(Identity),
            _ => Orientation::FORWARD,
        },
        TrackType::Curve => match arrival {
            Upper | Under => Orientation::reversed(FlipVertical),
            Left | Right => Orientation::FORWARD,
        },
        TrackType::Junction => {
            let straight_lane = lane > piece.split_lanes();
            match (arrival, piece.rotation) {
                (Upper, R1 | R3) if straight_lane => Orientation::reversed(FlipVertical),
                (Upper, R1 | R3) => Orientation::forward(FlipHorizontal),
                (Upper, R0 | R2) => Orientation::reversed(FlipVertical),
                (Right, R2) if straight_lane => Orientation::reversed(FlipVertical),
                (Right, R2) => Orientation::forward(FlipHorizontal),
                (Right, R0) if straight_lane => Orientation::reversed(Identity),
                (Right, R0) => Orientation::FORWARD,
                (Right, R1 | R3) => Orientation::reversed(Identity),
                (Left, R1) => Orientation::reversed(Identity),
                (Under, R2) => Orientation::reversed(FlipVertical),
                (Left, _) | (Under, _) => Orientation::FORWARD,
            }
        }
        TrackType::Intersection => match arrival {
            Right | Upper => Orientation::reversed(Identity),
            Left | Under => Orientation::FORWARD,
        },
    }
}

// ============================================================================
// SEGMENT (Output)
// ============================================================================

/// One renderable leg of a vehicle's motion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationSegment {
    pub vehicle: VehicleId,

    /// Layout the segment was resolved against
    pub layout_id: Uuid,

    pub piece_id: PieceId,
    pub lane_id: u32,

    /// Renderer path identity
    pub path_ref: String,

    /// `floor(path length × 1000 / speed)`
    pub duration_millis: u64,

    /// Sprite is flipped horizontally or vertically
    pub mirrored: bool,

    /// Path is followed backward
    pub reversed: bool,

    pub transform: CarTransform,
}

/// Result of an emission attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    Segment(AnimationSegment),
    /// Speed is zero or unknown; nothing to animate
    Stopped,
}

// ============================================================================
// EMITTER
// ============================================================================

/// Turns resolved positions into [`AnimationSegment`]s.
#[derive(Debug, Clone, Default)]
pub struct AnimationEmitter {
    emitted: u64,
}

impl AnimationEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the segment for `position` on `piece`.
    ///
    /// Vehicles without a positive speed are reported as
    /// [`Emission::Stopped`] instead of producing an unbounded duration.
    pub fn emit(
        &mut self,
        vehicle: &VehicleId,
        layout_id: Uuid,
        piece: &TrackPiece,
        position: &Position,
        speed: Option<u32>,
        atlas: &dyn LaneAtlas,
    ) -> Result<Emission, ResolveError> {
        let speed = match speed {
            Some(s) if s > 0 => s,
            _ => return Ok(Emission::Stopped),
        };

        let path = atlas
            .path(piece, position.lane)
            .ok_or(ResolveError::UnknownLane {
                piece: piece.id,
                lane: Some(position.lane),
            })?;

        let orientation = position
            .arrival
            .map(|arrival| orientation(piece, arrival, position.lane))
            .unwrap_or(Orientation::FORWARD);

        let duration_millis = (path.length * 1000.0 / speed as f64).floor().max(0.0) as u64;

        self.emitted += 1;
        Ok(Emission::Segment(AnimationSegment {
            vehicle: vehicle.clone(),
            layout_id,
            piece_id: piece.id,
            lane_id: position.lane,
            path_ref: path.path_ref,
            duration_millis,
            mirrored: orientation.transform.is_mirrored(),
            reversed: orientation.reversed,
            transform: orientation.transform,
        }))
    }

    /// Number of segments produced so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}
