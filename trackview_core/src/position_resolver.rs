//! The "RESOLVER" Engine - Piece, Lane and Arrival Inference
//!
//! Runs once per transition tick and decides where a vehicle is now:
//! 1. **Priming**: an unlocated vehicle on a straight piece gets its first
//!    fix from the trend of its sub-location readings
//! 2. **Error correction**: if telemetry still reports the piece the vehicle
//!    was last resolved on, the real piece is inferred from the exit rules
//! 3. **Lane selection**: the incoming lane is carried across the piece
//!    boundary (mirrored on curves, remapped through junction arms, shifted
//!    onto the crossing axis of intersections) unless a fresh sub-location
//!    reading names the lane directly
//! 4. **Lane carry**: the animated lane is normalized back into the entry
//!    arm's numbering for the next cycle
//!
//! Exit, mirror and arm rules are explicit `match` tables keyed by rotation
//! and arrival side.
//!
//! Junction branches use one threshold throughout: a lane is in the upper
//! half of a split range of `s` lanes when `lane > s/2`.

use crate::junction_lanes::{revert_lane, JunctionArm, JunctionLaneCache};
use crate::lane_atlas::LaneAtlas;
use crate::track_topology::{Direction, Rotation, TopologyGraph, TrackPiece, TrackType};
use crate::vehicle::{Position, Trend, VehicleState};
use serde::{Deserialize, Serialize};
use trackview_env::PieceId;

// ============================================================================
// RESOLUTION (Output)
// ============================================================================

/// Outcome of one resolve cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Not enough information yet; nothing changed
    Waiting,

    /// First fix on a piece without motion; no animation this cycle
    Primed(Position),

    /// The vehicle advanced onto `position.piece`
    Moved {
        position: Position,
        /// The piece was inferred because telemetry did not report it
        corrected: bool,
    },
}

/// Where the incoming motion of this cycle comes from.
#[derive(Debug, Clone, Copy)]
enum Origin {
    /// Last resolved position
    Located(Position),
    /// Heading inferred while priming; no lane carried yet
    Heading {
        arrival: Direction,
        previous: Option<PieceId>,
    },
}

// ============================================================================
// POSITION RESOLVER
// ============================================================================

/// Per-tick state machine shared by all vehicles.
///
/// The only state it keeps between calls is the cached junction tables.
#[derive(Debug, Clone, Default)]
pub struct PositionResolver {
    junction_lanes: JunctionLaneCache,
}

impl PositionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the vehicle's position for one transition tick.
    ///
    /// On success the new position is committed to `state`. On error `state`
    /// is left untouched; callers decide how to recover.
    pub fn resolve(
        &mut self,
        state: &mut VehicleState,
        graph: &TopologyGraph,
        atlas: &dyn LaneAtlas,
    ) -> Result<Resolution, ResolveError> {
        let Some(reported) = state.reported_piece else {
            return Ok(Resolution::Waiting);
        };
        let piece = graph
            .piece(reported)
            .ok_or(ResolveError::UnknownPieceId(reported))?;

        let origin = match state.position() {
            Some(position) => Origin::Located(*position),
            None => match self.prime(state, piece, graph, atlas)? {
                Priming::Waiting => return Ok(Resolution::Waiting),
                Priming::Centered(position) => {
                    tracing::info!(
                        "{} primed on piece {} lane {}",
                        state.id,
                        position.piece,
                        position.lane
                    );
                    state.locate(position);
                    return Ok(Resolution::Primed(position));
                }
                Priming::Heading { arrival, previous } => Origin::Heading { arrival, previous },
            },
        };

        // Error correction: telemetry still names the piece we resolved last.
        let (target_id, corrected) = match origin {
            Origin::Located(last) if last.piece == reported => {
                let exit = exit_direction(piece, last.arrival, last.lane_before_junction)
                    .ok_or(ResolveError::NoSuchNeighbor { piece: reported, exit: None })?;
                let next = graph.neighbor(reported, exit).ok_or(ResolveError::NoSuchNeighbor {
                    piece: reported,
                    exit: Some(exit),
                })?;
                tracing::debug!(
                    "{}: piece change not reported, inferred {} -> {} via {}",
                    state.id,
                    reported,
                    next.piece,
                    exit
                );
                (next.piece, true)
            }
            _ => (reported, false),
        };

        let target = graph
            .piece(target_id)
            .ok_or(ResolveError::UnknownPieceId(target_id))?;

        let (previous, arrival, incoming) = match origin {
            Origin::Located(last) => (
                Some(last.piece),
                target.direction_to(last.piece),
                Some(last.carried_lane),
            ),
            Origin::Heading { arrival, previous } => (previous, Some(arrival), None),
        };

        let lane = match state
            .locator
            .latest()
            .and_then(|location| atlas.lane_of(target, location))
        {
            Some(lane) => lane,
            None => {
                let incoming = incoming.ok_or(ResolveError::UnknownLane {
                    piece: target_id,
                    lane: None,
                })?;
                self.select_lane(target, arrival, incoming)?
            }
        };
        // A lane the atlas cannot draw is never committed.
        if lane == 0 || lane > target.lane_count || atlas.path(target, lane).is_none() {
            return Err(ResolveError::UnknownLane {
                piece: target_id,
                lane: Some(lane),
            });
        }

        let carried_lane = match arrival {
            Some(arrival) => carry_lane(target, arrival, lane, incoming),
            None => lane,
        };

        let position = Position {
            piece: target_id,
            previous,
            arrival,
            lane,
            carried_lane,
            lane_before_junction: incoming,
        };
        tracing::debug!(
            "{} on piece {} lane {} (arrival {:?}, carried {})",
            state.id,
            target_id,
            lane,
            arrival,
            carried_lane
        );
        state.locate(position);

        Ok(Resolution::Moved { position, corrected })
    }

    /// UNLOCATED → LOCATED from the locator trend on the reported piece.
    fn prime(
        &self,
        state: &VehicleState,
        piece: &TrackPiece,
        graph: &TopologyGraph,
        atlas: &dyn LaneAtlas,
    ) -> Result<Priming, ResolveError> {
        let Some(trend) = state.locator.trend() else {
            return Ok(Priming::Waiting);
        };

        if !piece.track_type.supports_priming() {
            return match trend {
                Trend::Steady if state.locator.previous().is_some() => {
                    Err(ResolveError::AmbiguousPriming { piece: piece.id })
                }
                _ => Ok(Priming::Waiting),
            };
        }

        let arrival = match trend {
            // Moving leftward: came in from the right neighbor.
            Trend::Decreasing => Direction::Right,
            Trend::Increasing => Direction::Left,
            Trend::Steady => {
                let lane = state
                    .locator
                    .latest()
                    .and_then(|location| atlas.lane_of(piece, location))
                    .filter(|&lane| atlas.path(piece, lane).is_some())
                    .ok_or(ResolveError::UnknownLane { piece: piece.id, lane: None })?;
                return Ok(Priming::Centered(Position {
                    piece: piece.id,
                    previous: None,
                    arrival: None,
                    lane,
                    carried_lane: lane,
                    lane_before_junction: None,
                }));
            }
        };

        Ok(Priming::Heading {
            arrival,
            previous: graph.neighbor(piece.id, arrival).map(|n| n.piece),
        })
    }

    /// Lane on `target` continuing `incoming` from the previous piece.
    fn select_lane(
        &mut self,
        target: &TrackPiece,
        arrival: Option<Direction>,
        incoming: u32,
    ) -> Result<u32, ResolveError> {
        let Some(arrival) = arrival else {
            return Ok(incoming);
        };

        let lane = match target.track_type {
            TrackType::Straight | TrackType::ToTheMiddle => incoming,
            TrackType::Curve => {
                if curve_mirrors_on_entry(target.rotation, arrival) {
                    revert_lane(incoming, target.lane_count)
                } else {
                    incoming
                }
            }
            TrackType::Junction => {
                let split = target.split_lanes();
                match junction_entry_arm(target.rotation, arrival) {
                    Some((arm, mirror)) => {
                        let lane = if mirror { revert_lane(incoming, split) } else { incoming };
                        self.junction_lanes.get(split).map(arm, lane).ok_or(
                            ResolveError::UnknownLane {
                                piece: target.id,
                                lane: Some(incoming),
                            },
                        )?
                    }
                    None => incoming,
                }
            }
            TrackType::Intersection => {
                if arrival.is_vertical() {
                    incoming + target.half_lanes()
                } else {
                    incoming
                }
            }
        };
        Ok(lane)
    }
}

enum Priming {
    Waiting,
    Centered(Position),
    Heading {
        arrival: Direction,
        previous: Option<PieceId>,
    },
}

// ============================================================================
// RULE TABLES
// ============================================================================

/// Side through which a vehicle leaves `piece` after entering through
/// `arrival`.
///
/// `None` when the arrival is unknown or the piece has no track on that
/// side.
pub fn exit_direction(
    piece: &TrackPiece,
    arrival: Option<Direction>,
    lane_before_junction: Option<u32>,
) -> Option<Direction> {
    let arrival = arrival?;
    match piece.track_type {
        TrackType::Straight | TrackType::ToTheMiddle | TrackType::Intersection => {
            Some(arrival.opposite())
        }
        TrackType::Curve => curve_exit(piece.rotation, arrival),
        TrackType::Junction => {
            let (upper, lower) = junction_exits(piece.rotation, arrival)?;
            let split = piece.split_lanes();
            match lane_before_junction {
                Some(lane) if 2 * lane > split => Some(upper),
                _ => Some(lower),
            }
        }
    }
}

/// Curve sides by rotation: R0 LEFT↔UPPER, R1 LEFT↔UNDER, R2 RIGHT↔UNDER,
/// R3 RIGHT↔UPPER.
pub fn curve_exit(rotation: Rotation, arrival: Direction) -> Option<Direction> {
    use Direction::{Left, Right, Under, Upper};
    match (rotation, arrival) {
        (Rotation::R0, Left) => Some(Upper),
        (Rotation::R0, Upper) => Some(Left),
        (Rotation::R1, Left) => Some(Under),
        (Rotation::R1, Under) => Some(Left),
        (Rotation::R2, Right) => Some(Under),
        (Rotation::R2, Under) => Some(Right),
        (Rotation::R3, Right) => Some(Upper),
        (Rotation::R3, Upper) => Some(Right),
        _ => None,
    }
}

/// Junction exits as `(upper half, lower half)` of the incoming lane.
pub fn junction_exits(rotation: Rotation, arrival: Direction) -> Option<(Direction, Direction)> {
    use Direction::{Left, Right, Under, Upper};
    match (rotation, arrival) {
        (Rotation::R0, Left) => Some((Upper, Right)),
        (Rotation::R0, Right) => Some((Upper, Left)),
        (Rotation::R0, Upper) => Some((Left, Right)),
        (Rotation::R1, Upper) => Some((Left, Under)),
        (Rotation::R1, Under) => Some((Left, Upper)),
        (Rotation::R1, Left) => Some((Upper, Under)),
        (Rotation::R2, Left) => Some((Right, Under)),
        (Rotation::R2, Right) => Some((Left, Under)),
        (Rotation::R2, Under) => Some((Left, Right)),
        (Rotation::R3, Upper) => Some((Under, Right)),
        (Rotation::R3, Under) => Some((Upper, Right)),
        (Rotation::R3, Right) => Some((Upper, Under)),
        _ => None,
    }
}

/// Arm table (and whether to mirror the incoming lane first) for entering a
/// junction.
pub fn junction_entry_arm(rotation: Rotation, arrival: Direction) -> Option<(JunctionArm, bool)> {
    use Direction::{Left, Right, Under, Upper};
    use JunctionArm::{X, Y, Z};
    match (rotation, arrival) {
        (Rotation::R0, Left) => Some((X, false)),
        (Rotation::R0, Upper) => Some((Y, false)),
        (Rotation::R0, Right) => Some((Z, false)),
        (Rotation::R1, Left) => Some((Y, true)),
        (Rotation::R1, Upper) => Some((Z, false)),
        (Rotation::R1, Under) => Some((X, false)),
        (Rotation::R2, Under) => Some((Y, false)),
        (Rotation::R2, Left) => Some((X, true)),
        (Rotation::R2, Right) => Some((Z, true)),
        (Rotation::R3, Right) => Some((Y, true)),
        (Rotation::R3, Upper) => Some((Z, true)),
        (Rotation::R3, Under) => Some((X, true)),
        _ => None,
    }
}

/// Whether entering a curve mirrors the lane index.
pub fn curve_mirrors_on_entry(rotation: Rotation, arrival: Direction) -> bool {
    match rotation {
        Rotation::R0 => false,
        Rotation::R1 => arrival == Direction::Left,
        Rotation::R2 => true,
        Rotation::R3 => arrival == Direction::Upper,
    }
}

/// Whether the animated lane on a curve is mirrored back before carrying it.
pub fn curve_mirrors_on_carry(rotation: Rotation, arrival: Direction) -> bool {
    match rotation {
        Rotation::R0 => false,
        Rotation::R1 => arrival == Direction::Upper,
        Rotation::R2 => true,
        Rotation::R3 => arrival == Direction::Right,
    }
}

/// Normalizes the animated `lane` into the numbering handed to the next
/// piece.
fn carry_lane(target: &TrackPiece, arrival: Direction, lane: u32, incoming: Option<u32>) -> u32 {
    match target.track_type {
        TrackType::Straight | TrackType::ToTheMiddle => lane,
        TrackType::Curve => {
            if curve_mirrors_on_carry(target.rotation, arrival) {
                revert_lane(lane, target.lane_count)
            } else {
                lane
            }
        }
        TrackType::Junction => {
            let split = target.split_lanes();
            let base = incoming.unwrap_or_else(|| lane.min(split));
            let mirror = match target.rotation {
                Rotation::R0 | Rotation::R3 => lane <= split && 2 * lane > split,
                Rotation::R1 | Rotation::R2 => 2 * lane <= split,
            };
            if mirror {
                revert_lane(base, split)
            } else {
                base
            }
        }
        TrackType::Intersection => {
            if arrival.is_vertical() {
                lane.saturating_sub(target.half_lanes()).max(1)
            } else {
                lane
            }
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Recoverable resolve failures. None of them is fatal to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ResolveError {
    /// Error correction found no piece to continue onto
    #[error("No neighbor to continue onto from piece {piece} (exit {exit:?})")]
    NoSuchNeighbor {
        piece: PieceId,
        exit: Option<Direction>,
    },

    /// Steady sub-location readings on a piece that cannot prime
    #[error("Cannot prime on piece {piece}: not a straight piece")]
    AmbiguousPriming { piece: PieceId },

    /// Telemetry names a piece missing from the current layout
    #[error("Unknown piece id: {0}")]
    UnknownPieceId(PieceId),

    /// No usable lane could be determined on the piece
    #[error("No usable lane {lane:?} on piece {piece}")]
    UnknownLane { piece: PieceId, lane: Option<u32> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lane_atlas::SchematicAtlas;
    use crate::track_topology::PiecePlacement;
    use proptest::prelude::*;
    use trackview_env::{LocationId, TelemetryEvent, VehicleId};

    fn pid(raw: u8) -> PieceId {
        PieceId::new(raw).unwrap()
    }

    fn place(
        raw: u8,
        track_type: TrackType,
        rotation: Rotation,
        lanes: u32,
    ) -> Option<PiecePlacement> {
        Some(PiecePlacement::new(pid(raw), track_type, rotation, lanes))
    }

    fn vehicle() -> VehicleState {
        VehicleState::new(VehicleId::from("Skull"))
    }

    fn report(state: &mut VehicleState, raw: u8) {
        state.observe(&TelemetryEvent::PieceChanged { vehicle: state.id.clone(), piece: pid(raw) });
    }

    fn read(state: &mut VehicleState, location: u32) {
        state.observe(&TelemetryEvent::SubLocationChanged {
            vehicle: state.id.clone(),
            location: LocationId(location),
        });
    }

    fn located(state: &mut VehicleState, position: Position) {
        state.locate(position);
    }

    fn row_of_three() -> TopologyGraph {
        TopologyGraph::build(
            &[
                place(1, TrackType::Straight, Rotation::R0, 2),
                place(2, TrackType::Straight, Rotation::R0, 2),
                place(3, TrackType::Straight, Rotation::R0, 2),
            ],
            3,
        )
    }

    #[test]
    fn test_waiting_without_reported_piece() {
        let mut resolver = PositionResolver::new();
        let mut state = vehicle();
        let outcome = resolver.resolve(&mut state, &row_of_three(), &SchematicAtlas::default());
        assert_eq!(outcome, Ok(Resolution::Waiting));
    }

    #[test]
    fn test_priming_steady_reading_reads_lane() {
        let mut resolver = PositionResolver::new();
        let mut state = vehicle();
        report(&mut state, 2);
        read(&mut state, 6); // lane 2
        read(&mut state, 6);

        let outcome = resolver
            .resolve(&mut state, &row_of_three(), &SchematicAtlas::default())
            .unwrap();

        let Resolution::Primed(position) = outcome else {
            panic!("expected priming, got {:?}", outcome);
        };
        assert_eq!(position.piece, pid(2));
        assert_eq!(position.lane, 2);
        assert_eq!(position.arrival, None);
        assert!(state.is_located());
    }

    #[test]
    fn test_priming_increasing_readings_arrive_from_left() {
        let mut resolver = PositionResolver::new();
        let mut state = vehicle();
        report(&mut state, 2);
        read(&mut state, 1);
        read(&mut state, 2);

        let outcome = resolver
            .resolve(&mut state, &row_of_three(), &SchematicAtlas::default())
            .unwrap();

        let Resolution::Moved { position, corrected } = outcome else {
            panic!("expected a move, got {:?}", outcome);
        };
        assert!(!corrected);
        assert_eq!(position.piece, pid(2));
        assert_eq!(position.arrival, Some(Direction::Left));
        assert_eq!(position.previous, Some(pid(1)));
        assert_eq!(position.lane, 1);
    }

    #[test]
    fn test_scenario_a_correction_exits_opposite_arrival() {
        let graph = row_of_three();
        let atlas = SchematicAtlas::default();
        let mut resolver = PositionResolver::new();
        let mut state = vehicle();

        // Prime on piece 2 with decreasing readings: arrival RIGHT.
        report(&mut state, 2);
        read(&mut state, 3);
        read(&mut state, 2);
        let primed = resolver.resolve(&mut state, &graph, &atlas).unwrap();
        assert!(matches!(primed, Resolution::Moved { position, .. }
            if position.arrival == Some(Direction::Right) && position.previous == Some(pid(3))));
        state.locator.clear();

        // Next tick still reports piece 2.
        let outcome = resolver.resolve(&mut state, &graph, &atlas).unwrap();
        let Resolution::Moved { position, corrected } = outcome else {
            panic!("expected a move, got {:?}", outcome);
        };
        assert!(corrected);
        assert_eq!(position.piece, pid(1));
        assert_eq!(position.arrival, Some(Direction::Right));
        assert_eq!(position.lane, 1);
        assert_eq!(state.reported_piece, Some(pid(1)));
    }

    #[test]
    fn test_correction_without_neighbor_leaves_state() {
        let graph = row_of_three();
        let mut resolver = PositionResolver::new();
        let mut state = vehicle();
        report(&mut state, 1);
        located(
            &mut state,
            Position {
                piece: pid(1),
                previous: Some(pid(2)),
                arrival: Some(Direction::Right),
                lane: 1,
                carried_lane: 1,
                lane_before_junction: Some(1),
            },
        );
        let before = state.clone();

        let err = resolver
            .resolve(&mut state, &graph, &SchematicAtlas::default())
            .unwrap_err();
        assert_eq!(
            err,
            ResolveError::NoSuchNeighbor { piece: pid(1), exit: Some(Direction::Left) }
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_correction_after_centered_priming_has_no_exit() {
        let graph = row_of_three();
        let atlas = SchematicAtlas::default();
        let mut resolver = PositionResolver::new();
        let mut state = vehicle();
        report(&mut state, 2);
        read(&mut state, 1);
        resolver.resolve(&mut state, &graph, &atlas).unwrap();
        state.locator.clear();

        let err = resolver.resolve(&mut state, &graph, &atlas).unwrap_err();
        assert_eq!(err, ResolveError::NoSuchNeighbor { piece: pid(2), exit: None });
    }

    #[test]
    fn test_stationary_vehicle_never_changes_piece() {
        let graph = row_of_three();
        let atlas = SchematicAtlas::default();
        let mut resolver = PositionResolver::new();
        let mut state = vehicle();
        report(&mut state, 2);

        for reading in [1, 2, 1, 2, 2, 1] {
            read(&mut state, reading);
            read(&mut state, reading);
            let _ = resolver.resolve(&mut state, &graph, &atlas);
            assert_eq!(state.current_piece(), Some(pid(2)));
            state.locator.clear();
        }
    }

    #[test]
    fn test_non_straight_priming() {
        let graph = TopologyGraph::build(&[place(5, TrackType::Curve, Rotation::R0, 4)], 1);
        let atlas = SchematicAtlas::default();
        let mut resolver = PositionResolver::new();
        let mut state = vehicle();
        report(&mut state, 5);
        read(&mut state, 1);
        assert_eq!(resolver.resolve(&mut state, &graph, &atlas), Ok(Resolution::Waiting));

        read(&mut state, 1);
        assert_eq!(
            resolver.resolve(&mut state, &graph, &atlas),
            Err(ResolveError::AmbiguousPriming { piece: pid(5) })
        );

        read(&mut state, 2);
        assert_eq!(resolver.resolve(&mut state, &graph, &atlas), Ok(Resolution::Waiting));
        assert!(!state.is_located());
    }

    #[test]
    fn test_unknown_piece() {
        let mut resolver = PositionResolver::new();
        let mut state = vehicle();
        report(&mut state, 99);
        assert_eq!(
            resolver.resolve(&mut state, &row_of_three(), &SchematicAtlas::default()),
            Err(ResolveError::UnknownPieceId(pid(99)))
        );
    }

    #[test]
    fn test_scenario_b_junction_lower_half_exits_right() {
        let graph = TopologyGraph::build(
            &[
                place(9, TrackType::Straight, Rotation::R0, 4),
                place(10, TrackType::Junction, Rotation::R0, 6),
                place(11, TrackType::Straight, Rotation::R0, 4),
            ],
            3,
        );
        let junction = graph.piece(pid(10)).unwrap();
        assert_eq!(junction.split_lanes(), 4);
        assert_eq!(
            exit_direction(junction, Some(Direction::Left), Some(1)),
            Some(Direction::Right)
        );
        assert_eq!(
            exit_direction(junction, Some(Direction::Left), Some(3)),
            Some(Direction::Upper)
        );

        let mut resolver = PositionResolver::new();
        let mut state = vehicle();
        report(&mut state, 10);
        located(
            &mut state,
            Position {
                piece: pid(10),
                previous: Some(pid(9)),
                arrival: Some(Direction::Left),
                lane: 5,
                carried_lane: 1,
                lane_before_junction: Some(1),
            },
        );
        let outcome = resolver
            .resolve(&mut state, &graph, &SchematicAtlas::default())
            .unwrap();
        assert!(matches!(outcome, Resolution::Moved { position, corrected: true }
            if position.piece == pid(11)));
    }

    #[test]
    fn test_scenario_c_intersection_shifts_to_crossing_axis() {
        // Piece 19 above the intersection 20.
        let graph = TopologyGraph::build(
            &[
                place(19, TrackType::Straight, Rotation::R3, 2),
                place(20, TrackType::Intersection, Rotation::R0, 4),
            ],
            1,
        );
        let mut resolver = PositionResolver::new();
        let mut state = vehicle();
        located(
            &mut state,
            Position {
                piece: pid(19),
                previous: None,
                arrival: Some(Direction::Upper),
                lane: 1,
                carried_lane: 1,
                lane_before_junction: None,
            },
        );
        report(&mut state, 20);

        let outcome = resolver
            .resolve(&mut state, &graph, &SchematicAtlas::default())
            .unwrap();
        let Resolution::Moved { position, .. } = outcome else {
            panic!("expected a move, got {:?}", outcome);
        };
        assert_eq!(position.arrival, Some(Direction::Upper));
        assert_eq!(position.lane, 3);
        assert_eq!(position.carried_lane, 1);
    }

    #[test]
    fn test_scenario_d_curve_rotation_two_mirrors() {
        let graph = TopologyGraph::build(
            &[
                place(31, TrackType::Curve, Rotation::R2, 4),
                place(30, TrackType::Straight, Rotation::R0, 4),
            ],
            2,
        );
        // Curve R2 pairs RIGHT and UNDER; enter through its RIGHT side.
        let mut resolver = PositionResolver::new();
        let mut state = vehicle();
        located(
            &mut state,
            Position {
                piece: pid(30),
                previous: None,
                arrival: Some(Direction::Right),
                lane: 2,
                carried_lane: 2,
                lane_before_junction: None,
            },
        );
        report(&mut state, 31);

        let outcome = resolver
            .resolve(&mut state, &graph, &SchematicAtlas::default())
            .unwrap();
        let Resolution::Moved { position, .. } = outcome else {
            panic!("expected a move, got {:?}", outcome);
        };
        assert_eq!(position.arrival, Some(Direction::Right));
        assert_eq!(position.lane, 3);
        // Rotation 2 mirrors back when carrying.
        assert_eq!(position.carried_lane, 2);
    }

    #[test]
    fn test_fresh_locator_overrides_lane_selection() {
        let graph = row_of_three();
        let mut resolver = PositionResolver::new();
        let mut state = vehicle();
        located(
            &mut state,
            Position {
                piece: pid(1),
                previous: None,
                arrival: Some(Direction::Left),
                lane: 1,
                carried_lane: 1,
                lane_before_junction: None,
            },
        );
        report(&mut state, 2);
        read(&mut state, 7); // lane 2

        let outcome = resolver
            .resolve(&mut state, &graph, &SchematicAtlas::default())
            .unwrap();
        assert!(matches!(outcome, Resolution::Moved { position, .. } if position.lane == 2));
    }

    #[test]
    fn test_junction_entry_remaps_lane() {
        // Straight 40 left of junction 41 (R0, 6 drawable lanes, split 4).
        let graph = TopologyGraph::build(
            &[
                place(40, TrackType::Straight, Rotation::R0, 4),
                place(41, TrackType::Junction, Rotation::R0, 6),
            ],
            2,
        );
        let mut resolver = PositionResolver::new();
        let mut state = vehicle();
        located(
            &mut state,
            Position {
                piece: pid(40),
                previous: None,
                arrival: Some(Direction::Left),
                lane: 1,
                carried_lane: 1,
                lane_before_junction: None,
            },
        );
        report(&mut state, 41);

        let outcome = resolver
            .resolve(&mut state, &graph, &SchematicAtlas::default())
            .unwrap();
        let Resolution::Moved { position, .. } = outcome else {
            panic!("expected a move, got {:?}", outcome);
        };
        // x[1] = 4 + 1: lane 1 continues on the first straight lane.
        assert_eq!(position.lane, 5);
        assert_eq!(position.lane_before_junction, Some(1));
        assert_eq!(position.carried_lane, 1);
    }

    #[test]
    fn test_junction_tables_cover_twelve_cases() {
        let rotations = [Rotation::R0, Rotation::R1, Rotation::R2, Rotation::R3];
        let exits: usize = rotations
            .iter()
            .flat_map(|&r| Direction::ALL.into_iter().map(move |d| junction_exits(r, d)))
            .filter(Option::is_some)
            .count();
        let arms: usize = rotations
            .iter()
            .flat_map(|&r| Direction::ALL.into_iter().map(move |d| junction_entry_arm(r, d)))
            .filter(Option::is_some)
            .count();
        assert_eq!(exits, 12);
        assert_eq!(arms, 12);

        // Every exit leaves through a side of the same triple.
        for r in rotations {
            for d in Direction::ALL {
                if let Some((upper, lower)) = junction_exits(r, d) {
                    assert!(junction_exits(r, upper).is_some(), "{:?} {:?}", r, upper);
                    assert!(junction_exits(r, lower).is_some(), "{:?} {:?}", r, lower);
                    assert_ne!(upper, d);
                    assert_ne!(lower, d);
                }
            }
        }
    }

    #[test]
    fn test_junction_exit_table_values() {
        use Direction::{Left, Right, Under, Upper};
        use Rotation::{R0, R1, R2, R3};
        let expected = [
            (R0, Left, (Upper, Right)),
            (R0, Right, (Upper, Left)),
            (R0, Upper, (Left, Right)),
            (R1, Upper, (Left, Under)),
            (R1, Under, (Left, Upper)),
            (R1, Left, (Upper, Under)),
            (R2, Left, (Right, Under)),
            (R2, Right, (Left, Under)),
            (R2, Under, (Left, Right)),
            (R3, Upper, (Under, Right)),
            (R3, Under, (Upper, Right)),
            (R3, Right, (Upper, Under)),
        ];
        for (rotation, arrival, exits) in expected {
            assert_eq!(
                junction_exits(rotation, arrival),
                Some(exits),
                "{:?} from {:?}",
                rotation,
                arrival
            );
        }
    }

    #[test]
    fn test_junction_entry_arm_table_values() {
        use Direction::{Left, Right, Under, Upper};
        use JunctionArm::{X, Y, Z};
        use Rotation::{R0, R1, R2, R3};
        let expected = [
            (R0, Left, X, false),
            (R0, Upper, Y, false),
            (R0, Right, Z, false),
            (R1, Left, Y, true),
            (R1, Upper, Z, false),
            (R1, Under, X, false),
            (R2, Under, Y, false),
            (R2, Left, X, true),
            (R2, Right, Z, true),
            (R3, Right, Y, true),
            (R3, Upper, Z, true),
            (R3, Under, X, true),
        ];
        for (rotation, arrival, arm, mirror) in expected {
            assert_eq!(
                junction_entry_arm(rotation, arrival),
                Some((arm, mirror)),
                "{:?} from {:?}",
                rotation,
                arrival
            );
        }
    }

    /// Straight 40 feeds junction 41 (R0, split 4) from the left; 42 sits on
    /// its right and 43 above it.
    fn junction_crossing() -> TopologyGraph {
        TopologyGraph::build(
            &[
                None,
                place(43, TrackType::Straight, Rotation::R3, 4),
                None,
                place(40, TrackType::Straight, Rotation::R0, 4),
                place(41, TrackType::Junction, Rotation::R0, 6),
                place(42, TrackType::Straight, Rotation::R0, 4),
            ],
            3,
        )
    }

    /// Drives straight 40 -> junction 41 -> (unreported exit) and returns the
    /// junction position and the piece after it.
    fn cross_junction(lane: u32) -> (Position, Position) {
        let graph = junction_crossing();
        let atlas = SchematicAtlas::default();
        let mut resolver = PositionResolver::new();
        let mut state = vehicle();
        located(
            &mut state,
            Position {
                piece: pid(40),
                previous: None,
                arrival: Some(Direction::Left),
                lane,
                carried_lane: lane,
                lane_before_junction: None,
            },
        );

        report(&mut state, 41);
        let Ok(Resolution::Moved { position: on_junction, corrected: false }) =
            resolver.resolve(&mut state, &graph, &atlas)
        else {
            panic!("expected to enter the junction");
        };

        // The exit is never reported.
        let Ok(Resolution::Moved { position: after, corrected: true }) =
            resolver.resolve(&mut state, &graph, &atlas)
        else {
            panic!("expected a corrected exit");
        };
        (on_junction, after)
    }

    #[test]
    fn test_junction_crossing_lower_half_continues_straight() {
        let (on_junction, after) = cross_junction(1);
        // x[1] = 4 + 1
        assert_eq!(on_junction.lane, 5);
        assert_eq!(on_junction.lane_before_junction, Some(1));
        assert_eq!(on_junction.carried_lane, 1);

        assert_eq!(after.piece, pid(42));
        assert_eq!(after.previous, Some(pid(41)));
        assert_eq!(after.arrival, Some(Direction::Left));
        assert_eq!(after.lane, 1);
    }

    #[test]
    fn test_junction_crossing_upper_half_takes_branch() {
        let (on_junction, after) = cross_junction(3);
        // x[3] = 3 - 2: the first arc lane
        assert_eq!(on_junction.lane, 1);
        assert_eq!(on_junction.lane_before_junction, Some(3));
        assert_eq!(on_junction.carried_lane, 3);

        assert_eq!(after.piece, pid(43));
        assert_eq!(after.previous, Some(pid(41)));
        assert_eq!(after.arrival, Some(Direction::Under));
        assert_eq!(after.lane, 3);
    }

    #[test]
    fn test_curve_exit_pairs_are_bidirectional() {
        for r in [Rotation::R0, Rotation::R1, Rotation::R2, Rotation::R3] {
            let paired: Vec<Direction> =
                Direction::ALL.into_iter().filter(|&d| curve_exit(r, d).is_some()).collect();
            assert_eq!(paired.len(), 2);
            for d in paired {
                let exit = curve_exit(r, d).unwrap();
                assert_eq!(curve_exit(r, exit), Some(d));
            }
        }
    }

    proptest! {
        #[test]
        fn prop_correction_is_deterministic(
            lane in 1u32..=4,
            before in 1u32..=4,
            arrival_idx in 0usize..4,
            rotation in 0u32..4,
        ) {
            // Junction in the middle of a plus-shaped layout.
            let rotation = Rotation::from_quarter_turns(rotation);
            let graph = TopologyGraph::build(
                &[
                    None,
                    place(2, TrackType::Straight, Rotation::R3, 4),
                    None,
                    place(4, TrackType::Straight, Rotation::R0, 4),
                    place(5, TrackType::Junction, rotation, 6),
                    place(6, TrackType::Straight, Rotation::R0, 4),
                    None,
                    place(8, TrackType::Straight, Rotation::R3, 4),
                    None,
                ],
                3,
            );
            let arrival = Direction::ALL[arrival_idx];
            let start = Position {
                piece: pid(5),
                previous: graph.neighbor(pid(5), arrival).map(|n| n.piece),
                arrival: Some(arrival),
                lane,
                carried_lane: before,
                lane_before_junction: Some(before),
            };
            let atlas = SchematicAtlas::default();

            let run = || {
                let mut resolver = PositionResolver::new();
                let mut state = vehicle();
                state.locate(start);
                let outcome = resolver.resolve(&mut state, &graph, &atlas);
                (outcome, state)
            };
            let (first, first_state) = run();
            let (second, second_state) = run();
            prop_assert_eq!(first, second);
            prop_assert_eq!(first_state, second_state);
        }
    }
}
