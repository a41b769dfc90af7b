//! The "TOPOLOGY" Layer - Grid Adjacency of Placed Track Pieces
//!
//! A layout is a row-major grid of slots, each either empty or holding one
//! placed piece. The graph links every occupied slot to its occupied
//! neighbors in the four grid directions:
//! - LEFT / RIGHT within the same row
//! - UPPER / UNDER within the same column
//!
//! Adjacency ignores piece geometry on purpose; whether a vehicle can
//! actually leave a piece through a given side is decided by the resolver.
//! The graph is frozen after [`TopologyGraph::build`] and is replaced
//! wholesale when the layout changes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use trackview_env::PieceId;

// ============================================================================
// DIRECTIONS & PIECE KINDS
// ============================================================================

/// One of the four grid-adjacency sides of a piece.
///
/// Also used as "the side a vehicle entered through" and "the side it exits
/// through".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
    Upper,
    Under,
}

impl Direction {
    /// All four directions in slot order.
    pub const ALL: [Direction; 4] = [Self::Left, Self::Right, Self::Upper, Self::Under];

    /// The mirrored side (LEFT↔RIGHT, UPPER↔UNDER).
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::Upper => Self::Under,
            Self::Under => Self::Upper,
        }
    }

    /// True for UPPER and UNDER.
    pub fn is_vertical(self) -> bool {
        matches!(self, Self::Upper | Self::Under)
    }

    fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
            Self::Upper => 2,
            Self::Under => 3,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Upper => "UPPER",
            Self::Under => "UNDER",
        };
        f.write_str(name)
    }
}

/// Geometric kind of a track piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackType {
    Straight,
    Curve,
    Junction,
    Intersection,
    ToTheMiddle,
}

impl TrackType {
    /// Pieces on which a vehicle can establish its first fix.
    pub fn supports_priming(self) -> bool {
        matches!(self, Self::Straight | Self::ToTheMiddle)
    }
}

/// Rotation of a placed piece in 90° steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    R0,
    R1,
    R2,
    R3,
}

impl Rotation {
    /// Builds a rotation from a number of quarter turns (taken modulo 4).
    pub fn from_quarter_turns(turns: u32) -> Self {
        match turns % 4 {
            0 => Self::R0,
            1 => Self::R1,
            2 => Self::R2,
            _ => Self::R3,
        }
    }

    /// Number of quarter turns in `0..4`.
    pub fn quarter_turns(self) -> u32 {
        match self {
            Self::R0 => 0,
            Self::R1 => 1,
            Self::R2 => 2,
            Self::R3 => 3,
        }
    }
}

// ============================================================================
// GRID SNAPSHOT (Input)
// ============================================================================

/// What the layout editor placed in one occupied slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiecePlacement {
    pub id: PieceId,
    pub track_type: TrackType,
    pub rotation: Rotation,
    /// Number of drawable lanes declared by the piece (1.5·L for junctions,
    /// 2·L for intersections)
    pub lane_count: u32,
}

impl PiecePlacement {
    pub fn new(id: PieceId, track_type: TrackType, rotation: Rotation, lane_count: u32) -> Self {
        Self {
            id,
            track_type,
            rotation,
            lane_count,
        }
    }
}

/// A full layout as handed over by the editor: row-major slots plus the
/// column count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub columns: usize,
    pub slots: Vec<Option<PiecePlacement>>,
}

impl GridSnapshot {
    pub fn new(columns: usize, slots: Vec<Option<PiecePlacement>>) -> Self {
        Self { columns, slots }
    }
}

// ============================================================================
// TRACK PIECE (Frozen Node)
// ============================================================================

/// A link from one piece to a grid neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbor {
    /// The adjacent piece
    pub piece: PieceId,
    /// The side through which the neighbor refers back
    pub back: Direction,
}

/// A placed piece with its frozen neighbor map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPiece {
    pub id: PieceId,
    pub track_type: TrackType,
    pub rotation: Rotation,
    pub lane_count: u32,
    /// Row-major slot index in the source grid
    pub slot: usize,
    neighbors: [Option<Neighbor>; 4],
}

impl TrackPiece {
    fn from_placement(placement: &PiecePlacement, slot: usize) -> Self {
        Self {
            id: placement.id,
            track_type: placement.track_type,
            rotation: placement.rotation,
            lane_count: placement.lane_count,
            slot,
            neighbors: [None; 4],
        }
    }

    /// Returns the neighbor on the given side, if that slot is occupied.
    pub fn neighbor(&self, direction: Direction) -> Option<Neighbor> {
        self.neighbors[direction.index()]
    }

    /// Iterates over all linked sides.
    pub fn neighbors(&self) -> impl Iterator<Item = (Direction, Neighbor)> + '_ {
        Direction::ALL
            .into_iter()
            .filter_map(|d| self.neighbor(d).map(|n| (d, n)))
    }

    /// Returns the side of this piece that touches `other`.
    pub fn direction_to(&self, other: PieceId) -> Option<Direction> {
        self.neighbors()
            .find(|(_, n)| n.piece == other)
            .map(|(d, _)| d)
    }

    /// Lanes on one arm of a junction: `total - total/3`.
    pub fn split_lanes(&self) -> u32 {
        self.lane_count - self.lane_count / 3
    }

    /// Lanes per axis of an intersection: `total / 2`.
    pub fn half_lanes(&self) -> u32 {
        self.lane_count / 2
    }
}

// ============================================================================
// TOPOLOGY GRAPH
// ============================================================================

/// Adjacency between all placed pieces of one layout.
///
/// Invariant: if piece A links to B through side `d`, B links to A through
/// `d.opposite()`.
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    pieces: HashMap<PieceId, TrackPiece>,
    columns: usize,
    slots: usize,
}

impl TopologyGraph {
    /// Builds the graph from a row-major slot sequence.
    ///
    /// Never fails: sparse boards simply produce fewer links. A piece id
    /// that appears twice keeps its first slot; later duplicates are
    /// treated as empty so adjacency stays symmetric.
    pub fn build(slots: &[Option<PiecePlacement>], columns: usize) -> Self {
        let mut pieces: HashMap<PieceId, TrackPiece> = HashMap::new();
        let mut occupant: Vec<Option<PieceId>> = vec![None; slots.len()];

        for (i, slot) in slots.iter().enumerate() {
            let Some(placement) = slot else { continue };
            if pieces.contains_key(&placement.id) {
                tracing::warn!("Duplicate piece id {} in slot {}; slot ignored", placement.id, i);
                continue;
            }
            pieces.insert(placement.id, TrackPiece::from_placement(placement, i));
            occupant[i] = Some(placement.id);
        }

        if columns > 0 {
            for (i, id) in occupant.iter().enumerate() {
                let Some(id) = id else { continue };
                let candidates = [
                    (Direction::Left, (i % columns != 0).then(|| i - 1)),
                    (Direction::Right, (i % columns != columns - 1).then_some(i + 1)),
                    (Direction::Upper, i.checked_sub(columns)),
                    (Direction::Under, Some(i + columns)),
                ];
                for (direction, target) in candidates {
                    let Some(other) = target.and_then(|t| occupant.get(t).copied().flatten()) else {
                        continue;
                    };
                    if let Some(piece) = pieces.get_mut(id) {
                        piece.neighbors[direction.index()] = Some(Neighbor {
                            piece: other,
                            back: direction.opposite(),
                        });
                    }
                }
            }
        }

        tracing::debug!(
            "Built topology: {} pieces over {} slots ({} columns)",
            pieces.len(),
            slots.len(),
            columns
        );

        Self {
            pieces,
            columns,
            slots: slots.len(),
        }
    }

    /// Builds the graph from a snapshot.
    pub fn from_snapshot(snapshot: &GridSnapshot) -> Self {
        Self::build(&snapshot.slots, snapshot.columns)
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    /// Looks up a piece by id.
    pub fn piece(&self, id: PieceId) -> Option<&TrackPiece> {
        self.pieces.get(&id)
    }

    /// Returns true if the piece is part of this layout.
    pub fn contains(&self, id: PieceId) -> bool {
        self.pieces.contains_key(&id)
    }

    /// Neighbor of `id` on side `direction`.
    pub fn neighbor(&self, id: PieceId, direction: Direction) -> Option<Neighbor> {
        self.pieces.get(&id).and_then(|p| p.neighbor(direction))
    }

    /// Iterates over all pieces in unspecified order.
    pub fn pieces(&self) -> impl Iterator<Item = &TrackPiece> {
        self.pieces.values()
    }

    /// Number of placed pieces.
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Number of slots (occupied or not) in the source grid.
    pub fn slot_count(&self) -> usize {
        self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pid(raw: u8) -> PieceId {
        PieceId::new(raw).unwrap()
    }

    fn straight(raw: u8) -> Option<PiecePlacement> {
        Some(PiecePlacement::new(pid(raw), TrackType::Straight, Rotation::R0, 2))
    }

    #[test]
    fn test_row_of_three_links_left_and_right() {
        let graph = TopologyGraph::build(&[straight(1), straight(2), straight(3)], 3);

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.neighbor(pid(2), Direction::Left).map(|n| n.piece), Some(pid(1)));
        assert_eq!(graph.neighbor(pid(2), Direction::Right).map(|n| n.piece), Some(pid(3)));
        assert!(graph.neighbor(pid(1), Direction::Left).is_none());
        assert!(graph.neighbor(pid(3), Direction::Right).is_none());
        assert!(graph.neighbor(pid(2), Direction::Upper).is_none());
        assert_eq!(
            graph.neighbor(pid(3), Direction::Left),
            Some(Neighbor { piece: pid(2), back: Direction::Right })
        );
    }

    #[test]
    fn test_no_wrap_between_rows() {
        // 2 columns: slot 1 ends row 0, slot 2 starts row 1
        let graph = TopologyGraph::build(&[straight(1), straight(2), straight(3), straight(4)], 2);

        assert!(graph.neighbor(pid(2), Direction::Right).is_none());
        assert!(graph.neighbor(pid(3), Direction::Left).is_none());
        assert_eq!(graph.neighbor(pid(1), Direction::Under).map(|n| n.piece), Some(pid(3)));
        assert_eq!(graph.neighbor(pid(4), Direction::Upper).map(|n| n.piece), Some(pid(2)));
    }

    #[test]
    fn test_empty_slots_are_not_linked() {
        let graph = TopologyGraph::build(&[straight(1), None, straight(3)], 3);

        assert_eq!(graph.len(), 2);
        assert!(graph.neighbor(pid(1), Direction::Right).is_none());
        assert!(graph.neighbor(pid(3), Direction::Left).is_none());
        assert_eq!(graph.slot_count(), 3);
    }

    #[test]
    fn test_duplicate_ids_keep_first_slot() {
        let graph = TopologyGraph::build(&[straight(1), straight(2), straight(1)], 3);

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.piece(pid(1)).map(|p| p.slot), Some(0));
        assert!(graph.neighbor(pid(2), Direction::Right).is_none());
    }

    #[test]
    fn test_direction_to() {
        let graph = TopologyGraph::build(&[straight(1), straight(2), straight(3)], 3);
        let middle = graph.piece(pid(2)).unwrap();

        assert_eq!(middle.direction_to(pid(3)), Some(Direction::Right));
        assert_eq!(middle.direction_to(pid(1)), Some(Direction::Left));
        assert_eq!(middle.direction_to(pid(2)), None);
    }

    #[test]
    fn test_split_and_half_lanes() {
        let junction = PiecePlacement::new(pid(10), TrackType::Junction, Rotation::R0, 6);
        let crossing = PiecePlacement::new(pid(20), TrackType::Intersection, Rotation::R0, 4);
        let graph = TopologyGraph::build(&[Some(junction), Some(crossing)], 2);

        assert_eq!(graph.piece(pid(10)).unwrap().split_lanes(), 4);
        assert_eq!(graph.piece(pid(20)).unwrap().half_lanes(), 2);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let slots = [straight(1), None, straight(3), straight(4)];
        let a = TopologyGraph::build(&slots, 2);
        let b = TopologyGraph::build(&slots, 2);

        for piece in a.pieces() {
            assert_eq!(Some(piece), b.piece(piece.id));
        }
    }

    #[test]
    fn test_zero_columns_builds_unlinked_pieces() {
        let graph = TopologyGraph::build(&[straight(1), straight(2)], 0);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.pieces().map(|p| p.neighbors().count()).sum::<usize>(), 0);
    }

    fn grid_strategy() -> impl Strategy<Value = (usize, Vec<bool>)> {
        (1usize..7, 1usize..7).prop_flat_map(|(columns, rows)| {
            (Just(columns), proptest::collection::vec(any::<bool>(), columns * rows))
        })
    }

    proptest! {
        #[test]
        fn prop_adjacency_is_symmetric((columns, occupied) in grid_strategy()) {
            let slots: Vec<Option<PiecePlacement>> = occupied
                .iter()
                .enumerate()
                .map(|(i, &occ)| occ.then(|| {
                    PiecePlacement::new(pid(i as u8 + 1), TrackType::Straight, Rotation::R0, 2)
                }))
                .collect();
            let graph = TopologyGraph::build(&slots, columns);

            for piece in graph.pieces() {
                for (direction, neighbor) in piece.neighbors() {
                    prop_assert_eq!(neighbor.back, direction.opposite());
                    let back = graph.neighbor(neighbor.piece, neighbor.back);
                    prop_assert_eq!(back.map(|n| n.piece), Some(piece.id));
                }
            }
        }
    }
}
