//! Canned layouts for the simulator.
//!
//! Every layout is a closed loop. Its route lists the pieces in driving
//! order, starting on a straight that is driven left to right, so a vehicle
//! primed there with increasing sub-locations arrives from the LEFT.
//!
//! Curve sides by rotation: R0 LEFT↔UPPER, R1 LEFT↔UNDER, R2 RIGHT↔UNDER,
//! R3 RIGHT↔UPPER.

use trackview_core::{GridSnapshot, PiecePlacement, Rotation, TrackType};
use trackview_env::PieceId;

/// Lanes on straights and curves. Intersections carry twice as many.
pub const LANES: u32 = 4;

type Cell = Option<(TrackType, Rotation)>;

const S: Cell = Some((TrackType::Straight, Rotation::R0));
const V: Cell = Some((TrackType::Straight, Rotation::R1));
const X: Cell = Some((TrackType::Intersection, Rotation::R0));
const C0: Cell = Some((TrackType::Curve, Rotation::R0));
const C1: Cell = Some((TrackType::Curve, Rotation::R1));
const C2: Cell = Some((TrackType::Curve, Rotation::R2));
const C3: Cell = Some((TrackType::Curve, Rotation::R3));

/// A layout together with the ground-truth way round it.
#[derive(Debug, Clone)]
pub struct SimLayout {
    pub name: &'static str,
    pub snapshot: GridSnapshot,

    /// Pieces in driving order; the last one leads back to the first
    pub route: Vec<PieceId>,

    /// Route offsets of straights driven left to right
    pub starts: Vec<usize>,
}

impl SimLayout {
    /// 2×4 ring: two straights on top, two below.
    pub fn oval() -> Self {
        #[rustfmt::skip]
        let cells = [
            C2, S, S, C1,
            C3, S, S, C0,
        ];
        Self::build("oval", 4, 1, &cells, &[1, 2, 3, 7, 6, 5, 4, 0], vec![0, 1])
    }

    /// 3×5 ring with vertical straights on both ends.
    pub fn long_oval() -> Self {
        #[rustfmt::skip]
        let cells = [
            C2, S,    S,    S,    C1,
            V,  None, None, None, V,
            C3, S,    S,    S,    C0,
        ];
        Self::build(
            "long_oval",
            5,
            21,
            &cells,
            &[1, 2, 3, 4, 9, 14, 13, 12, 11, 10, 5, 0],
            vec![0, 1, 2],
        )
    }

    /// Two loops crossing at one intersection, driven through twice per lap.
    pub fn figure_eight() -> Self {
        #[rustfmt::skip]
        let cells = [
            None, C2, S,    C1,
            C2,   X,  S,    C0,
            C3,   C0, None, None,
        ];
        Self::build(
            "figure_eight",
            4,
            41,
            &cells,
            &[6, 7, 3, 2, 1, 5, 9, 8, 4, 5],
            vec![0],
        )
    }

    /// Looks a layout up by name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "oval" => Some(Self::oval()),
            "long_oval" => Some(Self::long_oval()),
            "figure_eight" => Some(Self::figure_eight()),
            _ => None,
        }
    }

    /// Piece `offset` steps along the route, wrapping around.
    pub fn piece_at(&self, offset: usize) -> Option<PieceId> {
        if self.route.is_empty() {
            return None;
        }
        self.route.get(offset % self.route.len()).copied()
    }

    /// Assigns consecutive ids from `first_id` to the occupied cells in
    /// row-major order and translates the slot route into piece ids.
    fn build(
        name: &'static str,
        columns: usize,
        first_id: u8,
        cells: &[Cell],
        route_slots: &[usize],
        starts: Vec<usize>,
    ) -> Self {
        let mut next_id = first_id;
        let slots: Vec<Option<PiecePlacement>> = cells
            .iter()
            .map(|cell| {
                let (track_type, rotation) = (*cell)?;
                let id = PieceId::new(next_id)?;
                next_id = next_id.saturating_add(1);
                let lanes = match track_type {
                    TrackType::Intersection => 2 * LANES,
                    _ => LANES,
                };
                Some(PiecePlacement::new(id, track_type, rotation, lanes))
            })
            .collect();

        let route = route_slots
            .iter()
            .filter_map(|&slot| slots.get(slot).and_then(|p| p.as_ref()).map(|p| p.id))
            .collect();

        Self {
            name,
            snapshot: GridSnapshot::new(columns, slots),
            route,
            starts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackview_core::{Direction, TopologyGraph};

    fn all() -> Vec<SimLayout> {
        vec![SimLayout::oval(), SimLayout::long_oval(), SimLayout::figure_eight()]
    }

    #[test]
    fn test_routes_are_connected_loops() {
        for layout in all() {
            let graph = TopologyGraph::from_snapshot(&layout.snapshot);
            assert!(!layout.route.is_empty(), "{}", layout.name);
            for (i, &piece) in layout.route.iter().enumerate() {
                let next = layout.piece_at(i + 1).unwrap();
                let piece = graph.piece(piece).unwrap();
                assert!(
                    piece.direction_to(next).is_some(),
                    "{}: {} is not adjacent to {}",
                    layout.name,
                    piece.id,
                    next
                );
            }
        }
    }

    #[test]
    fn test_starts_are_straights_driven_rightward() {
        for layout in all() {
            let graph = TopologyGraph::from_snapshot(&layout.snapshot);
            for &start in &layout.starts {
                let piece = graph.piece(layout.piece_at(start).unwrap()).unwrap();
                assert_eq!(piece.track_type, TrackType::Straight);
                let next = layout.piece_at(start + 1).unwrap();
                assert_eq!(piece.direction_to(next), Some(Direction::Right), "{}", layout.name);
            }
        }
    }

    #[test]
    fn test_figure_eight_crosses_twice() {
        let layout = SimLayout::figure_eight();
        let graph = TopologyGraph::from_snapshot(&layout.snapshot);
        let crossings = layout
            .route
            .iter()
            .filter(|&&id| graph.piece(id).unwrap().track_type == TrackType::Intersection)
            .count();
        assert_eq!(crossings, 2);
        assert_eq!(layout.route.len(), 10);
    }

    #[test]
    fn test_layout_ids_do_not_overlap() {
        let oval = SimLayout::oval();
        let long = SimLayout::long_oval();
        assert!(oval.route.iter().all(|id| !long.route.contains(id)));
        assert!(SimLayout::by_name("long_oval").is_some());
        assert!(SimLayout::by_name("spiral").is_none());
    }
}
