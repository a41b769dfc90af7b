//! Lane correspondence across junction arms.
//!
//! A junction with `L` split lanes per arm continues a lane index from one
//! arm onto another through one of three tables:
//!
//! ```text
//!            i <= L/2       i > L/2
//!   x[i]     L + i          i - L/2
//!   y[i]     L + 1 - i      i - L/2
//!   z[i]     L + i          i
//! ```
//!
//! Outputs above `L` are the junction's straight lanes; outputs in `1..=L`
//! are its arc lanes.

use serde::{Deserialize, Serialize};

/// One of the three correspondence tables of a junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JunctionArm {
    X,
    Y,
    Z,
}

/// Mirrors a lane index across a piece: `total + 1 - lane`.
///
/// An involution for every `lane` in `1..=total`.
pub fn revert_lane(lane: u32, total: u32) -> u32 {
    (total + 1).saturating_sub(lane)
}

/// The three arm tables for one split-lane count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JunctionLaneMap {
    lanes: u32,
    x: Vec<u32>,
    y: Vec<u32>,
    z: Vec<u32>,
}

impl JunctionLaneMap {
    /// Derives the tables for `lanes` split lanes.
    pub fn for_lane_count(lanes: u32) -> Self {
        let half = lanes / 2;
        let mut x = Vec::with_capacity(lanes as usize);
        let mut y = Vec::with_capacity(lanes as usize);
        let mut z = Vec::with_capacity(lanes as usize);

        for i in 1..=lanes {
            if i <= half {
                x.push(lanes + i);
                y.push(lanes + 1 - i);
                z.push(lanes + i);
            } else {
                x.push(i - half);
                y.push(i - half);
                z.push(i);
            }
        }

        Self { lanes, x, y, z }
    }

    /// The split-lane count these tables were built for.
    pub fn lanes(&self) -> u32 {
        self.lanes
    }

    /// Continues `lane` through the given arm table.
    ///
    /// Returns `None` for lanes outside `1..=lanes`.
    pub fn map(&self, arm: JunctionArm, lane: u32) -> Option<u32> {
        let table = match arm {
            JunctionArm::X => &self.x,
            JunctionArm::Y => &self.y,
            JunctionArm::Z => &self.z,
        };
        lane.checked_sub(1)
            .and_then(|i| table.get(i as usize))
            .copied()
    }
}

/// Holds the most recently derived [`JunctionLaneMap`] and rebuilds it only
/// when the requested lane count changes.
#[derive(Debug, Clone, Default)]
pub struct JunctionLaneCache {
    current: Option<JunctionLaneMap>,
    rebuilds: u64,
}

impl JunctionLaneCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the tables for `lanes`, deriving them if the cached ones were
    /// built for a different count.
    pub fn get(&mut self, lanes: u32) -> &JunctionLaneMap {
        let stale = self.current.as_ref().map_or(true, |m| m.lanes != lanes);
        if stale {
            self.rebuilds += 1;
            tracing::trace!("Deriving junction lane tables for {} lanes", lanes);
            self.current = Some(JunctionLaneMap::for_lane_count(lanes));
        }
        self.current
            .get_or_insert_with(|| JunctionLaneMap::for_lane_count(lanes))
    }

    /// How many times the tables were derived.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }
}
