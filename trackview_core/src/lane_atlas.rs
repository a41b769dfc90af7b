//! Lane geometry boundary.
//!
//! The drawn geometry of every piece belongs to the renderer. The engine
//! only needs three answers from it, collected in the [`LaneAtlas`] trait:
//! which lane a raw sub-location id belongs to, and the identity and length
//! of a lane's drawable path. [`SchematicAtlas`] answers them from a simple
//! tile model and is what the simulator and tests run against.

use crate::track_topology::{TrackPiece, TrackType};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use trackview_env::LocationId;

/// A lane's drawable path as known to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanePath {
    /// Renderer-side identity of the path (e.g. `trackId7Lane3`)
    pub path_ref: String,
    /// Geometric length in drawing units
    pub length: f64,
}

/// Geometry queries the resolver and emitter depend on.
pub trait LaneAtlas: Send + Sync {
    /// Lane of `piece` that carries the sub-location id, if any.
    fn lane_of(&self, piece: &TrackPiece, location: LocationId) -> Option<u32>;

    /// Drawable path of `lane` on `piece`, if the lane exists.
    fn path(&self, piece: &TrackPiece, lane: u32) -> Option<LanePath>;
}

// ============================================================================
// SCHEMATIC ATLAS
// ============================================================================

/// Configuration for the [`SchematicAtlas`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtlasConfig {
    /// Edge length of one square tile (default: 100.0)
    pub tile_size: f64,

    /// Distance between two adjacent lanes (default: 10.0)
    pub lane_spacing: f64,

    /// Radius of the innermost curve lane minus one spacing (default: 10.0)
    pub inner_radius: f64,

    /// Sub-location ids printed along each lane (default: 4)
    pub locations_per_lane: u32,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            tile_size: 100.0,
            lane_spacing: 10.0,
            inner_radius: 10.0,
            locations_per_lane: 4,
        }
    }
}

/// Tile-model geometry.
///
/// Location ids are numbered consecutively lane by lane, in the canonical
/// direction of travel: lane `k` carries ids
/// `(k-1)·n + 1 ..= k·n` for `n = locations_per_lane`.
#[derive(Debug, Clone, Default)]
pub struct SchematicAtlas {
    config: AtlasConfig,
}

impl SchematicAtlas {
    pub fn new(config: AtlasConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    /// All location ids of `lane`, in canonical travel order.
    pub fn locations(&self, lane: u32) -> Vec<LocationId> {
        let per_lane = self.config.locations_per_lane;
        if lane == 0 || per_lane == 0 {
            return Vec::new();
        }
        let first = (lane - 1) * per_lane + 1;
        (first..first + per_lane).map(LocationId).collect()
    }

    fn arc(&self, lane: u32) -> f64 {
        FRAC_PI_2 * (self.config.inner_radius + lane as f64 * self.config.lane_spacing)
    }
}

impl LaneAtlas for SchematicAtlas {
    fn lane_of(&self, piece: &TrackPiece, location: LocationId) -> Option<u32> {
        let per_lane = self.config.locations_per_lane;
        if location.0 == 0 || per_lane == 0 {
            return None;
        }
        let lane = (location.0 - 1) / per_lane + 1;
        (lane <= piece.lane_count).then_some(lane)
    }

    fn path(&self, piece: &TrackPiece, lane: u32) -> Option<LanePath> {
        if lane == 0 || lane > piece.lane_count {
            return None;
        }
        let tile = self.config.tile_size;
        let length = match piece.track_type {
            TrackType::Straight | TrackType::Intersection => tile,
            TrackType::ToTheMiddle => tile.hypot(self.config.lane_spacing),
            TrackType::Curve => self.arc(lane),
            TrackType::Junction if lane <= piece.split_lanes() => self.arc(lane),
            TrackType::Junction => tile,
        };
        Some(LanePath {
            path_ref: format!("trackId{}Lane{}", piece.id, lane),
            length,
        })
    }
}
