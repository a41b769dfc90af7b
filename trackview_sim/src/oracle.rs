//! Ground truth oracle for simulation.
//!
//! The Oracle knows where every simulated vehicle really is and produces the
//! telemetry the host would publish for it:
//! - Speed, piece and sub-location readings followed by a transition tick
//! - Lost piece reports (`piece_drop_rate`)
//! - Garbled extra messages that the engine must discard (`garble_rate`)
//!
//! All randomness comes from one seeded [`ChaCha8Rng`].

use crate::layouts::{SimLayout, LANES};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Bernoulli, Distribution, Normal};
use serde::{Deserialize, Serialize};
use trackview_core::SchematicAtlas;
use trackview_env::{PieceId, TelemetryEvent, TelemetryMessage, VehicleId, CAR_TOPIC_PREFIX};

/// Configuration for the [`Oracle`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Probability that a piece change goes unreported (default: 0.0)
    pub piece_drop_rate: f64,

    /// Probability of a garbled message before each tick (default: 0.0)
    pub garble_rate: f64,

    /// Mean vehicle speed (default: 600)
    pub mean_speed: f64,

    /// Standard deviation of vehicle speed (default: 120)
    pub speed_std_dev: f64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            piece_drop_rate: 0.0,
            garble_rate: 0.0,
            mean_speed: 600.0,
            speed_std_dev: 120.0,
        }
    }
}

/// Where a simulated vehicle really is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthVehicle {
    pub id: VehicleId,

    /// Position along the layout route
    pub offset: usize,

    /// Lane it was primed on
    pub lane: u32,

    pub speed: u32,
}

/// Telemetry for one transition of one vehicle.
#[derive(Debug, Clone)]
pub struct Step {
    pub vehicle: VehicleId,

    /// Messages in publish order; the transition tick comes last
    pub messages: Vec<TelemetryMessage>,

    /// Piece the vehicle is on once the tick is processed
    pub truth: PieceId,

    /// The piece change was not reported
    pub dropped_piece: bool,

    /// Garbled messages mixed into `messages`
    pub garbled: u64,
}

/// Counters kept by the oracle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleStats {
    pub steps: u64,
    pub pieces_dropped: u64,
    pub garbled: u64,
}

/// The "God's eye view" of the simulated track.
pub struct Oracle {
    rng: ChaCha8Rng,
    config: OracleConfig,
    layout: SimLayout,
    atlas: SchematicAtlas,
    vehicles: Vec<GroundTruthVehicle>,
    stats: OracleStats,
}

impl Oracle {
    /// Creates an oracle over `layout` with the given seed.
    pub fn new(seed: u64, layout: SimLayout, config: OracleConfig) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            config,
            layout,
            atlas: SchematicAtlas::default(),
            vehicles: Vec::new(),
            stats: OracleStats::default(),
        }
    }

    /// Places a vehicle on the layout's `start`-th start straight.
    ///
    /// Returns the vehicle's index. Lane and speed are drawn from the seed.
    pub fn spawn(&mut self, id: VehicleId, start: usize) -> usize {
        let offset = self.start_offset(start);
        let lane = self.rng.gen_range(1..=LANES);
        let speed = self.draw_speed();
        tracing::debug!(
            "Spawned {} at route offset {} (lane {}, speed {})",
            id,
            offset,
            lane,
            speed
        );
        self.vehicles.push(GroundTruthVehicle { id, offset, lane, speed });
        self.vehicles.len() - 1
    }

    /// Swaps in a new layout and moves every vehicle to a start straight.
    pub fn load_layout(&mut self, layout: SimLayout) {
        self.layout = layout;
        for i in 0..self.vehicles.len() {
            let offset = self.start_offset(i);
            self.vehicles[i].offset = offset;
        }
        tracing::debug!("Oracle switched to layout {}", self.layout.name);
    }

    /// Telemetry that lets the engine establish a first fix: speed, the
    /// current piece, two increasing sub-locations, then a tick.
    pub fn prime(&mut self, index: usize) -> Option<Step> {
        let vehicle = self.vehicles.get(index)?.clone();
        let piece = self.layout.piece_at(vehicle.offset)?;
        let locations = self.atlas.locations(vehicle.lane);

        let mut events = vec![
            TelemetryEvent::SpeedChanged { vehicle: vehicle.id.clone(), speed: vehicle.speed },
            TelemetryEvent::PieceChanged { vehicle: vehicle.id.clone(), piece },
        ];
        events.extend(locations.iter().take(2).map(|&location| TelemetryEvent::SubLocationChanged {
            vehicle: vehicle.id.clone(),
            location,
        }));
        events.push(self.tick(&vehicle));

        self.stats.steps += 1;
        Some(Step {
            vehicle: vehicle.id,
            messages: events.iter().map(TelemetryEvent::to_message).collect(),
            truth: piece,
            dropped_piece: false,
            garbled: 0,
        })
    }

    /// Moves a vehicle onto the next piece of its route.
    pub fn advance(&mut self, index: usize) -> Option<Step> {
        let route_len = self.layout.route.len();
        let vehicle = self.vehicles.get_mut(index)?;
        vehicle.offset = (vehicle.offset + 1) % route_len.max(1);
        let vehicle = vehicle.clone();
        let piece = self.layout.piece_at(vehicle.offset)?;

        let mut messages = Vec::new();
        let dropped_piece = self.chance(self.config.piece_drop_rate);
        if dropped_piece {
            self.stats.pieces_dropped += 1;
        } else {
            let event = TelemetryEvent::PieceChanged { vehicle: vehicle.id.clone(), piece };
            messages.push(event.to_message());
        }

        let mut garbled = 0;
        if self.chance(self.config.garble_rate) {
            messages.push(self.garbage(&vehicle.id));
            garbled += 1;
            self.stats.garbled += 1;
        }

        messages.push(self.tick(&vehicle).to_message());
        self.stats.steps += 1;

        Some(Step {
            vehicle: vehicle.id,
            messages,
            truth: piece,
            dropped_piece,
            garbled,
        })
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    /// Piece the vehicle is really on.
    pub fn truth(&self, index: usize) -> Option<PieceId> {
        let vehicle = self.vehicles.get(index)?;
        self.layout.piece_at(vehicle.offset)
    }

    pub fn vehicles(&self) -> &[GroundTruthVehicle] {
        &self.vehicles
    }

    pub fn layout(&self) -> &SimLayout {
        &self.layout
    }

    pub fn stats(&self) -> &OracleStats {
        &self.stats
    }

    // ========================================================================
    // GENERATION
    // ========================================================================

    fn start_offset(&self, start: usize) -> usize {
        match self.layout.starts.len() {
            0 => 0,
            n => self.layout.starts[start % n],
        }
    }

    fn draw_speed(&mut self) -> u32 {
        let speed = Normal::new(self.config.mean_speed, self.config.speed_std_dev)
            .map(|normal| normal.sample(&mut self.rng))
            .unwrap_or(self.config.mean_speed);
        speed.clamp(300.0, 1000.0).round() as u32
    }

    fn chance(&mut self, p: f64) -> bool {
        Bernoulli::new(p.clamp(0.0, 1.0))
            .map(|coin| coin.sample(&mut self.rng))
            .unwrap_or(false)
    }

    fn tick(&self, vehicle: &GroundTruthVehicle) -> TelemetryEvent {
        // Lanes are roughly 10 units apart around the road center.
        let lateral_offset = (vehicle.lane as f64 - (LANES as f64 + 1.0) / 2.0) * 10.0;
        TelemetryEvent::TransitionTick { vehicle: vehicle.id.clone(), lateral_offset }
    }

    /// A message the host could plausibly send but the engine cannot use.
    fn garbage(&mut self, vehicle: &VehicleId) -> TelemetryMessage {
        let base = format!("{}{}/E/", CAR_TOPIC_PREFIX, vehicle);
        match self.rng.gen_range(0..4) {
            0 => TelemetryMessage::new(format!("{base}track_piece_id"), "{\"value\": 1"),
            1 => TelemetryMessage::new(format!("{base}track_location_id"), r#"{"value": "n/a"}"#),
            2 => TelemetryMessage::new(format!("{base}speed"), r#"{"value": -40}"#),
            _ => TelemetryMessage::new(format!("{base}battery_level"), r#"{"value": 87}"#),
        }
    }
}
