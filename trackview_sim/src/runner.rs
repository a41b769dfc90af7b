//! Scenario runner - drives oracle telemetry through the tracking engine.
//!
//! Every transition tick is checked against ground truth: the engine must
//! emit a segment on the piece the vehicle really entered, stamped with the
//! current layout id.

use crate::exporter::{SimExport, SimFrame};
use crate::layouts::SimLayout;
use crate::oracle::{Oracle, OracleConfig, Step};
use crate::scenarios::ScenarioId;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use trackview_core::agent_runtime::{AgentConfig, TrackingAgent};
use trackview_core::{TrackingEngine, TrackingOutput};
use trackview_env::{ChannelFeed, PieceId, TelemetryMessage, VehicleId};

const VEHICLE_NAMES: [&str; 3] = ["Skull", "Thermo", "Guardian"];

/// Probability of a garbled message per tick in `garbled_feed`.
const GARBLE_RATE: f64 = 0.5;

/// Buffer between the injector task and the agent in `live_feed`.
const FEED_CAPACITY: usize = 16;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total transition ticks executed
    pub total_ticks: u64,

    /// Vehicles known to the engine at the end
    pub final_vehicle_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// Messages handed to the engine
    pub messages_sent: u64,

    /// Piece changes the oracle left unreported
    pub pieces_dropped: u64,

    /// Garbled messages the oracle mixed in
    pub garbled_messages: u64,

    /// Messages the engine could not decode
    pub messages_discarded: u64,

    /// Piece changes the engine inferred
    pub corrections: u64,

    pub segments: u64,
    pub primings: u64,
    pub lost_cycles: u64,

    /// Ticks where the engine disagreed with ground truth
    pub mismatches: u64,

    pub layout_resets: u64,
}

/// Runs simulation scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Laps driven per layout
    laps: usize,

    /// Piece drop probability for lossy scenarios
    drop_rate: f64,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            laps: 3,
            drop_rate: 0.25,
        }
    }

    /// Sets the number of laps.
    pub fn with_laps(mut self, laps: usize) -> Self {
        self.laps = laps.max(1);
        self
    }

    /// Sets the piece drop probability used by lossy scenarios.
    pub fn with_drop_rate(mut self, rate: f64) -> Self {
        self.drop_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, None).0
    }

    /// Runs a scenario and records one frame per tick.
    pub fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        let export = SimExport::new(scenario.name(), self.seed);
        let (result, export) = self.execute(scenario, Some(export));
        let export = export.unwrap_or_else(|| SimExport::new(scenario.name(), self.seed));
        (result, export)
    }

    fn execute(
        &self,
        scenario: ScenarioId,
        export: Option<SimExport>,
    ) -> (ScenarioResult, Option<SimExport>) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let (result, export) = match scenario {
            ScenarioId::CleanLoop => self.run_clean_loop(export),
            ScenarioId::DroppedPieces => self.run_dropped_pieces(export),
            ScenarioId::FigureEight => self.run_figure_eight(export),
            ScenarioId::Convoy => self.run_convoy(export),
            ScenarioId::LayoutReset => self.run_layout_reset(export),
            ScenarioId::GarbledFeed => self.run_garbled_feed(export),
            ScenarioId::LiveFeed => self.run_live_feed(export),
        };

        info!(
            "{} complete: {} ticks, {} segments, {} corrections ({} dropped), {} mismatches",
            scenario.name(),
            result.total_ticks,
            result.metrics.segments,
            result.metrics.corrections,
            result.metrics.pieces_dropped,
            result.metrics.mismatches
        );

        let export = export.map(|mut export| {
            export.finalize(result.passed, result.failure_reason.clone());
            export
        });
        (result, export)
    }

    fn oracle_seed(&self) -> u64 {
        self.seed.wrapping_mul(0x9e3779b97f4a7c15)
    }

    fn oracle_config(&self, piece_drop_rate: f64, garble_rate: f64) -> OracleConfig {
        OracleConfig {
            piece_drop_rate,
            garble_rate,
            ..OracleConfig::default()
        }
    }

    /// Single vehicle, lossless feed: no corrections may happen.
    fn run_clean_loop(&self, export: Option<SimExport>) -> (ScenarioResult, Option<SimExport>) {
        let layout = SimLayout::oval();
        let ticks = self.laps * layout.route.len();
        let config = self.oracle_config(0.0, 0.0);
        let mut session = Session::new(self.oracle_seed(), layout, config, export);

        let vehicles = session.spawn(1);
        session.drive(&vehicles, ticks, None);

        session.finish(ScenarioId::CleanLoop, self.seed, |m| {
            (m.corrections > 0).then(|| format!("{} corrections on a lossless feed", m.corrections))
        })
    }

    fn run_dropped_pieces(&self, export: Option<SimExport>) -> (ScenarioResult, Option<SimExport>) {
        let layout = SimLayout::oval();
        let ticks = self.laps * layout.route.len();
        let mut session = Session::new(
            self.oracle_seed(),
            layout,
            self.oracle_config(self.drop_rate, 0.0),
            export,
        );

        let vehicles = session.spawn(1);
        session.drive(&vehicles, ticks, None);

        session.finish(ScenarioId::DroppedPieces, self.seed, every_drop_corrected)
    }

    fn run_figure_eight(&self, export: Option<SimExport>) -> (ScenarioResult, Option<SimExport>) {
        let layout = SimLayout::figure_eight();
        let ticks = self.laps * layout.route.len();
        let mut session = Session::new(
            self.oracle_seed(),
            layout,
            self.oracle_config(self.drop_rate, 0.0),
            export,
        );

        let vehicles = session.spawn(1);
        session.drive(&vehicles, ticks, None);

        session.finish(ScenarioId::FigureEight, self.seed, every_drop_corrected)
    }

    /// Three vehicles; the order they report in is shuffled every round.
    fn run_convoy(&self, export: Option<SimExport>) -> (ScenarioResult, Option<SimExport>) {
        let layout = SimLayout::long_oval();
        let rounds = self.laps * layout.route.len();
        let mut session = Session::new(
            self.oracle_seed(),
            layout,
            self.oracle_config(self.drop_rate, 0.0),
            export,
        );
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let vehicles = session.spawn(VEHICLE_NAMES.len());
        session.drive(&vehicles, rounds, Some(&mut rng));

        let known = session.engine.vehicle_count();
        session.finish(ScenarioId::Convoy, self.seed, |m| {
            if known != VEHICLE_NAMES.len() {
                let expected = VEHICLE_NAMES.len();
                return Some(format!("engine knows {} vehicles, expected {}", known, expected));
            }
            every_drop_corrected(m)
        })
    }

    /// Drives an oval, swaps in the long oval and drives again.
    fn run_layout_reset(&self, export: Option<SimExport>) -> (ScenarioResult, Option<SimExport>) {
        let first = SimLayout::oval();
        let ticks = self.laps * first.route.len();
        let config = self.oracle_config(0.0, 0.0);
        let mut session = Session::new(self.oracle_seed(), first, config, export);

        let vehicles = session.spawn(2);
        session.drive(&vehicles, ticks, None);

        let second = SimLayout::long_oval();
        let ticks = self.laps * second.route.len();
        let still_located = session.reset(second);
        if still_located > 0 {
            session.fail(format!(
                "{} vehicles still located after the layout reset",
                still_located
            ));
        }
        session.drive(&vehicles, ticks, None);

        session.finish(ScenarioId::LayoutReset, self.seed, |m| {
            (m.layout_resets != 2).then(|| format!("{} layout loads, expected 2", m.layout_resets))
        })
    }

    /// Every garbled message must be discarded without disturbing tracking.
    fn run_garbled_feed(&self, export: Option<SimExport>) -> (ScenarioResult, Option<SimExport>) {
        let layout = SimLayout::oval();
        let ticks = self.laps * layout.route.len();
        let mut session = Session::new(
            self.oracle_seed(),
            layout,
            self.oracle_config(0.0, GARBLE_RATE),
            export,
        );

        let vehicles = session.spawn(1);
        session.drive(&vehicles, ticks, None);

        session.finish(ScenarioId::GarbledFeed, self.seed, |m| {
            (m.messages_discarded != m.garbled_messages).then(|| {
                format!(
                    "{} messages discarded but {} were garbled",
                    m.messages_discarded, m.garbled_messages
                )
            })
        })
    }

    /// The oracle's stream goes through a [`ChannelFeed`] into a
    /// [`TrackingAgent`] running on a tokio runtime.
    fn run_live_feed(&self, mut export: Option<SimExport>) -> (ScenarioResult, Option<SimExport>) {
        let layout = SimLayout::oval();
        let ticks = self.laps * layout.route.len();
        let mut oracle = Oracle::new(
            self.oracle_seed(),
            layout.clone(),
            self.oracle_config(self.drop_rate, 0.0),
        );
        let vehicle_id = VehicleId::from(VEHICLE_NAMES[0]);
        let vehicle = oracle.spawn(vehicle_id.clone(), 0);

        let steps: Vec<Step> = oracle
            .prime(vehicle)
            .into_iter()
            .chain((0..ticks).filter_map(|_| oracle.advance(vehicle)))
            .collect();
        let truths: Vec<PieceId> = steps.iter().map(|s| s.truth).collect();
        let messages: Vec<TelemetryMessage> = steps.into_iter().flat_map(|s| s.messages).collect();
        let sent = messages.len() as u64;

        let mut engine = TrackingEngine::with_defaults();
        let layout_id = engine.load_layout(&layout.snapshot);

        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                let reason = format!("could not start tokio runtime: {}", e);
                return (self.aborted(ScenarioId::LiveFeed, reason), export);
            }
        };

        let (outputs, summary, stats) = runtime.block_on(async move {
            let (feed, handle) = ChannelFeed::pair(FEED_CAPACITY);
            let injector = tokio::spawn(async move {
                for message in messages {
                    if let Err(e) = handle.inject(message).await {
                        warn!("Injector stopped: {}", e);
                        break;
                    }
                }
                // Dropping the handle closes the feed.
            });

            let config = AgentConfig {
                name: "live-feed".to_string(),
                max_messages: None,
            };
            let mut agent = TrackingAgent::new(Arc::new(feed), engine, config);
            let mut outputs = Vec::new();
            let summary = agent.run(|output| outputs.push(output)).await;
            if let Err(e) = injector.await {
                warn!("Injector task failed: {}", e);
            }
            (outputs, summary, agent.engine().stats().clone())
        });

        let mut metrics = ScenarioMetrics {
            messages_sent: sent,
            pieces_dropped: oracle.stats().pieces_dropped,
            messages_discarded: stats.messages_dropped,
            corrections: stats.corrections,
            segments: stats.segments,
            primings: stats.primings,
            lost_cycles: stats.lost_cycles,
            layout_resets: stats.layout_resets,
            ..ScenarioMetrics::default()
        };
        let mut failure = None;

        if summary.messages != sent {
            failure = Some(format!("agent processed {} of {} messages", summary.messages, sent));
        }
        if outputs.len() != truths.len() {
            failure.get_or_insert(format!("{} outputs for {} ticks", outputs.len(), truths.len()));
        }

        for (i, (truth, output)) in truths.iter().zip(&outputs).enumerate() {
            let segment = match output {
                TrackingOutput::Animate(segment) => Some(segment),
                _ => None,
            };
            let agrees = segment.is_some_and(|s| s.piece_id == *truth && s.layout_id == layout_id);
            if !agrees {
                metrics.mismatches += 1;
                let reason = format!(
                    "tick {}: expected a segment on piece {}, got {:?}",
                    i + 1,
                    truth,
                    output
                );
                warn!("{}", reason);
                failure.get_or_insert(reason);
            }
            if let Some(export) = export.as_mut() {
                export.add_frame(SimFrame {
                    tick: i as u64 + 1,
                    vehicle: vehicle_id.clone(),
                    truth_piece: *truth,
                    tracked_piece: segment.map(|s| s.piece_id),
                    lane: segment.map(|s| s.lane_id),
                    segment: segment.cloned(),
                    events: Vec::new(),
                });
            }
        }

        if let Some(reason) = every_drop_corrected(&metrics) {
            failure.get_or_insert(reason);
        }

        let result = ScenarioResult {
            scenario: ScenarioId::LiveFeed,
            seed: self.seed,
            passed: failure.is_none(),
            total_ticks: truths.len() as u64,
            final_vehicle_count: 1,
            failure_reason: failure,
            metrics,
        };
        (result, export)
    }

    fn aborted(&self, scenario: ScenarioId, reason: String) -> ScenarioResult {
        warn!("{} aborted: {}", scenario.name(), reason);
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            total_ticks: 0,
            final_vehicle_count: 0,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
        }
    }
}

fn every_drop_corrected(metrics: &ScenarioMetrics) -> Option<String> {
    (metrics.corrections != metrics.pieces_dropped).then(|| {
        format!(
            "{} piece reports dropped but {} corrections made",
            metrics.pieces_dropped, metrics.corrections
        )
    })
}

// ============================================================================
// SESSION
// ============================================================================

/// One engine fed by one oracle.
struct Session {
    engine: TrackingEngine,
    oracle: Oracle,
    metrics: ScenarioMetrics,
    ticks: u64,
    failure: Option<String>,
    export: Option<SimExport>,
}

impl Session {
    fn new(seed: u64, layout: SimLayout, config: OracleConfig, export: Option<SimExport>) -> Self {
        let mut engine = TrackingEngine::with_defaults();
        engine.load_layout(&layout.snapshot);
        Self {
            engine,
            oracle: Oracle::new(seed, layout, config),
            metrics: ScenarioMetrics::default(),
            ticks: 0,
            failure: None,
            export,
        }
    }

    /// Spawns `count` named vehicles on consecutive start straights.
    fn spawn(&mut self, count: usize) -> Vec<usize> {
        VEHICLE_NAMES
            .iter()
            .take(count)
            .enumerate()
            .map(|(start, name)| self.oracle.spawn(VehicleId::from(*name), start))
            .collect()
    }

    /// Primes every vehicle, then advances all of them `rounds` times.
    ///
    /// With an rng the reporting order is shuffled each round.
    fn drive(&mut self, vehicles: &[usize], rounds: usize, mut rng: Option<&mut ChaCha8Rng>) {
        for &vehicle in vehicles {
            if let Some(step) = self.oracle.prime(vehicle) {
                self.apply(step);
            }
        }

        let mut order = vehicles.to_vec();
        for _ in 0..rounds {
            if let Some(rng) = rng.as_deref_mut() {
                order.shuffle(rng);
            }
            for &vehicle in &order {
                if let Some(step) = self.oracle.advance(vehicle) {
                    self.apply(step);
                }
            }
        }
    }

    /// Swaps both sides to a new layout and returns how many vehicles the
    /// engine still considers located.
    fn reset(&mut self, layout: SimLayout) -> usize {
        self.engine.load_layout(&layout.snapshot);
        self.oracle.load_layout(layout);
        self.engine.vehicles().filter(|v| v.is_located()).count()
    }

    /// Feeds one step to the engine and checks the outcome.
    fn apply(&mut self, step: Step) {
        self.ticks += 1;
        self.metrics.messages_sent += step.messages.len() as u64;

        let mut output = None;
        for message in &step.messages {
            if let Some(produced) = self.engine.ingest_message(message) {
                output = Some(produced);
            }
        }
        let tracked = self.engine.position(&step.vehicle);

        let problem = match (&output, tracked) {
            (Some(TrackingOutput::Animate(segment)), Some((piece, _)))
                if piece == step.truth && segment.piece_id == step.truth =>
            {
                if segment.layout_id != self.engine.layout_id() {
                    Some("segment stamped with a stale layout".to_string())
                } else if segment.duration_millis == 0 {
                    Some("zero-length segment".to_string())
                } else {
                    None
                }
            }
            (Some(TrackingOutput::Animate(_)), _) => Some(format!(
                "tracked at {:?}, truth {}",
                tracked.map(|(piece, _)| piece),
                step.truth
            )),
            (other, _) => Some(format!(
                "expected a segment on piece {}, got {:?}",
                step.truth, other
            )),
        };
        if let Some(problem) = problem {
            self.fail(format!("tick {} ({}): {}", self.ticks, step.vehicle, problem));
        } else {
            debug!("tick {}: {} on piece {}", self.ticks, step.vehicle, step.truth);
        }

        if let Some(export) = self.export.as_mut() {
            let mut events = Vec::new();
            if step.dropped_piece {
                events.push("piece report dropped".to_string());
            }
            if step.garbled > 0 {
                events.push(format!("{} garbled message(s)", step.garbled));
            }
            export.add_frame(SimFrame {
                tick: self.ticks,
                vehicle: step.vehicle,
                truth_piece: step.truth,
                tracked_piece: tracked.map(|(piece, _)| piece),
                lane: tracked.map(|(_, lane)| lane),
                segment: match output {
                    Some(TrackingOutput::Animate(segment)) => Some(segment),
                    _ => None,
                },
                events,
            });
        }
    }

    fn fail(&mut self, reason: String) {
        self.metrics.mismatches += 1;
        warn!("{}", reason);
        self.failure.get_or_insert(reason);
    }

    fn finish<C>(
        mut self,
        scenario: ScenarioId,
        seed: u64,
        check: C,
    ) -> (ScenarioResult, Option<SimExport>)
    where
        C: FnOnce(&ScenarioMetrics) -> Option<String>,
    {
        let stats = self.engine.stats();
        self.metrics.corrections = stats.corrections;
        self.metrics.segments = stats.segments;
        self.metrics.primings = stats.primings;
        self.metrics.lost_cycles = stats.lost_cycles;
        self.metrics.messages_discarded = stats.messages_dropped;
        self.metrics.layout_resets = stats.layout_resets;
        self.metrics.pieces_dropped = self.oracle.stats().pieces_dropped;
        self.metrics.garbled_messages = self.oracle.stats().garbled;

        if let Some(reason) = check(&self.metrics) {
            warn!("{} check failed: {}", scenario.name(), reason);
            self.failure.get_or_insert(reason);
        }

        let result = ScenarioResult {
            scenario,
            seed,
            passed: self.failure.is_none(),
            total_ticks: self.ticks,
            final_vehicle_count: self.engine.vehicle_count(),
            failure_reason: self.failure,
            metrics: self.metrics,
        };
        (result, self.export)
    }
}
