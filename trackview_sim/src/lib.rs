//! TrackView Deterministic Simulation Harness
//!
//! Drives the tracking engine with synthetic telemetry whose ground truth is
//! known, and checks after every transition tick that the engine put each
//! vehicle on the piece it really entered.
//!
//! # Core Principle: One Seed
//!
//! All sources of variation are derived from a single 64-bit seed:
//! - **Vehicles**: starting lane and speed
//! - **Loss**: which piece changes go unreported
//! - **Noise**: which garbled messages get mixed in, and the reporting order
//!   of vehicles in a convoy
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    ScenarioRunner                    │
//! │                                                      │
//! │  ┌────────────┐  TelemetryMessage  ┌──────────────┐  │
//! │  │   Oracle   │───────────────────►│TrackingEngine│  │
//! │  │(SimLayout) │                    └──────┬───────┘  │
//! │  └─────┬──────┘                           │          │
//! │        │ truth                    segment │          │
//! │        └──────────────► check ◄───────────┘          │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use trackview_sim::{ScenarioId, ScenarioRunner};
//!
//! let result = ScenarioRunner::new(42).with_drop_rate(0.3).run(ScenarioId::DroppedPieces);
//! assert!(result.passed);
//! ```

pub mod exporter;
pub mod layouts;
pub mod oracle;
pub mod runner;
pub mod scenarios;

pub use exporter::{SimError, SimExport, SimFrame};
pub use layouts::SimLayout;
pub use oracle::{GroundTruthVehicle, Oracle, OracleConfig, Step};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
