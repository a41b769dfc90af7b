//! Agent Runtime - Pumps a telemetry feed through the tracking engine.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                TrackingAgent                 │
//! │  feed.recv() ──► TrackingEngine ──► sink()   │
//! │                        │                     │
//! │  feed.publish() ◄── VehicleCommand           │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use trackview_core::agent_runtime::{AgentConfig, TrackingAgent};
//! use trackview_core::TrackingEngine;
//! use trackview_env::ChannelFeed;
//!
//! let (feed, handle) = ChannelFeed::pair(64);
//! let engine = TrackingEngine::with_defaults();
//! let mut agent = TrackingAgent::new(Arc::new(feed), engine, AgentConfig::default());
//! let summary = agent.run(|output| renderer.draw(output)).await;
//! ```

use crate::tracking_engine::{LaneNudge, TrackingEngine, TrackingError, TrackingOutput};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use trackview_env::{TelemetryFeed, VehicleId};

/// Configuration for a [`TrackingAgent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent's logical name (for logging)
    pub name: String,

    /// Stop after this many messages; `None` runs until the feed closes
    pub max_messages: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "trackview-agent".to_string(),
            max_messages: None,
        }
    }
}

/// What a finished run saw.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub messages: u64,
    pub outputs: u64,
}

/// Drives one [`TrackingEngine`] from one [`TelemetryFeed`].
pub struct TrackingAgent<F: TelemetryFeed> {
    feed: Arc<F>,
    engine: TrackingEngine,
    config: AgentConfig,
    messages: u64,
}

impl<F: TelemetryFeed> TrackingAgent<F> {
    pub fn new(feed: Arc<F>, engine: TrackingEngine, config: AgentConfig) -> Self {
        Self {
            feed,
            engine,
            config,
            messages: 0,
        }
    }

    pub fn engine(&self) -> &TrackingEngine {
        &self.engine
    }

    /// Mutable engine access, e.g. to load a new layout between messages.
    pub fn engine_mut(&mut self) -> &mut TrackingEngine {
        &mut self.engine
    }

    /// Total messages processed by this agent.
    pub fn messages(&self) -> u64 {
        self.messages
    }

    /// Receives and processes one message.
    ///
    /// Returns `None` once the feed is closed, otherwise the engine's output
    /// for the message (which may itself be `None`).
    pub async fn step(&mut self) -> Option<Option<TrackingOutput>> {
        let message = self.feed.recv().await?;
        self.messages += 1;
        Some(self.engine.ingest_message(&message))
    }

    /// Runs until the feed closes or the message limit is reached, handing
    /// every output to `sink`.
    pub async fn run<S>(&mut self, mut sink: S) -> AgentSummary
    where
        S: FnMut(TrackingOutput),
    {
        tracing::info!("{} started", self.config.name);
        let mut summary = AgentSummary::default();

        loop {
            if self.config.max_messages.is_some_and(|max| summary.messages >= max) {
                break;
            }
            let Some(output) = self.step().await else {
                tracing::info!("{}: feed closed", self.config.name);
                break;
            };
            summary.messages += 1;
            if let Some(output) = output {
                summary.outputs += 1;
                sink(output);
            }
        }

        tracing::info!(
            "{} stopped after {} messages ({} outputs)",
            self.config.name,
            summary.messages,
            summary.outputs
        );
        summary
    }

    /// Publishes a speed command for the vehicle.
    pub async fn set_speed(&self, vehicle: &VehicleId, speed: u32) -> Result<(), TrackingError> {
        let command = self.engine.set_speed(vehicle, speed)?;
        self.feed.publish(command.to_message(vehicle)).await?;
        Ok(())
    }

    /// Publishes a one-step lane change for the vehicle.
    pub async fn nudge_lane(
        &self,
        vehicle: &VehicleId,
        nudge: LaneNudge,
    ) -> Result<(), TrackingError> {
        let command = self.engine.nudge_lane(vehicle, nudge)?;
        self.feed.publish(command.to_message(vehicle)).await?;
        Ok(())
    }
}
