//! TrackView Telemetry Boundary
//!
//! This crate holds everything the tracking engine shares with the outside
//! world, so that the engine itself stays free of transport concerns:
//! - Identifiers (`VehicleId`, `PieceId`, `LocationId`)
//! - Decoding raw transport messages into [`TelemetryEvent`]s
//! - Encoding [`VehicleCommand`]s for the vehicle host
//! - The [`TelemetryFeed`] transport trait and a tokio channel implementation
//!
//! # Example
//!
//! ```ignore
//! use trackview_env::{decode, Inbound, TelemetryFeed};
//!
//! async fn pump<F: TelemetryFeed>(feed: &F) {
//!     while let Some(message) = feed.recv().await {
//!         match decode(&message) {
//!             Ok(Inbound::Telemetry(event)) => handle(event),
//!             Ok(_) => {}
//!             Err(e) => tracing::warn!("dropping message: {}", e),
//!         }
//!     }
//! }
//! ```

mod error;
mod feed;
mod telemetry;
mod tokio_impl;
mod types;

pub use error::EnvError;
pub use feed::TelemetryFeed;
pub use telemetry::{
    decode, Inbound, TelemetryEvent, VehicleCommand, CAR_TOPIC_PREFIX, ROSTER_TOPIC,
};
pub use tokio_impl::{ChannelFeed, FeedHandle};
pub use types::{LocationId, PieceId, TelemetryMessage, VehicleId};
