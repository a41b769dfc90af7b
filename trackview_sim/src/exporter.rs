//! JSON exporter for replaying a run.
//!
//! One frame per transition tick: where the vehicle really was, where the
//! engine put it and the segment it emitted.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use trackview_core::AnimationSegment;
use trackview_env::{PieceId, VehicleId};

/// A single tick of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    pub tick: u64,
    pub vehicle: VehicleId,

    /// Ground-truth piece
    pub truth_piece: PieceId,

    /// Piece the engine resolved, if located
    pub tracked_piece: Option<PieceId>,

    pub lane: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<AnimationSegment>,

    /// Notable happenings (dropped report, garbage, reset)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    pub fn add_frame(&mut self, frame: SimFrame) {
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Harness failures outside the scenarios' own assertions.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_serializes_frames() {
        let piece = PieceId::new(3).unwrap();
        let mut export = SimExport::new("clean_loop", 42);
        export.add_frame(SimFrame {
            tick: 1,
            vehicle: VehicleId::from("Skull"),
            truth_piece: piece,
            tracked_piece: Some(piece),
            lane: Some(2),
            segment: None,
            events: vec!["piece report dropped".to_string()],
        });
        export.finalize(true, None);

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["scenario"], "clean_loop");
        assert_eq!(json["frames"][0]["truth_piece"], 3);
        assert!(json["frames"][0].get("segment").is_none());
        assert!(json.get("failure_reason").is_none());
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let export = SimExport::new("clean_loop", 1);
        let err = export
            .write_to_file("/nonexistent-trackview-dir/out.json")
            .unwrap_err();
        assert!(matches!(err, SimError::Io(_)));
    }
}
