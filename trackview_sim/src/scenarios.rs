//! Simulation scenarios for the tracking engine.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// TRK-001: one vehicle, perfect telemetry
    CleanLoop,

    /// TRK-002: piece changes go unreported and must be inferred
    DroppedPieces,

    /// TRK-003: intersection crossed from both axes
    FigureEight,

    /// TRK-004: three vehicles with interleaved telemetry
    Convoy,

    /// TRK-005: the layout is replaced mid-run
    LayoutReset,

    /// TRK-006: malformed messages mixed into the stream
    GarbledFeed,

    /// TRK-007: telemetry pumped through the async channel feed
    LiveFeed,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::CleanLoop,
            ScenarioId::DroppedPieces,
            ScenarioId::FigureEight,
            ScenarioId::Convoy,
            ScenarioId::LayoutReset,
            ScenarioId::GarbledFeed,
            ScenarioId::LiveFeed,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::CleanLoop => "clean_loop",
            ScenarioId::DroppedPieces => "dropped_pieces",
            ScenarioId::FigureEight => "figure_eight",
            ScenarioId::Convoy => "convoy",
            ScenarioId::LayoutReset => "layout_reset",
            ScenarioId::GarbledFeed => "garbled_feed",
            ScenarioId::LiveFeed => "live_feed",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::CleanLoop => "Single vehicle laps an oval with every message delivered",
            ScenarioId::DroppedPieces => {
                "Piece changes lost at random; every one must be corrected"
            }
            ScenarioId::FigureEight => {
                "Figure eight through an intersection with lossy piece reports"
            }
            ScenarioId::Convoy => "Three vehicles on a long oval, shuffled message order",
            ScenarioId::LayoutReset => "Layout swapped mid-run; all vehicles must re-prime",
            ScenarioId::GarbledFeed => "Malformed and unknown messages must be dropped harmlessly",
            ScenarioId::LiveFeed => "Oracle stream through ChannelFeed and TrackingAgent on tokio",
        }
    }

    /// Returns true if the scenario loses piece reports.
    pub fn is_lossy(&self) -> bool {
        matches!(
            self,
            ScenarioId::DroppedPieces
                | ScenarioId::FigureEight
                | ScenarioId::Convoy
                | ScenarioId::LiveFeed
        )
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clean_loop" | "cleanloop" | "trk-001" => Ok(ScenarioId::CleanLoop),
            "dropped_pieces" | "droppedpieces" | "trk-002" => Ok(ScenarioId::DroppedPieces),
            "figure_eight" | "figureeight" | "trk-003" => Ok(ScenarioId::FigureEight),
            "convoy" | "trk-004" => Ok(ScenarioId::Convoy),
            "layout_reset" | "layoutreset" | "trk-005" => Ok(ScenarioId::LayoutReset),
            "garbled_feed" | "garbledfeed" | "trk-006" => Ok(ScenarioId::GarbledFeed),
            "live_feed" | "livefeed" | "trk-007" => Ok(ScenarioId::LiveFeed),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert!(!scenario.description().is_empty());
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!("TRK-004".parse::<ScenarioId>(), Ok(ScenarioId::Convoy));
        assert_eq!("FigureEight".parse::<ScenarioId>(), Ok(ScenarioId::FigureEight));
        assert!("time_warp".parse::<ScenarioId>().is_err());
    }
}
