//! Observable view events
//!
//! Events are explicit and typed; the string form is the `event` key of
//! the log line.

use std::fmt;

use super::logger::Severity;

/// Observable events emitted by the view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// View configuration loaded from disk
    ConfigLoaded,
    /// View configuration installed
    ViewInitialized,

    // Requests
    /// Request state machine advanced
    StateTransition,
    /// Backfill requests were planned
    BackfillPlanned,
    /// A backfill row had no existing group and was dropped
    BackfillRowDropped,

    // Fan-out rounds
    /// Fan-out round started
    RoundStart,
    /// Every layer of the round answered
    RoundComplete,
    /// Round aborted
    RoundFailed,
    /// One layer of a round answered
    LayerComplete,
    /// One layer of a round failed or timed out
    LayerFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::ViewInitialized => "VIEW_INITIALIZED",
            Event::StateTransition => "STATE_TRANSITION",
            Event::BackfillPlanned => "BACKFILL_PLANNED",
            Event::BackfillRowDropped => "BACKFILL_ROW_DROPPED",
            Event::RoundStart => "ROUND_START",
            Event::RoundComplete => "ROUND_COMPLETE",
            Event::RoundFailed => "ROUND_FAILED",
            Event::LayerComplete => "LAYER_COMPLETE",
            Event::LayerFailed => "LAYER_FAILED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::StateTransition | Event::LayerComplete => Severity::Trace,
            Event::BackfillRowDropped | Event::LayerFailed => Severity::Warn,
            Event::RoundFailed => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
