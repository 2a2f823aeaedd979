//! View request state machine
//!
//! Every view request walks these states in order:
//!
//! ```text
//! PLANNED -> FANNED_OUT -> GROUPED -> MERGED -> COMPLETION_CHECKED
//!         -> [BACKFILLED] -> FINAL
//! ```
//!
//! `FAILED` is terminal and reachable from any non-terminal state.

use std::fmt;

/// State of a single view request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    /// Layer requests have been planned
    Planned,
    /// Round 1 fan-out has completed
    FannedOut,
    /// Round 1 results are grouped by feature id
    Grouped,
    /// One candidate row per feature has been chosen
    Merged,
    /// Missing obligatory contributions have been computed
    CompletionChecked,
    /// The backfill round has completed and groups were re-merged
    Backfilled,
    /// Result is complete
    Final,
    /// Request failed; no partial result is returned
    Failed,
}

impl ViewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "PLANNED",
            Self::FannedOut => "FANNED_OUT",
            Self::Grouped => "GROUPED",
            Self::Merged => "MERGED",
            Self::CompletionChecked => "COMPLETION_CHECKED",
            Self::Backfilled => "BACKFILLED",
            Self::Final => "FINAL",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final | Self::Failed)
    }

    /// Check whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: ViewState) -> bool {
        use ViewState::*;

        if next == Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Planned, FannedOut)
                | (FannedOut, Grouped)
                | (Grouped, Merged)
                | (Merged, CompletionChecked)
                | (CompletionChecked, Backfilled)
                | (CompletionChecked, Final)
                | (Backfilled, Final)
        )
    }
}

impl fmt::Display for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
