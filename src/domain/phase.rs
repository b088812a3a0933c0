//! Run phases and the allowed transition graph.

use serde::{Deserialize, Serialize};

/// One discrete step of the orchestrator's workflow.
///
/// IDLE is both the initial phase and the only terminal phase; COMPLETED and
/// ERROR are the two ways back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Starting,
    LoadingPreferences,
    FetchingCandidates,
    FilteringCandidates,
    Analyzing,
    Deciding,
    Submitting,
    Completed,
    Error,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Starting => "starting",
            RunPhase::LoadingPreferences => "loading_preferences",
            RunPhase::FetchingCandidates => "fetching_candidates",
            RunPhase::FilteringCandidates => "filtering_candidates",
            RunPhase::Analyzing => "analyzing",
            RunPhase::Deciding => "deciding",
            RunPhase::Submitting => "submitting",
            RunPhase::Completed => "completed",
            RunPhase::Error => "error",
        }
    }

    /// Whether `self -> to` is an edge of the fixed transition graph.
    ///
    /// ERROR is reachable from every non-IDLE phase and only ever leads back
    /// to IDLE. DECIDING may loop back to ANALYZING for the next candidate.
    pub fn can_transition_to(&self, to: RunPhase) -> bool {
        use RunPhase::*;
        if matches!(self, Idle) {
            return matches!(to, Starting);
        }
        // Every non-IDLE phase may fall into ERROR or bail out to IDLE.
        if matches!(to, Error | Idle) {
            return !matches!(self, Error if to == Error);
        }
        match self {
            Starting => matches!(to, LoadingPreferences),
            LoadingPreferences => matches!(to, FetchingCandidates),
            FetchingCandidates => matches!(to, FilteringCandidates),
            FilteringCandidates => matches!(to, Analyzing | Completed),
            Analyzing => matches!(to, Deciding),
            Deciding => matches!(to, Submitting | Analyzing),
            Submitting => matches!(to, Completed | Analyzing),
            Completed => false,
            Error => false,
            Idle => unreachable!(),
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
