//! Pipeline lifecycle state.

use burnin_core::{Error, Result};

/// Lifecycle phase of a transcode run.
///
/// Phases only ever move forward, one step at a time:
/// Preparing → Running → Draining → Destroyed. Destroyed is terminal and
/// idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Preparing,
    Running,
    Draining,
    Destroyed,
}

impl Phase {
    fn next(self) -> Option<Phase> {
        match self {
            Phase::Preparing => Some(Phase::Running),
            Phase::Running => Some(Phase::Draining),
            Phase::Draining => Some(Phase::Destroyed),
            Phase::Destroyed => None,
        }
    }
}

/// Guarded holder of the current [`Phase`].
#[derive(Debug)]
pub struct PhaseCell {
    phase: Phase,
}

impl PhaseCell {
    pub fn new() -> Self {
        Self {
            phase: Phase::Preparing,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Move to `next`, which must be the immediate successor of the current
    /// phase. Re-entering Destroyed is allowed (idempotent teardown).
    pub fn advance(&mut self, next: Phase) -> Result<()> {
        if self.phase == Phase::Destroyed && next == Phase::Destroyed {
            return Ok(());
        }
        if self.phase.next() == Some(next) {
            self.phase = next;
            tracing::debug!(?next, "pipeline phase");
            Ok(())
        } else {
            Err(Error::Configuration(format!(
                "illegal phase transition {:?} -> {:?}",
                self.phase, next
            )))
        }
    }

    /// Walk forward through every remaining phase to Destroyed. Used on
    /// failure paths so no transition is ever skipped.
    pub fn finalize(&mut self) {
        while let Some(next) = self.phase.next() {
            self.phase = next;
        }
    }
}

impl Default for PhaseCell {
    fn default() -> Self {
        Self::new()
    }
}
