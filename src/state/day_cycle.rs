use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

/// Days are numbered from 1 and only ever increase.
pub type DayNumber = u32;

/// Why a day was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The gun-bearer shot someone before the deadline.
    Elimination,
    /// The deadline passed without a shot.
    Timeout,
    /// The game was ended from the outside while the day was open.
    Abandoned,
}

/// Phases a single day goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPhase {
    /// The gun-bearer may shoot until the deadline.
    Open,
    /// Terminal; records who got there first.
    Closed(CloseReason),
}

/// Error returned to whichever caller loses the race to close a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("day {day} already closed ({reason:?})")]
pub struct AlreadyClosed {
    /// The day that was already closed.
    pub day: DayNumber,
    /// How the winning caller closed it.
    pub reason: CloseReason,
}

/// One bounded window in which the gun-bearer has to shoot.
///
/// The deadline is fixed when the day opens and cannot be extended.
#[derive(Debug, Clone)]
pub struct DayCycle {
    number: DayNumber,
    opened: Instant,
    deadline: Instant,
    phase: DayPhase,
}

impl DayCycle {
    /// Open day `number` now, with the deadline `length` from now.
    pub fn open(number: DayNumber, length: Duration) -> Self {
        let opened = Instant::now();
        Self {
            number,
            opened,
            deadline: opened + length,
            phase: DayPhase::Open,
        }
    }

    /// Day number, starting at 1.
    pub fn number(&self) -> DayNumber {
        self.number
    }

    /// Monotonic instant the day opened.
    pub fn opened(&self) -> Instant {
        self.opened
    }

    /// Monotonic instant at which the day times out.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Current phase.
    pub fn phase(&self) -> DayPhase {
        self.phase
    }

    /// Whether the day still accepts a shot.
    pub fn is_open(&self) -> bool {
        self.phase == DayPhase::Open
    }

    /// Time left until the deadline, zero once it has passed or the day is closed.
    pub fn time_left(&self, now: Instant) -> Duration {
        match self.phase {
            DayPhase::Open => self.deadline.saturating_duration_since(now),
            DayPhase::Closed(_) => Duration::ZERO,
        }
    }

    /// Close the day. Only the first call succeeds; later calls get [`AlreadyClosed`]
    /// and must not cause any side effect.
    pub fn close(&mut self, reason: CloseReason) -> Result<(), AlreadyClosed> {
        self.phase = self.compute_transition(reason)?;
        Ok(())
    }

    fn compute_transition(&self, reason: CloseReason) -> Result<DayPhase, AlreadyClosed> {
        match self.phase {
            DayPhase::Open => Ok(DayPhase::Closed(reason)),
            DayPhase::Closed(previous) => Err(AlreadyClosed {
                day: self.number,
                reason: previous,
            }),
        }
    }
}
