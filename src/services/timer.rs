use std::{sync::Weak, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::debug;

use crate::{services::engine::GameEngine, state::day_cycle::DayNumber};

/// Background task that reminds the gun-bearer and then expires one day.
///
/// The timer only holds a weak handle to its engine, so a finished game is not kept alive
/// by a pending deadline. Dropping the timer cancels it.
#[derive(Debug)]
pub struct RoundTimer {
    handle: JoinHandle<()>,
}

impl RoundTimer {
    /// Arm the timer for `day`, firing at `deadline`.
    ///
    /// The reminder fires `reminder_lead` before the deadline, but only if the day is
    /// longer than that lead.
    pub fn arm(
        engine: Weak<GameEngine>,
        day: DayNumber,
        deadline: Instant,
        reminder_lead: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let reminder_at = deadline
                .checked_sub(reminder_lead)
                .filter(|at| !reminder_lead.is_zero() && *at > Instant::now());
            if let Some(at) = reminder_at {
                sleep_until(at).await;
                let Some(engine) = engine.upgrade() else {
                    return;
                };
                engine.remind(day).await;
            }

            sleep_until(deadline).await;
            let Some(engine) = engine.upgrade() else {
                return;
            };
            // Expiry runs on its own task; closing the day cancels this timer.
            tokio::spawn(async move {
                if let Err(err) = engine.expire_day(day).await {
                    debug!(day, error = %err, "timeout ignored");
                }
            });
        });

        Self { handle }
    }

    /// Stop the timer. A deadline that already fired is unaffected.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
