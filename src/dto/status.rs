use serde::Serialize;
use uuid::Uuid;

use crate::state::{day_cycle::DayNumber, roster::ParticipantId};

/// Snapshot of a running game as shown by the status command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameStatus {
    /// Game identifier.
    pub game_id: Uuid,
    /// Whether the game is still running.
    pub running: bool,
    /// Current day, if one was opened.
    pub day: Option<DayNumber>,
    /// Seconds until the current day's deadline.
    pub time_left_secs: u64,
    /// Living players in sign-up order.
    pub living: Vec<ParticipantId>,
    /// Number of living wolves; their identities stay hidden.
    pub wolves_alive: usize,
    /// Current gun-bearer.
    pub gun_bearer: Option<ParticipantId>,
}
