use serde::Serialize;
use uuid::Uuid;

use crate::state::{
    ChannelId,
    day_cycle::DayNumber,
    roster::{Allegiance, ParticipantId},
};

/// Public message for the game channel.
///
/// Rendering into chat text is the messaging collaborator's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Announcement {
    /// The game has started; lists every player.
    GameStarted {
        /// Every participant in sign-up order.
        players: Vec<ParticipantId>,
        /// How many wolves are hidden among them.
        wolves_alive: usize,
    },
    /// Someone received the gun.
    GunAssigned {
        /// The new gun-bearer.
        bearer: ParticipantId,
    },
    /// A new day opened.
    DayStarted {
        /// Day number.
        day: DayNumber,
        /// Who has to shoot.
        bearer: ParticipantId,
        /// Length of the day in seconds.
        length_secs: u64,
    },
    /// The deadline is close.
    TimeRunningOut {
        /// Day number.
        day: DayNumber,
        /// Who has to shoot.
        bearer: ParticipantId,
        /// Seconds until the deadline.
        remaining_secs: u64,
    },
    /// The day closed.
    DayEnded {
        /// Day number.
        day: DayNumber,
    },
    /// The gun-bearer did not shoot in time and died; the gun gets redistributed.
    BearerTimedOut {
        /// The dead gun-bearer.
        bearer: ParticipantId,
    },
    /// The gun-bearer shot a wolf, who died.
    WolfShot {
        /// Shooter, keeps the gun.
        shooter: ParticipantId,
        /// The dead wolf.
        target: ParticipantId,
    },
    /// The gun-bearer shot an innocent villager and died for it.
    InnocentShot {
        /// The dead shooter.
        shooter: ParticipantId,
        /// The innocent target, receives the gun.
        target: ParticipantId,
    },
    /// A win condition was met.
    GameOver {
        /// Winning allegiance.
        winner: Allegiance,
        /// Full team reveal.
        teams: Vec<TeamReveal>,
    },
    /// The game was ended before any team won.
    GameAborted {
        /// Why it was ended.
        reason: String,
    },
    /// A role message could not be delivered.
    RoleMessageUndelivered {
        /// The unreachable participant.
        participant: ParticipantId,
    },
    /// The finished game was stored and can be replayed.
    GameRecorded {
        /// Identifier of the stored record.
        record_id: u64,
    },
    /// The finished game could not be stored.
    ReplayUnavailable,
}

/// One team as revealed at the end of a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamReveal {
    /// The team.
    pub allegiance: Allegiance,
    /// Every member, dead or alive.
    pub members: Vec<ParticipantId>,
    /// Members still alive at the end.
    pub survivors: Vec<ParticipantId>,
}

/// Secret role assignment sent privately to one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleAssignment {
    /// Game this role belongs to.
    pub game_id: Uuid,
    /// Channel the game is played in.
    pub channel: ChannelId,
    /// The participant's hidden team.
    pub allegiance: Allegiance,
    /// Fellow wolves; empty for villagers, who do not know each other.
    pub teammates: Vec<ParticipantId>,
}
