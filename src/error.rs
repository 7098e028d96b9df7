use thiserror::Error;

use crate::state::{
    day_cycle::DayNumber,
    roster::{Allegiance, ParticipantId},
};

/// Expected, user-caused reasons for refusing a command.
///
/// A rejection never changes game state. The `Display` text names the violated
/// precondition so players can correct themselves.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The sign-up list does not match any supported player count.
    #[error("popcorn can be played with {supported} players, but {requested} signed up")]
    InvalidPlayerCount {
        /// Number of players that signed up.
        requested: usize,
        /// Human readable list of the supported counts.
        supported: String,
    },
    /// The same participant appears twice in the sign-up list.
    #[error("participant {0} signed up more than once")]
    DuplicateParticipant(ParticipantId),
    /// The channel already hosts a running game.
    #[error("a game is already running in this channel")]
    GameAlreadyRunning,
    /// No running game exists, or it ended while the command was in flight.
    #[error("there is no running game here")]
    GameNotRunning,
    /// The engine itself was named as target.
    #[error("lol, you can't shoot me")]
    TargetIsHost,
    /// The gun-bearer tried to shoot themselves.
    #[error("please don't shoot yourself, that would make a big mess")]
    SelfTarget,
    /// The acting user is not part of this game.
    #[error("shush, you're not playing in this game")]
    NotParticipating,
    /// The acting participant is already dead.
    #[error("shush, you're dead")]
    ActorDead,
    /// The acting participant does not hold the elimination privilege.
    #[error("you do not hold the gun")]
    NotGunBearer,
    /// The target is not part of this game.
    #[error("{0} is not playing in this game")]
    UnknownTarget(ParticipantId),
    /// The target has already been eliminated.
    #[error("{0} is already dead, you have to shoot a living player")]
    TargetAlreadyEliminated(ParticipantId),
    /// The day was already closed by the other side of the race.
    #[error("too late, day {day} has already ended")]
    TooLate {
        /// Day the command was aimed at.
        day: DayNumber,
    },
}

/// Broken internal guard. Seeing one of these means game state can no longer be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// A participant was killed a second time.
    #[error("participant {0} is already dead")]
    AlreadyDead(ParticipantId),
    /// The gun was handed to a dead participant.
    #[error("participant {0} is dead and cannot hold the gun")]
    DeadParticipant(ParticipantId),
    /// An id that is not part of the roster reached the state layer.
    #[error("participant {0} is not part of this game")]
    UnknownParticipant(ParticipantId),
    /// The gun has to be handed out but nobody is eligible.
    #[error("no living member of the {0} is left to receive the gun")]
    NoGunCandidate(Allegiance),
    /// A day had to be closed while nobody held the gun.
    #[error("day {0} has no gun-bearer")]
    NoGunBearer(DayNumber),
}

/// Errors returned by the game engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The command was refused; the game carries on untouched.
    #[error(transparent)]
    Rejected(#[from] Rejection),
    /// The game hit a broken invariant and was aborted.
    #[error("game aborted: {0}")]
    Aborted(#[from] InvariantViolation),
}
