use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::state::{
    ChannelId,
    day_cycle::DayNumber,
    game::{ActionKind, ActionRecord, GameInput, GameState},
    roster::{Allegiance, ParticipantId},
};

/// Statistics record written once per finished game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSummaryEntity {
    /// Identifier of the game.
    pub game_id: Uuid,
    /// Channel the game was played in.
    pub channel: ChannelId,
    /// Seed of the game's random generator.
    pub seed: u64,
    /// Sign-up order; the team split depends on it as much as on the seed.
    pub participants: Vec<ParticipantId>,
    /// Accepted shots and timeouts, in order.
    pub inputs: Vec<GameInput>,
    /// When the game started.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// When the game ended.
    #[serde(with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    /// Winning allegiance.
    pub winner: Option<Allegiance>,
    /// Both teams.
    pub teams: Vec<TeamEntity>,
    /// Full action log.
    pub actions: Vec<ActionEntity>,
}

/// One team of a finished game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEntity {
    /// Which team.
    pub allegiance: Allegiance,
    /// Members in sign-up order.
    pub players: Vec<PlayerEntity>,
    /// Whether this team won.
    pub winner: bool,
}

/// One player of a finished game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// User id.
    pub id: ParticipantId,
    /// Alive when the game ended.
    pub survived: bool,
}

/// One entry of the action log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionEntity {
    /// Position in the log, starting at 1.
    pub order: u64,
    /// Wall-clock time of the action.
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    /// Day number, 0 before the first day.
    pub day: DayNumber,
    /// Who acted.
    pub actor: ParticipantId,
    /// What happened.
    pub kind: ActionKind,
    /// Who it happened to.
    pub target: Option<ParticipantId>,
}

impl From<&ActionRecord> for ActionEntity {
    fn from(value: &ActionRecord) -> Self {
        Self {
            order: value.order,
            at: value.at,
            day: value.day,
            actor: value.actor,
            kind: value.kind,
            target: value.target,
        }
    }
}

impl From<&GameState> for GameSummaryEntity {
    fn from(game: &GameState) -> Self {
        let winner = game.winner();
        let teams = [Allegiance::Wolves, Allegiance::Village]
            .into_iter()
            .map(|allegiance| TeamEntity {
                allegiance,
                players: game
                    .roster()
                    .participants()
                    .filter(|p| p.allegiance() == allegiance)
                    .map(|p| PlayerEntity {
                        id: p.id(),
                        survived: p.is_alive(),
                    })
                    .collect(),
                winner: winner == Some(allegiance),
            })
            .collect();

        Self {
            game_id: game.id(),
            channel: game.channel(),
            seed: game.seed(),
            participants: game.roster().participants().map(|p| p.id()).collect(),
            inputs: game.inputs().to_vec(),
            started_at: game.started_at(),
            ended_at: game.ended_at(),
            winner,
            teams,
            actions: game.actions().iter().map(ActionEntity::from).collect(),
        }
    }
}
