//! Single dispatch point from parsed chat commands to the registry and engines.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
    dto::status::GameStatus,
    error::EngineError,
    state::{
        ChannelId, SharedRegistry,
        game::ShotOutcome,
        roster::ParticipantId,
    },
};

/// A command aimed at the game in one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum GameCommand {
    /// Start a game with the signed-up players.
    Start {
        /// Sign-up list.
        participants: Vec<ParticipantId>,
    },
    /// The gun-bearer shoots someone.
    Shoot {
        /// Who fires.
        actor: ParticipantId,
        /// Who is shot.
        target: ParticipantId,
    },
    /// Show the state of the running game.
    Status,
    /// Send the caller's role message again.
    RolePm {
        /// Who asks.
        participant: ParticipantId,
    },
    /// Stop the running game without a winner.
    ForceEnd {
        /// Shown to the channel.
        reason: String,
    },
}

/// Structured answer to a [`GameCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum CommandReply {
    /// A game was started.
    Started {
        /// Id of the new game.
        game_id: Uuid,
    },
    /// The shot went through.
    Shot {
        /// What happened.
        outcome: Option<ShotOutcome>,
    },
    /// Current state of the game.
    Status(GameStatus),
    /// The role message was queued.
    RoleSent,
    /// The game was stopped.
    Ended,
    /// The command was refused; the text names the reason.
    Rejected {
        /// Human readable reason.
        message: String,
    },
}

impl From<EngineError> for CommandReply {
    fn from(err: EngineError) -> Self {
        CommandReply::Rejected {
            message: err.to_string(),
        }
    }
}

/// Route `command` to the registry or to the engine running in `channel`.
pub async fn dispatch(
    registry: &SharedRegistry,
    channel: ChannelId,
    command: GameCommand,
) -> CommandReply {
    debug!(%channel, ?command, "dispatching command");
    let result = match command {
        GameCommand::Start { participants } => registry
            .start(channel, &participants)
            .map(|engine| CommandReply::Started {
                game_id: engine.id(),
            }),
        GameCommand::Shoot { actor, target } => match registry.require(channel) {
            Ok(engine) => engine
                .eliminate(actor, target)
                .await
                .map(|transition| CommandReply::Shot {
                    outcome: transition.shot,
                }),
            Err(rejection) => Err(rejection.into()),
        },
        GameCommand::Status => match registry.require(channel) {
            Ok(engine) => Ok(CommandReply::Status(engine.status().await)),
            Err(rejection) => Err(rejection.into()),
        },
        GameCommand::RolePm { participant } => match registry.require(channel) {
            Ok(engine) => engine
                .resend_role(participant)
                .await
                .map(|()| CommandReply::RoleSent)
                .map_err(EngineError::from),
            Err(rejection) => Err(rejection.into()),
        },
        GameCommand::ForceEnd { reason } => registry
            .force_end(channel, &reason)
            .await
            .map(|()| CommandReply::Ended),
    };

    result.unwrap_or_else(CommandReply::from)
}
