/// One day and its write-once close.
pub mod day_cycle;
/// The game aggregate and its transitions.
pub mod game;
/// Who holds the gun.
pub mod gun;
/// Participants and their hidden teams.
pub mod roster;

use std::{fmt, sync::Arc};

use dashmap::{DashMap, mapref::entry::Entry};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    dao::stats_store::StatsStore,
    error::{EngineError, Rejection},
    services::{engine::GameEngine, outbox::Messenger},
    state::roster::ParticipantId,
};

/// Opaque id of the chat channel a game is played in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<#{}>", self.0)
    }
}

/// Registry handle shared by the command loop and every engine.
pub type SharedRegistry = Arc<GameRegistry>;

/// Central registry of running games, at most one per channel.
pub struct GameRegistry {
    games: DashMap<ChannelId, Arc<GameEngine>>,
    config: Arc<EngineConfig>,
    messenger: Arc<dyn Messenger>,
    stats: Arc<dyn StatsStore>,
}

impl GameRegistry {
    /// Construct a new [`GameRegistry`] wrapped in an [`Arc`] so engines can point back at it.
    pub fn new(
        config: EngineConfig,
        messenger: Arc<dyn Messenger>,
        stats: Arc<dyn StatsStore>,
    ) -> SharedRegistry {
        Arc::new(Self {
            games: DashMap::new(),
            config: Arc::new(config),
            messenger,
            stats,
        })
    }

    /// Start a game in `channel` with a random seed.
    pub fn start(
        self: &Arc<Self>,
        channel: ChannelId,
        participants: &[ParticipantId],
    ) -> Result<Arc<GameEngine>, EngineError> {
        self.start_seeded(channel, participants, rand::random())
    }

    /// Start a game in `channel` whose randomness is fully determined by `seed`.
    ///
    /// The channel slot stays locked while the engine is built, so two concurrent starts
    /// for the same channel cannot both succeed.
    pub fn start_seeded(
        self: &Arc<Self>,
        channel: ChannelId,
        participants: &[ParticipantId],
        seed: u64,
    ) -> Result<Arc<GameEngine>, EngineError> {
        match self.games.entry(channel) {
            Entry::Occupied(_) => Err(Rejection::GameAlreadyRunning.into()),
            Entry::Vacant(slot) => {
                let engine = GameEngine::start(self, channel, participants, seed)?;
                slot.insert(engine.clone());
                info!(%channel, game_id = %engine.id(), players = participants.len(), "game started");
                Ok(engine)
            }
        }
    }

    /// Engine of the game running in `channel`, if any.
    pub fn get(&self, channel: ChannelId) -> Option<Arc<GameEngine>> {
        self.games.get(&channel).map(|entry| entry.value().clone())
    }

    /// Engine of the game running in `channel`, or [`Rejection::GameNotRunning`].
    pub fn require(&self, channel: ChannelId) -> Result<Arc<GameEngine>, Rejection> {
        self.get(channel).ok_or(Rejection::GameNotRunning)
    }

    /// Channels that currently host a game.
    pub fn active_games(&self) -> Vec<ChannelId> {
        let mut channels = self.games.iter().map(|entry| *entry.key()).collect::<Vec<_>>();
        channels.sort();
        channels
    }

    /// End the game in `channel` without a winner.
    pub async fn force_end(&self, channel: ChannelId, reason: &str) -> Result<(), EngineError> {
        self.require(channel)?.force_end(reason).await
    }

    /// Abort every running game, e.g. before the process exits.
    pub async fn shutdown(&self) {
        let engines = self
            .games
            .iter()
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        for engine in engines {
            match engine.force_end("the engine is shutting down").await {
                Ok(()) | Err(EngineError::Rejected(Rejection::GameNotRunning)) => {}
                Err(err) => {
                    warn!(channel = %engine.channel(), error = %err, "failed to stop game on shutdown")
                }
            }
        }
    }

    /// Drop the registry entry of a finished game. A newer game in the same channel is kept.
    pub(crate) fn remove(&self, channel: ChannelId, game_id: Uuid) {
        if self
            .games
            .remove_if(&channel, |_, engine| engine.id() == game_id)
            .is_some()
        {
            info!(%channel, %game_id, "game removed from registry");
        }
    }

    pub(crate) fn config(&self) -> Arc<EngineConfig> {
        self.config.clone()
    }

    pub(crate) fn messenger(&self) -> Arc<dyn Messenger> {
        self.messenger.clone()
    }

    pub(crate) fn stats(&self) -> Arc<dyn StatsStore> {
        self.stats.clone()
    }
}
