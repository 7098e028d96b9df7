use std::{collections::HashSet, fmt};

use indexmap::IndexMap;
use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{config::TeamSizeTable, error::InvariantViolation};

/// Opaque, stable user id of a participant (a chat platform snowflake).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<@{}>", self.0)
    }
}

/// The two hidden teams of a popcorn game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Allegiance {
    /// Minority team; wins on parity.
    Wolves,
    /// Majority team; wins once every wolf is dead. Only villagers ever hold the gun.
    Village,
}

impl fmt::Display for Allegiance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Allegiance::Wolves => f.write_str("wolves"),
            Allegiance::Village => f.write_str("village"),
        }
    }
}

/// Errors raised while building a roster from a sign-up list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    /// The table has no entry for this many players.
    #[error("unsupported player count {count}")]
    UnsupportedPlayerCount {
        /// Number of ids handed in.
        count: usize,
    },
    /// The same id was handed in twice.
    #[error("participant {0} appears more than once")]
    DuplicateParticipant(ParticipantId),
}

/// A single player: identity and hidden allegiance are fixed, only `alive` ever changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    id: ParticipantId,
    allegiance: Allegiance,
    alive: bool,
}

impl Participant {
    /// Stable id of the participant.
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Hidden team of the participant.
    pub fn allegiance(&self) -> Allegiance {
        self.allegiance
    }

    /// Whether the participant is still in the game.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    fn kill(&mut self) -> Result<(), InvariantViolation> {
        if !self.alive {
            return Err(InvariantViolation::AlreadyDead(self.id));
        }
        self.alive = false;
        Ok(())
    }
}

/// The fixed set of participants of one game, kept in sign-up order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    participants: IndexMap<ParticipantId, Participant>,
}

impl Roster {
    /// Split `ids` into wolves and villagers according to `table`.
    ///
    /// The ids are shuffled uniformly and the first `minority` of the shuffled list become
    /// wolves, so the outcome does not depend on sign-up order.
    pub fn build<R>(
        ids: &[ParticipantId],
        table: &TeamSizeTable,
        rng: &mut R,
    ) -> Result<Self, RosterError>
    where
        R: Rng + ?Sized,
    {
        let mut seen = HashSet::with_capacity(ids.len());
        if let Some(duplicate) = ids.iter().find(|id| !seen.insert(**id)) {
            return Err(RosterError::DuplicateParticipant(*duplicate));
        }

        let minority = table
            .minority_size(ids.len())
            .ok_or(RosterError::UnsupportedPlayerCount { count: ids.len() })?;

        let mut shuffled = ids.to_vec();
        shuffled.shuffle(rng);
        let wolves = shuffled[..minority].iter().copied().collect::<HashSet<_>>();

        let participants = ids
            .iter()
            .map(|id| {
                let allegiance = if wolves.contains(id) {
                    Allegiance::Wolves
                } else {
                    Allegiance::Village
                };
                (
                    *id,
                    Participant {
                        id: *id,
                        allegiance,
                        alive: true,
                    },
                )
            })
            .collect();

        Ok(Self { participants })
    }

    /// Look up a participant.
    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    /// Whether `id` plays in this game.
    pub fn contains(&self, id: ParticipantId) -> bool {
        self.participants.contains_key(&id)
    }

    /// Whether `id` plays in this game and is still alive.
    pub fn is_alive(&self, id: ParticipantId) -> bool {
        self.get(id).is_some_and(Participant::is_alive)
    }

    /// Every participant in sign-up order.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Living participants in sign-up order.
    pub fn living(&self) -> impl Iterator<Item = &Participant> {
        self.participants().filter(|p| p.alive)
    }

    /// Ids of the living members of `allegiance`.
    pub fn living_ids(&self, allegiance: Allegiance) -> Vec<ParticipantId> {
        self.living()
            .filter(|p| p.allegiance == allegiance)
            .map(Participant::id)
            .collect()
    }

    /// Number of living members of `allegiance`.
    pub fn living_count(&self, allegiance: Allegiance) -> usize {
        self.living().filter(|p| p.allegiance == allegiance).count()
    }

    /// Ids of all members of `allegiance`, dead or alive.
    pub fn members(&self, allegiance: Allegiance) -> Vec<ParticipantId> {
        self.participants()
            .filter(|p| p.allegiance == allegiance)
            .map(Participant::id)
            .collect()
    }

    /// Kill a living participant, returning their allegiance.
    pub fn kill(&mut self, id: ParticipantId) -> Result<Allegiance, InvariantViolation> {
        let participant = self
            .participants
            .get_mut(&id)
            .ok_or(InvariantViolation::UnknownParticipant(id))?;
        participant.kill()?;
        Ok(participant.allegiance)
    }
}
