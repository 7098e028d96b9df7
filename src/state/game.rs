use std::{collections::BTreeSet, time::Duration};

use rand::{SeedableRng, rngs::StdRng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    dto::{
        announcement::{Announcement, RoleAssignment, TeamReveal},
        status::GameStatus,
    },
    error::{EngineError, InvariantViolation, Rejection},
    state::{
        ChannelId,
        day_cycle::{CloseReason, DayCycle, DayNumber},
        gun::GunLedger,
        roster::{Allegiance, ParticipantId, Roster, RosterError},
    },
};

/// Kinds of entries in the action log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// The game started.
    GameStart,
    /// The gun was handed to the target.
    GiveGun,
    /// A day opened.
    DayStart,
    /// The actor shot the target.
    Shoot,
    /// The engine killed the target for missing the deadline.
    ModKill,
    /// The target died.
    Death,
    /// A day closed.
    DayEnd,
    /// The game ended.
    GameEnd,
}

/// One entry of the action log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    /// Position in the log, starting at 1.
    pub order: u64,
    /// Wall-clock time of the action.
    pub at: OffsetDateTime,
    /// Day the action happened on; 0 before the first day.
    pub day: DayNumber,
    /// Who acted; the host for engine-driven actions.
    pub actor: ParticipantId,
    /// What happened.
    pub kind: ActionKind,
    /// Who it happened to, if anyone.
    pub target: Option<ParticipantId>,
}

/// An accepted external stimulus, recorded so a game can be replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "input", rename_all = "snake_case")]
pub enum GameInput {
    /// The gun-bearer shot someone.
    Eliminate {
        /// The gun-bearer.
        actor: ParticipantId,
        /// Who was shot.
        target: ParticipantId,
    },
    /// A day ran out.
    Timeout {
        /// The expired day.
        day: DayNumber,
    },
}

/// Result of an accepted shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShotOutcome {
    /// Day the shot closed.
    pub day: DayNumber,
    /// Who died: the target if they were a wolf, the shooter otherwise.
    pub killed: ParticipantId,
    /// Allegiance of the dead participant.
    pub killed_allegiance: Allegiance,
    /// Who lived and holds the gun next.
    pub survivor: ParticipantId,
}

/// A day that was opened by a transition and needs a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenedDay {
    /// Day number.
    pub number: DayNumber,
    /// When the day times out.
    pub deadline: Instant,
}

/// Everything the engine has to do once the state lock is released.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    /// Channel announcements, in order.
    pub announcements: Vec<Announcement>,
    /// The newly opened day, if any.
    pub next_day: Option<OpenedDay>,
    /// Winning allegiance if the transition ended the game.
    pub winner: Option<Allegiance>,
    /// Whether the game stopped running (win or abort).
    pub finished: bool,
    /// Outcome of the shot, for eliminations.
    pub shot: Option<ShotOutcome>,
}

enum DayEnding {
    Shot {
        shooter: ParticipantId,
        target: ParticipantId,
    },
    Expired {
        bearer: ParticipantId,
    },
}

/// Aggregate state of one popcorn game.
///
/// All methods are synchronous and free of I/O; the engine calls them while holding the
/// game's lock and acts on the returned [`Transition`] afterwards.
#[derive(Debug, Clone)]
pub struct GameState {
    id: Uuid,
    channel: ChannelId,
    host: ParticipantId,
    day_length: Duration,
    seed: u64,
    rng: StdRng,
    running: bool,
    roster: Roster,
    gun: GunLedger,
    day: Option<DayCycle>,
    closed_days: BTreeSet<DayNumber>,
    // Gun-bearer killed by the last timeout; cleared by their first late shot or the next close.
    expired_bearer: Option<(DayNumber, ParticipantId)>,
    winner: Option<Allegiance>,
    started_at: OffsetDateTime,
    ended_at: Option<OffsetDateTime>,
    actions: Vec<ActionRecord>,
    inputs: Vec<GameInput>,
}

impl GameState {
    /// Build the roster, hand out the first gun and open day 1.
    ///
    /// All randomness comes from a generator seeded with `seed`, so the same seed and the
    /// same inputs always produce the same game.
    pub fn start(
        channel: ChannelId,
        participants: &[ParticipantId],
        config: &EngineConfig,
        seed: u64,
    ) -> Result<(Self, Transition), EngineError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let roster =
            Roster::build(participants, config.team_sizes(), &mut rng).map_err(|err| match err {
                RosterError::UnsupportedPlayerCount { count } => Rejection::InvalidPlayerCount {
                    requested: count,
                    supported: config.team_sizes().describe(),
                },
                RosterError::DuplicateParticipant(id) => Rejection::DuplicateParticipant(id),
            })?;

        let mut state = Self {
            id: Uuid::new_v4(),
            channel,
            host: config.host_id(),
            day_length: config.day_length(),
            seed,
            rng,
            running: true,
            roster,
            gun: GunLedger::new(),
            day: None,
            closed_days: BTreeSet::new(),
            expired_bearer: None,
            winner: None,
            started_at: OffsetDateTime::now_utc(),
            ended_at: None,
            actions: Vec::new(),
            inputs: Vec::new(),
        };

        state.record(state.host, ActionKind::GameStart, None);
        let mut transition = Transition::default();
        transition.announcements.push(Announcement::GameStarted {
            players: state.roster.participants().map(|p| p.id()).collect(),
            wolves_alive: state.roster.living_count(Allegiance::Wolves),
        });
        state.distribute_gun(&mut transition)?;

        Ok((state, transition))
    }

    /// Re-run recorded inputs against a fresh game built from the same seed.
    pub fn replay(
        channel: ChannelId,
        participants: &[ParticipantId],
        config: &EngineConfig,
        seed: u64,
        inputs: &[GameInput],
    ) -> Result<Self, EngineError> {
        let (mut state, _) = Self::start(channel, participants, config, seed)?;
        for input in inputs {
            match *input {
                GameInput::Eliminate { actor, target } => state.eliminate(actor, target)?,
                GameInput::Timeout { day } => state.expire_day(day)?,
            };
        }
        Ok(state)
    }

    /// Let `actor` shoot `target`.
    ///
    /// Preconditions are checked in a fixed order and the first failing one is reported.
    pub fn eliminate(
        &mut self,
        actor: ParticipantId,
        target: ParticipantId,
    ) -> Result<Transition, EngineError> {
        if !self.running {
            return Err(Rejection::GameNotRunning.into());
        }
        if target == self.host {
            return Err(Rejection::TargetIsHost.into());
        }
        if actor == target {
            return Err(Rejection::SelfTarget.into());
        }
        if !self.roster.contains(actor) {
            return Err(Rejection::NotParticipating.into());
        }
        if !self.roster.is_alive(actor) {
            return Err(
                match self.expired_bearer.take_if(|(_, bearer)| *bearer == actor) {
                    Some((day, _)) => Rejection::TooLate { day },
                    None => Rejection::ActorDead,
                }
                .into(),
            );
        }
        if !self.gun.is_held_by(actor) {
            return Err(Rejection::NotGunBearer.into());
        }
        match self.roster.get(target) {
            None => return Err(Rejection::UnknownTarget(target).into()),
            Some(participant) if !participant.is_alive() => {
                return Err(Rejection::TargetAlreadyEliminated(target).into());
            }
            Some(_) => {}
        }
        self.open_day_number()?;

        self.inputs.push(GameInput::Eliminate { actor, target });
        self.record(actor, ActionKind::Shoot, Some(target));
        self.close_day(DayEnding::Shot {
            shooter: actor,
            target,
        })
    }

    /// Close `day` because its deadline passed; the gun-bearer dies.
    ///
    /// A timer for a day that is already over gets [`Rejection::TooLate`].
    pub fn expire_day(&mut self, day: DayNumber) -> Result<Transition, EngineError> {
        if !self.running {
            return Err(Rejection::GameNotRunning.into());
        }
        match self.open_day_number() {
            Ok(current) if current == day => {}
            _ => return Err(Rejection::TooLate { day }.into()),
        }
        let bearer = self
            .gun
            .holder()
            .ok_or(InvariantViolation::NoGunBearer(day))?;

        self.inputs.push(GameInput::Timeout { day });
        self.record(self.host, ActionKind::ModKill, Some(bearer));
        self.close_day(DayEnding::Expired { bearer })
    }

    /// End the game from the outside without a winner.
    pub fn force_end(&mut self, reason: &str) -> Result<Transition, Rejection> {
        if !self.running {
            return Err(Rejection::GameNotRunning);
        }
        Ok(self.abort(reason))
    }

    /// Stop the game unconditionally, closing the open day as abandoned.
    pub fn abort(&mut self, reason: &str) -> Transition {
        self.running = false;
        if let Some(day) = self.day.as_mut() {
            if day.close(CloseReason::Abandoned).is_ok() {
                self.closed_days.insert(day.number());
            }
        }
        self.ended_at = Some(OffsetDateTime::now_utc());
        self.record(self.host, ActionKind::GameEnd, None);

        Transition {
            announcements: vec![Announcement::GameAborted {
                reason: reason.to_string(),
            }],
            finished: true,
            ..Transition::default()
        }
    }

    /// The winning allegiance if a win condition holds for the living roster.
    pub fn evaluate_winner(&self) -> Option<Allegiance> {
        let wolves = self.roster.living_count(Allegiance::Wolves);
        let village = self.roster.living_count(Allegiance::Village);
        if wolves == 0 {
            Some(Allegiance::Village)
        } else if wolves >= village {
            Some(Allegiance::Wolves)
        } else {
            None
        }
    }

    /// Private role message for `participant`, if they play in this game.
    pub fn role_assignment(&self, participant: ParticipantId) -> Option<RoleAssignment> {
        let allegiance = self.roster.get(participant)?.allegiance();
        let teammates = match allegiance {
            Allegiance::Wolves => self.roster.members(Allegiance::Wolves),
            Allegiance::Village => Vec::new(),
        };
        Some(RoleAssignment {
            game_id: self.id,
            channel: self.channel,
            allegiance,
            teammates,
        })
    }

    /// Role messages for every participant, in sign-up order.
    pub fn role_assignments(&self) -> Vec<(ParticipantId, RoleAssignment)> {
        self.roster
            .participants()
            .filter_map(|p| Some((p.id(), self.role_assignment(p.id())?)))
            .collect()
    }

    /// Snapshot for the status command.
    pub fn status(&self, now: Instant) -> GameStatus {
        GameStatus {
            game_id: self.id,
            running: self.running,
            day: self.day.as_ref().map(DayCycle::number),
            time_left_secs: self
                .day
                .as_ref()
                .map_or(0, |day| day.time_left(now).as_secs()),
            living: self.roster.living().map(|p| p.id()).collect(),
            wolves_alive: self.roster.living_count(Allegiance::Wolves),
            gun_bearer: self.gun.holder(),
        }
    }

    /// Both teams with their members and survivors.
    pub fn reveal_teams(&self) -> Vec<TeamReveal> {
        [Allegiance::Wolves, Allegiance::Village]
            .into_iter()
            .map(|allegiance| TeamReveal {
                allegiance,
                members: self.roster.members(allegiance),
                survivors: self.roster.living_ids(allegiance),
            })
            .collect()
    }

    /// Game identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Channel the game is played in.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Seed of the game's random generator.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Whether commands are still accepted.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The participants.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Current gun-bearer.
    pub fn gun_bearer(&self) -> Option<ParticipantId> {
        self.gun.holder()
    }

    /// The most recently opened day.
    pub fn current_day(&self) -> Option<&DayCycle> {
        self.day.as_ref()
    }

    /// Numbers of every closed day.
    pub fn closed_days(&self) -> &BTreeSet<DayNumber> {
        &self.closed_days
    }

    /// Winning allegiance once the game is over.
    pub fn winner(&self) -> Option<Allegiance> {
        self.winner
    }

    /// Wall-clock start of the game.
    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    /// Wall-clock end of the game.
    pub fn ended_at(&self) -> Option<OffsetDateTime> {
        self.ended_at
    }

    /// The action log.
    pub fn actions(&self) -> &[ActionRecord] {
        &self.actions
    }

    /// Accepted inputs, in order.
    pub fn inputs(&self) -> &[GameInput] {
        &self.inputs
    }

    fn open_day_number(&self) -> Result<DayNumber, Rejection> {
        match &self.day {
            Some(day) if day.is_open() => Ok(day.number()),
            Some(day) => Err(Rejection::TooLate { day: day.number() }),
            None => Err(Rejection::GameNotRunning),
        }
    }

    fn close_day(&mut self, ending: DayEnding) -> Result<Transition, EngineError> {
        let (reason, killed, survivor) = match ending {
            DayEnding::Shot { shooter, target } => {
                let target_is_wolf = self
                    .roster
                    .get(target)
                    .is_some_and(|p| p.allegiance() == Allegiance::Wolves);
                if target_is_wolf {
                    (CloseReason::Elimination, target, Some(shooter))
                } else {
                    (CloseReason::Elimination, shooter, Some(target))
                }
            }
            DayEnding::Expired { bearer } => (CloseReason::Timeout, bearer, None),
        };

        let day = self.day.as_mut().ok_or(Rejection::GameNotRunning)?;
        let number = day.number();
        if self.closed_days.contains(&number) {
            return Err(Rejection::TooLate { day: number }.into());
        }
        day.close(reason)
            .map_err(|closed| Rejection::TooLate { day: closed.day })?;
        self.closed_days.insert(number);

        let killed_allegiance = self.roster.kill(killed)?;
        if self.gun.is_held_by(killed) {
            self.gun.clear();
        }
        self.record(survivor.unwrap_or(self.host), ActionKind::Death, Some(killed));
        self.record(self.host, ActionKind::DayEnd, None);
        self.expired_bearer = match reason {
            CloseReason::Timeout => Some((number, killed)),
            _ => None,
        };
        debug!(game_id = %self.id, day = number, ?reason, %killed, "day closed");

        let mut transition = Transition::default();
        transition
            .announcements
            .push(Announcement::DayEnded { day: number });
        match survivor {
            None => transition
                .announcements
                .push(Announcement::BearerTimedOut { bearer: killed }),
            Some(survivor) => {
                transition.announcements.push(match killed_allegiance {
                    Allegiance::Wolves => Announcement::WolfShot {
                        shooter: survivor,
                        target: killed,
                    },
                    Allegiance::Village => Announcement::InnocentShot {
                        shooter: killed,
                        target: survivor,
                    },
                });
                transition.shot = Some(ShotOutcome {
                    day: number,
                    killed,
                    killed_allegiance,
                    survivor,
                });
            }
        }

        if let Some(winner) = self.evaluate_winner() {
            self.finish(winner, &mut transition);
            return Ok(transition);
        }

        match (survivor, killed_allegiance) {
            (Some(shooter), Allegiance::Wolves) => {
                self.gun.assign(&self.roster, shooter)?;
                self.start_day(&mut transition)?;
            }
            (Some(target), Allegiance::Village) => self.give_gun(target, &mut transition)?,
            (None, _) => self.distribute_gun(&mut transition)?,
        }

        Ok(transition)
    }

    fn finish(&mut self, winner: Allegiance, transition: &mut Transition) {
        self.running = false;
        self.winner = Some(winner);
        self.ended_at = Some(OffsetDateTime::now_utc());
        self.record(self.host, ActionKind::GameEnd, None);

        transition.winner = Some(winner);
        transition.finished = true;
        transition.announcements.push(Announcement::GameOver {
            winner,
            teams: self.reveal_teams(),
        });
    }

    fn distribute_gun(&mut self, transition: &mut Transition) -> Result<(), InvariantViolation> {
        let candidates = self.roster.living_ids(Allegiance::Village);
        let bearer = *candidates
            .choose(&mut self.rng)
            .ok_or(InvariantViolation::NoGunCandidate(Allegiance::Village))?;
        self.give_gun(bearer, transition)
    }

    fn give_gun(
        &mut self,
        bearer: ParticipantId,
        transition: &mut Transition,
    ) -> Result<(), InvariantViolation> {
        self.gun.assign(&self.roster, bearer)?;
        self.record(self.host, ActionKind::GiveGun, Some(bearer));
        transition
            .announcements
            .push(Announcement::GunAssigned { bearer });
        self.start_day(transition)
    }

    fn start_day(&mut self, transition: &mut Transition) -> Result<(), InvariantViolation> {
        let number = self.day.as_ref().map_or(1, |day| day.number() + 1);
        let bearer = self
            .gun
            .holder()
            .ok_or(InvariantViolation::NoGunBearer(number))?;
        let day = DayCycle::open(number, self.day_length);
        transition.next_day = Some(OpenedDay {
            number,
            deadline: day.deadline(),
        });
        self.day = Some(day);
        self.record(self.host, ActionKind::DayStart, None);
        transition.announcements.push(Announcement::DayStarted {
            day: number,
            bearer,
            length_secs: self.day_length.as_secs(),
        });
        Ok(())
    }

    fn record(&mut self, actor: ParticipantId, kind: ActionKind, target: Option<ParticipantId>) {
        self.actions.push(ActionRecord {
            order: self.actions.len() as u64 + 1,
            at: OffsetDateTime::now_utc(),
            day: self.day.as_ref().map_or(0, DayCycle::number),
            actor,
            kind,
            target,
        });
    }
}
