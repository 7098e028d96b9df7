use std::{
    fmt,
    sync::{Arc, Weak},
};

use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    dao::{models::GameSummaryEntity, stats_store::StatsStore},
    dto::{announcement::Announcement, status::GameStatus},
    error::{EngineError, Rejection},
    services::{outbox::Outbox, timer::RoundTimer},
    state::{
        ChannelId, GameRegistry,
        day_cycle::DayNumber,
        game::{GameState, Transition},
        roster::ParticipantId,
    },
};

struct EngineInner {
    game: GameState,
    timer: Option<RoundTimer>,
}

/// Runs one game: serializes every command and timeout behind a single lock, owns the
/// round timer and publishes the resulting announcements.
pub struct GameEngine {
    id: Uuid,
    channel: ChannelId,
    inner: Mutex<EngineInner>,
    outbox: Outbox,
    config: Arc<EngineConfig>,
    stats: Arc<dyn StatsStore>,
    registry: Weak<GameRegistry>,
    this: Weak<GameEngine>,
}

impl fmt::Debug for GameEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameEngine")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl GameEngine {
    /// Build the game, queue role messages and the opening announcements, and arm the timer
    /// for day 1.
    pub(crate) fn start(
        registry: &Arc<GameRegistry>,
        channel: ChannelId,
        participants: &[ParticipantId],
        seed: u64,
    ) -> Result<Arc<Self>, EngineError> {
        let config = registry.config();
        let (game, opening) = GameState::start(channel, participants, &config, seed)?;
        let outbox = Outbox::spawn(channel, registry.messenger());

        outbox.announce_all(opening.announcements);
        for (participant, role) in game.role_assignments() {
            outbox.whisper(participant, role);
        }

        Ok(Arc::new_cyclic(|this: &Weak<Self>| {
            let timer = opening.next_day.map(|day| {
                RoundTimer::arm(this.clone(), day.number, day.deadline, config.reminder_lead())
            });
            Self {
                id: game.id(),
                channel,
                inner: Mutex::new(EngineInner { game, timer }),
                outbox,
                config,
                stats: registry.stats(),
                registry: Arc::downgrade(registry),
                this: this.clone(),
            }
        }))
    }

    /// Game identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Channel the game is played in.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Let `actor` shoot `target`.
    pub async fn eliminate(
        &self,
        actor: ParticipantId,
        target: ParticipantId,
    ) -> Result<Transition, EngineError> {
        self.apply(|game| game.eliminate(actor, target)).await
    }

    /// Close `day` because its deadline passed. Called by the round timer.
    pub async fn expire_day(&self, day: DayNumber) -> Result<Transition, EngineError> {
        self.apply(|game| game.expire_day(day)).await
    }

    /// End the game without a winner.
    pub async fn force_end(&self, reason: &str) -> Result<(), EngineError> {
        self.apply(|game| game.force_end(reason).map_err(EngineError::from))
            .await
            .map(|_| ())
    }

    /// Warn the gun-bearer that `day` is about to run out.
    pub async fn remind(&self, day: DayNumber) {
        let inner = self.inner.lock().await;
        let game = &inner.game;
        let open_day = game
            .current_day()
            .filter(|current| current.number() == day && current.is_open());
        match (game.is_running(), open_day, game.gun_bearer()) {
            (true, Some(current), Some(bearer)) => {
                self.outbox.announce(Announcement::TimeRunningOut {
                    day,
                    bearer,
                    remaining_secs: current.time_left(Instant::now()).as_secs(),
                });
            }
            _ => debug!(game_id = %self.id, day, "reminder for a closed day skipped"),
        }
    }

    /// Snapshot of the game.
    pub async fn status(&self) -> GameStatus {
        self.inner.lock().await.game.status(Instant::now())
    }

    /// Send `participant` their role message again.
    pub async fn resend_role(&self, participant: ParticipantId) -> Result<(), Rejection> {
        let inner = self.inner.lock().await;
        if !inner.game.is_running() {
            return Err(Rejection::GameNotRunning);
        }
        let role = inner
            .game
            .role_assignment(participant)
            .ok_or(Rejection::NotParticipating)?;
        self.outbox.whisper(participant, role);
        Ok(())
    }

    /// Run `f` against the current game state.
    pub async fn read<R>(&self, f: impl FnOnce(&GameState) -> R) -> R {
        f(&self.inner.lock().await.game)
    }

    async fn apply<F>(&self, step: F) -> Result<Transition, EngineError>
    where
        F: FnOnce(&mut GameState) -> Result<Transition, EngineError>,
    {
        let mut inner = self.inner.lock().await;
        let (result, transition) = match step(&mut inner.game) {
            Ok(transition) => (Ok(()), transition),
            Err(EngineError::Aborted(violation)) => {
                error!(
                    game_id = %self.id,
                    channel = %self.channel,
                    error = %violation,
                    "game state violated an invariant; aborting game"
                );
                let transition = inner.game.abort("an internal error stopped the game");
                (Err(EngineError::Aborted(violation)), transition)
            }
            Err(err) => return Err(err),
        };

        if transition.finished {
            if let Some(timer) = inner.timer.take() {
                timer.cancel();
            }
        } else if let Some(day) = transition.next_day {
            let timer = RoundTimer::arm(
                self.this.clone(),
                day.number,
                day.deadline,
                self.config.reminder_lead(),
            );
            if let Some(previous) = inner.timer.replace(timer) {
                previous.cancel();
            }
        }

        let summary = transition
            .winner
            .map(|_| GameSummaryEntity::from(&inner.game));
        self.outbox.announce_all(transition.announcements.iter().cloned());
        drop(inner);

        if transition.finished {
            info!(game_id = %self.id, channel = %self.channel, winner = ?transition.winner, "game finished");
            if let Some(registry) = self.registry.upgrade() {
                registry.remove(self.channel, self.id);
            }
        }
        if let Some(summary) = summary {
            self.record_summary(summary);
        }

        result.map(|()| transition)
    }

    fn record_summary(&self, summary: GameSummaryEntity) {
        let stats = self.stats.clone();
        let outbox = self.outbox.clone();
        let game_id = self.id;
        tokio::spawn(async move {
            match stats.save_game_summary(summary).await {
                Ok(record_id) => {
                    info!(%game_id, record_id, "game summary stored");
                    outbox.announce(Announcement::GameRecorded { record_id });
                }
                Err(err) => {
                    warn!(%game_id, error = %err, "failed to store game summary");
                    outbox.announce(Announcement::ReplayUnavailable);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::{DEFAULT_DAY_LENGTH, TeamSizeTable},
        services::fakes::{Harness, failing_stats_registry, harness, ids, settle},
        state::roster::Allegiance,
    };

    const CHANNEL: ChannelId = ChannelId(77);

    fn default_harness() -> Harness {
        harness(EngineConfig::default(), &[])
    }

    async fn bearer_and_wolf(engine: &GameEngine) -> (ParticipantId, ParticipantId) {
        engine
            .read(|game| {
                (
                    game.gun_bearer().unwrap(),
                    game.roster().living_ids(Allegiance::Wolves)[0],
                )
            })
            .await
    }

    async fn dead_count(engine: &GameEngine) -> usize {
        engine
            .read(|game| game.roster().participants().filter(|p| !p.is_alive()).count())
            .await
    }

    fn rejection<T: std::fmt::Debug>(result: Result<T, EngineError>) -> Rejection {
        match result {
            Err(EngineError::Rejected(rejection)) => rejection,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn village_win_removes_game_and_records_summary() {
        let h = default_harness();
        let engine = h.registry.start_seeded(CHANNEL, &ids(3), 1).unwrap();
        let (bearer, wolf) = bearer_and_wolf(&engine).await;

        let transition = engine.eliminate(bearer, wolf).await.unwrap();
        assert_eq!(transition.winner, Some(Allegiance::Village));
        settle().await;

        assert!(h.registry.get(CHANNEL).is_none());
        let summaries = h.stats.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].winner, Some(Allegiance::Village));
        let announcements = h.messenger.announcements();
        assert!(announcements.iter().any(|a| matches!(
            a,
            Announcement::GameOver {
                winner: Allegiance::Village,
                ..
            }
        )));
        assert_eq!(
            announcements.last(),
            Some(&Announcement::GameRecorded { record_id: 1 })
        );
        assert_eq!(h.messenger.private().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn eleven_players_bearer_keeps_gun_through_four_wolf_shots() {
        let h = default_harness();
        let engine = h.registry.start_seeded(CHANNEL, &ids(11), 8).unwrap();
        let (bearer, _) = bearer_and_wolf(&engine).await;

        for _ in 0..4 {
            let (current, wolf) = bearer_and_wolf(&engine).await;
            assert_eq!(current, bearer);
            engine.eliminate(bearer, wolf).await.unwrap();
        }
        settle().await;

        assert!(h.registry.get(CHANNEL).is_none());
        assert_eq!(
            engine.read(|game| game.winner()).await,
            Some(Allegiance::Village)
        );
        assert_eq!(dead_count(&engine).await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn missed_deadline_kills_bearer_and_redistributes_gun() {
        let h = default_harness();
        let engine = h.registry.start_seeded(CHANNEL, &ids(6), 3).unwrap();
        let (old, _) = bearer_and_wolf(&engine).await;

        tokio::time::sleep(DEFAULT_DAY_LENGTH + Duration::from_secs(1)).await;
        settle().await;

        let (alive, new, allegiance, day) = engine
            .read(|game| {
                let new = game.gun_bearer().unwrap();
                (
                    game.roster().is_alive(old),
                    new,
                    game.roster().get(new).unwrap().allegiance(),
                    game.current_day().unwrap().number(),
                )
            })
            .await;
        assert!(!alive);
        assert_ne!(new, old);
        assert_eq!(allegiance, Allegiance::Village);
        assert_eq!(day, 2);

        let announcements = h.messenger.announcements();
        assert!(announcements.iter().any(|a| matches!(
            a,
            Announcement::TimeRunningOut { day: 1, bearer, remaining_secs }
                if *bearer == old && (59..=60).contains(remaining_secs)
        )));
        assert!(announcements.contains(&Announcement::BearerTimedOut { bearer: old }));
    }

    #[tokio::test(start_paused = true)]
    async fn short_day_skips_the_reminder() {
        let config = EngineConfig::new(Duration::from_secs(30), TeamSizeTable::default()).unwrap();
        let h = harness(config, &[]);
        let engine = h.registry.start_seeded(CHANNEL, &ids(6), 4).unwrap();
        let (old, _) = bearer_and_wolf(&engine).await;

        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;

        let announcements = h.messenger.announcements();
        assert!(
            !announcements
                .iter()
                .any(|a| matches!(a, Announcement::TimeRunningOut { .. }))
        );
        assert!(announcements.contains(&Announcement::BearerTimedOut { bearer: old }));
    }

    #[tokio::test(start_paused = true)]
    async fn timer_is_rearmed_for_the_next_day() {
        let h = default_harness();
        let engine = h.registry.start_seeded(CHANNEL, &ids(6), 5).unwrap();
        let (bearer, wolf) = bearer_and_wolf(&engine).await;

        tokio::time::sleep(Duration::from_secs(100)).await;
        engine.eliminate(bearer, wolf).await.unwrap();

        tokio::time::sleep(Duration::from_secs(550)).await;
        settle().await;
        assert_eq!(dead_count(&engine).await, 1);
        assert_eq!(engine.status().await.time_left_secs, 50);

        tokio::time::sleep(Duration::from_secs(51)).await;
        settle().await;
        assert_eq!(dead_count(&engine).await, 2);
        assert!(
            h.messenger
                .announcements()
                .contains(&Announcement::BearerTimedOut { bearer })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shot_then_timer_leaves_one_death() {
        let h = default_harness();
        let engine = h.registry.start_seeded(CHANNEL, &ids(6), 6).unwrap();
        let (bearer, wolf) = bearer_and_wolf(&engine).await;

        engine.eliminate(bearer, wolf).await.unwrap();
        assert_eq!(
            rejection(engine.expire_day(1).await),
            Rejection::TooLate { day: 1 }
        );
        assert_eq!(dead_count(&engine).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_then_shot_leaves_one_death() {
        let h = default_harness();
        let engine = h.registry.start_seeded(CHANNEL, &ids(6), 7).unwrap();
        let (bearer, wolf) = bearer_and_wolf(&engine).await;

        engine.expire_day(1).await.unwrap();
        assert_eq!(
            rejection(engine.eliminate(bearer, wolf).await),
            Rejection::TooLate { day: 1 }
        );
        assert_eq!(dead_count(&engine).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_shot_and_timeout_close_the_day_once() {
        for seed in 0..20 {
            let h = default_harness();
            let engine = h.registry.start_seeded(CHANNEL, &ids(8), seed).unwrap();
            let (bearer, wolf) = bearer_and_wolf(&engine).await;

            let (shot, timeout) = tokio::join!(engine.eliminate(bearer, wolf), engine.expire_day(1));
            let rejections = [
                shot.as_ref().err().cloned(),
                timeout.as_ref().err().cloned(),
            ];
            assert_eq!(shot.is_ok() as usize + timeout.is_ok() as usize, 1);
            assert!(
                rejections
                    .contains(&Some(EngineError::Rejected(Rejection::TooLate { day: 1 })))
            );
            assert_eq!(dead_count(&engine).await, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn force_end_cancels_timer_and_rejects_late_calls() {
        let h = default_harness();
        let engine = h.registry.start_seeded(CHANNEL, &ids(6), 9).unwrap();
        let (bearer, wolf) = bearer_and_wolf(&engine).await;

        h.registry.force_end(CHANNEL, "stopped by an admin").await.unwrap();
        assert!(h.registry.get(CHANNEL).is_none());
        assert_eq!(
            rejection(engine.eliminate(bearer, wolf).await),
            Rejection::GameNotRunning
        );
        assert_eq!(
            rejection(engine.expire_day(1).await),
            Rejection::GameNotRunning
        );

        tokio::time::sleep(DEFAULT_DAY_LENGTH * 2).await;
        settle().await;

        assert_eq!(dead_count(&engine).await, 0);
        let announcements = h.messenger.announcements();
        assert!(announcements.contains(&Announcement::GameAborted {
            reason: "stopped by an admin".into()
        }));
        assert!(
            !announcements
                .iter()
                .any(|a| matches!(a, Announcement::BearerTimedOut { .. } | Announcement::TimeRunningOut { .. }))
        );
        assert!(h.stats.summaries().is_empty());
        assert_eq!(
            h.registry.force_end(CHANNEL, "again").await,
            Err(EngineError::Rejected(Rejection::GameNotRunning))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_game_in_channel_is_rejected() {
        let h = default_harness();
        h.registry.start_seeded(CHANNEL, &ids(3), 1).unwrap();

        assert_eq!(
            rejection(h.registry.start(CHANNEL, &ids(6))),
            Rejection::GameAlreadyRunning
        );
        assert!(h.registry.start(ChannelId(78), &ids(6)).is_ok());
        assert_eq!(h.registry.active_games(), vec![CHANNEL, ChannelId(78)]);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_player_count_leaves_channel_free() {
        let h = default_harness();
        assert_eq!(
            rejection(h.registry.start(CHANNEL, &ids(4))),
            Rejection::InvalidPlayerCount {
                requested: 4,
                supported: "3, 6, 8, 9, 10 or 11".into()
            }
        );
        assert!(h.registry.active_games().is_empty());
        settle().await;
        assert!(h.messenger.announcements().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn undelivered_role_message_is_announced() {
        let h = harness(EngineConfig::default(), &[ParticipantId(2)]);
        h.registry.start_seeded(CHANNEL, &ids(3), 2).unwrap();
        settle().await;

        assert!(h.messenger.announcements().contains(
            &Announcement::RoleMessageUndelivered {
                participant: ParticipantId(2)
            }
        ));
        assert_eq!(h.messenger.private().len(), 2);
        assert!(h.registry.get(CHANNEL).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn role_message_can_be_requested_again() {
        let h = default_harness();
        let engine = h.registry.start_seeded(CHANNEL, &ids(6), 10).unwrap();
        settle().await;

        engine.resend_role(ParticipantId(4)).await.unwrap();
        assert_eq!(
            engine.resend_role(ParticipantId(40)).await,
            Err(Rejection::NotParticipating)
        );
        settle().await;

        let private = h.messenger.private();
        assert_eq!(private.len(), 7);
        assert_eq!(private.last().unwrap().0, ParticipantId(4));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_stats_write_is_announced() {
        let messenger = Arc::new(crate::services::fakes::RecordingMessenger::default());
        let registry = failing_stats_registry(messenger.clone());
        let engine = registry.start_seeded(CHANNEL, &ids(3), 11).unwrap();
        let (bearer, wolf) = bearer_and_wolf(&engine).await;

        engine.eliminate(bearer, wolf).await.unwrap();
        settle().await;

        let announcements = messenger.announcements();
        assert!(announcements.contains(&Announcement::ReplayUnavailable));
        assert!(
            !announcements
                .iter()
                .any(|a| matches!(a, Announcement::GameRecorded { .. }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_time_left_and_gun_bearer() {
        let h = default_harness();
        let engine = h.registry.start_seeded(CHANNEL, &ids(8), 12).unwrap();
        let (bearer, _) = bearer_and_wolf(&engine).await;

        tokio::time::sleep(Duration::from_secs(100)).await;
        let status = engine.status().await;

        assert_eq!(status.game_id, engine.id());
        assert!(status.running);
        assert_eq!(status.day, Some(1));
        assert_eq!(status.time_left_secs, 500);
        assert_eq!(status.living.len(), 8);
        assert_eq!(status.wolves_alive, 3);
        assert_eq!(status.gun_bearer, Some(bearer));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_every_game() {
        let h = default_harness();
        h.registry.start_seeded(CHANNEL, &ids(3), 1).unwrap();
        h.registry.start_seeded(ChannelId(90), &ids(6), 2).unwrap();

        h.registry.shutdown().await;
        settle().await;

        assert!(h.registry.active_games().is_empty());
        let aborted = h
            .messenger
            .announcements()
            .into_iter()
            .filter(|a| matches!(a, Announcement::GameAborted { .. }))
            .count();
        assert_eq!(aborted, 2);
    }
}
