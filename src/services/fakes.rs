//! Recording collaborators for engine tests.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use futures::future::{self, BoxFuture, FutureExt};

use crate::{
    config::EngineConfig,
    dao::{
        models::GameSummaryEntity,
        stats_store::{InMemoryStatsStore, StatsStore},
        storage::{StorageError, StorageResult},
    },
    dto::announcement::{Announcement, RoleAssignment},
    services::outbox::{DeliveryError, Messenger},
    state::{ChannelId, GameRegistry, SharedRegistry, roster::ParticipantId},
};

#[derive(Default)]
pub(crate) struct RecordingMessenger {
    announcements: Mutex<Vec<Announcement>>,
    private: Mutex<Vec<(ParticipantId, RoleAssignment)>>,
    unreachable: HashSet<ParticipantId>,
}

impl RecordingMessenger {
    pub(crate) fn unreachable(ids: &[ParticipantId]) -> Self {
        Self {
            unreachable: ids.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub(crate) fn announcements(&self) -> Vec<Announcement> {
        self.announcements.lock().unwrap().clone()
    }

    pub(crate) fn private(&self) -> Vec<(ParticipantId, RoleAssignment)> {
        self.private.lock().unwrap().clone()
    }
}

impl Messenger for RecordingMessenger {
    fn notify_channel(
        &self,
        _channel: ChannelId,
        announcement: Announcement,
    ) -> BoxFuture<'static, Result<(), DeliveryError>> {
        self.announcements.lock().unwrap().push(announcement);
        future::ready(Ok(())).boxed()
    }

    fn notify_privately(
        &self,
        participant: ParticipantId,
        role: RoleAssignment,
    ) -> BoxFuture<'static, Result<(), DeliveryError>> {
        if self.unreachable.contains(&participant) {
            return future::ready(Err(DeliveryError::Unreachable(participant))).boxed();
        }
        self.private.lock().unwrap().push((participant, role));
        future::ready(Ok(())).boxed()
    }
}

pub(crate) struct FailingStatsStore;

impl StatsStore for FailingStatsStore {
    fn save_game_summary(&self, _summary: GameSummaryEntity) -> BoxFuture<'static, StorageResult<u64>> {
        let err = StorageError::unavailable("disk full".into(), std::io::Error::other("disk full"));
        future::ready(Err(err)).boxed()
    }
}

pub(crate) struct Harness {
    pub(crate) registry: SharedRegistry,
    pub(crate) messenger: Arc<RecordingMessenger>,
    pub(crate) stats: InMemoryStatsStore,
}

pub(crate) fn harness(config: EngineConfig, unreachable: &[ParticipantId]) -> Harness {
    let messenger = Arc::new(RecordingMessenger::unreachable(unreachable));
    let stats = InMemoryStatsStore::new();
    let registry = GameRegistry::new(config, messenger.clone(), Arc::new(stats.clone()));
    Harness {
        registry,
        messenger,
        stats,
    }
}

pub(crate) fn failing_stats_registry(messenger: Arc<RecordingMessenger>) -> SharedRegistry {
    GameRegistry::new(EngineConfig::default(), messenger, Arc::new(FailingStatsStore))
}

pub(crate) fn ids(count: u64) -> Vec<ParticipantId> {
    (1..=count).map(ParticipantId).collect()
}

/// Let spawned outbox, timer and stats tasks run to completion.
pub(crate) async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}
