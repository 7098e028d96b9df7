//! Stats store that keeps summaries in memory. Useful for tests and local runs.

use std::sync::{Arc, RwLock};

use futures::future::{self, BoxFuture, FutureExt};

use crate::dao::{
    models::GameSummaryEntity,
    stats_store::StatsStore,
    storage::{StorageError, StorageResult},
};

#[derive(Debug, thiserror::Error)]
#[error("stats lock poisoned")]
struct PoisonedLock;

/// Thread-safe in-memory [`StatsStore`]; record ids are 1-based insertion positions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStatsStore {
    summaries: Arc<RwLock<Vec<GameSummaryEntity>>>,
}

impl InMemoryStatsStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored summary, oldest first.
    pub fn summaries(&self) -> Vec<GameSummaryEntity> {
        self.summaries
            .read()
            .map(|summaries| summaries.clone())
            .unwrap_or_default()
    }
}

impl StatsStore for InMemoryStatsStore {
    fn save_game_summary(&self, summary: GameSummaryEntity) -> BoxFuture<'static, StorageResult<u64>> {
        let result = self
            .summaries
            .write()
            .map_err(|_| StorageError::unavailable("failed to acquire write lock".into(), PoisonedLock))
            .map(|mut summaries| {
                summaries.push(summary);
                summaries.len() as u64
            });
        future::ready(result).boxed()
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;
    use crate::state::ChannelId;

    fn summary() -> GameSummaryEntity {
        GameSummaryEntity {
            game_id: Uuid::new_v4(),
            channel: ChannelId(1),
            seed: 3,
            participants: Vec::new(),
            inputs: Vec::new(),
            started_at: OffsetDateTime::UNIX_EPOCH,
            ended_at: None,
            winner: None,
            teams: Vec::new(),
            actions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn record_ids_count_up() {
        let store = InMemoryStatsStore::new();
        assert_eq!(store.save_game_summary(summary()).await.unwrap(), 1);
        assert_eq!(store.save_game_summary(summary()).await.unwrap(), 2);
        assert_eq!(store.summaries().len(), 2);
    }
}
