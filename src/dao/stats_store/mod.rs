mod json_file;
mod memory;

pub use json_file::JsonLinesStatsStore;
pub use memory::InMemoryStatsStore;

use crate::dao::models::GameSummaryEntity;
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

/// Abstraction over the sink for finished-game statistics.
pub trait StatsStore: Send + Sync {
    /// Store `summary` and return the id of the new record.
    fn save_game_summary(&self, summary: GameSummaryEntity) -> BoxFuture<'static, StorageResult<u64>>;
}
