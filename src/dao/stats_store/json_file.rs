//! Stats store appending one JSON document per line to a file.

use std::{path::PathBuf, sync::Arc};

use futures::future::{BoxFuture, FutureExt};
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};
use tracing::debug;

use crate::dao::{
    models::GameSummaryEntity,
    stats_store::StatsStore,
    storage::{StorageError, StorageResult},
};

/// [`StatsStore`] writing JSON lines; the record id is the line number.
#[derive(Debug, Clone)]
pub struct JsonLinesStatsStore {
    path: Arc<PathBuf>,
    // Serializes appends and caches the line count once the file has been read.
    write_gate: Arc<Mutex<Option<u64>>>,
}

impl JsonLinesStatsStore {
    /// Store appending to `path`. The file and its parent directories are created on the
    /// first write; this store must be the file's only writer.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            write_gate: Arc::new(Mutex::new(None)),
        }
    }

    async fn count_lines(&self) -> StorageResult<u64> {
        match fs::read(self.path.as_path()).await {
            Ok(bytes) => Ok(bytes.iter().filter(|b| **b == b'\n').count() as u64),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(StorageError::unavailable(
                format!("reading {}", self.path.display()),
                err,
            )),
        }
    }

    async fn append(self, summary: GameSummaryEntity) -> StorageResult<u64> {
        let mut line = serde_json::to_vec(&summary)?;
        line.push(b'\n');

        let mut written = self.write_gate.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|err| {
                StorageError::unavailable(format!("creating {}", parent.display()), err)
            })?;
        }

        let existing = match *written {
            Some(count) => count,
            None => self.count_lines().await?,
        };

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_path())
            .await
            .map_err(|err| StorageError::unavailable(format!("opening {}", self.path.display()), err))?;
        file.write_all(&line)
            .await
            .map_err(|err| StorageError::unavailable(format!("writing {}", self.path.display()), err))?;
        file.flush()
            .await
            .map_err(|err| StorageError::unavailable(format!("flushing {}", self.path.display()), err))?;

        let record_id = existing + 1;
        *written = Some(record_id);
        debug!(path = %self.path.display(), record_id, "game summary appended");
        Ok(record_id)
    }
}

impl StatsStore for JsonLinesStatsStore {
    fn save_game_summary(&self, summary: GameSummaryEntity) -> BoxFuture<'static, StorageResult<u64>> {
        self.clone().append(summary).boxed()
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;
    use crate::state::ChannelId;

    fn summary(seed: u64) -> GameSummaryEntity {
        GameSummaryEntity {
            game_id: Uuid::new_v4(),
            channel: ChannelId(2),
            seed,
            participants: Vec::new(),
            inputs: Vec::new(),
            started_at: OffsetDateTime::UNIX_EPOCH,
            ended_at: Some(OffsetDateTime::UNIX_EPOCH),
            winner: None,
            teams: Vec::new(),
            actions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn appends_one_line_per_game() {
        let path = std::env::temp_dir()
            .join(format!("popcorn-stats-{}", Uuid::new_v4()))
            .join("games.jsonl");
        let store = JsonLinesStatsStore::new(&path);

        assert_eq!(store.save_game_summary(summary(1)).await.unwrap(), 1);
        assert_eq!(store.save_game_summary(summary(2)).await.unwrap(), 2);

        let contents = fs::read_to_string(&path).await.unwrap();
        let seeds = contents
            .lines()
            .map(|line| serde_json::from_str::<GameSummaryEntity>(line).unwrap().seed)
            .collect::<Vec<_>>();
        assert_eq!(seeds, vec![1, 2]);

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir).await;
        }
    }

    #[tokio::test]
    async fn continues_existing_file_and_counts_lines_once() {
        let path = std::env::temp_dir().join(format!("popcorn-stats-{}.jsonl", Uuid::new_v4()));
        let mut existing = serde_json::to_vec(&summary(1)).unwrap();
        existing.push(b'\n');
        fs::write(&path, &existing).await.unwrap();
        let store = JsonLinesStatsStore::new(&path);

        assert_eq!(store.save_game_summary(summary(2)).await.unwrap(), 2);

        // The count is cached after the first append, so the file is not read again.
        fs::remove_file(&path).await.unwrap();
        assert_eq!(store.save_game_summary(summary(3)).await.unwrap(), 3);
        let contents = fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 1);

        let _ = fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn unwritable_path_reports_unavailable() {
        let blocker = std::env::temp_dir().join(format!("popcorn-blocker-{}", Uuid::new_v4()));
        fs::write(&blocker, b"not a directory").await.unwrap();
        let store = JsonLinesStatsStore::new(blocker.join("games.jsonl"));

        let err = store.save_game_summary(summary(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));

        let _ = fs::remove_file(&blocker).await;
    }
}
