use crate::modules::transcode::error::StoreError;
use crate::modules::transcode::model::{Task, TaskResult, TaskState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Durable record of every task's current state, addressed by task id.
///
/// Implementations must make `claim` atomic: when several workers race
/// on the same task id, exactly one observes success and the rest get
/// `StoreError::Stale`. That is the single-flight guarantee the whole
/// retry design leans on.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: &Task) -> Result<(), StoreError>;

    async fn get(&self, task_id: Uuid) -> Result<Option<Task>, StoreError>;

    /// Atomic `Pending -> Progress`; increments the attempt counter and
    /// returns the claimed record.
    async fn claim(&self, task_id: Uuid) -> Result<Task, StoreError>;

    /// `Progress -> Success`.
    async fn complete(&self, task_id: Uuid, result: TaskResult) -> Result<(), StoreError>;

    /// `Progress -> Pending` (retry). Returns the updated record so the
    /// caller can re-publish its descriptor.
    async fn send_back(&self, task_id: Uuid) -> Result<Task, StoreError>;

    /// `Progress -> Failure`.
    async fn fail(&self, task_id: Uuid, message: String) -> Result<(), StoreError>;

    /// Flags a task as running on the inline path.
    async fn mark_fallback(&self, task_id: Uuid) -> Result<(), StoreError>;

    /// Tasks still `Progress` whose `updated_at` is older than the
    /// cutoff — candidates for the liveness sweep.
    async fn stale_in_progress(&self, older_than: Duration) -> Result<Vec<Task>, StoreError>;
}

/// Mutex-backed store for tests and single-node runs. Transition guards
/// are the same ones the Redis store enforces in Lua, just applied
/// under the lock.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<Uuid, Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    async fn update<F>(&self, task_id: Uuid, apply: F) -> Result<Task, StoreError>
    where
        F: FnOnce(&mut Task) -> Result<(), StoreError>,
    {
        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .get_mut(&task_id)
            .ok_or(StoreError::NotFound(task_id))?;
        apply(task)?;
        Ok(task.clone())
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, task: &Task) -> Result<(), StoreError> {
        self.tasks.lock().await.insert(task.task_id, task.clone());
        Ok(())
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.lock().await.get(&task_id).cloned())
    }

    async fn claim(&self, task_id: Uuid) -> Result<Task, StoreError> {
        self.update(task_id, |task| Ok(task.claim()?)).await
    }

    async fn complete(&self, task_id: Uuid, result: TaskResult) -> Result<(), StoreError> {
        self.update(task_id, |task| Ok(task.complete(result)?))
            .await?;
        Ok(())
    }

    async fn send_back(&self, task_id: Uuid) -> Result<Task, StoreError> {
        self.update(task_id, |task| Ok(task.send_back()?)).await
    }

    async fn fail(&self, task_id: Uuid, message: String) -> Result<(), StoreError> {
        self.update(task_id, |task| Ok(task.fail(message)?)).await?;
        Ok(())
    }

    async fn mark_fallback(&self, task_id: Uuid) -> Result<(), StoreError> {
        self.update(task_id, |task| {
            task.fallback = true;
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn stale_in_progress(&self, older_than: Duration) -> Result<Vec<Task>, StoreError> {
        let cutoff = OffsetDateTime::now_utc() - older_than;
        let tasks = self.tasks.lock().await;
        Ok(tasks
            .values()
            .filter(|t| t.state == TaskState::Progress && t.updated_at < cutoff)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::transcode::model::{OutputFormat, TranscodeConfig};
    use std::sync::Arc;

    fn task() -> Task {
        Task::new(
            "abc123".into(),
            TranscodeConfig::parse("1280:720", "mp4").unwrap(),
        )
    }

    #[tokio::test]
    async fn exactly_one_concurrent_claim_succeeds() {
        let store = Arc::new(MemoryTaskStore::new());
        let task = task();
        store.insert(&task).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let id = task.task_id;
            handles.push(tokio::spawn(async move { store.claim(id).await.is_ok() }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);

        let claimed = store.get(task.task_id).await.unwrap().unwrap();
        assert_eq!(claimed.state, TaskState::Progress);
        assert_eq!(claimed.attempt_count, 1);
    }

    #[tokio::test]
    async fn terminal_task_rejects_further_transitions() {
        let store = MemoryTaskStore::new();
        let task = task();
        store.insert(&task).await.unwrap();

        store.claim(task.task_id).await.unwrap();
        store
            .complete(
                task.task_id,
                TaskResult {
                    output_name: task.output_name(),
                    format: OutputFormat::Mp4,
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            store.claim(task.task_id).await,
            Err(StoreError::Stale(_))
        ));
        assert!(matches!(
            store.fail(task.task_id, "late".into()).await,
            Err(StoreError::Stale(_))
        ));
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let store = MemoryTaskStore::new();
        assert!(matches!(
            store.claim(Uuid::new_v4()).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_sweep_only_sees_old_progress() {
        let store = MemoryTaskStore::new();
        let mut old = task();
        old.claim().unwrap();
        old.updated_at = OffsetDateTime::now_utc() - Duration::from_secs(7200);
        store.insert(&old).await.unwrap();

        let fresh = {
            let t = task();
            store.insert(&t).await.unwrap();
            store.claim(t.task_id).await.unwrap()
        };

        let stale = store
            .stale_in_progress(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].task_id, old.task_id);
        assert_ne!(stale[0].task_id, fresh.task_id);
    }
}
