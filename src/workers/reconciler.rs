use crate::config::settings::TranscodeSettings;
use crate::modules::transcode::error::StoreError;
use crate::modules::transcode::events::TranscodeJob;
use crate::modules::transcode::executor::JobRouter;
use crate::modules::transcode::model::Task;
use crate::modules::transcode::store::TaskStore;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Liveness sweep. A worker that dies mid-run leaves its task stranded
/// in `Progress`; once `updated_at` falls behind the hard timeout the
/// task is treated as abandoned and either re-queued (the interrupted
/// attempt already consumed budget at claim time) or terminally failed.
pub fn start_reconciler(
    store: Arc<dyn TaskStore>,
    router: Arc<JobRouter>,
    settings: TranscodeSettings,
) {
    tokio::spawn(async move {
        info!(
            interval_secs = settings.reconcile_interval.as_secs(),
            "Reconciler started"
        );
        let mut ticker = tokio::time::interval(settings.reconcile_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = sweep(&store, &router, &settings).await {
                error!(error = %e, "Reconcile sweep failed");
            }
        }
    });
}

async fn sweep(
    store: &Arc<dyn TaskStore>,
    router: &Arc<JobRouter>,
    settings: &TranscodeSettings,
) -> Result<(), StoreError> {
    let stale = store.stale_in_progress(settings.hard_timeout).await?;
    for task in stale {
        reconcile_task(store, router, settings, task).await;
    }
    Ok(())
}

async fn reconcile_task(
    store: &Arc<dyn TaskStore>,
    router: &Arc<JobRouter>,
    settings: &TranscodeSettings,
    task: Task,
) {
    if task.attempt_count >= settings.max_attempts {
        warn!(
            task_id = %task.task_id,
            attempt = task.attempt_count,
            "Abandoned task out of retry budget, failing"
        );
        if let Err(e) = store
            .fail(
                task.task_id,
                format!(
                    "worker lost after attempt {} and retry budget exhausted",
                    task.attempt_count
                ),
            )
            .await
        {
            warn!(task_id = %task.task_id, error = %e, "Stale failure rejected");
        }
        return;
    }

    warn!(
        task_id = %task.task_id,
        attempt = task.attempt_count,
        "Abandoned task detected, re-queueing"
    );
    match store.send_back(task.task_id).await {
        Ok(updated) => {
            let job = TranscodeJob {
                task_id: updated.task_id,
                file_id: updated.file_id.clone(),
                config: updated.config,
            };
            if let Err(e) = router.route(job).await {
                error!(task_id = %updated.task_id, error = %e, "Re-queue dispatch failed");
            }
        }
        Err(StoreError::Stale(stale)) => {
            // Someone reported in between the sweep query and now.
            warn!(task_id = %task.task_id, %stale, "Task moved on during sweep");
        }
        Err(e) => {
            error!(task_id = %task.task_id, error = %e, "Re-queue transition failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::queue::Availability;
    use crate::infrastructure::storage::MemoryBlobStore;
    use crate::modules::transcode::error::QueueUnavailable;
    use crate::modules::transcode::executor::JobExecutor;
    use crate::modules::transcode::model::{TaskState, TranscodeConfig};
    use crate::modules::transcode::store::MemoryTaskStore;
    use async_trait::async_trait;
    use std::time::Duration;
    use time::OffsetDateTime;
    use tokio::sync::Mutex;

    struct Sink {
        jobs: Mutex<Vec<TranscodeJob>>,
    }

    #[async_trait]
    impl JobExecutor for Sink {
        async fn availability(&self) -> Availability {
            Availability::Available
        }

        async fn dispatch(&self, job: TranscodeJob) -> Result<(), QueueUnavailable> {
            self.jobs.lock().await.push(job);
            Ok(())
        }
    }

    fn stranded(attempts: u32) -> Task {
        let mut task = Task::new(
            "abc123".into(),
            TranscodeConfig::parse("1280:720", "mp4").unwrap(),
        );
        for i in 0..attempts {
            task.claim().unwrap();
            if i + 1 < attempts {
                task.send_back().unwrap();
            }
        }
        task.updated_at = OffsetDateTime::now_utc() - Duration::from_secs(7200);
        task
    }

    #[tokio::test]
    async fn stranded_task_is_requeued() {
        let store: Arc<MemoryTaskStore> = Arc::new(MemoryTaskStore::new());
        let sink = Arc::new(Sink {
            jobs: Mutex::new(Vec::new()),
        });
        let router = Arc::new(JobRouter::new(store.clone(), sink.clone(), sink.clone()));
        let settings = TranscodeSettings::default();

        let task = stranded(1);
        store.insert(&task).await.unwrap();

        sweep(&(store.clone() as Arc<dyn TaskStore>), &router, &settings)
            .await
            .unwrap();

        let updated = store.get(task.task_id).await.unwrap().unwrap();
        assert_eq!(updated.state, TaskState::Pending);
        assert_eq!(updated.attempt_count, 1);
        assert_eq!(sink.jobs.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn stranded_task_out_of_budget_fails() {
        let store: Arc<MemoryTaskStore> = Arc::new(MemoryTaskStore::new());
        let sink = Arc::new(Sink {
            jobs: Mutex::new(Vec::new()),
        });
        let router = Arc::new(JobRouter::new(store.clone(), sink.clone(), sink.clone()));
        let settings = TranscodeSettings::default();

        let task = stranded(settings.max_attempts);
        store.insert(&task).await.unwrap();

        sweep(&(store.clone() as Arc<dyn TaskStore>), &router, &settings)
            .await
            .unwrap();

        let updated = store.get(task.task_id).await.unwrap().unwrap();
        assert_eq!(updated.state, TaskState::Failure);
        assert_eq!(updated.attempt_count, settings.max_attempts);
        assert!(sink.jobs.lock().await.is_empty());
    }

    #[tokio::test]
    async fn fresh_progress_is_left_alone() {
        let store: Arc<MemoryTaskStore> = Arc::new(MemoryTaskStore::new());
        let sink = Arc::new(Sink {
            jobs: Mutex::new(Vec::new()),
        });
        let router = Arc::new(JobRouter::new(store.clone(), sink.clone(), sink.clone()));
        let settings = TranscodeSettings::default();

        let task = Task::new(
            "abc123".into(),
            TranscodeConfig::parse("1280:720", "mp4").unwrap(),
        );
        store.insert(&task).await.unwrap();
        store.claim(task.task_id).await.unwrap();

        sweep(&(store.clone() as Arc<dyn TaskStore>), &router, &settings)
            .await
            .unwrap();

        let updated = store.get(task.task_id).await.unwrap().unwrap();
        assert_eq!(updated.state, TaskState::Progress);
        assert!(sink.jobs.lock().await.is_empty());
    }
}
