use crate::infrastructure::storage::BlobStore;
use crate::modules::transcode::error::{StorageError, StoreError, SubmitError};
use crate::modules::transcode::events::TranscodeJob;
use crate::modules::transcode::executor::{JobRouter, RouteError, RoutedTo};
use crate::modules::transcode::model::{OutputFormat, Task, TranscodeConfig};
use crate::modules::transcode::store::TaskStore;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// What a successful submit hands back to the caller. The caller gets
/// the same shape whether the job went to the broker or to the inline
/// fallback; only the `fallback` flag differs, and only the task record
/// remembers it.
#[derive(Debug, Clone)]
pub struct Submission {
    pub task_id: Uuid,
    pub file_id: String,
    pub output_name: String,
    pub config: TranscodeConfig,
    pub fallback: bool,
}

/// Producer side of the dispatch subsystem: validate, record, enqueue.
/// Both execution paths are injected at construction; there is no
/// runtime-global switch deciding which one runs.
pub struct Dispatcher {
    store: Arc<dyn TaskStore>,
    storage: Arc<dyn BlobStore>,
    router: Arc<JobRouter>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn TaskStore>,
        storage: Arc<dyn BlobStore>,
        router: Arc<JobRouter>,
    ) -> Self {
        Self {
            store,
            storage,
            router,
        }
    }

    /// Validate raw config strings before submitting. Unknown values
    /// are rejected here with no task record created.
    pub async fn submit_raw(
        &self,
        file_id: &str,
        resolution: &str,
        format: &str,
    ) -> Result<Submission, SubmitError> {
        let config = TranscodeConfig::parse(resolution, format)?;
        self.submit(file_id, config).await
    }

    pub async fn submit(
        &self,
        file_id: &str,
        config: TranscodeConfig,
    ) -> Result<Submission, SubmitError> {
        if !self.storage.exists(file_id).await? {
            return Err(SubmitError::NotFound(file_id.to_string()));
        }

        let task = Task::new(file_id.to_string(), config);
        self.store.insert(&task).await?;

        let job = TranscodeJob {
            task_id: task.task_id,
            file_id: task.file_id.clone(),
            config,
        };

        let routed = self.router.route(job).await.map_err(|e| match e {
            RouteError::Store(store_err) => SubmitError::Store(store_err),
            RouteError::Queue(queue_err) => SubmitError::Dispatch(queue_err.to_string()),
        })?;
        let fallback = routed == RoutedTo::Inline;
        info!(
            task_id = %task.task_id,
            file_id,
            fallback,
            "Task dispatched"
        );

        Ok(Submission {
            task_id: task.task_id,
            file_id: task.file_id,
            output_name: config.output_name(file_id),
            config,
            fallback,
        })
    }
}

/// Completion inferred from output existence alone. This path cannot
/// tell "never started" from "failed"; the by-task interface is the
/// authoritative one.
#[derive(Debug, Clone)]
pub struct FileStatus {
    pub file_id: String,
    pub output_name: String,
    pub format: OutputFormat,
    pub completed: bool,
}

/// Read path over the task store. Never blocks on worker execution.
pub struct StatusResolver {
    store: Arc<dyn TaskStore>,
    storage: Arc<dyn BlobStore>,
}

impl StatusResolver {
    pub fn new(store: Arc<dyn TaskStore>, storage: Arc<dyn BlobStore>) -> Self {
        Self { store, storage }
    }

    pub async fn task_status(&self, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        self.store.get(task_id).await
    }

    /// Legacy by-file lookup, retained for backward compatibility.
    pub async fn file_status(
        &self,
        file_id: &str,
        format: OutputFormat,
    ) -> Result<FileStatus, StorageError> {
        let output_name = format.output_name(file_id);
        let completed = self.storage.exists(&output_name).await?;
        Ok(FileStatus {
            file_id: file_id.to_string(),
            output_name,
            format,
            completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::queue::Availability;
    use crate::infrastructure::storage::MemoryBlobStore;
    use crate::modules::transcode::error::QueueUnavailable;
    use crate::modules::transcode::executor::JobExecutor;
    use crate::modules::transcode::model::TaskState;
    use crate::modules::transcode::store::MemoryTaskStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::sync::Mutex;

    /// Executor double that records what it was handed.
    struct RecordingExecutor {
        availability: Availability,
        jobs: Mutex<Vec<TranscodeJob>>,
    }

    impl RecordingExecutor {
        fn new(availability: Availability) -> Arc<Self> {
            Arc::new(Self {
                availability,
                jobs: Mutex::new(Vec::new()),
            })
        }

        async fn job_count(&self) -> usize {
            self.jobs.lock().await.len()
        }
    }

    #[async_trait]
    impl JobExecutor for RecordingExecutor {
        async fn availability(&self) -> Availability {
            self.availability
        }

        async fn dispatch(&self, job: TranscodeJob) -> Result<(), QueueUnavailable> {
            if self.availability == Availability::Unavailable {
                return Err(QueueUnavailable::new("down"));
            }
            self.jobs.lock().await.push(job);
            Ok(())
        }
    }

    async fn fixture(
        queue_up: bool,
    ) -> (
        Dispatcher,
        Arc<MemoryTaskStore>,
        Arc<MemoryBlobStore>,
        Arc<RecordingExecutor>,
        Arc<RecordingExecutor>,
    ) {
        let store = Arc::new(MemoryTaskStore::new());
        let storage = Arc::new(MemoryBlobStore::new());
        storage
            .insert("abc123", Bytes::from_static(b"source"), "video/mp4")
            .await;
        let queued = RecordingExecutor::new(if queue_up {
            Availability::Available
        } else {
            Availability::Unavailable
        });
        let inline = RecordingExecutor::new(Availability::Available);
        let router = Arc::new(JobRouter::new(store.clone(), queued.clone(), inline.clone()));
        let dispatcher = Dispatcher::new(store.clone(), storage.clone(), router);
        (dispatcher, store, storage, queued, inline)
    }

    #[tokio::test]
    async fn submit_enqueues_and_records_pending() {
        let (dispatcher, store, _, queued, inline) = fixture(true).await;

        let submission = dispatcher
            .submit_raw("abc123", "1920:1080", "hls")
            .await
            .unwrap();

        assert!(!submission.fallback);
        assert_eq!(submission.output_name, "abc123_transcoded.m3u8");
        assert_eq!(queued.job_count().await, 1);
        assert_eq!(inline.job_count().await, 0);

        let task = store.get(submission.task_id).await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Pending);
        assert_eq!(task.attempt_count, 0);
        assert!(!task.fallback);
    }

    #[tokio::test]
    async fn unknown_file_creates_no_task() {
        let (dispatcher, store, _, queued, _) = fixture(true).await;

        let err = dispatcher
            .submit_raw("missing", "1920:1080", "hls")
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::NotFound(_)));
        assert_eq!(queued.job_count().await, 0);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn bad_config_creates_no_task() {
        let (dispatcher, store, _, _, _) = fixture(true).await;

        let err = dispatcher
            .submit_raw("abc123", "1920:1080", "webm")
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Config(_)));

        let err = dispatcher
            .submit_raw("abc123", "999:999", "mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Config(_)));

        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn broker_outage_falls_back_inline() {
        let (dispatcher, store, _, queued, inline) = fixture(false).await;

        let submission = dispatcher
            .submit_raw("abc123", "1280:720", "mp4")
            .await
            .unwrap();

        assert!(submission.fallback);
        assert_eq!(queued.job_count().await, 0);
        assert_eq!(inline.job_count().await, 1);

        let task = store.get(submission.task_id).await.unwrap().unwrap();
        assert!(task.fallback);
        assert_eq!(task.state, TaskState::Pending);
    }

    #[tokio::test]
    async fn file_status_reflects_output_existence() {
        let (_, store, storage, _, _) = fixture(true).await;
        let resolver = StatusResolver::new(store, storage.clone());

        let before = resolver
            .file_status("abc123", OutputFormat::Hls)
            .await
            .unwrap();
        assert!(!before.completed);
        assert_eq!(before.output_name, "abc123_transcoded.m3u8");

        storage
            .insert(
                "abc123_transcoded.m3u8",
                Bytes::from_static(b"#EXTM3U"),
                "application/vnd.apple.mpegurl",
            )
            .await;

        let after = resolver
            .file_status("abc123", OutputFormat::Hls)
            .await
            .unwrap();
        assert!(after.completed);
    }
}
