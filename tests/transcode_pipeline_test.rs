//! End-to-end dispatch pipeline: submit through the dispatcher with the
//! broker down, let the inline executor run the job against a fake
//! ffmpeg binary, and observe the task through the status resolver.

#![cfg(unix)]

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use video_transcoder::config::settings::TranscodeSettings;
use video_transcoder::infrastructure::storage::{BlobStore, MemoryBlobStore};
use video_transcoder::modules::transcode::executor::{
    InlineExecutor, JobExecutor, JobRouter, UnavailableExecutor,
};
use video_transcoder::modules::transcode::model::{OutputFormat, Task, TaskState};
use video_transcoder::modules::transcode::service::{Dispatcher, StatusResolver};
use video_transcoder::modules::transcode::store::MemoryTaskStore;
use video_transcoder::modules::transcode::tool::TranscodeTool;
use video_transcoder::workers::ffmpeg::FfmpegTool;
use video_transcoder::workers::transcoder::WorkerContext;

/// Stands in for ffmpeg. Every variant is a small shell script so the
/// worker exercises the real spawn/timeout/collect path.
enum FakeFfmpeg {
    /// Writes its last argument (the primary output) and exits 0.
    Succeeds,
    /// Sleeps far past the hard timeout and ignores the wind-down.
    Hangs,
    /// Exits nonzero with a malformed-input diagnostic on stderr.
    RejectsInput,
}

impl FakeFfmpeg {
    fn body(&self) -> &'static str {
        match self {
            FakeFfmpeg::Succeeds => {
                "#!/bin/sh\nfor last in \"$@\"; do :; done\nprintf 'data' > \"$last\"\n"
            }
            FakeFfmpeg::Hangs => "#!/bin/sh\nsleep 30\n",
            FakeFfmpeg::RejectsInput => {
                "#!/bin/sh\necho 'Invalid data found when processing input' >&2\nexit 1\n"
            }
        }
    }

    fn install(&self, dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("ffmpeg");
        std::fs::write(&path, self.body()).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }
}

struct Pipeline {
    dispatcher: Dispatcher,
    resolver: StatusResolver,
    storage: Arc<MemoryBlobStore>,
    _bin_dir: PathBuf,
}

impl Pipeline {
    async fn start(fake: FakeFfmpeg) -> Self {
        let bin_dir = std::env::temp_dir().join(format!("fake-ffmpeg-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&bin_dir).unwrap();
        let bin = fake.install(&bin_dir);

        let settings = TranscodeSettings {
            max_attempts: 3,
            soft_timeout: Duration::from_millis(50),
            hard_timeout: Duration::from_millis(200),
            ffmpeg_bin: bin.display().to_string(),
            ..TranscodeSettings::default()
        };

        let store: Arc<MemoryTaskStore> = Arc::new(MemoryTaskStore::new());
        let storage = Arc::new(MemoryBlobStore::new());
        storage
            .insert("abc123", Bytes::from_static(b"source video"), "video/mp4")
            .await;

        let tool: Arc<dyn TranscodeTool> = Arc::new(FfmpegTool::new(&settings));
        let ctx = WorkerContext {
            store: store.clone(),
            storage: storage.clone(),
            tool,
            settings,
        };

        let queued: Arc<dyn JobExecutor> = Arc::new(UnavailableExecutor);
        let inline: Arc<dyn JobExecutor> = Arc::new(InlineExecutor::start(ctx, 16, 2));
        let router = Arc::new(JobRouter::new(store.clone(), queued, inline));

        let dispatcher = Dispatcher::new(store.clone(), storage.clone(), router);
        let resolver = StatusResolver::new(store, storage.clone());

        Self {
            dispatcher,
            resolver,
            storage,
            _bin_dir: bin_dir,
        }
    }

    async fn wait_terminal(&self, task_id: Uuid) -> Task {
        let deadline = Duration::from_secs(10);
        let task = tokio::time::timeout(deadline, async {
            loop {
                if let Some(task) = self.resolver.task_status(task_id).await.unwrap() {
                    if task.state.is_terminal() {
                        return task;
                    }
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("task never reached a terminal state");
        task
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self._bin_dir);
    }
}

#[tokio::test]
async fn fallback_submit_preserves_the_client_contract() {
    let pipeline = Pipeline::start(FakeFfmpeg::Succeeds).await;

    // Broker is down for the whole submit, yet the caller still gets a
    // task id and polls the same interface as the queued path.
    let submission = pipeline
        .dispatcher
        .submit_raw("abc123", "1920:1080", "hls")
        .await
        .unwrap();
    assert!(submission.fallback);
    assert_eq!(submission.output_name, "abc123_transcoded.m3u8");

    let task = pipeline.wait_terminal(submission.task_id).await;
    assert_eq!(task.state, TaskState::Success);
    assert_eq!(task.attempt_count, 1);
    assert!(task.fallback);

    let result = task.result.unwrap();
    assert_eq!(result.output_name, "abc123_transcoded.m3u8");
    assert_eq!(result.format, OutputFormat::Hls);

    // Output landed in the blob store under the deterministic name.
    assert!(pipeline
        .storage
        .exists("abc123_transcoded.m3u8")
        .await
        .unwrap());

    // The legacy by-file path now agrees.
    let file_status = pipeline
        .resolver
        .file_status("abc123", OutputFormat::Hls)
        .await
        .unwrap();
    assert!(file_status.completed);
}

#[tokio::test]
async fn hard_timeouts_retry_until_the_budget_is_gone() {
    let pipeline = Pipeline::start(FakeFfmpeg::Hangs).await;

    let submission = pipeline
        .dispatcher
        .submit_raw("abc123", "1280:720", "mp4")
        .await
        .unwrap();

    let task = pipeline.wait_terminal(submission.task_id).await;
    assert_eq!(task.state, TaskState::Failure);
    assert_eq!(task.attempt_count, 3);

    let error = task.error.unwrap();
    assert_eq!(error.attempt, 3);
    assert!(error.message.contains("hard timeout"), "{}", error.message);
}

#[tokio::test]
async fn malformed_input_fails_on_the_first_attempt() {
    let pipeline = Pipeline::start(FakeFfmpeg::RejectsInput).await;

    let submission = pipeline
        .dispatcher
        .submit_raw("abc123", "854:480", "mp4")
        .await
        .unwrap();

    let task = pipeline.wait_terminal(submission.task_id).await;
    assert_eq!(task.state, TaskState::Failure);
    assert_eq!(task.attempt_count, 1);
    assert!(task
        .error
        .unwrap()
        .message
        .contains("Invalid data found"));
}

#[tokio::test]
async fn submit_validation_precedes_task_creation() {
    let pipeline = Pipeline::start(FakeFfmpeg::Succeeds).await;

    assert!(pipeline
        .dispatcher
        .submit_raw("nope", "1280:720", "mp4")
        .await
        .is_err());
    assert!(pipeline
        .dispatcher
        .submit_raw("abc123", "1280:720", "webm")
        .await
        .is_err());

    // A valid submit still works afterwards.
    let submission = pipeline
        .dispatcher
        .submit_raw("abc123", "1280:720", "mp4")
        .await
        .unwrap();
    let task = pipeline.wait_terminal(submission.task_id).await;
    assert_eq!(task.state, TaskState::Success);
}
