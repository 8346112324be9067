use crate::config::settings::TranscodeSettings;
use crate::infrastructure::queue::{RabbitMqService, TRANSCODE_QUEUE};
use crate::infrastructure::storage::BlobStore;
use crate::modules::transcode::error::{ExecutionError, StorageError, StoreError};
use crate::modules::transcode::events::TranscodeJob;
use crate::modules::transcode::model::{Task, TaskResult};
use crate::modules::transcode::store::TaskStore;
use crate::modules::transcode::tool::TranscodeTool;
use futures_util::StreamExt;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const UPLOAD_RETRIES: u32 = 3;
const CONSUMER_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Everything a worker needs to run one attempt. Cloned freely; all
/// collaborators are shared handles.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: Arc<dyn TaskStore>,
    pub storage: Arc<dyn BlobStore>,
    pub tool: Arc<dyn TranscodeTool>,
    pub settings: TranscodeSettings,
}

/// What became of one delivered job descriptor.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// Terminal success written to the store.
    Completed,
    /// Retryable failure with budget left; the task went back to
    /// `Pending` and this descriptor must be re-published.
    Requeued(TranscodeJob),
    /// Terminal failure written to the store.
    Failed,
    /// Claim lost (duplicate delivery or terminal task); drop silently.
    Dropped,
    /// The state store was unreachable; the delivery should be handed
    /// back to the queue untouched.
    Redeliver,
}

/// Spawn the configured number of queue consumers.
pub fn start_transcode_workers(ctx: WorkerContext, queue: RabbitMqService) {
    info!(
        workers = ctx.settings.worker_concurrency,
        "🎥 Starting transcode workers"
    );
    for index in 0..ctx.settings.worker_concurrency {
        let ctx = ctx.clone();
        let queue = queue.clone();
        tokio::spawn(async move {
            worker_loop(ctx, queue, index).await;
        });
    }
}

async fn worker_loop(ctx: WorkerContext, queue: RabbitMqService, index: usize) {
    let tag = format!("transcode_worker_{index}");
    loop {
        let mut consumer = match queue.consumer(TRANSCODE_QUEUE, &tag).await {
            Ok(consumer) => consumer,
            Err(e) => {
                warn!(worker = %tag, error = %e, "Consumer setup failed, retrying");
                tokio::time::sleep(CONSUMER_RETRY_DELAY).await;
                continue;
            }
        };

        info!(worker = %tag, queue = TRANSCODE_QUEUE, "Worker listening");

        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(e) => {
                    warn!(worker = %tag, error = %e, "Consumer stream error");
                    break;
                }
            };

            let job = match serde_json::from_slice::<TranscodeJob>(&delivery.data) {
                Ok(job) => job,
                Err(e) => {
                    error!(worker = %tag, error = %e, "Unparseable job payload, discarding");
                    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                        error!(error = %e, "Failed to ack message");
                    }
                    continue;
                }
            };

            match process_job(&ctx, &job).await {
                AttemptOutcome::Requeued(next) => {
                    if let Ok(payload) = serde_json::to_vec(&next) {
                        if let Err(e) = queue.publish(TRANSCODE_QUEUE, &payload).await {
                            error!(task_id = %next.task_id, error = %e, "Retry re-publish failed");
                        }
                    }
                    ack(&delivery).await;
                }
                AttemptOutcome::Redeliver => {
                    if let Err(e) = delivery
                        .nack(BasicNackOptions {
                            requeue: true,
                            ..BasicNackOptions::default()
                        })
                        .await
                    {
                        error!(error = %e, "Failed to nack message");
                    }
                }
                _ => ack(&delivery).await,
            }
        }

        warn!(worker = %tag, "Consumer closed, reconnecting");
        tokio::time::sleep(CONSUMER_RETRY_DELAY).await;
    }
}

async fn ack(delivery: &lapin::message::Delivery) {
    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
        error!(error = %e, "Failed to ack message");
    }
}

/// One claim-execute-report cycle. The claim is the single-flight
/// guard: when it fails because the task is already owned or terminal,
/// the delivery is a duplicate and is dropped without side effects.
pub async fn process_job(ctx: &WorkerContext, job: &TranscodeJob) -> AttemptOutcome {
    let task = match ctx.store.claim(job.task_id).await {
        Ok(task) => task,
        Err(StoreError::Stale(stale)) => {
            debug!(task_id = %job.task_id, %stale, "Duplicate delivery, dropping");
            return AttemptOutcome::Dropped;
        }
        Err(StoreError::NotFound(task_id)) => {
            warn!(%task_id, "Job for unknown task, dropping");
            return AttemptOutcome::Dropped;
        }
        Err(e) => {
            error!(task_id = %job.task_id, error = %e, "Claim failed, redelivering");
            return AttemptOutcome::Redeliver;
        }
    };

    info!(
        task_id = %task.task_id,
        file_id = %task.file_id,
        attempt = task.attempt_count,
        "Transcode attempt started"
    );

    match run_attempt(ctx, &task).await {
        Ok(result) => {
            let output_name = result.output_name.clone();
            match ctx.store.complete(task.task_id, result).await {
                Ok(()) => {
                    info!(task_id = %task.task_id, output_name, "Transcode attempt succeeded");
                    AttemptOutcome::Completed
                }
                Err(e) => {
                    // Most likely the reconciler requeued us mid-run;
                    // the duplicate attempt will overwrite nothing.
                    warn!(task_id = %task.task_id, error = %e, "Success report rejected");
                    AttemptOutcome::Dropped
                }
            }
        }
        Err(e) => report_failure(ctx, &task, e).await,
    }
}

async fn report_failure(ctx: &WorkerContext, task: &Task, e: ExecutionError) -> AttemptOutcome {
    let retry = e.is_retryable() && task.attempt_count < ctx.settings.max_attempts;
    if retry {
        warn!(
            task_id = %task.task_id,
            attempt = task.attempt_count,
            error = %e,
            "Attempt failed, sending back for retry"
        );
        match ctx.store.send_back(task.task_id).await {
            Ok(_) => AttemptOutcome::Requeued(TranscodeJob {
                task_id: task.task_id,
                file_id: task.file_id.clone(),
                config: task.config,
            }),
            Err(err) => {
                warn!(task_id = %task.task_id, error = %err, "Retry transition rejected");
                AttemptOutcome::Dropped
            }
        }
    } else {
        error!(
            task_id = %task.task_id,
            attempt = task.attempt_count,
            error = %e,
            "Attempt failed terminally"
        );
        match ctx.store.fail(task.task_id, e.to_string()).await {
            Ok(()) => AttemptOutcome::Failed,
            Err(err) => {
                warn!(task_id = %task.task_id, error = %err, "Failure report rejected");
                AttemptOutcome::Dropped
            }
        }
    }
}

/// Scratch directory removed on every exit path, success or failure.
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create(task: &Task) -> Result<Self, ExecutionError> {
        let path = std::env::temp_dir().join(format!(
            "transcode-{}-{}",
            task.task_id, task.attempt_count
        ));
        std::fs::create_dir_all(&path)
            .map_err(|e| ExecutionError::retryable(format!("scratch dir: {e}")))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Scratch cleanup failed");
        }
    }
}

/// Download, transcode, upload. Storage hiccups are retryable; a
/// missing input object is not, since retrying cannot make it appear.
async fn run_attempt(ctx: &WorkerContext, task: &Task) -> Result<TaskResult, ExecutionError> {
    let scratch = ScratchDir::create(task)?;

    let input_path = scratch.path().join("input");
    ctx.storage
        .fetch_to_path(&task.file_id, &input_path)
        .await
        .map_err(|e| match e {
            StorageError::NotFound(name) => {
                ExecutionError::terminal(format!("input object missing: {name}"))
            }
            StorageError::Gateway(cause) => {
                ExecutionError::retryable(format!("input download: {cause}"))
            }
        })?;

    let stem = task.config.output_stem(&task.file_id);
    let output = ctx
        .tool
        .run(&input_path, scratch.path(), &stem, &task.config)
        .await?;

    for file in &output.files {
        upload_with_retry(ctx, file).await?;
    }

    let output_name = object_name(&output.primary)?;
    Ok(TaskResult {
        output_name,
        format: task.config.format,
    })
}

async fn upload_with_retry(ctx: &WorkerContext, file: &Path) -> Result<(), ExecutionError> {
    let name = object_name(file)?;
    let content_type = content_type_for(file);

    let mut last_error = None;
    for attempt in 1..=UPLOAD_RETRIES {
        match ctx.storage.store_from_path(&name, file, content_type).await {
            Ok(()) => {
                debug!(object = %name, "Uploaded");
                return Ok(());
            }
            Err(e) => {
                warn!(object = %name, attempt, error = %e, "Upload attempt failed");
                last_error = Some(e);
            }
        }
    }

    let cause = last_error.map(|e| e.to_string()).unwrap_or_default();
    Err(ExecutionError::retryable(format!(
        "upload of {name} failed after {UPLOAD_RETRIES} attempts: {cause}"
    )))
}

fn object_name(file: &Path) -> Result<String, ExecutionError> {
    file.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| ExecutionError::terminal(format!("bad output path: {}", file.display())))
}

fn content_type_for(file: &Path) -> &'static str {
    match file.extension().and_then(|e| e.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("mpd") => "application/dash+xml",
        Some("ts") => "video/mp2t",
        Some("m4s") => "application/octet-stream",
        _ => mime_guess::from_path(file)
            .first_raw()
            .unwrap_or("application/octet-stream"),
    }
}
