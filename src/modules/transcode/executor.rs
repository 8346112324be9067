use crate::infrastructure::queue::{Availability, RabbitMqService, TRANSCODE_QUEUE};
use crate::modules::transcode::error::{QueueUnavailable, StoreError};
use crate::modules::transcode::events::TranscodeJob;
use crate::modules::transcode::store::TaskStore;
use crate::workers::transcoder::{process_job, AttemptOutcome, WorkerContext};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// One interface over both execution paths. The dispatcher probes
/// `availability` before dispatching and falls back from the queued to
/// the inline implementation; callers never see the difference.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn availability(&self) -> Availability {
        Availability::Available
    }

    async fn dispatch(&self, job: TranscodeJob) -> Result<(), QueueUnavailable>;
}

/// Normal path: publish the descriptor onto the durable broker queue
/// for the worker pool to claim.
pub struct QueuedExecutor {
    queue: RabbitMqService,
}

impl QueuedExecutor {
    pub fn new(queue: RabbitMqService) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl JobExecutor for QueuedExecutor {
    async fn availability(&self) -> Availability {
        self.queue.availability().await
    }

    async fn dispatch(&self, job: TranscodeJob) -> Result<(), QueueUnavailable> {
        let payload =
            serde_json::to_vec(&job).map_err(|e| QueueUnavailable::new(e.to_string()))?;
        self.queue
            .publish(TRANSCODE_QUEUE, &payload)
            .await
            .map_err(|e| QueueUnavailable::new(e.to_string()))
    }
}

/// Fallback path: a bounded in-process channel drained by a local loop
/// running the same claim-execute-report cycle as the queue workers.
/// The channel depth applies back pressure to submits and the
/// semaphore caps concurrent inline transcodes, so a broker outage
/// cannot pile unbounded work onto the serving tier.
pub struct InlineExecutor {
    tx: async_channel::Sender<TranscodeJob>,
}

impl InlineExecutor {
    pub fn start(ctx: WorkerContext, depth: usize, concurrency: usize) -> Self {
        let (tx, rx) = async_channel::bounded::<TranscodeJob>(depth.max(1));
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let requeue_tx = tx.clone();

        tokio::spawn(async move {
            info!(depth, concurrency, "Inline executor started");
            while let Ok(job) = rx.recv().await {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let ctx = ctx.clone();
                let requeue = requeue_tx.clone();
                tokio::spawn(async move {
                    let outcome = process_job(&ctx, &job).await;
                    // Release the permit before re-sending: a send into
                    // a full channel must never block the drain loop's
                    // permit acquisition.
                    drop(permit);
                    match outcome {
                        AttemptOutcome::Requeued(next) => {
                            if requeue.send(next).await.is_err() {
                                error!(task_id = %job.task_id, "Inline retry channel closed");
                            }
                        }
                        AttemptOutcome::Redeliver => {
                            warn!(task_id = %job.task_id, "Inline attempt redelivered");
                            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                            if requeue.send(job.clone()).await.is_err() {
                                error!(task_id = %job.task_id, "Inline retry channel closed");
                            }
                        }
                        _ => {}
                    }
                });
            }
        });

        Self { tx }
    }
}

#[async_trait]
impl JobExecutor for InlineExecutor {
    async fn dispatch(&self, job: TranscodeJob) -> Result<(), QueueUnavailable> {
        self.tx
            .send(job)
            .await
            .map_err(|_| QueueUnavailable::new("inline executor stopped"))
    }
}

/// Stand-in for the queued path when the broker could not be reached
/// at startup: every job routes to the inline fallback until a restart.
pub struct UnavailableExecutor;

#[async_trait]
impl JobExecutor for UnavailableExecutor {
    async fn availability(&self) -> Availability {
        Availability::Unavailable
    }

    async fn dispatch(&self, _job: TranscodeJob) -> Result<(), QueueUnavailable> {
        Err(QueueUnavailable::new("broker connection never established"))
    }
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueUnavailable),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutedTo {
    Queued,
    Inline,
}

/// Shared routing step for everything that (re)dispatches a job: probe
/// the broker, publish when it is up, otherwise flag the task as
/// fallback and hand it to the inline executor.
pub struct JobRouter {
    store: Arc<dyn TaskStore>,
    queued: Arc<dyn JobExecutor>,
    inline: Arc<dyn JobExecutor>,
}

impl JobRouter {
    pub fn new(
        store: Arc<dyn TaskStore>,
        queued: Arc<dyn JobExecutor>,
        inline: Arc<dyn JobExecutor>,
    ) -> Self {
        Self {
            store,
            queued,
            inline,
        }
    }

    pub async fn route(&self, job: TranscodeJob) -> Result<RoutedTo, RouteError> {
        match self.queued.availability().await {
            Availability::Available => match self.queued.dispatch(job.clone()).await {
                Ok(()) => return Ok(RoutedTo::Queued),
                Err(cause) => {
                    warn!(task_id = %job.task_id, %cause, "Publish failed after availability check");
                }
            },
            Availability::Unavailable => {
                warn!(task_id = %job.task_id, "Job queue unavailable");
            }
        }

        self.store.mark_fallback(job.task_id).await?;
        self.inline.dispatch(job).await?;
        Ok(RoutedTo::Inline)
    }
}
