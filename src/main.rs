use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{info, warn};
use video_transcoder::config::settings::AppConfig;
use video_transcoder::infrastructure::queue::RabbitMqService;
use video_transcoder::infrastructure::redis::{RedisService, RedisTaskStore};
use video_transcoder::infrastructure::storage::{BlobStore, StorageService};
use video_transcoder::modules::transcode::executor::{
    InlineExecutor, JobExecutor, JobRouter, QueuedExecutor, UnavailableExecutor,
};
use video_transcoder::modules::transcode::service::{Dispatcher, StatusResolver};
use video_transcoder::modules::transcode::store::TaskStore;
use video_transcoder::modules::transcode::tool::TranscodeTool;
use video_transcoder::state::AppState;
use video_transcoder::workers::ffmpeg::FfmpegTool;
use video_transcoder::workers::reconciler::start_reconciler;
use video_transcoder::app;
use video_transcoder::workers::transcoder::{start_transcode_workers, WorkerContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting server...");

    let config = AppConfig::new()?;

    let redis = RedisService::new(&config.redis_url).await?;
    let store: Arc<dyn TaskStore> = Arc::new(RedisTaskStore::new(redis));

    let storage: Arc<dyn BlobStore> = Arc::new(
        StorageService::new(
            &config.minio_url,
            &config.minio_bucket,
            &config.minio_access_key,
            &config.minio_secret_key,
        )
        .await,
    );

    let tool: Arc<dyn TranscodeTool> = Arc::new(FfmpegTool::new(&config.transcode));
    let ctx = WorkerContext {
        store: store.clone(),
        storage: storage.clone(),
        tool,
        settings: config.transcode.clone(),
    };

    // A broker outage at startup is not fatal: submits route through the
    // inline fallback until a restart brings the queue back.
    let queue = match RabbitMqService::new(&config.amqp_url).await {
        Ok(queue) => Some(queue),
        Err(e) => {
            warn!(error = %e, "RabbitMQ unreachable at startup, running inline only");
            None
        }
    };

    let queued: Arc<dyn JobExecutor> = match &queue {
        Some(queue) => Arc::new(QueuedExecutor::new(queue.clone())),
        None => Arc::new(UnavailableExecutor),
    };
    let inline: Arc<dyn JobExecutor> = Arc::new(InlineExecutor::start(
        ctx.clone(),
        config.transcode.inline_queue_depth,
        config.transcode.inline_concurrency,
    ));
    let router = Arc::new(JobRouter::new(store.clone(), queued, inline));

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        storage.clone(),
        router.clone(),
    ));
    let resolver = Arc::new(StatusResolver::new(store.clone(), storage.clone()));

    if let Some(queue) = queue {
        start_transcode_workers(ctx, queue);
    }
    start_reconciler(store.clone(), router, config.transcode.clone());

    let port = config.server_port;
    let state = AppState::new(config, store, storage, dispatcher, resolver);

    let app = app::create_app(state).await;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Server running on http://0.0.0.0:{port}");

    axum::serve(listener, app).await?;
    Ok(())
}
