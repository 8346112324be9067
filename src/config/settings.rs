use crate::config::env::{self, EnvKey};
use serde::Deserialize;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub amqp_url: String,
    pub redis_url: String,
    pub minio_url: String,
    pub minio_bucket: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub transcode: TranscodeSettings,
}

/// Knobs consumed by the dispatch and worker subsystem. All of these
/// are externally supplied; nothing here is computed at runtime.
#[derive(Clone, Debug, Deserialize)]
pub struct TranscodeSettings {
    pub max_attempts: u32,
    pub soft_timeout: Duration,
    pub hard_timeout: Duration,
    pub worker_concurrency: usize,
    pub inline_queue_depth: usize,
    pub inline_concurrency: usize,
    pub reconcile_interval: Duration,
    pub ffmpeg_bin: String,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            amqp_url: env::get(EnvKey::AmqpUrl)?,
            redis_url: env::get(EnvKey::RedisUrl)?,
            minio_url: env::get(EnvKey::MinioUrl)?,
            minio_bucket: env::get(EnvKey::MinioBucket)?,
            minio_access_key: env::get(EnvKey::MinioAccessKey)?,
            minio_secret_key: env::get(EnvKey::MinioSecretKey)?,
            transcode: TranscodeSettings::from_env(),
        })
    }
}

impl TranscodeSettings {
    pub fn from_env() -> Self {
        Self {
            max_attempts: env::get_parsed(EnvKey::MaxAttempts, 3),
            soft_timeout: Duration::from_secs(env::get_parsed(EnvKey::SoftTimeoutSecs, 3300)),
            hard_timeout: Duration::from_secs(env::get_parsed(EnvKey::HardTimeoutSecs, 3600)),
            worker_concurrency: env::get_parsed(EnvKey::WorkerConcurrency, 2),
            inline_queue_depth: env::get_parsed(EnvKey::InlineQueueDepth, 16),
            inline_concurrency: env::get_parsed(EnvKey::InlineConcurrency, 2),
            reconcile_interval: Duration::from_secs(env::get_parsed(EnvKey::ReconcileIntervalSecs, 60)),
            ffmpeg_bin: env::get_or(EnvKey::FfmpegBin, "ffmpeg"),
        }
    }
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            soft_timeout: Duration::from_secs(3300),
            hard_timeout: Duration::from_secs(3600),
            worker_concurrency: 2,
            inline_queue_depth: 16,
            inline_concurrency: 2,
            reconcile_interval: Duration::from_secs(60),
            ffmpeg_bin: "ffmpeg".to_string(),
        }
    }
}
