use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    AmqpUrl,
    RedisUrl,
    MinioUrl,
    MinioBucket,
    MinioAccessKey,
    MinioSecretKey,
    MaxAttempts,
    SoftTimeoutSecs,
    HardTimeoutSecs,
    WorkerConcurrency,
    InlineQueueDepth,
    InlineConcurrency,
    ReconcileIntervalSecs,
    FfmpegBin,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::AmqpUrl => "AMQP_URL",
            EnvKey::RedisUrl => "REDIS_URL",
            EnvKey::MinioUrl => "MINIO_ENDPOINT",
            EnvKey::MinioBucket => "MINIO_BUCKET_VIDEOS",
            EnvKey::MinioAccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::MinioSecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::MaxAttempts => "MAX_TRANSCODE_ATTEMPTS",
            EnvKey::SoftTimeoutSecs => "TRANSCODE_SOFT_TIMEOUT_SECS",
            EnvKey::HardTimeoutSecs => "TRANSCODE_HARD_TIMEOUT_SECS",
            EnvKey::WorkerConcurrency => "TRANSCODE_WORKERS",
            EnvKey::InlineQueueDepth => "INLINE_QUEUE_DEPTH",
            EnvKey::InlineConcurrency => "INLINE_CONCURRENCY",
            EnvKey::ReconcileIntervalSecs => "RECONCILE_INTERVAL_SECS",
            EnvKey::FfmpegBin => "FFMPEG_BIN",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
