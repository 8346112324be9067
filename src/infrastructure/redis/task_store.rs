use crate::infrastructure::redis::RedisService;
use crate::modules::transcode::error::{StaleTransition, StoreError};
use crate::modules::transcode::model::{Task, TaskError, TaskResult, TaskState, TranscodeConfig};
use crate::modules::transcode::store::TaskStore;
use async_trait::async_trait;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

const TASK_KEY_PREFIX: &str = "transcode:task:";
const PROGRESS_INDEX: &str = "transcode:progress";

/// Guarded `PENDING -> PROGRESS`. Runs server-side so concurrent
/// claimers race atomically; returns "OK", "missing", or the observed
/// state when the task was not claimable.
const CLAIM_SCRIPT: &str = r#"
local state = redis.call('HGET', KEYS[1], 'state')
if not state then return 'missing' end
if state ~= 'PENDING' then return state end
redis.call('HSET', KEYS[1], 'state', 'PROGRESS', 'updated_at', ARGV[2])
redis.call('HINCRBY', KEYS[1], 'attempt_count', 1)
redis.call('ZADD', KEYS[2], ARGV[2], ARGV[1])
return 'OK'
"#;

/// Guarded `PROGRESS -> SUCCESS`.
const COMPLETE_SCRIPT: &str = r#"
local state = redis.call('HGET', KEYS[1], 'state')
if not state then return 'missing' end
if state ~= 'PROGRESS' then return state end
redis.call('HSET', KEYS[1], 'state', 'SUCCESS',
    'output_name', ARGV[2], 'output_format', ARGV[3], 'updated_at', ARGV[4])
redis.call('ZREM', KEYS[2], ARGV[1])
return 'OK'
"#;

/// Guarded `PROGRESS -> PENDING` (retry edge).
const SEND_BACK_SCRIPT: &str = r#"
local state = redis.call('HGET', KEYS[1], 'state')
if not state then return 'missing' end
if state ~= 'PROGRESS' then return state end
redis.call('HSET', KEYS[1], 'state', 'PENDING', 'updated_at', ARGV[2])
redis.call('ZREM', KEYS[2], ARGV[1])
return 'OK'
"#;

/// Guarded `PROGRESS -> FAILURE`; records the failing attempt.
const FAIL_SCRIPT: &str = r#"
local state = redis.call('HGET', KEYS[1], 'state')
if not state then return 'missing' end
if state ~= 'PROGRESS' then return state end
local attempt = redis.call('HGET', KEYS[1], 'attempt_count')
redis.call('HSET', KEYS[1], 'state', 'FAILURE',
    'error_message', ARGV[2], 'error_attempt', attempt, 'updated_at', ARGV[3])
redis.call('ZREM', KEYS[2], ARGV[1])
return 'OK'
"#;

/// Task state store on Redis: one hash per task plus a sorted-set index
/// of in-progress tasks keyed by `updated_at`, which gives the liveness
/// sweep a cheap range query instead of a keyspace scan.
#[derive(Clone)]
pub struct RedisTaskStore {
    redis: RedisService,
}

impl RedisTaskStore {
    pub fn new(redis: RedisService) -> Self {
        Self { redis }
    }

    fn task_key(task_id: Uuid) -> String {
        format!("{TASK_KEY_PREFIX}{task_id}")
    }

    async fn run_transition(
        &self,
        script: &str,
        task_id: Uuid,
        intended: TaskState,
        extra_args: &[String],
    ) -> Result<(), StoreError> {
        let mut conn = self.redis.get_conn().await.map_err(backend)?;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let script = Script::new(script);
        let mut invocation = script.prepare_invoke();
        invocation
            .key(Self::task_key(task_id))
            .key(PROGRESS_INDEX)
            .arg(task_id.to_string());
        for extra in extra_args {
            invocation.arg(extra);
        }
        invocation.arg(now);
        let verdict: String = invocation.invoke_async(&mut conn).await.map_err(backend)?;

        match verdict.as_str() {
            "OK" => Ok(()),
            "missing" => Err(StoreError::NotFound(task_id)),
            observed => {
                let observed = observed
                    .parse::<TaskState>()
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                Err(StoreError::Stale(StaleTransition {
                    task_id,
                    observed,
                    intended,
                }))
            }
        }
    }

    async fn fetch(&self, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        let mut conn = self.redis.get_conn().await.map_err(backend)?;
        let hash: HashMap<String, String> =
            conn.hgetall(Self::task_key(task_id)).await.map_err(backend)?;
        if hash.is_empty() {
            return Ok(None);
        }
        task_from_hash(&hash).map(Some)
    }
}

#[async_trait]
impl TaskStore for RedisTaskStore {
    async fn insert(&self, task: &Task) -> Result<(), StoreError> {
        let mut conn = self.redis.get_conn().await.map_err(backend)?;
        let fields = task_to_hash(task);
        let _: () = conn
            .hset_multiple(Self::task_key(task.task_id), &fields)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        self.fetch(task_id).await
    }

    async fn claim(&self, task_id: Uuid) -> Result<Task, StoreError> {
        self.run_transition(CLAIM_SCRIPT, task_id, TaskState::Progress, &[])
            .await?;
        self.fetch(task_id)
            .await?
            .ok_or(StoreError::NotFound(task_id))
    }

    async fn complete(&self, task_id: Uuid, result: TaskResult) -> Result<(), StoreError> {
        self.run_transition(
            COMPLETE_SCRIPT,
            task_id,
            TaskState::Success,
            &[
                result.output_name.clone(),
                result.format.as_str().to_string(),
            ],
        )
        .await
    }

    async fn send_back(&self, task_id: Uuid) -> Result<Task, StoreError> {
        self.run_transition(SEND_BACK_SCRIPT, task_id, TaskState::Pending, &[])
            .await?;
        self.fetch(task_id)
            .await?
            .ok_or(StoreError::NotFound(task_id))
    }

    async fn fail(&self, task_id: Uuid, message: String) -> Result<(), StoreError> {
        self.run_transition(FAIL_SCRIPT, task_id, TaskState::Failure, &[message])
            .await
    }

    async fn mark_fallback(&self, task_id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.redis.get_conn().await.map_err(backend)?;
        let key = Self::task_key(task_id);
        let exists: bool = conn.exists(&key).await.map_err(backend)?;
        if !exists {
            return Err(StoreError::NotFound(task_id));
        }
        let _: () = conn.hset(&key, "fallback", "1").await.map_err(backend)?;
        Ok(())
    }

    async fn stale_in_progress(&self, older_than: Duration) -> Result<Vec<Task>, StoreError> {
        let mut conn = self.redis.get_conn().await.map_err(backend)?;
        let cutoff = (OffsetDateTime::now_utc() - older_than).unix_timestamp();
        let ids: Vec<String> = conn
            .zrangebyscore(PROGRESS_INDEX, i64::MIN, cutoff)
            .await
            .map_err(backend)?;

        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(task_id) = id.parse::<Uuid>() else {
                continue;
            };
            // The index can briefly trail the hash; only report tasks
            // that are still in progress.
            if let Some(task) = self.fetch(task_id).await? {
                if task.state == TaskState::Progress {
                    tasks.push(task);
                }
            }
        }
        Ok(tasks)
    }
}

fn backend(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn task_to_hash(task: &Task) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("task_id", task.task_id.to_string()),
        ("file_id", task.file_id.clone()),
        ("resolution", task.config.resolution.as_scale().to_string()),
        ("format", task.config.format.as_str().to_string()),
        ("state", task.state.as_str().to_string()),
        ("attempt_count", task.attempt_count.to_string()),
        ("fallback", if task.fallback { "1" } else { "0" }.to_string()),
        ("created_at", task.created_at.unix_timestamp().to_string()),
        ("updated_at", task.updated_at.unix_timestamp().to_string()),
    ];
    if let Some(result) = &task.result {
        fields.push(("output_name", result.output_name.clone()));
        fields.push(("output_format", result.format.as_str().to_string()));
    }
    if let Some(error) = &task.error {
        fields.push(("error_message", error.message.clone()));
        fields.push(("error_attempt", error.attempt.to_string()));
    }
    fields
}

fn task_from_hash(hash: &HashMap<String, String>) -> Result<Task, StoreError> {
    let field = |name: &str| {
        hash.get(name)
            .cloned()
            .ok_or_else(|| StoreError::Backend(format!("task record missing field {name}")))
    };
    let parse_err = |e: &dyn std::fmt::Display| StoreError::Backend(e.to_string());

    let state: TaskState = field("state")?.parse().map_err(|e| parse_err(&e))?;
    let config = TranscodeConfig::parse(&field("resolution")?, &field("format")?)
        .map_err(|e| parse_err(&e))?;

    let result = match state {
        TaskState::Success => Some(TaskResult {
            output_name: field("output_name")?,
            format: field("output_format")?.parse().map_err(|e| parse_err(&e))?,
        }),
        _ => None,
    };
    let error = match state {
        TaskState::Failure => Some(TaskError {
            message: field("error_message")?,
            attempt: field("error_attempt")?.parse().map_err(|e| parse_err(&e))?,
        }),
        _ => None,
    };

    Ok(Task {
        task_id: field("task_id")?.parse().map_err(|e| parse_err(&e))?,
        file_id: field("file_id")?,
        config,
        state,
        attempt_count: field("attempt_count")?.parse().map_err(|e| parse_err(&e))?,
        fallback: field("fallback")? == "1",
        result,
        error,
        created_at: timestamp(&field("created_at")?)?,
        updated_at: timestamp(&field("updated_at")?)?,
    })
}

fn timestamp(raw: &str) -> Result<OffsetDateTime, StoreError> {
    let secs: i64 = raw
        .parse()
        .map_err(|e: std::num::ParseIntError| StoreError::Backend(e.to_string()))?;
    OffsetDateTime::from_unix_timestamp(secs).map_err(|e| StoreError::Backend(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::transcode::model::{OutputFormat, Resolution};

    fn sample() -> Task {
        Task::new(
            "abc123".into(),
            TranscodeConfig {
                resolution: Resolution::Fhd1080,
                format: OutputFormat::Hls,
            },
        )
    }

    #[test]
    fn hash_round_trip_preserves_the_record() {
        let mut task = sample();
        task.claim().unwrap();
        task.fail("unsupported codec".into()).unwrap();

        let hash: HashMap<String, String> = task_to_hash(&task)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let restored = task_from_hash(&hash).unwrap();

        assert_eq!(restored.task_id, task.task_id);
        assert_eq!(restored.state, TaskState::Failure);
        assert_eq!(restored.attempt_count, 1);
        assert_eq!(restored.error.as_ref().unwrap().attempt, 1);
        assert_eq!(restored.config, task.config);
    }

    #[test]
    fn success_fields_only_materialize_on_success() {
        let mut task = sample();
        task.claim().unwrap();
        task.complete(TaskResult {
            output_name: task.output_name(),
            format: OutputFormat::Hls,
        })
        .unwrap();

        let hash: HashMap<String, String> = task_to_hash(&task)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let restored = task_from_hash(&hash).unwrap();

        let result = restored.result.unwrap();
        assert_eq!(result.output_name, "abc123_transcoded.m3u8");
        assert!(restored.error.is_none());
    }
}
