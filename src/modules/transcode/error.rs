use crate::modules::transcode::model::TaskState;
use thiserror::Error;
use uuid::Uuid;

/// Invalid transcode configuration, rejected at submit time. No task
/// record is created when this is returned.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A transition was attempted against a task that is no longer in the
/// expected state — typically a duplicate queue delivery racing an
/// earlier claim, or a report arriving after the reconciler moved the
/// task on. Diagnostic only; never surfaced to clients.
#[derive(Debug, Error)]
#[error("stale transition on task {task_id}: observed {observed:?} while moving to {intended:?}")]
pub struct StaleTransition {
    pub task_id: Uuid,
    pub observed: TaskState,
    pub intended: TaskState,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Stale(#[from] StaleTransition),
    #[error("task store backend: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("storage gateway: {0}")]
    Gateway(String),
}

/// Errors a submit call returns synchronously to the caller. Everything
/// that happens after enqueue is only observable through the status
/// interface.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid transcode config: {0}")]
    Config(#[from] ConfigError),
    #[error("video file not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

/// The broker could not be reached. Internal to the dispatcher, which
/// answers it by running the job on the inline path instead.
#[derive(Debug, Error)]
#[error("job queue unavailable: {reason}")]
pub struct QueueUnavailable {
    pub reason: String,
}

impl QueueUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Outcome classification for a failed execution attempt. Unclassified
/// tool failures map to `Terminal` so permanently malformed input does
/// not loop through the retry budget.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{0}")]
    Retryable(String),
    #[error("{0}")]
    Terminal(String),
}

impl ExecutionError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable(message.into())
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}
