use crate::modules::transcode::model::{
    OutputFormat, Resolution, Task, TaskError, TaskResult, TaskState,
};
use crate::modules::transcode::service::{FileStatus, Submission};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct TranscodeRequest {
    #[serde(default = "default_resolution")]
    pub resolution: Resolution,
    #[serde(default = "default_format")]
    pub format: OutputFormat,
}

impl Default for TranscodeRequest {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            format: default_format(),
        }
    }
}

fn default_resolution() -> Resolution {
    Resolution::Hd720
}

fn default_format() -> OutputFormat {
    OutputFormat::Mp4
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitResponse {
    pub task_id: Uuid,
    pub file_id: String,
    pub output_name: String,
    pub resolution: Resolution,
    pub format: OutputFormat,
    pub status: String,
}

impl From<Submission> for SubmitResponse {
    fn from(submission: Submission) -> Self {
        Self {
            task_id: submission.task_id,
            file_id: submission.file_id,
            output_name: submission.output_name,
            resolution: submission.config.resolution,
            format: submission.config.format,
            status: "processing".to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub state: TaskState,
    pub attempt_count: u32,
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Task> for TaskStatusResponse {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.task_id,
            state: task.state,
            attempt_count: task.attempt_count,
            fallback: task.fallback,
            result: task.result,
            error: task.error.map(|TaskError { message, attempt }| {
                format!("{message} (attempt {attempt})")
            }),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FileStatusQuery {
    #[serde(default = "default_format")]
    pub format: OutputFormat,
}

/// Response of the legacy by-file lookup. Existence of the output is
/// all it can see, so `status` is only ever "completed" or
/// "processing" — a failed task looks like one still processing.
#[derive(Debug, Serialize, ToSchema)]
pub struct FileStatusResponse {
    pub file_id: String,
    pub status: String,
    pub format: OutputFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<FileStatus> for FileStatusResponse {
    fn from(status: FileStatus) -> Self {
        if status.completed {
            Self {
                file_id: status.file_id,
                status: "completed".to_string(),
                format: status.format,
                stream_url: Some(format!("/api/v1/videos/stream/{}", status.output_name)),
                output_name: Some(status.output_name),
                message: None,
            }
        } else {
            Self {
                file_id: status.file_id,
                status: "processing".to_string(),
                format: status.format,
                output_name: None,
                stream_url: None,
                message: Some("Video is still being transcoded".to_string()),
            }
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListResponse {
    pub count: usize,
    pub files: Vec<crate::infrastructure::storage::BlobInfo>,
}
