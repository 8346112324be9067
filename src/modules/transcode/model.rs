use crate::modules::transcode::error::{ConfigError, StaleTransition};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of a transcode task.
///
/// `Pending -> Progress -> Success | Failure`, with `Progress -> Pending`
/// allowed for retries. Terminal states are sticky; every transition goes
/// through the guarded methods on [`Task`] so a duplicate queue delivery
/// or a late worker report surfaces as [`StaleTransition`] instead of
/// clobbering the record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    Pending,
    Progress,
    Success,
    Failure,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Progress => "PROGRESS",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskState::Pending),
            "PROGRESS" => Ok(TaskState::Progress),
            "SUCCESS" => Ok(TaskState::Success),
            "FAILURE" => Ok(TaskState::Failure),
            other => Err(ConfigError::new(format!("unknown task state: {other}"))),
        }
    }
}

/// Supported scaling targets, `width:height` on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum Resolution {
    #[serde(rename = "3840:2160")]
    Uhd4k,
    #[serde(rename = "2560:1440")]
    Qhd1440,
    #[serde(rename = "1920:1080")]
    Fhd1080,
    #[serde(rename = "1280:720")]
    Hd720,
    #[serde(rename = "854:480")]
    Sd480,
    #[serde(rename = "640:360")]
    Sd360,
    #[serde(rename = "426:240")]
    Sd240,
}

impl Resolution {
    /// The `scale=` filter argument handed to the transcoding tool.
    pub fn as_scale(&self) -> &'static str {
        match self {
            Resolution::Uhd4k => "3840:2160",
            Resolution::Qhd1440 => "2560:1440",
            Resolution::Fhd1080 => "1920:1080",
            Resolution::Hd720 => "1280:720",
            Resolution::Sd480 => "854:480",
            Resolution::Sd360 => "640:360",
            Resolution::Sd240 => "426:240",
        }
    }
}

impl std::str::FromStr for Resolution {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3840:2160" => Ok(Resolution::Uhd4k),
            "2560:1440" => Ok(Resolution::Qhd1440),
            "1920:1080" => Ok(Resolution::Fhd1080),
            "1280:720" => Ok(Resolution::Hd720),
            "854:480" => Ok(Resolution::Sd480),
            "640:360" => Ok(Resolution::Sd360),
            "426:240" => Ok(Resolution::Sd240),
            other => Err(ConfigError::new(format!("unsupported resolution: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Hls,
    Dash,
    Mp4,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Hls => "hls",
            OutputFormat::Dash => "dash",
            OutputFormat::Mp4 => "mp4",
        }
    }

    /// Extension of the primary output (playlist for segmented formats).
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Hls => "m3u8",
            OutputFormat::Dash => "mpd",
            OutputFormat::Mp4 => "mp4",
        }
    }

    /// Output name for a source file in this format. The legacy by-file
    /// status lookup only knows the format, so naming cannot depend on
    /// anything else.
    pub fn output_name(&self, file_id: &str) -> String {
        format!("{file_id}_transcoded.{}", self.extension())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hls" => Ok(OutputFormat::Hls),
            "dash" => Ok(OutputFormat::Dash),
            "mp4" => Ok(OutputFormat::Mp4),
            other => Err(ConfigError::new(format!("unsupported format: {other}"))),
        }
    }
}

/// Immutable transcode parameters, fixed at task creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct TranscodeConfig {
    pub resolution: Resolution,
    pub format: OutputFormat,
}

impl TranscodeConfig {
    pub fn parse(resolution: &str, format: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            resolution: resolution.parse()?,
            format: format.parse()?,
        })
    }

    /// Stem shared by the primary output and its segments.
    pub fn output_stem(&self, file_id: &str) -> String {
        format!("{file_id}_transcoded")
    }

    /// Deterministic name of the primary output object. Both the worker
    /// and the legacy by-file status lookup derive it this way, so the
    /// two always agree on where a finished result lives.
    pub fn output_name(&self, file_id: &str) -> String {
        self.format.output_name(file_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct TaskResult {
    pub output_name: String,
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct TaskError {
    pub message: String,
    /// Attempt that produced the terminal failure.
    pub attempt: u32,
}

/// One transcoding job instance. Created by the dispatcher, owned by
/// whichever worker holds the claim, immutable once terminal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub task_id: Uuid,
    pub file_id: String,
    pub config: TranscodeConfig,
    pub state: TaskState,
    pub attempt_count: u32,
    pub fallback: bool,
    pub result: Option<TaskResult>,
    pub error: Option<TaskError>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Task {
    pub fn new(file_id: String, config: TranscodeConfig) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            task_id: Uuid::new_v4(),
            file_id,
            config,
            state: TaskState::Pending,
            attempt_count: 0,
            fallback: false,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn output_name(&self) -> String {
        self.config.output_name(&self.file_id)
    }

    fn guard(&self, from: TaskState, to: TaskState) -> Result<(), StaleTransition> {
        if self.state == from {
            Ok(())
        } else {
            Err(StaleTransition {
                task_id: self.task_id,
                observed: self.state,
                intended: to,
            })
        }
    }

    /// `Pending -> Progress`. Counts the attempt that is about to run,
    /// so a terminal `attempt_count` equals the number of executions.
    pub fn claim(&mut self) -> Result<(), StaleTransition> {
        self.guard(TaskState::Pending, TaskState::Progress)?;
        self.state = TaskState::Progress;
        self.attempt_count += 1;
        self.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    /// `Progress -> Success`.
    pub fn complete(&mut self, result: TaskResult) -> Result<(), StaleTransition> {
        self.guard(TaskState::Progress, TaskState::Success)?;
        self.state = TaskState::Success;
        self.result = Some(result);
        self.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    /// `Progress -> Pending`, the retry edge. The attempt was already
    /// counted at claim time, so the counter is left alone here.
    pub fn send_back(&mut self) -> Result<(), StaleTransition> {
        self.guard(TaskState::Progress, TaskState::Pending)?;
        self.state = TaskState::Pending;
        self.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    /// `Progress -> Failure`.
    pub fn fail(&mut self, message: String) -> Result<(), StaleTransition> {
        self.guard(TaskState::Progress, TaskState::Failure)?;
        self.state = TaskState::Failure;
        self.error = Some(TaskError {
            message,
            attempt: self.attempt_count,
        });
        self.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TranscodeConfig {
        TranscodeConfig {
            resolution: Resolution::Fhd1080,
            format: OutputFormat::Hls,
        }
    }

    #[test]
    fn claim_counts_the_attempt() {
        let mut task = Task::new("abc123".into(), config());
        assert_eq!(task.attempt_count, 0);

        task.claim().unwrap();
        assert_eq!(task.state, TaskState::Progress);
        assert_eq!(task.attempt_count, 1);
    }

    #[test]
    fn retry_cycle_preserves_the_counter() {
        let mut task = Task::new("abc123".into(), config());
        task.claim().unwrap();
        task.send_back().unwrap();
        assert_eq!(task.state, TaskState::Pending);
        assert_eq!(task.attempt_count, 1);

        task.claim().unwrap();
        assert_eq!(task.attempt_count, 2);
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut task = Task::new("abc123".into(), config());
        task.claim().unwrap();
        task.complete(TaskResult {
            output_name: task.output_name(),
            format: OutputFormat::Hls,
        })
        .unwrap();

        assert!(task.claim().is_err());
        assert!(task.send_back().is_err());
        assert!(task.fail("late report".into()).is_err());
        assert_eq!(task.state, TaskState::Success);
        assert!(task.error.is_none());
    }

    #[test]
    fn double_claim_is_stale() {
        let mut task = Task::new("abc123".into(), config());
        task.claim().unwrap();

        let err = task.claim().unwrap_err();
        assert_eq!(err.observed, TaskState::Progress);
        assert_eq!(task.attempt_count, 1);
    }

    #[test]
    fn failure_records_the_attempt() {
        let mut task = Task::new("abc123".into(), config());
        task.claim().unwrap();
        task.send_back().unwrap();
        task.claim().unwrap();
        task.fail("unsupported codec".into()).unwrap();

        let error = task.error.unwrap();
        assert_eq!(error.attempt, 2);
        assert_eq!(task.state, TaskState::Failure);
    }

    #[test]
    fn config_parse_rejects_unknown_values() {
        assert!(TranscodeConfig::parse("1920:1080", "hls").is_ok());
        assert!(TranscodeConfig::parse("1920:1081", "hls").is_err());
        assert!(TranscodeConfig::parse("1920:1080", "webm").is_err());
    }

    #[test]
    fn output_names_are_deterministic() {
        let hls = TranscodeConfig::parse("1920:1080", "hls").unwrap();
        let dash = TranscodeConfig::parse("1280:720", "dash").unwrap();
        let mp4 = TranscodeConfig::parse("854:480", "mp4").unwrap();

        assert_eq!(hls.output_name("abc123"), "abc123_transcoded.m3u8");
        assert_eq!(dash.output_name("abc123"), "abc123_transcoded.mpd");
        assert_eq!(mp4.output_name("abc123"), "abc123_transcoded.mp4");
    }
}
