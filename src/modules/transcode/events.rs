use crate::modules::transcode::model::TranscodeConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The job descriptor crossing the queue. Everything a worker needs to
/// claim and run one attempt; the authoritative state lives in the task
/// store, not in the message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranscodeJob {
    pub task_id: Uuid,
    pub file_id: String,
    pub config: TranscodeConfig,
}
