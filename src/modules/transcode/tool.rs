use crate::modules::transcode::error::ExecutionError;
use crate::modules::transcode::model::TranscodeConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Files produced by one successful tool invocation, all under the
/// task's scratch directory.
#[derive(Debug)]
pub struct ToolOutput {
    /// Primary output: the playlist for segmented formats, the single
    /// file for mp4. Its file name is the task's deterministic output
    /// name.
    pub primary: PathBuf,
    /// Everything to persist, primary included (segments follow it for
    /// hls/dash).
    pub files: Vec<PathBuf>,
}

/// The external transcoding command, behind a seam so workers can be
/// exercised without ffmpeg on the machine. Implementations own the
/// soft/hard timeout pair: ask the tool to wind down at the soft limit,
/// kill it at the hard limit, and report the kill as a retryable
/// failure.
#[async_trait]
pub trait TranscodeTool: Send + Sync {
    async fn run(
        &self,
        input: &Path,
        scratch: &Path,
        output_stem: &str,
        config: &TranscodeConfig,
    ) -> Result<ToolOutput, ExecutionError>;
}
