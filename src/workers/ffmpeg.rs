use crate::config::settings::TranscodeSettings;
use crate::modules::transcode::error::ExecutionError;
use crate::modules::transcode::model::{OutputFormat, TranscodeConfig};
use crate::modules::transcode::tool::{ToolOutput, TranscodeTool};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{info, warn};

const STDERR_TAIL: usize = 4096;

/// ffmpeg behind the [`TranscodeTool`] seam. The soft limit asks ffmpeg
/// to finish up (`q` on stdin, its documented interactive quit); the
/// hard limit kills the child and reports a retryable failure.
pub struct FfmpegTool {
    bin: String,
    soft_timeout: Duration,
    hard_timeout: Duration,
}

impl FfmpegTool {
    pub fn new(settings: &TranscodeSettings) -> Self {
        Self {
            bin: settings.ffmpeg_bin.clone(),
            soft_timeout: settings.soft_timeout,
            hard_timeout: settings.hard_timeout,
        }
    }

    fn command_plan(
        input: &Path,
        scratch: &Path,
        output_stem: &str,
        config: &TranscodeConfig,
    ) -> (PathBuf, Vec<String>) {
        let scale = format!("scale={}", config.resolution.as_scale());
        let mut args = vec![
            "-i".to_string(),
            input.display().to_string(),
            "-vf".to_string(),
            scale,
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "medium".to_string(),
            "-crf".to_string(),
            "23".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "128k".to_string(),
        ];

        let primary = scratch.join(format!("{output_stem}.{}", config.format.extension()));
        match config.format {
            OutputFormat::Hls => {
                let segments = scratch.join(format!("{output_stem}_%03d.ts"));
                args.extend([
                    "-hls_time".to_string(),
                    "10".to_string(),
                    "-hls_playlist_type".to_string(),
                    "vod".to_string(),
                    "-hls_segment_filename".to_string(),
                    segments.display().to_string(),
                ]);
            }
            OutputFormat::Dash => {
                args.extend([
                    "-f".to_string(),
                    "dash".to_string(),
                    "-seg_duration".to_string(),
                    "10".to_string(),
                    "-use_template".to_string(),
                    "1".to_string(),
                    "-use_timeline".to_string(),
                    "1".to_string(),
                    "-init_seg_name".to_string(),
                    format!("{output_stem}_init_$RepresentationID$.m4s"),
                    "-media_seg_name".to_string(),
                    format!("{output_stem}_chunk_$RepresentationID$_$Number$.m4s"),
                ]);
            }
            OutputFormat::Mp4 => {
                args.extend(["-movflags".to_string(), "+faststart".to_string()]);
            }
        }

        args.push("-y".to_string());
        args.push(primary.display().to_string());
        (primary, args)
    }

    async fn wait_bounded(
        &self,
        child: &mut tokio::process::Child,
    ) -> Result<std::process::ExitStatus, ExecutionError> {
        let mut stdin = child.stdin.take();

        tokio::select! {
            status = child.wait() => {
                return status.map_err(|e| ExecutionError::retryable(format!("tool wait: {e}")));
            }
            _ = tokio::time::sleep(self.soft_timeout) => {}
        }

        warn!("Soft limit reached, asking ffmpeg to wind down");
        if let Some(stdin) = stdin.as_mut() {
            let _ = stdin.write_all(b"q").await;
            let _ = stdin.flush().await;
        }

        let grace = self.hard_timeout.saturating_sub(self.soft_timeout);
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => status.map_err(|e| ExecutionError::retryable(format!("tool wait: {e}"))),
            Err(_) => {
                warn!("Hard limit reached, killing ffmpeg");
                let _ = child.start_kill();
                let _ = child.wait().await;
                Err(ExecutionError::retryable(format!(
                    "transcode exceeded hard timeout of {}s",
                    self.hard_timeout.as_secs()
                )))
            }
        }
    }
}

#[async_trait]
impl TranscodeTool for FfmpegTool {
    async fn run(
        &self,
        input: &Path,
        scratch: &Path,
        output_stem: &str,
        config: &TranscodeConfig,
    ) -> Result<ToolOutput, ExecutionError> {
        let (primary, args) = Self::command_plan(input, scratch, output_stem, config);
        info!(format = config.format.as_str(), "Starting ffmpeg");

        let mut child = Command::new(&self.bin)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutionError::terminal(format!("failed to spawn {}: {e}", self.bin)))?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut buf).await;
            }
            buf
        });

        let status = self.wait_bounded(&mut child).await?;
        let stderr_tail = stderr_task
            .await
            .map(|buf| {
                let start = buf.len().saturating_sub(STDERR_TAIL);
                String::from_utf8_lossy(&buf[start..]).into_owned()
            })
            .unwrap_or_default();

        if !status.success() {
            // A signal means the process was killed out from under us,
            // which is worth another attempt; a nonzero exit is ffmpeg
            // rejecting the input and will not improve on retry.
            return if status.code().is_none() {
                Err(ExecutionError::retryable(
                    "ffmpeg terminated by signal".to_string(),
                ))
            } else {
                Err(ExecutionError::terminal(format!(
                    "ffmpeg exited with {status}: {}",
                    stderr_tail.trim()
                )))
            };
        }

        let files = collect_outputs(scratch, output_stem, &primary).await?;
        Ok(ToolOutput { primary, files })
    }
}

/// Everything under the scratch dir sharing the output stem: the
/// playlist plus segments for hls/dash, the single file for mp4.
async fn collect_outputs(
    scratch: &Path,
    output_stem: &str,
    primary: &Path,
) -> Result<Vec<PathBuf>, ExecutionError> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(scratch)
        .await
        .map_err(|e| ExecutionError::retryable(format!("scratch read: {e}")))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ExecutionError::retryable(format!("scratch read: {e}")))?
    {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(output_stem) {
            files.push(entry.path());
        }
    }

    if !files.iter().any(|f| f == primary) {
        return Err(ExecutionError::terminal(
            "ffmpeg succeeded but produced no primary output".to_string(),
        ));
    }
    files.sort();
    Ok(files)
}
