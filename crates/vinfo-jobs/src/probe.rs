//! Media probing via an external `ffprobe` process.
//!
//! The probe runs as a child process bound to the job's cancellation token:
//! cancelling (or dropping) the probe kills the child.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use vinfo_core::{defaults, VideoInfo};

/// Why a probe produced no metadata. The display text is what gets recorded
/// as the job's outcome error.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run ffprobe: {0}")]
    Spawn(String),

    #[error("ffprobe failed: {0}")]
    Failed(String),

    #[error("failed to parse ffprobe output: {0}")]
    Parse(String),

    #[error("failed to parse {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("ffprobe timed out after {0}s")]
    TimedOut(u64),

    #[error("probe cancelled")]
    Cancelled,
}

impl ProbeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProbeError::Cancelled)
    }
}

/// Something that can read duration and chapters from a video.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, path: &str, cancel: &CancellationToken)
        -> Result<VideoInfo, ProbeError>;
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    chapters: Vec<ProbeChapter>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: String,
}

#[derive(Debug, Deserialize)]
struct ProbeChapter {
    #[serde(default)]
    start_time: String,
    #[serde(default)]
    end_time: String,
}

fn parse_seconds(field: &'static str, raw: &str) -> Result<f64, ProbeError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ProbeError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
}

/// Parse ffprobe's JSON (`-show_format -show_chapters`) into [`VideoInfo`].
///
/// Durations are decimal strings in seconds; a chapter's duration is its end
/// minus its start.
pub fn parse_probe_output(stdout: &[u8]) -> Result<VideoInfo, ProbeError> {
    let output: ProbeOutput =
        serde_json::from_slice(stdout).map_err(|e| ProbeError::Parse(e.to_string()))?;

    let duration_seconds = parse_seconds("duration", &output.format.duration)?;

    let chapter_durations_seconds = output
        .chapters
        .iter()
        .map(|chapter| {
            let start = parse_seconds("chapter start time", &chapter.start_time)?;
            let end = parse_seconds("chapter end time", &chapter.end_time)?;
            Ok(end - start)
        })
        .collect::<Result<Vec<_>, ProbeError>>()?;

    Ok(VideoInfo {
        duration_seconds,
        chapter_durations_seconds,
    })
}

/// [`MediaProbe`] backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new(defaults::FFPROBE_BINARY)
    }
}

impl FfprobeProbe {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
        }
    }

    /// Bound each probe run.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Create from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `VI_FFPROBE_PATH` | `ffprobe` | Probe executable |
    /// | `VI_PROBE_TIMEOUT_SECS` | unset | Optional per-probe timeout |
    pub fn from_env() -> Self {
        let binary = std::env::var("VI_FFPROBE_PATH")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| defaults::FFPROBE_BINARY.to_string());

        let mut probe = Self::new(binary);
        if let Some(secs) = std::env::var("VI_PROBE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
        {
            probe = probe.with_timeout(Duration::from_secs(secs));
        }
        probe
    }

    fn command(&self, path: &str) -> Command {
        // A leading dash would be read as an ffprobe option.
        let input = if path.starts_with('-') {
            format!("./{}", path)
        } else {
            path.to_string()
        };

        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_chapters",
        ])
        .arg(input)
        .stdin(Stdio::null())
        .kill_on_drop(true);
        cmd
    }

    async fn run(&self, path: &str) -> Result<std::process::Output, ProbeError> {
        let output = self.command(path).output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, output)
                .await
                .map_err(|_| ProbeError::TimedOut(limit.as_secs()))?,
            None => output.await,
        };
        output.map_err(|e| ProbeError::Spawn(e.to_string()))
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<VideoInfo, ProbeError> {
        debug!(binary = %self.binary.display(), path, "Running ffprobe");

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
            output = self.run(path) => output?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let detail = if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr.to_string()
            };
            return Err(ProbeError::Failed(detail));
        }

        parse_probe_output(&output.stdout)
    }
}
