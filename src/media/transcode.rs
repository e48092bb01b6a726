//! HLS transcoding via an external ffmpeg process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("ffmpeg failed for {path}: {stderr}")]
    Failed { path: String, stderr: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TranscodeError>;

/// ffmpeg parameters for the HLS output.
#[derive(Debug, Clone)]
pub struct HlsSettings {
    pub preset: String,
    pub crf: u8,
    pub audio_bitrate: String,
    pub segment_secs: u32,
}

impl Default for HlsSettings {
    fn default() -> Self {
        Self {
            preset: "superfast".to_string(),
            crf: 30,
            audio_bitrate: "128k".to_string(),
            segment_secs: 4,
        }
    }
}

/// Segment output directory for an input file: the input path minus its
/// extension.
pub fn output_dir(input: &Path) -> PathBuf {
    input.with_extension("")
}

/// ffmpeg argument list for one input file.
///
/// Transcodes to H.264/AAC and segments into a vod HLS playlist with
/// independent 4-second segments, written next to the source.
pub fn build_args(input: &Path, settings: &HlsSettings) -> Vec<String> {
    let playlist = output_dir(input).join("playlist.m3u8");
    vec![
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        settings.preset.clone(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-crf".to_string(),
        settings.crf.to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        settings.audio_bitrate.clone(),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "0:a".to_string(),
        "-f".to_string(),
        "hls".to_string(),
        "-hls_time".to_string(),
        settings.segment_secs.to_string(),
        "-hls_playlist_type".to_string(),
        "vod".to_string(),
        "-hls_flags".to_string(),
        "independent_segments".to_string(),
        "-hls_segment_filename".to_string(),
        "segment_%03d.ts".to_string(),
        playlist.to_string_lossy().into_owned(),
    ]
}

/// One transcode invocation: succeeds fully or fails with a diagnostic.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn convert(&self, path: &Path) -> Result<()>;
}

/// Production transcoder shelling out to ffmpeg.
pub struct FfmpegTranscoder {
    settings: HlsSettings,
}

impl FfmpegTranscoder {
    pub fn new(settings: HlsSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(&self, path: &Path) -> Result<()> {
        let out_dir = output_dir(path);
        tokio::fs::create_dir_all(&out_dir).await?;

        let args = build_args(path, &self.settings);
        debug!(input = %path.display(), ?args, "Starting ffmpeg");

        let output = Command::new("ffmpeg")
            .args(&args)
            .current_dir(&out_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Keep the tail; ffmpeg puts the actual error last.
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(TranscodeError::Failed {
                path: path.to_string_lossy().into_owned(),
                stderr: tail,
            });
        }

        info!(input = %path.display(), out = %out_dir.display(), "Transcode complete");
        Ok(())
    }
}

/// Test transcoder recording inputs; fails for paths containing any of the
/// configured markers. Exposed for the integration tests in `tests/`.
#[derive(Default)]
pub struct MockTranscoder {
    converted: Mutex<Vec<PathBuf>>,
    fail_markers: Vec<String>,
}

impl MockTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any input whose path contains `marker`.
    pub fn failing_on(marker: &str) -> Self {
        Self {
            converted: Mutex::new(Vec::new()),
            fail_markers: vec![marker.to_string()],
        }
    }

    /// Paths handed to `convert`, in order (including failed ones).
    pub fn converted_paths(&self) -> Vec<PathBuf> {
        self.converted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn convert(&self, path: &Path) -> Result<()> {
        self.converted.lock().unwrap().push(path.to_path_buf());

        let text = path.to_string_lossy();
        if self.fail_markers.iter().any(|m| text.contains(m.as_str())) {
            return Err(TranscodeError::Failed {
                path: text.into_owned(),
                stderr: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}
