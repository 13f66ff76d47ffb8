//! External media tool integration (ffmpeg).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::utils::process::{ProcessExit, run_to_exit, tokio_command, wait_or_kill};
use crate::{Error, Result};

/// Tiles in a contact sheet (columns x rows).
const CONTACT_SHEET_COLUMNS: u32 = 4;
const CONTACT_SHEET_ROWS: u32 = 4;
const CONTACT_SHEET_TILE_WIDTH: u32 = 480;
/// Frame spacing used when the duration cannot be probed.
const FALLBACK_TILE_INTERVAL_SECS: f64 = 60.0;

/// Input for one live capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub creator_id: String,
    pub playback_url: String,
    pub output: PathBuf,
    pub user_agent: Option<String>,
}

/// Capture, conversion and thumbnailing backend.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Pull the live stream into `request.output` until the stream ends or
    /// `cancellation_token` fires, whichever comes first.
    async fn capture(
        &self,
        request: &CaptureRequest,
        cancellation_token: CancellationToken,
    ) -> Result<ProcessExit>;

    /// Remux `source` into `destination`. Success is the exit status alone.
    async fn convert(&self, source: &Path, destination: &Path) -> Result<()>;

    /// Render a thumbnail grid of `source` into `destination`.
    async fn contact_sheet(&self, source: &Path, destination: &Path) -> Result<()>;
}

/// [`MediaEngine`] backed by the ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    binary_path: String,
}

impl FfmpegEngine {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// ffprobe next to the configured ffmpeg.
    fn ffprobe_path(&self) -> String {
        let path = Path::new(&self.binary_path);
        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) if name.contains("ffmpeg") => path
                .with_file_name(name.replacen("ffmpeg", "ffprobe", 1))
                .to_string_lossy()
                .into_owned(),
            _ => "ffprobe".to_string(),
        }
    }

    fn capture_args(request: &CaptureRequest) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "warning"]
            .map(String::from)
            .to_vec();

        args.extend(
            [
                "-reconnect",
                "1",
                "-reconnect_streamed",
                "1",
                "-reconnect_delay_max",
                "5",
            ]
            .map(String::from),
        );

        if let Some(ref ua) = request.user_agent {
            args.extend(["-user_agent".to_string(), ua.clone()]);
        }

        args.extend(["-i".to_string(), request.playback_url.clone()]);
        args.extend(["-c".to_string(), "copy".to_string()]);
        args.push(request.output.to_string_lossy().into_owned());
        args
    }

    fn convert_args(source: &Path, destination: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            source.to_string_lossy().into_owned(),
            "-c".into(),
            "copy".into(),
            "-movflags".into(),
            "+faststart".into(),
            destination.to_string_lossy().into_owned(),
        ]
    }

    fn contact_sheet_args(source: &Path, destination: &Path, interval_secs: f64) -> Vec<String> {
        let filter = format!(
            "fps=1/{interval:.3},scale={width}:-2,tile={cols}x{rows}",
            interval = interval_secs,
            width = CONTACT_SHEET_TILE_WIDTH,
            cols = CONTACT_SHEET_COLUMNS,
            rows = CONTACT_SHEET_ROWS,
        );
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            source.to_string_lossy().into_owned(),
            "-vf".into(),
            filter,
            "-frames:v".into(),
            "1".into(),
            "-q:v".into(),
            "3".into(),
            destination.to_string_lossy().into_owned(),
        ]
    }

    /// Spacing between sheet frames so the tiles cover the whole video.
    fn tile_interval(duration_secs: Option<f64>) -> f64 {
        let tiles = f64::from(CONTACT_SHEET_COLUMNS * CONTACT_SHEET_ROWS);
        match duration_secs {
            Some(duration) if duration.is_finite() && duration > 0.0 => (duration / tiles).max(1.0),
            _ => FALLBACK_TILE_INTERVAL_SECS,
        }
    }

    async fn probe_duration(&self, source: &Path) -> Option<f64> {
        let output = tokio_command(self.ffprobe_path())
            .args(["-v", "error", "-show_entries", "format=duration", "-of", "csv=p=0"])
            .arg(source)
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }

    async fn run_tool(&self, what: &str, args: Vec<String>) -> Result<()> {
        let mut cmd = tokio_command(&self.binary_path);
        cmd.args(&args).env("LC_ALL", "C").stdin(Stdio::null());

        let (status, stderr_tail) = run_to_exit(&mut cmd).await?;
        if status.success() {
            return Ok(());
        }
        Err(Error::process(format!(
            "ffmpeg {} exited with {}: {}",
            what,
            status,
            stderr_tail.join(" | ")
        )))
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn capture(
        &self,
        request: &CaptureRequest,
        cancellation_token: CancellationToken,
    ) -> Result<ProcessExit> {
        let args = Self::capture_args(request);
        info!(
            creator_id = %request.creator_id,
            output = %request.output.display(),
            "Starting ffmpeg capture"
        );
        debug!("ffmpeg args: {:?}", args);

        let mut child = tokio_command(&self.binary_path)
            .args(&args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::process(format!("Failed to spawn ffmpeg: {}", e)))?;

        if let Some(stderr) = child.stderr.take() {
            let creator_id = request.creator_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.contains("Error") || line.contains("error") {
                        warn!(creator_id = %creator_id, "ffmpeg: {}", line);
                    } else {
                        debug!(creator_id = %creator_id, "ffmpeg: {}", line);
                    }
                }
            });
        }

        Ok(wait_or_kill(child, cancellation_token).await)
    }

    async fn convert(&self, source: &Path, destination: &Path) -> Result<()> {
        self.run_tool("convert", Self::convert_args(source, destination))
            .await
    }

    async fn contact_sheet(&self, source: &Path, destination: &Path) -> Result<()> {
        let duration = self.probe_duration(source).await;
        let interval = Self::tile_interval(duration);
        debug!(source = %source.display(), ?duration, interval, "Rendering contact sheet");
        self.run_tool(
            "contact sheet",
            Self::contact_sheet_args(source, destination, interval),
        )
        .await
    }
}
