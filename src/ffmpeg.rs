
use std::path::{Path, PathBuf};

use crate::{
    error_code::ErrorCode,
    process::{Process, ProcessError},
};

/// Coarse aspect-ratio class of a video's primary stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Orientation {
    Landscape,
    Portrait,
    Other,
}

impl Orientation {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Landscape => "landscape",
            Self::Portrait => "portrait",
            Self::Other => "other",
        }
    }

    /// Classify by width/height ratio. The ranges approximate 16:9 and 9:16
    /// with tolerance; bounds are inclusive.
    pub(crate) fn from_dimensions(width: u32, height: u32) -> Self {
        let ratio = f64::from(width) / f64::from(height);

        if (1.73..=1.83).contains(&ratio) {
            Self::Landscape
        } else if (0.51..=0.61).contains(&ratio) {
            Self::Portrait
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct FfProbe {
    streams: [FfProbeStream; 1],
}

#[derive(Debug, serde::Deserialize)]
struct FfProbeStream {
    width: u32,
    height: u32,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum FfMpegError {
    #[error("Error in ffmpeg process")]
    Process(#[source] ProcessError),

    #[error("Invalid probe output")]
    Json(#[source] serde_json::Error),

    #[error("Invalid file path")]
    Path,
}

impl FfMpegError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Process(e) => e.error_code(),
            Self::Json(_) => ErrorCode::PROBE_OUTPUT,
            Self::Path => ErrorCode::INVALID_FILE_PATH,
        }
    }
}

/// Seam between the upload pipeline and the external media tools, so the
/// pipeline can be driven without real binaries.
#[async_trait::async_trait(?Send)]
pub(crate) trait MediaProcessor {
    async fn probe_orientation(&self, input_path: &Path) -> Result<Orientation, FfMpegError>;

    /// Write the remuxed derivative to `output_path`. The caller owns both
    /// paths; a failed run must not leave a partial derivative behind.
    async fn remux_fast_start(
        &self,
        input_path: &Path,
        output_path: &Path,
    ) -> Result<(), FfMpegError>;
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct FfMpeg;

#[async_trait::async_trait(?Send)]
impl MediaProcessor for FfMpeg {
    async fn probe_orientation(&self, input_path: &Path) -> Result<Orientation, FfMpegError> {
        probe_orientation(input_path).await
    }

    async fn remux_fast_start(
        &self,
        input_path: &Path,
        output_path: &Path,
    ) -> Result<(), FfMpegError> {
        remux_fast_start(input_path, output_path).await
    }
}

#[tracing::instrument(level = "debug")]
async fn probe_orientation(input_path: &Path) -> Result<Orientation, FfMpegError> {
    let input_path = input_path.to_str().ok_or(FfMpegError::Path)?;

    let process = Process::run(
        "ffprobe",
        &[
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "json",
            input_path,
        ],
    )
    .map_err(FfMpegError::Process)?;

    let output = process.output().await.map_err(FfMpegError::Process)?;

    let probe: FfProbe = serde_json::from_slice(&output.stdout).map_err(FfMpegError::Json)?;

    Ok(parse_orientation(probe))
}

fn parse_orientation(probe: FfProbe) -> Orientation {
    let FfProbe {
        streams: [FfProbeStream { width, height }],
    } = probe;

    Orientation::from_dimensions(width, height)
}

/// Rewrite the container so the index atom precedes media data, copying
/// streams without re-encoding.
#[tracing::instrument(level = "debug")]
async fn remux_fast_start(input_path: &Path, output_path: &Path) -> Result<(), FfMpegError> {
    let input = input_path.to_str().ok_or(FfMpegError::Path)?;
    let output = output_path.to_str().ok_or(FfMpegError::Path)?;

    let process = Process::run(
        "ffmpeg",
        &[
            "-i",
            input,
            "-movflags",
            "faststart",
            "-map_metadata",
            "0",
            "-codec",
            "copy",
            "-f",
            "mp4",
            output,
        ],
    )
    .map_err(FfMpegError::Process)?;

    if let Err(e) = process.wait().await {
        // ffmpeg opens the output before copying streams, so a failed run
        // can leave a partial file at output_path
        match tokio::fs::remove_file(output_path).await {
            Err(remove_err) if remove_err.kind() != std::io::ErrorKind::NotFound => {
                tracing::warn!("Failed to remove partial derivative: {remove_err}");
            }
            _ => {}
        }

        return Err(FfMpegError::Process(e));
    }

    Ok(())
}

/// The derivative for a staged upload lands at `<input>.processed`.
pub(crate) fn processed_path(input_path: &Path) -> PathBuf {
    let mut path = input_path.as_os_str().to_owned();
    path.push(".processed");
    PathBuf::from(path)
}
