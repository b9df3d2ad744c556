//! Screenshot and thumbnail generation.

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::probe_duration;

/// Screenshot width in pixels (height keeps the aspect ratio).
pub const SCREENSHOT_WIDTH: u32 = 320;

/// Offset of the first screenshot into the clip.
pub const FIRST_SCREENSHOT_SECS: f64 = 1.0;

/// Duration assumed when ffprobe cannot read the clip.
pub const FALLBACK_DURATION_SECS: f64 = 30.0;

/// Produces still images for a finished clip.
#[async_trait]
pub trait Thumbnailer: Send + Sync {
    /// Write screenshots next to `video` and return their file names in clip
    /// order. The first one serves as the thumbnail. An empty list means no
    /// screenshot could be produced.
    async fn screenshots(&self, video: &Path) -> Vec<String>;
}

/// Thumbnailer backed by the ffmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegThumbnailer {
    interval_secs: f64,
}

impl FfmpegThumbnailer {
    pub fn new(interval_secs: f64) -> Self {
        Self {
            interval_secs: interval_secs.max(0.5),
        }
    }
}

#[async_trait]
impl Thumbnailer for FfmpegThumbnailer {
    async fn screenshots(&self, video: &Path) -> Vec<String> {
        let Some(stem) = video.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            return Vec::new();
        };
        let dir = video.parent().unwrap_or_else(|| Path::new("."));

        let duration = match probe_duration(video).await {
            Ok(d) => d,
            Err(e) => {
                warn!(
                    "Could not get duration of {}: {}, using {}s fallback",
                    video.display(),
                    e,
                    FALLBACK_DURATION_SECS
                );
                FALLBACK_DURATION_SECS
            }
        };

        let mut names = Vec::new();
        for (index, timestamp) in screenshot_timestamps(duration, self.interval_secs)
            .into_iter()
            .enumerate()
        {
            let name = screenshot_name(&stem, index);
            match generate_thumbnail(video, dir.join(&name), timestamp).await {
                Ok(()) if dir.join(&name).exists() => {
                    debug!("Generated screenshot: {} at {:.1}s", name, timestamp);
                    names.push(name);
                }
                Ok(()) => debug!("No frame at {:.1}s in {}", timestamp, video.display()),
                Err(e) => warn!("Error generating screenshot at {:.1}s: {}", timestamp, e),
            }
        }

        if names.is_empty() {
            let name = screenshot_name(&stem, 0);
            match generate_thumbnail(video, dir.join(&name), FIRST_SCREENSHOT_SECS).await {
                Ok(()) if dir.join(&name).exists() => names.push(name),
                Ok(()) => warn!("Fallback screenshot produced no file for {}", video.display()),
                Err(e) => warn!("Error generating fallback screenshot: {}", e),
            }
        }

        info!(
            "Generated {} screenshots for {}",
            names.len(),
            video.display()
        );
        names
    }
}

/// Generate a single scaled frame from a video file.
pub async fn generate_thumbnail(
    video_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    timestamp: f64,
) -> MediaResult<()> {
    let filter = format!("scale={}:-2", SCREENSHOT_WIDTH);

    let cmd = FfmpegCommand::new(video_path.as_ref(), output_path.as_ref())
        .seek(timestamp)
        .single_frame()
        .video_filter(&filter)
        .log_level("error");

    FfmpegRunner::new().run(&cmd).await
}

/// Screenshot offsets: every `interval` seconds from 1 s up to `duration`.
pub fn screenshot_timestamps(duration: f64, interval: f64) -> Vec<f64> {
    let mut out = Vec::new();
    if interval.is_nan() || interval <= 0.0 {
        return out;
    }

    let mut t = FIRST_SCREENSHOT_SECS;
    while t < duration {
        out.push(t);
        t += interval;
    }
    out
}

/// `<stem>_NNN.jpg`
pub fn screenshot_name(stem: &str, index: usize) -> String {
    format!("{}_{:03}.jpg", stem, index)
}
