//! Frame grabbing from a live stream.

use async_trait::async_trait;
use image::DynamicImage;
use std::time::Duration;

use crate::command::{FfmpegCommand, FfmpegRunner, STDOUT};
use crate::error::{MediaError, MediaResult};

/// Source of decoded frames, one per sampling tick.
#[async_trait]
pub trait FrameSource: Send {
    /// Decode the most recent frame of the stream.
    async fn next_frame(&mut self) -> MediaResult<DynamicImage>;
}

/// Grabs single frames by running `ffmpeg -vframes 1` against the stream.
///
/// Each call opens the stream anew, so a stalled or restarted stream never
/// wedges the caller for longer than the timeout.
#[derive(Debug, Clone)]
pub struct FfmpegFrameSource {
    url: String,
    timeout: Duration,
}

impl FfmpegFrameSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    fn command(&self) -> FfmpegCommand {
        FfmpegCommand::from_url(&self.url, STDOUT)
            .single_frame()
            .format("image2pipe")
            .video_codec("png")
            .log_level("error")
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn next_frame(&mut self) -> MediaResult<DynamicImage> {
        let bytes = FfmpegRunner::new()
            .with_timeout(self.timeout)
            .output(&self.command())
            .await?;

        decode_frame(&bytes)
    }
}

/// Decode an encoded still (PNG, JPEG) into an image.
pub fn decode_frame(bytes: &[u8]) -> MediaResult<DynamicImage> {
    if bytes.is_empty() {
        return Err(MediaError::frame_decode("ffmpeg produced no frame data"));
    }

    image::load_from_memory(bytes).map_err(MediaError::from)
}
