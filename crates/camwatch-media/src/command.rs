//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// FFmpeg output target meaning "write to stdout".
pub const STDOUT: &str = "-";

/// Builder for FFmpeg commands.
///
/// The input is kept as a string so it can be either a local file or a
/// stream URL (HLS, RTSP).
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path or URL
    input: String,
    /// Output file path (or `-` for stdout)
    output: String,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a command reading from a file.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self::from_url(
            input.as_ref().to_string_lossy(),
            output.as_ref().to_string_lossy(),
        )
    }

    /// Create a command reading from a URL (or any other ffmpeg input).
    pub fn from_url(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Seek the input before decoding (fast seek).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Limit the output duration.
    pub fn max_duration(self, seconds: u64) -> Self {
        self.output_arg("-t").output_arg(seconds.to_string())
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Copy every stream without re-encoding.
    pub fn stream_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Move the MP4 index to the front so clips play while downloading.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Force the output container format.
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    /// Extract single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-vframes").output_arg("1")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Output target of this command.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.clone());

        args.extend(self.output_args.clone());

        args.push(self.output.clone());

        args
    }

    /// Build a `tokio` command ready to spawn.
    pub fn to_command(&self) -> Command {
        let mut command = Command::new("ffmpeg");
        command.args(self.build_args()).stdin(Stdio::null());
        command
    }
}

/// Runner for short-lived FFmpeg commands with an optional timeout.
pub struct FfmpegRunner {
    /// Timeout
    timeout: Option<Duration>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run an FFmpeg command, discarding its stdout.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.output(cmd).await.map(|_| ())
    }

    /// Run an FFmpeg command and return what it wrote to stdout.
    pub async fn output(&self, cmd: &FfmpegCommand) -> MediaResult<Vec<u8>> {
        check_ffmpeg()?;

        debug!("Running FFmpeg: ffmpeg {}", cmd.build_args().join(" "));

        let child = cmd
            .to_command()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = self.wait_for_completion(child).await?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                (!stderr.is_empty()).then_some(stderr),
                output.status.code(),
            ))
        }
    }

    /// Wait for the child, killing it when the timeout elapses.
    ///
    /// Dropping the wait future drops the child, which kills it.
    async fn wait_for_completion(&self, child: Child) -> MediaResult<Output> {
        let wait_future = child.wait_with_output();

        match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, wait_future).await {
                Ok(result) => result.map_err(MediaError::from),
                Err(_) => {
                    warn!(
                        "FFmpeg timed out after {:.1} seconds, killing process",
                        timeout.as_secs_f64()
                    );
                    Err(MediaError::Timeout(timeout.as_secs()))
                }
            },
            None => wait_future.await.map_err(MediaError::from),
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.jpg")
            .seek(10.0)
            .single_frame()
            .video_filter("scale=320:-1");

        let args = cmd.build_args();
        assert_eq!(args[0], "-y");
        assert!(args.contains(&"-ss".to_string()));
        assert!(args.contains(&"10.000".to_string()));
        assert!(args.contains(&"scale=320:-1".to_string()));
        assert_eq!(args.last().unwrap(), "output.jpg");

        // Seek must come before the input
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < i);
    }

    #[test]
    fn test_stream_copy_capture_args() {
        let cmd = FfmpegCommand::from_url("http://cam.local/stream.m3u8", "/rec/motion_1.mp4")
            .stream_copy()
            .faststart()
            .max_duration(300);

        let args = cmd.build_args().join(" ");
        assert!(args.contains("-i http://cam.local/stream.m3u8 -c copy -movflags +faststart -t 300"));
        assert!(args.ends_with("/rec/motion_1.mp4"));
    }

    #[test]
    fn test_frame_grab_args() {
        let cmd = FfmpegCommand::from_url("rtsp://cam/1", STDOUT)
            .single_frame()
            .format("image2pipe")
            .video_codec("png");

        let args = cmd.build_args();
        assert_eq!(cmd.output(), "-");
        assert!(args.contains(&"image2pipe".to_string()));
        assert!(args.contains(&"png".to_string()));
    }
}
