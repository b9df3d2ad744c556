//! Long-running stream capture processes.
//!
//! A capture process copies the live stream into an MP4 file without
//! re-encoding until it is told to stop or hits its maximum duration.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::command::{check_ffmpeg, FfmpegCommand};
use crate::error::{MediaError, MediaResult};

/// How a capture process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureExit {
    /// Exited on its own (stream ended, max duration reached, crash)
    Exited { code: Option<i32> },
    /// Exited after a polite stop request
    Stopped,
    /// Forcibly killed after the grace period
    Killed,
}

impl CaptureExit {
    pub fn is_success(&self) -> bool {
        matches!(self, CaptureExit::Exited { code: Some(0) } | CaptureExit::Stopped)
    }
}

/// Handle to a running capture process.
#[async_trait]
pub trait CaptureProcess: Send {
    /// OS process id, if known.
    fn pid(&self) -> Option<u32>;

    /// Wait for the process to exit on its own. Cancel-safe: dropping the
    /// future leaves the process running and the handle usable.
    async fn wait(&mut self) -> CaptureExit;

    /// Ask the process to stop, killing it once `grace` has elapsed.
    async fn terminate(&mut self, grace: Duration) -> CaptureExit;
}

/// Starts capture processes.
#[async_trait]
pub trait CaptureLauncher: Send + Sync {
    /// Start capturing into `output`.
    async fn launch(&self, output: &Path) -> MediaResult<Box<dyn CaptureProcess>>;
}

/// Launches `ffmpeg -c copy` against the configured stream.
#[derive(Debug, Clone)]
pub struct FfmpegCaptureLauncher {
    stream_url: String,
    max_duration_secs: u64,
}

impl FfmpegCaptureLauncher {
    pub fn new(stream_url: impl Into<String>, max_duration_secs: u64) -> Self {
        Self {
            stream_url: stream_url.into(),
            max_duration_secs,
        }
    }

    /// Capture command for a given output file.
    pub fn command(&self, output: &Path) -> FfmpegCommand {
        FfmpegCommand::from_url(&self.stream_url, output.to_string_lossy())
            .stream_copy()
            .faststart()
            .max_duration(self.max_duration_secs)
            .log_level("error")
    }
}

#[async_trait]
impl CaptureLauncher for FfmpegCaptureLauncher {
    async fn launch(&self, output: &Path) -> MediaResult<Box<dyn CaptureProcess>> {
        check_ffmpeg()?;

        let cmd = self.command(output);
        debug!("Starting capture: ffmpeg {}", cmd.build_args().join(" "));

        let mut child = cmd
            .to_command()
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::capture_launch(format!("spawn ffmpeg: {e}")))?;

        if let Some(stderr) = child.stderr.take() {
            let name = output
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(recording = %name, "ffmpeg: {}", line);
                }
            });
        }

        info!(
            pid = child.id(),
            "Capture process started for {}",
            output.display()
        );

        Ok(Box::new(FfmpegCaptureProcess {
            child,
            output: output.to_path_buf(),
            exit: None,
        }))
    }
}

/// A running `ffmpeg` capture.
pub struct FfmpegCaptureProcess {
    child: Child,
    output: PathBuf,
    exit: Option<CaptureExit>,
}

impl FfmpegCaptureProcess {
    fn request_stop(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                // SIGTERM lets ffmpeg write the MP4 trailer
                match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    Ok(()) => return,
                    Err(e) => warn!("SIGTERM to ffmpeg pid {} failed: {}", pid, e),
                }
            }
        }

        if let Err(e) = self.child.start_kill() {
            warn!("Failed to stop capture for {}: {}", self.output.display(), e);
        }
    }
}

#[async_trait]
impl CaptureProcess for FfmpegCaptureProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> CaptureExit {
        if let Some(exit) = self.exit {
            return exit;
        }

        let exit = match self.child.wait().await {
            Ok(status) => CaptureExit::Exited {
                code: status.code(),
            },
            Err(e) => {
                warn!("Waiting on capture for {} failed: {}", self.output.display(), e);
                CaptureExit::Exited { code: None }
            }
        };
        self.exit = Some(exit);
        exit
    }

    async fn terminate(&mut self, grace: Duration) -> CaptureExit {
        if let Some(exit) = self.exit {
            return exit;
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            let exit = CaptureExit::Exited {
                code: status.code(),
            };
            self.exit = Some(exit);
            return exit;
        }

        self.request_stop();

        let exit = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(_) => CaptureExit::Stopped,
            Err(_) => {
                warn!(
                    "Capture for {} did not stop within {:.0}s, killing",
                    self.output.display(),
                    grace.as_secs_f64()
                );
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to kill capture process: {}", e);
                }
                CaptureExit::Killed
            }
        };
        self.exit = Some(exit);
        exit
    }
}
