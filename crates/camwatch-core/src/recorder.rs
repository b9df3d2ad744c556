//! Recording controller.
//!
//! A single actor task owns the recording lifecycle. Everything that touches
//! the pending-stop deadline or the capture process goes through its command
//! channel, so arming, cancelling and firing the deadline can never race.
//!
//! # Lifecycle
//!
//! ```text
//!           start                       schedule_stop
//!   ┌──────┐ ─────▶ ┌───────────┐ ────────────────────▶ ┌──────────┐
//!   │ Idle │        │ Recording │                        │ Stopping │
//!   └──────┘ ◀───┐  └───────────┘ ◀──────────────────── └──────────┘
//!      ▲         │        │        extend / start            │
//!      │         │        │ observed exit                    │ deadline
//!      │         └────────┘ (implicit finalize)              │ (terminate, finalize)
//!      └─────────────────────────────────────────────────────┘
//! ```
//!
//! Finalization (metadata, screenshots, index, retention) runs in tasks
//! owned by the actor so a slow thumbnail never delays the next command.

use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use camwatch_media::{remove_if_exists, CaptureExit, CaptureLauncher, CaptureProcess, Thumbnailer};
use camwatch_models::{MotionEvent, MotionEventKind, RecorderStatus, Recording, RecordingPhase};

use crate::error::{CoreError, CoreResult};
use crate::index::RecordingIndex;
use crate::metrics;

/// Recording controller settings.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub recordings_dir: PathBuf,
    pub pre_roll: Duration,
    pub post_roll: Duration,
    /// Grace period between a polite stop and a kill
    pub stop_grace: Duration,
    /// Retention cap, 0 = unlimited
    pub max_recordings: usize,
}

enum Command {
    Motion(MotionEvent),
    Start(DateTime<Utc>),
    Extend,
    ScheduleStop,
    StopImmediate(oneshot::Sender<Option<Recording>>),
    Sweep,
    Sync(oneshot::Sender<RecorderStatus>),
    Shutdown,
}

/// Cloneable handle to the recording controller.
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<RecorderStatus>,
}

impl RecorderHandle {
    fn send(&self, cmd: Command) -> CoreResult<()> {
        self.tx.send(cmd).map_err(|_| CoreError::ControllerGone)
    }

    /// Forward a detector event (start, frame, end).
    pub fn motion(&self, event: MotionEvent) -> CoreResult<()> {
        self.send(Command::Motion(event))
    }

    /// Start a recording named after `motion_start_time`. No-op while recording.
    pub fn start_recording(&self, motion_start_time: DateTime<Utc>) -> CoreResult<()> {
        self.send(Command::Start(motion_start_time))
    }

    /// Cancel a pending stop.
    pub fn extend_recording(&self) -> CoreResult<()> {
        self.send(Command::Extend)
    }

    /// Arm (or re-arm) the post-roll deadline.
    pub fn schedule_stop(&self) -> CoreResult<()> {
        self.send(Command::ScheduleStop)
    }

    /// Run a retention sweep.
    pub fn sweep(&self) -> CoreResult<()> {
        self.send(Command::Sweep)
    }

    /// Stop and finalize now, skipping post-roll. Returns the finalized
    /// recording, if one was in progress and produced a file.
    pub async fn stop_recording_immediate(&self) -> CoreResult<Option<Recording>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::StopImmediate(reply))?;
        rx.await.map_err(|_| CoreError::ControllerGone)
    }

    /// Wait until every command sent before this call and every pending
    /// finalization has been processed, then return the status.
    pub async fn sync(&self) -> CoreResult<RecorderStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Sync(reply))?;
        rx.await.map_err(|_| CoreError::ControllerGone)
    }

    /// Latest published status. Never blocks on the actor.
    pub fn status(&self) -> RecorderStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecorderStatus> {
        self.status_rx.clone()
    }

    /// Stop any capture, finish pending finalizations and end the actor.
    pub fn shutdown(&self) -> CoreResult<()> {
        self.send(Command::Shutdown)
    }
}

#[cfg(test)]
impl RecorderHandle {
    /// Handle with no actor behind it; every command fails with `ControllerGone`.
    pub(crate) fn detached() -> Self {
        let (tx, _) = mpsc::unbounded_channel();
        let (_, status_rx) = watch::channel(RecorderStatus::default());
        Self { tx, status_rx }
    }
}

/// Capture in progress.
struct ActiveCapture {
    recording: Recording,
    path: PathBuf,
    process: Box<dyn CaptureProcess>,
}

/// Everything a finalization task needs.
#[derive(Clone)]
struct Finalizer {
    thumbnailer: Arc<dyn Thumbnailer>,
    index: Arc<RecordingIndex>,
    max_recordings: usize,
    stop_grace: Duration,
}

impl Finalizer {
    async fn stop_and_finalize(&self, mut capture: ActiveCapture) -> Option<Recording> {
        let exit = capture.process.terminate(self.stop_grace).await;
        if exit == CaptureExit::Killed {
            warn!(
                recording = %capture.recording.filename,
                "Capture process did not stop within {:?}, killed",
                self.stop_grace
            );
        }
        self.finalize(capture.recording, capture.path).await
    }

    async fn finalize(&self, mut recording: Recording, path: PathBuf) -> Option<Recording> {
        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            Ok(_) => {
                warn!(recording = %recording.filename, "Capture produced an empty file, discarding");
                if let Err(e) = remove_if_exists(&path).await {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
                return None;
            }
            Err(e) => {
                warn!(recording = %recording.filename, "Capture produced no file: {}", e);
                return None;
            }
        };

        let end = Utc::now();
        recording.end_time = Some(end);
        recording.duration_secs =
            Some(((end - recording.start_time).num_milliseconds().max(0) as f64) / 1000.0);
        recording.size_bytes = Some(size);

        let screenshots = self.thumbnailer.screenshots(&path).await;
        recording.thumbnail = screenshots.first().cloned();
        recording.screenshots = screenshots;

        if let Err(e) = self.index.insert(recording.clone()).await {
            error!(recording = %recording.filename, "Failed to index recording: {}", e);
            return None;
        }

        metrics::record_recording_finalized();
        info!(
            recording = %recording.filename,
            size_bytes = size,
            screenshots = recording.screenshots.len(),
            "Recording finalized ({:.1}s)",
            recording.duration_secs.unwrap_or_default()
        );

        if let Err(e) = self.index.sweep(self.max_recordings).await {
            warn!("Retention sweep failed: {}", e);
        }

        Some(recording)
    }
}

/// The actor.
pub struct RecordingController {
    config: RecorderConfig,
    launcher: Arc<dyn CaptureLauncher>,
    finalizer: Finalizer,
    rx: mpsc::UnboundedReceiver<Command>,
    status_tx: watch::Sender<RecorderStatus>,
    phase: RecordingPhase,
    current: Option<ActiveCapture>,
    deadline: Option<Instant>,
    deadline_wall: Option<DateTime<Utc>>,
    finalizers: JoinSet<()>,
}

impl RecordingController {
    /// Spawn the actor on the current runtime.
    pub fn spawn(
        config: RecorderConfig,
        launcher: Arc<dyn CaptureLauncher>,
        thumbnailer: Arc<dyn Thumbnailer>,
        index: Arc<RecordingIndex>,
    ) -> (RecorderHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(RecorderStatus::default());

        let finalizer = Finalizer {
            thumbnailer,
            index,
            max_recordings: config.max_recordings,
            stop_grace: config.stop_grace,
        };

        let controller = Self {
            config,
            launcher,
            finalizer,
            rx,
            status_tx,
            phase: RecordingPhase::Idle,
            current: None,
            deadline: None,
            deadline_wall: None,
            finalizers: JoinSet::new(),
        };

        let task = tokio::spawn(controller.run());
        (RecorderHandle { tx, status_rx }, task)
    }

    async fn run(mut self) {
        debug!("Recording controller started");

        loop {
            tokio::select! {
                // Timer and process events win over queued commands
                biased;

                _ = deadline_elapsed(self.deadline) => {
                    // An extend queued before the deadline fired still cancels it
                    let mut syncs = Vec::new();
                    let running = self.drain_queued(&mut syncs).await;
                    if running && self.deadline.is_some_and(|deadline| deadline <= Instant::now()) {
                        self.on_deadline();
                    }
                    for reply in syncs {
                        self.handle(Command::Sync(reply)).await;
                    }
                    if !running {
                        break;
                    }
                }
                exit = process_exit(self.current.as_mut()) => {
                    self.on_process_exit(exit);
                }
                Some(result) = self.finalizers.join_next(), if !self.finalizers.is_empty() => {
                    if let Err(e) = result {
                        error!("Finalization task failed: {}", e);
                    }
                }
                cmd = self.rx.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle(cmd).await,
                },
            }
        }

        self.stop_immediate().await;
        info!("Recording controller stopped");
    }

    /// Handle every command already queued, holding back sync replies.
    /// Returns false on shutdown.
    async fn drain_queued(&mut self, syncs: &mut Vec<oneshot::Sender<RecorderStatus>>) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(Command::Shutdown) | Err(TryRecvError::Disconnected) => return false,
                Ok(Command::Sync(reply)) => syncs.push(reply),
                Ok(cmd) => self.handle(cmd).await,
                Err(TryRecvError::Empty) => return true,
            }
        }
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Motion(event) => {
                debug!(kind = %event.kind, area = event.motion_area, "Motion event");
                match event.kind {
                    MotionEventKind::Start => self.start_recording(event.timestamp).await,
                    MotionEventKind::Frame => self.extend_recording(),
                    MotionEventKind::End => self.schedule_stop(),
                }
            }
            Command::Start(at) => self.start_recording(at).await,
            Command::Extend => self.extend_recording(),
            Command::ScheduleStop => self.schedule_stop(),
            Command::StopImmediate(reply) => {
                let recording = self.stop_immediate().await;
                let _ = reply.send(recording);
            }
            Command::Sweep => {
                if let Err(e) = self.finalizer.index.sweep(self.config.max_recordings).await {
                    warn!("Retention sweep failed: {}", e);
                }
            }
            Command::Sync(reply) => {
                self.drain_finalizers().await;
                let _ = reply.send(self.status());
            }
            // Handled by the run loop
            Command::Shutdown => {}
        }
    }

    async fn start_recording(&mut self, motion_start: DateTime<Utc>) {
        match self.phase {
            RecordingPhase::Recording => {
                debug!("Already recording, start ignored");
                return;
            }
            RecordingPhase::Stopping => {
                info!("Motion resumed during post-roll, continuing recording");
                self.cancel_stop();
                return;
            }
            RecordingPhase::Idle => {}
        }

        let filename = next_filename(&self.config.recordings_dir, motion_start).await;
        let path = self.config.recordings_dir.join(&filename);

        match self.launcher.launch(&path).await {
            Ok(process) => {
                let effective_pre_roll =
                    (Utc::now() - motion_start).num_milliseconds().max(0) as f64 / 1000.0;
                info!(
                    recording = %filename,
                    pid = ?process.pid(),
                    "Recording started (effective pre-roll {:.1}s, configured {}s)",
                    effective_pre_roll,
                    self.config.pre_roll.as_secs()
                );
                metrics::record_recording_started();

                self.current = Some(ActiveCapture {
                    recording: Recording::new(filename, motion_start),
                    path,
                    process,
                });
                self.phase = RecordingPhase::Recording;
                self.publish();
            }
            Err(e) => {
                error!(recording = %filename, "Failed to start recording: {}", e);
                metrics::record_launch_failure();
            }
        }
    }

    fn extend_recording(&mut self) {
        if self.phase == RecordingPhase::Stopping {
            debug!("Pending stop cancelled");
            self.cancel_stop();
        }
    }

    fn schedule_stop(&mut self) {
        if !self.phase.is_capturing() {
            debug!("Not recording, stop ignored");
            return;
        }

        let post_roll = self.config.post_roll;
        self.deadline = Some(Instant::now() + post_roll);
        self.deadline_wall = chrono::Duration::from_std(post_roll)
            .ok()
            .map(|d| Utc::now() + d);
        self.phase = RecordingPhase::Stopping;
        self.publish();
        debug!("Stop scheduled in {:?}", post_roll);
    }

    fn cancel_stop(&mut self) {
        self.deadline = None;
        self.deadline_wall = None;
        self.phase = RecordingPhase::Recording;
        self.publish();
    }

    fn on_deadline(&mut self) {
        self.deadline = None;
        self.deadline_wall = None;
        self.phase = RecordingPhase::Idle;

        if let Some(capture) = self.current.take() {
            info!(recording = %capture.recording.filename, "Post-roll elapsed, stopping recording");
            metrics::record_recording_stopped();
            let finalizer = self.finalizer.clone();
            self.finalizers.spawn(async move {
                finalizer.stop_and_finalize(capture).await;
            });
        }

        self.publish();
    }

    fn on_process_exit(&mut self, exit: CaptureExit) {
        let Some(capture) = self.current.take() else {
            return;
        };

        warn!(
            recording = %capture.recording.filename,
            exit = ?exit,
            phase = %self.phase,
            "Capture process exited on its own, finalizing"
        );
        metrics::record_unexpected_exit();
        metrics::record_recording_stopped();

        self.deadline = None;
        self.deadline_wall = None;
        self.phase = RecordingPhase::Idle;
        self.publish();

        let finalizer = self.finalizer.clone();
        self.finalizers.spawn(async move {
            finalizer.finalize(capture.recording, capture.path).await;
        });
    }

    /// Terminate and finalize whatever is in progress, regardless of phase,
    /// and wait for earlier finalizations.
    async fn stop_immediate(&mut self) -> Option<Recording> {
        self.deadline = None;
        self.deadline_wall = None;
        self.phase = RecordingPhase::Idle;

        let capture = self.current.take();
        self.publish();

        let recording = match capture {
            Some(capture) => {
                info!(recording = %capture.recording.filename, "Stopping recording immediately");
                metrics::record_recording_stopped();
                self.finalizer.stop_and_finalize(capture).await
            }
            None => None,
        };

        self.drain_finalizers().await;
        recording
    }

    async fn drain_finalizers(&mut self) {
        while let Some(result) = self.finalizers.join_next().await {
            if let Err(e) = result {
                error!("Finalization task failed: {}", e);
            }
        }
    }

    fn status(&self) -> RecorderStatus {
        RecorderStatus {
            phase: self.phase,
            current_recording: self.current.as_ref().map(|c| c.recording.clone()),
            pending_stop_deadline: self.deadline_wall,
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }
}

/// `motion_YYYYMMDD_HHMMSS.mp4` in local time, suffixed on collision.
async fn next_filename(dir: &Path, motion_start: DateTime<Utc>) -> String {
    let stem = recording_stem(motion_start);
    let mut name = format!("{stem}.mp4");
    let mut n = 1;
    while tokio::fs::try_exists(dir.join(&name)).await.unwrap_or(false) {
        name = format!("{stem}_{n}.mp4");
        n += 1;
    }
    name
}

fn recording_stem(motion_start: DateTime<Utc>) -> String {
    motion_start
        .with_timezone(&Local)
        .format("motion_%Y%m%d_%H%M%S")
        .to_string()
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn process_exit(capture: Option<&mut ActiveCapture>) -> CaptureExit {
    match capture {
        Some(capture) => capture.process.wait().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use camwatch_media::{MediaError, MediaResult};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::Notify;
    use tokio::time::advance;

    struct FakeProcess {
        crash: Arc<Notify>,
        terminations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CaptureProcess for FakeProcess {
        fn pid(&self) -> Option<u32> {
            Some(4242)
        }

        async fn wait(&mut self) -> CaptureExit {
            self.crash.notified().await;
            CaptureExit::Exited { code: Some(1) }
        }

        async fn terminate(&mut self, _grace: Duration) -> CaptureExit {
            self.terminations.fetch_add(1, Ordering::SeqCst);
            CaptureExit::Stopped
        }
    }

    #[derive(Default)]
    struct FakeLauncher {
        fail: AtomicBool,
        launches: AtomicUsize,
        crash: Arc<Notify>,
        terminations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CaptureLauncher for FakeLauncher {
        async fn launch(&self, output: &Path) -> MediaResult<Box<dyn CaptureProcess>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(MediaError::capture_launch("stream unavailable"));
            }
            self.launches.fetch_add(1, Ordering::SeqCst);
            std::fs::write(output, b"fake mp4 data").map_err(MediaError::Io)?;
            Ok(Box::new(FakeProcess {
                crash: self.crash.clone(),
                terminations: self.terminations.clone(),
            }))
        }
    }

    struct FakeThumbnailer;

    #[async_trait]
    impl Thumbnailer for FakeThumbnailer {
        async fn screenshots(&self, video: &Path) -> Vec<String> {
            let stem = video.file_stem().unwrap().to_string_lossy();
            let name = format!("{stem}_000.jpg");
            std::fs::write(video.with_file_name(&name), b"jpg").unwrap();
            vec![name]
        }
    }

    struct Harness {
        _dir: TempDir,
        launcher: Arc<FakeLauncher>,
        index: Arc<RecordingIndex>,
        handle: RecorderHandle,
        task: JoinHandle<()>,
    }

    async fn harness(max_recordings: usize) -> Harness {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(FakeLauncher::default());
        let index = Arc::new(RecordingIndex::open(dir.path()).await);

        let config = RecorderConfig {
            recordings_dir: dir.path().to_path_buf(),
            pre_roll: Duration::from_secs(6),
            post_roll: Duration::from_secs(5),
            stop_grace: Duration::from_secs(10),
            max_recordings,
        };
        let (handle, task) = RecordingController::spawn(
            config,
            launcher.clone(),
            Arc::new(FakeThumbnailer),
            index.clone(),
        );

        Harness {
            _dir: dir,
            launcher,
            index,
            handle,
            task,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 27, 14, 30, 0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_cancels_pending_stop() {
        let h = harness(50).await;

        h.handle.start_recording(t0()).unwrap();
        assert_eq!(h.handle.sync().await.unwrap().phase, RecordingPhase::Recording);

        advance(Duration::from_secs(10)).await;
        h.handle.schedule_stop().unwrap();
        let status = h.handle.sync().await.unwrap();
        assert_eq!(status.phase, RecordingPhase::Stopping);
        assert!(status.pending_stop_deadline.is_some());

        advance(Duration::from_millis(500)).await;
        h.handle.extend_recording().unwrap();
        let status = h.handle.sync().await.unwrap();
        assert_eq!(status.phase, RecordingPhase::Recording);
        assert!(status.pending_stop_deadline.is_none());

        // Well past the cancelled deadline at t=15
        advance(Duration::from_secs(10)).await;
        let status = h.handle.sync().await.unwrap();
        assert_eq!(status.phase, RecordingPhase::Recording);
        assert_eq!(h.launcher.terminations.load(Ordering::SeqCst), 0);
        assert!(h.index.list().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_extend_beats_elapsed_deadline() {
        let h = harness(50).await;

        h.handle.start_recording(t0()).unwrap();
        h.handle.schedule_stop().unwrap();
        h.handle.sync().await.unwrap();

        // Extend is already queued when the post-roll deadline passes
        h.handle.extend_recording().unwrap();
        advance(Duration::from_secs(6)).await;

        let status = h.handle.sync().await.unwrap();
        assert_eq!(status.phase, RecordingPhase::Recording);
        assert!(status.pending_stop_deadline.is_none());
        assert_eq!(h.launcher.terminations.load(Ordering::SeqCst), 0);
        assert!(h.index.list().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_stop_rearms_single_deadline() {
        let h = harness(50).await;

        h.handle.start_recording(t0()).unwrap();
        h.handle.schedule_stop().unwrap();
        h.handle.sync().await.unwrap();

        advance(Duration::from_secs(3)).await;
        h.handle.schedule_stop().unwrap();
        h.handle.sync().await.unwrap();

        // First deadline (t=5) would have fired here
        advance(Duration::from_secs(4)).await;
        let status = h.handle.sync().await.unwrap();
        assert_eq!(status.phase, RecordingPhase::Stopping);
        assert_eq!(h.launcher.terminations.load(Ordering::SeqCst), 0);

        // Second deadline is t=8
        advance(Duration::from_millis(1500)).await;
        let status = h.handle.sync().await.unwrap();
        assert_eq!(status.phase, RecordingPhase::Idle);
        assert!(status.current_recording.is_none());
        assert_eq!(h.launcher.terminations.load(Ordering::SeqCst), 1);

        let recordings = h.index.list().await;
        assert_eq!(recordings.len(), 1);
        assert!(recordings[0].is_complete());
        assert_eq!(recordings[0].start_time, t0());
        assert_eq!(recordings[0].size_bytes, Some(13));
        assert_eq!(
            recordings[0].thumbnail.as_deref(),
            Some(recordings[0].screenshots[0].as_str())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_motion_events_drive_lifecycle() {
        let h = harness(50).await;
        let event = |kind| MotionEvent::new(kind, t0(), 6000, 3);

        h.handle.motion(event(MotionEventKind::Start)).unwrap();
        h.handle.motion(event(MotionEventKind::Frame)).unwrap();
        let status = h.handle.sync().await.unwrap();
        assert_eq!(status.phase, RecordingPhase::Recording);
        assert_eq!(status.current_recording.unwrap().start_time, t0());

        h.handle.motion(event(MotionEventKind::End)).unwrap();
        assert_eq!(h.handle.sync().await.unwrap().phase, RecordingPhase::Stopping);

        // Motion resumes during post-roll: same clip, no second launch
        advance(Duration::from_secs(2)).await;
        h.handle.motion(event(MotionEventKind::Start)).unwrap();
        assert_eq!(h.handle.sync().await.unwrap().phase, RecordingPhase::Recording);
        assert_eq!(h.launcher.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_and_stop_ignored_when_idle() {
        let h = harness(50).await;

        h.handle.extend_recording().unwrap();
        h.handle.schedule_stop().unwrap();
        let status = h.handle.sync().await.unwrap();
        assert_eq!(status.phase, RecordingPhase::Idle);
        assert!(status.pending_stop_deadline.is_none());
        assert_eq!(h.launcher.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_exit_finalizes() {
        let h = harness(50).await;

        h.handle.start_recording(t0()).unwrap();
        h.handle.sync().await.unwrap();

        h.launcher.crash.notify_one();
        let status = h.handle.sync().await.unwrap();
        assert_eq!(status.phase, RecordingPhase::Idle);
        assert_eq!(h.index.list().await.len(), 1);
        assert_eq!(h.launcher.terminations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_stays_idle_and_retries() {
        let h = harness(50).await;
        h.launcher.fail.store(true, Ordering::SeqCst);

        h.handle.start_recording(t0()).unwrap();
        assert_eq!(h.handle.sync().await.unwrap().phase, RecordingPhase::Idle);

        h.launcher.fail.store(false, Ordering::SeqCst);
        h.handle.start_recording(t0()).unwrap();
        assert_eq!(h.handle.sync().await.unwrap().phase, RecordingPhase::Recording);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_immediate() {
        let h = harness(50).await;
        assert!(h.handle.stop_recording_immediate().await.unwrap().is_none());

        h.handle.start_recording(t0()).unwrap();
        h.handle.schedule_stop().unwrap();
        let recording = h.handle.stop_recording_immediate().await.unwrap().unwrap();

        assert!(recording.is_complete());
        assert_eq!(recording.screenshots.len(), 1);
        assert_eq!(h.handle.status().phase, RecordingPhase::Idle);
        assert_eq!(h.launcher.terminations.load(Ordering::SeqCst), 1);
        assert_eq!(h.index.get(&recording.filename).await, Some(recording));
    }

    #[tokio::test(start_paused = true)]
    async fn test_filename_collision_gets_suffix() {
        let h = harness(50).await;

        h.handle.start_recording(t0()).unwrap();
        let first = h.handle.stop_recording_immediate().await.unwrap().unwrap();
        h.handle.start_recording(t0()).unwrap();
        let second = h.handle.stop_recording_immediate().await.unwrap().unwrap();

        assert_eq!(first.filename, format!("{}.mp4", recording_stem(t0())));
        assert_eq!(second.filename, format!("{}_1.mp4", recording_stem(t0())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_applies_retention() {
        let h = harness(2).await;

        for minute in 0..3 {
            h.handle
                .start_recording(t0() + chrono::Duration::minutes(minute))
                .unwrap();
            h.handle.stop_recording_immediate().await.unwrap();
        }

        let recordings = h.index.list().await;
        assert_eq!(recordings.len(), 2);
        assert_eq!(recordings[1].start_time, t0() + chrono::Duration::minutes(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_finalizes_active_recording() {
        let h = harness(50).await;

        h.handle.start_recording(t0()).unwrap();
        h.handle.shutdown().unwrap();
        h.task.await.unwrap();

        assert_eq!(h.index.list().await.len(), 1);
        assert!(matches!(h.handle.sync().await, Err(CoreError::ControllerGone)));
    }
}
