//! Wiring of the detection and recording tasks, and orderly shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use camwatch_media::{
    CaptureLauncher, FfmpegCaptureLauncher, FfmpegFrameSource, FfmpegThumbnailer, FrameSource,
    MotionClassifier, Thumbnailer,
};
use camwatch_models::{DetectionStats, SensorState};

use crate::config::CameraConfig;
use crate::error::{CoreError, CoreResult};
use crate::index::RecordingIndex;
use crate::motion::MotionStateMachine;
use crate::recorder::{RecorderConfig, RecorderHandle, RecordingController};
use crate::reporter::StateReporter;
use crate::sampler::MotionSampler;
use crate::settings::{SettingsStore, SettingsWatcher};

/// Resolves once `true` is published or the sender is gone.
pub(crate) async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Running detection and recording pipeline for one camera.
pub struct CameraRuntime {
    settings: Arc<SettingsStore>,
    index: Arc<RecordingIndex>,
    recorder: RecorderHandle,
    detection: watch::Receiver<DetectionStats>,
    state: watch::Receiver<SensorState>,
    sampler_stop: watch::Sender<bool>,
    background_stop: watch::Sender<bool>,
    sampler_task: JoinHandle<()>,
    recorder_task: JoinHandle<()>,
    reporter_task: JoinHandle<()>,
    watcher_task: Option<JoinHandle<()>>,
}

impl CameraRuntime {
    /// Start with the FFmpeg-backed frame source, capture and thumbnails.
    pub async fn start_ffmpeg(config: &CameraConfig) -> CoreResult<Self> {
        let frame_source = FfmpegFrameSource::new(&config.stream_url, config.frame_timeout);
        let launcher = FfmpegCaptureLauncher::new(&config.stream_url, config.max_duration.as_secs());
        let thumbnailer = FfmpegThumbnailer::new(config.screenshot_interval.as_secs_f64());

        Self::start(
            config,
            Box::new(frame_source),
            MotionClassifier::preferred(),
            Arc::new(launcher),
            Arc::new(thumbnailer),
        )
        .await
    }

    /// Start every task.
    ///
    /// Fails if the configuration is invalid or the recordings directory
    /// cannot be created.
    pub async fn start(
        config: &CameraConfig,
        frame_source: Box<dyn FrameSource>,
        classifier: MotionClassifier,
        launcher: Arc<dyn CaptureLauncher>,
        thumbnailer: Arc<dyn Thumbnailer>,
    ) -> CoreResult<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.recordings_path)
            .await
            .map_err(|source| CoreError::RecordingsDir {
                path: config.recordings_path.clone(),
                source,
            })?;

        let settings = Arc::new(SettingsStore::new(
            config.detection,
            config.settings_file.clone(),
        ));
        settings.load_file().await;

        let index = Arc::new(RecordingIndex::open(&config.recordings_path).await);
        info!(
            "Recording index opened: {} recordings in {}",
            index.summary().total,
            config.recordings_path.display()
        );

        let (recorder, recorder_task) = RecordingController::spawn(
            RecorderConfig {
                recordings_dir: config.recordings_path.clone(),
                pre_roll: config.pre_roll,
                post_roll: config.post_roll,
                stop_grace: config.capture_stop_grace,
                max_recordings: config.max_recordings,
            },
            launcher,
            thumbnailer,
            index.clone(),
        );
        // Apply the retention cap to whatever is already on disk
        recorder.sweep()?;

        let (sampler_stop, sampler_rx) = watch::channel(false);
        let (background_stop, background_rx) = watch::channel(false);

        let sampler = MotionSampler::new(
            frame_source,
            classifier,
            MotionStateMachine::new(config.min_duration, config.check_interval),
            settings.subscribe(),
            recorder.clone(),
            config.check_interval,
        );
        let detection = sampler.stats();
        let sampler_task = tokio::spawn(sampler.run(sampler_rx));

        let reporter = StateReporter::new(
            detection.clone(),
            recorder.subscribe(),
            index.subscribe_summary(),
            config.state_file.clone(),
            config.state_update_interval,
        );
        let state = reporter.state();
        let reporter_task = tokio::spawn(reporter.run(background_rx.clone()));

        let watcher_task = config.settings_file.clone().map(|path| {
            let watcher =
                SettingsWatcher::new(settings.clone(), path, config.settings_reload_interval);
            tokio::spawn(watcher.run(background_rx))
        });

        let current = settings.get();
        info!(
            threshold = current.threshold,
            min_duration = ?config.min_duration,
            pre_roll = ?config.pre_roll,
            post_roll = ?config.post_roll,
            max_recordings = config.max_recordings,
            "Camera runtime started"
        );

        Ok(Self {
            settings,
            index,
            recorder,
            detection,
            state,
            sampler_stop,
            background_stop,
            sampler_task,
            recorder_task,
            reporter_task,
            watcher_task,
        })
    }

    pub fn settings(&self) -> Arc<SettingsStore> {
        self.settings.clone()
    }

    pub fn index(&self) -> Arc<RecordingIndex> {
        self.index.clone()
    }

    pub fn recorder(&self) -> RecorderHandle {
        self.recorder.clone()
    }

    pub fn detection(&self) -> watch::Receiver<DetectionStats> {
        self.detection.clone()
    }

    pub fn state(&self) -> watch::Receiver<SensorState> {
        self.state.clone()
    }

    /// Stop sampling, finalize any recording, then stop the background tasks.
    ///
    /// Every step is bounded by `grace`; tasks that overrun are aborted.
    pub async fn shutdown(self, grace: Duration) {
        info!("Shutting down camera runtime");

        let _ = self.sampler_stop.send(true);
        join_bounded("sampler", self.sampler_task, grace).await;

        match tokio::time::timeout(grace, self.recorder.stop_recording_immediate()).await {
            Ok(Ok(Some(recording))) => {
                info!(recording = %recording.filename, "Final recording saved")
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => warn!("Failed to stop recording: {}", e),
            Err(_) => warn!("Stopping the recording took longer than {:?}", grace),
        }

        let _ = self.recorder.shutdown();
        join_bounded("recorder", self.recorder_task, grace).await;

        let _ = self.background_stop.send(true);
        join_bounded("state reporter", self.reporter_task, grace).await;
        if let Some(task) = self.watcher_task {
            join_bounded("settings watcher", task, grace).await;
        }

        info!("Camera runtime stopped");
    }
}

async fn join_bounded(name: &str, mut task: JoinHandle<()>, grace: Duration) {
    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(())) => debug!("{} stopped", name),
        Ok(Err(e)) => warn!("{} task failed: {}", name, e),
        Err(_) => {
            warn!("{} did not stop within {:?}, aborting", name, grace);
            task.abort();
        }
    }
}
