//! Periodic sensor state for Home Assistant and `GET /api/state`.
//!
//! Reads only `watch` snapshots, so it never waits on the sampler or the
//! recorder.

use chrono::{DateTime, Local, NaiveDate};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use camwatch_media::write_json_atomic;
use camwatch_models::{DetectionStats, RecorderStatus, SensorState};

use crate::index::IndexSummary;
use crate::runtime::stop_requested;

/// Motion episodes since local midnight, derived from the running total.
#[derive(Debug, Clone)]
pub struct DailyCounter {
    day: NaiveDate,
    baseline: u64,
}

impl DailyCounter {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            day: today,
            baseline: 0,
        }
    }

    /// Episodes counted today given the total since startup.
    pub fn count(&mut self, total: u64, today: NaiveDate) -> u64 {
        if today != self.day {
            self.day = today;
            self.baseline = total;
        }
        total.saturating_sub(self.baseline)
    }
}

/// Builds and publishes [`SensorState`].
pub struct StateReporter {
    detection: watch::Receiver<DetectionStats>,
    recorder: watch::Receiver<RecorderStatus>,
    index: watch::Receiver<IndexSummary>,
    state_tx: watch::Sender<SensorState>,
    state_file: PathBuf,
    interval: Duration,
    started: Instant,
    daily: DailyCounter,
    write_failing: bool,
}

impl StateReporter {
    pub fn new(
        detection: watch::Receiver<DetectionStats>,
        recorder: watch::Receiver<RecorderStatus>,
        index: watch::Receiver<IndexSummary>,
        state_file: PathBuf,
        interval: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(SensorState::default());
        Self {
            detection,
            recorder,
            index,
            state_tx,
            state_file,
            interval,
            started: Instant::now(),
            daily: DailyCounter::new(Local::now().date_naive()),
            write_failing: false,
        }
    }

    /// Receiver for the latest published state.
    pub fn state(&self) -> watch::Receiver<SensorState> {
        self.state_tx.subscribe()
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop_requested(&mut shutdown) => break,
                _ = ticker.tick() => self.report(Local::now()).await,
            }
        }

        self.report(Local::now()).await;
        info!("State reporter stopped");
    }

    /// Publish and write one snapshot.
    pub async fn report(&mut self, now: DateTime<Local>) {
        let state = self.build_state(now);
        self.state_tx.send_replace(state.clone());

        match write_json_atomic(&self.state_file, &state).await {
            Ok(()) => {
                if self.write_failing {
                    info!("State file {} writable again", self.state_file.display());
                }
                self.write_failing = false;
            }
            Err(e) if !self.write_failing => {
                warn!("Failed to write state file {}: {}", self.state_file.display(), e);
                self.write_failing = true;
            }
            Err(e) => debug!("Failed to write state file: {}", e),
        }
    }

    pub fn build_state(&mut self, now: DateTime<Local>) -> SensorState {
        let detection = self.detection.borrow().clone();
        let recorder = self.recorder.borrow().clone();
        let summary = self.index.borrow().clone();
        let latest = summary.latest.as_ref();

        SensorState {
            motion_detected: detection.is_motion_active(),
            detector_state: detection.phase,
            last_motion_time: detection.last_motion_at.map(|t| t.with_timezone(&Local)),
            frames_processed: detection.frames_processed,
            motion_events_today: self.daily.count(detection.motion_events, now.date_naive()),
            is_recording: recorder.is_recording(),
            recording_state: recorder.phase,
            total_recordings: summary.total,
            latest_recording: latest.map(|r| r.filename.clone()),
            latest_recording_time: latest.map(|r| r.start_time.with_timezone(&Local)),
            latest_thumbnail: latest.and_then(|r| r.thumbnail.clone()),
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camwatch_models::{DetectionPhase, Recording, RecordingPhase};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    struct Fixture {
        detection: watch::Sender<DetectionStats>,
        recorder: watch::Sender<RecorderStatus>,
        index: watch::Sender<IndexSummary>,
    }

    fn reporter(state_file: PathBuf) -> (StateReporter, Fixture) {
        let (detection, detection_rx) = watch::channel(DetectionStats::default());
        let (recorder, recorder_rx) = watch::channel(RecorderStatus::default());
        let (index, index_rx) = watch::channel(IndexSummary::default());
        let reporter = StateReporter::new(
            detection_rx,
            recorder_rx,
            index_rx,
            state_file,
            Duration::from_secs(1),
        );
        (
            reporter,
            Fixture {
                detection,
                recorder,
                index,
            },
        )
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, d).unwrap()
    }

    #[test]
    fn test_daily_counter_resets_at_midnight() {
        let mut counter = DailyCounter::new(day(27));
        assert_eq!(counter.count(0, day(27)), 0);
        assert_eq!(counter.count(4, day(27)), 4);
        assert_eq!(counter.count(4, day(28)), 0);
        assert_eq!(counter.count(6, day(28)), 2);
    }

    #[tokio::test]
    async fn test_build_state_from_snapshots() {
        let dir = TempDir::new().unwrap();
        let (mut reporter, fx) = reporter(dir.path().join("state.json"));

        let motion_at = Utc.with_ymd_and_hms(2024, 11, 27, 14, 30, 5).unwrap();
        fx.detection.send_replace(DetectionStats {
            phase: DetectionPhase::Active,
            frames_processed: 120,
            motion_events: 2,
            last_motion_at: Some(motion_at),
            ..Default::default()
        });
        fx.recorder.send_replace(RecorderStatus {
            phase: RecordingPhase::Stopping,
            ..Default::default()
        });
        let mut latest = Recording::new("motion_20241127_143000.mp4", motion_at);
        latest.thumbnail = Some("motion_20241127_143000_000.jpg".into());
        fx.index.send_replace(IndexSummary {
            total: 7,
            latest: Some(latest),
        });

        let state = reporter.build_state(Local::now());
        assert!(state.motion_detected);
        assert_eq!(state.detector_state, DetectionPhase::Active);
        assert_eq!(state.frames_processed, 120);
        assert_eq!(state.motion_events_today, 2);
        assert!(state.is_recording);
        assert_eq!(state.recording_state, RecordingPhase::Stopping);
        assert_eq!(state.total_recordings, 7);
        assert_eq!(state.latest_recording.as_deref(), Some("motion_20241127_143000.mp4"));
        assert_eq!(
            state.latest_thumbnail.as_deref(),
            Some("motion_20241127_143000_000.jpg")
        );
        assert_eq!(state.last_motion_time.unwrap(), motion_at);
    }

    #[tokio::test]
    async fn test_report_writes_state_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let (mut reporter, fx) = reporter(path.clone());
        let state_rx = reporter.state();

        fx.recorder.send_replace(RecorderStatus {
            phase: RecordingPhase::Recording,
            ..Default::default()
        });
        reporter.report(Local::now()).await;

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["is_recording"], true);
        assert_eq!(written["motion_detected"], false);
        assert!(state_rx.borrow().is_recording);
    }

    #[tokio::test]
    async fn test_run_writes_final_state_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let (reporter, fx) = reporter(path.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(reporter.run(shutdown_rx));

        fx.index.send_replace(IndexSummary {
            total: 3,
            latest: None,
        });
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        let written: SensorState =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.total_recordings, 3);
    }
}
