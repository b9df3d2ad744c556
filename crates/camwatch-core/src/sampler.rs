//! Sampling loop: frame source, classifier, state machine, recorder.
//!
//! One task per stream drives the whole pipeline one tick at a time. The
//! classifier and state machine are only ever touched from here. Events are
//! handed to the recorder over its channel, so process spawns and file I/O
//! never stall the sampling cadence.

use chrono::{DateTime, Utc};
use image::DynamicImage;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use camwatch_media::{FrameSource, MediaResult, MotionClassifier};
use camwatch_models::{DetectionSettings, DetectionStats, MotionEvent, MotionEventKind, Roi};

use crate::metrics;
use crate::motion::MotionStateMachine;
use crate::recorder::RecorderHandle;
use crate::runtime::stop_requested;

/// Consecutive grab failures treated as a stream restart.
pub const RESET_AFTER_FAILURES: u64 = 3;

/// Drives one stream through detection.
pub struct MotionSampler {
    frame_source: Box<dyn FrameSource>,
    classifier: MotionClassifier,
    machine: MotionStateMachine,
    settings: watch::Receiver<DetectionSettings>,
    recorder: RecorderHandle,
    stats_tx: watch::Sender<DetectionStats>,
    interval: Duration,
    consecutive_failures: u64,
    needs_reset: bool,
    last_roi: Option<Roi>,
}

impl MotionSampler {
    pub fn new(
        frame_source: Box<dyn FrameSource>,
        classifier: MotionClassifier,
        machine: MotionStateMachine,
        settings: watch::Receiver<DetectionSettings>,
        recorder: RecorderHandle,
        interval: Duration,
    ) -> Self {
        let (stats_tx, _) = watch::channel(machine.stats());
        Self {
            frame_source,
            classifier,
            machine,
            settings,
            recorder,
            stats_tx,
            interval,
            consecutive_failures: 0,
            needs_reset: false,
            last_roi: None,
        }
    }

    /// Receiver for the per-tick detection snapshot.
    pub fn stats(&self) -> watch::Receiver<DetectionStats> {
        self.stats_tx.subscribe()
    }

    /// Run until shutdown is signalled.
    ///
    /// Shutdown may interrupt a frame grab, never the processing of a frame.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Motion sampler started ({:?} interval)", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop_requested(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            let frame = tokio::select! {
                _ = stop_requested(&mut shutdown) => break,
                frame = self.frame_source.next_frame() => frame,
            };

            self.process(frame, Utc::now());
        }

        info!(
            frames = self.machine.frames_processed(),
            "Motion sampler stopped"
        );
    }

    /// Handle one tick's frame grab result.
    pub fn process(&mut self, frame: MediaResult<DynamicImage>, now: DateTime<Utc>) -> Option<MotionEvent> {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                self.on_grab_failure(e);
                return None;
            }
        };

        if self.consecutive_failures > 0 {
            info!("Stream recovered after {} failed grabs", self.consecutive_failures);
            self.consecutive_failures = 0;
        }

        // One snapshot per tick
        let settings = *self.settings.borrow_and_update();
        let roi = settings.roi();
        if self.last_roi.is_some_and(|last| last != roi) {
            debug!("ROI changed, reseeding background model");
            self.needs_reset = true;
        }
        self.last_roi = Some(roi);

        if self.needs_reset {
            self.classifier.reset();
            self.needs_reset = false;
        }

        let area = self.classifier.classify(&frame, &roi);
        metrics::record_frame(area);

        let event = self.machine.ingest(area, settings.threshold, now);
        if let Some(event) = &event {
            self.dispatch(event);
        }

        self.publish_stats();
        event
    }

    fn on_grab_failure(&mut self, error: camwatch_media::MediaError) {
        self.consecutive_failures += 1;
        metrics::record_decode_failure();

        if self.consecutive_failures == 1 {
            warn!("Frame grab failed: {}", error);
        } else {
            debug!(failures = self.consecutive_failures, "Frame grab failed: {}", error);
        }

        if self.consecutive_failures == RESET_AFTER_FAILURES {
            info!("Stream gap detected, background model will be reset");
            self.needs_reset = true;
        }

        self.publish_stats();
    }

    fn dispatch(&self, event: &MotionEvent) {
        metrics::record_motion_event(event.kind.as_str());
        match event.kind {
            MotionEventKind::Start => info!(area = event.motion_area, "Motion started"),
            MotionEventKind::Frame => debug!(area = event.motion_area, "Motion continues"),
            MotionEventKind::End => info!(area = event.motion_area, "Motion ended"),
        }

        if let Err(e) = self.recorder.motion(event.clone()) {
            warn!("Dropping {} event: {}", event.kind, e);
        }
    }

    fn publish_stats(&self) {
        let mut stats = self.machine.stats();
        stats.decode_failures = self.consecutive_failures;
        self.stats_tx.send_replace(stats);
    }
}
